use crate::config::SecretsConfig;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Global basic-auth users, `user:pass` entries separated by commas.
pub const USERS: &str = "USERS";
/// `true` when the global user passwords are crypt(3) hashes.
pub const USERS_PASS_ENCRYPTED: &str = "USERS_PASS_ENCRYPTED";
/// `true` turns on proxy logging for every rendered stanza.
pub const DEBUG: &str = "DEBUG";
/// Fallback `log-format` for TCP frontends.
pub const DEBUG_TCP_FORMAT: &str = "DEBUG_TCP_FORMAT";

/// Secret and environment lookups consumed by the renderers.
///
/// Absent values are reported as the empty string.
pub trait SecretLookup: Send + Sync {
    fn lookup(&self, key: &str) -> String;

    /// Boolean signal: `true` in any letter case.
    fn flag(&self, key: &str) -> bool {
        self.lookup(key).trim().eq_ignore_ascii_case("true")
    }
}

/// Reads `<dir>/<prefix><key in lowercase>` first, then the environment.
#[derive(Debug, Clone)]
pub struct EnvLookup {
    dir: PathBuf,
    prefix: String,
}

impl EnvLookup {
    pub fn new(config: &SecretsConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            prefix: config.prefix.clone(),
        }
    }

    fn secret_file(&self, key: &str) -> Option<String> {
        let path = self
            .dir
            .join(format!("{}{}", self.prefix, key.to_lowercase()));
        match std::fs::read_to_string(&path) {
            Ok(value) => {
                debug!(path = %path.display(), "Secret read from file");
                Some(value.trim().to_string())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read secret file, falling back to environment");
                None
            }
        }
    }
}

impl SecretLookup for EnvLookup {
    fn lookup(&self, key: &str) -> String {
        self.secret_file(key)
            .or_else(|| std::env::var(key).ok())
            .unwrap_or_default()
    }
}

/// Map-backed lookup for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    values: HashMap<String, String>,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticLookup {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SecretLookup for StaticLookup {
    fn lookup(&self, key: &str) -> String {
        self.values.get(key).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_lookup_returns_empty_for_absent_keys() {
        let lookup = StaticLookup::new().with(USERS, "a:b");
        assert_eq!(lookup.lookup(USERS), "a:b");
        assert_eq!(lookup.lookup(DEBUG), "");
    }

    #[test]
    fn flag_is_case_insensitive() {
        let lookup: StaticLookup = [("A", "TRUE"), ("B", "True"), ("C", "yes"), ("D", "")]
            .into_iter()
            .collect();
        assert!(lookup.flag("A"));
        assert!(lookup.flag("B"));
        assert!(!lookup.flag("C"));
        assert!(!lookup.flag("D"));
    }

    #[test]
    fn env_lookup_prefers_secret_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stanza_users"), "admin:secret\n").unwrap();
        let lookup = EnvLookup::new(&SecretsConfig {
            dir: dir.path().to_path_buf(),
            prefix: "stanza_".into(),
        });
        assert_eq!(lookup.lookup(USERS), "admin:secret");
    }

    #[test]
    fn env_lookup_missing_everything_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = EnvLookup::new(&SecretsConfig {
            dir: dir.path().to_path_buf(),
            prefix: "stanza_".into(),
        });
        assert_eq!(lookup.lookup("STANZA_TEST_SURELY_UNSET_KEY"), "");
    }
}
