use crate::error::StanzaError;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level renderer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StanzaConfig {
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

/// Knobs shared by all stanza builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Tag passed to the discovery facility for deferred server lists.
    #[serde(default = "default_discovery_tag")]
    pub discovery_tag: String,
    /// Resolver section used by `check resolvers <name>`.
    #[serde(default = "default_resolver")]
    pub resolver: String,
    /// Source ports that split plain and TLS traffic for https services.
    #[serde(default = "default_http_src_port")]
    pub http_src_port: u16,
    #[serde(default = "default_https_src_port")]
    pub https_src_port: u16,
    /// Path ACL function when a destination does not set one.
    #[serde(default = "default_path_type")]
    pub default_path_type: String,
}

/// Where the default lookup reads secrets from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_secrets_dir")]
    pub dir: PathBuf,
    /// File name prefix; the lowercase key is appended.
    #[serde(default = "default_secrets_prefix")]
    pub prefix: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_discovery_tag() -> String { "any".into() }
fn default_resolver() -> String { "docker".into() }
fn default_http_src_port() -> u16 { 80 }
fn default_https_src_port() -> u16 { 443 }
fn default_path_type() -> String { "path_beg".into() }
fn default_secrets_dir() -> PathBuf { PathBuf::from("/run/secrets") }
fn default_secrets_prefix() -> String { "stanza_".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            discovery_tag: default_discovery_tag(),
            resolver: default_resolver(),
            http_src_port: default_http_src_port(),
            https_src_port: default_https_src_port(),
            default_path_type: default_path_type(),
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            dir: default_secrets_dir(),
            prefix: default_secrets_prefix(),
        }
    }
}

impl StanzaConfig {
    /// Load configuration from a YAML file plus `STANZA_` env overrides.
    ///
    /// Nested keys use a double underscore: `STANZA_RENDER__DISCOVERY_TAG`.
    pub fn load(path: &Path) -> Result<Self, StanzaError> {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("STANZA_").split("__"))
            .extract()
            .map_err(|e| StanzaError::Config(e.to_string()))
    }
}
