use crate::error::StanzaError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

/// A routed service as discovered by the orchestration layer.
///
/// The model is read-only for the renderers: everything they derive
/// (domain function, formatted modes, debug and global-user flags) lives in
/// a separate render context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Service {
    /// Service name; also the base of backend names (`<name>-be<port>`).
    pub name: String,

    /// ACL name prefix. Empty means the service name is used.
    #[serde(default)]
    pub acl_name: String,

    /// Fully-qualified name used by the discovery facility.
    #[serde(default)]
    pub full_name: String,

    /// Routable units, rendered in order.
    #[serde(default)]
    pub destinations: Vec<Destination>,

    /// Host names routed to this service. `*.` marks a wildcard entry.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Match the domains and all of their sub-domains.
    #[serde(default)]
    pub domain_match_all: bool,

    /// Port of the TLS leg. 0 disables the https split.
    #[serde(default)]
    pub https_port: u16,

    /// Also emit `default_backend` for each http destination.
    #[serde(default)]
    pub default_backend: bool,

    /// Redirect to https when `X-Forwarded-Proto` is `http`.
    #[serde(default)]
    pub redirect_when_http_proto: bool,

    /// Add `X-Forwarded-Proto: https` on TLS connections.
    #[serde(default)]
    pub x_forwarded_proto: bool,

    /// Per-service basic-auth users.
    #[serde(default)]
    pub users: Vec<User>,

    /// `option <mode>` override, e.g. `http-server-close`.
    #[serde(default)]
    pub connection_mode: String,

    /// Seconds; empty means unset, which is not the same as "0".
    #[serde(default, deserialize_with = "string_or_number")]
    pub timeout_server: String,

    #[serde(default, deserialize_with = "string_or_number")]
    pub timeout_tunnel: String,

    /// Path rewrite regex and replacement.
    #[serde(default)]
    pub path_search: String,
    #[serde(default)]
    pub path_replace: String,

    #[serde(default)]
    pub proxy_mode: ProxyMode,

    /// Static target host. Empty means the service name.
    #[serde(default)]
    pub host: String,

    /// Health-check the static server through the DNS resolver.
    #[serde(default)]
    pub check_resolvers: bool,

    #[serde(default)]
    pub ssl_verify_none: bool,

    /// Redirect plain-http traffic on the plain backend to TLS.
    #[serde(default)]
    pub https_only: bool,

    #[serde(default)]
    pub headers: HeaderRules,

    /// Raw directives appended verbatim to every backend.
    #[serde(default)]
    pub backend_extra: String,

    #[serde(default)]
    pub debug: bool,

    /// Custom `log-format` for TCP frontends.
    #[serde(default)]
    pub log_format: String,
}

/// One routable unit within a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Destination {
    /// `http`, `tcp` or `sni`.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Backend port. Empty means unset.
    #[serde(default, deserialize_with = "string_or_number")]
    pub port: String,

    #[serde(default)]
    pub paths: Vec<String>,

    /// ACL match function for `paths`. Empty means `path_beg`.
    #[serde(default)]
    pub path_type: String,

    #[serde(default)]
    pub user_agent: UserAgent,

    /// Listening port on the proxy side.
    #[serde(default)]
    pub src_port: Option<u16>,

    /// Require a verified client certificate.
    #[serde(default)]
    pub verify_client_ssl: bool,

    /// Skip basic-auth for this destination.
    #[serde(default)]
    pub ignore_authorization: bool,
}

/// User-Agent filter for a destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserAgent {
    #[serde(default)]
    pub acl_name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub username: String,
    pub password: String,
    /// Password is already a crypt(3) hash.
    #[serde(default)]
    pub pass_encrypted: bool,
}

/// Header directives injected into backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeaderRules {
    #[serde(default)]
    pub add_request: Vec<String>,
    #[serde(default)]
    pub set_request: Vec<String>,
    #[serde(default)]
    pub add_response: Vec<String>,
    #[serde(default)]
    pub set_response: Vec<String>,
    #[serde(default)]
    pub del_request: Vec<String>,
    #[serde(default)]
    pub del_response: Vec<String>,
}

/// How backend servers are resolved.
///
/// `service` and `swarm` resolve to one static server; every other mode
/// defers server discovery to an external templating pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProxyMode {
    #[default]
    Service,
    Swarm,
    Other(String),
}

impl ProxyMode {
    pub fn is_static(&self) -> bool {
        matches!(self, ProxyMode::Service | ProxyMode::Swarm)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProxyMode::Service => "service",
            ProxyMode::Swarm => "swarm",
            ProxyMode::Other(mode) => mode,
        }
    }
}

impl From<String> for ProxyMode {
    fn from(mode: String) -> Self {
        match mode.to_lowercase().as_str() {
            "service" => ProxyMode::Service,
            "swarm" => ProxyMode::Swarm,
            other => ProxyMode::Other(other.to_string()),
        }
    }
}

impl From<ProxyMode> for String {
    fn from(mode: ProxyMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_mode() -> String {
    "http".into()
}

/// Accept `port: 8080` as well as `port: "8080"` in descriptor files.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(u64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

impl Default for Destination {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            port: String::new(),
            paths: Vec::new(),
            path_type: String::new(),
            user_agent: UserAgent::default(),
            src_port: None,
            verify_client_ssl: false,
            ignore_authorization: false,
        }
    }
}

/// Mode keyword as written to a backend: `sni` is layer-4 passthrough and
/// becomes `tcp`; every other mode is lowercased, since destinations are
/// classified case-insensitively.
pub fn format_mode(mode: &str) -> String {
    if mode.eq_ignore_ascii_case("sni") {
        "tcp".into()
    } else {
        mode.to_ascii_lowercase()
    }
}

impl Destination {
    pub fn is_http(&self) -> bool {
        self.mode.eq_ignore_ascii_case("http")
    }

    pub fn has_port(&self) -> bool {
        !self.port.is_empty()
    }

    /// Passthrough destinations are grouped into TCP frontends.
    pub fn is_passthrough(&self) -> bool {
        self.mode.eq_ignore_ascii_case("tcp") || self.mode.eq_ignore_ascii_case("sni")
    }
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// ACL prefix, falling back to the service name.
    pub fn effective_acl_name(&self) -> &str {
        if self.acl_name.is_empty() {
            &self.name
        } else {
            &self.acl_name
        }
    }

    /// Static server host, falling back to the service name.
    pub fn effective_host(&self) -> &str {
        if self.host.is_empty() {
            &self.name
        } else {
            &self.host
        }
    }

    /// Name handed to the discovery facility, falling back to the service name.
    pub fn effective_full_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.name
        } else {
            &self.full_name
        }
    }

    pub fn has_domains(&self) -> bool {
        !self.domains.is_empty()
    }

    /// Reject values that would produce malformed directive names.
    pub fn validate(&self) -> Result<(), StanzaError> {
        let invalid = |reason: String| StanzaError::InvalidService {
            service: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("service name is empty".into()));
        }
        if self.name.contains(char::is_whitespace) {
            return Err(invalid("service name contains whitespace".into()));
        }
        if self.acl_name.contains(char::is_whitespace) {
            return Err(invalid("ACL name contains whitespace".into()));
        }
        for dest in &self.destinations {
            if dest.has_port() && !dest.port.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("port `{}` is not numeric", dest.port)));
            }
        }
        for timeout in [&self.timeout_server, &self.timeout_tunnel] {
            if !timeout.is_empty() && !timeout.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("timeout `{timeout}` is not a number of seconds")));
            }
        }
        for user in &self.users {
            if user.username.is_empty() || user.username.contains(char::is_whitespace) {
                return Err(StanzaError::InvalidUsers {
                    owner: format!("service `{}`", self.name),
                    reason: format!("invalid username `{}`", user.username),
                });
            }
            if user.password.is_empty() {
                return Err(StanzaError::InvalidUsers {
                    owner: format!("service `{}`", self.name),
                    reason: format!("user `{}` has no password", user.username),
                });
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ServiceFile {
    services: Vec<Service>,
}

/// Load service descriptors from a YAML or JSON file with a top-level
/// `services` list.
pub fn load_services(path: &Path) -> Result<Vec<Service>, StanzaError> {
    let raw = std::fs::read_to_string(path)?;
    let file: ServiceFile = serde_yaml::from_str(&raw)?;
    Ok(file.services)
}
