use stanza_template::TemplateError;
use thiserror::Error;

/// Unified error type for Stanza.
#[derive(Error, Debug)]
pub enum StanzaError {
    #[error("Render error in service `{service}`: {source}")]
    Render {
        service: String,
        #[source]
        source: TemplateError,
    },

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("TCP port {port}: more than one service without a domain would be the default backend: {services:?}")]
    DuplicateDefaultBackend { port: u16, services: Vec<String> },

    #[error("ACL name `{acl}` is used by both `{first}` and `{second}`")]
    DuplicateAclName {
        acl: String,
        first: String,
        second: String,
    },

    #[error("Invalid service `{service}`: {reason}")]
    InvalidService { service: String, reason: String },

    #[error("Invalid user list for {owner}: {reason}")]
    InvalidUsers { owner: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StanzaError {
    /// True for input problems detected before rendering started.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StanzaError::DuplicateDefaultBackend { .. }
                | StanzaError::DuplicateAclName { .. }
                | StanzaError::InvalidService { .. }
                | StanzaError::InvalidUsers { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StanzaError>;
