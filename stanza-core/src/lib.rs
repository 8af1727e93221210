pub mod config;
pub mod domain;
pub mod error;
pub mod lookup;
pub mod model;

pub use config::{RenderSettings, StanzaConfig};
pub use domain::{DomainFunction, DomainMatch};
pub use error::StanzaError;
pub use lookup::{EnvLookup, SecretLookup, StaticLookup};
pub use model::{Destination, HeaderRules, ProxyMode, Service, User, UserAgent};
