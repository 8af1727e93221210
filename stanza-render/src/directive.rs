//! Typed intermediate representation of proxy configuration.
//!
//! Builders produce [`Section`]s of [`Directive`]s; only the emitter turns
//! them into text. Deferred server discovery is a structured directive here
//! and becomes template syntax for the external expansion pass at emit time.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    Bind {
        address: String,
    },
    Mode {
        mode: String,
    },
    /// `option <name>`
    #[serde(rename = "option")]
    ProxyOption {
        name: String,
    },
    LogGlobal,
    LogFormat {
        format: String,
    },
    Acl {
        name: String,
        criterion: String,
    },
    UseBackend {
        backend: String,
        conditions: Vec<String>,
    },
    DefaultBackend {
        backend: String,
    },
    Redirect {
        scheme: String,
        conditions: Vec<String>,
    },
    /// `http-request <action>`
    HttpRequest {
        action: String,
    },
    /// `http-response <action>`
    HttpResponse {
        action: String,
    },
    Timeout {
        phase: String,
        seconds: String,
    },
    StaticServer {
        name: String,
        host: String,
        port: String,
        /// Resolver section for health checks, if enabled.
        resolver: Option<String>,
        ssl_verify_none: bool,
    },
    /// One server per instance, expanded later by the discovery facility.
    DeferredDiscoveryServer {
        service_name: String,
        tag: String,
    },
    User {
        name: String,
        password: String,
        encrypted: bool,
    },
    /// Passed through verbatim.
    Raw {
        text: String,
    },
}

impl Directive {
    pub fn acl(name: impl Into<String>, criterion: impl Into<String>) -> Self {
        Directive::Acl {
            name: name.into(),
            criterion: criterion.into(),
        }
    }

    pub fn use_backend(backend: impl Into<String>, conditions: Vec<String>) -> Self {
        Directive::UseBackend {
            backend: backend.into(),
            conditions,
        }
    }

    pub fn http_request(action: impl Into<String>) -> Self {
        Directive::HttpRequest {
            action: action.into(),
        }
    }

    pub fn http_response(action: impl Into<String>) -> Self {
        Directive::HttpResponse {
            action: action.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Frontend,
    Backend,
    Userlist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionHeader {
    pub kind: SectionKind,
    pub name: String,
}

/// A stanza, or a header-less fragment meant for inclusion in a shared one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub header: Option<SectionHeader>,
    pub directives: Vec<Directive>,
}

impl Section {
    fn with_header(kind: SectionKind, name: impl Into<String>) -> Self {
        Self {
            header: Some(SectionHeader {
                kind,
                name: name.into(),
            }),
            directives: Vec::new(),
        }
    }

    pub fn frontend(name: impl Into<String>) -> Self {
        Self::with_header(SectionKind::Frontend, name)
    }

    pub fn backend(name: impl Into<String>) -> Self {
        Self::with_header(SectionKind::Backend, name)
    }

    pub fn userlist(name: impl Into<String>) -> Self {
        Self::with_header(SectionKind::Userlist, name)
    }

    pub fn fragment() -> Self {
        Self {
            header: None,
            directives: Vec::new(),
        }
    }

    pub fn push(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_none() && self.directives.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.name.as_str())
    }

    /// Number of directives matching `pred`.
    pub fn count(&self, pred: impl Fn(&Directive) -> bool) -> usize {
        self.directives.iter().filter(|d| pred(d)).count()
    }
}

impl Extend<Directive> for Section {
    fn extend<T: IntoIterator<Item = Directive>>(&mut self, iter: T) {
        self.directives.extend(iter);
    }
}
