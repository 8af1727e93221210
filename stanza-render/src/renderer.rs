use crate::context::RenderContext;
use crate::directive::Section;
use crate::emit::Emitter;
use crate::{backend, frontend, tcp, userlist};
use stanza_core::config::RenderSettings;
use stanza_core::error::StanzaError;
use stanza_core::lookup::SecretLookup;
use stanza_core::model::Service;
use stanza_template::TemplateError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Rendered configuration text, split by destination in the proxy file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedConfig {
    /// Rules to splice into the shared HTTP/HTTPS frontend.
    pub http_frontend: String,
    pub tcp_frontends: String,
    pub backends: String,
    pub userlists: String,
}

impl RenderedConfig {
    /// Non-empty parts joined by blank lines, with a trailing newline.
    pub fn to_config_text(&self) -> String {
        let parts: Vec<&str> = [
            &self.http_frontend,
            &self.tcp_frontends,
            &self.backends,
            &self.userlists,
        ]
        .into_iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();
        if parts.is_empty() {
            return String::new();
        }
        let mut text = parts.join("\n\n");
        text.push('\n');
        text
    }
}

/// Entry point tying the builders to the emitter.
///
/// All directive templates are compiled once in [`Renderer::new`]; a
/// renderer can then be shared across threads and reused for any number of
/// render passes.
pub struct Renderer {
    settings: RenderSettings,
    lookup: Arc<dyn SecretLookup>,
    emitter: Emitter,
}

impl Renderer {
    pub fn new(settings: RenderSettings, lookup: Arc<dyn SecretLookup>) -> Result<Self, StanzaError> {
        let emitter = Emitter::new()?;
        Ok(Self {
            settings,
            lookup,
            emitter,
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn context<'a>(&self, service: &'a Service) -> Result<RenderContext<'a>, StanzaError> {
        RenderContext::new(service, self.lookup.as_ref())
    }

    /// Frontend rules for one service.
    pub fn http_frontend(&self, service: &Service) -> Result<String, StanzaError> {
        let ctx = self.context(service)?;
        let section = frontend::build(&ctx, &self.settings);
        self.emit(service.name.as_str(), std::slice::from_ref(&section))
    }

    /// `frontend tcpFE_<port>` for one port group.
    pub fn tcp_frontend(&self, port: u16, services: &[Service]) -> Result<String, StanzaError> {
        let contexts = self.contexts(services)?;
        let section = tcp::build(port, &contexts)?;
        self.emit(&format!("tcpFE_{port}"), std::slice::from_ref(&section))
    }

    /// Backend stanzas for one service.
    pub fn backends(&self, service: &Service) -> Result<String, StanzaError> {
        let ctx = self.context(service)?;
        self.emit(&service.name, &backend::build(&ctx, &self.settings))
    }

    /// The service's own user list, or an empty string.
    pub fn userlist(&self, service: &Service) -> Result<String, StanzaError> {
        let ctx = self.context(service)?;
        let sections: Vec<Section> = userlist::service_users(&ctx).into_iter().collect();
        self.emit(&service.name, &sections)
    }

    /// Render every part of the configuration.
    ///
    /// All input is validated before anything is emitted, so an error never
    /// comes with partial output.
    pub fn render(
        &self,
        services: &[Service],
        tcp_groups: &BTreeMap<u16, Vec<Service>>,
    ) -> Result<RenderedConfig, StanzaError> {
        let contexts = self.contexts(services)?;
        check_acl_names(&contexts)?;

        let mut tcp_sections = Vec::with_capacity(tcp_groups.len());
        for (&port, group) in tcp_groups {
            let group_contexts = self.contexts(group)?;
            tcp_sections.push((port, tcp::build(port, &group_contexts)?));
        }

        let global_users = userlist::global_users(self.lookup.as_ref())?;

        let mut http_frontend = Vec::new();
        let mut backends = Vec::new();
        let mut userlists = Vec::new();
        if let Some(section) = &global_users {
            userlists.push(self.emit("defaultUsers", std::slice::from_ref(section))?);
        }

        for ctx in &contexts {
            let name = ctx.name();
            let rules = self.emit(name, &[frontend::build(ctx, &self.settings)])?;
            if !rules.is_empty() {
                http_frontend.push(rules);
            }

            let sections = backend::build(ctx, &self.settings);
            debug!(service = name, backends = sections.len(), "rendered backends");
            let text = self.emit(name, &sections)?;
            if !text.is_empty() {
                backends.push(text);
            }

            if let Some(section) = userlist::service_users(ctx) {
                userlists.push(self.emit(name, &[section])?);
            }
        }

        let tcp_frontends = tcp_sections
            .iter()
            .map(|(port, section)| self.emit(&format!("tcpFE_{port}"), std::slice::from_ref(section)))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            services = contexts.len(),
            tcp_ports = tcp_sections.len(),
            global_users = global_users.is_some(),
            "rendered proxy configuration"
        );

        Ok(RenderedConfig {
            http_frontend: http_frontend.join("\n"),
            tcp_frontends: tcp_frontends.join("\n\n"),
            backends: backends.join("\n\n"),
            userlists: userlists.join("\n\n"),
        })
    }

    fn contexts<'a>(&self, services: &'a [Service]) -> Result<Vec<RenderContext<'a>>, StanzaError> {
        services.iter().map(|s| self.context(s)).collect()
    }

    fn emit(&self, owner: &str, sections: &[Section]) -> Result<String, StanzaError> {
        self.emitter
            .sections(sections)
            .map_err(|source: TemplateError| StanzaError::Render {
                service: owner.to_string(),
                source,
            })
    }
}

/// Two services sharing an ACL prefix would declare the same ACL twice.
fn check_acl_names(contexts: &[RenderContext<'_>]) -> Result<(), StanzaError> {
    let mut seen: HashMap<&str, &str> = HashMap::with_capacity(contexts.len());
    for ctx in contexts {
        if let Some(first) = seen.insert(ctx.acl_name, ctx.name()) {
            return Err(StanzaError::DuplicateAclName {
                acl: ctx.acl_name.to_string(),
                first: first.to_string(),
                second: ctx.name().to_string(),
            });
        }
    }
    Ok(())
}
