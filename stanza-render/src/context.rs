use crate::userlist;
use stanza_core::domain::{self, DomainMatch};
use stanza_core::error::StanzaError;
use stanza_core::lookup::{self, SecretLookup};
use stanza_core::model::{self, Destination, Service};

/// Everything the builders derive from a service, computed once.
///
/// Built from a borrowed [`Service`] without touching it, so the same
/// service value can be rendered from several threads at once.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    pub service: &'a Service,
    pub acl_name: &'a str,
    pub domain: DomainMatch,
    pub destinations: Vec<DestinationView<'a>>,
    /// The global basic-auth user list has at least one user.
    pub use_global_users: bool,
    pub debug: bool,
    pub log_format: String,
}

/// A destination with its derived fields.
#[derive(Debug, Clone)]
pub struct DestinationView<'a> {
    pub index: usize,
    pub dest: &'a Destination,
    /// Mode as written to the backend (`sni` becomes `tcp`, lowercased).
    pub mode: String,
    /// Name of the `dst_port` ACL when the destination has a source port.
    pub src_port_acl: Option<String>,
}

impl<'a> RenderContext<'a> {
    pub fn new(service: &'a Service, lookup: &dyn SecretLookup) -> Result<Self, StanzaError> {
        service.validate()?;
        let global_users = userlist::parse_users(&lookup.lookup(lookup::USERS), false)?;

        let destinations = service
            .destinations
            .iter()
            .enumerate()
            .map(|(index, dest)| DestinationView {
                index,
                dest,
                mode: model::format_mode(&dest.mode),
                src_port_acl: dest
                    .src_port
                    .map(|_| format!("srcPort_{}{}", service.name, index)),
            })
            .collect();

        let log_format = if service.log_format.is_empty() {
            lookup.lookup(lookup::DEBUG_TCP_FORMAT)
        } else {
            service.log_format.clone()
        };

        Ok(Self {
            service,
            acl_name: service.effective_acl_name(),
            domain: domain::classify(&service.domains, service.domain_match_all),
            destinations,
            use_global_users: !global_users.is_empty(),
            debug: service.debug || lookup.flag(lookup::DEBUG),
            log_format,
        })
    }

    pub fn name(&self) -> &'a str {
        &self.service.name
    }

    /// HTTP destinations that have a port and therefore get routed.
    pub fn http_routes(&self) -> impl Iterator<Item = &DestinationView<'a>> {
        self.destinations
            .iter()
            .filter(|v| v.dest.is_http() && v.dest.has_port())
    }

    pub fn has_domains(&self) -> bool {
        !self.domain.domains.is_empty()
    }

    pub fn domain_acl(&self) -> String {
        format!("domain_{}", self.acl_name)
    }

    pub fn has_users(&self) -> bool {
        !self.service.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stanza_core::domain::DomainFunction;
    use stanza_core::lookup::StaticLookup;

    fn service() -> Service {
        let mut svc = Service::new("app");
        svc.domains = vec!["*.example.com".into()];
        svc.destinations = vec![
            Destination {
                mode: "SNI".into(),
                port: "9000".into(),
                src_port: Some(9443),
                ..Default::default()
            },
            Destination {
                port: "8080".into(),
                ..Default::default()
            },
            Destination::default(),
        ];
        svc
    }

    #[test]
    fn derives_fields_without_mutating_the_service() {
        let svc = service();
        let before = svc.clone();
        let ctx = RenderContext::new(&svc, &StaticLookup::new()).unwrap();
        assert_eq!(ctx.domain.function, DomainFunction::WildcardSuffix);
        assert_eq!(ctx.domain.domains, vec!["example.com"]);
        assert_eq!(ctx.destinations[0].mode, "tcp");
        assert_eq!(ctx.destinations[1].mode, "http");
        assert_eq!(svc, before);
    }

    #[test]
    fn src_port_acl_is_named_by_service_and_index() {
        let svc = service();
        let ctx = RenderContext::new(&svc, &StaticLookup::new()).unwrap();
        assert_eq!(ctx.destinations[0].src_port_acl.as_deref(), Some("srcPort_app0"));
        assert_eq!(ctx.destinations[1].src_port_acl, None);
    }

    #[test]
    fn only_http_destinations_with_ports_are_routes() {
        let svc = service();
        let ctx = RenderContext::new(&svc, &StaticLookup::new()).unwrap();
        let routes: Vec<usize> = ctx.http_routes().map(|v| v.index).collect();
        assert_eq!(routes, vec![1]);
    }

    #[test]
    fn lookup_drives_global_users_and_debug() {
        let svc = service();
        let lookup = StaticLookup::new()
            .with("USERS", "admin:pw")
            .with("DEBUG", "TRUE")
            .with("DEBUG_TCP_FORMAT", "%ci:%cp");
        let ctx = RenderContext::new(&svc, &lookup).unwrap();
        assert!(ctx.use_global_users);
        assert!(ctx.debug);
        assert_eq!(ctx.log_format, "%ci:%cp");

        let ctx = RenderContext::new(&svc, &StaticLookup::new()).unwrap();
        assert!(!ctx.use_global_users);
        assert!(!ctx.debug);
        assert!(ctx.log_format.is_empty());
    }

    #[test]
    fn users_value_without_entries_is_not_a_global_list() {
        let svc = service();
        for raw in [",", " , ", "  "] {
            let lookup = StaticLookup::new().with("USERS", raw);
            let ctx = RenderContext::new(&svc, &lookup).unwrap();
            assert!(!ctx.use_global_users, "{raw:?}");
        }
    }

    #[test]
    fn malformed_users_value_is_rejected() {
        let svc = service();
        let lookup = StaticLookup::new().with("USERS", "admin");
        let err = RenderContext::new(&svc, &lookup).unwrap_err();
        assert!(matches!(err, StanzaError::InvalidUsers { .. }));
    }

    #[test]
    fn uppercase_modes_are_lowercased() {
        let mut svc = service();
        svc.destinations[1].mode = "HTTP".into();
        let ctx = RenderContext::new(&svc, &StaticLookup::new()).unwrap();
        assert_eq!(ctx.destinations[1].mode, "http");
        assert!(ctx.http_routes().any(|v| v.index == 1));
    }

    #[test]
    fn service_log_format_wins_over_lookup() {
        let mut svc = service();
        svc.log_format = "custom".into();
        let lookup = StaticLookup::new().with("DEBUG_TCP_FORMAT", "fallback");
        let ctx = RenderContext::new(&svc, &lookup).unwrap();
        assert_eq!(ctx.log_format, "custom");
    }

    #[test]
    fn invalid_service_is_rejected() {
        let svc = Service::new("");
        assert!(RenderContext::new(&svc, &StaticLookup::new()).is_err());
    }
}
