//! Backend stanzas: one per destination, plus an https twin per destination
//! when the service has a TLS port.

use crate::context::{DestinationView, RenderContext};
use crate::directive::{Directive, Section};
use crate::headers;
use stanza_core::config::RenderSettings;
use tracing::debug;

const GLOBAL_USERS: &str = "defaultUsers";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Plain,
    Https,
}

/// All backend sections for a service: plain backends in destination order,
/// then the https twins in the same order.
pub fn build(ctx: &RenderContext<'_>, settings: &RenderSettings) -> Vec<Section> {
    let routable: Vec<&DestinationView<'_>> = ctx
        .destinations
        .iter()
        .filter(|view| {
            if !view.dest.has_port() {
                debug!(service = ctx.name(), index = view.index, "destination has no port, no backend");
            }
            view.dest.has_port()
        })
        .collect();

    let mut sections: Vec<Section> = routable
        .iter()
        .map(|view| build_leg(ctx, view, settings, Leg::Plain))
        .collect();
    if ctx.service.https_port > 0 {
        sections.extend(
            routable
                .iter()
                .map(|view| build_leg(ctx, view, settings, Leg::Https)),
        );
    }
    sections
}

/// `<name>-be<port>` or `https-<name>-be<port>`.
pub fn backend_name(ctx: &RenderContext<'_>, view: &DestinationView<'_>, https: bool) -> String {
    let prefix = if https { "https-" } else { "" };
    format!("{prefix}{}-be{}", ctx.name(), view.dest.port)
}

fn build_leg(
    ctx: &RenderContext<'_>,
    view: &DestinationView<'_>,
    settings: &RenderSettings,
    leg: Leg,
) -> Section {
    let service = ctx.service;
    let name = ctx.name();
    let mut section = Section::backend(backend_name(ctx, view, leg == Leg::Https));

    section.push(Directive::Mode {
        mode: view.mode.clone(),
    });
    if !service.connection_mode.is_empty() {
        section.push(Directive::ProxyOption {
            name: service.connection_mode.clone(),
        });
    }
    if ctx.debug {
        section.push(Directive::LogGlobal);
    }

    section.extend(headers::compose(&service.headers, service.x_forwarded_proto));

    if !service.timeout_server.is_empty() {
        section.push(Directive::Timeout {
            phase: "server".into(),
            seconds: service.timeout_server.clone(),
        });
    }
    if !service.timeout_tunnel.is_empty() {
        section.push(Directive::Timeout {
            phase: "tunnel".into(),
            seconds: service.timeout_tunnel.clone(),
        });
    }
    if !service.path_search.is_empty() {
        section.push(Directive::http_request(format!(
            "set-path %[path,regsub({},{})]",
            service.path_search, service.path_replace
        )));
    }

    if service.proxy_mode.is_static() {
        if view.dest.verify_client_ssl {
            let acl = format!("valid_client_cert_{name}{}", view.dest.port);
            section.push(Directive::acl(acl.clone(), "ssl_c_used ssl_c_verify 0"));
            section.push(Directive::http_request(format!("deny unless {acl}")));
        }
        if service.https_only && leg == Leg::Plain {
            section.push(Directive::Redirect {
                scheme: "https".into(),
                conditions: vec!["!{ ssl_fc }".into()],
            });
        }
        let port = match leg {
            Leg::Plain => view.dest.port.clone(),
            Leg::Https => service.https_port.to_string(),
        };
        section.push(Directive::StaticServer {
            name: name.to_string(),
            host: service.effective_host().to_string(),
            port,
            resolver: service.check_resolvers.then(|| settings.resolver.clone()),
            ssl_verify_none: service.ssl_verify_none,
        });
    } else {
        section.push(Directive::DeferredDiscoveryServer {
            service_name: service.effective_full_name().to_string(),
            tag: settings.discovery_tag.clone(),
        });
    }

    if !view.dest.ignore_authorization {
        section.extend(authorization(ctx));
    }

    if !service.backend_extra.is_empty() {
        section.push(Directive::Raw {
            text: service.backend_extra.clone(),
        });
    }

    section
}

/// Basic-auth challenge pairs for the service and global user lists,
/// followed by a single header strip when either applies.
fn authorization(ctx: &RenderContext<'_>) -> Vec<Directive> {
    let mut out = Vec::new();
    if ctx.has_users() {
        out.extend(challenge(&format!("{}Users", ctx.name()), ctx.name()));
    }
    if ctx.use_global_users {
        out.extend(challenge(GLOBAL_USERS, "default"));
    }
    if !out.is_empty() {
        out.push(Directive::http_request("del-header Authorization"));
    }
    out
}

fn challenge(userlist: &str, prefix: &str) -> [Directive; 2] {
    let acl = format!("{prefix}UsersAcl");
    [
        Directive::acl(acl.clone(), format!("http_auth({userlist})")),
        Directive::http_request(format!("auth realm {prefix}Realm if !{acl}")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use stanza_core::lookup::StaticLookup;
    use stanza_core::model::{Destination, ProxyMode, Service, User};

    fn service() -> Service {
        let mut svc = Service::new("app");
        svc.destinations.push(Destination {
            port: "8080".into(),
            ..Default::default()
        });
        svc
    }

    fn build_with(svc: &Service, lookup: &StaticLookup) -> Vec<Section> {
        let ctx = RenderContext::new(svc, lookup).unwrap();
        build(&ctx, &RenderSettings::default())
    }

    fn user(name: &str) -> User {
        User {
            username: name.into(),
            password: "pw".into(),
            pass_encrypted: false,
        }
    }

    fn is_del_auth(d: &Directive) -> bool {
        *d == Directive::http_request("del-header Authorization")
    }

    #[test]
    fn minimal_static_backend() {
        let sections = build_with(&service(), &StaticLookup::new());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name(), Some("app-be8080"));
        assert_eq!(
            sections[0].directives,
            vec![
                Directive::Mode { mode: "http".into() },
                Directive::StaticServer {
                    name: "app".into(),
                    host: "app".into(),
                    port: "8080".into(),
                    resolver: None,
                    ssl_verify_none: false,
                },
            ]
        );
    }

    #[test]
    fn https_twins_follow_all_plain_backends() {
        let mut svc = service();
        svc.https_port = 8443;
        svc.destinations.push(Destination {
            port: "9090".into(),
            ..Default::default()
        });
        let sections = build_with(&svc, &StaticLookup::new());
        let names: Vec<_> = sections.iter().filter_map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["app-be8080", "app-be9090", "https-app-be8080", "https-app-be9090"]
        );
        let server_port = |s: &Section| {
            s.directives.iter().find_map(|d| match d {
                Directive::StaticServer { port, .. } => Some(port.clone()),
                _ => None,
            })
        };
        assert_eq!(server_port(&sections[1]).as_deref(), Some("9090"));
        assert_eq!(server_port(&sections[3]).as_deref(), Some("8443"));
    }

    #[test]
    fn sni_mode_is_written_as_tcp() {
        let mut svc = Service::new("app");
        svc.destinations.push(Destination {
            mode: "sNi".into(),
            port: "443".into(),
            ..Default::default()
        });
        let sections = build_with(&svc, &StaticLookup::new());
        assert_eq!(sections[0].directives[0], Directive::Mode { mode: "tcp".into() });
    }

    #[test]
    fn destination_without_port_gets_no_backend() {
        let mut svc = service();
        svc.destinations.push(Destination::default());
        assert_eq!(build_with(&svc, &StaticLookup::new()).len(), 1);
    }

    #[test]
    fn optional_directives_in_order() {
        let mut svc = service();
        svc.connection_mode = "http-server-close".into();
        svc.debug = true;
        svc.x_forwarded_proto = true;
        svc.timeout_server = "0".into();
        svc.timeout_tunnel = "3600".into();
        svc.path_search = "^/api/(.*)".into();
        svc.path_replace = "/\\1".into();
        svc.host = "10.0.0.5".into();
        svc.check_resolvers = true;
        svc.ssl_verify_none = true;
        svc.backend_extra = "http-request set-var(txn.a) str(b)".into();
        let sections = build_with(&svc, &StaticLookup::new());
        assert_eq!(
            sections[0].directives,
            vec![
                Directive::Mode { mode: "http".into() },
                Directive::ProxyOption { name: "http-server-close".into() },
                Directive::LogGlobal,
                Directive::http_request("add-header X-Forwarded-Proto https if { ssl_fc }"),
                Directive::Timeout { phase: "server".into(), seconds: "0".into() },
                Directive::Timeout { phase: "tunnel".into(), seconds: "3600".into() },
                Directive::http_request("set-path %[path,regsub(^/api/(.*),/\\1)]"),
                Directive::StaticServer {
                    name: "app".into(),
                    host: "10.0.0.5".into(),
                    port: "8080".into(),
                    resolver: Some("docker".into()),
                    ssl_verify_none: true,
                },
                Directive::Raw { text: "http-request set-var(txn.a) str(b)".into() },
            ]
        );
    }

    #[test]
    fn client_cert_on_both_legs_https_redirect_on_plain_only() {
        let mut svc = service();
        svc.https_port = 443;
        svc.https_only = true;
        svc.destinations[0].verify_client_ssl = true;
        let sections = build_with(&svc, &StaticLookup::new());
        for section in &sections {
            assert!(section.directives.contains(&Directive::acl(
                "valid_client_cert_app8080",
                "ssl_c_used ssl_c_verify 0"
            )));
            assert!(section
                .directives
                .contains(&Directive::http_request("deny unless valid_client_cert_app8080")));
        }
        let is_redirect = |d: &Directive| matches!(d, Directive::Redirect { .. });
        assert_eq!(sections[0].count(is_redirect), 1);
        assert_eq!(sections[1].count(is_redirect), 0);
    }

    #[test]
    fn dynamic_mode_defers_server_discovery() {
        let mut svc = service();
        svc.proxy_mode = ProxyMode::Other("consul".into());
        svc.full_name = "app.stack".into();
        svc.destinations[0].verify_client_ssl = true;
        let sections = build_with(&svc, &StaticLookup::new());
        let directives = &sections[0].directives;
        assert!(directives.contains(&Directive::DeferredDiscoveryServer {
            service_name: "app.stack".into(),
            tag: "any".into(),
        }));
        assert_eq!(sections[0].count(|d| matches!(d, Directive::StaticServer { .. })), 0);
        assert_eq!(sections[0].count(|d| matches!(d, Directive::Acl { .. })), 0);
    }

    #[test]
    fn service_users_only() {
        let mut svc = service();
        svc.users = vec![user("alice")];
        let sections = build_with(&svc, &StaticLookup::new());
        let d = &sections[0];
        assert!(d.directives.contains(&Directive::acl("appUsersAcl", "http_auth(appUsers)")));
        assert!(d
            .directives
            .contains(&Directive::http_request("auth realm appRealm if !appUsersAcl")));
        assert_eq!(d.count(|d| matches!(d, Directive::Acl { .. })), 1);
        assert_eq!(d.count(is_del_auth), 1);
    }

    #[test]
    fn service_and_global_users() {
        let mut svc = service();
        svc.users = vec![user("alice")];
        let lookup = StaticLookup::new().with("USERS", "bob:pw");
        let sections = build_with(&svc, &lookup);
        let d = &sections[0];
        assert_eq!(d.count(|d| matches!(d, Directive::Acl { .. })), 2);
        assert!(d
            .directives
            .contains(&Directive::acl("defaultUsersAcl", "http_auth(defaultUsers)")));
        assert!(d
            .directives
            .contains(&Directive::http_request("auth realm defaultRealm if !defaultUsersAcl")));
        assert_eq!(d.count(is_del_auth), 1);
    }

    #[test]
    fn ignore_authorization_skips_auth() {
        let mut svc = service();
        svc.users = vec![user("alice")];
        svc.destinations[0].ignore_authorization = true;
        let lookup = StaticLookup::new().with("USERS", "bob:pw");
        let sections = build_with(&svc, &lookup);
        assert_eq!(sections[0].count(|d| matches!(d, Directive::Acl { .. })), 0);
        assert_eq!(sections[0].count(is_del_auth), 0);
    }
}
