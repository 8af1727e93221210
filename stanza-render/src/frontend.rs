//! Rules a service contributes to the shared HTTP/HTTPS frontend.

use crate::context::{DestinationView, RenderContext};
use crate::directive::{Directive, Section};
use stanza_core::config::RenderSettings;

/// Build the header-less fragment of ACLs and routing rules for one service.
///
/// ACLs are declared before any rule uses them, and rules follow the
/// order of the service's destinations.
pub fn build(ctx: &RenderContext<'_>, settings: &RenderSettings) -> Section {
    let mut section = Section::fragment();
    let name = ctx.name();
    let https_split = ctx.service.https_port > 0;

    for view in ctx.destinations.iter().filter(|v| v.dest.is_http()) {
        if view.dest.has_port() {
            section.push(Directive::acl(url_acl(ctx, view), path_criterion(view, settings)));
            if let (Some(acl), Some(port)) = (&view.src_port_acl, view.dest.src_port) {
                section.push(Directive::acl(acl.clone(), format!("dst_port {port}")));
            }
        }
        if let Some(acl) = user_agent_acl(ctx, view) {
            let values = view.dest.user_agent.values.join(" ");
            section.push(Directive::acl(acl, format!("hdr_sub(User-Agent) -i {values}")));
        }
    }

    if ctx.has_domains() {
        section.push(Directive::acl(
            ctx.domain_acl(),
            format!("{}(host) -i {}", ctx.domain.function, ctx.domain.domains.join(" ")),
        ));
    }

    if https_split {
        section.push(Directive::acl(
            format!("http_{name}"),
            format!("src_port {}", settings.http_src_port),
        ));
        section.push(Directive::acl(
            format!("https_{name}"),
            format!("src_port {}", settings.https_src_port),
        ));
    }

    if ctx.service.redirect_when_http_proto && ctx.http_routes().next().is_some() {
        let proto_acl = format!("is_{}_http", ctx.acl_name);
        section.push(Directive::acl(proto_acl.clone(), "hdr(X-Forwarded-Proto) http"));
        for view in ctx.http_routes() {
            let mut conditions = vec![proto_acl.clone()];
            conditions.extend(route_conditions(ctx, view));
            section.push(Directive::Redirect {
                scheme: "https".into(),
                conditions,
            });
        }
    }

    for view in ctx.http_routes() {
        let port = &view.dest.port;
        let user_agent = user_agent_acl(ctx, view);

        let mut conditions = route_conditions(ctx, view);
        if https_split {
            conditions.push(format!("http_{name}"));
        }
        conditions.extend(user_agent.clone());
        section.push(Directive::use_backend(format!("{name}-be{port}"), conditions));

        if https_split {
            let mut conditions = vec![url_acl(ctx, view)];
            if ctx.has_domains() {
                conditions.push(ctx.domain_acl());
            }
            conditions.push(format!("https_{name}"));
            conditions.extend(user_agent);
            section.push(Directive::use_backend(format!("https-{name}-be{port}"), conditions));
        }

        if ctx.service.default_backend {
            section.push(Directive::DefaultBackend {
                backend: format!("{name}-be{port}"),
            });
        }
    }

    section
}

fn url_acl(ctx: &RenderContext<'_>, view: &DestinationView<'_>) -> String {
    format!("url_{}{}", ctx.acl_name, view.dest.port)
}

/// `<match fn> <path>...`; a destination without paths matches everything.
fn path_criterion(view: &DestinationView<'_>, settings: &RenderSettings) -> String {
    let path_type = if view.dest.path_type.is_empty() {
        settings.default_path_type.as_str()
    } else {
        view.dest.path_type.as_str()
    };
    let paths = if view.dest.paths.is_empty() {
        "/".to_string()
    } else {
        view.dest.paths.join(" ")
    };
    format!("{path_type} {paths}")
}

fn user_agent_acl(ctx: &RenderContext<'_>, view: &DestinationView<'_>) -> Option<String> {
    let ua = &view.dest.user_agent;
    if ua.values.is_empty() {
        return None;
    }
    let suffix = if ua.acl_name.is_empty() {
        view.index.to_string()
    } else {
        ua.acl_name.clone()
    };
    Some(format!("user_agent_{}_{}", ctx.acl_name, suffix))
}

/// url ACL, then the domain ACL and source-port ACL when present.
fn route_conditions(ctx: &RenderContext<'_>, view: &DestinationView<'_>) -> Vec<String> {
    let mut conditions = vec![url_acl(ctx, view)];
    if ctx.has_domains() {
        conditions.push(ctx.domain_acl());
    }
    conditions.extend(view.src_port_acl.clone());
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use stanza_core::lookup::StaticLookup;
    use stanza_core::model::{Destination, Service, UserAgent};

    fn http_dest(port: &str, paths: &[&str]) -> Destination {
        Destination {
            port: port.into(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    fn build_for(svc: &Service) -> Section {
        let ctx = RenderContext::new(svc, &StaticLookup::new()).unwrap();
        build(&ctx, &RenderSettings::default())
    }

    fn use_backends(section: &Section) -> Vec<(String, Vec<String>)> {
        section
            .directives
            .iter()
            .filter_map(|d| match d {
                Directive::UseBackend {
                    backend,
                    conditions,
                } => Some((backend.clone(), conditions.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn single_destination_with_default_backend() {
        let mut svc = Service::new("app");
        svc.default_backend = true;
        svc.destinations.push(http_dest("8080", &["/api"]));
        let section = build_for(&svc);
        assert_eq!(
            section.directives,
            vec![
                Directive::acl("url_app8080", "path_beg /api"),
                Directive::use_backend("app-be8080", vec!["url_app8080".into()]),
                Directive::DefaultBackend {
                    backend: "app-be8080".into()
                },
            ]
        );
    }

    #[test]
    fn custom_path_type_and_multiple_paths() {
        let mut svc = Service::new("app");
        let mut dest = http_dest("80", &["/a", "/b"]);
        dest.path_type = "path_reg".into();
        svc.destinations.push(dest);
        let section = build_for(&svc);
        assert_eq!(section.directives[0], Directive::acl("url_app80", "path_reg /a /b"));
    }

    #[test]
    fn destinations_without_port_or_non_http_are_not_routed() {
        let mut svc = Service::new("app");
        svc.destinations.push(http_dest("", &["/x"]));
        svc.destinations.push(Destination {
            mode: "tcp".into(),
            port: "5432".into(),
            ..Default::default()
        });
        assert!(build_for(&svc).directives.is_empty());
    }

    #[test]
    fn user_agent_acl_appears_only_when_filtered() {
        let mut svc = Service::new("app");
        let mut dest = http_dest("80", &["/"]);
        dest.user_agent = UserAgent {
            acl_name: "mobile".into(),
            values: vec!["android".into(), "iphone".into()],
        };
        svc.destinations.push(dest);
        let section = build_for(&svc);
        assert!(section.directives.contains(&Directive::acl(
            "user_agent_app_mobile",
            "hdr_sub(User-Agent) -i android iphone"
        )));
        assert_eq!(
            use_backends(&section),
            vec![(
                "app-be80".to_string(),
                vec!["url_app80".to_string(), "user_agent_app_mobile".to_string()]
            )]
        );

        svc.destinations[0].user_agent.values.clear();
        let section = build_for(&svc);
        assert_eq!(section.count(|d| matches!(d, Directive::Acl { name, .. } if name.starts_with("user_agent"))), 0);
        assert_eq!(use_backends(&section)[0].1, vec!["url_app80".to_string()]);
    }

    #[test]
    fn domain_acl_is_shared_across_destinations() {
        let mut svc = Service::new("app");
        svc.acl_name = "web".into();
        svc.domains = vec!["*.example.com".into()];
        svc.destinations.push(http_dest("80", &["/"]));
        svc.destinations.push(http_dest("81", &["/"]));
        let section = build_for(&svc);
        let domain_acls = section.count(|d| matches!(d, Directive::Acl { name, .. } if name == "domain_web"));
        assert_eq!(domain_acls, 1);
        assert!(section
            .directives
            .contains(&Directive::acl("domain_web", "hdr_end(host) -i example.com")));
        for (_, conditions) in use_backends(&section) {
            assert!(conditions.contains(&"domain_web".to_string()));
        }
    }

    #[test]
    fn https_split_emits_two_gated_rules_per_destination() {
        let mut svc = Service::new("app");
        svc.https_port = 8443;
        let mut dest = http_dest("8080", &["/"]);
        dest.user_agent = UserAgent {
            acl_name: "bot".into(),
            values: vec!["curl".into()],
        };
        svc.destinations.push(dest);
        let section = build_for(&svc);

        assert!(section.directives.contains(&Directive::acl("http_app", "src_port 80")));
        assert!(section.directives.contains(&Directive::acl("https_app", "src_port 443")));
        assert_eq!(
            use_backends(&section),
            vec![
                (
                    "app-be8080".to_string(),
                    vec![
                        "url_app8080".to_string(),
                        "http_app".to_string(),
                        "user_agent_app_bot".to_string()
                    ]
                ),
                (
                    "https-app-be8080".to_string(),
                    vec![
                        "url_app8080".to_string(),
                        "https_app".to_string(),
                        "user_agent_app_bot".to_string()
                    ]
                ),
            ]
        );
    }

    #[test]
    fn redirect_on_forwarded_proto() {
        let mut svc = Service::new("app");
        svc.redirect_when_http_proto = true;
        svc.domains = vec!["a.com".into()];
        svc.destinations.push(http_dest("80", &["/"]));
        let section = build_for(&svc);
        assert!(section
            .directives
            .contains(&Directive::acl("is_app_http", "hdr(X-Forwarded-Proto) http")));
        assert!(section.directives.contains(&Directive::Redirect {
            scheme: "https".into(),
            conditions: vec!["is_app_http".into(), "url_app80".into(), "domain_app".into()],
        }));
    }

    #[test]
    fn source_port_acl_gates_rules() {
        let mut svc = Service::new("app");
        let mut dest = http_dest("80", &["/"]);
        dest.src_port = Some(8081);
        svc.destinations.push(dest);
        let section = build_for(&svc);
        assert_eq!(section.directives[1], Directive::acl("srcPort_app0", "dst_port 8081"));
        assert_eq!(
            use_backends(&section)[0].1,
            vec!["url_app80".to_string(), "srcPort_app0".to_string()]
        );
    }

    #[test]
    fn acls_precede_rules() {
        let mut svc = Service::new("app");
        svc.https_port = 443;
        svc.redirect_when_http_proto = true;
        svc.domains = vec!["a.com".into()];
        svc.destinations.push(http_dest("80", &["/"]));
        svc.destinations.push(http_dest("81", &["/"]));
        let section = build_for(&svc);
        let last_acl = section
            .directives
            .iter()
            .rposition(|d| matches!(d, Directive::Acl { .. }))
            .unwrap();
        let first_rule = section
            .directives
            .iter()
            .position(|d| !matches!(d, Directive::Acl { .. }))
            .unwrap();
        assert!(last_acl < first_rule);
    }
}
