//! Layer-4 frontends, one per listening port.

use crate::context::{DestinationView, RenderContext};
use crate::directive::{Directive, Section};
use stanza_core::error::StanzaError;
use stanza_core::model::Service;
use std::collections::BTreeMap;
use tracing::debug;

/// Group services by the source port of their tcp/sni destinations.
///
/// Each grouped service keeps only the destinations listening on that port,
/// so a service spanning two ports appears in both groups. Destinations
/// without a backend port get no backend and are left out.
pub fn group_by_src_port(services: &[Service]) -> BTreeMap<u16, Vec<Service>> {
    let mut groups: BTreeMap<u16, Vec<Service>> = BTreeMap::new();
    for service in services {
        let mut ports: Vec<u16> = service
            .destinations
            .iter()
            .filter(|d| d.is_passthrough() && d.has_port())
            .filter_map(|d| d.src_port)
            .collect();
        ports.sort_unstable();
        ports.dedup();

        for port in ports {
            let mut grouped = service.clone();
            grouped.destinations.retain(|d| {
                d.is_passthrough() && d.has_port() && d.src_port == Some(port)
            });
            groups.entry(port).or_default().push(grouped);
        }
    }
    groups
}

/// Order a port group by (service name, ACL name), with destination ports
/// breaking any remaining tie.
pub fn sort_group<'c, 'a>(contexts: &'c [RenderContext<'a>]) -> Vec<&'c RenderContext<'a>> {
    let mut sorted: Vec<_> = contexts.iter().collect();
    sorted.sort_by_cached_key(|ctx| {
        let ports: Vec<&str> = ctx.destinations.iter().map(|v| v.dest.port.as_str()).collect();
        (ctx.name(), ctx.acl_name, ports)
    });
    sorted
}

/// Destinations that get a backend and can therefore be routed to.
fn routed<'c, 'a>(ctx: &'c RenderContext<'a>) -> impl Iterator<Item = &'c DestinationView<'a>> {
    ctx.destinations.iter().filter(|v| v.dest.has_port())
}

/// Reject a group that would route unmatched traffic to more than one backend.
pub fn validate(port: u16, contexts: &[RenderContext<'_>]) -> Result<(), StanzaError> {
    let mut defaults: Vec<String> = Vec::new();
    let mut emitted = 0usize;
    for ctx in sort_group(contexts) {
        let count = routed(ctx).count();
        if ctx.has_domains() || count == 0 {
            continue;
        }
        emitted += count;
        defaults.push(ctx.name().to_string());
    }
    if emitted > 1 {
        return Err(StanzaError::DuplicateDefaultBackend {
            port,
            services: defaults,
        });
    }
    Ok(())
}

/// Build `frontend tcpFE_<port>` for a validated group.
pub fn build(port: u16, contexts: &[RenderContext<'_>]) -> Result<Section, StanzaError> {
    validate(port, contexts)?;
    let sorted = sort_group(contexts);

    let mut section = Section::frontend(format!("tcpFE_{port}"));
    section.push(Directive::Bind {
        address: format!("*:{port}"),
    });
    section.push(Directive::Mode { mode: "tcp".into() });

    if let Some(first) = sorted.first() {
        if first.debug {
            section.push(Directive::ProxyOption {
                name: "tcplog".into(),
            });
            section.push(Directive::LogGlobal);
            if !first.log_format.is_empty() {
                section.push(Directive::LogFormat {
                    format: first.log_format.clone(),
                });
            }
        }
    }

    for ctx in sorted {
        let name = ctx.name();
        if routed(ctx).next().is_none() {
            continue;
        }
        if ctx.has_domains() {
            section.push(Directive::acl(
                ctx.domain_acl(),
                format!("{}(host) -i {}", ctx.domain.function, ctx.domain.domains.join(" ")),
            ));
            for view in routed(ctx) {
                section.push(Directive::use_backend(
                    format!("{name}-be{}", view.dest.port),
                    vec![ctx.domain_acl()],
                ));
            }
        } else {
            for view in routed(ctx) {
                section.push(Directive::DefaultBackend {
                    backend: format!("{name}-be{}", view.dest.port),
                });
            }
        }
    }

    debug!(port, directives = section.directives.len(), "built tcp frontend");
    Ok(section)
}
