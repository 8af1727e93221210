use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// How a domain ACL compares the `Host` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainFunction {
    /// Exact header match (`hdr`).
    #[serde(rename = "hdr")]
    Exact,
    /// Domain and any sub-domain (`hdr_dom`).
    #[serde(rename = "hdr_dom")]
    DomainSuffix,
    /// Suffix match for wildcard entries (`hdr_end`).
    #[serde(rename = "hdr_end")]
    WildcardSuffix,
}

impl DomainFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainFunction::Exact => "hdr",
            DomainFunction::DomainSuffix => "hdr_dom",
            DomainFunction::WildcardSuffix => "hdr_end",
        }
    }
}

impl fmt::Display for DomainFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a service's domain list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMatch {
    pub function: DomainFunction,
    /// Domains with wildcard markers removed.
    pub domains: Vec<String>,
}

/// Decide the domain match function for a service.
///
/// `match_all` always yields [`DomainFunction::DomainSuffix`] and leaves the
/// entries untouched. Otherwise any entry starting with `*` is stripped of
/// its marker (`*.example.com` becomes `example.com`) and the whole list is
/// matched with [`DomainFunction::WildcardSuffix`]; the function never goes
/// back to exact matching once a wildcard was seen, whatever the entry order.
pub fn classify(domains: &[String], match_all: bool) -> DomainMatch {
    if match_all {
        return DomainMatch {
            function: DomainFunction::DomainSuffix,
            domains: domains.to_vec(),
        };
    }

    let mut function = DomainFunction::Exact;
    let mut cleaned = Vec::with_capacity(domains.len());
    for domain in domains {
        let Some(rest) = domain.strip_prefix('*') else {
            cleaned.push(domain.clone());
            continue;
        };
        function = DomainFunction::WildcardSuffix;
        let rest = rest.trim_start_matches('*');
        let rest = rest.strip_prefix('.').unwrap_or(rest);
        if rest.is_empty() {
            warn!(domain = %domain, "Dropping wildcard domain without a suffix");
            continue;
        }
        cleaned.push(rest.to_string());
    }

    DomainMatch {
        function,
        domains: cleaned,
    }
}
