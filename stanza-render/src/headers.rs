use crate::directive::Directive;
use stanza_core::model::HeaderRules;

const FORWARDED_PROTO_ON_TLS: &str = "add-header X-Forwarded-Proto https if { ssl_fc }";

/// Header directives in their fixed category order: forwarded-proto, add
/// request, set request, add response, set response, del request, del
/// response. Entries are passed through verbatim in input order.
pub fn compose(rules: &HeaderRules, x_forwarded_proto: bool) -> Vec<Directive> {
    let mut out = Vec::new();
    if x_forwarded_proto {
        out.push(Directive::http_request(FORWARDED_PROTO_ON_TLS));
    }
    let request = |verb: &str, list: &[String]| {
        list.iter()
            .map(|h| Directive::http_request(format!("{verb} {h}")))
            .collect::<Vec<_>>()
    };
    let response = |verb: &str, list: &[String]| {
        list.iter()
            .map(|h| Directive::http_response(format!("{verb} {h}")))
            .collect::<Vec<_>>()
    };
    out.extend(request("add-header", &rules.add_request));
    out.extend(request("set-header", &rules.set_request));
    out.extend(response("add-header", &rules.add_response));
    out.extend(response("set-header", &rules.set_response));
    out.extend(request("del-header", &rules.del_request));
    out.extend(response("del-header", &rules.del_response));
    out
}
