//! Final pass: serializes directives through the template engine.

use crate::directive::{Directive, Section};
use serde_json::Value;
use stanza_template::{Template, TemplateError};
use std::collections::HashMap;

const INDENT: &str = "    ";

const HEADER_TEMPLATE: &str = "{{.kind}} {{.name}}";

/// One template per directive kind, keyed by the serialized `kind` tag.
const DIRECTIVE_TEMPLATES: &[(&str, &str)] = &[
    ("bind", "bind {{.address}}"),
    ("mode", "mode {{.mode}}"),
    ("option", "option {{.name}}"),
    ("log_global", "log global"),
    ("log_format", "log-format {{.format}}"),
    ("acl", "acl {{.name}} {{.criterion}}"),
    (
        "use_backend",
        "use_backend {{.backend}}{{if .conditions}} if{{range .conditions}} {{.}}{{end}}{{end}}",
    ),
    ("default_backend", "default_backend {{.backend}}"),
    (
        "redirect",
        "redirect scheme {{.scheme}}{{if .conditions}} if{{range .conditions}} {{.}}{{end}}{{end}}",
    ),
    ("http_request", "http-request {{.action}}"),
    ("http_response", "http-response {{.action}}"),
    ("timeout", "timeout {{.phase}} {{.seconds}}s"),
    (
        "static_server",
        "server {{.name}} {{.host}}:{{.port}}
        {{- if .resolver}} check resolvers {{.resolver}}{{end}}
        {{- if .ssl_verify_none}} ssl verify none{{end}}",
    ),
    (
        "deferred_discovery_server",
        r#"{{"{{"}}range $i, $e := service "{{.service_name}}" "{{.tag}}"{{"}}"}}
    server {{"{{$e.Node}}_{{$i}}_{{$e.Port}} {{$e.Address}}:{{$e.Port}}"}}
    {{"{{end}}"}}"#,
    ),
    (
        "user",
        "user {{.name}} {{if .encrypted}}password{{else}}insecure-password{{end}} {{.password}}",
    ),
    ("raw", "{{.text}}"),
];

/// Compiled directive templates.
#[derive(Debug, Clone)]
pub struct Emitter {
    header: Template,
    directives: HashMap<&'static str, Template>,
}

impl Emitter {
    /// Parse every directive template. Fails only on a defect in the
    /// built-in template text.
    pub fn new() -> Result<Self, TemplateError> {
        let header = Template::parse("section_header", HEADER_TEMPLATE)?;
        let directives = DIRECTIVE_TEMPLATES
            .iter()
            .map(|(kind, src)| Ok((*kind, Template::parse(*kind, src)?)))
            .collect::<Result<_, TemplateError>>()?;
        Ok(Self { header, directives })
    }

    pub fn directive(&self, directive: &Directive) -> Result<String, TemplateError> {
        let value =
            serde_json::to_value(directive).map_err(|e| TemplateError::Data(e.to_string()))?;
        let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();
        let template = self
            .directives
            .get(kind)
            .ok_or_else(|| TemplateError::MissingField {
                template: "emitter".into(),
                field: format!("kind:{kind}"),
            })?;
        template.render_value(&value)
    }

    /// Header line followed by indented directives, one per line.
    pub fn section(&self, section: &Section) -> Result<String, TemplateError> {
        let mut lines = Vec::with_capacity(section.directives.len() + 1);
        if let Some(header) = &section.header {
            lines.push(self.header.render(header)?);
        }
        for directive in &section.directives {
            lines.push(format!("{INDENT}{}", self.directive(directive)?));
        }
        Ok(lines.join("\n"))
    }

    /// Sections joined by blank lines; empty sections are skipped.
    pub fn sections(&self, sections: &[Section]) -> Result<String, TemplateError> {
        let rendered = sections
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| self.section(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rendered.join("\n\n"))
    }
}
