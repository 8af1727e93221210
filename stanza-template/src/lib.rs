//! A small text template engine with Go-template-style actions.
//!
//! Supported actions:
//!
//! | Action | Meaning |
//! |---|---|
//! | `{{.a.b}}` | nested field of dot |
//! | `{{$}}`, `{{$.a}}`, `{{$x.a}}` | root and declared variables |
//! | `{{if p}} … {{else if q}} … {{else}} … {{end}}` | conditionals |
//! | `{{range $i, $e := .list}} … {{else}} … {{end}}` | iteration |
//! | `{{$x := p}}` | variable declaration |
//! | `{{eq a b}}`, `ne lt le gt ge and or not len index` | functions |
//! | `{{"{{"}}` | literal text, used to emit unexpanded template syntax |
//! | `{{- … -}}` | trim surrounding whitespace |
//! | `{{/* … */}}` | comment |
//!
//! Rendering is strict: a missing field, an undefined variable, an
//! incompatible comparison or an attempt to print a list all fail the whole
//! render instead of producing partial output.

pub mod error;

mod eval;
mod lexer;
mod parser;

pub use error::TemplateError;

use parser::Node;
use serde::Serialize;
use serde_json::Value;

/// A parsed template. Immutable and safe to share across threads.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse `source`, reporting syntax errors against `name`.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self, TemplateError> {
        let name = name.into();
        let items = lexer::split(&name, source)?;
        let nodes = parser::Parser::new(&name, items).parse()?;
        Ok(Self { name, nodes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render against any serializable value.
    pub fn render<T: Serialize + ?Sized>(&self, data: &T) -> Result<String, TemplateError> {
        let value = serde_json::to_value(data).map_err(|e| TemplateError::Data(e.to_string()))?;
        self.render_value(&value)
    }

    /// Render against an already-built JSON value.
    pub fn render_value(&self, data: &Value) -> Result<String, TemplateError> {
        let mut out = String::new();
        eval::Evaluator::new(&self.name, data).exec(&self.nodes, data, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(src: &str, data: Value) -> Result<String, TemplateError> {
        Template::parse("test", src)?.render_value(&data)
    }

    #[test]
    fn renders_nested_fields() {
        let out = render("{{.svc.name}}:{{.svc.port}}", json!({"svc": {"name": "app", "port": 8080}}));
        assert_eq!(out.unwrap(), "app:8080");
    }

    #[test]
    fn renders_template_name() {
        let tpl = Template::parse("acl", "x").unwrap();
        assert_eq!(tpl.name(), "acl");
    }

    #[test]
    fn missing_field_is_an_error_not_empty_output() {
        let err = render("before {{.nope}} after", json!({})).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingField {
                template: "test".into(),
                field: ".nope".into(),
            }
        );
    }

    #[test]
    fn printing_a_list_is_an_error() {
        let err = render("{{.items}}", json!({"items": [1, 2]})).unwrap_err();
        assert!(matches!(err, TemplateError::Unprintable { kind: "list", .. }));
    }

    #[test]
    fn render_accepts_serializable_structs() {
        #[derive(Serialize)]
        struct Data {
            name: &'static str,
        }
        let tpl = Template::parse("t", "hello {{.name}}").unwrap();
        assert_eq!(tpl.render(&Data { name: "world" }).unwrap(), "hello world");
    }
}
