use thiserror::Error;

/// Errors raised while parsing or rendering a template.
///
/// Parse-time variants carry the line of the offending action. Render-time
/// variants name the template and the expression that failed, so a caller
/// can report which directive broke instead of emitting partial text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("{template}:{line}: syntax error: {message}")]
    Syntax {
        template: String,
        line: usize,
        message: String,
    },

    #[error("{template}:{line}: unknown function `{name}`")]
    UnknownFunction {
        template: String,
        line: usize,
        name: String,
    },

    #[error("{template}: missing field `{field}`")]
    MissingField { template: String, field: String },

    #[error("{template}: undefined variable `${name}`")]
    UndefinedVariable { template: String, name: String },

    #[error("{template}: type mismatch in {context}: {message}")]
    TypeMismatch {
        template: String,
        context: String,
        message: String,
    },

    #[error("{template}: cannot print {kind} value of {expr}")]
    Unprintable {
        template: String,
        expr: String,
        kind: &'static str,
    },

    #[error("template data is not serializable: {0}")]
    Data(String),
}

impl TemplateError {
    /// True for errors caught while parsing (programmer-time defects).
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            TemplateError::Syntax { .. } | TemplateError::UnknownFunction { .. }
        )
    }
}
