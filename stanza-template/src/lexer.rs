//! Splits template source into literal text and action bodies.
//!
//! Whitespace trim markers (`{{- ` and ` -}}`) are applied here, so the
//! parser only ever sees the text that will actually be emitted.

use crate::error::TemplateError;

const LEFT: &str = "{{";
const RIGHT: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Action { body: String, line: usize },
}

pub(crate) fn split(name: &str, src: &str) -> Result<Vec<Item>, TemplateError> {
    let mut items = Vec::new();
    let mut rest = src;
    let mut line = 1;
    let mut trim_next = false;

    while let Some(open) = rest.find(LEFT) {
        let mut text = &rest[..open];
        line += newlines(text);
        if trim_next {
            text = text.trim_start();
        }

        let after = &rest[open + LEFT.len()..];
        let trim_left = has_left_trim(after);
        if trim_left {
            text = text.trim_end();
        }
        push_text(&mut items, text);

        let body_src = if trim_left { &after[1..] } else { after };
        let close = find_close(body_src).ok_or_else(|| TemplateError::Syntax {
            template: name.to_string(),
            line,
            message: "unclosed action".into(),
        })?;
        let raw = &body_src[..close];
        let (body, trim_right) = strip_right_trim(raw);
        let body = body.trim();

        if let Some(comment) = body.strip_prefix("/*") {
            if !comment.ends_with("*/") {
                return Err(TemplateError::Syntax {
                    template: name.to_string(),
                    line,
                    message: "comment must end with `*/` directly before the delimiter".into(),
                });
            }
        } else if body.is_empty() {
            return Err(TemplateError::Syntax {
                template: name.to_string(),
                line,
                message: "empty action".into(),
            });
        } else {
            items.push(Item::Action {
                body: body.to_string(),
                line,
            });
        }

        line += newlines(raw);
        rest = &body_src[close + RIGHT.len()..];
        trim_next = trim_right;
    }

    let tail = if trim_next { rest.trim_start() } else { rest };
    push_text(&mut items, tail);
    Ok(items)
}

fn push_text(items: &mut Vec<Item>, text: &str) {
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

/// `{{-` only trims when followed by whitespace, so `{{-3}}` stays a number.
fn has_left_trim(after: &str) -> bool {
    let mut chars = after.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

fn strip_right_trim(raw: &str) -> (&str, bool) {
    if let Some(body) = raw.strip_suffix('-') {
        if body.ends_with(char::is_whitespace) {
            return (body, true);
        }
    }
    (raw, false)
}

/// Byte offset of the closing `}}`, skipping quoted strings and comments.
fn find_close(s: &str) -> Option<usize> {
    let trimmed = s.trim_start();
    if trimmed.starts_with("/*") {
        let comment_start = s.len() - trimmed.len();
        let end = s[comment_start..].find("*/")? + comment_start + 2;
        return s[end..].find(RIGHT).map(|i| i + end);
    }

    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}
