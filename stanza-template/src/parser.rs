//! Action tokenizer and recursive-descent parser producing the template AST.

use crate::error::TemplateError;
use crate::lexer::Item;
use serde_json::Value;

/// Built-in functions callable from actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Func {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Len,
    Index,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        Some(match name {
            "eq" => Func::Eq,
            "ne" => Func::Ne,
            "lt" => Func::Lt,
            "le" => Func::Le,
            "gt" => Func::Gt,
            "ge" => Func::Ge,
            "and" => Func::And,
            "or" => Func::Or,
            "not" => Func::Not,
            "len" => Func::Len,
            "index" => Func::Index,
            _ => return None,
        })
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Func::Eq => "eq",
            Func::Ne => "ne",
            Func::Lt => "lt",
            Func::Le => "le",
            Func::Gt => "gt",
            Func::Ge => "ge",
            Func::And => "and",
            Func::Or => "or",
            Func::Not => "not",
            Func::Len => "len",
            Func::Index => "index",
        }
    }

    /// (min, max) argument counts.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Func::Eq => (2, None),
            Func::Ne | Func::Lt | Func::Le | Func::Gt | Func::Ge => (2, Some(2)),
            Func::And | Func::Or => (1, None),
            Func::Not | Func::Len => (1, Some(1)),
            Func::Index => (2, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    /// Field path relative to dot; empty path is dot itself.
    Field(Vec<String>),
    /// `$` is stored under the empty name.
    Var { name: String, fields: Vec<String> },
    Literal(Value),
    Call { func: Func, args: Vec<Expr> },
    Chain { base: Box<Expr>, fields: Vec<String> },
}

impl Expr {
    /// Source-like rendering used in error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Expr::Field(path) if path.is_empty() => ".".into(),
            Expr::Field(path) => format!(".{}", path.join(".")),
            Expr::Var { name, fields } => {
                let mut s = format!("${name}");
                for f in fields {
                    s.push('.');
                    s.push_str(f);
                }
                s
            }
            Expr::Literal(v) => v.to_string(),
            Expr::Call { func, args } => {
                let args: Vec<String> = args.iter().map(Expr::describe).collect();
                format!("({} {})", func.name(), args.join(" "))
            }
            Expr::Chain { base, fields } => format!("{}.{}", base.describe(), fields.join(".")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Output(Expr),
    Assign {
        name: String,
        expr: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        key: Option<String>,
        value: Option<String>,
        expr: Expr,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

// ── Tokens ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Fields(Vec<String>),
    Var(String, Vec<String>),
    Ident(String),
    Lit(Value),
    LParen,
    RParen,
    Comma,
    Declare,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    /// Whitespace separated this token from the previous one.
    spaced: bool,
}

struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
        }
    }

    fn take_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            s.push(c);
            self.chars.next();
        }
        s
    }

    /// Consumes `.a.b.c` segments directly following the current position.
    fn take_fields(&mut self) -> Result<Vec<String>, String> {
        let mut fields = Vec::new();
        while let Some(&(_, '.')) = self.chars.peek() {
            self.chars.next();
            let name = self.take_ident();
            if name.is_empty() {
                if fields.is_empty() {
                    // bare dot
                    return Ok(fields);
                }
                return Err("field name expected after `.`".into());
            }
            fields.push(name);
        }
        Ok(fields)
    }

    fn take_string(&mut self) -> Result<String, String> {
        let mut s = String::new();
        loop {
            match self.chars.next() {
                None => return Err("unterminated string literal".into()),
                Some((_, '"')) => return Ok(s),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, '"')) => s.push('"'),
                    Some((_, '\\')) => s.push('\\'),
                    Some((_, c)) => return Err(format!("unknown escape `\\{c}`")),
                    None => return Err("unterminated string literal".into()),
                },
                Some((_, c)) => s.push(c),
            }
        }
    }

    fn take_number(&mut self, start: usize) -> Result<Value, String> {
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' || (i == start && c == '-') {
                end = i + c.len_utf8();
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::from(n));
        }
        text.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("invalid number `{text}`"))
    }

    fn tokens(mut self) -> Result<Vec<Token>, String> {
        let mut out = Vec::new();
        let mut spaced = true;
        while let Some(&(i, c)) = self.chars.peek() {
            let tok = match c {
                c if c.is_whitespace() => {
                    self.chars.next();
                    spaced = true;
                    continue;
                }
                '.' => Tok::Fields(self.take_fields()?),
                '$' => {
                    self.chars.next();
                    let name = self.take_ident();
                    Tok::Var(name, self.take_fields()?)
                }
                '"' => {
                    self.chars.next();
                    Tok::Lit(Value::String(self.take_string()?))
                }
                '`' => {
                    self.chars.next();
                    let mut s = String::new();
                    loop {
                        match self.chars.next() {
                            None => return Err("unterminated raw string".into()),
                            Some((_, '`')) => break,
                            Some((_, c)) => s.push(c),
                        }
                    }
                    Tok::Lit(Value::String(s))
                }
                '(' => {
                    self.chars.next();
                    Tok::LParen
                }
                ')' => {
                    self.chars.next();
                    Tok::RParen
                }
                ',' => {
                    self.chars.next();
                    Tok::Comma
                }
                ':' => {
                    self.chars.next();
                    match self.chars.next() {
                        Some((_, '=')) => Tok::Declare,
                        _ => return Err("expected `:=`".into()),
                    }
                }
                c if c.is_ascii_digit() || c == '-' => Tok::Lit(self.take_number(i)?),
                c if is_ident_char(c) => match self.take_ident().as_str() {
                    "true" => Tok::Lit(Value::Bool(true)),
                    "false" => Tok::Lit(Value::Bool(false)),
                    ident => Tok::Ident(ident.to_string()),
                },
                other => return Err(format!("unexpected character `{other}`")),
            };
            out.push(Token { tok, spaced });
            spaced = false;
        }
        Ok(out)
    }
}

// ── Parser ───────────────────────────────────────────────────

enum Stop {
    End,
    Else,
    ElseIf(Expr),
    Eof,
}

pub(crate) struct Parser<'a> {
    name: &'a str,
    items: std::vec::IntoIter<Item>,
    line: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(name: &'a str, items: Vec<Item>) -> Self {
        Self {
            name,
            items: items.into_iter(),
            line: 1,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Vec<Node>, TemplateError> {
        let (nodes, stop) = self.parse_list()?;
        match stop {
            Stop::Eof => Ok(nodes),
            Stop::End => Err(self.syntax("unexpected {{end}}")),
            Stop::Else | Stop::ElseIf(_) => Err(self.syntax("unexpected {{else}}")),
        }
    }

    fn syntax(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::Syntax {
            template: self.name.to_string(),
            line: self.line,
            message: message.into(),
        }
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            let (body, line) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { body, line } => (body, line),
            };
            self.line = line;
            let tokens = Tokenizer::new(&body)
                .tokens()
                .map_err(|msg| self.syntax(msg))?;

            match tokens.first().map(|t| &t.tok) {
                Some(Tok::Ident(kw)) if kw == "end" => {
                    self.expect_bare(&tokens, "end")?;
                    return Ok((nodes, Stop::End));
                }
                Some(Tok::Ident(kw)) if kw == "else" => {
                    let rest = &tokens[1..];
                    return match rest.first().map(|t| &t.tok) {
                        None => Ok((nodes, Stop::Else)),
                        Some(Tok::Ident(kw)) if kw == "if" => {
                            let cond = self.parse_full_expr(&rest[1..])?;
                            Ok((nodes, Stop::ElseIf(cond)))
                        }
                        _ => Err(self.syntax("unexpected tokens after `else`")),
                    };
                }
                Some(Tok::Ident(kw)) if kw == "if" => {
                    let cond = self.parse_full_expr(&tokens[1..])?;
                    nodes.push(self.parse_if(cond)?);
                }
                Some(Tok::Ident(kw)) if kw == "range" => {
                    nodes.push(self.parse_range(&tokens[1..])?);
                }
                Some(Tok::Var(name, fields))
                    if fields.is_empty()
                        && matches!(tokens.get(1).map(|t| &t.tok), Some(Tok::Declare)) =>
                {
                    let name = name.clone();
                    let expr = self.parse_full_expr(&tokens[2..])?;
                    nodes.push(Node::Assign { name, expr });
                }
                _ => nodes.push(Node::Output(self.parse_full_expr(&tokens)?)),
            }
        }
        Ok((nodes, Stop::Eof))
    }

    fn expect_bare(&self, tokens: &[Token], keyword: &str) -> Result<(), TemplateError> {
        if tokens.len() == 1 {
            Ok(())
        } else {
            Err(self.syntax(format!("unexpected tokens after `{keyword}`")))
        }
    }

    fn parse_if(&mut self, cond: Expr) -> Result<Node, TemplateError> {
        let (then, stop) = self.parse_list()?;
        let otherwise = match stop {
            Stop::End => Vec::new(),
            Stop::Else => {
                let (otherwise, stop) = self.parse_list()?;
                if !matches!(stop, Stop::End) {
                    return Err(self.syntax("expected {{end}} to close {{if}}"));
                }
                otherwise
            }
            Stop::ElseIf(next) => vec![self.parse_if(next)?],
            Stop::Eof => return Err(self.syntax("unclosed {{if}}")),
        };
        Ok(Node::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_range(&mut self, tokens: &[Token]) -> Result<Node, TemplateError> {
        let (key, value, rest) = match tokens {
            [
                Token { tok: Tok::Var(k, kf), .. },
                Token { tok: Tok::Comma, .. },
                Token { tok: Tok::Var(v, vf), .. },
                Token { tok: Tok::Declare, .. },
                rest @ ..,
            ] if kf.is_empty() && vf.is_empty() => (Some(k.clone()), Some(v.clone()), rest),
            [
                Token { tok: Tok::Var(v, vf), .. },
                Token { tok: Tok::Declare, .. },
                rest @ ..,
            ] if vf.is_empty() => (None, Some(v.clone()), rest),
            rest => (None, None, rest),
        };
        let expr = self.parse_full_expr(rest)?;

        let (body, stop) = self.parse_list()?;
        let otherwise = match stop {
            Stop::End => Vec::new(),
            Stop::Else => {
                let (otherwise, stop) = self.parse_list()?;
                if !matches!(stop, Stop::End) {
                    return Err(self.syntax("expected {{end}} to close {{range}}"));
                }
                otherwise
            }
            Stop::ElseIf(_) => return Err(self.syntax("{{else if}} is not allowed in {{range}}")),
            Stop::Eof => return Err(self.syntax("unclosed {{range}}")),
        };
        Ok(Node::Range {
            key,
            value,
            expr,
            body,
            otherwise,
        })
    }

    fn parse_full_expr(&self, tokens: &[Token]) -> Result<Expr, TemplateError> {
        if tokens.is_empty() {
            return Err(self.syntax("missing expression"));
        }
        let (expr, used) = self.parse_command(tokens)?;
        if used != tokens.len() {
            return Err(self.syntax("unexpected tokens after expression"));
        }
        Ok(expr)
    }

    /// A function call with its arguments, or a single term.
    fn parse_command(&self, tokens: &[Token]) -> Result<(Expr, usize), TemplateError> {
        if let Some(Token { tok: Tok::Ident(name), .. }) = tokens.first() {
            let func = Func::lookup(name).ok_or_else(|| TemplateError::UnknownFunction {
                template: self.name.to_string(),
                line: self.line,
                name: name.clone(),
            })?;
            let mut args = Vec::new();
            let mut pos = 1;
            while pos < tokens.len() && tokens[pos].tok != Tok::RParen {
                let (arg, used) = self.parse_term(&tokens[pos..])?;
                args.push(arg);
                pos += used;
            }
            let (min, max) = func.arity();
            if args.len() < min || max.is_some_and(|max| args.len() > max) {
                return Err(self.syntax(format!(
                    "wrong number of arguments for `{}`: {}",
                    func.name(),
                    args.len()
                )));
            }
            return Ok((Expr::Call { func, args }, pos));
        }
        self.parse_term(tokens)
    }

    fn parse_term(&self, tokens: &[Token]) -> Result<(Expr, usize), TemplateError> {
        let Some(first) = tokens.first() else {
            return Err(self.syntax("missing operand"));
        };
        match &first.tok {
            Tok::Fields(fields) => Ok((Expr::Field(fields.clone()), 1)),
            Tok::Var(name, fields) => Ok((
                Expr::Var {
                    name: name.clone(),
                    fields: fields.clone(),
                },
                1,
            )),
            Tok::Lit(value) => Ok((Expr::Literal(value.clone()), 1)),
            Tok::LParen => {
                let (inner, used) = self.parse_command(&tokens[1..])?;
                let close = 1 + used;
                if tokens.get(close).map(|t| &t.tok) != Some(&Tok::RParen) {
                    return Err(self.syntax("unclosed `(`"));
                }
                // `(index . 0).Name` chains onto the parenthesized value.
                if let Some(Token {
                    tok: Tok::Fields(fields),
                    spaced: false,
                }) = tokens.get(close + 1)
                {
                    if !fields.is_empty() {
                        let chained = Expr::Chain {
                            base: Box::new(inner),
                            fields: fields.clone(),
                        };
                        return Ok((chained, close + 2));
                    }
                }
                Ok((inner, close + 1))
            }
            Tok::Ident(name) => Err(self.syntax(format!(
                "function `{name}` used as an operand; wrap the call in parentheses"
            ))),
            Tok::RParen => Err(self.syntax("unexpected `)`")),
            Tok::Comma => Err(self.syntax("unexpected `,`")),
            Tok::Declare => Err(self.syntax("unexpected `:=`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;

    fn parse(src: &str) -> Result<Vec<Node>, TemplateError> {
        Parser::new("t", lexer::split("t", src)?).parse()
    }

    #[test]
    fn parses_nested_field_path() {
        let nodes = parse("{{.a.b}}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Output(Expr::Field(vec!["a".into(), "b".into()]))]
        );
    }

    #[test]
    fn parses_root_variable_with_fields() {
        let nodes = parse("{{$.Name}}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Output(Expr::Var {
                name: String::new(),
                fields: vec!["Name".into()],
            })]
        );
    }

    #[test]
    fn parses_else_if_chain_into_nested_if() {
        let nodes = parse("{{if .a}}A{{else if .b}}B{{else}}C{{end}}").unwrap();
        let Node::If { otherwise, .. } = &nodes[0] else {
            panic!("expected if node");
        };
        assert!(matches!(otherwise.as_slice(), [Node::If { .. }]));
    }

    #[test]
    fn parses_range_with_index_and_element() {
        let nodes = parse("{{range $i, $e := .items}}{{$i}}{{end}}").unwrap();
        assert!(matches!(
            &nodes[0],
            Node::Range { key: Some(k), value: Some(v), .. } if k == "i" && v == "e"
        ));
    }

    #[test]
    fn parses_parenthesized_chain() {
        let nodes = parse("{{(index .list 0).Name}}").unwrap();
        assert!(matches!(&nodes[0], Node::Output(Expr::Chain { .. })));
    }

    #[test]
    fn rejects_unknown_function() {
        let err = parse("{{frobnicate .x}}").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFunction { name, .. } if name == "frobnicate"));
    }

    #[test]
    fn rejects_unbalanced_blocks() {
        assert!(parse("{{if .x}}open").unwrap_err().is_syntax());
        assert!(parse("stray{{end}}").unwrap_err().is_syntax());
        assert!(parse("{{range .x}}{{else if .y}}{{end}}").is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(parse("{{ne .a}}").is_err());
        assert!(parse("{{not .a .b}}").is_err());
    }

    #[test]
    fn string_literal_keeps_delimiters_verbatim() {
        let nodes = parse(r#"{{"{{end}}"}}"#).unwrap();
        assert_eq!(
            nodes,
            vec![Node::Output(Expr::Literal(Value::String("{{end}}".into())))]
        );
    }
}
