//! Tree-walking evaluator over `serde_json::Value` data.

use crate::error::TemplateError;
use crate::parser::{Expr, Func, Node};
use serde_json::Value;
use std::cmp::Ordering;

pub(crate) struct Evaluator<'a> {
    name: &'a str,
    /// Variable stack; `$` is stored under the empty name at the bottom.
    vars: Vec<(String, Value)>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(name: &'a str, root: &Value) -> Self {
        Self {
            name,
            vars: vec![(String::new(), root.clone())],
        }
    }

    pub(crate) fn exec(
        &mut self,
        nodes: &[Node],
        dot: &Value,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        let result = self.exec_inner(nodes, dot, out);
        self.vars.truncate(mark);
        result
    }

    fn exec_inner(
        &mut self,
        nodes: &[Node],
        dot: &Value,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(expr) => {
                    let value = self.eval(expr, dot)?;
                    self.print(&value, expr, out)?;
                }
                Node::Assign { name, expr } => {
                    let value = self.eval(expr, dot)?;
                    self.vars.push((name.clone(), value));
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    if truthy(&self.eval(cond, dot)?) {
                        self.exec(then, dot, out)?;
                    } else {
                        self.exec(otherwise, dot, out)?;
                    }
                }
                Node::Range {
                    key,
                    value,
                    expr,
                    body,
                    otherwise,
                } => {
                    let collection = self.eval(expr, dot)?;
                    let entries: Vec<(Value, Value)> = match collection {
                        Value::Null => Vec::new(),
                        Value::Array(items) => items
                            .into_iter()
                            .enumerate()
                            .map(|(i, v)| (Value::from(i), v))
                            .collect(),
                        Value::Object(map) => {
                            map.into_iter().map(|(k, v)| (Value::String(k), v)).collect()
                        }
                        other => {
                            return Err(self.mismatch(
                                expr,
                                format!("cannot range over {}", kind(&other)),
                            ));
                        }
                    };
                    if entries.is_empty() {
                        self.exec(otherwise, dot, out)?;
                        continue;
                    }
                    for (k, v) in entries {
                        let mark = self.vars.len();
                        if let Some(key) = key {
                            self.vars.push((key.clone(), k));
                        }
                        if let Some(value) = value {
                            self.vars.push((value.clone(), v.clone()));
                        }
                        let result = self.exec(body, &v, out);
                        self.vars.truncate(mark);
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval(&self, expr: &Expr, dot: &Value) -> Result<Value, TemplateError> {
        match expr {
            Expr::Field(path) => self.walk(dot, path, expr),
            Expr::Var { name, fields } => {
                let base = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| TemplateError::UndefinedVariable {
                        template: self.name.to_string(),
                        name: name.clone(),
                    })?;
                self.walk(base, fields, expr)
            }
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Chain { base, fields } => {
                let base = self.eval(base, dot)?;
                self.walk(&base, fields, expr)
            }
            Expr::Call { func, args } => self.call(*func, args, dot, expr),
        }
    }

    fn walk(&self, base: &Value, path: &[String], expr: &Expr) -> Result<Value, TemplateError> {
        let mut current = base;
        for field in path {
            current = current
                .as_object()
                .and_then(|map| map.get(field))
                .ok_or_else(|| TemplateError::MissingField {
                    template: self.name.to_string(),
                    field: expr.describe(),
                })?;
        }
        Ok(current.clone())
    }

    fn call(
        &self,
        func: Func,
        args: &[Expr],
        dot: &Value,
        expr: &Expr,
    ) -> Result<Value, TemplateError> {
        match func {
            Func::And => {
                let mut last = Value::Null;
                for arg in args {
                    last = self.eval(arg, dot)?;
                    if !truthy(&last) {
                        break;
                    }
                }
                Ok(last)
            }
            Func::Or => {
                let mut last = Value::Null;
                for arg in args {
                    last = self.eval(arg, dot)?;
                    if truthy(&last) {
                        break;
                    }
                }
                Ok(last)
            }
            Func::Not => Ok(Value::Bool(!truthy(&self.eval(&args[0], dot)?))),
            Func::Len => match self.eval(&args[0], dot)? {
                Value::String(s) => Ok(Value::from(s.len())),
                Value::Array(a) => Ok(Value::from(a.len())),
                Value::Object(m) => Ok(Value::from(m.len())),
                other => Err(self.mismatch(expr, format!("len of {}", kind(&other)))),
            },
            Func::Index => {
                let mut current = self.eval(&args[0], dot)?;
                for arg in &args[1..] {
                    let key = self.eval(arg, dot)?;
                    current = match (&current, &key) {
                        (Value::Array(items), Value::Number(n)) => n
                            .as_u64()
                            .and_then(|i| items.get(i as usize))
                            .cloned()
                            .ok_or_else(|| {
                                self.mismatch(expr, format!("index {n} out of range"))
                            })?,
                        (Value::Object(map), Value::String(k)) => {
                            map.get(k).cloned().ok_or_else(|| TemplateError::MissingField {
                                template: self.name.to_string(),
                                field: format!("{}[{k}]", expr.describe()),
                            })?
                        }
                        (c, k) => {
                            return Err(self.mismatch(
                                expr,
                                format!("cannot index {} with {}", kind(c), kind(k)),
                            ));
                        }
                    };
                }
                Ok(current)
            }
            Func::Eq => {
                let first = self.eval(&args[0], dot)?;
                for arg in &args[1..] {
                    let other = self.eval(arg, dot)?;
                    if self.compare(&first, &other, expr)? == Ordering::Equal {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Func::Ne | Func::Lt | Func::Le | Func::Gt | Func::Ge => {
                let a = self.eval(&args[0], dot)?;
                let b = self.eval(&args[1], dot)?;
                let ord = self.compare(&a, &b, expr)?;
                if func != Func::Ne && !orderable(&a) {
                    return Err(self.mismatch(expr, format!("{} is not ordered", kind(&a))));
                }
                Ok(Value::Bool(match func {
                    Func::Ne => ord != Ordering::Equal,
                    Func::Lt => ord == Ordering::Less,
                    Func::Le => ord != Ordering::Greater,
                    Func::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }))
            }
        }
    }

    /// Orders two scalars of the same kind. Numbers compare numerically
    /// across integer/float representations.
    fn compare(&self, a: &Value, b: &Value, expr: &Expr) -> Result<Ordering, TemplateError> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                    return Ok(x.cmp(&y));
                }
                let (x, y) = (x.as_f64(), y.as_f64());
                x.zip(y)
                    .and_then(|(x, y)| x.partial_cmp(&y))
                    .ok_or_else(|| self.mismatch(expr, "incomparable numbers".into()))
            }
            (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
            (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            _ => Err(self.mismatch(
                expr,
                format!("cannot compare {} with {}", kind(a), kind(b)),
            )),
        }
    }

    fn print(&self, value: &Value, expr: &Expr, out: &mut String) -> Result<(), TemplateError> {
        match value {
            Value::String(s) => out.push_str(s),
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            other => {
                return Err(TemplateError::Unprintable {
                    template: self.name.to_string(),
                    expr: expr.describe(),
                    kind: kind(other),
                });
            }
        }
        Ok(())
    }

    fn mismatch(&self, expr: &Expr, message: String) -> TemplateError {
        TemplateError::TypeMismatch {
            template: self.name.to_string(),
            context: expr.describe(),
            message,
        }
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

fn orderable(value: &Value) -> bool {
    matches!(value, Value::Number(_) | Value::String(_))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
