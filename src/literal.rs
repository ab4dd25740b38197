//! Literal Codec - the closed domain of rebindable constant values
//!
//! A literal is a number, a string, one of the three named singletons
//! (`true`, `false`, `nil`), or a list/tuple/map whose elements are
//! themselves literal. Conversions run both ways: syntax node to value for
//! introspection, value to syntax node for rewriting.

use std::fmt;

use crate::interp::value::Value;
use crate::syntax::ast::Expr;
use crate::syntax::parse_expression;
use crate::{Error, Result};

/// A constant value drawn from the closed literal domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Nil,
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Map(Vec<(Literal, Literal)>),
}

/// Whether a syntax node is a literal (checked recursively).
pub fn is_literal_expr(expr: &Expr) -> bool {
    match expr {
        Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. }
        | Expr::Bool { .. }
        | Expr::Nil { .. } => true,
        Expr::List { items, .. } | Expr::Tuple { items, .. } => {
            items.iter().all(is_literal_expr)
        }
        Expr::Map { entries, .. } => entries
            .iter()
            .all(|(key, value)| is_literal_expr(key) && is_literal_expr(value)),
        Expr::Name { .. }
        | Expr::Attribute { .. }
        | Expr::Call { .. }
        | Expr::Unary { .. }
        | Expr::Binary { .. } => false,
    }
}

impl Literal {
    /// Evaluate a literal syntax node to its value.
    pub fn from_expr(expr: &Expr) -> Result<Self> {
        match expr {
            Expr::Int { value, .. } => Ok(Literal::Int(*value)),
            Expr::Float { value, .. } => Ok(Literal::Float(*value)),
            Expr::Str { value, .. } => Ok(Literal::Str(value.clone())),
            Expr::Bool { value, .. } => Ok(Literal::Bool(*value)),
            Expr::Nil { .. } => Ok(Literal::Nil),
            Expr::List { items, .. } => Ok(Literal::List(
                items.iter().map(Literal::from_expr).collect::<Result<_>>()?,
            )),
            Expr::Tuple { items, .. } => Ok(Literal::Tuple(
                items.iter().map(Literal::from_expr).collect::<Result<_>>()?,
            )),
            Expr::Map { entries, .. } => {
                let mut literal_entries = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    literal_entries.push((Literal::from_expr(key)?, Literal::from_expr(value)?));
                }
                Ok(Literal::Map(literal_entries))
            }
            other => Err(Error::UnsupportedLiteral(format!(
                "expression at line {} is not a literal",
                other.line()
            ))),
        }
    }

    /// Build the syntax node for this literal, stamped with `line`.
    pub fn to_expr(&self, line: u32) -> Expr {
        match self {
            Literal::Int(value) => Expr::Int {
                value: *value,
                line,
            },
            Literal::Float(value) => Expr::Float {
                value: *value,
                line,
            },
            Literal::Str(value) => Expr::Str {
                value: value.clone(),
                line,
            },
            Literal::Bool(value) => Expr::Bool {
                value: *value,
                line,
            },
            Literal::Nil => Expr::Nil { line },
            Literal::List(items) => Expr::List {
                items: items.iter().map(|item| item.to_expr(line)).collect(),
                line,
            },
            Literal::Tuple(items) => Expr::Tuple {
                items: items.iter().map(|item| item.to_expr(line)).collect(),
                line,
            },
            Literal::Map(entries) => Expr::Map {
                entries: entries
                    .iter()
                    .map(|(key, value)| (key.to_expr(line), value.to_expr(line)))
                    .collect(),
                line,
            },
        }
    }

    /// Project a runtime value into the literal domain.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int(n) => Ok(Literal::Int(*n)),
            Value::Float(x) => Ok(Literal::Float(*x)),
            Value::Str(s) => Ok(Literal::Str(s.to_string())),
            Value::Bool(b) => Ok(Literal::Bool(*b)),
            Value::Nil => Ok(Literal::Nil),
            Value::List(items) => Ok(Literal::List(
                items.iter().map(Literal::from_value).collect::<Result<_>>()?,
            )),
            Value::Tuple(items) => Ok(Literal::Tuple(
                items.iter().map(Literal::from_value).collect::<Result<_>>()?,
            )),
            Value::Map(entries) => {
                let mut literal_entries = Vec::with_capacity(entries.len());
                for (key, value) in entries.iter() {
                    literal_entries.push((Literal::from_value(key)?, Literal::from_value(value)?));
                }
                Ok(Literal::Map(literal_entries))
            }
            other => Err(Error::UnsupportedLiteral(format!(
                "{} has no literal representation",
                other.type_name()
            ))),
        }
    }

    /// The runtime value of this literal.
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(x) => Value::Float(*x),
            Literal::Str(s) => Value::str(s),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Nil => Value::Nil,
            Literal::List(items) => Value::List(std::rc::Rc::new(
                items.iter().map(Literal::to_value).collect(),
            )),
            Literal::Tuple(items) => Value::Tuple(std::rc::Rc::new(
                items.iter().map(Literal::to_value).collect(),
            )),
            Literal::Map(entries) => Value::Map(std::rc::Rc::new(
                entries
                    .iter()
                    .map(|(key, value)| (key.to_value(), value.to_value()))
                    .collect(),
            )),
        }
    }

    /// JSON projection for machine-readable output. Non-string map keys are
    /// stringified.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::Int(n) => serde_json::Value::from(*n),
            Literal::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Literal::Str(s) => serde_json::Value::String(s.clone()),
            Literal::Bool(b) => serde_json::Value::Bool(*b),
            Literal::Nil => serde_json::Value::Null,
            Literal::List(items) | Literal::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(Literal::to_json).collect())
            }
            Literal::Map(entries) => {
                let mut object = serde_json::Map::new();
                for (key, value) in entries {
                    let key = match key {
                        Literal::Str(s) => s.clone(),
                        other => other.to_string(),
                    };
                    object.insert(key, value.to_json());
                }
                serde_json::Value::Object(object)
            }
        }
    }
}

/// Parse literal source text, e.g. a `--set path=value` argument.
pub fn parse_literal(source: &str) -> Result<Literal> {
    let expr = parse_expression(source)?;
    if !is_literal_expr(&expr) {
        return Err(Error::UnsupportedLiteral(format!(
            "'{}' is not a literal",
            source.trim()
        )));
    }
    Literal::from_expr(&expr)
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(x) => write!(f, "{}", x),
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Nil => write!(f, "nil"),
            Literal::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Literal::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Literal::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}
