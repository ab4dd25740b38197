//! Builtin functions
//!
//! Builtins resolve after locals and module globals and live outside every
//! module namespace, so free-variable analysis never reports them and the
//! introspector never couples a catalog to the builtin table.

use std::rc::Rc;

use super::value::{NativeFn, Value};
use crate::{Error, Result};

/// Look up a builtin by name.
pub fn lookup(name: &str) -> Option<Value> {
    let native = match name {
        "len" => NativeFn {
            name: "len",
            handler: builtin_len,
        },
        "abs" => NativeFn {
            name: "abs",
            handler: builtin_abs,
        },
        "str" => NativeFn {
            name: "str",
            handler: builtin_str,
        },
        _ => return None,
    };
    Some(Value::Native(Rc::new(native)))
}

fn expect_one(name: &str, args: &[Value]) -> Result<Value> {
    if args.len() != 1 {
        return Err(Error::Runtime(format!(
            "{}() takes exactly 1 argument, got {}",
            name,
            args.len()
        )));
    }
    Ok(args[0].clone())
}

fn builtin_len(args: &[Value]) -> Result<Value> {
    let value = expect_one("len", args)?;
    let length = match &value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => {
            return Err(Error::Runtime(format!(
                "len() does not support {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(length as i64))
}

fn builtin_abs(args: &[Value]) -> Result<Value> {
    match expect_one("abs", args)? {
        Value::Int(n) => Ok(Value::Int(n.abs())),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(Error::Runtime(format!(
            "abs() does not support {}",
            other.type_name()
        ))),
    }
}

fn builtin_str(args: &[Value]) -> Result<Value> {
    let value = expect_one("str", args)?;
    Ok(Value::str(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_on_collections() {
        let list = Value::List(Rc::new(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(builtin_len(&[list]).unwrap(), Value::Int(2));
        assert_eq!(builtin_len(&[Value::str("abc")]).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(lookup("open").is_none());
    }
}
