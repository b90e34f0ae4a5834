use std::sync::Arc;

use super::compiled::Op;
use super::error::RuntimeError;
use super::value::Value;

/// Built-in function: single source of truth for name and opcode. The parser,
/// compiler and `describe` output all read from this.
#[derive(Debug, Clone)]
pub struct BuiltinFn {
    pub name: &'static str,
    pub op: Op,
    pub description: &'static str,
}

/// All built-in functions available in template expressions.
pub static BUILTINS: &[BuiltinFn] = &[
    BuiltinFn { name: "first", op: Op::First, description: "First element, or the value itself" },
    BuiltinFn { name: "last", op: Op::Last, description: "Last element, or the value itself" },
    BuiltinFn { name: "rest", op: Op::Rest, description: "All but the first element" },
    BuiltinFn { name: "trunc", op: Op::Trunc, description: "All but the last element" },
    BuiltinFn { name: "strip", op: Op::Strip, description: "Drop null elements" },
    BuiltinFn { name: "trim", op: Op::Trim, description: "Strip leading and trailing whitespace" },
    BuiltinFn { name: "length", op: Op::Length, description: "Number of elements, nulls included" },
    BuiltinFn { name: "strlen", op: Op::Strlen, description: "Number of characters in a string" },
    BuiltinFn { name: "reverse", op: Op::Reverse, description: "Elements in reverse order" },
];

pub fn lookup_builtin(name: &str) -> Option<&'static BuiltinFn> {
    BUILTINS.iter().find(|b| b.name == name)
}

// ── Implementations ────────────────────────────────────────────────

pub fn first(v: &Value) -> Value {
    match v.iterate() {
        Some(items) => items.into_iter().next().unwrap_or_default(),
        None => v.clone(),
    }
}

pub fn last(v: &Value) -> Value {
    match v.iterate() {
        Some(items) => items.into_iter().last().unwrap_or_default(),
        None => v.clone(),
    }
}

/// Everything after the first element; null when fewer than two remain.
pub fn rest(v: &Value) -> Value {
    match v.iterate() {
        Some(items) if items.len() > 1 => Value::list(items.into_iter().skip(1).collect()),
        _ => Value::Null,
    }
}

/// Everything before the last element; null when fewer than two remain.
pub fn trunc(v: &Value) -> Value {
    match v.iterate() {
        Some(mut items) if items.len() > 1 => {
            items.pop();
            Value::list(items)
        }
        _ => Value::Null,
    }
}

pub fn strip(v: &Value) -> Value {
    match v.iterate() {
        Some(items) => Value::list(items.into_iter().filter(|x| !x.is_null()).collect()),
        None => v.clone(),
    }
}

pub fn reverse(v: &Value) -> Value {
    match v.iterate() {
        Some(mut items) => {
            items.reverse();
            Value::list(items)
        }
        None => v.clone(),
    }
}

pub fn length(v: &Value) -> Value {
    let n = match v.iterate() {
        Some(items) => items.len(),
        None if v.is_null() => 0,
        None => 1,
    };
    Value::from(n)
}

/// Trimmed string; non-strings are returned unchanged with an error.
pub fn trim(v: &Value) -> Result<Value, (Value, RuntimeError)> {
    match v {
        Value::Null => Ok(Value::Null),
        Value::Str(s) => Ok(Value::Str(Arc::from(s.trim()))),
        other => Err((other.clone(), expecting_string("trim", other))),
    }
}

/// Character count; non-strings yield 0 with an error.
pub fn strlen(v: &Value) -> Result<Value, (Value, RuntimeError)> {
    match v {
        Value::Null => Ok(Value::Int(0)),
        Value::Str(s) => Ok(Value::from(s.chars().count())),
        other => Err((Value::Int(0), expecting_string("strlen", other))),
    }
}

fn expecting_string(function: &str, found: &Value) -> RuntimeError {
    RuntimeError::ExpectingString {
        function: function.to_string(),
        found: found.type_name().to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ints(xs: &[i64]) -> Value {
        Value::list(xs.iter().map(|&x| Value::Int(x)).collect())
    }

    #[test]
    fn lookup() {
        assert!(lookup_builtin("first").is_some());
        assert_eq!(lookup_builtin("strlen").map(|b| b.op), Some(Op::Strlen));
        assert!(lookup_builtin("nope").is_none());
    }

    #[test]
    fn first_last_on_list_and_scalar() {
        assert_eq!(first(&ints(&[1, 2, 3])), Value::Int(1));
        assert_eq!(last(&ints(&[1, 2, 3])), Value::Int(3));
        assert_eq!(first(&Value::str("x")), Value::str("x"));
        assert_eq!(first(&ints(&[])), Value::Null);
    }

    #[test]
    fn rest_and_trunc() {
        assert_eq!(rest(&ints(&[1, 2, 3])), ints(&[2, 3]));
        assert_eq!(trunc(&ints(&[1, 2, 3])), ints(&[1, 2]));
        assert_eq!(rest(&ints(&[1])), Value::Null);
        assert_eq!(rest(&Value::str("solo")), Value::Null);
    }

    #[test]
    fn strip_and_length_treat_nulls_differently() {
        let v = Value::list(vec![Value::Int(1), Value::Null, Value::Int(2)]);
        assert_eq!(strip(&v), ints(&[1, 2]));
        assert_eq!(length(&v), Value::Int(3));
        assert_eq!(length(&Value::Null), Value::Int(0));
        assert_eq!(length(&Value::str("abc")), Value::Int(1));
    }

    #[test]
    fn reverse_list() {
        assert_eq!(reverse(&ints(&[1, 2, 3])), ints(&[3, 2, 1]));
    }

    #[test]
    fn string_functions_reject_non_strings() {
        assert_eq!(trim(&Value::str("  hi ")), Ok(Value::str("hi")));
        assert_eq!(strlen(&Value::str("héllo")), Ok(Value::Int(5)));
        let (fallback, err) = strlen(&Value::Int(34)).unwrap_err();
        assert_eq!(fallback, Value::Int(0));
        assert_eq!(err.to_string(), "function strlen expects a string not int");
        let (original, _) = trim(&Value::Int(7)).unwrap_err();
        assert_eq!(original, Value::Int(7));
    }
}
