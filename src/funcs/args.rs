use std::fmt;
use std::sync::Arc;

use crate::Value;

/// An error returned while calling a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The arguments didn't match the function signature.
    Args(String),
    /// The function itself returned an error.
    Failed(String),
}

/// A type that a function argument can be converted to.
pub trait FuncArg: Sized {
    #[doc(hidden)]
    fn from_value(v: Value) -> Result<Self, CallError>;
}

impl FuncArg for Value {
    fn from_value(v: Value) -> Result<Self, CallError> {
        Ok(v)
    }
}

impl FuncArg for bool {
    fn from_value(v: Value) -> Result<Self, CallError> {
        match v {
            Value::Bool(b) => Ok(b),
            v => Err(err_wrong_type("bool", &v)),
        }
    }
}

impl FuncArg for i64 {
    fn from_value(v: Value) -> Result<Self, CallError> {
        match v {
            Value::Integer(i) => Ok(i),
            v => Err(err_wrong_type("int", &v)),
        }
    }
}

impl FuncArg for f64 {
    fn from_value(v: Value) -> Result<Self, CallError> {
        match v {
            Value::Float(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            v => Err(err_wrong_type("float", &v)),
        }
    }
}

impl FuncArg for String {
    fn from_value(v: Value) -> Result<Self, CallError> {
        match v {
            Value::String(s) | Value::Html(s) => Ok(s),
            v => Err(err_wrong_type("string", &v)),
        }
    }
}

impl FuncArg for Vec<Value> {
    fn from_value(v: Value) -> Result<Self, CallError> {
        match v {
            Value::List(list) => Ok(Arc::try_unwrap(list).unwrap_or_else(|l| (*l).clone())),
            v => Err(err_wrong_type("list", &v)),
        }
    }
}

fn err_wrong_type(exp: &str, got: &Value) -> CallError {
    CallError::Args(format!(
        "wrong type for value; expected {exp}; got {}",
        got.human()
    ))
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Args(msg) | Self::Failed(msg) => f.write_str(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn func_arg_conversions() {
        assert_eq!(f64::from_value(Value::from(2)), Ok(2.0));
        assert_eq!(String::from_value(Value::html("<b>")), Ok("<b>".to_owned()));
        assert_eq!(
            bool::from_value(Value::None),
            Err(CallError::Args(
                "wrong type for value; expected bool; got nil".into()
            ))
        );
        assert_eq!(
            Vec::<Value>::from_value(Value::from([1, 2])),
            Ok(vec![Value::from(1), Value::from(2)])
        );
    }
}
