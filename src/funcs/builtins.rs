//! The standard text/template functions.

use std::cmp::Ordering;

use crate::funcs::escape::{escape_html, sprint};
use crate::funcs::{CallError, Registry, ReturnKind};
use crate::render::value::to_text;
use crate::Value;

type Result<T> = std::result::Result<T, CallError>;

pub(crate) fn register(reg: &mut Registry) {
    reg.add_variadic("and", 1, and);
    reg.add_variadic("or", 1, or);
    reg.add("not", |v: Value| !v.is_truthy());
    reg.add("len", len);
    reg.add_variadic("index", 1, index);
    reg.add_variadic("eq", 1, eq);
    reg.add("ne", |a: Value, b: Value| eq(vec![a, b]).map(|eq| !eq));
    reg.add("lt", |a: Value, b: Value| cmp(&a, &b).map(Ordering::is_lt));
    reg.add("le", |a: Value, b: Value| cmp(&a, &b).map(Ordering::is_le));
    reg.add("gt", |a: Value, b: Value| cmp(&a, &b).map(Ordering::is_gt));
    reg.add("ge", |a: Value, b: Value| cmp(&a, &b).map(Ordering::is_ge));
    reg.add_variadic("print", 0, |args: Vec<Value>| sprint(&args));
    reg.add_variadic("println", 0, println);
    reg.add_variadic("html", 0, |args: Vec<Value>| {
        sprint(&args).map(|s| escape_html(&s).into_owned())
    });
    reg.add_variadic("urlquery", 0, |args: Vec<Value>| sprint(&args).map(|s| query_escape(&s)));

    for name in ["not", "eq", "ne", "lt", "le", "gt", "ge"] {
        reg.set_return_kind(name, ReturnKind::Bool);
    }
    reg.set_return_kind("len", ReturnKind::Number);
}

/// Returns the first falsy argument or the last argument.
fn and(mut args: Vec<Value>) -> Value {
    let i = args
        .iter()
        .position(|v| !v.is_truthy())
        .unwrap_or(args.len() - 1);
    args.swap_remove(i)
}

/// Returns the first truthy argument or the last argument.
fn or(mut args: Vec<Value>) -> Value {
    let i = args
        .iter()
        .position(Value::is_truthy)
        .unwrap_or(args.len() - 1);
    args.swap_remove(i)
}

fn len(v: Value) -> Result<i64> {
    let n = match &v {
        Value::String(s) | Value::Html(s) => s.len(),
        Value::List(l) => l.len(),
        Value::Map(m) => m.len(),
        Value::Channel(c) => c.len(),
        v => return Err(CallError::Failed(format!("len of type {}", v.human()))),
    };
    Ok(n as i64)
}

/// Indexes into lists and maps, `index x 1 2` is `x[1][2]`.
fn index(mut args: Vec<Value>) -> Result<Value> {
    let indices = args.split_off(1);
    let mut item = args.swap_remove(0);
    for i in indices {
        item = match (&item, &i) {
            (Value::List(list), Value::Integer(n)) => usize::try_from(*n)
                .ok()
                .and_then(|n| list.get(n))
                .cloned()
                .ok_or_else(|| CallError::Failed(format!("index out of range: {n}")))?,
            (Value::Map(map), Value::String(key)) => map.get(key).cloned().unwrap_or_default(),
            (Value::None, _) => {
                return Err(CallError::Failed("index of untyped nil".into()));
            }
            (Value::List(_), i) | (Value::Map(_), i) => {
                return Err(CallError::Failed(format!(
                    "cannot index {} with {}",
                    item.human(),
                    i.human()
                )));
            }
            (item, _) => {
                return Err(CallError::Failed(format!(
                    "can't index item of type {}",
                    item.human()
                )));
            }
        };
    }
    Ok(item)
}

/// Returns whether the first argument equals any of the others.
fn eq(args: Vec<Value>) -> Result<bool> {
    let (first, rest) = match args.split_first() {
        Some(split) => split,
        None => return Err(CallError::Failed("missing argument for comparison".into())),
    };
    if rest.is_empty() {
        return Err(CallError::Failed("missing argument for comparison".into()));
    }
    for other in rest {
        let equal = match (first, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                cmp(first, other)?.is_eq()
            }
            (a, b) => match (a.as_str(), b.as_str()) {
                (Some(a), Some(b)) => a == b,
                _ => return Err(err_incompatible(first, other)),
            },
        };
        if equal {
            return Ok(true);
        }
    }
    Ok(false)
}

fn cmp(a: &Value, b: &Value) -> Result<Ordering> {
    let ord = match (a, b) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => {
            return Err(err_incompatible(a, b));
        }
        (a, b) => match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => {
                let bad = [a, b].into_iter().find(|v| !is_ordered(v));
                return Err(match bad {
                    Some(v) => CallError::Failed(format!(
                        "invalid type for comparison: {}",
                        v.human()
                    )),
                    None => err_incompatible(a, b),
                });
            }
        },
    };
    ord.ok_or_else(|| CallError::Failed("NaN is not comparable".into()))
}

fn is_ordered(v: &Value) -> bool {
    matches!(
        v,
        Value::Integer(_) | Value::Float(_) | Value::String(_) | Value::Html(_)
    )
}

fn err_incompatible(a: &Value, b: &Value) -> CallError {
    CallError::Failed(format!(
        "incompatible types for comparison: {} and {}",
        a.human(),
        b.human()
    ))
}

/// Formats like `print` but always adds spaces and a trailing newline.
fn println(args: Vec<Value>) -> Result<String> {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&to_text(arg).map_err(CallError::Failed)?);
    }
    out.push('\n');
    Ok(out)
}

/// Escapes text for use in a URL query.
fn query_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            b => {
                out.push('%');
                out.push(char::from(b"0123456789ABCDEF"[usize::from(b >> 4)]));
                out.push(char::from(b"0123456789ABCDEF"[usize::from(b & 0xf)]));
            }
        }
    }
    out
}
