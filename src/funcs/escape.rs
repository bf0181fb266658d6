//! The HTML escapers and the text conversion they share with `print`.

use std::borrow::Cow;

use crate::funcs::CallError;
use crate::render::value::to_text;
use crate::Value;

/// Formats the arguments like `print`, spaces are added between operands
/// when neither is a string.
pub(crate) fn sprint(args: &[Value]) -> Result<String, CallError> {
    let mut out = String::new();
    let mut prev_is_string = true;
    for (i, arg) in args.iter().enumerate() {
        let is_string = matches!(arg, Value::String(_) | Value::Html(_));
        if i > 0 && !is_string && !prev_is_string {
            out.push(' ');
        }
        out.push_str(&to_text(arg).map_err(CallError::Failed)?);
        prev_is_string = is_string;
    }
    Ok(out)
}

/// Escapes text for an HTML text node. Safe HTML passes through unchanged.
pub(crate) fn html_escaper(args: Vec<Value>) -> Result<Value, CallError> {
    if let [Value::Html(s)] = args.as_slice() {
        return Ok(Value::Html(s.clone()));
    }
    let s = sprint(&args)?;
    Ok(Value::String(escape_html(&s).into_owned()))
}

/// Escapes text for an unquoted HTML attribute value. Tags are stripped
/// from safe HTML first.
pub(crate) fn attr_escaper(args: Vec<Value>) -> Result<Value, CallError> {
    if let [Value::Html(s)] = args.as_slice() {
        let stripped = strip_tags(s);
        return Ok(Value::String(escape_attr(&stripped, false).into_owned()));
    }
    let s = sprint(&args)?;
    Ok(Value::String(escape_attr(&s, true).into_owned()))
}

/// Escapes the characters that are unsafe in HTML text.
pub fn escape_html(s: &str) -> Cow<'_, str> {
    replace(s, |c| match c {
        '\0' => Some("\u{FFFD}"),
        '"' => Some("&#34;"),
        '&' => Some("&amp;"),
        '\'' => Some("&#39;"),
        '+' => Some("&#43;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    })
}

/// Escapes the characters that are unsafe in an unquoted attribute value.
///
/// When `amp` is false existing entities are left alone.
fn escape_attr(s: &str, amp: bool) -> Cow<'_, str> {
    replace(s, |c| match c {
        '\0' => Some("\u{FFFD}"),
        '\t' => Some("&#9;"),
        '\n' => Some("&#10;"),
        '\x0c' => Some("&#12;"),
        '\r' => Some("&#13;"),
        ' ' => Some("&#32;"),
        '"' => Some("&#34;"),
        '&' if amp => Some("&amp;"),
        '\'' => Some("&#39;"),
        '+' => Some("&#43;"),
        '<' => Some("&lt;"),
        '=' => Some("&#61;"),
        '>' => Some("&gt;"),
        '`' => Some("&#96;"),
        _ => None,
    })
}

fn replace<F>(s: &str, f: F) -> Cow<'_, str>
where
    F: Fn(char) -> Option<&'static str>,
{
    let Some(first) = s.char_indices().find(|(_, c)| f(*c).is_some()) else {
        return Cow::Borrowed(s);
    };
    let mut out = String::with_capacity(s.len() + 8);
    out.push_str(&s[..first.0]);
    for c in s[first.0..].chars() {
        match f(c) {
            Some(r) => out.push_str(r),
            None => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Removes tags like `<b>`, `</a>` and `<!-- -->` from HTML.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('<') {
        out.push_str(&rest[..i]);
        let tag = &rest[i..];
        let is_tag = tag[1..]
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '/' || c == '!');
        match tag.find('>') {
            Some(j) if is_tag => rest = &tag[j + 1..],
            _ => {
                out.push('<');
                rest = &tag[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
