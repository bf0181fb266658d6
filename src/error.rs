use std::cmp::max;
use std::fmt;
use std::io;

use crate::types::span::Span;

/// A convenient type alias for results in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur during template parsing, compilation or
/// rendering.
///
/// The [`Display`][fmt::Display] implementation renders
/// `name:line:col: message` when the error can be attributed to a place in
/// a template. The alternate form (`{:#}`) renders the offending source
/// line with the span underlined.
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
    location: Option<Location>,
}

/// The stage at which an [`Error`] occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The template source could not be parsed.
    Syntax,
    /// The parse tree could not be compiled, e.g. an unknown function.
    Compile,
    /// A runtime error, e.g. a field lookup on a nil pointer or an error
    /// returned from a called function.
    Render,
    /// Writing to the output failed.
    Io,
    /// The render context could not be converted to a value.
    Serialize,
}

#[derive(Clone)]
struct Location {
    name: Option<String>,
    source: String,
    span: Span,
}

impl Error {
    fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            location: None,
        }
    }

    fn located(kind: ErrorKind, msg: impl Into<String>, source: &str, span: impl Into<Span>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            location: Some(Location {
                name: None,
                source: source.to_owned(),
                span: span.into(),
            }),
        }
    }

    pub(crate) fn syntax(msg: impl Into<String>, source: &str, span: impl Into<Span>) -> Self {
        Self::located(ErrorKind::Syntax, msg, source, span)
    }

    pub(crate) fn compile(msg: impl Into<String>, source: &str, span: impl Into<Span>) -> Self {
        Self::located(ErrorKind::Compile, msg, source, span)
    }

    pub(crate) fn compile_unlocated(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compile, msg)
    }

    /// A runtime error, located when the failing instruction has a known
    /// source span.
    pub(crate) fn render(msg: impl Into<String>, at: Option<(&str, Span)>) -> Self {
        match at {
            Some((source, span)) => Self::located(ErrorKind::Render, msg, source, span),
            None => Self::new(ErrorKind::Render, msg),
        }
    }

    /// Attaches the template name if the error has a location without one,
    /// anonymous templates have an empty name.
    pub(crate) fn with_template_name(mut self, name: &str) -> Self {
        if name.is_empty() {
            return self;
        }
        if let Some(loc) = &mut self.location {
            if loc.name.is_none() {
                loc.name = Some(name.to_owned());
            }
        }
        self
    }

    /// The stage at which this error occurred.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The error message without location information.
    #[inline]
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// The name of the template the error occurred in, if known.
    pub fn template_name(&self) -> Option<&str> {
        self.location.as_ref().and_then(|loc| loc.name.as_deref())
    }

    /// The one-based line and column the error occurred at, if known.
    pub fn line_col(&self) -> Option<(usize, usize)> {
        self.location
            .as_ref()
            .map(|loc| loc.span.line_col(&loc.source))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::Io, format!("failed to write output: {err}"))
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Self::new(ErrorKind::Serialize, msg.to_string())
    }
}

impl std::error::Error for Error {}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => fmt_pretty(&self.msg, loc, f),
            None => write!(f, "{}", self.msg),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) if f.alternate() => fmt_pretty(&self.msg, loc, f),
            Some(loc) => {
                let (line, col) = loc.span.line_col(&loc.source);
                if let Some(name) = &loc.name {
                    write!(f, "{name}:")?;
                }
                write!(f, "{line}:{col}: {}", self.msg)
            }
            None => write!(f, "{}", self.msg),
        }
    }
}

fn fmt_pretty(msg: &str, loc: &Location, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Location { name, source, span } = loc;
    let lines: Vec<_> = source.split_terminator('\n').collect();
    let (line, col) = to_line_col(&lines, span.m);
    let span_width = max(1, width(&source[span.m.min(source.len())..span.n.min(source.len())]));
    let code = lines
        .get(line)
        .or_else(|| lines.last())
        .copied()
        .unwrap_or_default();

    let num = (line + 1).to_string();
    let pad = width(&num);
    let underline = "^".repeat(span_width);

    if let Some(name) = name {
        write!(f, "\n  --> {name}:{}:{}", line + 1, col + 1)?;
    }
    write!(
        f,
        "\n \
        {0:pad$} |\n \
        {num:>} | {code}\n \
        {0:pad$} | {underline:>w$} {msg}\n",
        "",
        pad = pad,
        num = num,
        code = code,
        underline = underline,
        w = col + span_width,
        msg = msg
    )
}

fn to_line_col(lines: &[&str], offset: usize) -> (usize, usize) {
    let mut n = 0;
    for (i, line) in lines.iter().enumerate() {
        let len = line.len() + 1;
        if n + len > offset {
            return (i, width(&line[..offset - n]));
        }
        n += len;
    }
    (
        lines.len().saturating_sub(1),
        lines.last().map(|l| width(l)).unwrap_or(0),
    )
}

#[cfg(feature = "unicode")]
fn width(s: &str) -> usize {
    use unicode_width::UnicodeWidthStr;
    s.width()
}

#[cfg(not(feature = "unicode"))]
fn width(s: &str) -> usize {
    s.chars().count()
}
