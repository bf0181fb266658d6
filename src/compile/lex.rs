use crate::types::span::Span;
use crate::types::syntax::Syntax;
use crate::{Error, Result};

/// A lexer that tokenizes the template source into distinct chunks so that the
/// parser doesn't have to operate on raw text.
///
/// The lexer is implemented as a fallible iterator. The parser should
/// repeatedly call the [`.next()?`][Lexer::next] method to return the next
/// non-whitespace token until [`None`] is returned.
pub struct Lexer<'a> {
    /// The action delimiters.
    syntax: &'a Syntax,

    /// The original template source.
    pub source: &'a str,

    /// A cursor over the template source.
    cursor: usize,

    /// The current state of the lexer.
    state: State,

    /// Whether to left trim the next raw token.
    left_trim: bool,

    /// A buffer to store the next token.
    next: Option<(Token, Span)>,
}

/// The state of the lexer.
///
/// The lexer requires state because the tokenization is different when
/// tokenizing text between action delimiters, e.g. `{{ .Name }}`.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Within raw template.
    Template,

    /// Between action delimiters.
    Action {
        /// The span of the begin delimiter.
        begin: Span,
    },
}

/// The unit yielded by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Raw template
    Raw,
    /// Begin action delimiter, e.g. `{{` or `{{-`
    BeginAction,
    /// End action delimiter, e.g. `}}` or `-}}`
    EndAction,
    /// A comment, e.g. `/* note */`
    Comment,
    /// `.`
    Dot,
    /// A field chain, e.g. `.Name` or `.User.Name`
    Field,
    /// A variable with an optional field chain, e.g. `$`, `$x` or `$x.Name`
    Variable,
    /// A function name
    Ident,
    /// A keyword like `if` or `range`
    Keyword,
    /// `|`
    Pipe,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `,`
    Comma,
    /// `:=`
    Declare,
    /// `=`
    Assign,
    /// A quoted string literal, e.g. `"Hello\n"`
    String,
    /// A raw string literal, e.g. `` `C:\dir` ``
    RawString,
    /// An integer or float literal, e.g. `19`, `-1.5e3` or `0x7f`
    Number,
    /// Sequence of spaces, tabs and newlines
    Whitespace,
}

impl<'a> Lexer<'a> {
    /// Construct a new lexer.
    pub fn new(syntax: &'a Syntax, source: &'a str) -> Self {
        Self {
            syntax,
            source,
            cursor: 0,
            state: State::Template,
            left_trim: false,
            next: None,
        }
    }

    /// Returns the next non-whitespace token and its span.
    pub fn next(&mut self) -> Result<Option<(Token, Span)>> {
        loop {
            match self.lex()? {
                Some((tk, sp)) if !tk.is_whitespace() => return Ok(Some((tk, sp))),
                None => return Ok(None),
                _ => continue,
            }
        }
    }

    /// Returns the next token and span.
    fn lex(&mut self) -> Result<Option<(Token, Span)>> {
        if let Some(next) = self.next.take() {
            return Ok(Some(next));
        }

        let i = self.cursor;

        if self.source[i..].is_empty() {
            return match self.state {
                State::Template => Ok(None),
                State::Action { begin } => Err(self.err_unclosed(begin)),
            };
        }

        match self.state {
            State::Template => self.lex_template(i),
            State::Action { begin } => self.lex_action(begin, i),
        }
    }

    fn lex_template(&mut self, i: usize) -> Result<Option<(Token, Span)>> {
        // We are within raw template, that means all we have to do is
        // find the next begin delimiter from `i`. The following diagram
        // helps describe the variable naming.
        //
        // xxxxxxx{{- xxxxxxx
        //    ^   ^  ^
        //    i   j  k

        let left = self.syntax.left.as_str();

        let mut trim_raw_token = |mut i: usize, mut j: usize, right_trim: bool| {
            if right_trim {
                j = self.source[..j].trim_end().len().max(i);
            }
            if self.left_trim {
                self.left_trim = false;
                let s = &self.source[i..j];
                i += s.len() - s.trim_start().len();
            }
            Ok(Some((Token::Raw, Span::from(i..j))))
        };

        match self.source[i..].find(left).map(|d| i + d) {
            Some(j) => {
                let mut k = j + left.len();
                let trim = is_trim_marker(&self.source[k..]);
                if trim {
                    k += 1;
                }
                let begin = Span::from(j..k);
                self.cursor = k;
                self.state = State::Action { begin };

                if i == j {
                    // The current cursor is exactly at the delimiter.
                    self.left_trim = false;
                    Ok(Some((Token::BeginAction, begin)))
                } else {
                    // We must first emit the raw token, so we store the
                    // begin delimiter token in the `next` buffer.
                    self.next = Some((Token::BeginAction, begin));
                    trim_raw_token(i, j, trim)
                }
            }
            None => {
                let j = self.source.len();
                self.cursor = j;
                trim_raw_token(i, j, false)
            }
        }
    }

    fn lex_action(&mut self, begin: Span, i: usize) -> Result<Option<(Token, Span)>> {
        // We are between two delimiters {{ ... }} that means we must parse
        // template syntax relevant tokens and also lookout for the end
        // delimiter.

        let right = self.syntax.right.as_str();
        let rest = &self.source[i..];

        if rest.starts_with(right) {
            return Ok(Some(self.end_action(i, i + right.len(), false)));
        }
        if rest.starts_with('-')
            && rest[1..].starts_with(right)
            && self.source[..i].ends_with(is_whitespace)
        {
            return Ok(Some(self.end_action(i, i + 1 + right.len(), true)));
        }
        if rest.starts_with("/*") {
            return self.lex_comment(begin, i).map(Some);
        }

        // We iterate over chars because that is nicer than operating on
        // raw bytes. The map call here fixes the index to be relative
        // to the actual template source.
        let mut iter = rest.char_indices().map(|(d, c)| (i + d, c));

        let Some((_, c)) = iter.next() else {
            return Err(self.err_unclosed(begin));
        };

        let (tk, j) = match c {
            // Single character to token mappings.
            '|' => (Token::Pipe, i + 1),
            '(' => (Token::LeftParen, i + 1),
            ')' => (Token::RightParen, i + 1),
            ',' => (Token::Comma, i + 1),
            '=' => (Token::Assign, i + 1),

            // Multi-character tokens with a distinct start character.
            ':' => match iter.next() {
                Some((_, '=')) => (Token::Declare, i + 2),
                _ => return Err(self.err_unexpected_character(i..i + 1)),
            },
            '.' => match iter.clone().next() {
                Some((_, c)) if is_ident_start(c) => (Token::Field, self.lex_fields(i)),
                Some((_, c)) if c.is_ascii_digit() => (Token::Number, self.lex_number(i)),
                _ => (Token::Dot, i + 1),
            },
            '$' => {
                let j = self.lex_while(iter, is_ident);
                (Token::Variable, self.lex_fields(j))
            }
            '"' => (Token::String, self.lex_string(iter, i)?),
            '`' => (Token::RawString, self.lex_raw_string(iter, i)?),
            '+' | '-' if matches!(iter.clone().next(), Some((_, c)) if c.is_ascii_digit() || c == '.') => {
                (Token::Number, self.lex_number(i))
            }
            c if c.is_ascii_digit() => (Token::Number, self.lex_number(i)),
            c if is_whitespace(c) => (Token::Whitespace, self.lex_while(iter, is_whitespace)),
            c if is_ident_start(c) => {
                let j = self.lex_while(iter, is_ident);
                let tk = match KEYWORDS.contains(&&self.source[i..j]) {
                    true => Token::Keyword,
                    false => Token::Ident,
                };
                (tk, j)
            }

            // Any other character...
            c => {
                return Err(self.err_unexpected_character(i..(i + c.len_utf8())));
            }
        };

        // Finally, we need to update the cursor.
        self.cursor = j;

        Ok(Some((tk, Span::from(i..j))))
    }

    fn end_action(&mut self, i: usize, j: usize, trim: bool) -> (Token, Span) {
        self.cursor = j;
        self.state = State::Template;
        self.left_trim = trim;
        (Token::EndAction, Span::from(i..j))
    }

    fn lex_comment(&mut self, begin: Span, i: usize) -> Result<(Token, Span)> {
        // A comment must be directly followed by the end delimiter. The
        // following diagram helps describe the variable naming.
        //
        // {{/* cccccc */ -}}
        //     ^        ^
        //     i        j

        let j = match self.source[i + 2..].find("*/") {
            Some(d) => i + 2 + d + 2,
            None => return Err(Error::syntax("unclosed comment", self.source, i..i + 2)),
        };
        let after = self.source[j..].trim_start_matches(is_whitespace);
        let right = self.syntax.right.as_str();
        if !(after.starts_with(right) || (after.starts_with('-') && after[1..].starts_with(right))) {
            return Err(Error::syntax(
                "comment ends before closing delimiter",
                self.source,
                begin.combine(Span::from(i..j)),
            ));
        }
        self.cursor = j;
        Ok((Token::Comment, Span::from(i..j)))
    }

    /// Consumes a chain of `.Ident` segments starting at `i`.
    fn lex_fields(&self, mut i: usize) -> usize {
        loop {
            let mut chars = self.source[i..].chars();
            match (chars.next(), chars.next()) {
                (Some('.'), Some(c)) if is_ident_start(c) => {
                    let iter = self.source[i + 1..]
                        .char_indices()
                        .map(|(d, c)| (i + 1 + d, c));
                    i = self.lex_while(iter, is_ident);
                }
                _ => return i,
            }
        }
    }

    fn lex_number(&self, i: usize) -> usize {
        let bytes = self.source.as_bytes();
        let hex = self.source[i..]
            .trim_start_matches(['+', '-'])
            .starts_with(['0'])
            && matches!(
                self.source[i..].trim_start_matches(['+', '-']).as_bytes().get(1),
                Some(b'x' | b'X')
            );
        let mut j = i + 1;
        while let Some(&b) = bytes.get(j) {
            let prev = bytes[j - 1];
            let exp = if hex {
                matches!(prev, b'p' | b'P')
            } else {
                matches!(prev, b'e' | b'E')
            };
            match b {
                b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'.' => j += 1,
                b'+' | b'-' if exp => j += 1,
                _ => break,
            }
        }
        j
    }

    fn lex_string<I>(&mut self, mut iter: I, i: usize) -> Result<usize>
    where
        I: Iterator<Item = (usize, char)> + Clone,
    {
        let mut curr = '"';
        loop {
            match iter.next() {
                None => {
                    return Err(self.err_undelimited_string(i..self.source.len()));
                }
                Some((j, '\r' | '\n')) => {
                    return Err(self.err_undelimited_string(i..j));
                }
                Some((j, '"')) if curr != '\\' => {
                    return Ok(j + 1);
                }
                Some((_, '\\')) if curr == '\\' => {
                    curr = ' ';
                }
                Some((_, c)) => {
                    curr = c;
                }
            }
        }
    }

    fn lex_raw_string<I>(&mut self, mut iter: I, i: usize) -> Result<usize>
    where
        I: Iterator<Item = (usize, char)> + Clone,
    {
        match iter.find(|(_, c)| *c == '`') {
            Some((j, _)) => Ok(j + 1),
            None => Err(self.err_undelimited_string(i..self.source.len())),
        }
    }

    fn lex_while<I, P>(&self, mut iter: I, pred: P) -> usize
    where
        I: Iterator<Item = (usize, char)> + Clone,
        P: Fn(char) -> bool,
    {
        loop {
            match iter.clone().next() {
                Some((_, c)) if pred(c) => {
                    iter.next();
                }
                Some((j, _)) => return j,
                None => return self.source.len(),
            }
        }
    }

    fn err_unclosed(&self, begin: Span) -> Error {
        Error::syntax("unclosed action", self.source, begin)
    }

    fn err_unexpected_character(&self, span: impl Into<Span>) -> Error {
        Error::syntax("unexpected character", self.source, span)
    }

    fn err_undelimited_string(&self, span: impl Into<Span>) -> Error {
        Error::syntax("undelimited string", self.source, span)
    }
}

pub(crate) const KEYWORDS: &[&str] = &[
    "block", "break", "continue", "define", "else", "end", "false", "if", "nil", "range",
    "template", "true", "with",
];

impl Token {
    pub fn human(&self) -> &'static str {
        match self {
            Self::Raw => "raw template",
            Self::BeginAction => "begin action",
            Self::EndAction => "end action",
            Self::Comment => "comment",
            Self::Dot => "dot",
            Self::Field => "field",
            Self::Variable => "variable",
            Self::Ident => "identifier",
            Self::Keyword => "keyword",
            Self::Pipe => "pipe",
            Self::LeftParen => "left parenthesis",
            Self::RightParen => "right parenthesis",
            Self::Comma => "comma",
            Self::Declare => "declaration",
            Self::Assign => "assignment",
            Self::String | Self::RawString => "string",
            Self::Number => "number",
            Self::Whitespace => "whitespace",
        }
    }

    fn is_whitespace(&self) -> bool {
        matches!(self, Self::Whitespace)
    }
}

/// A trim marker is a `-` followed by whitespace.
fn is_trim_marker(s: &str) -> bool {
    let mut chars = s.chars();
    matches!((chars.next(), chars.next()), (Some('-'), Some(c)) if is_whitespace(c))
}

fn is_whitespace(c: char) -> bool {
    matches!(c, '\t' | ' ' | '\r' | '\n')
}

#[cfg(feature = "unicode")]
fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

#[cfg(feature = "unicode")]
fn is_ident(c: char) -> bool {
    unicode_ident::is_xid_continue(c)
}

#[cfg(not(feature = "unicode"))]
fn is_ident_start(c: char) -> bool {
    matches!(c, 'A'..='Z' | 'a'..='z' | '_')
}

#[cfg(not(feature = "unicode"))]
fn is_ident(c: char) -> bool {
    matches!(c, '0'..='9' | 'A'..='Z' | 'a'..='z' | '_')
}
