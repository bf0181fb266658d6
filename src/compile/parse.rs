use std::fmt::Display;
use std::mem;
use std::sync::Arc;

use crate::compile::lex::{Lexer, Token};
use crate::types::span::Span;
use crate::types::syntax::Syntax;
use crate::types::tree::{
    Arg, ArgKind, BranchNode, CommandNode, ListNode, Node, Number, PipeNode, TemplateNode,
    TextNode, Tree, VariableNode,
};
use crate::{Error, Result};

/// A parser that constructs parse trees from a token stream.
///
/// The parser is implemented as a simple hand written parser with no
/// recursion for the template structure. Only parenthesized pipelines are
/// parsed recursively. It sometimes needs to peek at the next token to know
/// how to proceed and uses the `peeked` buffer to do this.
pub struct Parser<'a> {
    /// A lexer that tokenizes the template source.
    tokens: Lexer<'a>,

    /// The name of the template being parsed.
    name: &'a str,

    /// The end of the last token returned, used to detect chained fields.
    last: usize,

    /// Remember a peeked value, even if it was `None`
    peeked: Option<Option<(Token, Span)>>,
}

/// Stores the state of a control structure during parsing.
enum State {
    /// A partial `if`, `with` or `range` action.
    Branch {
        kind: BranchKind,
        /// Whether this was opened by an `else if` or `else with` clause.
        chained: bool,
        pipe: PipeNode,
        /// The span of the opening action.
        span: Span,
        has_else: bool,
    },

    /// A partial `define` action, the body becomes its own tree.
    Define { name: String, span: Span },

    /// A partial `block` action, the body becomes its own tree and is
    /// invoked in place.
    Block {
        name: String,
        pipe: PipeNode,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchKind {
    If,
    With,
    Range,
}

/// A parsed action.
enum Action {
    Comment,
    Pipe(PipeNode),
    Branch(BranchKind, PipeNode),
    ElseBranch(BranchKind, PipeNode),
    Else,
    End,
    Template(String, Option<PipeNode>),
    Define(String),
    Block(String, PipeNode),
    Break,
    Continue,
}

#[derive(Clone, Copy)]
enum Sign {
    Neg,
    Pos,
}

impl<'a> Parser<'a> {
    /// Construct a new parser.
    pub fn new(syntax: &'a Syntax, name: &'a str, source: &'a str) -> Self {
        Self {
            tokens: Lexer::new(syntax, source),
            name,
            last: 0,
            peeked: None,
        }
    }

    /// Parses a template and every template it defines. The first tree
    /// returned is always the named template itself.
    ///
    /// This function works using two stacks:
    /// - A stack of control structures e.g. `{{if .X}} ... {{else}}`.
    /// - A stack of lists which collect each parsed node.
    pub fn parse_templates(mut self) -> Result<Vec<Tree>> {
        let source: Arc<str> = Arc::from(self.source());
        let mut defined: Vec<Tree> = Vec::new();
        let mut blocks: Vec<State> = Vec::new();
        let mut lists: Vec<ListNode> = Vec::new();
        let mut list = ListNode::default();

        while let Some(next) = self.next()? {
            let node = match next {
                // Raw template, trimming might have left it empty.
                (Token::Raw, span) => {
                    if span.m == span.n {
                        continue;
                    }
                    let text = self.source()[span].to_owned();
                    Node::Text(TextNode { span, text })
                }

                (Token::BeginAction, begin) => {
                    let action = self.parse_action()?;
                    let end = self.expect(Token::EndAction)?;
                    let span = begin.combine(end);

                    match action {
                        Action::Comment => Node::Comment(span),
                        Action::Pipe(pipe) => Node::Action(pipe),
                        Action::Break => Node::Break(span),
                        Action::Continue => Node::Continue(span),
                        Action::Template(name, pipe) => {
                            Node::Template(TemplateNode { span, name, pipe })
                        }

                        // The start of a control structure. For example:
                        //
                        //   {{if .Enabled}}
                        //
                        // We must push a state to the block stack and a new
                        // list since the body is collected separately.
                        Action::Branch(kind, pipe) => {
                            blocks.push(State::Branch {
                                kind,
                                chained: false,
                                pipe,
                                span,
                                has_else: false,
                            });
                            lists.push(mem::take(&mut list));
                            continue;
                        }

                        // An `else if` or `else with` clause. For example:
                        //
                        //   {{else if .Admin}}
                        //
                        // This is desugared into an `else` clause containing
                        // a nested structure, so we push two lists, one for
                        // the `else` and one for the nested body.
                        Action::ElseBranch(kind, pipe) => {
                            self.start_else(&mut blocks, span)?;
                            blocks.push(State::Branch {
                                kind,
                                chained: true,
                                pipe,
                                span,
                                has_else: false,
                            });
                            lists.push(mem::take(&mut list));
                            lists.push(ListNode::default());
                            continue;
                        }

                        // The `else` clause. For example:
                        //
                        //   {{else}}
                        //
                        Action::Else => {
                            self.start_else(&mut blocks, span)?;
                            lists.push(mem::take(&mut list));
                            continue;
                        }

                        Action::Define(name) => {
                            if !blocks.is_empty() {
                                return Err(Error::syntax(
                                    "unexpected `define` inside a control structure",
                                    self.source(),
                                    span,
                                ));
                            }
                            blocks.push(State::Define { name, span });
                            lists.push(mem::take(&mut list));
                            continue;
                        }

                        Action::Block(name, pipe) => {
                            blocks.push(State::Block { name, pipe, span });
                            lists.push(mem::take(&mut list));
                            continue;
                        }

                        // The end of a structure. For example:
                        //
                        //   {{end}}
                        //
                        // We have to make sure to pop back the lists until
                        // we get to the original structure. Any chained
                        // clauses along the way become the `else` list of
                        // their parent.
                        Action::End => {
                            let err = || Error::syntax("unexpected `end`", self.source(), span);
                            let node = loop {
                                let state = blocks.pop().ok_or_else(err)?;
                                let body = mem::replace(&mut list, lists.pop().unwrap_or_default());
                                match state {
                                    State::Branch {
                                        kind,
                                        chained,
                                        pipe,
                                        span: open,
                                        has_else,
                                    } => {
                                        let (body, else_list) = match has_else {
                                            true => {
                                                let then = mem::replace(
                                                    &mut list,
                                                    lists.pop().unwrap_or_default(),
                                                );
                                                (then, Some(body))
                                            }
                                            false => (body, None),
                                        };
                                        let branch = BranchNode {
                                            span: open.combine(span),
                                            pipe,
                                            list: body,
                                            else_list,
                                        };
                                        let node = match kind {
                                            BranchKind::If => Node::If(branch),
                                            BranchKind::With => Node::With(branch),
                                            BranchKind::Range => Node::Range(branch),
                                        };
                                        if !chained {
                                            break Some(node);
                                        }
                                        list.push(node);
                                    }
                                    State::Define { name, span: open } => {
                                        let tree = Tree {
                                            name,
                                            source: source.clone(),
                                            root: body,
                                        };
                                        self.define(&mut defined, tree, open)?;
                                        break None;
                                    }
                                    State::Block {
                                        name,
                                        pipe,
                                        span: open,
                                    } => {
                                        let tree = Tree {
                                            name: name.clone(),
                                            source: source.clone(),
                                            root: body,
                                        };
                                        self.define(&mut defined, tree, open)?;
                                        break Some(Node::Template(TemplateNode {
                                            span: open,
                                            name,
                                            pipe: Some(pipe),
                                        }));
                                    }
                                }
                            };
                            match node {
                                Some(node) => node,
                                None => continue,
                            }
                        }
                    }
                }

                (tk, span) => {
                    return Err(self.err_unexpected_token("raw template or action", tk, span));
                }
            };
            list.push(node);
        }

        if let Some(block) = blocks.first() {
            let (msg, span) = match block {
                State::Branch {
                    kind: BranchKind::If,
                    span,
                    ..
                } => ("unclosed `if` action", span),
                State::Branch {
                    kind: BranchKind::With,
                    span,
                    ..
                } => ("unclosed `with` action", span),
                State::Branch {
                    kind: BranchKind::Range,
                    span,
                    ..
                } => ("unclosed `range` action", span),
                State::Define { span, .. } => ("unclosed `define` action", span),
                State::Block { span, .. } => ("unclosed `block` action", span),
            };
            return Err(Error::syntax(msg, self.source(), *span));
        }

        let root = Tree {
            name: self.name.to_owned(),
            source,
            root: list,
        };
        if defined.iter().any(|t| t.name == root.name) {
            return Err(Error::syntax(
                format!("multiple definition of template \"{}\"", root.name),
                self.source(),
                0..0,
            ));
        }
        let mut trees = vec![root];
        trees.extend(defined);
        Ok(trees)
    }

    /// Marks the innermost control structure as having an `else` clause.
    fn start_else(&self, blocks: &mut [State], span: Span) -> Result<()> {
        let err = || Error::syntax("unexpected `else`", self.source(), span);
        match blocks.last_mut().ok_or_else(err)? {
            State::Branch {
                has_else: has_else @ false,
                ..
            } => {
                *has_else = true;
                Ok(())
            }
            _ => Err(err()),
        }
    }

    fn define(&self, defined: &mut Vec<Tree>, tree: Tree, span: Span) -> Result<()> {
        if defined.iter().any(|t| t.name == tree.name) {
            return Err(Error::syntax(
                format!("multiple definition of template \"{}\"", tree.name),
                self.source(),
                span,
            ));
        }
        defined.push(tree);
        Ok(())
    }

    /// Parses the contents of a single action. All of the following are
    /// valid actions.
    ///
    ///   /* a comment */
    ///
    ///   .User.Name | printf "%q"
    ///
    ///   if $x := .Items
    ///
    ///   else with .Fallback
    ///
    ///   template "row" .
    ///
    fn parse_action(&mut self) -> Result<Action> {
        let (tk, span) = match self.peek()? {
            Some(next) => next,
            None => return Err(self.err_unexpected_eof("action")),
        };
        match tk {
            Token::Comment => {
                self.next()?;
                return Ok(Action::Comment);
            }
            Token::Keyword => {}
            _ => return Ok(Action::Pipe(self.parse_pipeline("command", Token::EndAction)?)),
        }

        let action = match &self.source()[span] {
            "if" => Action::Branch(BranchKind::If, self.parse_control("if")?),
            "with" => Action::Branch(BranchKind::With, self.parse_control("with")?),
            "range" => Action::Branch(BranchKind::Range, self.parse_control("range")?),
            "else" => {
                self.next()?;
                match self.peek_keyword()? {
                    Some("if") => Action::ElseBranch(BranchKind::If, self.parse_control("if")?),
                    Some("with") => {
                        Action::ElseBranch(BranchKind::With, self.parse_control("with")?)
                    }
                    _ => Action::Else,
                }
            }
            "end" => {
                self.next()?;
                Action::End
            }
            "template" => {
                self.next()?;
                let name = self.parse_template_name("template")?;
                let pipe = match self.is_next(Token::EndAction)? {
                    true => None,
                    false => Some(self.parse_pipeline("template", Token::EndAction)?),
                };
                Action::Template(name, pipe)
            }
            "define" => {
                self.next()?;
                Action::Define(self.parse_template_name("define")?)
            }
            "block" => {
                self.next()?;
                let name = self.parse_template_name("block")?;
                Action::Block(name, self.parse_pipeline("block", Token::EndAction)?)
            }
            "break" => {
                self.next()?;
                Action::Break
            }
            "continue" => {
                self.next()?;
                Action::Continue
            }
            // `nil`, `true` and `false` start an ordinary pipeline.
            _ => Action::Pipe(self.parse_pipeline("command", Token::EndAction)?),
        };
        Ok(action)
    }

    /// Parses the keyword and the pipeline of `if`, `with` or `range`.
    fn parse_control(&mut self, context: &str) -> Result<PipeNode> {
        self.expect(Token::Keyword)?;
        self.parse_pipeline(context, Token::EndAction)
    }

    fn parse_template_name(&mut self, context: &str) -> Result<String> {
        match self.parse()? {
            (Token::String | Token::RawString, span) => self.parse_string(span),
            (tk, span) => Err(self.err_unexpected_token(
                format_args!("string template name in {context}"),
                tk,
                span,
            )),
        }
    }

    /// Parses a pipeline with optional declarations. For example:
    ///
    ///   $i, $e := .Items
    ///
    ///   .Name | printf "%s!" | html
    ///
    /// The pipeline ends before the `end` token, which is not consumed.
    fn parse_pipeline(&mut self, context: &str, end: Token) -> Result<PipeNode> {
        let mut decl = Vec::new();
        let mut is_assign = false;
        let mut first = None;

        if self.is_next(Token::Variable)? {
            let (tk, span) = self.parse()?;
            match self.peek()? {
                Some((Token::Declare | Token::Assign | Token::Comma, _)) => {
                    decl.push(self.parse_decl_var(span)?);
                    if self.is_next(Token::Comma)? {
                        self.expect(Token::Comma)?;
                        let span = self.expect(Token::Variable)?;
                        decl.push(self.parse_decl_var(span)?);
                    }
                    match self.parse()? {
                        (Token::Declare, _) => {}
                        (Token::Assign, _) => is_assign = true,
                        (tk, span) => {
                            return Err(self.err_unexpected_token("`:=` or `=`", tk, span));
                        }
                    }
                }
                _ => first = Some((tk, span)),
            }
        }

        let mut cmds = Vec::new();
        loop {
            let cmd = self.parse_command(first.take())?;
            cmds.push(cmd);
            if !self.is_next(Token::Pipe)? {
                break;
            }
            self.expect(Token::Pipe)?;
        }

        match self.peek()? {
            Some((tk, _)) if tk == end => {}
            Some((tk, span)) => return Err(self.err_unexpected_token(end.human(), tk, span)),
            None => return Err(self.err_unexpected_eof(end.human())),
        }

        let mut span = cmds
            .iter()
            .map(|c: &CommandNode| c.span)
            .reduce(Span::combine)
            .unwrap_or_default();
        if let Some(v) = decl.first() {
            span = span.combine(v.span);
        }
        if cmds.iter().any(|c| c.args.is_empty()) {
            return Err(Error::syntax(
                format!("missing value for {context}"),
                self.source(),
                span,
            ));
        }
        Ok(PipeNode {
            span,
            is_assign,
            decl,
            cmds,
        })
    }

    fn parse_decl_var(&self, span: Span) -> Result<VariableNode> {
        let name = &self.source()[span];
        if name.contains('.') {
            return Err(Error::syntax(
                "cannot declare a variable with fields",
                self.source(),
                span,
            ));
        }
        Ok(VariableNode {
            span,
            name: name.to_owned(),
        })
    }

    /// Parses a single command, a sequence of operands separated by
    /// whitespace.
    ///
    ///   printf "%d items" (len .Items)
    ///
    fn parse_command(&mut self, first: Option<(Token, Span)>) -> Result<CommandNode> {
        let mut args = Vec::new();
        if let Some((tk, span)) = first {
            args.push(self.parse_operand(tk, span)?);
        }
        loop {
            match self.peek()? {
                Some((Token::Pipe | Token::RightParen | Token::EndAction, _)) | None => break,
                Some(_) => {
                    let (tk, span) = self.parse()?;
                    args.push(self.parse_operand(tk, span)?);
                }
            }
        }
        let span = args
            .iter()
            .map(|a: &Arg| a.span)
            .reduce(Span::combine)
            .unwrap_or_default();
        Ok(CommandNode { span, args })
    }

    /// Parses a term followed by any chained fields.
    ///
    ///   (index .Users 0).Name
    ///
    fn parse_operand(&mut self, tk: Token, span: Span) -> Result<Arg> {
        let term = self.parse_term(tk, span)?;

        let mut fields = Vec::new();
        let mut end = term.span;
        while let Some((Token::Field, sp)) = self.peek()? {
            if sp.m != self.last {
                break;
            }
            self.next()?;
            fields.extend(self.source()[sp].split('.').skip(1).map(String::from));
            end = end.combine(sp);
        }
        if fields.is_empty() {
            return Ok(term);
        }

        match term.kind {
            ArgKind::Identifier(_) | ArgKind::Pipe(_) => Ok(Arg {
                span: end,
                kind: ArgKind::Chain(Box::new(term), fields),
            }),
            _ => Err(Error::syntax(
                "unexpected . after term",
                self.source(),
                term.span.n..end.n,
            )),
        }
    }

    fn parse_term(&mut self, tk: Token, span: Span) -> Result<Arg> {
        let raw = &self.source()[span];
        let kind = match tk {
            Token::Dot => ArgKind::Dot,
            Token::Field => ArgKind::Field(raw.split('.').skip(1).map(String::from).collect()),
            Token::Variable => ArgKind::Variable(raw.split('.').map(String::from).collect()),
            Token::Ident => ArgKind::Identifier(raw.to_owned()),
            Token::Keyword => match raw {
                "nil" => ArgKind::Nil,
                "true" => ArgKind::Bool(true),
                "false" => ArgKind::Bool(false),
                kw => return Err(self.err_unexpected_keyword(kw, span)),
            },
            Token::String | Token::RawString => ArgKind::String(self.parse_string(span)?),
            Token::Number => ArgKind::Number(self.parse_number(span)?),
            Token::LeftParen => {
                let pipe = self.parse_pipeline("parenthesized pipeline", Token::RightParen)?;
                let end = self.expect(Token::RightParen)?;
                return Ok(Arg {
                    span: span.combine(end),
                    kind: ArgKind::Pipe(Box::new(pipe)),
                });
            }
            tk => return Err(self.err_unexpected_token("operand", tk, span)),
        };
        Ok(Arg { span, kind })
    }

    /// Parses an integer or a float.
    ///
    /// Numbers containing a `.` or a decimal exponent are floats, all
    /// others are integers.
    fn parse_number(&self, span: Span) -> Result<Number> {
        let raw = &self.source()[span];
        let (sign, digits) = match raw.as_bytes()[0] {
            b'-' => (Sign::Neg, &raw[1..]),
            b'+' => (Sign::Pos, &raw[1..]),
            _ => (Sign::Pos, raw),
        };
        let offset = span.n - digits.len();
        let lower = digits.to_ascii_lowercase();
        let is_float = if lower.starts_with("0x") {
            lower.contains('p') || lower.contains('.')
        } else {
            lower.contains(['.', 'e'])
        };
        if is_float {
            self.parse_float(digits, span, sign)
        } else {
            self.parse_integer(digits, offset, span, sign)
        }
    }

    fn parse_integer(&self, digits: &str, offset: usize, span: Span, sign: Sign) -> Result<Number> {
        let bytes = digits.as_bytes();
        let (i, radix) = match bytes {
            [b'0', b'b' | b'B', ..] => (2, 2),
            [b'0', b'o' | b'O', ..] => (2, 8),
            [b'0', b'x' | b'X', ..] => (2, 16),
            [b'0', _, ..] => (1, 8),
            _ => (0, 10),
        };
        let int = bytes[i..]
            .iter()
            .enumerate()
            .filter(|(_, &d)| d != b'_')
            .try_fold(0i64, |acc, (j, &d)| {
                let x = (d as char).to_digit(radix).ok_or_else(|| {
                    let m = offset + i + j;
                    Error::syntax(
                        format!("invalid digit for base {radix} literal"),
                        self.source(),
                        m..m + 1,
                    )
                })?;
                let err = || {
                    Error::syntax(
                        format!("base {radix} literal out of range for 64-bit integer"),
                        self.source(),
                        span,
                    )
                };
                let value = acc.checked_mul(radix.into()).ok_or_else(err)?;
                match sign {
                    Sign::Pos => value.checked_add(x.into()),
                    Sign::Neg => value.checked_sub(x.into()),
                }
                .ok_or_else(err)
            })?;
        Ok(Number::Int(int))
    }

    fn parse_float(&self, digits: &str, span: Span, sign: Sign) -> Result<Number> {
        let float: f64 = digits
            .replace('_', "")
            .parse()
            .map_err(|_| Error::syntax("invalid float literal", self.source(), span))?;
        Ok(match sign {
            Sign::Neg => Number::Float(-float),
            Sign::Pos => Number::Float(float),
        })
    }

    /// Parses a quoted or raw string and handles escape characters.
    fn parse_string(&self, span: Span) -> Result<String> {
        let raw = &self.source()[span];
        let inner = &raw[1..raw.len() - 1];
        if raw.starts_with('`') || !inner.contains('\\') {
            return Ok(inner.to_owned());
        }

        let err = |i: usize, j: usize| {
            Error::syntax("unknown escape sequence", self.source(), i..j)
        };

        let mut iter = inner.char_indices().map(|(i, c)| (span.m + 1 + i, c)).peekable();
        let mut string = String::with_capacity(inner.len());
        while let Some((i, c)) = iter.next() {
            if c != '\\' {
                string.push(c);
                continue;
            }
            let Some((j, esc)) = iter.next() else {
                return Err(err(i, i + 1));
            };
            let c = match esc {
                'a' => '\x07',
                'b' => '\x08',
                'f' => '\x0c',
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                'v' => '\x0b',
                '\\' => '\\',
                '"' => '"',
                '\'' => '\'',
                'x' | 'u' | 'U' => {
                    let len = match esc {
                        'x' => 2,
                        'u' => 4,
                        _ => 8,
                    };
                    let mut code = 0u32;
                    let mut end = j + 1;
                    for _ in 0..len {
                        let (k, h) = iter.next().ok_or_else(|| err(i, end))?;
                        end = k + h.len_utf8();
                        code = code * 16 + h.to_digit(16).ok_or_else(|| err(i, end))?;
                    }
                    char::from_u32(code).ok_or_else(|| err(i, end))?
                }
                '0'..='7' => {
                    let mut code = esc.to_digit(8).unwrap_or(0);
                    let mut end = j + 1;
                    for _ in 0..2 {
                        let (k, o) = iter.next().ok_or_else(|| err(i, end))?;
                        end = k + 1;
                        code = code * 8 + o.to_digit(8).ok_or_else(|| err(i, end))?;
                    }
                    char::from_u32(code).ok_or_else(|| err(i, end))?
                }
                c => return Err(err(i, j + c.len_utf8())),
            };
            string.push(c);
        }
        Ok(string)
    }

    /// Returns the next token's text if it is a keyword.
    fn peek_keyword(&mut self) -> Result<Option<&'a str>> {
        match self.peek()? {
            Some((Token::Keyword, span)) => Ok(Some(&self.source()[span])),
            _ => Ok(None),
        }
    }

    /// Parses any token.
    fn parse(&mut self) -> Result<(Token, Span)> {
        match self.next()? {
            Some((tk, sp)) => Ok((tk, sp)),
            None => Err(self.err_unexpected_eof("token")),
        }
    }

    /// Parses the specified token and returns its span.
    fn expect(&mut self, exp: Token) -> Result<Span> {
        match self.next()? {
            Some((tk, span)) if tk == exp => Ok(span),
            Some((tk, span)) => Err(self.err_unexpected_token(exp.human(), tk, span)),
            None => Err(self.err_unexpected_eof(exp.human())),
        }
    }

    /// Returns `true` if the next token is equal to the provided one.
    fn is_next(&mut self, token: Token) -> Result<bool> {
        Ok(self.peek()?.map(|(tk, _)| tk == token).unwrap_or(false))
    }

    /// Returns a copy of the next token without affecting the result of the
    /// following `.next()` call.
    fn peek(&mut self) -> Result<Option<(Token, Span)>> {
        match self.peeked {
            Some(peeked) => Ok(peeked),
            None => {
                let peeked = self.tokens.next()?;
                self.peeked = Some(peeked);
                Ok(peeked)
            }
        }
    }

    /// Returns the next token and span in the stream.
    fn next(&mut self) -> Result<Option<(Token, Span)>> {
        let next = match self.peeked.take() {
            Some(v) => v,
            None => self.tokens.next()?,
        };
        if let Some((_, span)) = next {
            self.last = span.n;
        }
        Ok(next)
    }

    fn source(&self) -> &'a str {
        self.tokens.source
    }

    fn err_unexpected_eof(&self, exp: impl Display) -> Error {
        let n = self.source().len();
        Error::syntax(format!("expected {exp}, found EOF"), self.source(), n..n)
    }

    fn err_unexpected_token(&self, exp: impl Display, got: Token, span: Span) -> Error {
        let got = got.human();
        Error::syntax(format!("expected {exp}, found {got}"), self.source(), span)
    }

    fn err_unexpected_keyword(&self, kw: impl Display, span: Span) -> Error {
        Error::syntax(format!("unexpected keyword `{kw}`"), self.source(), span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Vec<Tree>> {
        let syntax = Syntax::default();
        Parser::new(&syntax, "test", source).parse_templates()
    }

    #[test]
    fn parse_text_and_action() {
        let trees = parse("Hello {{ .User.Name }}!").unwrap();
        assert_eq!(trees.len(), 1);
        let nodes = &trees[0].root.nodes;
        assert_eq!(nodes.len(), 3);
        match &nodes[1] {
            Node::Action(pipe) => match &pipe.cmds[0].args[0].kind {
                ArgKind::Field(idents) => assert_eq!(idents, &["User", "Name"]),
                kind => panic!("unexpected {kind:?}"),
            },
            node => panic!("unexpected {node:?}"),
        }
    }

    #[test]
    fn parse_declarations() {
        let trees = parse("{{range $i, $e := .Items}}{{$i}}{{end}}").unwrap();
        match &trees[0].root.nodes[0] {
            Node::Range(branch) => {
                let names: Vec<_> = branch.pipe.decl.iter().map(|v| v.name.as_str()).collect();
                assert_eq!(names, ["$i", "$e"]);
                assert!(!branch.pipe.is_assign);
                assert!(branch.else_list.is_none());
            }
            node => panic!("unexpected {node:?}"),
        }
    }

    #[test]
    fn parse_else_if_chain() {
        let trees = parse("{{if .A}}a{{else if .B}}b{{else}}c{{end}}").unwrap();
        let Node::If(outer) = &trees[0].root.nodes[0] else {
            panic!("expected if");
        };
        let else_list = outer.else_list.as_ref().unwrap();
        assert_eq!(else_list.nodes.len(), 1);
        let Node::If(inner) = &else_list.nodes[0] else {
            panic!("expected nested if");
        };
        assert!(inner.else_list.is_some());
    }

    #[test]
    fn parse_define_and_block() {
        let trees =
            parse(r#"{{define "a"}}A{{end}}{{block "b" .}}B{{end}}{{template "a"}}"#).unwrap();
        let names: Vec<_> = trees.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["test", "a", "b"]);
        assert!(matches!(trees[0].root.nodes[1], Node::Template(_)));
    }

    #[test]
    fn parse_chain_and_parens() {
        let trees = parse("{{(index .Users 0).Name}}").unwrap();
        let Node::Action(pipe) = &trees[0].root.nodes[0] else {
            panic!("expected action");
        };
        match &pipe.cmds[0].args[0].kind {
            ArgKind::Chain(inner, fields) => {
                assert!(matches!(inner.kind, ArgKind::Pipe(_)));
                assert_eq!(fields, &["Name"]);
            }
            kind => panic!("unexpected {kind:?}"),
        }
    }

    #[test]
    fn parse_literals() {
        let trees = parse(r#"{{print -0x1F 1.5 "a\tbé" `c\d` nil true}}"#).unwrap();
        let Node::Action(pipe) = &trees[0].root.nodes[0] else {
            panic!("expected action");
        };
        let kinds: Vec<_> = pipe.cmds[0].args.iter().map(|a| format!("{:?}", a.kind)).collect();
        assert_eq!(
            kinds,
            [
                "Identifier(\"print\")",
                "Number(Int(-31))",
                "Number(Float(1.5))",
                "String(\"a\\tbé\")",
                "String(\"c\\\\d\")",
                "Nil",
                "Bool(true)",
            ]
        );
    }

    #[test]
    fn parse_errors() {
        let cases = [
            ("{{end}}", "unexpected `end`"),
            ("{{else}}", "unexpected `else`"),
            ("{{if .}}", "unclosed `if` action"),
            ("{{}}", "missing value for command"),
            ("{{(.}}", "expected right parenthesis, found end action"),
            ("{{. |}}", "missing value for command"),
            ("{{\"a\".B}}", "unexpected . after term"),
            ("{{if .}}{{define \"x\"}}{{end}}{{end}}", "unexpected `define` inside a control structure"),
            ("{{define \"x\"}}{{end}}{{define \"x\"}}{{end}}", "multiple definition of template \"x\""),
            ("{{99999999999999999999}}", "base 10 literal out of range for 64-bit integer"),
        ];
        for (source, msg) in cases {
            let err = parse(source).unwrap_err();
            assert_eq!(err.message(), msg, "source: {source}");
        }
    }
}
