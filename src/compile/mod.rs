//! Compile templates into a program that can be executed by the interpreter.
//!
//! This process has three stages:
//! - The lexer chunks the template source into tokens.
//! - The parser constructs parse trees from the token stream.
//! - The compiler walks every tree of a forest and emits instructions.

mod escape;
mod lex;
mod parse;

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::funcs::{FuncEntry, Registry, ReturnKind};
use crate::types::program::{encode, Instr, Literal, Op, Program, FIXME};
use crate::types::span::Span;
use crate::types::syntax::Syntax;
use crate::types::tree::{
    Arg, ArgKind, BranchNode, CommandNode, Forest, ListNode, Node, Number, PipeNode, TemplateNode,
    Tree,
};
use crate::{Error, Result};

/// Parses a template source.
///
/// The first tree returned is the template itself, followed by every
/// template it defines with `define` or `block`.
pub fn parse(syntax: &Syntax, name: &str, source: &str) -> Result<Vec<Tree>> {
    parse::Parser::new(syntax, name, source)
        .parse_templates()
        .map_err(|err| err.with_template_name(name))
}

/// Collects `root` and every tree it can reach through template
/// invocations.
///
/// Invoked templates that don't exist are left out, compiling the forest
/// reports them.
pub fn forest(root: &str, trees: &BTreeMap<String, Tree>) -> Forest {
    let mut reached = BTreeMap::new();
    let mut pending = vec![root.to_owned()];
    while let Some(name) = pending.pop() {
        if reached.contains_key(&name) {
            continue;
        }
        if let Some(tree) = trees.get(&name) {
            invoked(&tree.root, &mut pending);
            reached.insert(name, tree.clone());
        }
    }
    Forest {
        root: root.to_owned(),
        trees: reached,
    }
}

fn invoked(list: &ListNode, out: &mut Vec<String>) {
    for node in &list.nodes {
        match node {
            Node::Template(t) => out.push(t.name.clone()),
            Node::If(b) | Node::With(b) | Node::Range(b) => {
                invoked(&b.list, out);
                if let Some(else_list) = &b.else_list {
                    invoked(else_list, out);
                }
            }
            _ => {}
        }
    }
}

/// Compiles every tree of the forest into one program.
///
/// Compilation is deterministic and stops at the first error.
pub fn compile(forest: &Forest, registry: &Registry) -> Result<Program> {
    if !forest.trees.contains_key(&forest.root) {
        return Err(Error::compile_unlocated(format!(
            "no such template \"{}\"",
            forest.root
        )));
    }

    let mut compiler = Compiler::new(forest, registry);
    for tree in forest.trees.values() {
        compiler
            .compile_tree(tree)
            .map_err(|err| err.with_template_name(&tree.name))?;
    }

    let program = compiler.program;
    log::debug!(
        "compiled `{}`: {} templates, {} instructions, {} byte chunks, {} functions",
        program.root,
        program.code.len(),
        program.code.values().map(Vec::len).sum::<usize>(),
        program.bytes.len(),
        program.functions.len(),
    );
    Ok(program)
}

/// A scratch instruction buffer that a construct is compiled into before it
/// is spliced into its parent.
#[derive(Debug, Default)]
struct Block {
    code: Vec<Instr>,
    context: Vec<(usize, Span)>,
}

impl Block {
    fn len(&self) -> usize {
        self.code.len()
    }

    fn append(&mut self, other: Block) {
        let offset = self.code.len();
        self.code.extend(other.code);
        self.context
            .extend(other.context.into_iter().map(|(pc, span)| (pc + offset, span)));
    }
}

/// A compiler that constructs a program from a forest of parse trees.
struct Compiler<'a> {
    forest: &'a Forest,
    registry: &'a Registry,
    program: Program,
    /// Function name to index in the program's function table.
    funcs: FxHashMap<String, u16>,

    /// The source of the tree being compiled.
    source: Arc<str>,
    /// The block being compiled into.
    block: Block,
    /// Declared variable names, innermost last.
    vars: Vec<String>,
}

/// The kind of a conditional construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    If,
    With,
}

impl<'a> Compiler<'a> {
    fn new(forest: &'a Forest, registry: &'a Registry) -> Self {
        Self {
            forest,
            registry,
            program: Program::new(forest.root.as_str()),
            funcs: FxHashMap::default(),
            source: Arc::from(""),
            block: Block::default(),
            vars: Vec::new(),
        }
    }

    fn compile_tree(&mut self, tree: &'a Tree) -> Result<()> {
        self.source = tree.source.clone();
        self.vars = vec![String::from("$")];

        let body = self.isolated(|c| c.walk_nodes(&tree.root))?;

        // Variables declared at the top level are scoped to the body so that
        // every invocation leaves the variable stack as it found it.
        let mut block = Block::default();
        if self.vars.len() > 1 {
            block.code.push(Instr::bare(Op::Mark));
            block.append(body);
            block.code.push(Instr::bare(Op::PopMark));
        } else {
            block = body;
        }

        self.program.code.insert(tree.name.clone(), block.code);
        self.program.context.insert(tree.name.clone(), block.context);
        self.program
            .sources
            .insert(tree.name.clone(), tree.source.clone());
        Ok(())
    }

    /// Compiles a list in its own variable scope.
    fn walk_list(&mut self, list: &ListNode) -> Result<()> {
        let scope = self.vars.len();
        self.walk_nodes(list)?;
        self.vars.truncate(scope);
        Ok(())
    }

    fn walk_nodes(&mut self, list: &ListNode) -> Result<()> {
        for node in &list.nodes {
            self.walk_node(node)?;
        }
        Ok(())
    }

    fn walk_node(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Text(text) => {
                if !text.text.is_empty() {
                    let i = self.program.bytes.intern(text.text.as_bytes().to_vec());
                    self.push(Instr::new(Op::WriteBytes, i));
                }
            }
            Node::Action(pipe) => self.walk_action(pipe)?,
            Node::If(branch) => self.walk_branch(Branch::If, branch)?,
            Node::With(branch) => self.walk_branch(Branch::With, branch)?,
            Node::Range(branch) => self.walk_range(branch)?,
            Node::Template(template) => self.walk_template(template)?,
            Node::Comment(_) => {}
            Node::Break(span) => return Err(self.err("{{break}} is not supported", *span)),
            Node::Continue(span) => return Err(self.err("{{continue}} is not supported", *span)),
        }
        Ok(())
    }

    fn walk_action(&mut self, pipe: &PipeNode) -> Result<()> {
        if !pipe.decl.is_empty() {
            self.pipeline(&pipe.cmds)?;
            self.declare(pipe, "command")?;
            self.push(Instr::new(Op::Pop, 1));
            return Ok(());
        }

        if let Some(text) = escape::fold(self.registry, &pipe.cmds) {
            if !text.is_empty() {
                let i = self.program.bytes.intern(text.into_bytes());
                self.push(Instr::new(Op::WriteBytes, i));
            }
            return Ok(());
        }

        self.pipeline(&pipe.cmds)?;
        self.push_at(Instr::bare(Op::Print), pipe.span);
        Ok(())
    }

    /// Compiles an `if` or `with` construct.
    ///
    ///   Mark; pipe; JumpIfFalse; [PushDot]; then; [PopDot]; PopMark;
    ///   [Jump; else; PopMark]
    ///
    fn walk_branch(&mut self, kind: Branch, branch: &BranchNode) -> Result<()> {
        let context = match kind {
            Branch::If => "if",
            Branch::With => "with",
        };
        let scope = self.vars.len();

        self.push(Instr::bare(Op::Mark));
        self.pipeline(&branch.pipe.cmds)?;
        self.declare(&branch.pipe, context)?;

        let then = self.isolated(|c| {
            if kind == Branch::With {
                c.push(Instr::bare(Op::PushDot));
            }
            c.walk_list(&branch.list)?;
            if kind == Branch::With {
                c.push(Instr::bare(Op::PopDot));
            }
            c.push(Instr::bare(Op::PopMark));
            Ok(())
        })?;

        let otherwise = match &branch.else_list {
            Some(list) if !list.nodes.is_empty() => Some(self.isolated(|c| {
                c.walk_list(list)?;
                c.push(Instr::bare(Op::PopMark));
                Ok(())
            })?),
            _ => None,
        };

        let j = self.push(Instr::jump(Op::JumpIfFalse, FIXME));
        self.block.append(then);
        match otherwise {
            None => {
                // Land on the trailing `PopMark` of the then block.
                self.update_jump(j, self.block.len() - 1);
            }
            Some(otherwise) => {
                let j2 = self.push(Instr::jump(Op::Jump, FIXME));
                self.update_jump(j, self.block.len());
                self.block.append(otherwise);
                self.update_jump(j2, self.block.len());
            }
        }

        self.vars.truncate(scope);
        Ok(())
    }

    /// Compiles a `range` construct.
    ///
    ///   Mark; pipe; Iter; Next(empty)
    ///   body: Mark; [SetVar]; PushDot; list; PopDot; PopMark; Pop(2)
    ///   Next(done); Jump(body)
    ///   done: [Jump(end); else]
    ///   end: PopMark
    ///
    fn walk_range(&mut self, branch: &BranchNode) -> Result<()> {
        let pipe = &branch.pipe;
        if pipe.decl.len() > 2 {
            return Err(self.err("too many declarations in range", pipe.decl[2].span));
        }
        if pipe.is_assign {
            return Err(self.err("range can only initialize variables", pipe.span));
        }

        let scope = self.vars.len();
        self.push(Instr::bare(Op::Mark));
        self.pipeline(&pipe.cmds)?;
        self.push_at(Instr::bare(Op::Iter), pipe.span);
        let first = self.push(Instr::jump(Op::Next, FIXME));

        let body = self.isolated(|c| {
            let scope = c.vars.len();
            c.push(Instr::bare(Op::Mark));
            let depths: &[u16] = match pipe.decl.len() {
                2 => &[1, 0],
                _ => &[0],
            };
            for (var, depth) in pipe.decl.iter().zip(depths) {
                let name = c.string(strip(&var.name), var.span)?;
                c.push(Instr::new(Op::SetVar, encode(*depth, name)));
                c.vars.push(var.name.clone());
            }
            c.push(Instr::bare(Op::PushDot));
            c.walk_list(&branch.list)?;
            c.push(Instr::bare(Op::PopDot));
            c.push(Instr::bare(Op::PopMark));
            c.push(Instr::new(Op::Pop, 2));
            c.vars.truncate(scope);
            Ok(())
        })?;

        let n = body.len() as i32;
        self.block.append(body);
        self.push(Instr::jump(Op::Next, 2));
        self.push(Instr::jump(Op::Jump, -(n + 1)));

        match &branch.else_list {
            Some(list) if !list.nodes.is_empty() => {
                let otherwise = self.isolated(|c| c.walk_list(list))?;
                let j = self.push(Instr::jump(Op::Jump, FIXME));
                self.update_jump(first, self.block.len());
                self.block.append(otherwise);
                self.update_jump(j, self.block.len());
            }
            _ => self.update_jump(first, self.block.len()),
        }
        self.push(Instr::bare(Op::PopMark));
        self.vars.truncate(scope);
        Ok(())
    }

    fn walk_template(&mut self, template: &TemplateNode) -> Result<()> {
        if !self.forest.trees.contains_key(&template.name) {
            return Err(self.err(
                format!("no such template \"{}\"", template.name),
                template.span,
            ));
        }
        match &template.pipe {
            Some(pipe) => {
                if let Some(var) = pipe.decl.first() {
                    return Err(self.err(
                        "can't declare variables in a template invocation",
                        var.span,
                    ));
                }
                self.pipeline(&pipe.cmds)?;
            }
            None => {
                let i = self.program.values.intern(Literal::Nil);
                self.push(Instr::new(Op::Const, i));
            }
        }
        let name = self.string(&template.name, template.span)?;
        self.push_at(Instr::new(Op::Template, u32::from(name)), template.span);
        Ok(())
    }

    /// Binds the declared variable of a pipeline to the value on top of the
    /// operand stack, leaving it there.
    fn declare(&mut self, pipe: &PipeNode, context: &str) -> Result<()> {
        let var = match pipe.decl.as_slice() {
            [] => return Ok(()),
            [var] => var,
            [_, extra, ..] => {
                return Err(self.err(format!("too many declarations in {context}"), extra.span));
            }
        };
        let name = self.string(strip(&var.name), var.span)?;
        if pipe.is_assign {
            self.check_var(&var.name, var.span)?;
            self.push(Instr::new(Op::Assign, u32::from(name)));
        } else {
            self.push(Instr::new(Op::SetVar, encode(0, name)));
            self.vars.push(var.name.clone());
        }
        Ok(())
    }

    /// Compiles the commands of a pipeline, each command after the first
    /// receives the result of the previous one as its last argument.
    fn pipeline(&mut self, cmds: &[CommandNode]) -> Result<()> {
        let mut prev = None;
        for (i, cmd) in cmds.iter().enumerate() {
            let piped = i > 0;
            if piped && escape::elide(self.registry, cmd, prev) {
                continue;
            }
            prev = self.command(cmd, piped)?;
        }
        Ok(())
    }

    /// Compiles a single command and returns the declared return kind if it
    /// was a function call.
    fn command(&mut self, cmd: &CommandNode, piped: bool) -> Result<Option<ReturnKind>> {
        let Some((op, args)) = cmd.args.split_first() else {
            return Err(self.err("empty command", cmd.span));
        };
        let argc = args.len() + usize::from(piped);

        match &op.kind {
            ArgKind::Identifier(name) => {
                let entry = self.lookup(name, op.span)?;
                entry
                    .check_arity(argc)
                    .map_err(|msg| self.err(msg, cmd.span))?;
                let f = self.function(&entry, op.span)?;
                self.args(args)?;
                let argc = self.count(argc, cmd.span)?;
                self.push_at(Instr::new(Op::Call, encode(argc, f)), cmd.span);
                return Ok(Some(entry.returns));
            }
            ArgKind::Field(idents) => {
                self.args(args)?;
                self.push(Instr::bare(Op::Dot));
                self.fields(idents, argc, op.span)?;
            }
            ArgKind::Variable(idents) => {
                if idents.len() == 1 && argc > 0 {
                    return Err(self.err("can't give argument to non-function", cmd.span));
                }
                self.args(args)?;
                self.var(&idents[0], op.span)?;
                self.fields(&idents[1..], argc, op.span)?;
            }
            ArgKind::Chain(inner, fields) => {
                self.args(args)?;
                self.arg(inner)?;
                self.fields(fields, argc, op.span)?;
            }
            ArgKind::Nil => return Err(self.err("nil is not a command", op.span)),
            _ => {
                if argc > 0 {
                    return Err(self.err("can't give argument to non-function", cmd.span));
                }
                self.arg(op)?;
            }
        }
        Ok(None)
    }

    /// Pushes arguments in reverse order.
    fn args(&mut self, args: &[Arg]) -> Result<()> {
        for arg in args.iter().rev() {
            self.arg(arg)?;
        }
        Ok(())
    }

    /// Compiles an argument, it always pushes exactly one value.
    fn arg(&mut self, arg: &Arg) -> Result<()> {
        match &arg.kind {
            ArgKind::Dot => {
                self.push(Instr::bare(Op::Dot));
            }
            ArgKind::Nil => self.constant(Literal::Nil),
            ArgKind::Bool(b) => self.constant(Literal::Bool(*b)),
            ArgKind::Number(Number::Int(i)) => self.constant(Literal::Int(*i)),
            ArgKind::Number(Number::Float(f)) => self.constant(Literal::from_float(*f)),
            ArgKind::String(s) => self.constant(Literal::String(s.clone())),
            ArgKind::Field(idents) => {
                self.push(Instr::bare(Op::Dot));
                self.fields(idents, 0, arg.span)?;
            }
            ArgKind::Variable(idents) => {
                self.var(&idents[0], arg.span)?;
                self.fields(&idents[1..], 0, arg.span)?;
            }
            ArgKind::Identifier(name) => {
                let entry = self.lookup(name, arg.span)?;
                entry
                    .check_arity(0)
                    .map_err(|msg| self.err(msg, arg.span))?;
                let f = self.function(&entry, arg.span)?;
                self.push_at(Instr::new(Op::Call, encode(0, f)), arg.span);
            }
            ArgKind::Chain(inner, idents) => {
                self.arg(inner)?;
                self.fields(idents, 0, arg.span)?;
            }
            ArgKind::Pipe(pipe) => {
                self.pipeline(&pipe.cmds)?;
                self.declare(pipe, "parenthesized pipeline")?;
            }
        }
        Ok(())
    }

    /// Emits one `Field` per identifier, only the last one receives the
    /// arguments.
    fn fields(&mut self, idents: &[String], argc: usize, span: Span) -> Result<()> {
        let argc = self.count(argc, span)?;
        for (i, ident) in idents.iter().enumerate() {
            let name = self.string(ident, span)?;
            let n = if i + 1 == idents.len() { argc } else { 0 };
            self.push_at(Instr::new(Op::Field, encode(n, name)), span);
        }
        if idents.is_empty() && argc > 0 {
            return Err(self.err("can't give argument to non-function", span));
        }
        Ok(())
    }

    fn var(&mut self, name: &str, span: Span) -> Result<()> {
        self.check_var(name, span)?;
        let i = self.string(strip(name), span)?;
        self.push(Instr::new(Op::Var, u32::from(i)));
        Ok(())
    }

    fn check_var(&self, name: &str, span: Span) -> Result<()> {
        match self.vars.iter().rev().any(|v| v == name) {
            true => Ok(()),
            false => Err(self.err(format!("undefined variable \"{name}\""), span)),
        }
    }

    fn lookup(&self, name: &str, span: Span) -> Result<Arc<FuncEntry>> {
        self.registry
            .get(name)
            .cloned()
            .ok_or_else(|| self.err(format!("function \"{name}\" not defined"), span))
    }

    /// Returns the index of the function in the program, adding it on first
    /// use.
    fn function(&mut self, entry: &Arc<FuncEntry>, span: Span) -> Result<u16> {
        if let Some(i) = self.funcs.get(&entry.name) {
            return Ok(*i);
        }
        let i = u16::try_from(self.program.functions.len())
            .map_err(|_| self.err("too many functions in program", span))?;
        self.program.functions.push(entry.clone());
        self.funcs.insert(entry.name.clone(), i);
        Ok(i)
    }

    fn string(&mut self, s: &str, span: Span) -> Result<u16> {
        let i = self.program.strings.intern(s.to_owned());
        u16::try_from(i).map_err(|_| self.err("too many names in program", span))
    }

    fn count(&self, n: usize, span: Span) -> Result<u16> {
        u16::try_from(n).map_err(|_| self.err("too many arguments", span))
    }

    fn constant(&mut self, lit: Literal) {
        let i = self.program.values.intern(lit);
        self.push(Instr::new(Op::Const, i));
    }

    /// Compiles into a fresh block and returns it.
    fn isolated<F>(&mut self, f: F) -> Result<Block>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let outer = mem::take(&mut self.block);
        let result = f(self);
        let inner = mem::replace(&mut self.block, outer);
        result.map(|()| inner)
    }

    /// Points the jump at `i` to the absolute position `target`.
    fn update_jump(&mut self, i: usize, target: usize) {
        let instr = &mut self.block.code[i];
        assert!(instr.is_jump(), "not a jump instr");
        *instr = Instr::jump(instr.op, (target as i64 - i as i64) as i32);
    }

    fn push(&mut self, instr: Instr) -> usize {
        let i = self.block.code.len();
        self.block.code.push(instr);
        i
    }

    /// Pushes an instruction that can fail at runtime.
    fn push_at(&mut self, instr: Instr, span: Span) -> usize {
        let i = self.push(instr);
        self.block.context.push((i, span));
        i
    }

    fn err(&self, msg: impl Into<String>, span: Span) -> Error {
        Error::compile(msg, &self.source, span)
    }
}

/// Variables are interned without their `$` prefix.
fn strip(name: &str) -> &str {
    name.strip_prefix('$').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::Value;

    fn program(source: &str) -> Result<Program> {
        let trees = parse(&Syntax::default(), "t", source)?;
        let trees: BTreeMap<_, _> = trees.into_iter().map(|t| (t.name.clone(), t)).collect();
        let mut registry = Registry::new();
        registry.add("upper", |s: String| s.to_uppercase());
        registry.add("count", |v: Vec<Value>| v.len());
        registry.add("join", |a: String, b: String| a + &b);
        registry.add("safe", |s: String| s);
        registry.set_return_kind("count", ReturnKind::Number);
        registry.set_return_kind("safe", ReturnKind::Html);
        compile(&forest("t", &trees), &registry)
    }

    #[track_caller]
    fn disassemble(source: &str) -> String {
        program(source).unwrap().disassemble("t").unwrap()
    }

    #[track_caller]
    fn compile_err(source: &str) -> String {
        program(source).unwrap_err().to_string()
    }

    #[test]
    fn compile_is_deterministic() {
        let source = concat!(
            r#"{{ define "row" }}{{ range $i, $e := . }}{{ $i }}={{ $e | upper }};{{ end }}{{ end }}"#,
            r#"{{ define "cell" }}<{{ . }}>{{ template "row" .list }}{{ end }}"#,
            r#"{{ $n := 1.5 }}{{ if .a }}{{ template "cell" . }}{{ else if .b }}b{{ else }}"x"{{ end }}"#,
            r#"{{ with $x := .c }}{{ join $x "y" }}{{ else }}{{ $n }}{{ end }}"#,
            r#"{{ range .items }}{{ template "row" . }}{{ else }}none{{ end }}"#,
        );
        let trees = parse(&Syntax::default(), "t", source).unwrap();
        let trees: BTreeMap<_, _> = trees.into_iter().map(|t| (t.name.clone(), t)).collect();
        let mut registry = Registry::new();
        registry.add("upper", |s: String| s.to_uppercase());
        registry.add("join", |a: String, b: String| a + &b);
        let forest = forest("t", &trees);

        let a = compile(&forest, &registry).unwrap();
        let b = compile(&forest, &registry).unwrap();

        let names: Vec<_> = a.templates().collect();
        assert_eq!(names, ["cell", "row", "t"]);
        assert_eq!(names, b.templates().collect::<Vec<_>>());
        for name in names {
            assert_eq!(a.code(name), b.code(name), "template `{name}`");
            assert_eq!(a.disassemble(name), b.disassemble(name));
            assert_eq!(a.context[name], b.context[name]);
        }
        assert!(a.strings.iter().eq(b.strings.iter()));
        assert!(a.values.iter().eq(b.values.iter()));
        assert!(a.bytes.iter().eq(b.bytes.iter()));
        assert!(a
            .functions
            .iter()
            .map(|f| &f.name)
            .eq(b.functions.iter().map(|f| &f.name)));
    }

    #[test]
    fn compile_text_and_print() {
        assert_eq!(
            disassemble("a{{.X}}b"),
            "\
0000 WriteBytes \"a\"
0001 Dot
0002 Field .X/0
0003 Print
0004 WriteBytes \"b\"
"
        );
    }

    #[test]
    fn compile_if_without_else() {
        assert_eq!(
            disassemble("{{if .A}}x{{end}}"),
            "\
0000 Mark
0001 Dot
0002 Field .A/0
0003 JumpIfFalse +2 -> 0005
0004 WriteBytes \"x\"
0005 PopMark
"
        );
    }

    #[test]
    fn compile_if_else() {
        assert_eq!(
            disassemble("{{if .A}}x{{else}}y{{end}}"),
            "\
0000 Mark
0001 Dot
0002 Field .A/0
0003 JumpIfFalse +4 -> 0007
0004 WriteBytes \"x\"
0005 PopMark
0006 Jump +3 -> 0009
0007 WriteBytes \"y\"
0008 PopMark
"
        );
    }

    #[test]
    fn compile_with_without_else() {
        assert_eq!(
            disassemble("{{with .A}}{{.}}{{end}}"),
            "\
0000 Mark
0001 Dot
0002 Field .A/0
0003 JumpIfFalse +5 -> 0008
0004 PushDot
0005 Dot
0006 Print
0007 PopDot
0008 PopMark
"
        );
    }

    #[test]
    fn compile_range() {
        assert_eq!(
            disassemble("{{range $i, $e := .}}{{$i}}{{end}}"),
            "\
0000 Mark
0001 Dot
0002 Iter
0003 Next +12 -> 0015
0004 Mark
0005 SetVar $i@1
0006 SetVar $e@0
0007 PushDot
0008 Var $i
0009 Print
0010 PopDot
0011 PopMark
0012 Pop 2
0013 Next +2 -> 0015
0014 Jump -10 -> 0004
0015 PopMark
"
        );
    }

    #[test]
    fn compile_range_else() {
        assert_eq!(
            disassemble("{{range .}}x{{else}}y{{end}}"),
            "\
0000 Mark
0001 Dot
0002 Iter
0003 Next +10 -> 0013
0004 Mark
0005 PushDot
0006 WriteBytes \"x\"
0007 PopDot
0008 PopMark
0009 Pop 2
0010 Next +2 -> 0012
0011 Jump -7 -> 0004
0012 Jump +2 -> 0014
0013 WriteBytes \"y\"
0014 PopMark
"
        );
    }

    #[test]
    fn compile_arguments_in_reverse() {
        assert_eq!(
            disassemble(r#"{{.A | join "x"}}"#),
            "\
0000 Dot
0001 Field .A/0
0002 Const \"x\"
0003 Call join/2
0004 Print
"
        );
    }

    #[test]
    fn compile_method_arguments() {
        assert_eq!(
            disassemble("{{.User.Greet 1 $}}"),
            "\
0000 Var $
0001 Const 1
0002 Dot
0003 Field .User/0
0004 Field .Greet/2
0005 Print
"
        );
    }

    #[test]
    fn compile_declarations() {
        assert_eq!(
            disassemble("{{$x := 1}}{{$x = 2}}{{$x}}"),
            "\
0000 Mark
0001 Const 1
0002 SetVar $x@0
0003 Pop 1
0004 Const 2
0005 Assign $x
0006 Pop 1
0007 Var $x
0008 Print
0009 PopMark
"
        );
    }

    #[test]
    fn compile_template_invocation() {
        assert_eq!(
            disassemble(r#"{{define "a"}}A{{end}}{{template "a"}}{{template "a" .X}}"#),
            "\
0000 Const nil
0001 Template \"a\"
0002 Dot
0003 Field .X/0
0004 Template \"a\"
"
        );
    }

    #[test]
    fn compile_folds_constant_escapes() {
        assert_eq!(
            disassemble(r#"{{"<a>" | _html_template_htmlescaper}}{{_html_template_attrescaper "a b"}}"#),
            "\
0000 WriteBytes \"&lt;a&gt;\"
0001 WriteBytes \"a&#32;b\"
"
        );
    }

    #[test]
    fn compile_elides_escapers_by_return_kind() {
        assert_eq!(
            disassemble(
                "{{count . | _html_template_htmlescaper}}\
                 {{safe .X | _html_template_htmlescaper}}\
                 {{safe .X | _html_template_attrescaper}}"
            ),
            "\
0000 Dot
0001 Call count/1
0002 Print
0003 Dot
0004 Field .X/0
0005 Call safe/1
0006 Print
0007 Dot
0008 Field .X/0
0009 Call safe/1
0010 Call _html_template_attrescaper/1
0011 Print
"
        );
    }

    #[test]
    fn compile_keeps_escaper_after_non_call() {
        assert_eq!(
            disassemble("{{.X | _html_template_htmlescaper}}"),
            "\
0000 Dot
0001 Field .X/0
0002 Call _html_template_htmlescaper/1
0003 Print
"
        );
    }

    #[test]
    fn compile_errors() {
        let cases = [
            ("{{nope}}", "t:1:3: function \"nope\" not defined"),
            ("{{$x}}", "t:1:3: undefined variable \"$x\""),
            ("{{if 1}}{{$x := 1}}{{end}}{{$x}}", "t:1:29: undefined variable \"$x\""),
            ("{{range $e := .}}{{else}}{{$e}}{{end}}", "t:1:28: undefined variable \"$e\""),
            ("{{template \"x\"}}", "t:1:1: no such template \"x\""),
            ("{{range .}}{{break}}{{end}}", "t:1:12: {{break}} is not supported"),
            ("{{nil}}", "t:1:3: nil is not a command"),
            ("{{. 1}}", "t:1:3: can't give argument to non-function"),
            ("{{1 | $}}", "t:1:7: can't give argument to non-function"),
            ("{{upper}}", "t:1:3: wrong number of args for upper: want 1 got 0"),
            ("{{$x := 1}}{{range $x = .}}{{end}}", "t:1:20: range can only initialize variables"),
            ("{{if $a, $b := 1}}{{end}}", "t:1:10: too many declarations in if"),
        ];
        for (source, msg) in cases {
            assert_eq!(compile_err(source), msg, "source: {source}");
        }
    }

    #[test]
    fn compile_records_context() {
        let program = program("ab{{.X}}").unwrap();
        assert_eq!(program.locate("t", 2), Some(Span::from(4..6)));
        assert_eq!(program.locate("t", 3), Some(Span::from(4..6)));
        assert_eq!(program.locate("t", 0), None);
    }

    #[test]
    fn forest_collects_reachable_trees() {
        let trees = parse(
            &Syntax::default(),
            "t",
            r#"{{define "a"}}{{template "b"}}{{end}}{{define "b"}}{{end}}{{define "c"}}{{end}}{{if .}}{{template "a"}}{{end}}"#,
        )
        .unwrap();
        let trees: BTreeMap<_, _> = trees.into_iter().map(|t| (t.name.clone(), t)).collect();
        let forest = forest("t", &trees);
        let names: Vec<_> = forest.trees.keys().map(String::as_str).collect();
        assert_eq!(names, ["a", "b", "t"]);
    }
}
