//! Defines a compiled [`Program`] which is a set of shared tables and a
//! sequence of [`Instr`] per template name that can be executed by the
//! interpreter.

use std::collections::BTreeMap;
use std::fmt::{self, Write};
use std::hash::Hash;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::funcs::FuncEntry;
use crate::types::span::Span;
use crate::Value;

/// A placeholder jump offset, patched once the target is known.
pub const FIXME: i32 = i32::MAX;

/// The compiled artifact for one template family.
///
/// A program is immutable once compiled and optimized, and can be executed
/// from many threads at the same time.
#[derive(Clone)]
pub struct Program {
    pub(crate) root: String,
    /// Interned template, field and variable names. Index 0 is always the
    /// empty name which is the name of `$`.
    pub(crate) strings: Interner<String>,
    /// Interned literal constants.
    pub(crate) values: Interner<Literal>,
    /// Interned literal output chunks.
    pub(crate) bytes: Interner<Vec<u8>>,
    /// Functions resolved from the registry at compile time.
    pub(crate) functions: Vec<Arc<FuncEntry>>,
    pub(crate) code: BTreeMap<String, Vec<Instr>>,
    /// Ascending `(pc, span)` pairs for the instructions that can fail.
    pub(crate) context: BTreeMap<String, Vec<(usize, Span)>>,
    pub(crate) sources: BTreeMap<String, Arc<str>>,
}

/// A single instruction, an opcode and a 32-bit operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instr {
    pub op: Op,
    pub arg: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Write the byte chunk `arg` to the output.
    WriteBytes,
    /// Pop a value and print it.
    Print,
    /// Push the constant `arg`.
    Const,
    /// Push the current dot.
    Dot,
    /// Pop a receiver and resolve the member, `arg` is `(argc, name)`.
    Field,
    /// Push the innermost binding of the variable `arg`.
    Var,
    /// Bind a variable to an operand without popping it, `arg` is
    /// `(depth, name)`.
    SetVar,
    /// Overwrite the innermost binding of the variable `arg`.
    Assign,
    /// Pop arguments and call a function, `arg` is `(argc, function)`.
    Call,
    /// Pop `arg` operands.
    Pop,
    /// Save the operand and variable stack lengths.
    Mark,
    /// Truncate the operand and variable stacks to the last mark.
    PopMark,
    /// Push the top operand onto the dot stack.
    PushDot,
    /// Pop the dot stack.
    PopDot,
    /// Jump by the signed offset `arg`.
    Jump,
    /// Jump by the signed offset `arg` if the top operand is falsy.
    JumpIfFalse,
    /// Pop a value and push an iterator over it.
    Iter,
    /// Advance the top iterator pushing the key and value, or jump by the
    /// signed offset `arg` if it is exhausted.
    Next,
    /// Pop a value and execute the template named `arg` with it.
    Template,
}

/// A literal constant, hashable so that it can be interned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    /// The bit pattern of an `f64`.
    Float(u64),
    String(String),
}

/// An insertion ordered set of items addressed by index.
#[derive(Debug, Clone)]
pub struct Interner<T> {
    items: Vec<T>,
    lookup: FxHashMap<T, u32>,
}

/// Packs an argument count and a table index into one operand.
#[inline]
pub const fn encode(count: u16, index: u16) -> u32 {
    (count as u32) << 16 | index as u32
}

/// Unpacks an operand created with [`encode`].
#[inline]
pub const fn decode(arg: u32) -> (u16, u16) {
    ((arg >> 16) as u16, arg as u16)
}

impl Instr {
    #[inline]
    pub const fn new(op: Op, arg: u32) -> Self {
        Self { op, arg }
    }

    #[inline]
    pub const fn bare(op: Op) -> Self {
        Self { op, arg: 0 }
    }

    #[inline]
    pub const fn jump(op: Op, offset: i32) -> Self {
        Self {
            op,
            arg: offset as u32,
        }
    }

    #[inline]
    pub const fn offset(self) -> i32 {
        self.arg as i32
    }

    #[inline]
    pub const fn is_jump(self) -> bool {
        matches!(self.op, Op::Jump | Op::JumpIfFalse | Op::Next)
    }

    /// Returns the absolute target of a jump at `pc`.
    #[inline]
    pub fn target(self, pc: usize) -> usize {
        (pc as i64 + i64::from(self.offset())) as usize
    }

    /// Whether this instruction only reads the current scope and has no
    /// effect besides the operand stack.
    pub fn is_pure(self) -> bool {
        match self.op {
            Op::Const | Op::Dot | Op::Var => true,
            Op::Field => decode(self.arg).0 == 0,
            _ => false,
        }
    }

    /// The net effect on the operand stack, for instructions that leave
    /// values behind in a straight line.
    pub fn stack_effect(self) -> Option<isize> {
        let effect = match self.op {
            Op::Const | Op::Dot | Op::Var => 1,
            Op::Field => -(decode(self.arg).0 as isize),
            Op::Call => 1 - decode(self.arg).0 as isize,
            Op::SetVar | Op::Assign | Op::PushDot | Op::PopDot | Op::WriteBytes => 0,
            Op::Pop => -(self.arg as isize),
            Op::Print | Op::Template => -1,
            _ => return None,
        };
        Some(effect)
    }
}

impl Literal {
    pub fn from_float(f: f64) -> Self {
        Self::Float(f.to_bits())
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Nil => Value::None,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Integer(*i),
            Self::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

impl<T> Default for Interner<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            lookup: FxHashMap::default(),
        }
    }
}

impl<T> Interner<T>
where
    T: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of the item, inserting it if it is new.
    pub fn intern(&mut self, item: T) -> u32 {
        if let Some(i) = self.lookup.get(&item) {
            return *i;
        }
        let i = self.items.len() as u32;
        self.lookup.insert(item.clone(), i);
        self.items.push(item);
        i
    }

    #[inline]
    pub fn get(&self, i: u32) -> &T {
        &self.items[i as usize]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Removes the item at `i`, every item after it moves down by one.
    pub fn remove(&mut self, i: u32) -> T {
        let item = self.items.remove(i as usize);
        self.lookup.remove(&item);
        for j in self.lookup.values_mut() {
            if *j > i {
                *j -= 1;
            }
        }
        item
    }
}

impl Program {
    pub(crate) fn new(root: impl Into<String>) -> Self {
        let mut strings = Interner::new();
        strings.intern(String::new());
        Self {
            root: root.into(),
            strings,
            values: Interner::new(),
            bytes: Interner::new(),
            functions: Vec::new(),
            code: BTreeMap::new(),
            context: BTreeMap::new(),
            sources: BTreeMap::new(),
        }
    }

    /// The name of the root template.
    #[inline]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The names of all compiled templates.
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.code.keys().map(String::as_str)
    }

    /// The instructions of the named template.
    #[inline]
    pub fn code(&self, name: &str) -> Option<&[Instr]> {
        self.code.get(name).map(Vec::as_slice)
    }

    /// The byte chunk referenced by a `WriteBytes` operand.
    #[inline]
    pub fn bytes(&self, i: u32) -> &[u8] {
        self.bytes.get(i)
    }

    /// The number of byte chunks in the table.
    #[inline]
    pub fn bytes_len(&self) -> usize {
        self.bytes.len()
    }

    /// The interned name referenced by an operand.
    #[inline]
    pub fn string(&self, i: u32) -> &str {
        self.strings.get(i)
    }

    /// Finds the source span of the instruction at `pc`, this is the last
    /// recorded span at or before `pc`.
    pub(crate) fn locate(&self, name: &str, pc: usize) -> Option<Span> {
        let context = self.context.get(name)?;
        let i = context.partition_point(|(p, _)| *p <= pc);
        i.checked_sub(1).map(|i| context[i].1)
    }

    /// Renders the named template one instruction per line.
    pub fn disassemble(&self, name: &str) -> Option<String> {
        let code = self.code.get(name)?;
        let mut s = String::new();
        for (pc, instr) in code.iter().enumerate() {
            let _ = writeln!(s, "{pc:04} {}", self.display(*instr, pc));
        }
        Some(s)
    }

    fn display(&self, instr: Instr, pc: usize) -> String {
        let Instr { op, arg } = instr;
        let detail = match op {
            Op::WriteBytes => format!("{:?}", String::from_utf8_lossy(self.bytes.get(arg))),
            Op::Const => match self.values.get(arg) {
                Literal::Nil => "nil".to_owned(),
                Literal::Bool(b) => b.to_string(),
                Literal::Int(i) => i.to_string(),
                Literal::Float(bits) => f64::from_bits(*bits).to_string(),
                Literal::String(s) => format!("{s:?}"),
            },
            Op::Field => {
                let (argc, name) = decode(arg);
                format!(".{}/{argc}", self.strings.get(u32::from(name)))
            }
            Op::Var | Op::Assign => format!("${}", self.strings.get(arg)),
            Op::SetVar => {
                let (depth, name) = decode(arg);
                format!("${}@{depth}", self.strings.get(u32::from(name)))
            }
            Op::Call => {
                let (argc, f) = decode(arg);
                format!("{}/{argc}", self.functions[usize::from(f)].name)
            }
            Op::Pop => arg.to_string(),
            Op::Jump | Op::JumpIfFalse | Op::Next => {
                format!("{:+} -> {:04}", instr.offset(), instr.target(pc))
            }
            Op::Template => format!("{:?}", self.strings.get(arg)),
            Op::Print
            | Op::Dot
            | Op::Mark
            | Op::PopMark
            | Op::PushDot
            | Op::PopDot
            | Op::Iter => String::new(),
        };
        format!("{op:?} {detail}").trim_end().to_owned()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("root", &self.root)
            .field("templates", &self.code.keys())
            .finish_non_exhaustive()
    }
}
