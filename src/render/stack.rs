use crate::render::iter::ValueIter;
use crate::Value;

/// The mutable state of one template invocation.
///
/// Every method panics if the code it executes is not balanced, this can
/// only happen if the compiler or optimizer emitted bad code.
#[derive(Debug, Default)]
pub struct State {
    operands: Vec<Slot>,
    /// Saved `(operands, vars)` lengths.
    marks: Vec<(usize, usize)>,
    /// Variable bindings, the name is an index into the string table.
    vars: Vec<(u32, Value)>,
    dots: Vec<Value>,
}

#[derive(Debug)]
enum Slot {
    Value(Value),
    Iter(ValueIter),
}

impl State {
    /// Prepares a reset state for executing a template with `data` as `$`
    /// and dot.
    pub fn init(&mut self, data: Value) {
        debug_assert!(self.is_empty());
        self.vars.push((0, data.clone()));
        self.dots.push(data);
    }

    pub fn reset(&mut self) {
        self.operands.clear();
        self.marks.clear();
        self.vars.clear();
        self.dots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
            && self.marks.is_empty()
            && self.vars.is_empty()
            && self.dots.is_empty()
    }

    /// Whether the stacks are back to their depths right after
    /// [`State::init`].
    pub fn is_balanced(&self) -> bool {
        self.operands.is_empty()
            && self.marks.is_empty()
            && self.vars.len() == 1
            && self.dots.len() == 1
    }

    #[inline]
    pub fn push(&mut self, value: Value) {
        self.operands.push(Slot::Value(value));
    }

    pub fn push_iter(&mut self, iter: ValueIter) {
        self.operands.push(Slot::Iter(iter));
    }

    #[inline]
    pub fn pop(&mut self) -> Value {
        match self.operands.pop() {
            Some(Slot::Value(value)) => value,
            Some(Slot::Iter(_)) => bug("expected a value, found an iterator"),
            None => bug("operand stack underflow"),
        }
    }

    /// Pops `n` operands and returns them in call order, the last pushed
    /// first.
    pub fn pop_args(&mut self, n: usize) -> Vec<Value> {
        let at = self
            .operands
            .len()
            .checked_sub(n)
            .unwrap_or_else(|| bug("operand stack underflow"));
        self.operands
            .drain(at..)
            .rev()
            .map(|slot| match slot {
                Slot::Value(value) => value,
                Slot::Iter(_) => bug("expected a value, found an iterator"),
            })
            .collect()
    }

    pub fn pop_n(&mut self, n: usize) {
        let at = self
            .operands
            .len()
            .checked_sub(n)
            .unwrap_or_else(|| bug("operand stack underflow"));
        self.operands.truncate(at);
    }

    pub fn peek(&self) -> &Value {
        match self.operands.last() {
            Some(Slot::Value(value)) => value,
            Some(Slot::Iter(_)) => bug("expected a value, found an iterator"),
            None => bug("operand stack underflow"),
        }
    }

    pub fn iter_mut(&mut self) -> &mut ValueIter {
        match self.operands.last_mut() {
            Some(Slot::Iter(iter)) => iter,
            _ => bug("expected an iterator"),
        }
    }

    pub fn mark(&mut self) {
        self.marks.push((self.operands.len(), self.vars.len()));
    }

    pub fn pop_mark(&mut self) {
        let (operands, vars) = self
            .marks
            .pop()
            .unwrap_or_else(|| bug("mark stack underflow"));
        self.operands.truncate(operands);
        self.vars.truncate(vars);
    }

    /// Binds `name` to the operand `depth` slots below the top.
    pub fn set_var(&mut self, depth: usize, name: u32) {
        let i = self
            .operands
            .len()
            .checked_sub(depth + 1)
            .unwrap_or_else(|| bug("operand stack underflow"));
        let value = match &self.operands[i] {
            Slot::Value(value) => value.clone(),
            Slot::Iter(_) => bug("expected a value, found an iterator"),
        };
        self.vars.push((name, value));
    }

    /// Overwrites the innermost binding of `name` with the top operand.
    pub fn assign(&mut self, name: u32) {
        let value = self.peek().clone();
        let slot = self.lookup(name);
        *slot = value;
    }

    pub fn var(&mut self, name: u32) -> Value {
        self.lookup(name).clone()
    }

    fn lookup(&mut self, name: u32) -> &mut Value {
        self.vars
            .iter_mut()
            .rev()
            .find_map(|(n, v)| (*n == name).then_some(v))
            .unwrap_or_else(|| bug("undefined variable"))
    }

    pub fn dot(&self) -> &Value {
        self.dots.last().unwrap_or_else(|| bug("dot stack underflow"))
    }

    /// Makes the top operand the dot.
    pub fn push_dot(&mut self) {
        let value = self.peek().clone();
        self.dots.push(value);
    }

    pub fn pop_dot(&mut self) {
        if self.dots.len() <= 1 {
            bug("dot stack underflow");
        }
        self.dots.pop();
    }
}

#[cold]
#[track_caller]
fn bug(msg: &str) -> ! {
    panic!("bad program: {msg}")
}
