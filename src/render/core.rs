use std::io;

use crate::funcs::CallError;
use crate::render::iter::ValueIter;
use crate::render::pool::{Pool, PooledState};
use crate::render::value::{member, to_text};
use crate::types::program::{decode, Instr, Op, Program};
use crate::{Error, Result, Value};

pub(crate) struct Machine<'a> {
    pub program: &'a Program,
    pub pool: &'a Pool,
    pub max_call_depth: usize,
}

/// A template being executed.
struct Frame<'a> {
    name: &'a str,
    code: &'a [Instr],
    pc: usize,
    state: PooledState<'a>,
}

enum Step<'a> {
    Done,
    /// Execute the named template with the given dot, then resume the
    /// current frame.
    Invoke { name: &'a str, arg: Value },
}

impl<'a> Machine<'a> {
    pub(crate) fn run(&self, name: &str, data: Value, out: &mut dyn io::Write) -> Result<()> {
        let (name, code) = self
            .program
            .code
            .get_key_value(name)
            .ok_or_else(|| Error::render(format!("no such template \"{name}\""), None))?;

        let mut frames = vec![Frame {
            name,
            code,
            pc: 0,
            state: self.pool.acquire_state(data),
        }];

        while let Some(frame) = frames.last_mut() {
            let step = self
                .run_one(frame, out)
                .map_err(|e| e.with_template_name(frame.name))?;
            match step {
                Step::Done => {
                    debug_assert!(frame.state.is_balanced());
                    frames.pop();
                }
                Step::Invoke { name, arg } => {
                    if frames.len() >= self.max_call_depth {
                        let msg = format!(
                            "reached the maximum template call depth ({})",
                            self.max_call_depth
                        );
                        return Err(match frames.last() {
                            Some(caller) => self
                                .err_at(caller.name, caller.pc - 1, msg)
                                .with_template_name(caller.name),
                            None => Error::render(msg, None),
                        });
                    }
                    // The compiler only emits calls to templates it compiled.
                    let (name, code) = match self.program.code.get_key_value(name) {
                        Some(entry) => entry,
                        None => panic!("bad program: no code for template `{name}`"),
                    };
                    log::trace!("invoking template `{name}`");
                    frames.push(Frame {
                        name,
                        code,
                        pc: 0,
                        state: self.pool.acquire_state(arg),
                    });
                }
            }
        }

        Ok(())
    }

    /// Executes a frame until it finishes or invokes another template.
    fn run_one(&self, frame: &mut Frame<'a>, out: &mut dyn io::Write) -> Result<Step<'a>> {
        let program = self.program;
        let state = &mut *frame.state;

        while let Some(instr) = frame.code.get(frame.pc).copied() {
            let pc = frame.pc;
            frame.pc += 1;

            match instr.op {
                Op::WriteBytes => {
                    // Only fails with an IO error so there is no location.
                    out.write_all(program.bytes(instr.arg))?;
                }

                Op::Print => {
                    let value = state.pop();
                    let text = to_text(&value).map_err(|msg| self.err_at(frame.name, pc, msg))?;
                    out.write_all(text.as_bytes())?;
                }

                Op::Const => {
                    state.push(program.values.get(instr.arg).to_value());
                }

                Op::Dot => {
                    let dot = state.dot().clone();
                    state.push(dot);
                }

                Op::Field => {
                    let (argc, name) = decode(instr.arg);
                    let receiver = state.pop();
                    let args = state.pop_args(usize::from(argc));
                    let name = program.string(u32::from(name));
                    let value =
                        member(receiver, name, args).map_err(|msg| self.err_at(frame.name, pc, msg))?;
                    state.push(value);
                }

                Op::Var => {
                    let value = state.var(instr.arg);
                    state.push(value);
                }

                Op::SetVar => {
                    let (depth, name) = decode(instr.arg);
                    state.set_var(usize::from(depth), u32::from(name));
                }

                Op::Assign => state.assign(instr.arg),

                Op::Call => {
                    let (argc, f) = decode(instr.arg);
                    let entry = &program.functions[usize::from(f)];
                    let args = state.pop_args(usize::from(argc));
                    let value = (entry.call)(args).map_err(|err| {
                        let msg = match err {
                            CallError::Args(msg) => msg,
                            CallError::Failed(msg) => {
                                format!("error calling {}: {msg}", entry.name)
                            }
                        };
                        self.err_at(frame.name, pc, msg)
                    })?;
                    let value = entry.returns.check(value).map_err(|msg| {
                        let msg = format!("error calling {}: {msg}", entry.name);
                        self.err_at(frame.name, pc, msg)
                    })?;
                    state.push(value);
                }

                Op::Pop => state.pop_n(instr.arg as usize),

                Op::Mark => state.mark(),

                Op::PopMark => state.pop_mark(),

                Op::PushDot => state.push_dot(),

                Op::PopDot => state.pop_dot(),

                Op::Jump => {
                    frame.pc = instr.target(pc);
                }

                Op::JumpIfFalse => {
                    if !state.peek().is_truthy() {
                        frame.pc = instr.target(pc);
                    }
                }

                Op::Iter => {
                    let value = state.pop();
                    let iter = ValueIter::new(value).map_err(|msg| self.err_at(frame.name, pc, msg))?;
                    state.push_iter(iter);
                }

                Op::Next => match state.iter_mut().next() {
                    Some((key, value)) => {
                        state.push(key);
                        state.push(value);
                    }
                    None => {
                        frame.pc = instr.target(pc);
                    }
                },

                Op::Template => {
                    let arg = state.pop();
                    return Ok(Step::Invoke {
                        name: program.string(instr.arg),
                        arg,
                    });
                }
            }
        }

        Ok(Step::Done)
    }

    /// Creates a runtime error located at the instruction `pc` of the named
    /// template.
    fn err_at(&self, name: &str, pc: usize, msg: impl Into<String>) -> Error {
        let source = self.program.sources.get(name);
        let span = self.program.locate(name, pc);
        match (source, span) {
            (Some(source), Some(span)) => Error::render(msg, Some((&**source, span))),
            _ => Error::render(msg, None),
        }
    }
}
