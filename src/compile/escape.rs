//! Compile-time shortcuts for the HTML escapers.
//!
//! Both only look at the shape of a pipeline and the declared return kind of
//! the command before an escaper, there is no type flow.

use std::sync::Arc;

use crate::funcs::{Escaper, FuncEntry, Registry, ReturnKind};
use crate::render::value::to_text;
use crate::types::tree::{Arg, ArgKind, CommandNode, Number};
use crate::Value;

/// Evaluates a printing pipeline made only of literals and argument-less
/// escaper calls, returning the text it would print.
///
/// Returns `None` whenever the pipeline has any other shape or evaluating it
/// fails, the pipeline is then compiled normally.
pub(super) fn fold(registry: &Registry, cmds: &[CommandNode]) -> Option<String> {
    let (first, rest) = cmds.split_first()?;
    let mut value = match first.args.as_slice() {
        [arg] if arg.is_literal() && !matches!(arg.kind, ArgKind::Nil) => literal(arg)?,
        [op, args @ ..] => {
            let entry = escaper(registry, op)?;
            let args = args.iter().map(literal).collect::<Option<Vec<_>>>()?;
            (entry.call)(args).ok()?
        }
        [] => return None,
    };
    for cmd in rest {
        let [op] = cmd.args.as_slice() else {
            return None;
        };
        let entry = escaper(registry, op)?;
        value = (entry.call)(vec![value]).ok()?;
    }
    to_text(&value).ok().map(|text| text.into_owned())
}

/// Returns `true` if the escaper command `cmd` can't change the value
/// produced by a command of kind `prev`.
pub(super) fn elide(registry: &Registry, cmd: &CommandNode, prev: Option<ReturnKind>) -> bool {
    let [op] = cmd.args.as_slice() else {
        return false;
    };
    let Some(entry) = escaper(registry, op) else {
        return false;
    };
    matches!(
        (prev, entry.escaper),
        (Some(ReturnKind::Number | ReturnKind::Bool), _)
            | (Some(ReturnKind::Html), Some(Escaper::Html))
    )
}

/// Resolves a builtin escaper, a user function registered under the same
/// name is not one.
fn escaper<'r>(registry: &'r Registry, arg: &Arg) -> Option<&'r Arc<FuncEntry>> {
    match &arg.kind {
        ArgKind::Identifier(name) => registry.get(name).filter(|e| e.escaper.is_some()),
        _ => None,
    }
}

fn literal(arg: &Arg) -> Option<Value> {
    let value = match &arg.kind {
        ArgKind::Nil => Value::None,
        ArgKind::Bool(b) => Value::Bool(*b),
        ArgKind::Number(Number::Int(i)) => Value::Integer(*i),
        ArgKind::Number(Number::Float(f)) => Value::Float(*f),
        ArgKind::String(s) => Value::String(s.clone()),
        _ => return None,
    };
    Some(value)
}
