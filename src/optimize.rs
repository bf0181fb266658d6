//! Post-compilation passes over the instruction arrays of a [`Program`].
//!
//! The passes run in a fixed order:
//! - Remove invocations of templates that have no code, repeated until
//!   nothing changes since a removal can leave the caller empty.
//! - Stitch invocations of templates that are a single `WriteBytes` into
//!   the root template.
//! - Fuse runs of `WriteBytes` into a single chunk and remove the chunks
//!   nothing refers to anymore.
//!
//! Every pass edits code through [`splice`], which keeps relative jumps and
//! the context table aligned. No pass edits a range that a jump lands inside
//! of.

use std::ops::Range;

use rustc_hash::FxHashSet;

use crate::types::program::{Instr, Op, Program};
use crate::types::span::Span;

#[derive(Debug, Default)]
struct Stats {
    removed: usize,
    stitched: usize,
    fused: usize,
    collected: usize,
}

/// Optimizes a compiled program in place.
///
/// The program produces exactly the same output for any input afterwards.
pub fn optimize(program: &mut Program) {
    let before = instruction_count(program);
    let mut stats = Stats::default();

    loop {
        let n = remove_empty(program);
        if n == 0 {
            break;
        }
        stats.removed += n;
    }
    stats.stitched = stitch(program);
    stats.fused = fuse(program);
    stats.collected = collect_bytes(program);

    log::debug!(
        "optimized `{}`: {} -> {} instructions, {:?}",
        program.root,
        before,
        instruction_count(program),
        stats
    );
}

fn instruction_count(program: &Program) -> usize {
    program.code.values().map(Vec::len).sum()
}

/// Removes or neutralizes every invocation of a template without code.
fn remove_empty(program: &mut Program) -> usize {
    let empty: FxHashSet<String> = program
        .code
        .iter()
        .filter(|(_, code)| code.is_empty())
        .map(|(name, _)| name.clone())
        .collect();
    if empty.is_empty() {
        return 0;
    }

    let mut count = 0;
    let names: Vec<String> = program.code.keys().cloned().collect();
    for name in names {
        let calls = invocations(program, &name, |callee| empty.contains(callee));
        for pc in calls.into_iter().rev() {
            replace_invocation(program, &name, pc, &[]);
            count += 1;
        }
    }
    count
}

/// Inlines invocations from the root template of templates that consist of
/// a single `WriteBytes`.
fn stitch(program: &mut Program) -> usize {
    let root = program.root.clone();
    let single = |program: &Program, callee: &str| match program.code(callee) {
        Some([instr]) if instr.op == Op::WriteBytes => Some(*instr),
        _ => None,
    };

    let calls = invocations(program, &root, |callee| single(program, callee).is_some());
    let mut count = 0;
    for pc in calls.into_iter().rev() {
        let callee = program.string(program.code[&root][pc].arg).to_owned();
        if let Some(instr) = single(program, &callee) {
            replace_invocation(program, &root, pc, &[instr]);
            count += 1;
        }
    }
    count
}

/// Returns the pcs of the `Template` instructions in `name` whose callee
/// matches.
fn invocations<F>(program: &Program, name: &str, f: F) -> Vec<usize>
where
    F: Fn(&str) -> bool,
{
    program.code[name]
        .iter()
        .enumerate()
        .filter(|(_, instr)| instr.op == Op::Template && f(program.string(instr.arg)))
        .map(|(pc, _)| pc)
        .collect()
}

/// Replaces the `Template` instruction at `pc` with `with`.
///
/// The instructions computing the argument are removed too when they have no
/// effect besides producing it, otherwise the argument is popped.
fn replace_invocation(program: &mut Program, name: &str, pc: usize, with: &[Instr]) {
    let (code, context) = code_and_context(program, name);
    match argument_start(code, pc) {
        Some(start) if !lands_inside(code, start..pc + 1) => {
            splice(code, context, start..pc + 1, with);
        }
        _ => {
            let mut replacement = vec![Instr::new(Op::Pop, 1)];
            replacement.extend_from_slice(with);
            splice(code, context, pc..pc + 1, &replacement);
        }
    }
}

/// Walks backward from the invocation at `pc` until exactly one value has
/// been produced, returning the start of that span if every instruction in
/// it is pure.
fn argument_start(code: &[Instr], pc: usize) -> Option<usize> {
    let mut needed: isize = 1;
    for i in (0..pc).rev() {
        let instr = code[i];
        if !instr.is_pure() {
            return None;
        }
        needed -= instr.stack_effect()?;
        match needed {
            0 => return Some(i),
            n if n < 0 => return None,
            _ => {}
        }
    }
    None
}

/// Whether any jump lands strictly inside `range`.
fn lands_inside(code: &[Instr], range: Range<usize>) -> bool {
    code.iter().enumerate().any(|(pc, instr)| {
        instr.is_jump() && {
            let target = instr.target(pc);
            range.start < target && target < range.end
        }
    })
}

/// Fuses maximal runs of `WriteBytes` that no jump lands inside of.
fn fuse(program: &mut Program) -> usize {
    let mut count = 0;
    let names: Vec<String> = program.code.keys().cloned().collect();
    for name in names {
        let runs = {
            let code = &program.code[&name];
            let targets: FxHashSet<usize> = code
                .iter()
                .enumerate()
                .filter(|(_, instr)| instr.is_jump())
                .map(|(pc, instr)| instr.target(pc))
                .collect();
            write_runs(code, &targets)
        };

        for run in runs.into_iter().rev() {
            let mut chunk = Vec::new();
            for instr in &program.code[&name][run.clone()] {
                chunk.extend_from_slice(program.bytes(instr.arg));
            }
            let i = program.bytes.intern(chunk);
            let (code, context) = code_and_context(program, &name);
            splice(code, context, run, &[Instr::new(Op::WriteBytes, i)]);
            count += 1;
        }
    }
    count
}

/// Finds the runs of more than one `WriteBytes` where only the first
/// instruction may be a jump target.
fn write_runs(code: &[Instr], targets: &FxHashSet<usize>) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        if code[pc].op != Op::WriteBytes {
            pc += 1;
            continue;
        }
        let start = pc;
        pc += 1;
        while pc < code.len() && code[pc].op == Op::WriteBytes && !targets.contains(&pc) {
            pc += 1;
        }
        if pc - start > 1 {
            runs.push(start..pc);
        }
    }
    runs
}

/// Removes byte chunks that no `WriteBytes` refers to.
///
/// Chunks are removed in descending index order, references above a chunk
/// are renumbered before it is removed.
fn collect_bytes(program: &mut Program) -> usize {
    let used: FxHashSet<u32> = program
        .code
        .values()
        .flatten()
        .filter(|instr| instr.op == Op::WriteBytes)
        .map(|instr| instr.arg)
        .collect();

    let mut count = 0;
    for i in (0..program.bytes_len() as u32).rev() {
        if used.contains(&i) {
            continue;
        }
        for instr in program.code.values_mut().flatten() {
            if instr.op == Op::WriteBytes && instr.arg > i {
                instr.arg -= 1;
            }
        }
        program.bytes.remove(i);
        count += 1;
    }
    count
}

fn code_and_context<'a>(
    program: &'a mut Program,
    name: &str,
) -> (&'a mut Vec<Instr>, &'a mut Vec<(usize, Span)>) {
    let code = program.code.entry(name.to_owned()).or_default();
    let context = program.context.entry(name.to_owned()).or_default();
    (code, context)
}

/// Replaces `range` of `code` with `with`.
///
/// Jumps outside the range are rewritten so they keep their targets, the
/// context entries inside the range are dropped and the ones after it are
/// shifted. No jump may land strictly inside the range.
fn splice(
    code: &mut Vec<Instr>,
    context: &mut Vec<(usize, Span)>,
    range: Range<usize>,
    with: &[Instr],
) {
    let delta = with.len() as isize - range.len() as isize;
    let moved = |pc: usize| {
        if pc < range.end {
            pc
        } else {
            (pc as isize + delta) as usize
        }
    };

    for pc in (0..range.start).chain(range.end..code.len()) {
        let instr = code[pc];
        if !instr.is_jump() {
            continue;
        }
        let target = instr.target(pc);
        assert!(
            !(range.start < target && target < range.end),
            "splice of {range:?} would orphan the jump at {pc}"
        );
        let offset = moved(target) as i64 - moved(pc) as i64;
        code[pc] = Instr::jump(instr.op, offset as i32);
    }

    code.splice(range.clone(), with.iter().copied());

    context.retain(|(pc, _)| !range.contains(pc));
    for (pc, _) in context.iter_mut() {
        *pc = moved(*pc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use crate::compile;
    use crate::funcs::Registry;
    use crate::types::syntax::Syntax;

    fn build(source: &str) -> Program {
        let mut registry = Registry::new();
        registry.add("upper", |s: String| s.to_uppercase());
        let trees: BTreeMap<_, _> = compile::parse(&Syntax::default(), "t", source)
            .unwrap()
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        compile::compile(&compile::forest("t", &trees), &registry).unwrap()
    }

    fn optimized(source: &str) -> String {
        let mut program = build(source);
        optimize(&mut program);
        program.disassemble("t").unwrap()
    }

    #[test]
    fn optimize_removes_empty_invocation() {
        let asm = optimized(r#"{{ define "e" }}{{ end }}a{{ template "e" . }}b"#);
        assert_eq!(asm, "0000 WriteBytes \"ab\"\n");
    }

    #[test]
    fn optimize_pops_impure_argument() {
        let asm = optimized(r#"{{ define "e" }}{{ end }}{{ template "e" upper . }}"#);
        assert_eq!(asm, "0000 Dot\n0001 Call upper/1\n0002 Pop 1\n");
    }

    #[test]
    fn optimize_removes_to_fixpoint() {
        let mut program = build(
            r#"{{ define "a" }}{{ end }}{{ define "b" }}{{ template "a" }}{{ end }}x{{ template "b" . }}"#,
        );
        optimize(&mut program);
        assert_eq!(program.disassemble("b").unwrap(), "");
        assert_eq!(program.disassemble("t").unwrap(), "0000 WriteBytes \"x\"\n");
    }

    #[test]
    fn optimize_rewrites_jumps() {
        let asm = optimized(r#"{{ define "e" }}{{ end }}{{ if . }}{{ template "e" . }}{{ end }}x"#);
        assert_eq!(
            asm,
            "\
0000 Mark
0001 Dot
0002 JumpIfFalse +1 -> 0003
0003 PopMark
0004 WriteBytes \"x\"
"
        );
    }

    #[test]
    fn optimize_stitches_root_only() {
        let mut program = build(
            r#"{{ define "s" }}hi{{ end }}{{ define "u" }}<{{ template "s" }}>{{ end }}a{{ template "s" }}b{{ template "u" }}"#,
        );
        optimize(&mut program);
        let root = program.disassemble("t").unwrap();
        assert!(root.starts_with("0000 WriteBytes \"ahib\"\n"), "{root}");
        // `u` is not the root, the invocation stays.
        let u = program.disassemble("u").unwrap();
        assert!(u.contains("Template \"s\""), "{u}");
    }

    #[test]
    fn optimize_stitch_keeps_impure_argument() {
        let asm = optimized(r#"{{ define "s" }}hi{{ end }}{{ template "s" upper . }}"#);
        assert_eq!(
            asm,
            "0000 Dot\n0001 Call upper/1\n0002 Pop 1\n0003 WriteBytes \"hi\"\n"
        );
    }

    #[test]
    fn fuse_respects_jump_targets() {
        let mut program = Program::new("t");
        let a = program.bytes.intern(b"a".to_vec());
        let b = program.bytes.intern(b"b".to_vec());
        let c = program.bytes.intern(b"c".to_vec());
        program.code.insert(
            String::from("t"),
            vec![
                Instr::new(Op::Const, 0),
                Instr::jump(Op::JumpIfFalse, 2),
                Instr::new(Op::WriteBytes, a),
                Instr::new(Op::WriteBytes, b),
                Instr::new(Op::WriteBytes, c),
                Instr::new(Op::WriteBytes, a),
                Instr::new(Op::Pop, 1),
            ],
        );
        program.values.intern(crate::types::program::Literal::Bool(true));

        optimize(&mut program);

        assert_eq!(
            program.disassemble("t").unwrap(),
            "\
0000 Const true
0001 JumpIfFalse +2 -> 0003
0002 WriteBytes \"a\"
0003 WriteBytes \"bca\"
0004 Pop 1
"
        );
        // `b` and `c` are not referenced anymore.
        assert_eq!(program.bytes_len(), 2);
    }

    #[test]
    fn splice_shifts_context() {
        let mut code = vec![
            Instr::new(Op::Dot, 0),
            Instr::jump(Op::Jump, 3),
            Instr::new(Op::Dot, 0),
            Instr::new(Op::Pop, 1),
            Instr::new(Op::Print, 0),
        ];
        let mut context = vec![(2, Span::from(2..3)), (4, Span::from(4..5))];
        splice(&mut code, &mut context, 2..4, &[]);
        assert_eq!(code.len(), 3);
        assert_eq!(code[1].offset(), 1);
        assert_eq!(context, [(2, Span::from(4..5))]);
    }

    #[test]
    #[should_panic(expected = "would orphan the jump")]
    fn splice_rejects_jump_into_range() {
        let mut code = vec![
            Instr::jump(Op::Jump, 2),
            Instr::new(Op::Dot, 0),
            Instr::new(Op::Pop, 1),
        ];
        splice(&mut code, &mut Vec::new(), 1..3, &[]);
    }
}
