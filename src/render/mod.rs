mod core;
mod iter;
mod pool;
mod stack;
pub(crate) mod value;

use std::io;

use crate::render::core::Machine;
pub use crate::render::pool::Pool;
use crate::types::program::Program;
use crate::{Error, Result, Value};

/// The default maximum number of nested template invocations.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Executes a compiled [`Program`].
///
/// An interpreter is cheap to create and can be shared between threads,
/// every execution acquires its own state from the pool.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'a> {
    program: &'a Program,
    pool: &'a Pool,
    max_call_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program, pool: &'a Pool) -> Self {
        Self {
            program,
            pool,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Set the maximum number of nested `{{template}}` invocations, counted
    /// from the executed template.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Executes the named template with `data` as dot, writing the output
    /// to `sink`.
    pub fn execute(&self, name: &str, data: Value, sink: &mut dyn io::Write) -> Result<()> {
        Machine {
            program: self.program,
            pool: self.pool,
            max_call_depth: self.max_call_depth,
        }
        .run(name, data, sink)
    }

    /// Executes the named template into a string built in a pooled buffer.
    pub fn execute_to_string(&self, name: &str, data: Value) -> Result<String> {
        let mut buf = self.pool.acquire_buffer();
        let result = self
            .execute(name, data, &mut buf)
            .and_then(|()| match std::str::from_utf8(&buf) {
                Ok(s) => Ok(s.to_owned()),
                Err(err) => Err(Error::render(
                    format!("template produced invalid UTF-8: {err}"),
                    None,
                )),
            });
        self.pool.release_buffer(buf);
        result
    }
}

/// Executes the named template of `program` with `data` as dot.
///
/// This is a shorthand for [`Interpreter::execute`] with the default call
/// depth.
pub fn execute(
    program: &Program,
    pool: &Pool,
    name: &str,
    data: Value,
    sink: &mut dyn io::Write,
) -> Result<()> {
    Interpreter::new(program, pool).execute(name, data, sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use crate::funcs::{Registry, ReturnKind};
    use crate::types::syntax::Syntax;
    use crate::{compile, ErrorKind, Value};

    fn program(source: &str) -> Program {
        program_with(source, &registry())
    }

    fn program_with(source: &str, registry: &Registry) -> Program {
        let trees: BTreeMap<_, _> = compile::parse(&Syntax::default(), "t", source)
            .unwrap()
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        let forest = compile::forest("t", &trees);
        compile::compile(&forest, registry).unwrap()
    }

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.add("upper", |s: String| s.to_uppercase());
        r.add("count", |s: String| s.len() as i64);
        r.set_return_kind("count", ReturnKind::Number);
        r.add("bold", |s: String| format!("<b>{s}</b>"));
        r.set_return_kind("bold", ReturnKind::Html);
        r.add("fail", |_: Value| -> std::result::Result<Value, String> {
            Err(String::from("nope"))
        });
        r
    }

    fn run(source: &str, data: impl Into<Value>) -> Result<String> {
        let program = program(source);
        let pool = Pool::new(2);
        Interpreter::new(&program, &pool).execute_to_string("t", data.into())
    }

    #[test]
    fn execute_text_and_print() {
        let out = run("Hello {{ . }}!", "World").unwrap();
        assert_eq!(out, "Hello World!");
    }

    #[test]
    fn execute_if_else() {
        let source = "{{ if . }}yes{{ else }}no{{ end }}";
        assert_eq!(run(source, true).unwrap(), "yes");
        assert_eq!(run(source, 0).unwrap(), "no");
        assert_eq!(run(source, "").unwrap(), "no");
    }

    #[test]
    fn execute_else_if() {
        let source = "{{ if eq . 1 }}one{{ else if . }}some{{ else }}none{{ end }}";
        let mut r = registry();
        r.add("eq", |a: Value, b: Value| a == b);
        let program = program_with(source, &r);
        let pool = Pool::disabled();
        let interp = Interpreter::new(&program, &pool);
        assert_eq!(interp.execute_to_string("t", Value::Integer(1)).unwrap(), "one");
        assert_eq!(interp.execute_to_string("t", Value::Integer(2)).unwrap(), "some");
        assert_eq!(interp.execute_to_string("t", Value::Integer(0)).unwrap(), "none");
    }

    #[test]
    fn execute_with_sets_dot() {
        let data = Value::from([("user", Value::from([("name", "Ann")]))]);
        let out = run("{{ with .user }}{{ .name }}{{ else }}-{{ end }}", data).unwrap();
        assert_eq!(out, "Ann");
        let out = run("{{ with .user }}{{ .name }}{{ else }}-{{ end }}", Value::None).unwrap();
        assert_eq!(out, "-");
    }

    #[test]
    fn execute_range() {
        let out = run("{{ range $i, $e := . }}{{ $i }}={{ $e }};{{ end }}", ["a", "b"]).unwrap();
        assert_eq!(out, "0=a;1=b;");
        let out = run("{{ range . }}<{{ . }}>{{ else }}empty{{ end }}", Value::None).unwrap();
        assert_eq!(out, "empty");
        let out = run("{{ range . }}{{ . }}{{ end }}", 3).unwrap();
        assert_eq!(out, "012");
    }

    #[test]
    fn execute_range_map_sorted() {
        let data = Value::from([("b", 2), ("a", 1)]);
        let out = run("{{ range $k, $v := . }}{{ $k }}{{ $v }}{{ end }}", data).unwrap();
        assert_eq!(out, "a1b2");
    }

    #[test]
    fn execute_variables() {
        let out = run("{{ $x := 1 }}{{ if . }}{{ $x = 2 }}{{ end }}{{ $x }}", true).unwrap();
        assert_eq!(out, "2");
        let out = run("{{ $ }}{{ with 5 }}{{ $ }}{{ . }}{{ end }}", 4).unwrap();
        assert_eq!(out, "445");
    }

    #[test]
    fn execute_functions() {
        assert_eq!(run("{{ . | upper }}", "abc").unwrap(), "ABC");
        assert_eq!(run("{{ upper . | count }}", "abc").unwrap(), "3");
        assert_eq!(run("{{ bold . }}", "x").unwrap(), "<b>x</b>");
    }

    #[test]
    fn execute_html_escaping() {
        let out = run("{{ . | _html_template_htmlescaper }}", "<a&b>").unwrap();
        assert_eq!(out, "&lt;a&amp;b&gt;");
        let out = run("{{ bold . | _html_template_htmlescaper }}", "<").unwrap();
        assert_eq!(out, "<b><</b>");
    }

    #[test]
    fn execute_template_invocation() {
        let source = r#"{{ define "item" }}[{{ . }}]{{ end }}{{ range . }}{{ template "item" . }}{{ end }}"#;
        assert_eq!(run(source, [1, 2]).unwrap(), "[1][2]");
    }

    #[test]
    fn execute_template_recursion_limit() {
        let source = r#"{{ define "loop" }}{{ template "loop" . }}{{ end }}{{ template "loop" . }}"#;
        let program = program(source);
        let pool = Pool::new(4);
        let err = Interpreter::new(&program, &pool)
            .with_max_call_depth(8)
            .execute_to_string("t", Value::None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
        assert_eq!(
            err.to_string(),
            "loop:1:20: reached the maximum template call depth (8)"
        );
        assert_eq!(pool.idle_states(), 4);
    }

    #[test]
    fn execute_errors_are_located() {
        let err = run("ab\n  {{ .x.y }}", 1).unwrap_err();
        assert_eq!(err.to_string(), "t:2:6: can't evaluate field x in type int");
        let err = run("{{ fail . }}", 1).unwrap_err();
        assert_eq!(err.to_string(), "t:1:4: error calling fail: nope");
        let err = run("{{ range . }}{{ end }}", "s").unwrap_err();
        assert_eq!(err.to_string(), "t:1:10: range can't iterate over string");
        let err = run("{{ . }}", [1]).unwrap_err();
        assert_eq!(err.to_string(), "t:1:4: can't print value of type list");
    }

    #[test]
    fn execute_unknown_template() {
        let program = program("x");
        let pool = Pool::disabled();
        let err = execute(&program, &pool, "nope", Value::None, &mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "no such template \"nope\"");
    }
}
