use stencil::{Engine, ErrorKind};

#[test]
fn compile_empty() {
    Engine::new().compile("").unwrap();
}

#[test]
fn compile_raw() {
    Engine::new().compile("lorem ipsum dolor sit amet").unwrap();
}

#[test]
fn compile_comment() {
    Engine::new()
        .compile("lorem {{/* ipsum dolor */}} sit amet")
        .unwrap();
}

const EXPRS: &[&str] = &[
    ".",
    ".nested.path",
    "$",
    "$.nested.path",
    r#""normal""#,
    r#""escaped \n \r \t \\ \"""#,
    "`raw \\n`",
    "true",
    "false",
    "print nil",
    "123",
    "-123",
    "+123",
    "0x1f",
    "0o17",
    "0b1010",
    "1_000",
    "1.5",
    "1e3",
    "-0.5e-3",
    "(.a).b",
    "(index . 0).b",
    "print 1 2 | print",
    "len .items | print \"items\"",
];

#[test]
fn compile_inline_exprs() {
    let engine = Engine::new();
    for expr in EXPRS {
        let source = format!("lorem {{{{ {expr} }}}} ipsum");
        if let Err(err) = engine.compile(&source) {
            panic!("failed to compile `{source}`: {err:#}");
        }
    }
}

#[test]
fn compile_control_structures() {
    let engine = Engine::new();
    let sources = [
        "{{ if . }}a{{ end }}",
        "{{ if . }}a{{ else }}b{{ end }}",
        "{{ if .a }}a{{ else if .b }}b{{ else if .c }}c{{ else }}d{{ end }}",
        "{{ with $x := .a }}{{ $x }}{{ else with .b }}b{{ end }}",
        "{{ range . }}{{ . }}{{ end }}",
        "{{ range $i, $e := . }}{{ $i }}{{ $e }}{{ else }}none{{ end }}",
        r#"{{ define "a" }}A{{ end }}{{ template "a" }}{{ template "a" . }}"#,
        r#"{{ block "b" . }}B{{ end }}"#,
        "{{- . -}}",
        "{{ $x := 1 }}{{ $x = 2 }}{{ $x }}",
    ];
    for source in sources {
        if let Err(err) = engine.compile(source) {
            panic!("failed to compile `{source}`: {err:#}");
        }
    }
}

#[test]
fn compile_err_unclosed_action() {
    let err = Engine::new().compile("lorem {{ ipsum").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(
        format!("{err:#}"),
        "
   |
 1 | lorem {{ ipsum
   |       ^^ unclosed action
"
    );
}

#[test]
fn compile_err_named_template() {
    let mut engine = Engine::new();
    let err = engine
        .add_template("page", "lorem\nipsum {{ if . }}")
        .unwrap_err();
    assert_eq!(err.template_name(), Some("page"));
    assert_eq!(err.line_col(), Some((2, 7)));
    assert_eq!(
        format!("{err:#}"),
        "
  --> page:2:7
   |
 2 | ipsum {{ if . }}
   |       ^^^^^^^^^^ unclosed `if` action
"
    );
}

#[track_caller]
fn compile_err(source: &str) -> (ErrorKind, String) {
    let err = Engine::new().compile(source).unwrap_err();
    (err.kind(), err.to_string())
}

#[test]
fn compile_err_syntax() {
    let cases = [
        ("{{ end }}", "1:1: unexpected `end`"),
        ("{{ else }}", "1:1: unexpected `else`"),
        ("{{ if . }}x", "1:1: unclosed `if` action"),
        ("{{ range . }}x", "1:1: unclosed `range` action"),
        (
            r#"{{ define "a" }}{{ end }}{{ define "a" }}{{ end }}"#,
            "1:26: multiple definition of template \"a\"",
        ),
        (
            r#"{{ if . }}{{ define "a" }}{{ end }}{{ end }}"#,
            "1:11: unexpected `define` inside a control structure",
        ),
        (r#"{{ "abc }}"#, "1:4: undelimited string"),
        ("{{ 0x1G }}", "1:7: invalid digit for base 16 literal"),
    ];
    for (source, msg) in cases {
        assert_eq!(
            compile_err(source),
            (ErrorKind::Syntax, msg.to_owned()),
            "source: {source}"
        );
    }
}

#[test]
fn compile_err_semantic() {
    let cases = [
        ("{{ nope }}", "1:4: function \"nope\" not defined"),
        ("{{ $x }}", "1:4: undefined variable \"$x\""),
        (r#"{{ template "a" }}"#, "1:1: no such template \"a\""),
        ("{{ . | 1 }}", "1:8: can't give argument to non-function"),
        (
            "{{ range . }}{{ break }}{{ end }}",
            "1:14: {{break}} is not supported",
        ),
    ];
    for (source, msg) in cases {
        assert_eq!(
            compile_err(source),
            (ErrorKind::Compile, msg.to_owned()),
            "source: {source}"
        );
    }
}

#[test]
fn compile_disassemble() {
    let engine = Engine::new();
    let template = engine
        .compile("Hello {{ if .user }}{{ .user.name }}{{ else }}stranger{{ end }}!")
        .unwrap();
    let program = template.program();
    assert_eq!(program.templates().collect::<Vec<_>>(), [""]);
    assert_eq!(
        program.disassemble("").unwrap(),
        "\
0000 WriteBytes \"Hello \"
0001 Mark
0002 Dot
0003 Field .user/0
0004 JumpIfFalse +7 -> 0011
0005 Dot
0006 Field .user/0
0007 Field .name/0
0008 Print
0009 PopMark
0010 Jump +3 -> 0013
0011 WriteBytes \"stranger\"
0012 PopMark
0013 WriteBytes \"!\"
"
    );
    assert!(program.disassemble("missing").is_none());
}
