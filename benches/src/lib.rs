//! Shared fixtures for the benchmarks.

pub mod context;

use stencil::Engine;

/// A page template exercising conditionals, ranges, variables, template
/// invocation and the HTML escaper.
pub const PAGE: &str = r#"{{ define "empty" }}{{ end }}
{{- define "user" -}}
<li{{ if .is_disabled }} class="disabled"{{ end }}>{{ .name | _html_template_htmlescaper }} ({{ .age }})
  {{- range $i, $tag := .tags }}{{ if $i }}, {{ end }}{{ $tag }}{{ end -}}
</li>
{{- end -}}
<html>
  <head><title>{{ .title }}</title></head>
  <body>
    <h1>{{ .title }}</h1>
    {{- template "empty" . }}
    <ul>
    {{- range .users }}
      {{ template "user" . }}
    {{- else }}
      <li>nobody</li>
    {{- end }}
    </ul>
    {{- with $n := len .users }}
    <p>{{ $n }} users</p>
    {{- end }}
  </body>
</html>
"#;

/// Returns the body of [`PAGE`] repeated `n` times after its definitions.
pub fn repeat(n: usize) -> String {
    let split = PAGE.find("<html>").unwrap_or(0);
    let (defines, body) = PAGE.split_at(split);
    let mut s = String::from(defines);
    for _ in 0..n {
        s.push_str(body);
    }
    s
}

/// Returns an engine holding `source` as the template "bench".
pub fn engine(source: &str, optimize: bool, pool_capacity: usize) -> Engine {
    let mut engine = Engine::new();
    engine.set_optimize(optimize);
    engine.set_pool_capacity(pool_capacity);
    engine.add_template("bench", source).unwrap();
    engine
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_renders() {
        let ctx = context::Context {
            title: "My awesome webpage!".to_owned(),
            users: vec![
                context::User {
                    name: "Nancy <Wheeler>".to_owned(),
                    age: 17,
                    is_disabled: false,
                    tags: vec!["a".to_owned(), "b".to_owned()],
                },
                context::User {
                    name: "Billy Hargrove".to_owned(),
                    age: 19,
                    is_disabled: true,
                    tags: vec![],
                },
            ],
        };
        let plain = engine(&repeat(2), false, 0);
        let optimized = engine(&repeat(2), true, 4);
        let a = plain.get_template("bench").unwrap().render(&ctx).unwrap();
        let b = optimized.get_template("bench").unwrap().render(&ctx).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("Nancy &lt;Wheeler&gt; (17)a, b</li>"));
        assert!(a.contains(r#"<li class="disabled">Billy Hargrove (19)</li>"#));
        assert!(a.contains("<p>2 users</p>"));
    }
}
