#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde::Serialize;

#[derive(Debug, Serialize, Arbitrary)]
enum Value {
    None,
    Bool(bool),
    Integer(i64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

fn engine(optimize: bool) -> stencil::Engine {
    let mut engine = stencil::Engine::new();
    engine.set_optimize(optimize);
    engine.set_max_call_depth(32);
    engine
}

// The optimizer may drop a failing field access whose result is unused, so
// only successful unoptimized renders are compared.
fuzz_target!(|data: (&str, Value)| {
    let (source, value) = data;
    let plain = engine(false);
    let optimized = engine(true);
    let Ok(a) = plain.compile(source) else {
        return;
    };
    let b = optimized.compile(source).unwrap();
    let len = |t: &stencil::Template<'_>| t.program().code(t.program().root()).unwrap().len();
    assert!(len(&b) <= len(&a));
    if let Ok(expected) = a.render(&value) {
        assert_eq!(b.render(&value).unwrap(), expected);
    }
});
