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
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

fuzz_target!(|data: (Vec<(&str, &str)>, &str, Value)| {
    let (includes, root, value) = data;
    let mut engine = stencil::Engine::new();
    engine.set_max_call_depth(32);
    for (name, source) in includes {
        let _ = engine.add_template(name, source);
    }
    if engine.add_template("fuzz", root).is_err() {
        return;
    }
    let _ = engine.get_template("fuzz").unwrap().render(&value);
});
