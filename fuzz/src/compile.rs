#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let mut engine = stencil::Engine::new();
    if engine.add_template("fuzz", data).is_ok() {
        let template = engine.get_template("fuzz").unwrap();
        for name in template.program().templates() {
            template.program().disassemble(name).unwrap();
        }
    }
});
