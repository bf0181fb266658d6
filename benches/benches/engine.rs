//! Benchmark template compilation, optimization and rendering time.

use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use benches::{context, engine, repeat};
use stencil::{Engine, Interpreter, Pool};

criterion_main! { benches }
criterion_group! { benches, bench_init, bench_compile, bench_optimize, bench_render, bench_render_concurrent }

/// Benchmarks the time taken to create a new instance of the engine.
fn bench_init(c: &mut Criterion) {
    c.bench_function("init", |b| b.iter(Engine::new));
}

/// Benchmarks the time taken to compile a template, with and without the
/// optimizer.
fn bench_compile(c: &mut Criterion) {
    let mut g = c.benchmark_group("compile");
    let source = repeat(50);

    for optimize in [false, true] {
        let name = if optimize { "optimized" } else { "plain" };
        g.bench_function(name, |b| {
            let mut engine = Engine::new();
            engine.set_optimize(optimize);
            b.iter(|| engine.compile(&source).unwrap());
        });
    }
}

/// Benchmarks the optimizer passes alone.
fn bench_optimize(c: &mut Criterion) {
    let engine = engine(&repeat(50), false, 0);
    let program = engine.get_template("bench").unwrap().program().clone();
    c.bench_function("optimize", |b| {
        b.iter_batched(
            || program.clone(),
            |mut program| stencil::optimize(&mut program),
            BatchSize::SmallInput,
        );
    });
}

/// Benchmarks the time taken to render a template as a string.
fn bench_render(c: &mut Criterion) {
    let mut g = c.benchmark_group("render");
    let ctx = stencil::to_value(context::random(150)).unwrap();
    let source = repeat(20);

    for (name, optimize, pool) in [
        ("plain", false, 16),
        ("optimized", true, 16),
        ("unpooled", true, 0),
    ] {
        g.bench_function(name, |b| {
            let engine = engine(&source, optimize, pool);
            let template = engine.get_template("bench").unwrap();
            b.iter(|| template.render_from(ctx.clone()).unwrap());
        });
    }

    g.bench_function("interpreter", |b| {
        let engine = engine(&source, true, 0);
        let program = engine.get_template("bench").unwrap().program();
        let pool = Pool::new(1);
        let interp = Interpreter::new(program, &pool);
        let mut out = Vec::new();
        b.iter(|| {
            out.clear();
            interp.execute(program.root(), ctx.clone(), &mut out).unwrap();
        });
    });
}

/// Benchmarks several threads rendering from one shared engine.
fn bench_render_concurrent(c: &mut Criterion) {
    let mut g = c.benchmark_group("render_concurrent");
    let ctx = stencil::to_value(context::random(50)).unwrap();
    let source = repeat(5);

    for pool in [0, 16] {
        let name = if pool == 0 { "unpooled" } else { "pooled" };
        let engine = Arc::new(engine(&source, true, pool));
        g.bench_function(name, |b| {
            b.iter(|| {
                let handles: Vec<_> = (0..4)
                    .map(|_| {
                        let engine = Arc::clone(&engine);
                        let ctx = ctx.clone();
                        thread::spawn(move || {
                            let template = engine.get_template("bench").unwrap();
                            for _ in 0..8 {
                                template.render_from(ctx.clone()).unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }
}
