mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use culebra::backend::Backend;
use culebra::interpreter::Interpreter;

fn bench_interpreter(c: &mut Criterion) {
    let interpreter = Interpreter::new();
    for (label, path) in common::workloads() {
        let program = common::load_program(path);

        c.bench_function(&format!("interpreter_prepare_{label}"), |b| {
            b.iter(|| {
                let prepared = interpreter.prepare(black_box(&program)).expect("prepare");
                black_box(prepared);
            })
        });

        c.bench_function(&format!("interpreter_run_{label}"), |b| {
            let prepared = interpreter.prepare(&program).expect("prepare");
            b.iter(|| {
                let output = prepared.run().expect("run");
                black_box(output);
            })
        });
    }
}

criterion_group!(benches, bench_interpreter);
criterion_main!(benches);
