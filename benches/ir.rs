mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rexi::backend::ir::{CodeGenerator, Machine};

fn bench_ir(c: &mut Criterion) {
    for (label, path) in common::workloads() {
        let program = common::load_program(&path);
        let unit = CodeGenerator::new().generate_unit(&program);

        c.bench_function(&format!("ir_generate_{label}"), |b| {
            b.iter(|| {
                let unit = CodeGenerator::new().generate_unit(black_box(&program));
                black_box(unit);
            })
        });

        c.bench_function(&format!("ir_machine_run_{label}"), |b| {
            b.iter(|| {
                let execution = Machine::new(black_box(&unit)).run().expect("run");
                black_box(execution);
            })
        });
    }
}

criterion_group!(benches, bench_ir);
criterion_main!(benches);
