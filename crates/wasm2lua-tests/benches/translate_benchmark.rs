use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use wasm2lua::{transpile, RegisterStrategy, TranspileOptions};

fn arithmetic_module(functions: usize) -> Vec<u8> {
    let mut wat = String::from("(module (memory 1)\n");
    for i in 0..functions {
        wat.push_str(&format!(
            r#"(func (export "f{i}") (param i32 i64) (result i32) (local i32)
                (block
                    (loop
                        (br_if 1 (i32.ge_s (local.get 2) (local.get 0)))
                        (i32.store (local.get 2) (i32.wrap_i64 (i64.mul (local.get 1) (i64.const 3))))
                        (local.set 2 (i32.add (local.get 2) (i32.const 4)))
                        (br 0)))
                (i32.load (local.get 2)))
            "#
        ));
    }
    wat.push(')');
    wat::parse_str(&wat).unwrap()
}

fn translate_bench(c: &mut Criterion) {
    let wasm = arithmetic_module(200);
    let pooled = TranspileOptions::default();
    c.bench_function("translate 200 functions (pooled)", |b| {
        b.iter(|| transpile(black_box(&wasm), &pooled).unwrap())
    });

    let virtual_registers = TranspileOptions {
        register_strategy: RegisterStrategy::Virtual,
        ..Default::default()
    };
    c.bench_function("translate 200 functions (virtual)", |b| {
        b.iter(|| transpile(black_box(&wasm), &virtual_registers).unwrap())
    });
}

criterion_group!(benches, translate_bench);
criterion_main!(benches);
