use criterion::{black_box, criterion_group, criterion_main, Criterion};
use decode_asm::{Opcode, ValueType};
use decode_core::builder::NullBuilder;
use decode_core::decoder::decode;
use decode_core::testutil::{Program, RecordingBuilder, TestEnv};

/// `(i32) -> i32`: sums `1..=n` in a loop, one add and one compare per
/// iteration — representative of the arithmetic-heavy, loop-bearing bodies
/// the decoder spends most of its time on.
fn sum_loop_body() -> Program {
    Program::new()
        .loop_(3)
        .if_then()
        .unop(Opcode::I32Eqz)
        .get_local(0)
        .break_(0)
        .nop()
        .set_local(1)
        .binop(Opcode::I32Add)
        .get_local(1)
        .get_local(0)
        .set_local(0)
        .binop(Opcode::I32Sub)
        .get_local(0)
        .i32_const8(1)
        .ret()
        .get_local(1)
}

fn sum_loop_env() -> TestEnv {
    TestEnv::new(&[ValueType::I32], &[ValueType::I32]).with_local(ValueType::I32)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let body = sum_loop_body();
    let env = sum_loop_env();

    c.bench_function("decode_verify_only", |b| {
        b.iter(|| {
            let mut builder = NullBuilder;
            black_box(decode(black_box(body.bytes()), &env, &mut builder)).unwrap();
        });
    });

    c.bench_function("decode_with_ir_lowering", |b| {
        b.iter(|| {
            let mut builder = RecordingBuilder::new();
            black_box(decode(black_box(body.bytes()), &env, &mut builder)).unwrap();
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
