// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use bitstack::asm::Asm;
use bitstack::builtins::Builtin;
use bitstack::bytecode::{BytecodeFunction, InvocationData, SlotIndex};
use bitstack::opcode::Opcode;
use bitstack::program::{FnDecl, FnId, ImportData, InvocationId, ModuleId, TableCache};
use bitstack::trace::{TraceMask, TraceSink};
use bitstack::value::Value;
use bitstack::vm::{Interpreter, Limits};

fn bench_vm(c: &mut Criterion) {
    bench_add_chain(c);
    bench_add_chain_traced_instr(c);
    bench_wide_mul_chain(c);
    bench_branch_hot_loop(c);
    bench_call_loop(c);
    bench_map(c);
}

fn bench_add_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_chain");
    for &chain_len in &[10_u32, 50, 200, 1000] {
        let import_data = ImportData::new();
        let bf = build_add_chain(chain_len);
        let mut interp = Interpreter::new(&import_data, wide_open_limits());
        group.bench_with_input(BenchmarkId::from_parameter(chain_len), &bf, |b, bf| {
            b.iter(|| {
                let out = interp.run(bf, vec![]).unwrap();
                black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_add_chain_traced_instr(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_chain_traced_instr");
    for &chain_len in &[10_u32, 50, 200] {
        let import_data = ImportData::new();
        let bf = build_add_chain(chain_len);
        let mut interp = Interpreter::new(&import_data, wide_open_limits());
        let mut sink = CountingInstr::default();
        group.bench_with_input(BenchmarkId::from_parameter(chain_len), &bf, |b, bf| {
            b.iter(|| {
                let out = interp.run_traced(bf, vec![], Some(&mut sink)).unwrap();
                black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_wide_mul_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_mul_chain");
    for &width in &[32_usize, 128, 1024] {
        let import_data = ImportData::new();
        let bf = build_wide_mul_chain(width, 32);
        let mut interp = Interpreter::new(&import_data, wide_open_limits());
        group.bench_with_input(BenchmarkId::from_parameter(width), &bf, |b, bf| {
            b.iter(|| {
                let out = interp.run(bf, vec![]).unwrap();
                black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_branch_hot_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("branch_hot_loop");
    for &iters in &[100_u64, 1000, 10_000] {
        let import_data = ImportData::new();
        let bf = build_branch_hot_loop(iters);
        let mut interp = Interpreter::new(&import_data, wide_open_limits());
        group.bench_with_input(BenchmarkId::from_parameter(iters), &bf, |b, bf| {
            b.iter(|| {
                let out = interp.run(bf, vec![]).unwrap();
                black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_call_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("call_loop");
    for &iters in &[10_u64, 100, 1000] {
        let (import_data, bf) = build_call_loop(iters);
        let mut interp = Interpreter::new(&import_data, wide_open_limits());
        group.bench_with_input(BenchmarkId::from_parameter(iters), &bf, |b, bf| {
            b.iter(|| {
                let out = interp.run(bf, vec![]).unwrap();
                black_box(out);
            });
        });
    }
    group.finish();
}

fn bench_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("map");
    for &len in &[8_u64, 64, 512] {
        let (import_data, bf) = build_map(len);
        let mut interp = Interpreter::new(&import_data, wide_open_limits());
        group.bench_with_input(BenchmarkId::from_parameter(len), &bf, |b, bf| {
            b.iter(|| {
                let out = interp.run(bf, vec![]).unwrap();
                black_box(out);
            });
        });
    }
    group.finish();
}

fn build_add_chain(chain_len: u32) -> Rc<BytecodeFunction> {
    let mut a = Asm::new();
    a.literal(Value::ubits(32, 1));
    for _ in 0..chain_len {
        a.literal(Value::ubits(32, 2));
        a.add();
    }
    a.build(None, None, None).unwrap()
}

fn build_wide_mul_chain(width: usize, chain_len: u32) -> Rc<BytecodeFunction> {
    let mut a = Asm::new();
    a.literal(Value::ubits(width, 0x9E37_79B9));
    for _ in 0..chain_len {
        a.literal(Value::ubits(width, 0x85EB_CA6B));
        a.mul();
    }
    a.build(None, None, None).unwrap()
}

fn build_branch_hot_loop(iters: u64) -> Rc<BytecodeFunction> {
    // s0: counter; loop until counter == iters, then return it.
    let mut a = Asm::new();
    let top = a.new_label();
    a.literal(Value::ubits(32, 0));
    a.store(SlotIndex(0));
    a.bind(top);
    a.load(SlotIndex(0));
    a.literal(Value::ubits(32, 1));
    a.add();
    a.store(SlotIndex(0));
    a.load(SlotIndex(0));
    a.literal(Value::ubits(32, iters));
    a.lt();
    a.jump_if(top);
    a.load(SlotIndex(0));
    a.build(None, None, None).unwrap()
}

fn build_call_loop(iters: u64) -> (ImportData, Rc<BytecodeFunction>) {
    let decl = Rc::new(FnDecl {
        id: FnId(0),
        module: ModuleId(0),
        name: String::from("inc"),
        param_count: 1,
        parametric: false,
    });
    let mut body = Asm::new();
    body.load(SlotIndex(0));
    body.literal(Value::ubits(32, 1));
    body.add();
    let callee = body.build(Some(decl.clone()), None, None).unwrap();

    let mut cache = TableCache::new();
    cache.insert(FnId(0), None, callee);
    let mut import_data = ImportData::new();
    import_data.set_bytecode_cache(Box::new(cache));

    // s0: accumulator; call inc(s0) `iters` times.
    let mut a = Asm::new();
    let top = a.new_label();
    a.literal(Value::ubits(32, 0));
    a.store(SlotIndex(0));
    a.literal(Value::ubits(32, 0));
    a.store(SlotIndex(1));
    a.bind(top);
    a.load(SlotIndex(0));
    a.literal(Value::user_fn(decl));
    a.call(InvocationData {
        invocation: InvocationId(0),
        bindings: None,
    });
    a.store(SlotIndex(0));
    a.load(SlotIndex(1));
    a.literal(Value::ubits(32, 1));
    a.add();
    a.store(SlotIndex(1));
    a.load(SlotIndex(1));
    a.literal(Value::ubits(32, iters));
    a.lt();
    a.jump_if(top);
    a.load(SlotIndex(0));
    (import_data, a.build(None, None, None).unwrap())
}

fn build_map(len: u64) -> (ImportData, Rc<BytecodeFunction>) {
    let decl = Rc::new(FnDecl {
        id: FnId(0),
        module: ModuleId(0),
        name: String::from("square"),
        param_count: 1,
        parametric: false,
    });
    let mut body = Asm::new();
    body.load(SlotIndex(0));
    body.load(SlotIndex(0));
    body.mul();
    let callee = body.build(Some(decl.clone()), None, None).unwrap();

    let mut cache = TableCache::new();
    cache.insert(FnId(0), None, callee);
    let mut import_data = ImportData::new();
    import_data.set_bytecode_cache(Box::new(cache));

    let elements: Vec<Value> = (0..len).map(|i| Value::ubits(32, i)).collect();
    let mut a = Asm::new();
    a.literal(Value::array(elements).unwrap());
    a.literal(Value::user_fn(decl));
    a.literal(Value::builtin_fn(Builtin::Map));
    a.call(InvocationData {
        invocation: InvocationId(0),
        bindings: None,
    });
    (import_data, a.build(None, None, None).unwrap())
}

fn wide_open_limits() -> Limits {
    Limits {
        fuel: u64::MAX,
        max_call_depth: 1024,
    }
}

#[derive(Default)]
struct CountingInstr {
    _count: u64,
}

impl TraceSink for CountingInstr {
    fn mask(&self) -> TraceMask {
        TraceMask::INSTR
    }

    fn instr(&mut self, _depth: usize, _pc: usize, _opcode: Opcode) {
        self._count = self._count.wrapping_add(1);
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(std::time::Duration::from_millis(300))
        .measurement_time(std::time::Duration::from_millis(1200))
        .sample_size(60);
    targets = bench_vm
}
criterion_main!(benches);
