// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(missing_docs, reason = "integration test crate")]

use std::rc::Rc;

use bitstack::asm::Asm;
use bitstack::builtins::Builtin;
use bitstack::bytecode::{
    BytecodeFunction, Instr, InstrKind, InvocationData, MatchArmItem, SlotIndex, Span, TraceStep,
};
use bitstack::channel::ChannelRef;
use bitstack::opcode::Opcode;
use bitstack::program::{
    FnDecl, FnId, ImportData, InvocationId, ModuleId, SymBindings, TableCache, TypeDesc, TypeInfo,
};
use bitstack::trace::{TraceMask, TraceSink};
use bitstack::value::{FormatPreference, Value};
use bitstack::vm::{ErrorKind, Interpreter, Limits, VmError, interpret};

fn no_invocation() -> InvocationData {
    InvocationData {
        invocation: InvocationId(0),
        bindings: None,
    }
}

fn run(a: Asm) -> Result<Value, VmError> {
    let bf = a.build(None, None, None).unwrap();
    interpret(&ImportData::new(), &bf, vec![])
}

fn run_with(import_data: &ImportData, a: Asm, args: Vec<Value>) -> Result<Value, VmError> {
    let bf = a.build(None, None, None).unwrap();
    interpret(import_data, &bf, args)
}

/// Calls `builtin` with already-pushed operands.
fn call_builtin(a: &mut Asm, builtin: Builtin) {
    a.literal(Value::builtin_fn(builtin));
    a.call(no_invocation());
}

fn import_data_with(decls: &[(&Rc<FnDecl>, &Rc<BytecodeFunction>)]) -> ImportData {
    let mut cache = TableCache::new();
    for (decl, bf) in decls {
        cache.insert(decl.id, None, Rc::clone(*bf));
    }
    let mut import_data = ImportData::new();
    import_data.set_bytecode_cache(Box::new(cache));
    import_data
}

fn decl(id: u32, name: &str, param_count: usize) -> Rc<FnDecl> {
    Rc::new(FnDecl {
        id: FnId(id),
        module: ModuleId(0),
        name: String::from(name),
        param_count,
        parametric: false,
    })
}

// Scenario: literal/add arithmetic on an empty-arg root frame.
#[test]
fn arithmetic_and_return() {
    let mut a = Asm::new();
    a.literal(Value::ubits(32, 7));
    a.literal(Value::ubits(32, 5));
    a.add();
    assert_eq!(run(a), Ok(Value::ubits(32, 12)));
}

// Scenario: f(x, y) = x - y through the call protocol; exactly one value
// remains on the operand stack.
#[test]
fn call_and_parameters() {
    let f = decl(0, "sub2", 2);
    let mut body = Asm::new();
    body.load(SlotIndex(0));
    body.load(SlotIndex(1));
    body.sub();
    let f_bf = body.build(Some(f.clone()), None, None).unwrap();
    let import_data = import_data_with(&[(&f, &f_bf)]);

    let mut a = Asm::new();
    a.literal(Value::ubits(8, 10));
    a.literal(Value::ubits(8, 3));
    a.literal(Value::user_fn(f));
    a.call(no_invocation());
    let bf = a.build(None, None, None).unwrap();

    let mut interp = Interpreter::new(&import_data, Limits::default());
    assert_eq!(interp.run(&bf, vec![]), Ok(Value::ubits(8, 7)));
    assert_eq!(interp.stack_depth(), 0);
}

// Scenario: pattern-match arms; `store` sub-patterns bind even when the arm
// ultimately fails to match.
#[test]
fn match_arm_store_is_unconditional() {
    let scrutinee = Value::Tuple(vec![Value::ubits(1, 1), Value::ubits(8, 9)]);

    let matching = MatchArmItem::Tuple(vec![
        MatchArmItem::Store(SlotIndex(0)),
        MatchArmItem::Literal(Value::ubits(8, 9)),
    ]);
    let mut a = Asm::new();
    a.literal(scrutinee.clone());
    a.match_arm(matching);
    a.load(SlotIndex(0));
    a.create_tuple(2);
    assert_eq!(
        run(a),
        Ok(Value::Tuple(vec![Value::bool_value(true), Value::ubits(1, 1)]))
    );

    let failing = MatchArmItem::Tuple(vec![
        MatchArmItem::Store(SlotIndex(0)),
        MatchArmItem::Literal(Value::ubits(8, 8)),
    ]);
    let mut a = Asm::new();
    a.literal(scrutinee);
    a.match_arm(failing);
    a.load(SlotIndex(0));
    a.create_tuple(2);
    // Arm did not match, but slot 0 was still updated.
    assert_eq!(
        run(a),
        Ok(Value::Tuple(vec![Value::bool_value(false), Value::ubits(1, 1)]))
    );
}

#[test]
fn match_arm_load_and_wildcard() {
    // Arm (load s0, wildcard) against (u8:4, u8:7) with s0 already bound to 4.
    let arm = MatchArmItem::Tuple(vec![
        MatchArmItem::Load(SlotIndex(0)),
        MatchArmItem::Wildcard,
    ]);
    let mut a = Asm::new();
    a.literal(Value::Tuple(vec![Value::ubits(8, 4), Value::ubits(8, 7)]));
    a.match_arm(arm);
    let bf = a.build(None, None, None).unwrap();
    let result = interpret(&ImportData::new(), &bf, vec![Value::ubits(8, 4)]);
    assert_eq!(result, Ok(Value::bool_value(true)));
}

// Scenario: channel send/recv, then `unavailable` on the drained channel.
#[test]
fn channel_send_recv_and_unavailable() {
    let ch = ChannelRef::new();

    let mut a = Asm::new();
    a.literal(Value::Channel(ch.clone()));
    a.literal(Value::ubits(32, 42));
    a.send();
    a.literal(Value::Channel(ch.clone()));
    a.recv();
    assert_eq!(run(a), Ok(Value::ubits(32, 42)));

    let mut a = Asm::new();
    a.literal(Value::Channel(ch));
    a.recv();
    let err = run(a).unwrap_err();
    assert_eq!(err, VmError::ChannelEmpty);
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[test]
fn channel_fifo_order() {
    let ch = ChannelRef::new();
    let k = 5_u64;

    let mut a = Asm::new();
    for i in 0..k {
        a.literal(Value::Channel(ch.clone()));
        a.literal(Value::ubits(32, i * 11));
        a.send();
    }
    for _ in 0..k {
        a.literal(Value::Channel(ch.clone()));
        a.recv();
    }
    a.create_array(k as usize);
    let expected: Vec<Value> = (0..k).map(|i| Value::ubits(32, i * 11)).collect();
    assert_eq!(run(a), Ok(Value::array(expected).unwrap()));
}

#[derive(Default)]
struct CallCounter {
    depth_two_calls: usize,
}

impl TraceSink for CallCounter {
    fn mask(&self) -> TraceMask {
        TraceMask::INSTR
    }

    fn instr(&mut self, depth: usize, _pc: usize, opcode: Opcode) {
        if depth == 2 && opcode == Opcode::Call {
            self.depth_two_calls += 1;
        }
    }
}

// Scenario: `map` synthesizes a loop; exactly three calls execute inside
// the synthesized frame for a three-element input.
#[test]
fn map_lowering_squares() {
    let square = decl(0, "square", 1);
    let mut body = Asm::new();
    body.load(SlotIndex(0));
    body.load(SlotIndex(0));
    body.mul();
    let square_bf = body.build(Some(square.clone()), None, None).unwrap();
    let import_data = import_data_with(&[(&square, &square_bf)]);

    let mut a = Asm::new();
    a.literal(
        Value::array(vec![
            Value::ubits(32, 1),
            Value::ubits(32, 2),
            Value::ubits(32, 3),
        ])
        .unwrap(),
    );
    a.literal(Value::user_fn(square));
    call_builtin(&mut a, Builtin::Map);
    let bf = a.build(None, None, None).unwrap();

    let mut interp = Interpreter::new(&import_data, Limits::default());
    let mut sink = CallCounter::default();
    let result = interp.run_traced(&bf, vec![], Some(&mut sink)).unwrap();
    assert_eq!(
        result,
        Value::array(vec![
            Value::ubits(32, 1),
            Value::ubits(32, 4),
            Value::ubits(32, 9),
        ])
        .unwrap()
    );
    assert_eq!(sink.depth_two_calls, 3);
}

#[test]
fn map_preserves_length_and_elements() {
    let inc = decl(0, "inc", 1);
    let mut body = Asm::new();
    body.load(SlotIndex(0));
    body.literal(Value::ubits(16, 1));
    body.add();
    let inc_bf = body.build(Some(inc.clone()), None, None).unwrap();
    let import_data = import_data_with(&[(&inc, &inc_bf)]);

    let input: Vec<Value> = (0..17).map(|i| Value::ubits(16, i * 3)).collect();
    let mut a = Asm::new();
    a.literal(Value::array(input.clone()).unwrap());
    a.literal(Value::user_fn(inc));
    call_builtin(&mut a, Builtin::Map);
    let result = run_with(&import_data, a, vec![]).unwrap();

    let expected: Vec<Value> = (0..17).map(|i| Value::ubits(16, i * 3 + 1)).collect();
    assert_eq!(result, Value::array(expected).unwrap());
}

// Scenario: width-slice with a start past the basis width.
#[test]
fn width_slice_out_of_range_yields_zero() {
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 0xAB));
    a.literal(Value::ubits(8, 100));
    a.width_slice(TypeDesc::Bits {
        signed: false,
        width: 4,
    });
    assert_eq!(run(a), Ok(Value::ubits(4, 0)));
}

#[test]
fn width_slice_extends_short_basis() {
    // start + width > basis width: the basis is zero-extended first.
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 0xAB));
    a.literal(Value::ubits(8, 6));
    a.width_slice(TypeDesc::Bits {
        signed: false,
        width: 4,
    });
    assert_eq!(run(a), Ok(Value::ubits(4, 0b10)));
}

// Scenario: assert_eq failure carries both operands' textual forms.
#[test]
fn assert_eq_failure_renders_operands() {
    let mut a = Asm::new();
    a.literal(Value::ubits(32, 1));
    a.literal(Value::ubits(32, 2));
    call_builtin(&mut a, Builtin::AssertEq);
    let err = run(a).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Failure);
    let VmError::Failure { message, .. } = err else {
        panic!("expected failure, got {err:?}");
    };
    assert!(message.contains("u32:1"), "message: {message}");
    assert!(message.contains("u32:2"), "message: {message}");
}

#[test]
fn assert_eq_arrays_diagnose_first_differing_index() {
    let mut a = Asm::new();
    a.literal(
        Value::array(vec![Value::ubits(8, 1), Value::ubits(8, 2), Value::ubits(8, 3)]).unwrap(),
    );
    a.literal(
        Value::array(vec![Value::ubits(8, 1), Value::ubits(8, 5), Value::ubits(8, 3)]).unwrap(),
    );
    call_builtin(&mut a, Builtin::AssertEq);
    let VmError::Failure { message, .. } = run(a).unwrap_err() else {
        panic!("expected failure");
    };
    assert!(
        message.contains("first differing index: 1"),
        "message: {message}"
    );
}

#[test]
fn assert_lt_failure_and_success() {
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 3));
    a.literal(Value::ubits(8, 9));
    call_builtin(&mut a, Builtin::AssertLt);
    assert_eq!(run(a), Ok(Value::bool_value(true)));

    let mut a = Asm::new();
    a.literal(Value::ubits(8, 9));
    a.literal(Value::ubits(8, 3));
    call_builtin(&mut a, Builtin::AssertLt);
    let VmError::Failure { message, .. } = run(a).unwrap_err() else {
        panic!("expected failure");
    };
    assert!(message.contains("want: u8:9 < u8:3"), "message: {message}");
}

// Universal property: arithmetic preserves width and wraps mod 2^w.
#[test]
fn arithmetic_wraps_to_operand_width() {
    let cases: &[(Opcode, u64, u64, u64)] = &[
        (Opcode::Add, 250, 10, 4),
        (Opcode::Sub, 3, 10, 249),
        (Opcode::Mul, 20, 13, 4),
    ];
    for &(op, x, y, expected) in cases {
        let mut a = Asm::new();
        a.literal(Value::ubits(8, x));
        a.literal(Value::ubits(8, y));
        match op {
            Opcode::Add => a.add(),
            Opcode::Sub => a.sub(),
            Opcode::Mul => a.mul(),
            _ => unreachable!(),
        }
        assert_eq!(run(a), Ok(Value::ubits(8, expected)), "{op} {x} {y}");
    }
}

// Universal property: slicing (s..w) and (0..s) and concatenating restores
// the original value.
#[test]
fn slice_roundtrip_through_concat() {
    let w = 8_i64;
    let x = 0xA5_u64;
    for s in 0..=w {
        let mut a = Asm::new();
        a.literal(Value::ubits(8, x));
        a.literal(Value::sbits(32, s));
        a.literal(Value::sbits(32, w));
        a.slice();
        a.literal(Value::ubits(8, x));
        a.literal(Value::sbits(32, 0));
        a.literal(Value::sbits(32, s));
        a.slice();
        a.concat();
        assert_eq!(run(a), Ok(Value::ubits(8, x)), "split at {s}");
    }
}

// Universal property: bits -> array -> bits is the identity.
#[test]
fn cast_roundtrip_bits_array_bits() {
    let mut a = Asm::new();
    a.literal(Value::ubits(24, 0xABCDEF));
    a.cast(TypeDesc::array_of(
        TypeDesc::Bits {
            signed: false,
            width: 8,
        },
        3,
    ));
    a.cast(TypeDesc::Bits {
        signed: false,
        width: 24,
    });
    assert_eq!(run(a), Ok(Value::ubits(24, 0xABCDEF)));
}

#[test]
fn cast_incompatible_shapes_is_invalid_argument() {
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 1));
    a.cast(TypeDesc::array_of(
        TypeDesc::Bits {
            signed: false,
            width: 4,
        },
        3,
    ));
    assert_eq!(run(a).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

// Universal property: one_hot always has popcount 1.
#[test]
fn one_hot_popcount_is_one() {
    for v in 0..8_u64 {
        for lsb in [true, false] {
            let mut a = Asm::new();
            a.literal(Value::ubits(3, v));
            a.literal(Value::bool_value(lsb));
            call_builtin(&mut a, Builtin::OneHot);
            let result = run(a).unwrap();
            let bits = result.bits().unwrap();
            assert_eq!(bits.width(), 4);
            assert_eq!(bits.count_ones(), 1, "one_hot({v}, {lsb})");
        }
    }
}

// Universal property: enumerate pairs each element with its index.
#[test]
fn enumerate_pairs_indices() {
    let mut a = Asm::new();
    a.literal(Value::array(vec![Value::ubits(8, 7), Value::ubits(8, 9)]).unwrap());
    call_builtin(&mut a, Builtin::Enumerate);
    let expected = Value::array(vec![
        Value::Tuple(vec![Value::u32_value(0), Value::ubits(8, 7)]),
        Value::Tuple(vec![Value::u32_value(1), Value::ubits(8, 9)]),
    ])
    .unwrap();
    assert_eq!(run(a), Ok(expected));
}

// Universal property: invert and negate are involutions.
#[test]
fn invert_and_negate_involutions() {
    let mut a = Asm::new();
    a.literal(Value::ubits(16, 0xBEEF));
    a.invert();
    a.invert();
    assert_eq!(run(a), Ok(Value::ubits(16, 0xBEEF)));

    let mut a = Asm::new();
    a.literal(Value::sbits(16, -12345));
    a.negate();
    a.negate();
    assert_eq!(run(a), Ok(Value::sbits(16, -12345)));
}

#[test]
fn builtin_library_spot_checks() {
    // add_with_carry: (u8:200 + u8:100) = carry 1, sum 44.
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 200));
    a.literal(Value::ubits(8, 100));
    call_builtin(&mut a, Builtin::AddWithCarry);
    assert_eq!(
        run(a),
        Ok(Value::Tuple(vec![Value::bool_value(true), Value::ubits(8, 44)]))
    );

    // and_reduce / or_reduce / xor_reduce.
    for (builtin, v, expected) in [
        (Builtin::AndReduce, 0xFF_u64, true),
        (Builtin::AndReduce, 0xFE, false),
        (Builtin::OrReduce, 0x00, false),
        (Builtin::OrReduce, 0x10, true),
        (Builtin::XorReduce, 0x03, false),
        (Builtin::XorReduce, 0x07, true),
    ] {
        let mut a = Asm::new();
        a.literal(Value::ubits(8, v));
        call_builtin(&mut a, builtin);
        assert_eq!(run(a), Ok(Value::bool_value(expected)), "{builtin:?}({v})");
    }

    // clz/ctz keep the source width.
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 0b0001_0000));
    call_builtin(&mut a, Builtin::Clz);
    assert_eq!(run(a), Ok(Value::ubits(8, 3)));
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 0b0001_0000));
    call_builtin(&mut a, Builtin::Ctz);
    assert_eq!(run(a), Ok(Value::ubits(8, 4)));

    // rev.
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 0b1100_0010));
    call_builtin(&mut a, Builtin::Rev);
    assert_eq!(run(a), Ok(Value::ubits(8, 0b0100_0011)));

    // range(2, 6).
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 2));
    a.literal(Value::ubits(8, 6));
    call_builtin(&mut a, Builtin::Range);
    let expected: Vec<Value> = (2..6).map(|i| Value::ubits(8, i)).collect();
    assert_eq!(run(a), Ok(Value::array(expected).unwrap()));

    // update.
    let mut a = Asm::new();
    a.literal(Value::array(vec![Value::ubits(8, 1), Value::ubits(8, 2)]).unwrap());
    a.literal(Value::ubits(32, 1));
    a.literal(Value::ubits(8, 9));
    call_builtin(&mut a, Builtin::Update);
    assert_eq!(
        run(a),
        Ok(Value::array(vec![Value::ubits(8, 1), Value::ubits(8, 9)]).unwrap())
    );

    // gate passes or zeroes.
    let mut a = Asm::new();
    a.literal(Value::bool_value(false));
    a.literal(Value::Tuple(vec![Value::ubits(8, 7), Value::sbits(4, -1)]));
    call_builtin(&mut a, Builtin::Gate);
    assert_eq!(
        run(a),
        Ok(Value::Tuple(vec![Value::ubits(8, 0), Value::sbits(4, 0)]))
    );

    // signex keeps the subject signedness.
    let mut a = Asm::new();
    a.literal(Value::sbits(4, -3));
    a.literal(Value::sbits(8, 0));
    call_builtin(&mut a, Builtin::Signex);
    assert_eq!(run(a), Ok(Value::sbits(8, -3)));

    // one_hot_sel ORs selected cases.
    let mut a = Asm::new();
    a.literal(Value::ubits(3, 0b101));
    a.literal(
        Value::array(vec![Value::ubits(8, 0x01), Value::ubits(8, 0x02), Value::ubits(8, 0x30)])
            .unwrap(),
    );
    call_builtin(&mut a, Builtin::OneHotSel);
    assert_eq!(run(a), Ok(Value::ubits(8, 0x31)));

    // bit_slice: width from the third argument's width.
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 0xAB));
    a.literal(Value::ubits(8, 4));
    a.literal(Value::ubits(4, 0));
    call_builtin(&mut a, Builtin::BitSlice);
    assert_eq!(run(a), Ok(Value::ubits(4, 0xA)));

    // bit_slice_update out of range leaves the subject unchanged.
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 0xFF));
    a.literal(Value::ubits(8, 8));
    a.literal(Value::ubits(4, 0));
    call_builtin(&mut a, Builtin::BitSliceUpdate);
    assert_eq!(run(a), Ok(Value::ubits(8, 0xFF)));

    // cover is a no-op token.
    let mut a = Asm::new();
    call_builtin(&mut a, Builtin::Cover);
    assert_eq!(run(a), Ok(Value::Token));
}

#[test]
fn builtin_fail_carries_rendered_value() {
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 77));
    call_builtin(&mut a, Builtin::Fail);
    let VmError::Failure { message, .. } = run(a).unwrap_err() else {
        panic!("expected failure");
    };
    assert!(message.contains("u8:77"), "message: {message}");
}

#[derive(Default)]
struct MessageCollector {
    messages: Vec<String>,
}

impl TraceSink for MessageCollector {
    fn mask(&self) -> TraceMask {
        TraceMask::MESSAGES
    }

    fn trace_message(&mut self, _span: Option<Span>, text: &str) {
        self.messages.push(String::from(text));
    }
}

#[test]
fn trace_renders_and_pushes_token() {
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 5));
    a.push(Instr::new(InstrKind::Trace(vec![
        TraceStep::Text(String::from("x = ")),
        TraceStep::Value(FormatPreference::Hex),
    ])));
    let bf = a.build(None, None, None).unwrap();

    let import_data = ImportData::new();
    let mut interp = Interpreter::new(&import_data, Limits::default());
    let mut sink = MessageCollector::default();
    let result = interp.run_traced(&bf, vec![], Some(&mut sink)).unwrap();
    assert_eq!(result, Value::Token);
    assert_eq!(sink.messages, vec![String::from("x = u8:0x05")]);
}

#[test]
fn parametric_call_resolves_instantiation_type_info() {
    // A parametric callee: its bytecode is registered under the caller's
    // bindings, and the instantiation type-info must be present.
    let f = Rc::new(FnDecl {
        id: FnId(7),
        module: ModuleId(0),
        name: String::from("widen"),
        param_count: 1,
        parametric: true,
    });
    let bindings = SymBindings::new(vec![(String::from("N"), 8)]);

    let root_ti = Rc::new(TypeInfo::new(ModuleId(0)));
    let inst_ti = Rc::new(TypeInfo::new(ModuleId(0)));
    root_ti.add_instantiation(InvocationId(3), bindings.clone(), inst_ti.clone());

    let mut body = Asm::new();
    body.load(SlotIndex(0));
    let f_bf = body
        .build(Some(f.clone()), Some(inst_ti), Some(bindings.clone()))
        .unwrap();

    let mut cache = TableCache::new();
    cache.insert(FnId(7), Some(bindings.clone()), f_bf);
    let mut import_data = ImportData::new();
    import_data.set_bytecode_cache(Box::new(cache));
    import_data.set_root_type_info(root_ti.clone());

    let mut a = Asm::new();
    a.literal(Value::ubits(8, 3));
    a.literal(Value::user_fn(f.clone()));
    a.call(InvocationData {
        invocation: InvocationId(3),
        bindings: Some(bindings.clone()),
    });
    let caller = a.build(None, Some(root_ti), None).unwrap();
    assert_eq!(
        interpret(&import_data, &caller, vec![]),
        Ok(Value::ubits(8, 3))
    );

    // Without the instantiation registered, the call is an internal error.
    let bare_ti = Rc::new(TypeInfo::new(ModuleId(0)));
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 3));
    a.literal(Value::user_fn(f));
    a.call(InvocationData {
        invocation: InvocationId(9),
        bindings: Some(bindings),
    });
    let caller = a.build(None, Some(bare_ti), None).unwrap();
    let err = interpret(&import_data, &caller, vec![]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[test]
fn cross_module_call_uses_callee_root_type_info() {
    let g = Rc::new(FnDecl {
        id: FnId(1),
        module: ModuleId(1),
        name: String::from("other_mod_id"),
        param_count: 1,
        parametric: false,
    });
    let callee_root = Rc::new(TypeInfo::new(ModuleId(1)));
    let mut body = Asm::new();
    body.load(SlotIndex(0));
    let g_bf = body
        .build(Some(g.clone()), Some(callee_root.clone()), None)
        .unwrap();

    let mut cache = TableCache::new();
    cache.insert(FnId(1), None, g_bf);
    let mut import_data = ImportData::new();
    import_data.set_bytecode_cache(Box::new(cache));
    import_data.set_root_type_info(callee_root);
    let caller_root = Rc::new(TypeInfo::new(ModuleId(0)));
    import_data.set_root_type_info(caller_root.clone());

    let mut a = Asm::new();
    a.literal(Value::ubits(16, 99));
    a.literal(Value::user_fn(g));
    a.call(no_invocation());
    let caller = a.build(None, Some(caller_root), None).unwrap();
    assert_eq!(
        interpret(&import_data, &caller, vec![]),
        Ok(Value::ubits(16, 99))
    );
}

#[test]
fn shift_semantics() {
    // shl fills with zeros; shifts at or past the width produce zero.
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 0b0000_1011));
    a.literal(Value::ubits(3, 2));
    a.shl();
    assert_eq!(run(a), Ok(Value::ubits(8, 0b0010_1100)));

    // shr is arithmetic for signed subjects.
    let mut a = Asm::new();
    a.literal(Value::sbits(8, -64));
    a.literal(Value::ubits(8, 100));
    a.shr();
    assert_eq!(run(a), Ok(Value::sbits(8, -1)));
}

#[test]
fn division_semantics() {
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 47));
    a.literal(Value::ubits(8, 5));
    a.div();
    assert_eq!(run(a), Ok(Value::ubits(8, 9)));

    let mut a = Asm::new();
    a.literal(Value::sbits(8, -47));
    a.literal(Value::sbits(8, 5));
    a.div();
    assert_eq!(run(a), Ok(Value::sbits(8, -9)));

    let mut a = Asm::new();
    a.literal(Value::ubits(8, 1));
    a.literal(Value::ubits(8, 0));
    a.div();
    assert_eq!(run(a).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn comparison_signedness() {
    // u8:200 > u8:3 unsigned, but s8 interprets 200 as negative.
    let mut a = Asm::new();
    a.literal(Value::ubits(8, 200));
    a.literal(Value::ubits(8, 3));
    a.gt();
    assert_eq!(run(a), Ok(Value::bool_value(true)));

    let mut a = Asm::new();
    a.literal(Value::sbits(8, -56));
    a.literal(Value::sbits(8, 3));
    a.gt();
    assert_eq!(run(a), Ok(Value::bool_value(false)));
}

#[test]
fn concat_widths_sum() {
    let mut a = Asm::new();
    a.literal(Value::ubits(4, 0xA));
    a.literal(Value::ubits(8, 0xBC));
    a.concat();
    assert_eq!(run(a), Ok(Value::ubits(12, 0xABC)));
}

#[test]
fn logical_ops_require_booleans() {
    let mut a = Asm::new();
    a.literal(Value::bool_value(true));
    a.literal(Value::bool_value(false));
    a.logical_or();
    assert_eq!(run(a), Ok(Value::bool_value(true)));

    let mut a = Asm::new();
    a.literal(Value::ubits(8, 1));
    a.literal(Value::bool_value(true));
    a.logical_and();
    assert_eq!(run(a).unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn fail_opcode_unwinds_all_frames() {
    let f = decl(0, "always_fails", 0);
    let mut body = Asm::new();
    body.fail(vec![TraceStep::Text(String::from("nested boom"))]);
    let f_bf = body.build(Some(f.clone()), None, None).unwrap();
    let import_data = import_data_with(&[(&f, &f_bf)]);

    let mut a = Asm::new();
    a.literal(Value::user_fn(f));
    a.call(no_invocation());
    let err = run_with(&import_data, a, vec![]).unwrap_err();
    let VmError::Failure { message, .. } = err else {
        panic!("expected failure");
    };
    assert_eq!(message, "nested boom");
}
