// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The builtin function library.
//!
//! Builtins execute inline against the caller's operand stack; no frame is
//! pushed. The one exception is `map`, which synthesizes a small bytecode
//! loop at invocation time instead of unrolling N calls, and runs it in a
//! frame that owns the synthesized bytecode.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::ToString;
use alloc::vec;
use alloc::vec::Vec;

use crate::bits::Bits;
use crate::bytecode::{BytecodeFunction, Instr, InstrKind, InvocationData, SlotIndex, Span};
use crate::value::{Value, ValueError};
use crate::vm::{Frame, Interpreter, VmError};

/// A builtin function id. The set is closed; `trace` is rewritten to the
/// `trace` opcode during emission and must not reach the VM.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `(carry, sum)` tuple addition.
    AddWithCarry,
    /// AND-reduce to a boolean.
    AndReduce,
    /// Assert two values equal, failing with both rendered.
    AssertEq,
    /// Assert strictly-less-than, failing with both rendered.
    AssertLt,
    /// Fixed-width bit slice.
    BitSlice,
    /// Overlay one bit vector onto another.
    BitSliceUpdate,
    /// Count leading zeros.
    Clz,
    /// Coverage marker; a no-op returning a token.
    Cover,
    /// Count trailing zeros.
    Ctz,
    /// Pair each array element with its index.
    Enumerate,
    /// Explicit user failure.
    Fail,
    /// Gate a value to zero unless a condition holds.
    Gate,
    /// Apply a function across an array.
    Map,
    /// One-hot encode.
    OneHot,
    /// One-hot select.
    OneHotSel,
    /// OR-reduce to a boolean.
    OrReduce,
    /// Half-open range as an array.
    Range,
    /// Reverse bit order.
    Rev,
    /// Sign extension to a type value's width.
    Signex,
    /// Bit slice with the width taken from a type value.
    Slice,
    /// Trace (must be lowered to the opcode before execution).
    Trace,
    /// Replace one array element.
    Update,
    /// XOR-reduce to a boolean.
    XorReduce,
}

impl Builtin {
    /// The source-language name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AddWithCarry => "add_with_carry",
            Self::AndReduce => "and_reduce",
            Self::AssertEq => "assert_eq",
            Self::AssertLt => "assert_lt",
            Self::BitSlice => "bit_slice",
            Self::BitSliceUpdate => "bit_slice_update",
            Self::Clz => "clz",
            Self::Cover => "cover",
            Self::Ctz => "ctz",
            Self::Enumerate => "enumerate",
            Self::Fail => "fail",
            Self::Gate => "gate",
            Self::Map => "map",
            Self::OneHot => "one_hot",
            Self::OneHotSel => "one_hot_sel",
            Self::OrReduce => "or_reduce",
            Self::Range => "range",
            Self::Rev => "rev",
            Self::Signex => "signex",
            Self::Slice => "slice",
            Self::Trace => "trace",
            Self::Update => "update",
            Self::XorReduce => "xor_reduce",
        }
    }
}

/// Dispatches one builtin against the caller's stack.
pub(crate) fn run_builtin(
    interp: &mut Interpreter<'_>,
    builtin: Builtin,
    data: &InvocationData,
    span: Option<Span>,
) -> Result<(), VmError> {
    match builtin {
        Builtin::AddWithCarry => run_add_with_carry(interp),
        Builtin::AndReduce => run_reduce(interp, |b| b.and_reduce()),
        Builtin::AssertEq => run_assert_eq(interp, span),
        Builtin::AssertLt => run_assert_lt(interp, span),
        Builtin::BitSlice => run_bit_slice(interp),
        Builtin::BitSliceUpdate => run_bit_slice_update(interp),
        Builtin::Clz => run_count(interp, Bits::count_leading_zeros),
        Builtin::Cover => {
            interp.push(Value::Token);
            Ok(())
        }
        Builtin::Ctz => run_count(interp, Bits::count_trailing_zeros),
        Builtin::Enumerate => run_enumerate(interp),
        Builtin::Fail => {
            let value = interp.pop()?;
            Err(VmError::Failure {
                span,
                message: value.to_string(),
            })
        }
        Builtin::Gate => run_gate(interp),
        Builtin::Map => run_map(interp, data, span),
        Builtin::OneHot => run_one_hot(interp),
        Builtin::OneHotSel => run_one_hot_sel(interp),
        Builtin::OrReduce => run_reduce(interp, |b| b.or_reduce()),
        Builtin::Range => run_range(interp),
        Builtin::Rev => run_rev(interp),
        Builtin::Signex => run_signex(interp),
        Builtin::Slice => run_slice(interp),
        Builtin::Trace => Err(VmError::TraceNotLowered),
        Builtin::Update => run_ternary(interp, |a, i, v| a.update(i, v)),
        Builtin::XorReduce => run_reduce(interp, |b| b.xor_reduce()),
    }
}

fn run_binary(
    interp: &mut Interpreter<'_>,
    f: impl FnOnce(&Value, &Value) -> Result<Value, VmError>,
) -> Result<(), VmError> {
    let b = interp.pop()?;
    let a = interp.pop()?;
    let result = f(&a, &b)?;
    interp.push(result);
    Ok(())
}

fn run_ternary(
    interp: &mut Interpreter<'_>,
    f: impl FnOnce(&Value, &Value, &Value) -> Result<Value, ValueError>,
) -> Result<(), VmError> {
    let c = interp.pop()?;
    let b = interp.pop()?;
    let a = interp.pop()?;
    let result = f(&a, &b, &c)?;
    interp.push(result);
    Ok(())
}

fn run_reduce(interp: &mut Interpreter<'_>, f: impl FnOnce(&Bits) -> bool) -> Result<(), VmError> {
    let value = interp.pop()?;
    let result = f(value.bits().map_err(VmError::Value)?);
    interp.push(Value::bool_value(result));
    Ok(())
}

fn run_count(
    interp: &mut Interpreter<'_>,
    f: impl FnOnce(&Bits) -> usize,
) -> Result<(), VmError> {
    let value = interp.pop()?;
    let bits = value.bits().map_err(VmError::Value)?;
    let count = f(bits) as u64;
    interp.push(Value::ubits(bits.width(), count));
    Ok(())
}

fn run_add_with_carry(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    run_binary(interp, |a, b| {
        let (ab, bb) = (a.bits()?, b.bits()?);
        if ab.width() != bb.width() {
            return Err(ValueError::Bits(crate::bits::BitsError::WidthMismatch {
                lhs: ab.width(),
                rhs: bb.width(),
            })
            .into());
        }
        let w = ab.width();
        let sum = ab.zero_ext(w + 1).add(&bb.zero_ext(w + 1)).map_err(ValueError::Bits)?;
        let carry = Value::bool_value(sum.get_bit(w));
        Ok(Value::Tuple(vec![carry, Value::UBits(sum.slice(0, w))]))
    })
}

fn run_assert_eq(interp: &mut Interpreter<'_>, span: Option<Span>) -> Result<(), VmError> {
    let lhs = interp.peek(1)?.clone();
    let rhs = interp.peek(0)?.clone();
    let equal = {
        let r = interp.pop()?;
        let l = interp.pop()?;
        let equal = l == r;
        interp.push(Value::bool_value(equal));
        equal
    };
    if !equal {
        let mut message = format!("\n  lhs: {lhs}\n  rhs: {rhs}\n  were not equal");
        if let (Value::Array(l), Value::Array(r)) = (&lhs, &rhs)
            && let Some(i) = first_differing_index(l, r)
        {
            message.push_str(&format!(
                "; first differing index: {i} :: {} vs {}",
                l[i], r[i]
            ));
        }
        return Err(VmError::Failure { span, message });
    }
    Ok(())
}

fn run_assert_lt(interp: &mut Interpreter<'_>, span: Option<Span>) -> Result<(), VmError> {
    let lhs = interp.peek(1)?.clone();
    let rhs = interp.peek(0)?.clone();
    let r = interp.pop()?;
    let l = interp.pop()?;
    let ordered = l.lt(&r)?;
    let holds = ordered.is_true();
    interp.push(ordered);
    if !holds {
        return Err(VmError::Failure {
            span,
            message: format!("\n  want: {lhs} < {rhs}"),
        });
    }
    Ok(())
}

fn first_differing_index(lhs: &[Value], rhs: &[Value]) -> Option<usize> {
    lhs.iter()
        .zip(rhs.iter())
        .position(|(l, r)| l != r)
        .or_else(|| (lhs.len() != rhs.len()).then(|| lhs.len().min(rhs.len())))
}

fn run_bit_slice(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    run_ternary(interp, |subject, start, width_value| {
        let subject_bits = subject.bits()?;
        // A start past the subject reads zeros; the result width comes from
        // the *width* of the third argument.
        let start = start
            .bits()?
            .to_u64()
            .map_or(usize::MAX, |v| usize::try_from(v).unwrap_or(usize::MAX));
        let width = width_value.bits()?.width();
        Ok(Value::UBits(subject_bits.slice(start, width)))
    })
}

fn run_bit_slice_update(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    run_ternary(interp, |subject, start, update| {
        let subject_bits = subject.bits()?;
        let update_bits = update.bits()?;
        let start = start.bits()?.to_u64();
        let result = match start {
            Some(s) if (s as usize) < subject_bits.width() => {
                subject_bits.bit_slice_update(s as usize, update_bits)
            }
            // Entirely out of bounds: no subject bits are updated.
            _ => subject_bits.clone(),
        };
        Ok(Value::UBits(result))
    })
}

fn run_enumerate(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    let input = interp.pop()?;
    let elements = input.elements().map_err(VmError::Value)?;
    let pairs = elements
        .iter()
        .enumerate()
        .map(|(i, e)| Value::Tuple(vec![Value::u32_value(i as u64), e.clone()]))
        .collect();
    interp.push(Value::array(pairs)?);
    Ok(())
}

fn run_gate(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    run_binary(interp, |pass, value| {
        Ok(if pass.is_true() {
            value.clone()
        } else {
            value.zero_like()
        })
    })
}

fn run_one_hot(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    run_binary(interp, |input, lsb_priority| {
        let bits = input.bits().map_err(VmError::Value)?;
        Ok(Value::UBits(bits.one_hot(lsb_priority.is_true())))
    })
}

fn run_one_hot_sel(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    run_binary(interp, |selector, cases_array| {
        let selector_bits = selector.bits().map_err(VmError::Value)?;
        let cases = cases_array.elements().map_err(VmError::Value)?;
        let Some(first) = cases.first() else {
            return Err(VmError::OneHotSelNoCases);
        };
        let mut result = Bits::zero(first.bits().map_err(VmError::Value)?.width());
        for (i, case) in cases.iter().enumerate() {
            if !selector_bits.get_bit(i) {
                continue;
            }
            result = result
                .or(case.bits().map_err(VmError::Value)?)
                .map_err(|e| VmError::Value(e.into()))?;
        }
        Ok(if first.is_signed() {
            Value::SBits(result)
        } else {
            Value::UBits(result)
        })
    })
}

fn run_range(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    run_binary(interp, |start, limit| {
        let width = start.bits().map_err(VmError::Value)?.width();
        let one = if start.is_signed() {
            Value::sbits(width, 1)
        } else {
            Value::ubits(width, 1)
        };
        let mut elements = Vec::new();
        let mut cur = start.clone();
        while cur.lt(limit).map_err(VmError::Value)?.is_true() {
            elements.push(cur.clone());
            cur = cur.add(&one).map_err(VmError::Value)?;
        }
        Ok(Value::array(elements).map_err(VmError::Value)?)
    })
}

fn run_rev(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    let value = interp.pop()?;
    let Value::UBits(bits) = &value else {
        return Err(VmError::Value(ValueError::NotBits { tag: value.tag() }));
    };
    interp.push(Value::UBits(bits.reverse()));
    Ok(())
}

fn run_signex(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    run_binary(interp, |value, type_value| {
        let bits = value.bits().map_err(VmError::Value)?;
        let new_width = type_value.bits().map_err(VmError::Value)?.width();
        if bits.width() > new_width {
            return Err(VmError::SignexShrinks {
                from: bits.width(),
                to: new_width,
            });
        }
        let extended = bits.sign_ext(new_width);
        Ok(if value.is_signed() {
            Value::SBits(extended)
        } else {
            Value::UBits(extended)
        })
    })
}

fn run_slice(interp: &mut Interpreter<'_>) -> Result<(), VmError> {
    run_ternary(interp, |basis, start, type_value| {
        let basis_bits = basis.bits()?;
        let start = start
            .bits()?
            .to_u64()
            .map_or(usize::MAX, |v| usize::try_from(v).unwrap_or(usize::MAX));
        let width = type_value.bits()?.width();
        Ok(Value::UBits(basis_bits.slice(start, width)))
    })
}

/// Lowers `map` into a synthesized loop instead of unrolling N calls.
///
/// Slot 0 holds the input array and slot 1 the loop index; each iteration
/// indexes the array, calls the mapped function, and bumps the index until
/// it reaches the array length, then a single `create-array` collects the
/// results. The synthesized bytecode is owned by the frame that runs it.
fn run_map(
    interp: &mut Interpreter<'_>,
    data: &InvocationData,
    span: Option<Span>,
) -> Result<(), VmError> {
    let callee = interp.pop()?;
    callee.function().map_err(VmError::Value)?;
    let inputs = interp.pop()?;
    let len = inputs.elements().map_err(VmError::Value)?.len();

    let at = |kind: InstrKind| match span {
        Some(s) => Instr::with_span(kind, s),
        None => Instr::new(kind),
    };

    let mut instrs = Vec::with_capacity(17);
    // Initialize the loop index.
    instrs.push(at(InstrKind::Literal(Value::u32_value(0))));
    instrs.push(at(InstrKind::Store(SlotIndex(1))));
    // Top-of-loop marker.
    let top_of_loop = instrs.len() as i32;
    instrs.push(at(InstrKind::JumpDest));
    // Element N, then the callee, then the call.
    instrs.push(at(InstrKind::Load(SlotIndex(0))));
    instrs.push(at(InstrKind::Load(SlotIndex(1))));
    instrs.push(at(InstrKind::Index));
    instrs.push(at(InstrKind::Literal(callee)));
    instrs.push(at(InstrKind::Call(data.clone())));
    // Increment the index.
    instrs.push(at(InstrKind::Load(SlotIndex(1))));
    instrs.push(at(InstrKind::Literal(Value::u32_value(1))));
    instrs.push(at(InstrKind::Add));
    instrs.push(at(InstrKind::Store(SlotIndex(1))));
    // index < len?
    instrs.push(at(InstrKind::Load(SlotIndex(1))));
    instrs.push(at(InstrKind::Literal(Value::u32_value(len as u64))));
    instrs.push(at(InstrKind::Lt));
    // Back to the top while true, then collect the results.
    let jump_at = instrs.len() as i32;
    instrs.push(at(InstrKind::JumpRelIf(top_of_loop - jump_at)));
    instrs.push(at(InstrKind::CreateArray(len)));

    let type_info = interp.cur_frame()?.type_info.clone();
    let bf = Rc::new(BytecodeFunction::new(
        None,
        type_info,
        data.bindings.clone(),
        instrs,
    ));
    let mut frame = Frame::new(bf, vec![inputs]);
    frame.bindings = data.bindings.clone();
    interp.push_frame(frame)?;
    Ok(())
}
