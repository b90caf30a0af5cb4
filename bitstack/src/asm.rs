// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Instruction builder ("assembler").
//!
//! A small, public helper for constructing instruction sequences without
//! hand-computing relative jump offsets. Labels bind to `jump-dest`
//! instructions; `finish` resolves every jump against its label.
//!
//! The real front-end emitter is an external collaborator; this builder
//! exists for tests and embedders that assemble bytecode directly.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use crate::bytecode::{
    BytecodeFunction, Instr, InstrKind, InvocationData, MatchArmItem, SlotIndex, Span, TraceStep,
};
use crate::program::{FnDecl, SymBindings, TypeDesc, TypeInfo};
use crate::value::Value;

/// A control-flow label.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label(usize);

/// A builder error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsmError {
    /// A jump referenced a label that was never bound.
    UnresolvedLabel {
        /// The unbound label id.
        label: usize,
    },
    /// A resolved jump offset did not fit the instruction encoding.
    OffsetOverflow,
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedLabel { label } => {
                write!(f, "label {label} was referenced but never bound")
            }
            Self::OffsetOverflow => write!(f, "jump offset does not fit"),
        }
    }
}

impl core::error::Error for AsmError {}

/// An instruction-sequence builder with label-resolved jumps.
#[derive(Default)]
pub struct Asm {
    instrs: Vec<Instr>,
    span: Option<Span>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

impl Asm {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the span attached to subsequently pushed instructions.
    pub fn set_span(&mut self, span: Option<Span>) {
        self.span = span;
    }

    /// Pushes a raw instruction (the current span is *not* applied).
    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    fn emit(&mut self, kind: InstrKind) {
        let instr = match self.span {
            Some(span) => Instr::with_span(kind, span),
            None => Instr::new(kind),
        };
        self.instrs.push(instr);
    }

    /// Allocates a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` here by emitting its `jump-dest`.
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.instrs.len());
        self.emit(InstrKind::JumpDest);
    }

    /// Emits an unconditional jump to `label`.
    pub fn jump(&mut self, label: Label) {
        self.fixups.push((self.instrs.len(), label));
        self.emit(InstrKind::JumpRel(0));
    }

    /// Emits a conditional jump to `label`, taken when the popped value is
    /// true.
    pub fn jump_if(&mut self, label: Label) {
        self.fixups.push((self.instrs.len(), label));
        self.emit(InstrKind::JumpRelIf(0));
    }

    /// Resolves all jumps and returns the finished sequence.
    pub fn finish(mut self) -> Result<Vec<Instr>, AsmError> {
        for (at, label) in &self.fixups {
            let target = self.labels[label.0].ok_or(AsmError::UnresolvedLabel {
                label: label.0,
            })?;
            let offset = i32::try_from(target as i64 - *at as i64)
                .map_err(|_| AsmError::OffsetOverflow)?;
            match &mut self.instrs[*at].kind {
                InstrKind::JumpRel(o) | InstrKind::JumpRelIf(o) => *o = offset,
                _ => unreachable!("fixups only target jumps"),
            }
        }
        Ok(self.instrs)
    }

    /// Like [`Asm::finish`], wrapping the sequence into a compiled function.
    pub fn build(
        self,
        decl: Option<Rc<FnDecl>>,
        type_info: Option<Rc<TypeInfo>>,
        bindings: Option<SymBindings>,
    ) -> Result<Rc<BytecodeFunction>, AsmError> {
        let instrs = self.finish()?;
        Ok(Rc::new(BytecodeFunction::new(
            decl, type_info, bindings, instrs,
        )))
    }

    /// `literal`
    pub fn literal(&mut self, value: Value) {
        self.emit(InstrKind::Literal(value));
    }

    /// `load`
    pub fn load(&mut self, slot: SlotIndex) {
        self.emit(InstrKind::Load(slot));
    }

    /// `store`
    pub fn store(&mut self, slot: SlotIndex) {
        self.emit(InstrKind::Store(slot));
    }

    /// `call`
    pub fn call(&mut self, data: InvocationData) {
        self.emit(InstrKind::Call(data));
    }

    /// `cast`
    pub fn cast(&mut self, to: TypeDesc) {
        self.emit(InstrKind::Cast(to));
    }

    /// `width-slice`
    pub fn width_slice(&mut self, to: TypeDesc) {
        self.emit(InstrKind::WidthSlice(to));
    }

    /// `create-array`
    pub fn create_array(&mut self, n: usize) {
        self.emit(InstrKind::CreateArray(n));
    }

    /// `create-tuple`
    pub fn create_tuple(&mut self, n: usize) {
        self.emit(InstrKind::CreateTuple(n));
    }

    /// `match-arm`
    pub fn match_arm(&mut self, item: MatchArmItem) {
        self.emit(InstrKind::MatchArm(item));
    }

    /// `trace`
    pub fn trace(&mut self, steps: Vec<TraceStep>) {
        self.emit(InstrKind::Trace(steps));
    }

    /// `fail`
    pub fn fail(&mut self, steps: Vec<TraceStep>) {
        self.emit(InstrKind::Fail(steps));
    }

    /// `add`
    pub fn add(&mut self) {
        self.emit(InstrKind::Add);
    }

    /// `and`
    pub fn and(&mut self) {
        self.emit(InstrKind::And);
    }

    /// `concat`
    pub fn concat(&mut self) {
        self.emit(InstrKind::Concat);
    }

    /// `div`
    pub fn div(&mut self) {
        self.emit(InstrKind::Div);
    }

    /// `dup`
    pub fn dup(&mut self) {
        self.emit(InstrKind::Dup);
    }

    /// `eq`
    pub fn eq(&mut self) {
        self.emit(InstrKind::Eq);
    }

    /// `expand-tuple`
    pub fn expand_tuple(&mut self) {
        self.emit(InstrKind::ExpandTuple);
    }

    /// `ge`
    pub fn ge(&mut self) {
        self.emit(InstrKind::Ge);
    }

    /// `gt`
    pub fn gt(&mut self) {
        self.emit(InstrKind::Gt);
    }

    /// `index`
    pub fn index(&mut self) {
        self.emit(InstrKind::Index);
    }

    /// `invert`
    pub fn invert(&mut self) {
        self.emit(InstrKind::Invert);
    }

    /// `le`
    pub fn le(&mut self) {
        self.emit(InstrKind::Le);
    }

    /// `logical-and`
    pub fn logical_and(&mut self) {
        self.emit(InstrKind::LogicalAnd);
    }

    /// `logical-or`
    pub fn logical_or(&mut self) {
        self.emit(InstrKind::LogicalOr);
    }

    /// `lt`
    pub fn lt(&mut self) {
        self.emit(InstrKind::Lt);
    }

    /// `mul`
    pub fn mul(&mut self) {
        self.emit(InstrKind::Mul);
    }

    /// `ne`
    pub fn ne(&mut self) {
        self.emit(InstrKind::Ne);
    }

    /// `negate`
    pub fn negate(&mut self) {
        self.emit(InstrKind::Negate);
    }

    /// `or`
    pub fn or(&mut self) {
        self.emit(InstrKind::Or);
    }

    /// `pop`
    pub fn pop(&mut self) {
        self.emit(InstrKind::Pop);
    }

    /// `recv`
    pub fn recv(&mut self) {
        self.emit(InstrKind::Recv);
    }

    /// `send`
    pub fn send(&mut self) {
        self.emit(InstrKind::Send);
    }

    /// `shl`
    pub fn shl(&mut self) {
        self.emit(InstrKind::Shl);
    }

    /// `shr`
    pub fn shr(&mut self) {
        self.emit(InstrKind::Shr);
    }

    /// `slice`
    pub fn slice(&mut self) {
        self.emit(InstrKind::Slice);
    }

    /// `sub`
    pub fn sub(&mut self) {
        self.emit(InstrKind::Sub);
    }

    /// `swap`
    pub fn swap(&mut self) {
        self.emit(InstrKind::Swap);
    }

    /// `xor`
    pub fn xor(&mut self) {
        self.emit(InstrKind::Xor);
    }
}
