// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bytecode representation.
//!
//! A compiled function is an immutable, ordered instruction sequence plus
//! the identity of its owner, the type-info table indexing its embedded
//! invocations, and (for parametric callers) the bindings active at compile
//! time. Each instruction carries at most one strongly-kinded payload; the
//! payload kind is fixed by the opcode.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::opcode::Opcode;
use crate::program::{FnDecl, InvocationId, SymBindings, TypeDesc, TypeInfo};
use crate::value::{FormatPreference, Value};

/// A numbered storage location inside a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotIndex(pub u32);

impl SlotIndex {
    /// The slot number as a vector index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A source span, byte offsets into the source text. Diagnostics only; the
/// VM never branches on spans.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: u32,
    /// Limit byte offset (exclusive).
    pub limit: u32,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}..{}", self.start, self.limit)
    }
}

/// One step of a trace/fail template: a literal fragment or a marker that
/// consumes one stack value with a format preference.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceStep {
    /// Literal text.
    Text(String),
    /// Interpolate one popped value.
    Value(FormatPreference),
}

/// Invocation-site data attached to `call` opcodes: which invocation this
/// is, plus the caller's bindings at emission time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationData {
    /// Invocation site identity.
    pub invocation: InvocationId,
    /// Caller bindings, present for parametric call chains.
    pub bindings: Option<SymBindings>,
}

/// One sub-pattern of a `match-arm` payload.
#[derive(Clone, Debug, PartialEq)]
pub enum MatchArmItem {
    /// Compare the scrutinee against a literal by value equality.
    Literal(Value),
    /// Compare against the value already bound in a slot.
    Load(SlotIndex),
    /// Bind the scrutinee into a slot; always matches.
    Store(SlotIndex),
    /// Always matches, binds nothing.
    Wildcard,
    /// Recurse element-wise over a tuple scrutinee.
    Tuple(Vec<MatchArmItem>),
}

/// An instruction payload, keyed by opcode kind.
#[derive(Clone, Debug, PartialEq)]
pub enum InstrKind {
    /// `add`
    Add,
    /// `and`
    And,
    /// `call` with its invocation descriptor.
    Call(InvocationData),
    /// `cast` to an attached concrete type.
    Cast(TypeDesc),
    /// `concat`
    Concat,
    /// `create-array` of N elements.
    CreateArray(usize),
    /// `create-tuple` of N elements.
    CreateTuple(usize),
    /// `div`
    Div,
    /// `dup`
    Dup,
    /// `eq`
    Eq,
    /// `expand-tuple`
    ExpandTuple,
    /// `fail` with its message template.
    Fail(Vec<TraceStep>),
    /// `ge`
    Ge,
    /// `gt`
    Gt,
    /// `index`
    Index,
    /// `invert`
    Invert,
    /// `jump-dest`
    JumpDest,
    /// `jump-rel` by a signed offset from this instruction.
    JumpRel(i32),
    /// `jump-rel-if` by a signed offset from this instruction.
    JumpRelIf(i32),
    /// `le`
    Le,
    /// `load` from a slot.
    Load(SlotIndex),
    /// `literal` pushing an embedded value.
    Literal(Value),
    /// `logical-and`
    LogicalAnd,
    /// `logical-or`
    LogicalOr,
    /// `lt`
    Lt,
    /// `match-arm` with its pattern.
    MatchArm(MatchArmItem),
    /// `mul`
    Mul,
    /// `ne`
    Ne,
    /// `negate`
    Negate,
    /// `or`
    Or,
    /// `pop`
    Pop,
    /// `recv`
    Recv,
    /// `send`
    Send,
    /// `shl`
    Shl,
    /// `shr`
    Shr,
    /// `slice`
    Slice,
    /// `store` to a slot.
    Store(SlotIndex),
    /// `sub`
    Sub,
    /// `swap`
    Swap,
    /// `trace` with its message template.
    Trace(Vec<TraceStep>),
    /// `width-slice` with the attached result type.
    WidthSlice(TypeDesc),
    /// `xor`
    Xor,
}

impl InstrKind {
    /// The opcode tag of this instruction.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Add => Opcode::Add,
            Self::And => Opcode::And,
            Self::Call(_) => Opcode::Call,
            Self::Cast(_) => Opcode::Cast,
            Self::Concat => Opcode::Concat,
            Self::CreateArray(_) => Opcode::CreateArray,
            Self::CreateTuple(_) => Opcode::CreateTuple,
            Self::Div => Opcode::Div,
            Self::Dup => Opcode::Dup,
            Self::Eq => Opcode::Eq,
            Self::ExpandTuple => Opcode::ExpandTuple,
            Self::Fail(_) => Opcode::Fail,
            Self::Ge => Opcode::Ge,
            Self::Gt => Opcode::Gt,
            Self::Index => Opcode::Index,
            Self::Invert => Opcode::Invert,
            Self::JumpDest => Opcode::JumpDest,
            Self::JumpRel(_) => Opcode::JumpRel,
            Self::JumpRelIf(_) => Opcode::JumpRelIf,
            Self::Le => Opcode::Le,
            Self::Load(_) => Opcode::Load,
            Self::Literal(_) => Opcode::Literal,
            Self::LogicalAnd => Opcode::LogicalAnd,
            Self::LogicalOr => Opcode::LogicalOr,
            Self::Lt => Opcode::Lt,
            Self::MatchArm(_) => Opcode::MatchArm,
            Self::Mul => Opcode::Mul,
            Self::Ne => Opcode::Ne,
            Self::Negate => Opcode::Negate,
            Self::Or => Opcode::Or,
            Self::Pop => Opcode::Pop,
            Self::Recv => Opcode::Recv,
            Self::Send => Opcode::Send,
            Self::Shl => Opcode::Shl,
            Self::Shr => Opcode::Shr,
            Self::Slice => Opcode::Slice,
            Self::Store(_) => Opcode::Store,
            Self::Sub => Opcode::Sub,
            Self::Swap => Opcode::Swap,
            Self::Trace(_) => Opcode::Trace,
            Self::WidthSlice(_) => Opcode::WidthSlice,
            Self::Xor => Opcode::Xor,
        }
    }
}

/// One instruction: an opcode-with-payload plus an optional source span.
#[derive(Clone, Debug, PartialEq)]
pub struct Instr {
    /// Opcode and payload.
    pub kind: InstrKind,
    /// Source span for diagnostics.
    pub span: Option<Span>,
}

impl Instr {
    /// An instruction with no span.
    #[must_use]
    pub fn new(kind: InstrKind) -> Self {
        Self { kind, span: None }
    }

    /// An instruction carrying a source span.
    #[must_use]
    pub fn with_span(kind: InstrKind, span: Span) -> Self {
        Self {
            kind,
            span: Some(span),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.kind.opcode();
        match &self.kind {
            InstrKind::Call(data) => match &data.bindings {
                Some(b) => write!(f, "{op} i{} {b}", data.invocation.0),
                None => write!(f, "{op} i{}", data.invocation.0),
            },
            InstrKind::CreateArray(n) | InstrKind::CreateTuple(n) => write!(f, "{op} {n}"),
            InstrKind::JumpRel(off) | InstrKind::JumpRelIf(off) => {
                write!(f, "{op} {off:+}")
            }
            InstrKind::Load(slot) | InstrKind::Store(slot) => write!(f, "{op} s{}", slot.0),
            InstrKind::Literal(v) => write!(f, "{op} {v}"),
            InstrKind::Cast(ty) | InstrKind::WidthSlice(ty) => write!(f, "{op} {ty:?}"),
            InstrKind::MatchArm(_) | InstrKind::Trace(_) | InstrKind::Fail(_) => {
                write!(f, "{op} ..")
            }
            _ => write!(f, "{op}"),
        }
    }
}

/// An immutable compiled function.
#[derive(Debug)]
pub struct BytecodeFunction {
    decl: Option<Rc<FnDecl>>,
    type_info: Option<Rc<TypeInfo>>,
    bindings: Option<SymBindings>,
    instrs: Vec<Instr>,
}

impl BytecodeFunction {
    /// Wraps `instrs` as the compiled form of `decl` (or of a synthetic
    /// owner-less sequence when `decl` is `None`).
    #[must_use]
    pub fn new(
        decl: Option<Rc<FnDecl>>,
        type_info: Option<Rc<TypeInfo>>,
        bindings: Option<SymBindings>,
        instrs: Vec<Instr>,
    ) -> Self {
        Self {
            decl,
            type_info,
            bindings,
            instrs,
        }
    }

    /// The owning function declaration, if any.
    #[must_use]
    pub fn decl(&self) -> Option<&Rc<FnDecl>> {
        self.decl.as_ref()
    }

    /// The type-info table indexing this function's invocations.
    #[must_use]
    pub fn type_info(&self) -> Option<&Rc<TypeInfo>> {
        self.type_info.as_ref()
    }

    /// Bindings active when this function was compiled.
    #[must_use]
    pub fn bindings(&self) -> Option<&SymBindings> {
        self.bindings.as_ref()
    }

    /// The instruction sequence.
    #[must_use]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }
}
