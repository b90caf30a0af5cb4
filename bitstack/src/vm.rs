// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The interpreter: frame stack, shared operand stack, and dispatch loop.
//!
//! The loop runs until the frame stack is empty. Every opcode checks its
//! stack-depth precondition by popping through [`Interpreter::pop`];
//! violations are fatal. Errors are never caught here: the first error
//! unwinds all frames and is returned to the embedder. Only
//! [`ErrorKind::Unavailable`] is expected to be recoverable (a process that
//! must be rescheduled).

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use crate::builtins::{self, Builtin};
use crate::bytecode::{
    BytecodeFunction, Instr, InstrKind, InvocationData, MatchArmItem, SlotIndex, Span, TraceStep,
};
use crate::program::{
    CacheError, FnDecl, ImportData, ModuleId, SymBindings, TypeDesc, TypeInfo,
};
use crate::trace::{ChannelOp, TraceMask, TraceSink};
use crate::value::{FnRef, Value, ValueError};

/// Execution limits for one run.
#[derive(Clone, Debug)]
pub struct Limits {
    /// Instruction budget; each executed opcode costs 1.
    pub fuel: u64,
    /// Maximum frame-stack depth.
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            fuel: 100_000_000,
            max_call_depth: 256,
        }
    }
}

/// The outcome classification of a [`VmError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Ill-typed operands, bad payload use, incompatible cast.
    InvalidArgument,
    /// Interpreter invariant violation (bad bytecode or embedding data).
    Internal,
    /// User-visible assertion failure or explicit `fail!`.
    Failure,
    /// `recv` on an empty channel; the process must be rescheduled.
    Unavailable,
    /// A builtin in the set that is not handled.
    Unimplemented,
}

/// An interpreter error.
#[derive(Clone, Debug, PartialEq)]
pub enum VmError {
    /// A value-domain operation failed.
    Value(ValueError),
    /// An opcode popped past the operand stack depth.
    StackUnderflow,
    /// The frame stack was empty where a frame was required.
    FrameUnderflow,
    /// A jump targeted an instruction that is not a `jump-dest`.
    JumpWithoutDest {
        /// Jump instruction index.
        from: usize,
        /// Target instruction index.
        to: usize,
    },
    /// A `load` or match-arm slot was out of range.
    SlotOutOfRange {
        /// Requested slot.
        slot: u32,
        /// Slot count in the frame.
        len: usize,
    },
    /// A user-function call was made with no bytecode cache attached.
    MissingBytecodeCache,
    /// No instantiation type-info was registered for an invocation.
    MissingInstantiation {
        /// Invocation site.
        invocation: u32,
    },
    /// No root type-info was registered for a module.
    MissingRootTypeInfo {
        /// Module.
        module: ModuleId,
    },
    /// The bytecode cache failed to produce a callee.
    Cache(CacheError),
    /// A match-arm tuple pattern disagreed with the scrutinee arity.
    MatchArmArityMismatch {
        /// Pattern element count.
        pattern: usize,
        /// Scrutinee element count.
        scrutinee: usize,
    },
    /// A dynamic slice resolved to a negative length.
    SliceBounds {
        /// Resolved start.
        start: i64,
        /// Resolved limit.
        limit: i64,
    },
    /// A `width-slice` opcode carried a non-bits type descriptor.
    WidthSliceType,
    /// `signex` targeted a narrower width than the source.
    SignexShrinks {
        /// Source width.
        from: usize,
        /// Target width.
        to: usize,
    },
    /// `one-hot-sel` was given zero cases.
    OneHotSelNoCases,
    /// The `trace` builtin reached the VM without being lowered to the
    /// `trace` opcode.
    TraceNotLowered,
    /// User-visible failure with a rendered message.
    Failure {
        /// Source span of the failing opcode.
        span: Option<Span>,
        /// Rendered message.
        message: String,
    },
    /// `recv` on an empty channel.
    ChannelEmpty,
    /// A builtin in the closed set with no handler.
    UnimplementedBuiltin(Builtin),
    /// The instruction budget ran out.
    FuelExceeded,
    /// The frame-stack depth limit was hit.
    CallDepthExceeded,
}

impl VmError {
    /// Classifies this error into the closed outcome taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Value(_) => ErrorKind::InvalidArgument,
            Self::Failure { .. } => ErrorKind::Failure,
            Self::ChannelEmpty => ErrorKind::Unavailable,
            Self::UnimplementedBuiltin(_) => ErrorKind::Unimplemented,
            _ => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(e) => write!(f, "{e}"),
            Self::StackUnderflow => write!(f, "popped past the operand stack depth"),
            Self::FrameUnderflow => write!(f, "no active frame"),
            Self::JumpWithoutDest { from, to } => {
                write!(f, "jump from {from} to {to}, which is not a jump_dest")
            }
            Self::SlotOutOfRange { slot, len } => {
                write!(f, "slot s{slot} out of range for {len} slots")
            }
            Self::MissingBytecodeCache => write!(f, "bytecode cache is not attached"),
            Self::MissingInstantiation { invocation } => {
                write!(f, "no instantiation type-info for invocation i{invocation}")
            }
            Self::MissingRootTypeInfo { module } => {
                write!(f, "no root type-info for module {}", module.0)
            }
            Self::Cache(e) => write!(f, "{e}"),
            Self::MatchArmArityMismatch { pattern, scrutinee } => write!(
                f,
                "match arm pattern has {pattern} elements, scrutinee has {scrutinee}"
            ),
            Self::SliceBounds { start, limit } => {
                write!(f, "slice bounds resolved to {start}..{limit}")
            }
            Self::WidthSliceType => write!(f, "width_slice requires a bits type payload"),
            Self::SignexShrinks { from, to } => {
                write!(f, "signex target width {to} is narrower than source {from}")
            }
            Self::OneHotSelNoCases => write!(f, "one_hot_sel requires at least one case"),
            Self::TraceNotLowered => {
                write!(f, "trace builtin must be lowered to the trace opcode")
            }
            Self::Failure { span, message } => match span {
                Some(span) => write!(f, "failure {span}: {message}"),
                None => write!(f, "failure: {message}"),
            },
            Self::ChannelEmpty => write!(f, "channel is empty"),
            Self::UnimplementedBuiltin(b) => write!(f, "builtin `{}` not handled", b.name()),
            Self::FuelExceeded => write!(f, "instruction budget exceeded"),
            Self::CallDepthExceeded => write!(f, "call depth limit exceeded"),
        }
    }
}

impl core::error::Error for VmError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Value(e) => Some(e),
            Self::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ValueError> for VmError {
    fn from(e: ValueError) -> Self {
        Self::Value(e)
    }
}

impl From<CacheError> for VmError {
    fn from(e: CacheError) -> Self {
        Self::Cache(e)
    }
}

/// One activation record.
pub(crate) struct Frame {
    pub(crate) pc: usize,
    pub(crate) slots: Vec<Value>,
    pub(crate) bf: Rc<BytecodeFunction>,
    pub(crate) type_info: Option<Rc<TypeInfo>>,
    pub(crate) bindings: Option<SymBindings>,
}

impl Frame {
    pub(crate) fn new(bf: Rc<BytecodeFunction>, args: Vec<Value>) -> Self {
        let type_info = bf.type_info().cloned();
        let bindings = bf.bindings().cloned();
        Self {
            pc: 0,
            slots: args,
            bf,
            type_info,
            bindings,
        }
    }

    /// Stores into a slot, growing the slot vector with token fill so any
    /// previously untouched slot reads as the token value.
    pub(crate) fn store_slot(&mut self, slot: SlotIndex, value: Value) {
        if self.slots.len() <= slot.index() {
            self.slots.resize(slot.index() + 1, Value::Token);
        }
        self.slots[slot.index()] = value;
    }
}

enum Flow {
    Next,
    Jump,
    Call,
}

/// The VM: a frame stack plus the shared operand stack.
pub struct Interpreter<'a> {
    import_data: &'a ImportData,
    limits: Limits,
    fuel: u64,
    stack: Vec<Value>,
    frames: Vec<Frame>,
}

/// Runs `bf` to completion with `args` in slots `0..N` and returns the
/// single value left on the operand stack.
///
/// This is the embedding API; construct an [`Interpreter`] directly to set
/// [`Limits`] or attach a [`TraceSink`].
pub fn interpret(
    import_data: &ImportData,
    bf: &Rc<BytecodeFunction>,
    args: Vec<Value>,
) -> Result<Value, VmError> {
    Interpreter::new(import_data, Limits::default()).run(bf, args)
}

impl<'a> Interpreter<'a> {
    /// A fresh interpreter over `import_data`.
    #[must_use]
    pub fn new(import_data: &'a ImportData, limits: Limits) -> Self {
        let fuel = limits.fuel;
        Self {
            import_data,
            limits,
            fuel,
            stack: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Runs `bf` to completion and returns the top of the operand stack.
    pub fn run(&mut self, bf: &Rc<BytecodeFunction>, args: Vec<Value>) -> Result<Value, VmError> {
        self.run_traced(bf, args, None)
    }

    /// Like [`Interpreter::run`], delivering events to `sink`.
    pub fn run_traced(
        &mut self,
        bf: &Rc<BytecodeFunction>,
        args: Vec<Value>,
        mut sink: Option<&mut dyn TraceSink>,
    ) -> Result<Value, VmError> {
        let mask = sink.as_ref().map_or(TraceMask::NONE, |s| s.mask());
        self.stack.clear();
        self.frames.clear();
        self.fuel = self.limits.fuel;
        let arg_count = args.len();
        self.frames.push(Frame::new(bf.clone(), args));

        if mask.contains(TraceMask::RUN)
            && let Some(s) = sink.as_mut()
        {
            s.run_start(arg_count);
        }

        let result = self.run_loop(mask, &mut sink);

        if mask.contains(TraceMask::RUN)
            && let Some(s) = sink.as_mut()
        {
            s.run_end(result.is_ok());
        }

        result?;
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Operand-stack depth; zero after a run that consumed its result.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    fn run_loop(
        &mut self,
        mask: TraceMask,
        sink: &mut Option<&mut dyn TraceSink>,
    ) -> Result<(), VmError> {
        while let Some(frame) = self.frames.last() {
            let bf = frame.bf.clone();
            let pc = frame.pc;

            if pc >= bf.instrs().len() {
                // End of a function; the callee's result stays on the stack.
                self.frames.pop();
                if mask.contains(TraceMask::CALL)
                    && let Some(s) = sink.as_mut()
                {
                    s.frame_exit(self.frames.len() + 1);
                }
                continue;
            }

            if self.fuel == 0 {
                return Err(VmError::FuelExceeded);
            }
            self.fuel -= 1;

            let instr = &bf.instrs()[pc];
            if mask.contains(TraceMask::INSTR)
                && let Some(s) = sink.as_mut()
            {
                s.instr(self.frames.len(), pc, instr.kind.opcode());
            }

            match self.eval_instr(instr, pc, mask, sink)? {
                Flow::Next => {
                    self.cur_frame_mut()?.pc = pc + 1;
                }
                Flow::Jump => {
                    let to = self.cur_frame_mut()?.pc;
                    let target_is_dest = bf
                        .instrs()
                        .get(to)
                        .is_some_and(|i| matches!(i.kind, InstrKind::JumpDest));
                    if !target_is_dest {
                        return Err(VmError::JumpWithoutDest { from: pc, to });
                    }
                }
                Flow::Call => {}
            }
        }
        Ok(())
    }

    fn eval_instr(
        &mut self,
        instr: &Instr,
        pc: usize,
        mask: TraceMask,
        sink: &mut Option<&mut dyn TraceSink>,
    ) -> Result<Flow, VmError> {
        match &instr.kind {
            InstrKind::Add => self.eval_binop(Value::add)?,
            InstrKind::And => self.eval_binop(Value::bitwise_and)?,
            InstrKind::Call(data) => {
                self.eval_call(data, instr, mask, sink)?;
                return Ok(Flow::Call);
            }
            InstrKind::Cast(to) => {
                let from = self.pop()?;
                let result = from.cast(to)?;
                self.stack.push(result);
            }
            InstrKind::Concat => self.eval_binop(Value::concat)?,
            InstrKind::CreateArray(n) => {
                let elements = self.pop_reversed(*n)?;
                self.stack.push(Value::array(elements)?);
            }
            InstrKind::CreateTuple(n) => {
                let elements = self.pop_reversed(*n)?;
                self.stack.push(Value::Tuple(elements));
            }
            InstrKind::Div => self.eval_binop(Value::floor_div)?,
            InstrKind::Dup => {
                let top = self.stack.last().ok_or(VmError::StackUnderflow)?.clone();
                self.stack.push(top);
            }
            InstrKind::Eq => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                self.stack.push(Value::bool_value(lhs == rhs));
            }
            InstrKind::ExpandTuple => {
                let elements = match self.pop()? {
                    Value::Tuple(elements) => elements,
                    other => {
                        return Err(VmError::Failure {
                            span: instr.span,
                            message: format!(
                                "stack top for expand_tuple was not a tuple, was: {}",
                                other.tag()
                            ),
                        });
                    }
                };
                // Destructure in reverse so element 0 ends up on top.
                for element in elements.into_iter().rev() {
                    self.stack.push(element);
                }
            }
            InstrKind::Fail(steps) => {
                let message = self.render_template(steps)?;
                return Err(VmError::Failure {
                    span: instr.span,
                    message,
                });
            }
            InstrKind::Ge => self.eval_binop(Value::ge)?,
            InstrKind::Gt => self.eval_binop(Value::gt)?,
            InstrKind::Index => {
                let index = self.pop()?;
                let basis = self.pop()?;
                let result = basis.index(&index)?;
                self.stack.push(result);
            }
            InstrKind::Invert => {
                let operand = self.pop()?;
                self.stack.push(operand.invert()?);
            }
            InstrKind::JumpDest => {}
            InstrKind::JumpRel(offset) => {
                self.jump_to(pc, *offset)?;
                return Ok(Flow::Jump);
            }
            InstrKind::JumpRelIf(offset) => {
                let top = self.pop()?;
                if top.is_true() {
                    self.jump_to(pc, *offset)?;
                    return Ok(Flow::Jump);
                }
            }
            InstrKind::Le => self.eval_binop(Value::le)?,
            InstrKind::Load(slot) => {
                let frame = self.cur_frame()?;
                let value = frame
                    .slots
                    .get(slot.index())
                    .ok_or(VmError::SlotOutOfRange {
                        slot: slot.0,
                        len: frame.slots.len(),
                    })?
                    .clone();
                self.stack.push(value);
            }
            InstrKind::Literal(value) => self.stack.push(value.clone()),
            InstrKind::LogicalAnd => self.eval_logical(Value::bitwise_and)?,
            InstrKind::LogicalOr => self.eval_logical(Value::bitwise_or)?,
            InstrKind::Lt => self.eval_binop(Value::lt)?,
            InstrKind::MatchArm(item) => {
                let scrutinee = self.pop()?;
                let matched = self.match_arm_item(item, &scrutinee)?;
                self.stack.push(Value::bool_value(matched));
            }
            InstrKind::Mul => self.eval_binop(Value::mul)?,
            InstrKind::Ne => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                self.stack.push(Value::bool_value(lhs != rhs));
            }
            InstrKind::Negate => {
                let operand = self.pop()?;
                self.stack.push(operand.negate()?);
            }
            InstrKind::Or => self.eval_binop(Value::bitwise_or)?,
            InstrKind::Pop => {
                self.pop()?;
            }
            InstrKind::Recv => {
                let channel = self.pop()?;
                let channel = channel.channel()?;
                let value = channel.recv().ok_or(VmError::ChannelEmpty)?;
                self.stack.push(value);
                if mask.contains(TraceMask::CHANNEL)
                    && let Some(s) = sink.as_mut()
                {
                    s.channel_op(ChannelOp::Recv);
                }
            }
            InstrKind::Send => {
                let payload = self.pop()?;
                let channel = self.pop()?;
                channel.channel()?.send(payload);
                if mask.contains(TraceMask::CHANNEL)
                    && let Some(s) = sink.as_mut()
                {
                    s.channel_op(ChannelOp::Send);
                }
            }
            InstrKind::Shl => self.eval_binop(Value::shl)?,
            InstrKind::Shr => self.eval_binop(Value::shr)?,
            InstrKind::Slice => self.eval_slice()?,
            InstrKind::Store(slot) => {
                let value = self.pop()?;
                self.cur_frame_mut()?.store_slot(*slot, value);
            }
            InstrKind::Sub => self.eval_binop(Value::sub)?,
            InstrKind::Swap => {
                let tos0 = self.pop()?;
                let tos1 = self.pop()?;
                self.stack.push(tos0);
                self.stack.push(tos1);
            }
            InstrKind::Trace(steps) => {
                let message = self.render_template(steps)?;
                if mask.contains(TraceMask::MESSAGES)
                    && let Some(s) = sink.as_mut()
                {
                    s.trace_message(instr.span, &message);
                }
                self.stack.push(Value::Token);
            }
            InstrKind::WidthSlice(to) => self.eval_width_slice(to)?,
            InstrKind::Xor => self.eval_binop(Value::bitwise_xor)?,
        }
        Ok(Flow::Next)
    }

    pub(crate) fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// The value `depth` entries below the top, without popping.
    pub(crate) fn peek(&self, depth: usize) -> Result<&Value, VmError> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.stack.get(i))
            .ok_or(VmError::StackUnderflow)
    }

    fn pop_reversed(&mut self, n: usize) -> Result<Vec<Value>, VmError> {
        let mut elements = Vec::with_capacity(n);
        for _ in 0..n {
            elements.push(self.pop()?);
        }
        elements.reverse();
        Ok(elements)
    }

    pub(crate) fn cur_frame(&self) -> Result<&Frame, VmError> {
        self.frames.last().ok_or(VmError::FrameUnderflow)
    }

    pub(crate) fn cur_frame_mut(&mut self) -> Result<&mut Frame, VmError> {
        self.frames.last_mut().ok_or(VmError::FrameUnderflow)
    }

    pub(crate) fn push_frame(&mut self, frame: Frame) -> Result<(), VmError> {
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(VmError::CallDepthExceeded);
        }
        self.frames.push(frame);
        Ok(())
    }

    fn eval_binop(
        &mut self,
        op: impl Fn(&Value, &Value) -> Result<Value, ValueError>,
    ) -> Result<(), VmError> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let result = op(&lhs, &rhs)?;
        self.stack.push(result);
        Ok(())
    }

    fn eval_logical(
        &mut self,
        op: impl Fn(&Value, &Value) -> Result<Value, ValueError>,
    ) -> Result<(), VmError> {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        for operand in [&lhs, &rhs] {
            let width = operand.bits()?.width();
            if width != 1 {
                return Err(ValueError::NotBool { width }.into());
            }
        }
        let result = op(&lhs, &rhs)?;
        self.stack.push(result);
        Ok(())
    }

    fn jump_to(&mut self, pc: usize, offset: i32) -> Result<(), VmError> {
        let target = pc as i64 + i64::from(offset);
        let target = usize::try_from(target).map_err(|_| VmError::JumpWithoutDest {
            from: pc,
            to: usize::MAX,
        })?;
        self.cur_frame_mut()?.pc = target;
        Ok(())
    }

    /// Reads a slice bound per the operand's signedness, clamped far outside
    /// any realistic basis width when it does not fit an `i64`.
    fn slice_bound(value: &Value) -> Result<i64, VmError> {
        let bits = value.bits().map_err(VmError::Value)?;
        if value.is_signed() {
            Ok(bits.to_i64().unwrap_or(if bits.msb() {
                i64::MIN / 2
            } else {
                i64::MAX / 2
            }))
        } else {
            Ok(bits
                .to_u64()
                .map_or(i64::MAX / 2, |v| i64::try_from(v).unwrap_or(i64::MAX / 2)))
        }
    }

    fn eval_slice(&mut self) -> Result<(), VmError> {
        let limit = self.pop()?;
        let start = self.pop()?;
        let basis = self.pop()?;
        let width = basis.bits()?.width() as i64;

        let mut start = Self::slice_bound(&start)?;
        if start < 0 {
            start += width;
            if start < 0 {
                start = 0;
            }
        }
        let mut limit = Self::slice_bound(&limit)?;
        if limit < 0 {
            limit += width;
            if limit < 0 {
                limit = 0;
            }
        }
        if limit > width {
            limit = width;
        }
        if limit < start {
            return Err(VmError::SliceBounds { start, limit });
        }

        let bits = basis.bits()?;
        let result = bits.slice(start as usize, (limit - start) as usize);
        self.stack.push(Value::UBits(result));
        Ok(())
    }

    fn eval_width_slice(&mut self, to: &TypeDesc) -> Result<(), VmError> {
        let TypeDesc::Bits { signed, width } = to else {
            return Err(VmError::WidthSliceType);
        };
        let start = self.pop()?;
        let basis = self.pop()?;
        let basis_bits = basis.bits()?;

        // Starts past the basis width (or too wide to represent) read as an
        // all-zero basis; `Bits::slice` zero-fills past the end, which also
        // covers the implicit zero-extension of a short basis.
        let sliced = match start.bits()?.to_u64() {
            Some(s) if (s as usize) < basis_bits.width() => basis_bits.slice(s as usize, *width),
            _ => crate::bits::Bits::zero(*width),
        };
        self.stack.push(if *signed {
            Value::SBits(sliced)
        } else {
            Value::UBits(sliced)
        });
        Ok(())
    }

    fn match_arm_item(&mut self, item: &MatchArmItem, value: &Value) -> Result<bool, VmError> {
        match item {
            MatchArmItem::Literal(expected) => Ok(expected == value),
            MatchArmItem::Load(slot) => {
                let frame = self.cur_frame()?;
                let stored = frame
                    .slots
                    .get(slot.index())
                    .ok_or(VmError::SlotOutOfRange {
                        slot: slot.0,
                        len: frame.slots.len(),
                    })?;
                Ok(stored == value)
            }
            MatchArmItem::Store(slot) => {
                // Store is unconditional: it binds even when the surrounding
                // arm ultimately fails to match.
                self.cur_frame_mut()?.store_slot(*slot, value.clone());
                Ok(true)
            }
            MatchArmItem::Wildcard => Ok(true),
            MatchArmItem::Tuple(items) => {
                let elements = value.elements().map_err(VmError::Value)?;
                if items.len() != elements.len() {
                    return Err(VmError::MatchArmArityMismatch {
                        pattern: items.len(),
                        scrutinee: elements.len(),
                    });
                }
                let elements = elements.to_vec();
                for (sub, element) in items.iter().zip(elements.iter()) {
                    if !self.match_arm_item(sub, element)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Renders a trace/fail template, popping one stack value per
    /// interpolation marker (last marker pops first).
    pub(crate) fn render_template(&mut self, steps: &[TraceStep]) -> Result<String, VmError> {
        let mut pieces: Vec<String> = Vec::with_capacity(steps.len());
        for step in steps.iter().rev() {
            match step {
                TraceStep::Text(text) => pieces.push(text.clone()),
                TraceStep::Value(pref) => {
                    let value = self.pop()?;
                    pieces.push(value.format(*pref));
                }
            }
        }
        pieces.reverse();
        Ok(pieces.concat())
    }

    fn eval_call(
        &mut self,
        data: &InvocationData,
        instr: &Instr,
        mask: TraceMask,
        sink: &mut Option<&mut dyn TraceSink>,
    ) -> Result<(), VmError> {
        let callee = self.pop()?;
        let fn_ref = callee.function()?.clone();
        match fn_ref {
            FnRef::Builtin(builtin) => {
                self.cur_frame_mut()?.pc += 1;
                builtins::run_builtin(self, builtin, data, instr.span)
            }
            FnRef::User(decl) => {
                let bf = self.bytecode_for(&decl, data)?;

                // Advance to the return point before pushing, so returning
                // is purely a frame pop.
                self.cur_frame_mut()?.pc += 1;

                let n = decl.param_count;
                let mut args = vec![Value::Token; n];
                for i in 0..n {
                    args[n - 1 - i] = self.pop()?;
                }
                let mut frame = Frame::new(bf, args);
                frame.bindings = data.bindings.clone();
                self.push_frame(frame)?;

                if mask.contains(TraceMask::CALL)
                    && let Some(s) = sink.as_mut()
                {
                    let decl = self.cur_frame()?.bf.decl().cloned();
                    s.frame_enter(self.frames.len(), decl.as_ref());
                }
                Ok(())
            }
        }
    }

    /// Resolves the callee's type-info and fetches (or compiles) its
    /// bytecode through the cache.
    fn bytecode_for(
        &self,
        decl: &Rc<FnDecl>,
        data: &InvocationData,
    ) -> Result<Rc<BytecodeFunction>, VmError> {
        let frame = self.cur_frame()?;
        let mut type_info = frame.type_info.clone();

        if decl.parametric {
            let caller_bindings = data.bindings.clone().unwrap_or_default();
            let caller_ti = type_info.ok_or(VmError::MissingInstantiation {
                invocation: data.invocation.0,
            })?;
            type_info = Some(
                caller_ti
                    .instantiation(data.invocation, &caller_bindings)
                    .ok_or(VmError::MissingInstantiation {
                        invocation: data.invocation.0,
                    })?,
            );
        } else if let Some(ti) = &type_info
            && ti.module() != decl.module
        {
            // Non-parametric cross-module call: the callee runs under the
            // root type-info of its own module.
            type_info = Some(self.import_data.root_type_info(decl.module).ok_or(
                VmError::MissingRootTypeInfo {
                    module: decl.module,
                },
            )?);
        }

        let cache = self
            .import_data
            .bytecode_cache()
            .ok_or(VmError::MissingBytecodeCache)?;
        let bf = cache
            .borrow_mut()
            .get_or_create(decl, type_info.as_ref(), data.bindings.as_ref())?;
        Ok(bf)
    }
}
