// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime value model.
//!
//! [`Value`] is the closed tagged universe the VM evaluates over. Bits-typed
//! values carry their exact width as part of their identity; aggregates are
//! plain owned vectors; channels are the only values mutated through
//! aliasing. Equality on bits-typed values compares widths and bit patterns
//! only (an enum value equals its underlying bits).

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

use crate::bits::{Bits, BitsError};
use crate::builtins::Builtin;
use crate::channel::ChannelRef;
use crate::program::{EnumDef, FnDecl, TypeDesc};

/// Rendering preference for one interpolated value in a trace/fail template.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FormatPreference {
    /// Signedness-appropriate decimal.
    Default,
    /// Binary with `0b` prefix.
    Binary,
    /// Two's-complement decimal.
    SignedDecimal,
    /// Magnitude decimal.
    UnsignedDecimal,
    /// Hex with `0x` prefix.
    Hex,
}

/// The tag of a [`Value`], used in diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueTag {
    /// Unsigned bits.
    UnsignedBits,
    /// Signed (two's complement) bits.
    SignedBits,
    /// Enum over an underlying bits type.
    EnumBits,
    /// Ordered heterogeneous aggregate.
    Tuple,
    /// Ordered homogeneous aggregate.
    Array,
    /// Unit-like control value.
    Token,
    /// User or builtin function reference.
    Function,
    /// FIFO channel handle.
    Channel,
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnsignedBits => "ubits",
            Self::SignedBits => "sbits",
            Self::EnumBits => "enum",
            Self::Tuple => "tuple",
            Self::Array => "array",
            Self::Token => "token",
            Self::Function => "function",
            Self::Channel => "channel",
        };
        write!(f, "{s}")
    }
}

/// A value-domain error. These all surface as `invalid-argument` outcomes.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueError {
    /// Underlying bit-vector error (width mismatch, division by zero).
    Bits(BitsError),
    /// Operand tags disagreed for a binary op.
    TagMismatch {
        /// Left operand tag.
        lhs: ValueTag,
        /// Right operand tag.
        rhs: ValueTag,
    },
    /// A bits-typed operand was required.
    NotBits {
        /// Actual tag.
        tag: ValueTag,
    },
    /// A 1-bit boolean operand was required.
    NotBool {
        /// Actual width.
        width: usize,
    },
    /// A tuple or array operand was required.
    NotAggregate {
        /// Actual tag.
        tag: ValueTag,
    },
    /// A function operand was required.
    NotFunction {
        /// Actual tag.
        tag: ValueTag,
    },
    /// A channel operand was required.
    NotChannel {
        /// Actual tag.
        tag: ValueTag,
    },
    /// Aggregate index was out of range.
    IndexOutOfBounds {
        /// Requested index.
        index: u64,
        /// Aggregate length.
        len: usize,
    },
    /// Array elements did not share a structural shape.
    ElementShapeMismatch,
    /// Cast between incompatible shapes.
    InvalidCast {
        /// Source tag.
        from: ValueTag,
    },
    /// Cast between bits shapes whose total bit counts differ.
    CastWidthMismatch {
        /// Source total bit count.
        from: usize,
        /// Destination total bit count.
        to: usize,
    },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits(e) => write!(f, "{e}"),
            Self::TagMismatch { lhs, rhs } => {
                write!(f, "operand tag mismatch ({lhs} vs {rhs})")
            }
            Self::NotBits { tag } => write!(f, "expected a bits value, got {tag}"),
            Self::NotBool { width } => {
                write!(f, "expected a 1-bit boolean, got width {width}")
            }
            Self::NotAggregate { tag } => {
                write!(f, "expected a tuple or array, got {tag}")
            }
            Self::NotFunction { tag } => write!(f, "expected a function, got {tag}"),
            Self::NotChannel { tag } => write!(f, "expected a channel, got {tag}"),
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            Self::ElementShapeMismatch => {
                write!(f, "array elements must share one shape")
            }
            Self::InvalidCast { from } => write!(f, "cannot cast from {from}"),
            Self::CastWidthMismatch { from, to } => {
                write!(f, "cast bit counts differ ({from} vs {to})")
            }
        }
    }
}

impl core::error::Error for ValueError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Bits(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BitsError> for ValueError {
    fn from(e: BitsError) -> Self {
        Self::Bits(e)
    }
}

/// A function reference value: a user function handle or a builtin id.
#[derive(Clone, Debug)]
pub enum FnRef {
    /// A user-defined function.
    User(Rc<FnDecl>),
    /// An intrinsic.
    Builtin(Builtin),
}

/// A runtime value.
#[derive(Clone, Debug)]
pub enum Value {
    /// Unsigned bits of exact width.
    UBits(Bits),
    /// Signed (two's complement) bits of exact width.
    SBits(Bits),
    /// Enum value: underlying bits plus the enum definition.
    Enum {
        /// Enum type definition.
        def: Rc<EnumDef>,
        /// Underlying bit pattern.
        bits: Bits,
    },
    /// Ordered heterogeneous aggregate; the empty tuple is "unit".
    Tuple(Vec<Value>),
    /// Ordered homogeneous aggregate.
    Array(Vec<Value>),
    /// Unit-like result of side-effecting ops.
    Token,
    /// Function reference.
    Function(FnRef),
    /// FIFO channel handle, shared by reference.
    Channel(ChannelRef),
}

impl Value {
    /// Unsigned bits of `width` holding `value mod 2^width`.
    #[must_use]
    pub fn ubits(width: usize, value: u64) -> Self {
        Self::UBits(Bits::from_u64(width, value))
    }

    /// Signed bits of `width` holding the two's-complement pattern of `value`.
    #[must_use]
    pub fn sbits(width: usize, value: i64) -> Self {
        Self::SBits(Bits::from_i64(width, value))
    }

    /// A 1-bit boolean.
    #[must_use]
    pub fn bool_value(value: bool) -> Self {
        Self::ubits(1, u64::from(value))
    }

    /// A `u32`-shaped unsigned value.
    #[must_use]
    pub fn u32_value(value: u64) -> Self {
        Self::ubits(32, value)
    }

    /// An enum value over `def`.
    #[must_use]
    pub fn enum_value(def: Rc<EnumDef>, bits: Bits) -> Self {
        Self::Enum { def, bits }
    }

    /// An array value; all elements must share a structural shape.
    pub fn array(elements: Vec<Value>) -> Result<Self, ValueError> {
        if let Some((first, rest)) = elements.split_first()
            && !rest.iter().all(|e| first.shape_eq(e))
        {
            return Err(ValueError::ElementShapeMismatch);
        }
        Ok(Self::Array(elements))
    }

    /// A user function reference.
    #[must_use]
    pub fn user_fn(decl: Rc<FnDecl>) -> Self {
        Self::Function(FnRef::User(decl))
    }

    /// A builtin function reference.
    #[must_use]
    pub fn builtin_fn(builtin: Builtin) -> Self {
        Self::Function(FnRef::Builtin(builtin))
    }

    /// The value's tag.
    #[must_use]
    pub fn tag(&self) -> ValueTag {
        match self {
            Self::UBits(_) => ValueTag::UnsignedBits,
            Self::SBits(_) => ValueTag::SignedBits,
            Self::Enum { .. } => ValueTag::EnumBits,
            Self::Tuple(_) => ValueTag::Tuple,
            Self::Array(_) => ValueTag::Array,
            Self::Token => ValueTag::Token,
            Self::Function(_) => ValueTag::Function,
            Self::Channel(_) => ValueTag::Channel,
        }
    }

    /// Returns `true` for signed bits and enums over a signed underlying type.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        match self {
            Self::SBits(_) => true,
            Self::Enum { def, .. } => def.signed,
            _ => false,
        }
    }

    /// The underlying bit pattern of a bits-typed value (including enums).
    pub fn bits(&self) -> Result<&Bits, ValueError> {
        match self {
            Self::UBits(b) | Self::SBits(b) | Self::Enum { bits: b, .. } => Ok(b),
            other => Err(ValueError::NotBits { tag: other.tag() }),
        }
    }

    /// Returns `true` if the value is bits-typed and exactly one.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.bits().is_ok_and(Bits::is_one)
    }

    /// Returns `true` if the value is bits-typed and zero.
    #[must_use]
    pub fn is_false(&self) -> bool {
        self.bits().is_ok_and(Bits::is_zero)
    }

    /// The elements of a tuple or array.
    pub fn elements(&self) -> Result<&[Value], ValueError> {
        match self {
            Self::Tuple(v) | Self::Array(v) => Ok(v),
            other => Err(ValueError::NotAggregate { tag: other.tag() }),
        }
    }

    /// The channel behind a channel handle.
    pub fn channel(&self) -> Result<&ChannelRef, ValueError> {
        match self {
            Self::Channel(c) => Ok(c),
            other => Err(ValueError::NotChannel { tag: other.tag() }),
        }
    }

    /// The function behind a function reference.
    pub fn function(&self) -> Result<&FnRef, ValueError> {
        match self {
            Self::Function(f) => Ok(f),
            other => Err(ValueError::NotFunction { tag: other.tag() }),
        }
    }

    /// Structural shape equality, the invariant shared by array elements.
    #[must_use]
    pub fn shape_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::UBits(a), Self::UBits(b)) | (Self::SBits(a), Self::SBits(b)) => {
                a.width() == b.width()
            }
            (Self::Enum { def: a, .. }, Self::Enum { def: b, .. }) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.shape_eq(y))
            }
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len()
                    && match (a.first(), b.first()) {
                        (Some(x), Some(y)) => x.shape_eq(y),
                        _ => true,
                    }
            }
            (Self::Token, Self::Token)
            | (Self::Function(_), Self::Function(_))
            | (Self::Channel(_), Self::Channel(_)) => true,
            _ => false,
        }
    }

    fn binop_bits<'a>(&'a self, other: &'a Self) -> Result<(&'a Bits, &'a Bits), ValueError> {
        match (self, other) {
            (Self::UBits(a), Self::UBits(b)) | (Self::SBits(a), Self::SBits(b)) => Ok((a, b)),
            (Self::UBits(_) | Self::SBits(_), Self::UBits(_) | Self::SBits(_)) => {
                Err(ValueError::TagMismatch {
                    lhs: self.tag(),
                    rhs: other.tag(),
                })
            }
            (Self::UBits(_) | Self::SBits(_), other_v) => Err(ValueError::NotBits {
                tag: other_v.tag(),
            }),
            _ => Err(ValueError::NotBits { tag: self.tag() }),
        }
    }

    fn with_same_tag(&self, bits: Bits) -> Self {
        match self {
            Self::SBits(_) => Self::SBits(bits),
            _ => Self::UBits(bits),
        }
    }

    /// Wrapping addition of matching-width, matching-tag bits.
    pub fn add(&self, other: &Self) -> Result<Self, ValueError> {
        let (a, b) = self.binop_bits(other)?;
        Ok(self.with_same_tag(a.add(b)?))
    }

    /// Wrapping subtraction.
    pub fn sub(&self, other: &Self) -> Result<Self, ValueError> {
        let (a, b) = self.binop_bits(other)?;
        Ok(self.with_same_tag(a.sub(b)?))
    }

    /// Wrapping multiplication.
    pub fn mul(&self, other: &Self) -> Result<Self, ValueError> {
        let (a, b) = self.binop_bits(other)?;
        Ok(self.with_same_tag(a.mul(b)?))
    }

    /// Integer division; signedness follows the operand tag.
    pub fn floor_div(&self, other: &Self) -> Result<Self, ValueError> {
        let (a, b) = self.binop_bits(other)?;
        let q = if self.is_signed() {
            a.sdiv(b)?
        } else {
            a.udivmod(b)?.0
        };
        Ok(self.with_same_tag(q))
    }

    /// Two's-complement negation.
    pub fn negate(&self) -> Result<Self, ValueError> {
        let b = self.checked_plain_bits()?;
        Ok(self.with_same_tag(b.negate()))
    }

    /// Bitwise AND.
    pub fn bitwise_and(&self, other: &Self) -> Result<Self, ValueError> {
        let (a, b) = self.binop_bits(other)?;
        Ok(self.with_same_tag(a.and(b)?))
    }

    /// Bitwise OR.
    pub fn bitwise_or(&self, other: &Self) -> Result<Self, ValueError> {
        let (a, b) = self.binop_bits(other)?;
        Ok(self.with_same_tag(a.or(b)?))
    }

    /// Bitwise XOR.
    pub fn bitwise_xor(&self, other: &Self) -> Result<Self, ValueError> {
        let (a, b) = self.binop_bits(other)?;
        Ok(self.with_same_tag(a.xor(b)?))
    }

    /// Bitwise complement.
    pub fn invert(&self) -> Result<Self, ValueError> {
        let b = self.checked_plain_bits()?;
        Ok(self.with_same_tag(b.not()))
    }

    fn checked_plain_bits(&self) -> Result<&Bits, ValueError> {
        match self {
            Self::UBits(b) | Self::SBits(b) => Ok(b),
            other => Err(ValueError::NotBits { tag: other.tag() }),
        }
    }

    fn shift_amount(&self) -> Result<usize, ValueError> {
        // The count is a non-negative magnitude; anything that does not fit
        // in u64 is at least the width and shifts everything out.
        let b = self.bits()?;
        Ok(b.to_u64().map_or(usize::MAX, |v| {
            usize::try_from(v).unwrap_or(usize::MAX)
        }))
    }

    /// Left shift with zero fill.
    pub fn shl(&self, amount: &Self) -> Result<Self, ValueError> {
        let b = self.checked_plain_bits()?;
        Ok(self.with_same_tag(b.shl(amount.shift_amount()?)))
    }

    /// Right shift: arithmetic for signed subjects, logical otherwise.
    pub fn shr(&self, amount: &Self) -> Result<Self, ValueError> {
        let b = self.checked_plain_bits()?;
        let n = amount.shift_amount()?;
        let shifted = if self.is_signed() {
            b.shr_arith(n)
        } else {
            b.shr_logical(n)
        };
        Ok(self.with_same_tag(shifted))
    }

    /// Concatenation of unsigned bit vectors; `self` becomes the high bits.
    pub fn concat(&self, other: &Self) -> Result<Self, ValueError> {
        match (self, other) {
            (Self::UBits(a), Self::UBits(b)) => Ok(Self::UBits(a.concat(b))),
            _ => Err(ValueError::TagMismatch {
                lhs: self.tag(),
                rhs: other.tag(),
            }),
        }
    }

    fn ordering(&self, other: &Self) -> Result<Ordering, ValueError> {
        let (a, b) = self.binop_bits(other)?;
        if a.width() != b.width() {
            return Err(ValueError::Bits(BitsError::WidthMismatch {
                lhs: a.width(),
                rhs: b.width(),
            }));
        }
        Ok(if self.is_signed() {
            a.scmp(b)
        } else {
            a.ucmp(b)
        })
    }

    /// `<` producing a 1-bit boolean; signedness follows the operands.
    pub fn lt(&self, other: &Self) -> Result<Self, ValueError> {
        Ok(Self::bool_value(self.ordering(other)? == Ordering::Less))
    }

    /// `<=` producing a 1-bit boolean.
    pub fn le(&self, other: &Self) -> Result<Self, ValueError> {
        Ok(Self::bool_value(self.ordering(other)? != Ordering::Greater))
    }

    /// `>` producing a 1-bit boolean.
    pub fn gt(&self, other: &Self) -> Result<Self, ValueError> {
        Ok(Self::bool_value(self.ordering(other)? == Ordering::Greater))
    }

    /// `>=` producing a 1-bit boolean.
    pub fn ge(&self, other: &Self) -> Result<Self, ValueError> {
        Ok(Self::bool_value(self.ordering(other)? != Ordering::Less))
    }

    /// Indexes a tuple or array with a bits-typed index.
    pub fn index(&self, index: &Self) -> Result<Self, ValueError> {
        let elements = self.elements()?;
        let idx = index.bits()?.to_u64().ok_or(ValueError::IndexOutOfBounds {
            index: u64::MAX,
            len: elements.len(),
        })?;
        let i = usize::try_from(idx).ok().filter(|&i| i < elements.len());
        match i {
            Some(i) => Ok(elements[i].clone()),
            None => Err(ValueError::IndexOutOfBounds {
                index: idx,
                len: elements.len(),
            }),
        }
    }

    /// Returns a new array with one element replaced.
    pub fn update(&self, index: &Self, new_value: &Self) -> Result<Self, ValueError> {
        let Self::Array(elements) = self else {
            return Err(ValueError::NotAggregate { tag: self.tag() });
        };
        let idx = index.bits()?.to_u64().ok_or(ValueError::IndexOutOfBounds {
            index: u64::MAX,
            len: elements.len(),
        })?;
        let i = usize::try_from(idx)
            .ok()
            .filter(|&i| i < elements.len())
            .ok_or(ValueError::IndexOutOfBounds {
                index: idx,
                len: elements.len(),
            })?;
        let mut out = elements.clone();
        out[i] = new_value.clone();
        Ok(Self::Array(out))
    }

    /// Flattens a bits value or an array of such into one unsigned bit
    /// vector; element 0 lands in the most significant position.
    pub fn flatten(&self) -> Result<Self, ValueError> {
        fn flat(v: &Value) -> Result<Bits, ValueError> {
            match v {
                Value::UBits(b) | Value::SBits(b) | Value::Enum { bits: b, .. } => Ok(b.clone()),
                Value::Array(elements) => {
                    let mut acc = Bits::zero(0);
                    for e in elements {
                        acc = acc.concat(&flat(e)?);
                    }
                    Ok(acc)
                }
                other => Err(ValueError::NotBits { tag: other.tag() }),
            }
        }
        Ok(Self::UBits(flat(self)?))
    }

    /// Total bit count of a bits value or array-of-bits shape.
    pub fn total_bit_count(&self) -> Result<usize, ValueError> {
        match self {
            Self::UBits(b) | Self::SBits(b) | Self::Enum { bits: b, .. } => Ok(b.width()),
            Self::Array(elements) => {
                let mut total = 0;
                for e in elements {
                    total += e.total_bit_count()?;
                }
                Ok(total)
            }
            other => Err(ValueError::NotBits { tag: other.tag() }),
        }
    }

    /// A zero-valued instance of this value's shape (tokens and functions are
    /// passed through unchanged).
    #[must_use]
    pub fn zero_like(&self) -> Self {
        match self {
            Self::UBits(b) => Self::UBits(Bits::zero(b.width())),
            Self::SBits(b) => Self::SBits(Bits::zero(b.width())),
            Self::Enum { def, bits } => Self::Enum {
                def: def.clone(),
                bits: Bits::zero(bits.width()),
            },
            Self::Tuple(v) => Self::Tuple(v.iter().map(Self::zero_like).collect()),
            Self::Array(v) => Self::Array(v.iter().map(Self::zero_like).collect()),
            other => other.clone(),
        }
    }

    /// Casts per the cast policy: array→bits flattens, enum→bits strips the
    /// tag, bits→array reshapes when total bit counts match, bits→enum
    /// reinterprets, bits→bits extends/truncates per the source signedness.
    pub fn cast(&self, to: &TypeDesc) -> Result<Self, ValueError> {
        match self {
            Self::Array(_) => match to {
                TypeDesc::Bits { signed, .. } => {
                    let flat = self.flatten()?;
                    let bits = flat.bits()?.clone();
                    Ok(if *signed {
                        Self::SBits(bits)
                    } else {
                        Self::UBits(bits)
                    })
                }
                _ => Err(ValueError::InvalidCast { from: self.tag() }),
            },
            Self::Enum { def, bits } => match to {
                TypeDesc::Bits { .. } => Ok(if def.signed {
                    Self::SBits(bits.clone())
                } else {
                    Self::UBits(bits.clone())
                }),
                _ => Err(ValueError::InvalidCast { from: self.tag() }),
            },
            Self::UBits(bits) | Self::SBits(bits) => match to {
                TypeDesc::Array { .. } => {
                    let to_count = to.total_bit_count();
                    if bits.width() != to_count {
                        return Err(ValueError::CastWidthMismatch {
                            from: bits.width(),
                            to: to_count,
                        });
                    }
                    unflatten(bits, to)
                }
                TypeDesc::Enum(def) => Ok(Self::Enum {
                    def: def.clone(),
                    bits: bits.zero_ext(def.width),
                }),
                TypeDesc::Bits { signed, width } => {
                    let resized = if bits.width() == *width {
                        bits.clone()
                    } else if self.is_signed() {
                        bits.sign_ext(*width)
                    } else {
                        bits.zero_ext(*width)
                    };
                    Ok(if *signed {
                        Self::SBits(resized)
                    } else {
                        Self::UBits(resized)
                    })
                }
                _ => Err(ValueError::InvalidCast { from: self.tag() }),
            },
            _ => Err(ValueError::InvalidCast { from: self.tag() }),
        }
    }

    /// Renders with an explicit format preference.
    #[must_use]
    pub fn format(&self, pref: FormatPreference) -> String {
        match self {
            Self::UBits(b) => format!("u{}:{}", b.width(), format_bits(b, false, pref)),
            Self::SBits(b) => format!("s{}:{}", b.width(), format_bits(b, true, pref)),
            Self::Enum { def, bits } => {
                format!("{}:{}", def.name, format_bits(bits, def.signed, pref))
            }
            Self::Tuple(v) => {
                let inner: Vec<String> = v.iter().map(|e| e.format(pref)).collect();
                format!("({})", inner.join(", "))
            }
            Self::Array(v) => {
                let inner: Vec<String> = v.iter().map(|e| e.format(pref)).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Token => String::from("token"),
            Self::Function(FnRef::User(decl)) => format!("fn:{}", decl.name),
            Self::Function(FnRef::Builtin(b)) => format!("builtin:{}", b.name()),
            Self::Channel(_) => String::from("channel"),
        }
    }
}

fn format_bits(bits: &Bits, signed: bool, pref: FormatPreference) -> String {
    match pref {
        FormatPreference::Binary => bits.to_binary_string(),
        FormatPreference::Hex => bits.to_hex_string(),
        FormatPreference::SignedDecimal => bits.to_signed_decimal_string(),
        FormatPreference::UnsignedDecimal => bits.to_unsigned_decimal_string(),
        FormatPreference::Default => {
            if signed {
                bits.to_signed_decimal_string()
            } else {
                bits.to_unsigned_decimal_string()
            }
        }
    }
}

/// Reshapes flat bits into `to` (an array or bits leaf); the caller has
/// already checked total bit counts.
fn unflatten(bits: &Bits, to: &TypeDesc) -> Result<Value, ValueError> {
    match to {
        TypeDesc::Bits { signed, width } => {
            let b = bits.slice(0, *width);
            Ok(if *signed { Value::SBits(b) } else { Value::UBits(b) })
        }
        TypeDesc::Array { elem, len } => {
            let elem_count = elem.total_bit_count();
            let mut out = Vec::with_capacity(*len);
            for i in 0..*len {
                // Element 0 occupies the most significant bits.
                let start = (*len - 1 - i) * elem_count;
                out.push(unflatten(&bits.slice(start, elem_count), elem)?);
            }
            Ok(Value::Array(out))
        }
        _ => Err(ValueError::InvalidCast {
            from: ValueTag::UnsignedBits,
        }),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Bits-typed values compare as bits: width plus pattern.
            (
                Self::UBits(a) | Self::SBits(a) | Self::Enum { bits: a, .. },
                Self::UBits(b) | Self::SBits(b) | Self::Enum { bits: b, .. },
            ) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) | (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Token, Self::Token) => true,
            (Self::Function(FnRef::User(a)), Self::Function(FnRef::User(b))) => Rc::ptr_eq(a, b),
            (Self::Function(FnRef::Builtin(a)), Self::Function(FnRef::Builtin(b))) => a == b,
            (Self::Channel(a), Self::Channel(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(FormatPreference::Default))
    }
}
