// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `bitstack`: a stack-based bytecode VM for a hardware expression language
//! with exact-width bit-vector values.
//!
//! The VM evaluates a linearized opcode stream against a frame stack of call
//! activations and a shared operand stack. Values are a closed tagged
//! universe (unsigned/signed bits with precise widths, enums, tuples,
//! arrays, tokens, function references, channel handles); arithmetic wraps
//! mod `2^width` and width mismatches are typed errors. Front-end parsing,
//! type checking, and the bytecode emitter are external collaborators: the
//! VM consumes compiled functions plus a type-info table and a bytecode
//! cache that produces further callees on demand.
//!
//! ## Example
//!
//! ```
//! extern crate alloc;
//!
//! use alloc::vec;
//!
//! use bitstack::asm::Asm;
//! use bitstack::program::ImportData;
//! use bitstack::value::Value;
//! use bitstack::vm::interpret;
//!
//! let mut a = Asm::new();
//! a.literal(Value::ubits(32, 7));
//! a.literal(Value::ubits(32, 5));
//! a.add();
//! let bf = a.build(None, None, None).unwrap();
//!
//! let result = interpret(&ImportData::new(), &bf, vec![])?;
//! assert_eq!(result, Value::ubits(32, 12));
//! # Ok::<(), bitstack::vm::VmError>(())
//! ```

#![no_std]

extern crate alloc;

pub mod asm;
pub mod bits;
pub mod builtins;
pub mod bytecode;
pub mod channel;
pub mod disasm;
pub mod opcode;
pub mod proc;
pub mod program;
pub mod trace;
pub mod value;
pub mod vm;
