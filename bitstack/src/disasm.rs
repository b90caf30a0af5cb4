// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Listing support for compiled functions, for diagnostics and tests.

use alloc::format;
use alloc::string::String;

use crate::bytecode::BytecodeFunction;

/// Renders `bf` as a one-instruction-per-line listing.
#[must_use]
pub fn listing(bf: &BytecodeFunction) -> String {
    let mut out = String::new();
    match bf.decl() {
        Some(decl) => out.push_str(&format!("fn {}:\n", decl.name)),
        None => out.push_str("fn <synthesized>:\n"),
    }
    for (pc, instr) in bf.instrs().iter().enumerate() {
        out.push_str(&format!("  {pc:04}  {instr}\n"));
    }
    out
}
