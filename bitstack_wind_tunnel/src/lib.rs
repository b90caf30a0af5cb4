// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Criterion benchmarks for the bitstack VM live in `benches/`.
