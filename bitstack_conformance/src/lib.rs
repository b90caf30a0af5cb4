// Copyright 2026 the Bitstack Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end conformance tests for the bitstack VM live in `tests/`.
