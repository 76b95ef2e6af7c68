// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod pattern;
pub mod stats;

pub use pattern::*;
pub use stats::*;
