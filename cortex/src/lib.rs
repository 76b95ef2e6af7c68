// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Alembic Cortex
//!
//! Learns from artifact usage and keeps that knowledge fresh.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Usage statistics, learned patterns, composite ranking and
//!   the background maintenance that decays, consolidates and embeds

pub mod domain;
pub mod application;

pub use domain::*;
pub use application::*;
