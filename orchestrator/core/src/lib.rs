// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Alembic Core
//!
//! Multi-phase prompt generation, judge-driven iterative optimization and
//! batched candidate selection.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services and in-process infrastructure
//!
//! Vendor model clients and durable storage are supplied by the embedding
//! application through the `ModelBackend` and `ArtifactRepository` traits.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
