// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Entities, value objects and the collaborator traits the application layer
//! is written against.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer

pub mod artifact;
pub mod usage;
pub mod llm;
pub mod judge;
pub mod repository;
pub mod config;
pub mod events;
