// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Model backend infrastructure: name registry, circuit breakers and
// fallback chains. Concrete vendor clients are supplied by the embedding
// application through the `ModelBackend` trait.

pub mod circuit_breaker;
pub mod fallback;
pub mod registry;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use fallback::{ChainFailure, ChainResponse, FallbackChain, GuardedBackend};
pub use registry::BackendRegistry;
