// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Model Backend
//!
//! Uniform capability contract for text generation and embedding backends.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-corruption layer between core logic and vendor clients
//!
//! Concrete clients live outside this crate. Core logic selects a backend by
//! name through the registry and never branches on vendor identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capability interface every model backend implements
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Registry name of this backend
    fn name(&self) -> &str;

    /// Execute a single generation call
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, BackendError>;

    /// Produce an embedding vector. Only embedding-capable backends override this.
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
        Err(BackendError::Unsupported(format!(
            "backend '{}' does not produce embeddings",
            self.name()
        )))
    }

    fn supports_embeddings(&self) -> bool {
        false
    }

    /// Cheap availability check (credentials present, endpoint reachable)
    async fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,

    /// Sampling temperature (0.0 = deterministic)
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.7,
            max_tokens: 2048,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub tokens_used: u32,

    /// Model identifier reported by the backend (e.g. "gpt-4o", "llama3.2")
    pub model: String,
}

/// Errors that can occur during backend operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend call cancelled")]
    Cancelled,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BackendError {
    /// Whether the failure should count against the backend's circuit breaker
    pub fn is_backend_fault(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Provider(_) | Self::Unavailable(_))
    }
}
