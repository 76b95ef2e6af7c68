// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fallback Chain - ordered resilience handlers
//
// A chain is an ordered list of guarded backends. Each handler carries its
// own timeout and shares its backend's circuit breaker; a call falls through
// to the next handler on failure. Cancellation stops the chain immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use crate::domain::llm::{BackendError, GenerationRequest, GenerationResponse, ModelBackend};

/// One backend call site guarded by a timeout and a circuit breaker
#[derive(Clone)]
pub struct GuardedBackend {
    name: String,
    backend: Arc<dyn ModelBackend>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
}

impl GuardedBackend {
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn ModelBackend>,
        breaker: Arc<CircuitBreaker>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            breaker,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, BackendError> {
        self.call(self.backend.generate(request), cancel).await
    }

    /// Embed `text` under the same timeout and breaker as generation calls
    pub async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, BackendError> {
        self.call(self.backend.embed(text), cancel).await
    }

    async fn call<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>>,
        cancel: &CancellationToken,
    ) -> Result<T, BackendError> {
        if !self.breaker.try_acquire() {
            record_call(&self.name, "rejected");
            return Err(BackendError::Unavailable(format!(
                "circuit open for backend '{}'",
                self.name
            )));
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                self.breaker.release();
                record_call(&self.name, "cancelled");
                return Err(BackendError::Cancelled);
            }
            result = tokio::time::timeout(self.timeout, call) => result,
        };

        match outcome {
            Ok(Ok(value)) => {
                self.breaker.record_success();
                record_call(&self.name, "success");
                Ok(value)
            }
            Ok(Err(e)) => {
                if e.is_backend_fault() {
                    self.breaker.record_failure();
                } else {
                    self.breaker.release();
                }
                record_call(&self.name, "error");
                Err(e)
            }
            Err(_) => {
                self.breaker.record_failure();
                record_call(&self.name, "timeout");
                Err(BackendError::Timeout(self.timeout))
            }
        }
    }
}

fn record_call(backend: &str, outcome: &'static str) {
    metrics::counter!(
        "alembic_backend_calls_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Ordered list of guarded handlers tried until one succeeds
#[derive(Clone, Default)]
pub struct FallbackChain {
    handlers: Vec<GuardedBackend>,
}

/// Successful chain call: the response plus the handler that produced it
#[derive(Debug, Clone)]
pub struct ChainResponse {
    pub response: GenerationResponse,
    pub handler: String,

    /// Position of the handler in the chain (0 = primary)
    pub position: usize,

    /// Errors from handlers tried before the successful one
    pub failures: Vec<(String, BackendError)>,
}

/// Every handler failed; holds each attempt's error in chain order
#[derive(Debug, Clone)]
pub struct ChainFailure {
    pub attempts: Vec<(String, BackendError)>,
}

impl ChainFailure {
    /// The error to report for the chain as a whole
    pub fn last_error(&self) -> BackendError {
        self.attempts
            .last()
            .map(|(_, e)| e.clone())
            .unwrap_or_else(|| BackendError::Unavailable("no handlers configured".to_string()))
    }
}

impl FallbackChain {
    pub fn new(handlers: Vec<GuardedBackend>) -> Self {
        Self { handlers }
    }

    pub fn then(mut self, handler: GuardedBackend) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<ChainResponse, ChainFailure> {
        let mut attempts = Vec::new();

        for (position, handler) in self.handlers.iter().enumerate() {
            match handler.generate(request, cancel).await {
                Ok(response) => {
                    if position > 0 {
                        debug!(handler = handler.name(), position, "Fallback handler succeeded");
                    }
                    return Ok(ChainResponse {
                        response,
                        handler: handler.name().to_string(),
                        position,
                        failures: attempts,
                    });
                }
                Err(BackendError::Cancelled) => {
                    attempts.push((handler.name().to_string(), BackendError::Cancelled));
                    break;
                }
                Err(e) => {
                    warn!(handler = handler.name(), error = %e, "Backend call failed");
                    attempts.push((handler.name().to_string(), e));
                }
            }
        }

        Err(ChainFailure { attempts })
    }
}
