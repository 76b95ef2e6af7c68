// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Backend Registry - Name Resolution and Resilience State
//
// Maps registry names to model backends and owns one circuit breaker per
// backend, so every call site that reaches a backend by name shares the same
// failure history. Core logic asks the registry for guarded handlers and
// never inspects which vendor sits behind a name.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::circuit_breaker::CircuitBreaker;
use super::fallback::GuardedBackend;
use crate::domain::config::CircuitBreakerConfig;
use crate::domain::llm::{BackendError, ModelBackend};

struct Registered {
    backend: Arc<dyn ModelBackend>,
    breaker: Arc<CircuitBreaker>,
}

/// Registry for managing model backends by name
pub struct BackendRegistry {
    backends: BTreeMap<String, Registered>,
    breaker_config: CircuitBreakerConfig,
}

impl BackendRegistry {
    pub fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            backends: BTreeMap::new(),
            breaker_config,
        }
    }

    /// Register a backend under its own name, replacing any previous entry
    pub fn register(&mut self, backend: Arc<dyn ModelBackend>) {
        let name = backend.name().to_string();
        self.register_as(name, backend);
    }

    /// Register a backend under an explicit name (alias)
    pub fn register_as(&mut self, name: impl Into<String>, backend: Arc<dyn ModelBackend>) {
        let name = name.into();
        info!(backend = %name, embeddings = backend.supports_embeddings(), "Registering model backend");
        let breaker = Arc::new(CircuitBreaker::from_config(&self.breaker_config));
        if self
            .backends
            .insert(name.clone(), Registered { backend, breaker })
            .is_some()
        {
            warn!(backend = %name, "Replaced previously registered backend");
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelBackend>> {
        self.backends.get(name).map(|r| r.backend.clone())
    }

    pub fn breaker(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.backends.get(name).map(|r| r.breaker.clone())
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// Resolve a name into a guarded call site with the given timeout
    pub fn guarded(&self, name: &str, timeout: Duration) -> Result<GuardedBackend, BackendError> {
        let registered = self
            .backends
            .get(name)
            .ok_or_else(|| BackendError::Unavailable(format!("unknown backend '{}'", name)))?;
        Ok(GuardedBackend::new(
            name,
            registered.backend.clone(),
            registered.breaker.clone(),
            timeout,
        ))
    }

    /// First embedding-capable backend, by name order, as a guarded call site
    pub fn guarded_embedding(&self, timeout: Duration) -> Option<GuardedBackend> {
        self.backends
            .iter()
            .find(|(_, r)| r.backend.supports_embeddings())
            .map(|(name, r)| GuardedBackend::new(name.as_str(), r.backend.clone(), r.breaker.clone(), timeout))
    }

    /// Check availability of all backends
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (name, registered) in &self.backends {
            let available = registered.backend.is_available().await;
            if !available {
                warn!(backend = %name, "Backend reports unavailable");
            }
            results.insert(name.clone(), available);
        }
        results
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{GenerationRequest, GenerationResponse};
    use async_trait::async_trait;

    struct Named {
        name: &'static str,
        embeds: bool,
    }

    #[async_trait]
    impl ModelBackend for Named {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse, BackendError> {
            Ok(GenerationResponse {
                content: self.name.to_string(),
                tokens_used: 0,
                model: self.name.to_string(),
            })
        }

        fn supports_embeddings(&self) -> bool {
            self.embeds
        }

        async fn is_available(&self) -> bool {
            self.name != "down"
        }
    }

    fn registry() -> BackendRegistry {
        BackendRegistry::default()
            .with_backend(Arc::new(Named { name: "zeta", embeds: true }))
            .with_backend(Arc::new(Named { name: "alpha", embeds: false }))
            .with_backend(Arc::new(Named { name: "down", embeds: false }))
    }

    #[test]
    fn test_lookup_and_names() {
        let registry = registry();
        assert!(registry.contains("alpha"));
        assert!(!registry.contains("missing"));
        assert_eq!(registry.names(), vec!["alpha", "down", "zeta"]);
        assert_eq!(
            registry.guarded_embedding(Duration::from_secs(1)).map(|g| g.name().to_string()),
            Some("zeta".to_string())
        );
    }

    #[test]
    fn test_unknown_backend_is_unavailable() {
        let err = registry().guarded("missing", Duration::from_secs(1)).err();
        assert!(matches!(err, Some(BackendError::Unavailable(_))));
    }

    #[test]
    fn test_guarded_handlers_share_breaker() {
        let registry = registry();
        let breaker = registry.breaker("alpha").unwrap();
        for _ in 0..CircuitBreakerConfig::default().failure_threshold {
            breaker.record_failure();
        }
        assert!(!registry.breaker("alpha").unwrap().try_acquire());
    }

    #[tokio::test]
    async fn test_health_check_all() {
        let results = registry().health_check_all().await;
        assert_eq!(results.get("alpha"), Some(&true));
        assert_eq!(results.get("down"), Some(&false));
    }
}
