// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding Worker - background embedding and relationship analysis
//!
//! Each cycle embeds a bounded batch of artifacts that have no embedding yet,
//! then compares the embeddings of the highest-quality artifacts and keeps,
//! per artifact, the closest neighbors above the similarity threshold. The
//! relationship table is rebuilt from scratch every cycle.
//!
//! Embedding calls go through the registry's guarded handler, so each one is
//! bounded by `embed_timeout` and counts against the backend's breaker.
//!
//! Scheduling lives in [`MaintenanceScheduler`](super::maintenance::MaintenanceScheduler);
//! this type only knows how to run one cycle.

use alembic_core::application::ranking::cosine_similarity;
use alembic_core::domain::artifact::{Artifact, ArtifactId};
use alembic_core::domain::config::EmbeddingConfig;
use alembic_core::domain::llm::BackendError;
use alembic_core::domain::repository::ArtifactRepository;
use alembic_core::infrastructure::llm::BackendRegistry;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarArtifact {
    pub artifact_id: ArtifactId,
    pub similarity: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingReport {
    pub embedded: usize,
    pub failed: usize,

    /// Number of (artifact, neighbor) pairs above the similarity threshold
    pub related_pairs: usize,
}

pub struct EmbeddingWorker {
    config: EmbeddingConfig,
    repository: Arc<dyn ArtifactRepository>,
    registry: Arc<BackendRegistry>,
    related: RwLock<HashMap<ArtifactId, Vec<SimilarArtifact>>>,
}

impl EmbeddingWorker {
    pub fn new(
        config: EmbeddingConfig,
        repository: Arc<dyn ArtifactRepository>,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            config,
            repository,
            registry,
            related: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Neighbors found for `id` by the most recent relationship analysis
    pub fn related(&self, id: ArtifactId) -> Vec<SimilarArtifact> {
        self.related.read().get(&id).cloned().unwrap_or_default()
    }

    /// Run one embedding and relationship cycle. Cancelling `cancel` stops
    /// outstanding embedding calls; the cycle then skips relationship analysis.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<EmbeddingReport> {
        let mut report = self.embed_missing(cancel).await?;
        if cancel.is_cancelled() {
            return Ok(report);
        }
        report.related_pairs = self.analyze_relationships().await?;
        Ok(report)
    }

    async fn embed_missing(&self, cancel: &CancellationToken) -> Result<EmbeddingReport> {
        let mut report = EmbeddingReport::default();
        let Some(backend) = self.registry.guarded_embedding(self.config.embed_timeout) else {
            debug!("No embedding-capable backend registered, skipping embedding step");
            return Ok(report);
        };

        let pending = self
            .repository
            .find_missing_embedding(self.config.embedding_batch)
            .await
            .context("Failed to load artifacts missing embeddings")?;

        for artifact in pending {
            let vector = match backend.embed(&artifact.content, cancel).await {
                Ok(v) if !v.is_empty() => v,
                Err(BackendError::Cancelled) => {
                    debug!("Embedding cycle cancelled");
                    break;
                }
                Ok(_) => {
                    warn!(artifact_id = %artifact.id, backend = backend.name(), "Backend returned an empty embedding");
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!(artifact_id = %artifact.id, backend = backend.name(), error = %e, "Embedding failed");
                    report.failed += 1;
                    continue;
                }
            };

            let mutation = Box::new(move |a: &mut Artifact| a.embedding = Some(vector));
            match self.repository.update(artifact.id, mutation).await {
                Ok(Some(_)) => report.embedded += 1,
                Ok(None) => debug!(artifact_id = %artifact.id, "Artifact removed before embedding was stored"),
                Err(e) => {
                    warn!(artifact_id = %artifact.id, error = %e, "Failed to store embedding");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn analyze_relationships(&self) -> Result<usize> {
        let candidates: Vec<Artifact> = self
            .repository
            .find_high_quality(self.config.quality_threshold, self.config.relationship_batch)
            .await
            .context("Failed to load high-quality artifacts")?
            .into_iter()
            .filter(Artifact::has_embedding)
            .collect();

        let mut related = HashMap::new();
        let mut pairs = 0;
        for artifact in &candidates {
            let Some(own) = artifact.embedding.as_deref() else {
                continue;
            };
            let mut neighbors: Vec<SimilarArtifact> = candidates
                .iter()
                .filter(|other| other.id != artifact.id)
                .filter_map(|other| {
                    let similarity = cosine_similarity(own, other.embedding.as_deref()?)?;
                    (similarity > self.config.similarity_threshold).then_some(SimilarArtifact {
                        artifact_id: other.id,
                        similarity,
                    })
                })
                .collect();
            neighbors.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.artifact_id.cmp(&b.artifact_id))
            });
            neighbors.truncate(self.config.max_similar);

            if neighbors.is_empty() {
                continue;
            }
            debug!(artifact_id = %artifact.id, neighbors = neighbors.len(), "Found related artifacts");
            pairs += neighbors.len();
            related.insert(artifact.id, neighbors);
        }
        *self.related.write() = related;
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alembic_core::domain::artifact::PhaseName;
    use alembic_core::domain::config::CircuitBreakerConfig;
    use alembic_core::domain::llm::{GenerationRequest, GenerationResponse, ModelBackend};
    use alembic_core::infrastructure::repositories::InMemoryArtifactRepository;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Embeds by keyword so tests control similarity
    struct KeywordEmbedder;

    #[async_trait]
    impl ModelBackend for KeywordEmbedder {
        fn name(&self) -> &str {
            "embedder"
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse, BackendError> {
            Err(BackendError::Provider("generation not supported".to_string()))
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
            if text.contains("fail") {
                return Err(BackendError::Provider("bad input".to_string()));
            }
            Ok(if text.contains("ocean") {
                vec![1.0, 0.1, 0.0]
            } else {
                vec![0.0, 0.1, 1.0]
            })
        }

        fn supports_embeddings(&self) -> bool {
            true
        }
    }

    /// Never answers
    struct StalledEmbedder;

    #[async_trait]
    impl ModelBackend for StalledEmbedder {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationResponse, BackendError> {
            Err(BackendError::Provider("generation not supported".to_string()))
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, BackendError> {
            std::future::pending::<Result<Vec<f32>, BackendError>>().await
        }

        fn supports_embeddings(&self) -> bool {
            true
        }
    }

    fn worker(repo: Arc<InMemoryArtifactRepository>) -> EmbeddingWorker {
        let registry = Arc::new(
            BackendRegistry::new(CircuitBreakerConfig::default()).with_backend(Arc::new(KeywordEmbedder)),
        );
        EmbeddingWorker::new(EmbeddingConfig::default(), repo, registry)
    }

    fn artifact(content: &str, relevance: f64) -> Artifact {
        Artifact::new(content, PhaseName::refinement(), "primary", "m").with_relevance(relevance)
    }

    #[tokio::test]
    async fn test_cycle_embeds_and_relates() {
        let repo = Arc::new(InMemoryArtifactRepository::new());
        let a = artifact("ocean waves", 0.9);
        let b = artifact("ocean tides", 0.8);
        let c = artifact("mountain air", 0.9);
        let d = artifact("please fail", 0.9);
        for x in [&a, &b, &c, &d] {
            repo.save(x).await.unwrap();
        }

        let worker = worker(repo.clone());
        let report = worker.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.embedded, 3);
        assert_eq!(report.failed, 1);
        // a <-> b only
        assert_eq!(report.related_pairs, 2);

        assert!(repo.find_by_id(a.id).await.unwrap().unwrap().has_embedding());
        let related = worker.related(a.id);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].artifact_id, b.id);
        assert!(worker.related(c.id).is_empty());
    }

    #[tokio::test]
    async fn test_low_quality_artifacts_are_not_related() {
        let repo = Arc::new(InMemoryArtifactRepository::new());
        let a = artifact("ocean waves", 0.9);
        let b = artifact("ocean tides", 0.2);
        repo.save(&a).await.unwrap();
        repo.save(&b).await.unwrap();

        let worker = worker(repo);
        let report = worker.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(report.related_pairs, 0);
    }

    #[tokio::test]
    async fn test_without_embedding_backend() {
        let repo = Arc::new(InMemoryArtifactRepository::new());
        repo.save(&artifact("ocean", 0.9)).await.unwrap();
        let worker = EmbeddingWorker::new(EmbeddingConfig::default(), repo, Arc::new(BackendRegistry::default()));
        let report = worker.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(report, EmbeddingReport::default());
    }

    #[tokio::test]
    async fn test_relationships_are_rebuilt_each_cycle() {
        let repo = Arc::new(InMemoryArtifactRepository::new());
        let a = artifact("ocean waves", 0.9);
        let b = artifact("ocean tides", 0.8);
        repo.save(&a).await.unwrap();
        repo.save(&b).await.unwrap();

        let worker = worker(repo.clone());
        worker.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(worker.related(a.id).len(), 1);

        // b drops below the quality bar, so a has no neighbors any more
        repo.update(b.id, Box::new(|x: &mut Artifact| x.relevance_score = 0.1))
            .await
            .unwrap();
        let report = worker.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.related_pairs, 0);
        assert!(worker.related(a.id).is_empty());
        assert!(worker.related(b.id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_embedding_backend_times_out() {
        let repo = Arc::new(InMemoryArtifactRepository::new());
        repo.save(&artifact("ocean waves", 0.9)).await.unwrap();
        repo.save(&artifact("mountain air", 0.9)).await.unwrap();

        let registry = Arc::new(BackendRegistry::default().with_backend(Arc::new(StalledEmbedder)));
        let config = EmbeddingConfig {
            embed_timeout: Duration::from_secs(5),
            ..EmbeddingConfig::default()
        };
        let worker = EmbeddingWorker::new(config, repo.clone(), registry);

        let report = worker.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.failed, 2);
        assert_eq!(report.related_pairs, 0);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_stops_embedding() {
        let repo = Arc::new(InMemoryArtifactRepository::new());
        repo.save(&artifact("ocean waves", 0.9)).await.unwrap();
        let registry = Arc::new(BackendRegistry::default().with_backend(Arc::new(StalledEmbedder)));
        let worker = EmbeddingWorker::new(EmbeddingConfig::default(), repo, registry);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = worker.run_cycle(&cancel).await.unwrap();
        assert_eq!(report, EmbeddingReport::default());
    }
}
