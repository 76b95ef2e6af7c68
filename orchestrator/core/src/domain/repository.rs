// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for the `Artifact` aggregate and the usage events that
//! reference it. The on-disk schema and query engine are owned by the storage
//! collaborator; this crate ships only `InMemoryArtifactRepository`
//! (`crate::infrastructure::repositories`) for tests and embedding.
//!
//! Besides lookup by id, the contract exposes the query shapes background
//! jobs need:
//!
//! | Query | Used by |
//! |-------|---------|
//! | `find_missing_embedding` | embedding worker |
//! | `find_high_quality` | relationship analysis |
//! | `find_last_used_before` | relevance decay (paginated) |

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::artifact::{Artifact, ArtifactId};
use crate::domain::usage::UsageEvent;

/// In-place change applied to a stored artifact under the storage's own
/// concurrency control (row lock, transaction, mutex).
pub type ArtifactMutation = Box<dyn FnOnce(&mut Artifact) + Send>;

/// Repository interface for Artifact aggregates
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Save artifact (create or update)
    async fn save(&self, artifact: &Artifact) -> Result<(), RepositoryError>;

    /// Find artifact by ID
    async fn find_by_id(&self, id: ArtifactId) -> Result<Option<Artifact>, RepositoryError>;

    /// Atomically read-modify-write one artifact. Returns the updated
    /// artifact, or `None` if it does not exist.
    async fn update(
        &self,
        id: ArtifactId,
        mutation: ArtifactMutation,
    ) -> Result<Option<Artifact>, RepositoryError>;

    /// Artifacts that have no embedding yet, oldest first
    async fn find_missing_embedding(&self, limit: usize) -> Result<Vec<Artifact>, RepositoryError>;

    /// Artifacts with relevance at or above `min_relevance`, most relevant first
    async fn find_high_quality(
        &self,
        min_relevance: f64,
        limit: usize,
    ) -> Result<Vec<Artifact>, RepositoryError>;

    /// Page through artifacts whose `last_used` predates `cutoff`, in a stable order
    async fn find_last_used_before(
        &self,
        cutoff: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>, RepositoryError>;

    /// Persist a usage event
    async fn save_usage(&self, event: &UsageEvent) -> Result<(), RepositoryError>;

    /// Usage events recorded for an artifact, oldest first
    async fn find_usage(&self, artifact_id: ArtifactId) -> Result<Vec<UsageEvent>, RepositoryError>;
}

/// Repository errors. Opaque passthrough from the storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
