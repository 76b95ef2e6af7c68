// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::artifact::{Artifact, ArtifactId};
use crate::domain::repository::{ArtifactMutation, ArtifactRepository, RepositoryError};
use crate::domain::usage::UsageEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Tables {
    artifacts: HashMap<ArtifactId, Artifact>,
    usage: HashMap<ArtifactId, Vec<UsageEvent>>,
}

/// Process-local artifact store used for development and testing
#[derive(Clone, Default)]
pub struct InMemoryArtifactRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.lock().artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactRepository for InMemoryArtifactRepository {
    async fn save(&self, artifact: &Artifact) -> Result<(), RepositoryError> {
        self.tables.lock().artifacts.insert(artifact.id, artifact.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ArtifactId) -> Result<Option<Artifact>, RepositoryError> {
        Ok(self.tables.lock().artifacts.get(&id).cloned())
    }

    async fn update(
        &self,
        id: ArtifactId,
        mutation: ArtifactMutation,
    ) -> Result<Option<Artifact>, RepositoryError> {
        let mut tables = self.tables.lock();
        Ok(tables.artifacts.get_mut(&id).map(|artifact| {
            mutation(artifact);
            artifact.clone()
        }))
    }

    async fn find_missing_embedding(&self, limit: usize) -> Result<Vec<Artifact>, RepositoryError> {
        let tables = self.tables.lock();
        let mut missing: Vec<Artifact> = tables
            .artifacts
            .values()
            .filter(|a| !a.has_embedding())
            .cloned()
            .collect();
        missing.sort_by_key(|a| (a.created_at, a.id));
        missing.truncate(limit);
        Ok(missing)
    }

    async fn find_high_quality(
        &self,
        min_relevance: f64,
        limit: usize,
    ) -> Result<Vec<Artifact>, RepositoryError> {
        let tables = self.tables.lock();
        let mut found: Vec<Artifact> = tables
            .artifacts
            .values()
            .filter(|a| a.relevance_score >= min_relevance)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        found.truncate(limit);
        Ok(found)
    }

    async fn find_last_used_before(
        &self,
        cutoff: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Artifact>, RepositoryError> {
        let tables = self.tables.lock();
        let mut stale: Vec<Artifact> = tables
            .artifacts
            .values()
            .filter(|a| a.last_used.is_some_and(|used| used < cutoff))
            .cloned()
            .collect();
        stale.sort_by_key(|a| (a.last_used, a.id));
        Ok(stale.into_iter().skip(offset).take(limit).collect())
    }

    async fn save_usage(&self, event: &UsageEvent) -> Result<(), RepositoryError> {
        self.tables
            .lock()
            .usage
            .entry(event.artifact_id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn find_usage(&self, artifact_id: ArtifactId) -> Result<Vec<UsageEvent>, RepositoryError> {
        let tables = self.tables.lock();
        let mut events = tables.usage.get(&artifact_id).cloned().unwrap_or_default();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}
