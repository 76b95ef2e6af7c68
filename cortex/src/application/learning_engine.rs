// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # LearningEngine - Usage Feedback, Ranking & Maintenance Passes
//!
//! Turns usage events into per-artifact statistics and cross-artifact
//! patterns, and uses both to rank artifacts.
//!
//! ## State
//!
//! - Per-artifact statistics and per-session statistics live in sharded
//!   maps. A `record_usage` call holds the artifact's entry guard for the
//!   whole read-modify-write, so concurrent events for one artifact never
//!   lose updates.
//! - Patterns live behind a single read-write lock. `rank` only ever takes
//!   the read side.
//!
//! ## Failure semantics
//!
//! `record_usage` never fails its caller: invalid events and storage errors
//! are logged and dropped. The maintenance passes (`decay_pass`,
//! `consolidate_patterns`, `cleanup_metrics`) return errors to the scheduler,
//! which logs them and retries on the next tick.
//!
//! ## Ranking
//!
//! `composite = relevance × success_rate (if tracked) × Π(1 + confidence × 0.1)`
//! over every success pattern that matches the artifact and whose confidence
//! exceeds `min_confidence`.

use alembic_core::application::selection::ArtifactRanker;
use alembic_core::domain::artifact::{Artifact, ArtifactId};
use alembic_core::domain::config::LearningConfig;
use alembic_core::domain::events::LearningEvent;
use alembic_core::domain::repository::ArtifactRepository;
use alembic_core::domain::usage::UsageEvent;
use alembic_core::infrastructure::event_bus::EventBus;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::pattern::{pattern_key, FeatureSignature, Pattern, PatternKind};
use crate::domain::stats::{ArtifactStats, LearningStats, SessionStats};

/// Multiplicative boost per matching success pattern, scaled by confidence
const PATTERN_BOOST: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedArtifact {
    pub artifact: Artifact,
    pub composite_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecayReport {
    pub scanned: usize,
    pub decayed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub evicted: usize,
    pub merged: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub artifacts_purged: usize,
    pub sessions_purged: usize,
}

/// Patterns grouped by (kind, signature) key. A group holds more than one
/// entry only after `restore_patterns` loads duplicates; consolidation folds
/// them back into one.
type PatternTable = HashMap<String, Vec<Pattern>>;

pub struct LearningEngine {
    config: LearningConfig,
    repository: Arc<dyn ArtifactRepository>,
    event_bus: EventBus,
    artifacts: DashMap<ArtifactId, ArtifactStats>,
    sessions: DashMap<String, SessionStats>,
    patterns: RwLock<PatternTable>,
}

impl LearningEngine {
    pub fn new(config: LearningConfig, repository: Arc<dyn ArtifactRepository>, event_bus: EventBus) -> Self {
        Self {
            config,
            repository,
            event_bus,
            artifacts: DashMap::new(),
            sessions: DashMap::new(),
            patterns: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Fold one usage event into statistics, patterns and the stored artifact
    pub async fn record_usage(&self, event: UsageEvent) {
        if let Err(e) = event.validate() {
            warn!(artifact_id = %event.artifact_id, error = %e, "Dropping invalid usage event");
            return;
        }
        metrics::counter!("alembic_usage_events_total").increment(1);
        debug!(
            artifact_id = %event.artifact_id,
            effectiveness = event.effectiveness,
            session_id = %event.session_id,
            "Recording usage"
        );

        let rate = self.config.learning_rate;
        self.artifacts
            .entry(event.artifact_id)
            .or_insert_with(|| ArtifactStats::new(event.artifact_id, event.timestamp))
            .observe(&event, rate);
        self.sessions
            .entry(event.session_id.clone())
            .or_insert_with(|| SessionStats::new(event.session_id.clone(), event.timestamp))
            .observe(&event);

        if let Some(upserted) = self.upsert_pattern(&event) {
            self.event_bus.publish_learning_event(LearningEvent::PatternUpserted {
                kind: upserted.kind.to_string(),
                signature: upserted.signature.canonical(),
                confidence: upserted.confidence,
                observation_count: upserted.observation_count,
                updated_at: upserted.last_updated,
            });
        }

        if let Err(e) = self.repository.save_usage(&event).await {
            warn!(artifact_id = %event.artifact_id, error = %e, "Failed to persist usage event");
        }

        let (used_at, effectiveness) = (event.timestamp, event.effectiveness);
        let mutation = Box::new(move |artifact: &mut Artifact| {
            artifact.record_use(used_at, effectiveness, rate);
        });
        match self.repository.update(event.artifact_id, mutation).await {
            Ok(Some(artifact)) => {
                debug!(artifact_id = %artifact.id, relevance = artifact.relevance_score, "Updated relevance")
            }
            Ok(None) => debug!(artifact_id = %event.artifact_id, "Usage for unknown artifact"),
            Err(e) => warn!(artifact_id = %event.artifact_id, error = %e, "Failed to update relevance score"),
        }
    }

    fn upsert_pattern(&self, event: &UsageEvent) -> Option<Pattern> {
        let (kind, signature, confidence) = FeatureSignature::detect(event)?;
        let key = pattern_key(kind, &signature);

        let mut table = self.patterns.write();
        let group = table.entry(key).or_default();
        match group.first_mut() {
            Some(existing) => {
                existing.observe(confidence, event.timestamp);
                Some(existing.clone())
            }
            None => {
                let pattern = Pattern::new(kind, signature, confidence, event.timestamp);
                group.push(pattern.clone());
                Some(pattern)
            }
        }
    }

    /// Load previously persisted patterns. Entries whose (kind, signature)
    /// already exists are kept side by side until the next consolidation.
    pub fn restore_patterns(&self, patterns: impl IntoIterator<Item = Pattern>) -> usize {
        let mut table = self.patterns.write();
        let mut restored = 0;
        for pattern in patterns {
            table.entry(pattern.key()).or_default().push(pattern);
            restored += 1;
        }
        info!(restored, "Restored learned patterns");
        restored
    }

    fn composite_score(&self, artifact: &Artifact, table: &PatternTable) -> f64 {
        let mut score = artifact.relevance_score;
        if let Some(stats) = self.artifacts.get(&artifact.id) {
            score *= stats.success_rate;
        }
        for pattern in table.values().flatten() {
            if pattern.kind == PatternKind::Success
                && pattern.confidence > self.config.min_confidence
                && pattern.signature.matches(artifact)
            {
                score *= 1.0 + pattern.confidence * PATTERN_BOOST;
            }
        }
        score
    }

    /// Order artifacts by composite score, most recently used first on ties
    pub fn rank(&self, artifacts: &[Artifact]) -> Vec<RankedArtifact> {
        let table = self.patterns.read();
        let mut ranked: Vec<RankedArtifact> = artifacts
            .iter()
            .map(|artifact| RankedArtifact {
                composite_score: self.composite_score(artifact, &table),
                artifact: artifact.clone(),
            })
            .collect();
        drop(table);

        ranked.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.artifact.last_used.cmp(&a.artifact.last_used))
                .then_with(|| a.artifact.id.cmp(&b.artifact.id))
        });
        ranked
    }

    /// Decay relevance of artifacts unused since before the decay cutoff.
    ///
    /// Works through the repository in pages of `batch_size`, yielding
    /// between pages.
    pub async fn decay_pass(&self, now: DateTime<Utc>) -> Result<DecayReport> {
        let cutoff = now
            - chrono::Duration::from_std(self.config.decay_cutoff).context("Decay cutoff out of range")?;
        let batch = self.config.batch_size.max(1);
        let rate = self.config.decay_rate;
        let mut report = DecayReport::default();
        let mut offset = 0;

        loop {
            let page = self
                .repository
                .find_last_used_before(cutoff, offset, batch)
                .await
                .context("Failed to load artifacts for decay")?;
            let fetched = page.len();

            for artifact in page {
                report.scanned += 1;
                let before = artifact.relevance_score;
                let mutation = Box::new(move |a: &mut Artifact| {
                    a.apply_decay(now, rate);
                });
                let updated = self
                    .repository
                    .update(artifact.id, mutation)
                    .await
                    .with_context(|| format!("Failed to decay artifact {}", artifact.id))?;
                if updated.is_some_and(|a| a.relevance_score < before) {
                    report.decayed += 1;
                }
            }

            if fetched < batch {
                break;
            }
            offset += fetched;
            tokio::task::yield_now().await;
        }

        debug!(scanned = report.scanned, decayed = report.decayed, "Decay pass finished");
        Ok(report)
    }

    /// Merge duplicate patterns and evict those below half the confidence floor.
    ///
    /// Keys are snapshotted up front and processed `batch_size` at a time,
    /// each chunk under its own short write lock, yielding between chunks.
    /// Patterns first seen after the snapshot wait for the next pass.
    pub async fn consolidate_patterns(&self) -> ConsolidationReport {
        let floor = self.config.min_confidence / 2.0;
        let batch = self.config.batch_size.max(1);
        let mut report = ConsolidationReport::default();

        let keys: Vec<String> = self.patterns.read().keys().cloned().collect();
        for chunk in keys.chunks(batch) {
            {
                let mut table = self.patterns.write();
                for key in chunk {
                    let Some(group) = table.get_mut(key) else {
                        continue;
                    };
                    if group.len() > 1 {
                        let mut merged = group.remove(0);
                        for duplicate in group.drain(..) {
                            merged.absorb(&duplicate);
                            report.merged += 1;
                        }
                        group.push(merged);
                    }

                    let before = group.len();
                    group.retain(|p| p.confidence >= floor);
                    report.evicted += before - group.len();
                    if group.is_empty() {
                        table.remove(key);
                    }
                }
            }
            tokio::task::yield_now().await;
        }
        report.remaining = self.patterns.read().values().map(Vec::len).sum();

        info!(
            evicted = report.evicted,
            merged = report.merged,
            pattern_count = report.remaining,
            "Consolidated patterns"
        );
        report
    }

    /// Purge statistics older than the feedback window, `batch_size`
    /// removals at a time
    pub async fn cleanup_metrics(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let window =
            chrono::Duration::from_std(self.config.feedback_window).context("Feedback window out of range")?;
        let cutoff = now - window;
        let batch = self.config.batch_size.max(1);
        let mut report = CleanupReport::default();

        let stale_artifacts: Vec<ArtifactId> = self
            .artifacts
            .iter()
            .filter(|entry| entry.last_accessed < cutoff)
            .map(|entry| *entry.key())
            .collect();
        for chunk in stale_artifacts.chunks(batch) {
            for id in chunk {
                // Re-checked under the entry lock: a concurrent event may have refreshed it
                if self.artifacts.remove_if(id, |_, s| s.last_accessed < cutoff).is_some() {
                    report.artifacts_purged += 1;
                }
            }
            tokio::task::yield_now().await;
        }

        let stale_sessions: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.last_activity < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        for chunk in stale_sessions.chunks(batch) {
            for id in chunk {
                if self.sessions.remove_if(id, |_, s| s.last_activity < cutoff).is_some() {
                    report.sessions_purged += 1;
                }
            }
            tokio::task::yield_now().await;
        }

        info!(
            artifacts_purged = report.artifacts_purged,
            sessions_purged = report.sessions_purged,
            artifact_metrics_count = self.artifacts.len(),
            session_metrics_count = self.sessions.len(),
            "Cleaned up old metrics"
        );
        Ok(report)
    }

    pub fn learning_stats(&self) -> LearningStats {
        let (success_patterns, failure_patterns) = {
            let table = self.patterns.read();
            table.values().flatten().fold((0, 0), |(s, f), p| match p.kind {
                PatternKind::Success => (s + 1, f),
                PatternKind::Failure => (s, f + 1),
            })
        };

        let mut total_success = 0.0;
        let mut total_satisfaction = 0.0;
        let mut count = 0usize;
        for entry in self.artifacts.iter() {
            total_success += entry.success_rate;
            total_satisfaction += entry.satisfaction;
            count += 1;
        }
        let average = |total: f64| (count > 0).then(|| total / count as f64);

        LearningStats {
            tracked_artifacts: count,
            active_sessions: self.sessions.len(),
            success_patterns,
            failure_patterns,
            average_success_rate: average(total_success),
            average_satisfaction: average(total_satisfaction),
            learning_rate: self.config.learning_rate,
            decay_rate: self.config.decay_rate,
            min_confidence: self.config.min_confidence,
        }
    }

    /// Snapshot of every pattern, highest confidence first
    pub fn patterns(&self) -> Vec<Pattern> {
        let mut all: Vec<Pattern> = self.patterns.read().values().flatten().cloned().collect();
        all.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key().cmp(&b.key()))
        });
        all
    }

    pub fn artifact_stats(&self, id: ArtifactId) -> Option<ArtifactStats> {
        self.artifacts.get(&id).map(|s| s.clone())
    }

    pub fn session_stats(&self, session_id: &str) -> Option<SessionStats> {
        self.sessions.get(session_id).map(|s| s.clone())
    }
}

impl ArtifactRanker for LearningEngine {
    fn rank_order(&self, artifacts: &[Artifact]) -> Vec<ArtifactId> {
        self.rank(artifacts).into_iter().map(|r| r.artifact.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alembic_core::domain::artifact::PhaseName;
    use alembic_core::infrastructure::repositories::InMemoryArtifactRepository;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn engine() -> (Arc<LearningEngine>, Arc<InMemoryArtifactRepository>) {
        let repo = Arc::new(InMemoryArtifactRepository::new());
        let engine = Arc::new(LearningEngine::new(
            LearningConfig::default(),
            repo.clone(),
            EventBus::new(64),
        ));
        (engine, repo)
    }

    fn artifact(backend: &str) -> Artifact {
        Artifact::new("prompt", PhaseName::refinement(), backend, "m")
    }

    fn usage(artifact: &Artifact, effectiveness: f64) -> UsageEvent {
        UsageEvent::for_artifact(artifact, effectiveness, "session-1", Duration::from_millis(40))
    }

    #[tokio::test]
    async fn test_success_pattern_running_average() {
        let (engine, repo) = engine();
        let a = artifact("primary");
        repo.save(&a).await.unwrap();

        engine.record_usage(usage(&a, 0.9)).await;
        let patterns = engine.patterns();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Success);
        assert_eq!(patterns[0].confidence, 0.9);
        assert_eq!(patterns[0].observation_count, 1);

        engine.record_usage(usage(&a, 0.95)).await;
        let patterns = engine.patterns();
        assert_eq!(patterns.len(), 1);
        assert!((patterns[0].confidence - 0.925).abs() < 1e-12);
        assert_eq!(patterns[0].observation_count, 2);
    }

    #[tokio::test]
    async fn test_record_usage_updates_stored_artifact() {
        let (engine, repo) = engine();
        let a = artifact("primary");
        repo.save(&a).await.unwrap();

        engine.record_usage(usage(&a, 1.0)).await;
        let stored = repo.find_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
        assert!((stored.relevance_score - 0.55).abs() < 1e-12);
        assert_eq!(repo.find_usage(a.id).await.unwrap().len(), 1);
        assert_eq!(engine.session_stats("session-1").unwrap().events, 1);
    }

    #[tokio::test]
    async fn test_invalid_event_is_dropped() {
        let (engine, _) = engine();
        let a = artifact("primary");
        engine.record_usage(usage(&a, 1.5)).await;
        assert!(engine.artifact_stats(a.id).is_none());
        assert!(engine.patterns().is_empty());
    }

    #[tokio::test]
    async fn test_failure_pattern_uses_inverse_confidence() {
        let (engine, _) = engine();
        let a = artifact("primary");
        engine.record_usage(usage(&a, 0.1).with_error("truncated")).await;
        let patterns = engine.patterns();
        assert_eq!(patterns[0].kind, PatternKind::Failure);
        assert!((patterns[0].confidence - 0.9).abs() < 1e-12);
        assert_eq!(engine.learning_stats().failure_patterns, 1);
    }

    #[tokio::test]
    async fn test_rank_prefers_matching_success_patterns() {
        let (engine, _) = engine();
        let boosted = artifact("primary");
        let plain = artifact("secondary");

        // Teaches a success pattern for the "primary" backend only
        let exemplar = artifact("primary");
        engine.record_usage(usage(&exemplar, 0.95)).await;

        let ranked = engine.rank(&[plain.clone(), boosted.clone()]);
        assert_eq!(ranked[0].artifact.id, boosted.id);
        assert!((ranked[0].composite_score - 0.5 * 1.095).abs() < 1e-12);
        assert!((ranked[1].composite_score - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_rank_is_idempotent() {
        let (engine, _) = engine();
        let mut list = Vec::new();
        for i in 0..6 {
            let a = artifact("primary").with_relevance(0.1 * i as f64);
            engine.record_usage(usage(&a, 0.5 + 0.08 * i as f64)).await;
            list.push(a);
        }
        let first: Vec<ArtifactId> = engine.rank(&list).into_iter().map(|r| r.artifact.id).collect();
        let second: Vec<ArtifactId> = engine.rank(&list).into_iter().map(|r| r.artifact.id).collect();
        assert_eq!(first, second);
        assert_eq!(engine.rank_order(&list), first);
    }

    #[tokio::test]
    async fn test_rank_ties_prefer_recent_use() {
        let (engine, _) = engine();
        let mut older = artifact("primary");
        let mut newer = artifact("primary");
        older.last_used = Some(Utc::now() - ChronoDuration::hours(5));
        newer.last_used = Some(Utc::now());
        let ranked = engine.rank(&[older.clone(), newer.clone()]);
        assert_eq!(ranked[0].artifact.id, newer.id);
    }

    #[tokio::test]
    async fn test_decay_bounds() {
        let (engine, repo) = engine();
        let now = Utc::now();
        let mut stale = artifact("primary").with_relevance(0.8);
        stale.last_used = Some(now - ChronoDuration::days(10));
        let mut ancient = artifact("primary").with_relevance(0.05);
        ancient.last_used = Some(now - ChronoDuration::days(400));
        let mut fresh = artifact("primary").with_relevance(0.8);
        fresh.last_used = Some(now - ChronoDuration::days(1));
        for a in [&stale, &ancient, &fresh] {
            repo.save(a).await.unwrap();
        }

        let report = engine.decay_pass(now).await.unwrap();
        assert_eq!(report, DecayReport { scanned: 2, decayed: 2 });

        let stale_after = repo.find_by_id(stale.id).await.unwrap().unwrap();
        assert!((stale_after.relevance_score - 0.7).abs() < 1e-9);
        assert_eq!(repo.find_by_id(ancient.id).await.unwrap().unwrap().relevance_score, 0.0);
        assert_eq!(repo.find_by_id(fresh.id).await.unwrap().unwrap().relevance_score, 0.8);

        // A second pass at the same instant charges nothing
        let again = engine.decay_pass(now).await.unwrap();
        assert_eq!(again.decayed, 0);
    }

    #[tokio::test]
    async fn test_decay_pages_through_batches() {
        let repo = Arc::new(InMemoryArtifactRepository::new());
        let config = LearningConfig {
            batch_size: 2,
            ..LearningConfig::default()
        };
        let engine = LearningEngine::new(config, repo.clone(), EventBus::new(8));
        let now = Utc::now();
        for _ in 0..5 {
            let mut a = artifact("primary");
            a.last_used = Some(now - ChronoDuration::days(30));
            repo.save(&a).await.unwrap();
        }
        let report = engine.decay_pass(now).await.unwrap();
        assert_eq!(report.scanned, 5);
        assert_eq!(report.decayed, 5);
    }

    #[tokio::test]
    async fn test_consolidation_evicts_and_merges() {
        let (engine, _) = engine();
        let now = Utc::now();
        let strong = FeatureSignature::new().with("outcome", "high_effectiveness");
        let weak = FeatureSignature::new().with("outcome", "low_effectiveness");
        engine.restore_patterns(vec![
            Pattern::new(PatternKind::Success, strong.clone(), 0.7, now),
            Pattern::new(PatternKind::Success, strong, 0.9, now),
            Pattern::new(PatternKind::Failure, weak, 0.2, now),
        ]);

        let report = engine.consolidate_patterns().await;
        assert_eq!(report, ConsolidationReport { evicted: 1, merged: 1, remaining: 1 });

        let patterns = engine.patterns();
        assert_eq!(patterns.len(), 1);
        assert!((patterns[0].confidence - 0.8).abs() < 1e-12);
        assert_eq!(patterns[0].observation_count, 2);
    }

    #[tokio::test]
    async fn test_consolidation_works_in_chunks() {
        let config = LearningConfig {
            batch_size: 2,
            ..LearningConfig::default()
        };
        let engine = LearningEngine::new(config, Arc::new(InMemoryArtifactRepository::new()), EventBus::new(8));
        let now = Utc::now();

        let mut restored = Vec::new();
        for i in 0..5 {
            let signature = FeatureSignature::new().with("backend", format!("b{}", i));
            restored.push(Pattern::new(PatternKind::Success, signature.clone(), 0.8, now));
            restored.push(Pattern::new(PatternKind::Success, signature, 0.6, now));
        }
        let faint = FeatureSignature::new().with("backend", "faint");
        restored.push(Pattern::new(PatternKind::Success, faint, 0.1, now));
        engine.restore_patterns(restored);

        let report = engine.consolidate_patterns().await;
        assert_eq!(report, ConsolidationReport { evicted: 1, merged: 5, remaining: 5 });
        assert!(engine.patterns().iter().all(|p| (p.confidence - 0.7).abs() < 1e-12));

        // A consolidated table is a fixed point
        let again = engine.consolidate_patterns().await;
        assert_eq!(again, ConsolidationReport { evicted: 0, merged: 0, remaining: 5 });
    }

    #[tokio::test]
    async fn test_cleanup_respects_feedback_window() {
        let (engine, _) = engine();
        let now = Utc::now();
        let old = artifact("primary");
        let recent = artifact("primary");

        engine
            .record_usage(
                UsageEvent::new(old.id, 0.5, "old-session", Duration::ZERO).at(now - ChronoDuration::hours(30)),
            )
            .await;
        engine
            .record_usage(
                UsageEvent::new(recent.id, 0.5, "new-session", Duration::ZERO).at(now - ChronoDuration::hours(2)),
            )
            .await;

        let report = engine.cleanup_metrics(now).await.unwrap();
        assert_eq!(report, CleanupReport { artifacts_purged: 1, sessions_purged: 1 });
        assert!(engine.artifact_stats(old.id).is_none());
        assert!(engine.artifact_stats(recent.id).is_some());
        assert!(engine.session_stats("new-session").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_usage_loses_no_updates() {
        let (engine, repo) = engine();
        let a = artifact("primary");
        repo.save(&a).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..40 {
            let engine = engine.clone();
            let event = UsageEvent::for_artifact(&a, 0.5, format!("s{}", i % 4), Duration::from_millis(10));
            handles.push(tokio::spawn(async move { engine.record_usage(event).await }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(engine.artifact_stats(a.id).unwrap().observations, 40);
        assert_eq!(repo.find_by_id(a.id).await.unwrap().unwrap().usage_count, 40);
        assert_eq!(engine.learning_stats().active_sessions, 4);
    }
}
