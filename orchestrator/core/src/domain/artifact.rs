// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Artifact
//!
//! Generated text candidates and the phase vocabulary that produces them.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Artifact aggregate, identity and lineage
//!
//! An artifact is created by the phase orchestrator or the optimization loop.
//! Afterwards only the learning side touches its relevance/usage fields, and
//! persistence belongs to the storage collaborator. Nothing in this crate
//! deletes an artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Relevance assigned to a freshly generated artifact before any usage is observed
pub const INITIAL_RELEVANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(pub Uuid);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of one stage of the generation pipeline.
///
/// Phases are open-ended; the well-known ones below make up the default
/// extraction → rewriting → refinement pipeline, and `optimization` tags
/// artifacts produced by the iterative optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseName(String);

impl PhaseName {
    pub const EXTRACTION: &'static str = "extraction";
    pub const REWRITING: &'static str = "rewriting";
    pub const REFINEMENT: &'static str = "refinement";
    pub const OPTIMIZATION: &'static str = "optimization";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn extraction() -> Self {
        Self::new(Self::EXTRACTION)
    }

    pub fn rewriting() -> Self {
        Self::new(Self::REWRITING)
    }

    pub fn refinement() -> Self {
        Self::new(Self::REFINEMENT)
    }

    pub fn optimization() -> Self {
        Self::new(Self::OPTIMIZATION)
    }

    /// The default three-stage pipeline, in execution order
    pub fn default_pipeline() -> Vec<PhaseName> {
        vec![Self::extraction(), Self::rewriting(), Self::refinement()]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhaseName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub content: String,
    pub phase: PhaseName,

    /// Registry name of the backend that produced the content
    pub backend: String,

    /// Model identifier reported by the backend
    pub model: String,

    /// Decaying, usage-boostable weight in [0, 1]
    pub relevance_score: f64,
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,

    /// Last time background decay was applied; decay never re-charges the same interval twice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decayed: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Lineage: the artifact this one was derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ArtifactId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    #[serde(default)]
    pub tokens_used: u32,

    /// Sampling temperature the content was generated with, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        content: impl Into<String>,
        phase: PhaseName,
        backend: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: ArtifactId::new(),
            content: content.into(),
            phase,
            backend: backend.into(),
            model: model.into(),
            relevance_score: INITIAL_RELEVANCE,
            usage_count: 0,
            last_used: None,
            last_decayed: None,
            embedding: None,
            parent: None,
            persona: None,
            tokens_used: 0,
            temperature: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_parent(mut self, parent: ArtifactId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_persona(mut self, persona: Option<String>) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_tokens_used(mut self, tokens: u32) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance_score = clamp_unit(relevance);
        self
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Apply one observed use.
    ///
    /// Relevance moves toward `effectiveness` as an exponential moving
    /// average; `usage_count` only ever grows and `last_used` never moves
    /// backwards when events arrive out of order.
    pub fn record_use(&mut self, used_at: DateTime<Utc>, effectiveness: f64, learning_rate: f64) {
        let rate = clamp_unit(learning_rate);
        self.relevance_score =
            clamp_unit(rate * clamp_unit(effectiveness) + (1.0 - rate) * self.relevance_score);
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used = Some(match self.last_used {
            Some(previous) if previous > used_at => previous,
            _ => used_at,
        });
    }

    /// Linear time decay: `max(0, relevance - decay_rate * days_since_last_use)`.
    ///
    /// Days are counted from the later of `last_used` and the previous decay so
    /// repeated maintenance ticks charge each elapsed day exactly once.
    /// Returns the relevance before decay, or `None` when nothing changed.
    pub fn apply_decay(&mut self, now: DateTime<Utc>, decay_rate: f64) -> Option<f64> {
        let last_used = self.last_used?;
        let anchor = match self.last_decayed {
            Some(decayed) if decayed > last_used => decayed,
            _ => last_used,
        };
        let days = (now - anchor).num_seconds() as f64 / 86_400.0;
        if days <= 0.0 || decay_rate <= 0.0 {
            return None;
        }

        let old = self.relevance_score;
        self.relevance_score = (old - decay_rate * days).max(0.0).min(old);
        self.last_decayed = Some(now);
        Some(old)
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn artifact() -> Artifact {
        Artifact::new("draft", PhaseName::extraction(), "primary", "model-a")
    }

    #[test]
    fn test_new_artifact_defaults() {
        let a = artifact();
        assert_eq!(a.relevance_score, INITIAL_RELEVANCE);
        assert_eq!(a.usage_count, 0);
        assert!(a.last_used.is_none());
        assert!(!a.has_embedding());
    }

    #[test]
    fn test_record_use_moves_relevance_toward_effectiveness() {
        let mut a = artifact();
        let now = Utc::now();
        a.record_use(now, 1.0, 0.1);
        assert!((a.relevance_score - 0.55).abs() < 1e-9);
        assert_eq!(a.usage_count, 1);
        assert_eq!(a.last_used, Some(now));
    }

    #[test]
    fn test_record_use_keeps_latest_timestamp() {
        let mut a = artifact();
        let now = Utc::now();
        a.record_use(now, 0.5, 0.1);
        a.record_use(now - Duration::hours(2), 0.5, 0.1);
        assert_eq!(a.last_used, Some(now));
        assert_eq!(a.usage_count, 2);
    }

    #[test]
    fn test_decay_is_bounded() {
        let now = Utc::now();
        let mut a = artifact().with_relevance(0.8);
        a.last_used = Some(now - Duration::days(10));
        let old = a.apply_decay(now, 0.01).unwrap();
        assert_eq!(old, 0.8);
        assert!((a.relevance_score - 0.7).abs() < 1e-6);

        let mut stale = artifact().with_relevance(0.2);
        stale.last_used = Some(now - Duration::days(1000));
        stale.apply_decay(now, 0.01);
        assert_eq!(stale.relevance_score, 0.0);
    }

    #[test]
    fn test_decay_does_not_charge_twice() {
        let now = Utc::now();
        let mut a = artifact().with_relevance(0.8);
        a.last_used = Some(now - Duration::days(10));
        a.apply_decay(now, 0.01);
        let after_first = a.relevance_score;
        assert!(a.apply_decay(now, 0.01).is_none());
        assert_eq!(a.relevance_score, after_first);
    }

    #[test]
    fn test_never_used_artifact_does_not_decay() {
        let mut a = artifact();
        assert!(a.apply_decay(Utc::now(), 0.5).is_none());
        assert_eq!(a.relevance_score, INITIAL_RELEVANCE);
    }
}
