// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Learned usage patterns.
//!
//! A pattern records that usage events sharing a feature signature tend to
//! succeed (or fail). Confidence is a running average over every observation
//! and stays within [0, 1].

use alembic_core::domain::artifact::Artifact;
use alembic_core::domain::usage::UsageEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Effectiveness above which a usage event feeds a success pattern
pub const SUCCESS_THRESHOLD: f64 = 0.8;

/// Effectiveness below which a usage event feeds a failure pattern
pub const FAILURE_THRESHOLD: f64 = 0.3;

const PHASE_KEY: &str = "phase";
const BACKEND_KEY: &str = "backend";
const PERSONA_KEY: &str = "persona";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Success,
    Failure,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Success => "success",
            PatternKind::Failure => "failure",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered feature map identifying a pattern
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSignature(BTreeMap<String, String>);

impl FeatureSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable text form; equal signatures always produce equal keys
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Whether the artifact-attribute features (phase, backend, persona)
    /// agree with `artifact`. Features the signature does not carry are
    /// ignored, so a signature without any of them matches every artifact.
    pub fn matches(&self, artifact: &Artifact) -> bool {
        let phase_ok = self.get(PHASE_KEY).is_none_or(|p| p == artifact.phase.as_str());
        let backend_ok = self.get(BACKEND_KEY).is_none_or(|b| b == artifact.backend);
        let persona_ok = self
            .get(PERSONA_KEY)
            .is_none_or(|p| artifact.persona.as_deref() == Some(p));
        phase_ok && backend_ok && persona_ok
    }

    /// Derive (kind, signature, confidence) from a usage event, if the event
    /// is decisive enough to teach anything
    pub fn detect(event: &UsageEvent) -> Option<(PatternKind, FeatureSignature, f64)> {
        let (kind, base, confidence) = if event.effectiveness > SUCCESS_THRESHOLD {
            (
                PatternKind::Success,
                FeatureSignature::new()
                    .with("outcome", "high_effectiveness")
                    .with("context_length", event.context.len().to_string()),
                event.effectiveness,
            )
        } else if event.effectiveness < FAILURE_THRESHOLD {
            (
                PatternKind::Failure,
                FeatureSignature::new()
                    .with("outcome", "low_effectiveness")
                    .with("error_type", event.error.clone().unwrap_or_default()),
                1.0 - event.effectiveness,
            )
        } else {
            return None;
        };

        let mut signature = base;
        if let Some(phase) = &event.phase {
            signature = signature.with(PHASE_KEY, phase.as_str());
        }
        if let Some(backend) = &event.backend {
            signature = signature.with(BACKEND_KEY, backend.clone());
        }
        if let Some(persona) = &event.persona {
            signature = signature.with(PERSONA_KEY, persona.clone());
        }
        Some((kind, signature, confidence))
    }
}

/// Table key for a (kind, signature) pair
pub fn pattern_key(kind: PatternKind, signature: &FeatureSignature) -> String {
    format!("{}:{}", kind, signature.canonical())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub kind: PatternKind,
    pub signature: FeatureSignature,
    pub confidence: f64,
    pub observation_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl Pattern {
    pub fn new(kind: PatternKind, signature: FeatureSignature, confidence: f64, at: DateTime<Utc>) -> Self {
        Self {
            id: PatternId::new(),
            kind,
            signature,
            confidence: confidence.clamp(0.0, 1.0),
            observation_count: 1,
            last_updated: at,
        }
    }

    pub fn key(&self) -> String {
        pattern_key(self.kind, &self.signature)
    }

    /// Fold one more observation into the running average
    pub fn observe(&mut self, confidence: f64, at: DateTime<Utc>) {
        let n = self.observation_count as f64;
        self.confidence = ((self.confidence * n + confidence.clamp(0.0, 1.0)) / (n + 1.0)).clamp(0.0, 1.0);
        self.observation_count += 1;
        if at > self.last_updated {
            self.last_updated = at;
        }
    }

    /// Merge a duplicate of the same (kind, signature), weighting each side
    /// by its observation count
    pub fn absorb(&mut self, other: &Pattern) {
        let total = self.observation_count + other.observation_count;
        if total > 0 {
            self.confidence = ((self.confidence * self.observation_count as f64
                + other.confidence * other.observation_count as f64)
                / total as f64)
                .clamp(0.0, 1.0);
        }
        self.observation_count = total;
        if other.last_updated > self.last_updated {
            self.last_updated = other.last_updated;
        }
    }
}
