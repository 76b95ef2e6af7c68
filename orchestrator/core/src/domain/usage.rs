// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Usage events: what happened when an artifact was consumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::artifact::{Artifact, ArtifactId, PhaseName};

/// An immutable observation of one artifact being consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub artifact_id: ArtifactId,

    /// How well the artifact served its purpose, in [0, 1]
    pub effectiveness: f64,

    pub session_id: String,

    #[serde(with = "humantime_serde")]
    pub latency: Duration,

    /// Optional 1-5 rating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<u8>,

    pub timestamp: DateTime<Utc>,

    /// Context items that were supplied with the request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // Attributes of the consumed artifact, carried so learned patterns can be
    // matched back against artifacts at ranking time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PhaseName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum UsageError {
    #[error("effectiveness {0} is outside [0, 1]")]
    EffectivenessOutOfRange(f64),

    #[error("user feedback {0} is outside 1-5")]
    FeedbackOutOfRange(u8),

    #[error("session id must not be empty")]
    EmptySession,
}

impl UsageEvent {
    pub fn new(
        artifact_id: ArtifactId,
        effectiveness: f64,
        session_id: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            artifact_id,
            effectiveness,
            session_id: session_id.into(),
            latency,
            user_feedback: None,
            timestamp: Utc::now(),
            context: Vec::new(),
            error: None,
            phase: None,
            backend: None,
            persona: None,
        }
    }

    /// Build an event for `artifact`, copying its pattern-relevant attributes
    pub fn for_artifact(
        artifact: &Artifact,
        effectiveness: f64,
        session_id: impl Into<String>,
        latency: Duration,
    ) -> Self {
        let mut event = Self::new(artifact.id, effectiveness, session_id, latency);
        event.phase = Some(artifact.phase.clone());
        event.backend = Some(artifact.backend.clone());
        event.persona = artifact.persona.clone();
        event
    }

    pub fn with_feedback(mut self, rating: u8) -> Self {
        self.user_feedback = Some(rating);
        self
    }

    pub fn with_context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn validate(&self) -> Result<(), UsageError> {
        if !(0.0..=1.0).contains(&self.effectiveness) {
            return Err(UsageError::EffectivenessOutOfRange(self.effectiveness));
        }
        if let Some(rating) = self.user_feedback {
            if !(1..=5).contains(&rating) {
                return Err(UsageError::FeedbackOutOfRange(rating));
            }
        }
        if self.session_id.is_empty() {
            return Err(UsageError::EmptySession);
        }
        Ok(())
    }

    /// Feedback rating mapped onto [0, 1]
    pub fn satisfaction(&self) -> Option<f64> {
        self.user_feedback.map(|rating| f64::from(rating) / 5.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let id = ArtifactId::new();
        let event = UsageEvent::new(id, 1.2, "s", Duration::from_millis(10));
        assert_eq!(event.validate(), Err(UsageError::EffectivenessOutOfRange(1.2)));

        let event = UsageEvent::new(id, 0.5, "s", Duration::ZERO).with_feedback(9);
        assert_eq!(event.validate(), Err(UsageError::FeedbackOutOfRange(9)));

        let event = UsageEvent::new(id, 0.5, "", Duration::ZERO);
        assert_eq!(event.validate(), Err(UsageError::EmptySession));
    }

    #[test]
    fn test_for_artifact_copies_attributes() {
        let artifact = Artifact::new("x", PhaseName::rewriting(), "local", "m")
            .with_persona(Some("code".to_string()));
        let event = UsageEvent::for_artifact(&artifact, 0.9, "s1", Duration::from_millis(5))
            .with_feedback(4);

        assert_eq!(event.artifact_id, artifact.id);
        assert_eq!(event.phase, Some(PhaseName::rewriting()));
        assert_eq!(event.backend.as_deref(), Some("local"));
        assert_eq!(event.persona.as_deref(), Some("code"));
        assert_eq!(event.satisfaction(), Some(0.8));
        assert!(event.validate().is_ok());
    }
}
