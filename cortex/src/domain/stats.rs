// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Per-artifact and per-session learning statistics.
//
// All averages are exponential moving averages with weight `alpha`
// (the configured learning rate), starting from zero except latency, whose
// first observation is taken as-is.

use alembic_core::domain::artifact::ArtifactId;
use alembic_core::domain::usage::UsageEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Effectiveness above which a use counts as a success
pub const SUCCESS_EFFECTIVENESS: f64 = 0.7;

/// Most recent artifacts remembered per session
pub const MAX_SESSION_SEQUENCE: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactStats {
    pub artifact_id: ArtifactId,
    pub success_rate: f64,

    #[serde(with = "humantime_serde")]
    pub avg_latency: Duration,
    pub satisfaction: f64,
    pub observations: u64,
    pub last_accessed: DateTime<Utc>,
}

impl ArtifactStats {
    pub fn new(artifact_id: ArtifactId, at: DateTime<Utc>) -> Self {
        Self {
            artifact_id,
            success_rate: 0.0,
            avg_latency: Duration::ZERO,
            satisfaction: 0.0,
            observations: 0,
            last_accessed: at,
        }
    }

    pub fn observe(&mut self, event: &UsageEvent, alpha: f64) {
        let success = if event.effectiveness > SUCCESS_EFFECTIVENESS { 1.0 } else { 0.0 };
        self.success_rate = ema(alpha, success, self.success_rate);

        if !event.latency.is_zero() {
            self.avg_latency = if self.avg_latency.is_zero() {
                event.latency
            } else {
                Duration::from_secs_f64(ema(
                    alpha,
                    event.latency.as_secs_f64(),
                    self.avg_latency.as_secs_f64(),
                ))
            };
        }

        if let Some(rating) = event.satisfaction() {
            self.satisfaction = ema(alpha, rating, self.satisfaction);
        }

        self.observations += 1;
        if event.timestamp > self.last_accessed {
            self.last_accessed = event.timestamp;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub events: u64,
    pub mean_effectiveness: f64,

    /// Latest artifacts consumed in this session, in arrival order, at most
    /// `MAX_SESSION_SEQUENCE` of them
    pub sequence: VecDeque<ArtifactId>,
}

impl SessionStats {
    pub fn new(session_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            start_time: at,
            last_activity: at,
            events: 0,
            mean_effectiveness: 0.0,
            sequence: VecDeque::new(),
        }
    }

    pub fn observe(&mut self, event: &UsageEvent) {
        let n = self.events as f64;
        self.mean_effectiveness = (self.mean_effectiveness * n + event.effectiveness) / (n + 1.0);
        self.events += 1;
        if self.sequence.len() == MAX_SESSION_SEQUENCE {
            self.sequence.pop_front();
        }
        self.sequence.push_back(event.artifact_id);
        if event.timestamp < self.start_time {
            self.start_time = event.timestamp;
        }
        if event.timestamp > self.last_activity {
            self.last_activity = event.timestamp;
        }
    }
}

/// Snapshot returned by `LearningEngine::learning_stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub tracked_artifacts: usize,
    pub active_sessions: usize,
    pub success_patterns: usize,
    pub failure_patterns: usize,
    pub average_success_rate: Option<f64>,
    pub average_satisfaction: Option<f64>,
    pub learning_rate: f64,
    pub decay_rate: f64,
    pub min_confidence: f64,
}

fn ema(alpha: f64, value: f64, previous: f64) -> f64 {
    alpha * value + (1.0 - alpha) * previous
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(effectiveness: f64, latency_ms: u64) -> UsageEvent {
        UsageEvent::new(ArtifactId::new(), effectiveness, "s", Duration::from_millis(latency_ms))
    }

    #[test]
    fn test_success_rate_ema() {
        let mut stats = ArtifactStats::new(ArtifactId::new(), Utc::now());
        stats.observe(&event(0.9, 0), 0.1);
        assert!((stats.success_rate - 0.1).abs() < 1e-12);
        stats.observe(&event(0.5, 0), 0.1);
        assert!((stats.success_rate - 0.09).abs() < 1e-12);
        assert_eq!(stats.observations, 2);
    }

    #[test]
    fn test_first_latency_taken_as_is() {
        let mut stats = ArtifactStats::new(ArtifactId::new(), Utc::now());
        stats.observe(&event(0.5, 200), 0.1);
        assert_eq!(stats.avg_latency, Duration::from_millis(200));
        stats.observe(&event(0.5, 100), 0.1);
        assert!((stats.avg_latency.as_secs_f64() - 0.19).abs() < 1e-6);
    }

    #[test]
    fn test_satisfaction_from_feedback() {
        let mut stats = ArtifactStats::new(ArtifactId::new(), Utc::now());
        stats.observe(&event(0.5, 0).with_feedback(5), 0.5);
        assert!((stats.satisfaction - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_session_mean() {
        let mut session = SessionStats::new("s", Utc::now());
        session.observe(&event(0.2, 0));
        session.observe(&event(0.6, 0));
        assert_eq!(session.events, 2);
        assert!((session.mean_effectiveness - 0.4).abs() < 1e-12);
        assert_eq!(session.sequence.len(), 2);
    }

    #[test]
    fn test_session_sequence_is_capped() {
        let mut session = SessionStats::new("s", Utc::now());
        let events: Vec<UsageEvent> = (0..MAX_SESSION_SEQUENCE + 10).map(|_| event(0.5, 0)).collect();
        for e in &events {
            session.observe(e);
        }
        assert_eq!(session.events, (MAX_SESSION_SEQUENCE + 10) as u64);
        assert_eq!(session.sequence.len(), MAX_SESSION_SEQUENCE);
        assert_eq!(session.sequence.front(), Some(&events[10].artifact_id));
        assert_eq!(session.sequence.back(), events.last().map(|e| &e.artifact_id));
    }
}
