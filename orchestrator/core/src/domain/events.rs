// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::artifact::{ArtifactId, PhaseName};

/// Phase orchestration events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GenerationEvent {
    PhaseFailed {
        run_id: Uuid,
        phase: PhaseName,
        backend: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
    FallbackUsed {
        run_id: Uuid,
        phase: PhaseName,
        primary: String,
        fallback: String,
        used_at: DateTime<Utc>,
    },
    GenerationCompleted {
        run_id: Uuid,
        artifact_count: usize,
        failed_phases: Vec<PhaseName>,
        completed_at: DateTime<Utc>,
    },
}

/// Optimization and selection events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OptimizationEvent {
    OptimizationCompleted {
        artifact_id: ArtifactId,
        original_score: f64,
        final_score: f64,
        iterations: usize,
        converged: bool,
        completed_at: DateTime<Utc>,
    },
    CandidateSelected {
        artifact_id: ArtifactId,
        score: f64,
        candidate_count: usize,
        selected_at: DateTime<Utc>,
    },
}

/// Background maintenance jobs owned by the learning side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceTask {
    Decay,
    Consolidation,
    Cleanup,
    Embedding,
}

impl MaintenanceTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceTask::Decay => "decay",
            MaintenanceTask::Consolidation => "consolidation",
            MaintenanceTask::Cleanup => "cleanup",
            MaintenanceTask::Embedding => "embedding",
        }
    }
}

impl fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learning engine events. Every maintenance tick emits either its
/// completion event or `MaintenanceFailed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LearningEvent {
    PatternUpserted {
        kind: String,
        signature: String,
        confidence: f64,
        observation_count: u64,
        updated_at: DateTime<Utc>,
    },
    DecayApplied {
        scanned: usize,
        decayed: usize,
        applied_at: DateTime<Utc>,
    },
    PatternsConsolidated {
        evicted: usize,
        merged: usize,
        remaining: usize,
        consolidated_at: DateTime<Utc>,
    },
    MetricsCleaned {
        artifacts_purged: usize,
        sessions_purged: usize,
        cleaned_at: DateTime<Utc>,
    },
    EmbeddingsGenerated {
        embedded: usize,
        failed: usize,
        related_pairs: usize,
        generated_at: DateTime<Utc>,
    },
    MaintenanceFailed {
        task: MaintenanceTask,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl LearningEvent {
    /// Maintenance task this event reports on, if any
    pub fn task(&self) -> Option<MaintenanceTask> {
        match self {
            LearningEvent::PatternUpserted { .. } => None,
            LearningEvent::DecayApplied { .. } => Some(MaintenanceTask::Decay),
            LearningEvent::PatternsConsolidated { .. } => Some(MaintenanceTask::Consolidation),
            LearningEvent::MetricsCleaned { .. } => Some(MaintenanceTask::Cleanup),
            LearningEvent::EmbeddingsGenerated { .. } => Some(MaintenanceTask::Embedding),
            LearningEvent::MaintenanceFailed { task, .. } => Some(*task),
        }
    }
}
