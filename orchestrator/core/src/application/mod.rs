// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod phase_orchestrator;
pub mod optimizer;
pub mod selection;
pub mod ranking;
pub mod generation;

// Re-export use cases for convenience
pub use phase_orchestrator::{OrchestratorError, PhaseFailure, PhaseOrchestrator, PhaseRequest, PhaseRun};
pub use optimizer::{IterativeOptimizer, OptimizationBudget, OptimizationError, OptimizationResult, Termination};
pub use ranking::{cosine_similarity, ArtifactScore, MultiFactorRanker, Ranking, RankingFactors};
pub use selection::{ArtifactRanker, CandidateSelector, SelectionError, SelectionOutcome, SelectionScore};
pub use generation::{GenerateOutcome, GenerateRequest, GenerationService, OptimizeOutcome, OptimizeRequest, StandardGenerationService};
