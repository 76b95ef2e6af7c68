// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod learning_engine;
pub mod maintenance;
pub mod embedding_worker;

pub use learning_engine::{CleanupReport, ConsolidationReport, DecayReport, LearningEngine, RankedArtifact};
pub use maintenance::MaintenanceScheduler;
pub use embedding_worker::{EmbeddingReport, EmbeddingWorker, SimilarArtifact};
