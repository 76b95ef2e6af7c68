// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Maintenance Scheduler - periodic background upkeep of learning state
//!
//! Runs relevance decay, pattern consolidation, metrics cleanup and
//! (optionally) embedding generation as independent tokio tasks, each on its
//! own interval. A single cancellation token stops all of them.
//!
//! Every tick publishes either the task's completion event or
//! `LearningEvent::MaintenanceFailed`, and increments
//! `alembic_maintenance_ticks_total{task, outcome}`. A failed tick is retried
//! on the next one; it never stops the loop. Shutdown interrupts a cycle that
//! is still running.

use alembic_core::domain::events::{LearningEvent, MaintenanceTask};
use alembic_core::infrastructure::event_bus::EventBus;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::application::embedding_worker::EmbeddingWorker;
use crate::application::learning_engine::LearningEngine;

pub struct MaintenanceScheduler {
    engine: Arc<LearningEngine>,
    embedding: Option<Arc<EmbeddingWorker>>,
    event_bus: EventBus,
    shutdown_token: CancellationToken,
}

impl MaintenanceScheduler {
    pub fn new(engine: Arc<LearningEngine>, event_bus: EventBus) -> Self {
        Self {
            engine,
            embedding: None,
            event_bus,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn with_embedding_worker(mut self, worker: Arc<EmbeddingWorker>) -> Self {
        self.embedding = Some(worker);
        self
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Tasks that `start` will schedule, with their intervals
    pub fn schedule(&self) -> Vec<(MaintenanceTask, Duration)> {
        let mut tasks = Vec::new();
        let learning = self.engine.config();
        if learning.maintenance_enabled {
            tasks.push((MaintenanceTask::Decay, learning.decay_interval));
            tasks.push((MaintenanceTask::Consolidation, learning.consolidation_interval));
            tasks.push((MaintenanceTask::Cleanup, learning.cleanup_interval));
        }
        if let Some(worker) = &self.embedding {
            if worker.config().enabled {
                tasks.push((MaintenanceTask::Embedding, worker.config().interval));
            }
        }
        tasks
    }

    /// Start every enabled task. The returned handle resolves once all of
    /// them have stopped.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let schedule = self.schedule();
            if schedule.is_empty() {
                info!("Learning maintenance is disabled");
                return;
            }

            let mut tasks = JoinSet::new();
            for (task, period) in schedule {
                let scheduler = self.clone();
                tasks.spawn(async move { scheduler.run(task, period).await });
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Maintenance task terminated abnormally");
                }
            }
            info!("Learning maintenance stopped");
        })
    }

    async fn run(&self, task: MaintenanceTask, period: Duration) {
        info!(task = %task, interval = ?period, "Starting maintenance task");

        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!(task = %task, "Running maintenance cycle");
                    tokio::select! {
                        _ = self.run_once(task) => {}
                        _ = self.shutdown_token.cancelled() => {
                            info!(task = %task, "Shutdown signal received mid-cycle, stopping maintenance task");
                            break;
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!(task = %task, "Shutdown signal received, stopping maintenance task");
                    break;
                }
            }
        }
    }

    /// Execute one cycle of `task`, publishing and returning its event
    pub async fn run_once(&self, task: MaintenanceTask) -> LearningEvent {
        let event = match self.cycle(task).await {
            Ok(event) => {
                metrics::counter!("alembic_maintenance_ticks_total", "task" => task.as_str(), "outcome" => "success")
                    .increment(1);
                event
            }
            Err(e) => {
                error!(task = %task, error = %e, "Maintenance cycle failed");
                metrics::counter!("alembic_maintenance_ticks_total", "task" => task.as_str(), "outcome" => "failure")
                    .increment(1);
                LearningEvent::MaintenanceFailed {
                    task,
                    error: format!("{:#}", e),
                    failed_at: Utc::now(),
                }
            }
        };
        self.event_bus.publish_learning_event(event.clone());
        event
    }

    async fn cycle(&self, task: MaintenanceTask) -> Result<LearningEvent> {
        let now = Utc::now();
        match task {
            MaintenanceTask::Decay => {
                let report = self.engine.decay_pass(now).await?;
                info!(scanned = report.scanned, decayed = report.decayed, "Applied relevance decay");
                Ok(LearningEvent::DecayApplied {
                    scanned: report.scanned,
                    decayed: report.decayed,
                    applied_at: now,
                })
            }
            MaintenanceTask::Consolidation => {
                let report = self.engine.consolidate_patterns().await;
                Ok(LearningEvent::PatternsConsolidated {
                    evicted: report.evicted,
                    merged: report.merged,
                    remaining: report.remaining,
                    consolidated_at: now,
                })
            }
            MaintenanceTask::Cleanup => {
                let report = self.engine.cleanup_metrics(now).await?;
                Ok(LearningEvent::MetricsCleaned {
                    artifacts_purged: report.artifacts_purged,
                    sessions_purged: report.sessions_purged,
                    cleaned_at: now,
                })
            }
            MaintenanceTask::Embedding => {
                let worker = self
                    .embedding
                    .as_ref()
                    .ok_or_else(|| anyhow!("No embedding worker configured"))?;
                let report = worker.run_cycle(&self.shutdown_token).await?;
                info!(
                    embedded = report.embedded,
                    failed = report.failed,
                    related_pairs = report.related_pairs,
                    "Embedding cycle completed"
                );
                Ok(LearningEvent::EmbeddingsGenerated {
                    embedded: report.embedded,
                    failed: report.failed,
                    related_pairs: report.related_pairs,
                    generated_at: now,
                })
            }
        }
    }
}
