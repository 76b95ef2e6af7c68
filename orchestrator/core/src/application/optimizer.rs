// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Iterative Optimization Loop
//!
//! Refines a draft artifact against a task description by alternating
//! revision and judgement until the judge score reaches the target or the
//! iteration budget runs out.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Generate → evaluate → adopt-if-better loop
//!
//! The best candidate only ever moves to a strictly higher score, so the
//! returned `final_score` is never below `original_score`. Once the original
//! has been scored, later backend or judge failures end the loop early and
//! return the best candidate found so far.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::artifact::{Artifact, PhaseName};
use crate::domain::config::OptimizerConfig;
use crate::domain::events::OptimizationEvent;
use crate::domain::judge::{Evaluation, Judge, JudgeError, WeightedCriterion, MAX_SCORE};
use crate::domain::llm::{BackendError, GenerationRequest};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::llm::GuardedBackend;
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptTemplateEngine};

const REASONING_MARKER: &str = "REASONING:";
const IMPROVED_MARKER: &str = "IMPROVED PROMPT:";

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    BudgetExhausted,
    Cancelled,
    BackendFailed,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Converged => "converged",
            Termination::BudgetExhausted => "budget_exhausted",
            Termination::Cancelled => "cancelled",
            Termination::BackendFailed => "backend_failed",
        }
    }
}

/// Per-call overrides of the configured budget
#[derive(Debug, Clone, Default)]
pub struct OptimizationBudget {
    pub max_iterations: Option<u32>,
    pub target_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationIteration {
    /// 1-based iteration number
    pub index: u32,
    pub candidate: String,
    pub score: f64,
    pub evaluation: Evaluation,

    /// Revision rationale from the `REASONING:` section, if present
    pub change_reasoning: Option<String>,

    /// Whether this candidate became the new best
    pub adopted: bool,
    pub processing_time: Duration,
}

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best candidate. Identical to the draft when no revision was adopted.
    pub optimized: Artifact,
    pub original_score: f64,
    pub final_score: f64,
    pub iterations: Vec<OptimizationIteration>,
    pub elapsed: Duration,
    pub converged: bool,
    pub convergence_iteration: Option<u32>,
    pub termination: Termination,
}

impl OptimizationResult {
    pub fn improvement(&self) -> f64 {
        self.final_score - self.original_score
    }

    pub fn improved(&self) -> bool {
        self.final_score > self.original_score
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OptimizationError {
    #[error("Invalid optimization request: {0}")]
    InvalidRequest(String),

    #[error("Failed to evaluate original candidate: {0}")]
    OriginalEvaluation(#[source] JudgeError),

    #[error("Optimization cancelled before any evaluation")]
    Cancelled,
}

/// Revision text split into its rationale and the new candidate
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRevision {
    pub reasoning: Option<String>,
    pub prompt: String,
}

/// Split a revision response on the `REASONING:` / `IMPROVED PROMPT:`
/// markers. Without an `IMPROVED PROMPT:` marker the trimmed response is the
/// revision.
pub fn parse_revision(response: &str) -> ParsedRevision {
    let Some(split) = response.find(IMPROVED_MARKER) else {
        return ParsedRevision {
            reasoning: None,
            prompt: response.trim().to_string(),
        };
    };

    let head = &response[..split];
    let prompt = response[split + IMPROVED_MARKER.len()..].trim().to_string();
    let reasoning = head
        .find(REASONING_MARKER)
        .map(|i| head[i + REASONING_MARKER.len()..].trim().to_string())
        .filter(|r| !r.is_empty());

    if prompt.is_empty() {
        return ParsedRevision {
            reasoning,
            prompt: response.trim().to_string(),
        };
    }
    ParsedRevision { reasoning, prompt }
}

pub struct IterativeOptimizer {
    judge: Arc<dyn Judge>,
    reviser: GuardedBackend,
    templates: Arc<PromptTemplateEngine>,
    event_bus: EventBus,
    criteria: Vec<WeightedCriterion>,
    config: OptimizerConfig,
}

impl IterativeOptimizer {
    pub fn new(
        judge: Arc<dyn Judge>,
        reviser: GuardedBackend,
        templates: Arc<PromptTemplateEngine>,
        event_bus: EventBus,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            judge,
            reviser,
            templates,
            event_bus,
            criteria: WeightedCriterion::defaults(),
            config,
        }
    }

    pub fn with_criteria(mut self, criteria: Vec<WeightedCriterion>) -> Self {
        self.criteria = criteria;
        self
    }

    pub async fn optimize(
        &self,
        draft: &Artifact,
        task: &str,
        budget: OptimizationBudget,
        cancel: &CancellationToken,
    ) -> Result<OptimizationResult, OptimizationError> {
        let max_iterations = budget.max_iterations.unwrap_or(self.config.max_iterations);
        let target = budget.target_score.unwrap_or(self.config.target_score);
        if !(0.0..=MAX_SCORE).contains(&target) {
            return Err(OptimizationError::InvalidRequest(format!(
                "target score {} outside 0-{}",
                target, MAX_SCORE
            )));
        }
        if draft.content.trim().is_empty() {
            return Err(OptimizationError::InvalidRequest("draft is empty".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(OptimizationError::Cancelled);
        }

        let started = Instant::now();
        info!(artifact_id = %draft.id, max_iterations, target, "Starting optimization");

        let original = self
            .judge
            .evaluate(&draft.content, &self.criteria)
            .await
            .map_err(OptimizationError::OriginalEvaluation)?;
        let original_score = original.score;

        let mut best = draft.clone();
        let mut best_score = original_score;
        let mut improvements = original.improvements.clone();
        let mut iterations = Vec::new();
        let mut convergence_iteration = None;

        let termination = if best_score >= target {
            convergence_iteration = Some(0);
            Termination::Converged
        } else {
            let mut outcome = Termination::BudgetExhausted;
            for index in 1..=max_iterations {
                if cancel.is_cancelled() {
                    outcome = Termination::Cancelled;
                    break;
                }
                let iter_started = Instant::now();

                let revision = match self.revise(&best.content, task, &improvements, index, cancel).await {
                    Ok(revision) => revision,
                    Err(BackendError::Cancelled) => {
                        outcome = Termination::Cancelled;
                        break;
                    }
                    Err(e) => {
                        warn!(iteration = index, error = %e, "Revision failed, keeping best candidate");
                        outcome = Termination::BackendFailed;
                        break;
                    }
                };

                let evaluation = match self.judge.evaluate(&revision.prompt, &self.criteria).await {
                    Ok(evaluation) => evaluation,
                    Err(e) => {
                        warn!(iteration = index, error = %e, "Judge failed, keeping best candidate");
                        outcome = Termination::BackendFailed;
                        break;
                    }
                };

                let score = evaluation.score;
                let adopted = score > best_score;
                debug!(iteration = index, score, best_score, adopted, "Iteration evaluated");
                if adopted {
                    best = Artifact::new(
                        revision.prompt.clone(),
                        PhaseName::optimization(),
                        self.reviser.name(),
                        revision.model.clone(),
                    )
                    .with_parent(draft.id)
                    .with_persona(draft.persona.clone())
                    .with_tokens_used(revision.tokens_used);
                    best_score = score;
                }
                improvements = evaluation.improvements.clone();

                iterations.push(OptimizationIteration {
                    index,
                    candidate: revision.prompt,
                    score,
                    evaluation,
                    change_reasoning: revision.reasoning,
                    adopted,
                    processing_time: iter_started.elapsed(),
                });

                if best_score >= target {
                    convergence_iteration = Some(index);
                    outcome = Termination::Converged;
                    break;
                }
            }
            outcome
        };

        let result = OptimizationResult {
            optimized: best,
            original_score,
            final_score: best_score,
            iterations,
            elapsed: started.elapsed(),
            converged: termination == Termination::Converged,
            convergence_iteration,
            termination,
        };

        metrics::counter!(
            "alembic_optimization_runs_total",
            "termination" => termination.as_str()
        )
        .increment(1);
        self.event_bus.publish_optimization_event(OptimizationEvent::OptimizationCompleted {
            artifact_id: result.optimized.id,
            original_score,
            final_score: result.final_score,
            iterations: result.iterations.len(),
            converged: result.converged,
            completed_at: Utc::now(),
        });
        info!(
            artifact_id = %draft.id,
            original_score,
            final_score = result.final_score,
            iterations = result.iterations.len(),
            termination = termination.as_str(),
            "Optimization finished"
        );

        Ok(result)
    }

    async fn revise(
        &self,
        best: &str,
        task: &str,
        improvements: &[String],
        index: u32,
        cancel: &CancellationToken,
    ) -> Result<Revision, BackendError> {
        let context = PromptContext::new()
            .task(task)
            .best(best)
            .improvements(improvements)
            .iteration_number(index);
        let (system, user) = self
            .templates
            .render_revision(&context)
            .map_err(|e| BackendError::InvalidInput(format!("{:#}", e)))?;

        let request = GenerationRequest::new(system, user)
            .temperature(self.config.revision_temperature)
            .max_tokens(self.config.revision_max_tokens);
        let response = self.reviser.generate(&request, cancel).await?;
        let parsed = parse_revision(&response.content);
        if parsed.prompt.is_empty() {
            return Err(BackendError::Provider("empty revision".to_string()));
        }

        Ok(Revision {
            prompt: parsed.prompt,
            reasoning: parsed.reasoning,
            model: response.model,
            tokens_used: response.tokens_used,
        })
    }
}

struct Revision {
    prompt: String,
    reasoning: Option<String>,
    model: String,
    tokens_used: u32,
}
