// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Generation Service
//!
//! Public entry point for callers. Wires the phase orchestrator, multi-factor
//! ranking, optional batched selection and the iterative optimizer to
//! artifact persistence.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::optimizer::{
    IterativeOptimizer, OptimizationBudget, OptimizationIteration, Termination,
};
use crate::application::phase_orchestrator::{PhaseFailure, PhaseOrchestrator, PhaseRequest};
use crate::application::ranking::{ArtifactScore, MultiFactorRanker};
use crate::application::selection::{CandidateSelector, SelectionOutcome};
use crate::domain::artifact::{Artifact, ArtifactId, PhaseName};
use crate::domain::config::{AlembicConfig, OrchestratorConfig, PhaseBinding};
use crate::domain::judge::{LlmJudge, WeightedCriterion};
use crate::domain::repository::ArtifactRepository;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::llm::BackendRegistry;
use crate::infrastructure::prompt_template_engine::PromptTemplateEngine;

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub input: String,

    /// Phase names to run, in order. Empty runs the configured pipeline.
    pub phases: Vec<PhaseName>,

    /// Lanes per phase; 0 is treated as 1
    pub count: usize,
    pub persona: Option<String>,

    /// Backends for phases whose binding names none
    pub providers: Vec<String>,

    /// Per-phase backend lists that replace the configured ones
    pub provider_overrides: HashMap<String, Vec<String>>,

    /// Overrides the configured best-effort mode
    pub best_effort: Option<bool>,
    pub context: Vec<String>,

    /// Run batched selection over final-phase artifacts. An empty list uses
    /// the selector's configured criteria.
    pub select: Option<Vec<WeightedCriterion>>,
}

#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub run_id: Uuid,

    /// Best first when ranking is enabled, otherwise in phase order
    pub artifacts: Vec<Artifact>,

    /// Ranking scores parallel to `artifacts`; empty when ranking is disabled
    pub scores: Vec<ArtifactScore>,
    pub selected: Option<SelectionOutcome>,
    pub phase_errors: Vec<PhaseFailure>,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizeRequest {
    pub prompt: String,
    pub task: String,

    /// Stored artifact to optimize instead of `prompt`
    pub artifact_id: Option<ArtifactId>,
    pub persona: Option<String>,
    pub max_iterations: Option<u32>,
    pub target_score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct OptimizeOutcome {
    pub original: ArtifactId,
    pub optimized: Artifact,
    pub optimized_prompt: String,
    pub original_score: f64,
    pub final_score: f64,
    pub iterations: Vec<OptimizationIteration>,
    pub converged: bool,
    pub termination: Termination,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: GenerateRequest, cancel: &CancellationToken) -> Result<GenerateOutcome>;
    async fn optimize(&self, request: OptimizeRequest, cancel: &CancellationToken) -> Result<OptimizeOutcome>;
}

pub struct StandardGenerationService {
    orchestrator: Arc<PhaseOrchestrator>,
    optimizer: Arc<IterativeOptimizer>,
    selector: Arc<CandidateSelector>,
    ranker: Option<Arc<MultiFactorRanker>>,
    repository: Arc<dyn ArtifactRepository>,
    config: OrchestratorConfig,
}

impl StandardGenerationService {
    pub fn new(
        orchestrator: Arc<PhaseOrchestrator>,
        optimizer: Arc<IterativeOptimizer>,
        selector: Arc<CandidateSelector>,
        repository: Arc<dyn ArtifactRepository>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            orchestrator,
            optimizer,
            selector,
            ranker: None,
            repository,
            config,
        }
    }

    pub fn with_ranker(mut self, ranker: Arc<MultiFactorRanker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    /// Build the full service graph from configuration.
    ///
    /// The judge and reviser use `optimizer.judge_backend` /
    /// `optimizer.revision_backend`, or the first registered backend.
    pub fn from_config(
        config: &AlembicConfig,
        registry: Arc<BackendRegistry>,
        repository: Arc<dyn ArtifactRepository>,
        event_bus: EventBus,
    ) -> Result<Self> {
        let first = registry
            .names()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No model backends registered"))?;
        let judge_name = config.optimizer.judge_backend.clone().unwrap_or_else(|| first.clone());
        let reviser_name = config.optimizer.revision_backend.clone().unwrap_or(first);

        let judge_backend = registry
            .get(&judge_name)
            .ok_or_else(|| anyhow!("Judge backend '{}' is not registered", judge_name))?;
        let judge = Arc::new(
            LlmJudge::new(judge_backend)
                .with_timeout(config.optimizer.judge_timeout)
                .with_temperature(config.optimizer.judge_temperature),
        );
        let reviser = registry
            .guarded(&reviser_name, config.optimizer.revision_timeout)
            .with_context(|| format!("Revision backend '{}'", reviser_name))?;

        let ranker = config
            .ranking
            .enabled
            .then(|| Arc::new(MultiFactorRanker::new(config.ranking.clone(), registry.clone())));

        let templates = Arc::new(PromptTemplateEngine::new());
        let orchestrator = Arc::new(PhaseOrchestrator::new(
            registry.clone(),
            templates.clone(),
            event_bus.clone(),
            &config.orchestrator,
        ));
        let optimizer = Arc::new(
            IterativeOptimizer::new(judge.clone(), reviser, templates, event_bus.clone(), config.optimizer.clone())
                .with_criteria(config.selection.criteria.clone()),
        );
        let selector = Arc::new(
            CandidateSelector::new(judge, event_bus).with_criteria(config.selection.criteria.clone()),
        );

        let service = Self::new(
            orchestrator,
            optimizer,
            selector,
            repository,
            config.orchestrator.clone(),
        );
        Ok(match ranker {
            Some(ranker) => service.with_ranker(ranker),
            None => service,
        })
    }

    fn resolve_phases(&self, request: &GenerateRequest) -> Vec<PhaseBinding> {
        let mut bindings: Vec<PhaseBinding> = if request.phases.is_empty() {
            self.config.phases.clone()
        } else {
            request
                .phases
                .iter()
                .map(|name| {
                    self.config
                        .phases
                        .iter()
                        .find(|b| &b.name == name)
                        .cloned()
                        .unwrap_or_else(|| PhaseBinding::new(name.clone()))
                })
                .collect()
        };

        for binding in &mut bindings {
            if let Some(backends) = request.provider_overrides.get(binding.name.as_str()) {
                binding.backends = backends.clone();
            } else if binding.backends.is_empty() {
                binding.backends = request.providers.clone();
            }
        }
        bindings
    }
}

#[async_trait]
impl GenerationService for StandardGenerationService {
    async fn generate(&self, request: GenerateRequest, cancel: &CancellationToken) -> Result<GenerateOutcome> {
        let phases = self.resolve_phases(&request);
        let last_phase = phases.last().map(|p| p.name.clone());

        let phase_request = PhaseRequest::new(request.input.clone(), phases)
            .count(request.count.max(1))
            .persona(request.persona.clone())
            .context(request.context.clone())
            .best_effort(request.best_effort.unwrap_or(self.config.best_effort));

        let run = self
            .orchestrator
            .execute(&phase_request, cancel)
            .await
            .context("Phase run failed")?;

        let run_id = run.run_id;
        let failures = run.failures;
        let (artifacts, scores) = match &self.ranker {
            Some(ranker) => {
                let ranking = ranker.rank(run.artifacts, &request.input, cancel).await;
                (ranking.artifacts, ranking.scores)
            }
            None => (run.artifacts, Vec::new()),
        };

        for artifact in &artifacts {
            self.repository
                .save(artifact)
                .await
                .with_context(|| format!("Failed to persist artifact {}", artifact.id))?;
        }

        let selected = match (&request.select, &last_phase) {
            (Some(criteria), Some(last)) => {
                let finalists: Vec<Artifact> = artifacts.iter().filter(|a| &a.phase == last).cloned().collect();
                if finalists.is_empty() {
                    warn!(run_id = %run_id, "No final-phase artifacts to select from");
                    None
                } else if criteria.is_empty() {
                    Some(self.selector.select(&finalists).await.context("Candidate selection failed")?)
                } else {
                    Some(
                        self.selector
                            .select_with(&finalists, criteria)
                            .await
                            .context("Candidate selection failed")?,
                    )
                }
            }
            _ => None,
        };

        info!(
            run_id = %run_id,
            artifacts = artifacts.len(),
            failures = failures.len(),
            ranked = !scores.is_empty(),
            selected = selected.is_some(),
            "Generation request completed"
        );

        Ok(GenerateOutcome {
            run_id,
            artifacts,
            scores,
            selected,
            phase_errors: failures,
        })
    }

    async fn optimize(&self, request: OptimizeRequest, cancel: &CancellationToken) -> Result<OptimizeOutcome> {
        let draft = match request.artifact_id {
            Some(id) => self
                .repository
                .find_by_id(id)
                .await?
                .ok_or_else(|| anyhow!("Artifact {} not found", id))?,
            None => {
                let draft = Artifact::new(request.prompt.clone(), PhaseName::new("draft"), "caller", "caller")
                    .with_persona(request.persona.clone());
                self.repository
                    .save(&draft)
                    .await
                    .context("Failed to persist draft artifact")?;
                draft
            }
        };

        let budget = OptimizationBudget {
            max_iterations: request.max_iterations,
            target_score: request.target_score,
        };
        let result = self
            .optimizer
            .optimize(&draft, &request.task, budget, cancel)
            .await
            .context("Optimization failed")?;

        if result.optimized.id != draft.id {
            self.repository
                .save(&result.optimized)
                .await
                .context("Failed to persist optimized artifact")?;
        }

        Ok(OptimizeOutcome {
            original: draft.id,
            optimized_prompt: result.optimized.content.clone(),
            optimized: result.optimized,
            original_score: result.original_score,
            final_score: result.final_score,
            iterations: result.iterations,
            converged: result.converged,
            termination: result.termination,
        })
    }
}
