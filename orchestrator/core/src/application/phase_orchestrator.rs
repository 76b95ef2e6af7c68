// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Phase Orchestrator
//!
//! Drives an ordered list of named phases against model backends and emits
//! one artifact per (lane, phase, backend) call.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Multi-stage generation with bounded fan-out and deterministic output order
//!
//! Phases run in sequence because each phase consumes the previous phase's
//! output. Within a phase, every lane × backend call fans out concurrently
//! (at most `max_concurrency` in flight) and is re-sequenced afterwards, so
//! the returned artifacts are ordered by phase, then lane, then configured
//! backend order regardless of completion order.
//!
//! A failed call is retried exactly once against the phase's fallback
//! backend when one is configured. In best-effort mode failures are
//! collected per phase; in strict mode the first failure fails the run.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::artifact::{Artifact, ArtifactId, PhaseName};
use crate::domain::config::{OrchestratorConfig, PhaseBinding};
use crate::domain::events::GenerationEvent;
use crate::domain::llm::{BackendError, GenerationRequest};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::llm::{BackendRegistry, FallbackChain};
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptTemplateEngine};

#[derive(Debug, Clone)]
pub struct PhaseRequest {
    pub input: String,
    pub phases: Vec<PhaseBinding>,

    /// Number of independent lanes; every lane runs every phase
    pub count: usize,
    pub persona: Option<String>,
    pub context: Vec<String>,

    /// Collect per-phase failures instead of failing the whole run. Off
    /// unless the caller opts in.
    pub best_effort: bool,
}

impl PhaseRequest {
    pub fn new(input: impl Into<String>, phases: Vec<PhaseBinding>) -> Self {
        Self {
            input: input.into(),
            phases,
            count: 1,
            persona: None,
            context: Vec::new(),
            best_effort: false,
        }
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn persona(mut self, persona: Option<String>) -> Self {
        self.persona = persona;
        self
    }

    pub fn context(mut self, context: Vec<String>) -> Self {
        self.context = context;
        self
    }

    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }
}

/// One failed call, or one lane skipped because its upstream phase produced nothing
#[derive(Debug, Clone)]
pub struct PhaseFailure {
    pub phase: PhaseName,
    pub lane: usize,

    /// Primary backend of the failed call; `None` for a skipped lane
    pub backend: Option<String>,
    pub error: BackendError,
}

#[derive(Debug, Clone)]
pub struct PhaseRun {
    pub run_id: Uuid,
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<PhaseFailure>,
}

impl PhaseRun {
    /// Phases with at least one failure, in pipeline order
    pub fn failed_phases(&self) -> Vec<PhaseName> {
        let mut failed: Vec<PhaseName> = Vec::new();
        for f in &self.failures {
            if !failed.contains(&f.phase) {
                failed.push(f.phase.clone());
            }
        }
        failed
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend unavailable for phase '{phase}': {reason}")]
    BackendUnavailable { phase: PhaseName, reason: String },

    #[error("Backend '{backend}' timed out after {timeout:?} in phase '{phase}'")]
    BackendTimeout {
        phase: PhaseName,
        backend: String,
        timeout: Duration,
    },

    #[error("Phase '{phase}' failed: {source}")]
    PhaseFailed {
        phase: PhaseName,
        #[source]
        source: BackendError,
    },

    #[error("Invalid template for phase '{phase}': {reason}")]
    Template { phase: PhaseName, reason: String },

    #[error("Generation cancelled")]
    Cancelled,
}

impl OrchestratorError {
    fn from_failure(failure: PhaseFailure) -> Self {
        let backend = failure.backend.unwrap_or_default();
        match failure.error {
            BackendError::Unavailable(reason) => OrchestratorError::BackendUnavailable {
                phase: failure.phase,
                reason,
            },
            BackendError::Timeout(timeout) => OrchestratorError::BackendTimeout {
                phase: failure.phase,
                backend,
                timeout,
            },
            BackendError::Cancelled => OrchestratorError::Cancelled,
            other => OrchestratorError::PhaseFailed {
                phase: failure.phase,
                source: other,
            },
        }
    }
}

struct CallJob {
    slot: usize,
    lane: usize,
    backend: String,
    chain: FallbackChain,
    request: GenerationRequest,
    parent: Option<ArtifactId>,
}

struct CallOutcome {
    slot: usize,
    lane: usize,
    backend: String,
    parent: Option<ArtifactId>,
    result: Result<(String, crate::domain::llm::GenerationResponse), BackendError>,
}

pub struct PhaseOrchestrator {
    registry: Arc<BackendRegistry>,
    templates: Arc<PromptTemplateEngine>,
    event_bus: EventBus,
    phase_timeout: Duration,
    max_concurrency: usize,
}

impl PhaseOrchestrator {
    pub fn new(
        registry: Arc<BackendRegistry>,
        templates: Arc<PromptTemplateEngine>,
        event_bus: EventBus,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            templates,
            event_bus,
            phase_timeout: config.phase_timeout,
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    fn validate(&self, request: &PhaseRequest) -> Result<(), OrchestratorError> {
        if request.phases.is_empty() {
            return Err(OrchestratorError::InvalidRequest("phase list is empty".to_string()));
        }
        if request.count == 0 {
            return Err(OrchestratorError::InvalidRequest("count must be at least 1".to_string()));
        }

        for phase in &request.phases {
            if phase.backends.is_empty() {
                return Err(OrchestratorError::InvalidRequest(format!(
                    "phase '{}' has no backends",
                    phase.name
                )));
            }
            for name in phase.backends.iter().chain(phase.fallback.iter()) {
                if !self.registry.contains(name) {
                    return Err(OrchestratorError::BackendUnavailable {
                        phase: phase.name.clone(),
                        reason: format!("unknown backend '{}'", name),
                    });
                }
            }
            if let Some(template) = &phase.template {
                self.templates
                    .validate_template(template)
                    .map_err(|e| OrchestratorError::Template {
                        phase: phase.name.clone(),
                        reason: format!("{:#}", e),
                    })?;
            }
        }
        Ok(())
    }

    fn chain_for(&self, phase: &PhaseBinding, backend: &str) -> Result<FallbackChain, OrchestratorError> {
        let unavailable = |e: BackendError| OrchestratorError::BackendUnavailable {
            phase: phase.name.clone(),
            reason: e.to_string(),
        };

        let mut chain = FallbackChain::new(vec![self
            .registry
            .guarded(backend, self.phase_timeout)
            .map_err(unavailable)?]);
        if let Some(fallback) = phase.fallback.as_deref().filter(|f| *f != backend) {
            chain = chain.then(
                self.registry
                    .guarded(fallback, self.phase_timeout)
                    .map_err(unavailable)?,
            );
        }
        Ok(chain)
    }

    /// Execute every phase of `request` in order.
    ///
    /// Validation problems (empty phase list, unknown backend, bad template)
    /// fail before any backend is called.
    pub async fn execute(
        &self,
        request: &PhaseRequest,
        cancel: &CancellationToken,
    ) -> Result<PhaseRun, OrchestratorError> {
        self.validate(request)?;

        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            phases = request.phases.len(),
            lanes = request.count,
            best_effort = request.best_effort,
            "Starting phase run"
        );

        // Per lane: the material the next phase consumes and the artifact it came from
        let mut lanes: Vec<Option<(String, Option<ArtifactId>)>> =
            vec![Some((request.input.clone(), None)); request.count];
        let mut artifacts = Vec::new();
        let mut failures = Vec::new();

        for phase in &request.phases {
            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            let width = phase.backends.len();
            let mut jobs = Vec::new();
            for (lane, source) in lanes.iter().enumerate() {
                let Some((material, parent)) = source else {
                    failures.push(PhaseFailure {
                        phase: phase.name.clone(),
                        lane,
                        backend: None,
                        error: BackendError::Unavailable("upstream phase produced no output".to_string()),
                    });
                    continue;
                };

                let context = PromptContext::new()
                    .input(material.clone())
                    .phase(&phase.name)
                    .persona(request.persona.as_deref())
                    .context(&request.context);
                let (system, user) = self
                    .templates
                    .render_phase(phase.template.as_deref(), &context)
                    .map_err(|e| OrchestratorError::Template {
                        phase: phase.name.clone(),
                        reason: format!("{:#}", e),
                    })?;
                let generation = GenerationRequest::new(system, user)
                    .temperature(phase.temperature)
                    .max_tokens(phase.max_tokens);

                for (position, backend) in phase.backends.iter().enumerate() {
                    jobs.push(CallJob {
                        slot: lane * width + position,
                        lane,
                        backend: backend.clone(),
                        chain: self.chain_for(phase, backend)?,
                        request: generation.clone(),
                        parent: *parent,
                    });
                }
            }

            let mut outcomes: Vec<CallOutcome> = stream::iter(jobs)
                .map(|job| self.run_call(run_id, &phase.name, job, cancel))
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
            outcomes.sort_by_key(|o| o.slot);

            let mut next: Vec<Option<(String, Option<ArtifactId>)>> = vec![None; request.count];
            for outcome in outcomes {
                match outcome.result {
                    Ok((handler, response)) => {
                        let mut artifact =
                            Artifact::new(response.content, phase.name.clone(), handler, response.model)
                                .with_persona(request.persona.clone())
                                .with_tokens_used(response.tokens_used)
                                .with_temperature(phase.temperature);
                        artifact.parent = outcome.parent;

                        // First success in configured backend order feeds the next phase
                        if next[outcome.lane].is_none() {
                            next[outcome.lane] = Some((artifact.content.clone(), Some(artifact.id)));
                        }
                        artifacts.push(artifact);
                    }
                    Err(BackendError::Cancelled) => return Err(OrchestratorError::Cancelled),
                    Err(error) => {
                        self.event_bus.publish_generation_event(GenerationEvent::PhaseFailed {
                            run_id,
                            phase: phase.name.clone(),
                            backend: outcome.backend.clone(),
                            error: error.to_string(),
                            failed_at: Utc::now(),
                        });
                        let failure = PhaseFailure {
                            phase: phase.name.clone(),
                            lane: outcome.lane,
                            backend: Some(outcome.backend),
                            error,
                        };
                        if !request.best_effort {
                            return Err(OrchestratorError::from_failure(failure));
                        }
                        failures.push(failure);
                    }
                }
            }
            lanes = next;
            debug!(run_id = %run_id, phase = %phase.name, "Phase complete");
        }

        let run = PhaseRun {
            run_id,
            artifacts,
            failures,
        };
        if !run.is_complete() {
            warn!(
                run_id = %run_id,
                failed_phases = ?run.failed_phases(),
                "Phase run finished with failures"
            );
        }
        self.event_bus.publish_generation_event(GenerationEvent::GenerationCompleted {
            run_id,
            artifact_count: run.artifacts.len(),
            failed_phases: run.failed_phases(),
            completed_at: Utc::now(),
        });
        info!(run_id = %run_id, artifacts = run.artifacts.len(), "Phase run completed");
        Ok(run)
    }

    async fn run_call(
        &self,
        run_id: Uuid,
        phase: &PhaseName,
        job: CallJob,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let result = match job.chain.generate(&job.request, cancel).await {
            Ok(done) => {
                if done.position > 0 {
                    info!(run_id = %run_id, phase = %phase, primary = %job.backend, fallback = %done.handler, "Fallback backend used");
                    self.event_bus.publish_generation_event(GenerationEvent::FallbackUsed {
                        run_id,
                        phase: phase.clone(),
                        primary: job.backend.clone(),
                        fallback: done.handler.clone(),
                        used_at: Utc::now(),
                    });
                }
                Ok((done.handler, done.response))
            }
            Err(failure) => Err(failure.last_error()),
        };

        CallOutcome {
            slot: job.slot,
            lane: job.lane,
            backend: job.backend,
            parent: job.parent,
            result,
        }
    }
}
