// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Integration tests for the generation facade: phase runs, persistence,
// batched selection and optimization lineage against scripted backends.

use alembic_core::application::generation::{
    GenerateRequest, GenerationService, OptimizeRequest, StandardGenerationService,
};
use alembic_core::application::optimizer::Termination;
use alembic_core::domain::artifact::PhaseName;
use alembic_core::domain::config::AlembicConfig;
use alembic_core::domain::llm::{BackendError, GenerationRequest, GenerationResponse, ModelBackend};
use alembic_core::domain::repository::ArtifactRepository;
use alembic_core::infrastructure::event_bus::{DomainEvent, EventBus};
use alembic_core::infrastructure::llm::BackendRegistry;
use alembic_core::infrastructure::repositories::InMemoryArtifactRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Plays every role: phase writer, reviser and judge
struct StudioBackend {
    name: &'static str,
    broken: bool,
}

impl StudioBackend {
    fn judge_single(candidate_prompt: &str) -> String {
        let score = if candidate_prompt.contains("revised prompt") { 9.3 } else { 6.0 };
        format!(
            r#"{{"score": {}, "sub_scores": {{"clarity": {}}}, "reasoning": "ok", "improvements": ["be specific"]}}"#,
            score, score
        )
    }

    fn judge_batch(prompt: &str) -> String {
        let blocks: Vec<&str> = prompt.split("Candidate ").skip(1).collect();
        let entries: Vec<String> = blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let s = if block.contains("<gamma>") { 0.9 } else { 0.4 };
                format!(
                    r#"{{"candidate": {}, "scores": {{"relevance": {s}, "clarity": {s}, "completeness": {s}, "conciseness": {s}, "toxicity": {s}}}, "confidence": 0.8, "reasoning": "r"}}"#,
                    i + 1,
                    s = s
                )
            })
            .collect();
        format!("```json\n[{}]\n```", entries.join(","))
    }
}

#[async_trait]
impl ModelBackend for StudioBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, BackendError> {
        if self.broken {
            return Err(BackendError::Provider("maintenance".to_string()));
        }

        let content = if request.system_prompt.contains("improves prompts") {
            "REASONING: tighter wording\nIMPROVED PROMPT: revised prompt".to_string()
        } else if request.system_prompt.contains("evaluator") {
            if request.user_prompt.contains("JSON array") {
                Self::judge_batch(&request.user_prompt)
            } else {
                Self::judge_single(&request.user_prompt)
            }
        } else {
            let last = request.user_prompt.lines().last().unwrap_or_default();
            format!("{}<{}>", last, self.name)
        };

        Ok(GenerationResponse {
            content,
            tokens_used: 7,
            model: format!("{}-v1", self.name),
        })
    }
}

struct Fixture {
    service: StandardGenerationService,
    repository: Arc<InMemoryArtifactRepository>,
    event_bus: EventBus,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn fixture() -> Fixture {
    fixture_with(true)
}

fn fixture_with(ranking: bool) -> Fixture {
    init_tracing();
    let config = AlembicConfig::from_yaml(&format!(
        r#"
optimizer:
  judge_backend: alpha
  revision_backend: alpha
  max_iterations: 3
ranking:
  enabled: {}
"#,
        ranking
    ))
    .unwrap();

    let registry = Arc::new(
        BackendRegistry::new(config.orchestrator.circuit_breaker.clone())
            .with_backend(Arc::new(StudioBackend { name: "alpha", broken: false }))
            .with_backend(Arc::new(StudioBackend { name: "gamma", broken: false }))
            .with_backend(Arc::new(StudioBackend { name: "flaky", broken: true })),
    );
    let repository = Arc::new(InMemoryArtifactRepository::new());
    let event_bus = EventBus::new(256);
    let service =
        StandardGenerationService::from_config(&config, registry, repository.clone(), event_bus.clone()).unwrap();

    Fixture {
        service,
        repository,
        event_bus,
    }
}

#[tokio::test]
async fn test_generate_runs_pipeline_and_selects() {
    let f = fixture();
    let request = GenerateRequest {
        input: "a short story about tides".to_string(),
        providers: vec!["alpha".to_string(), "gamma".to_string()],
        select: Some(Vec::new()),
        ..Default::default()
    };

    let outcome = f.service.generate(request, &CancellationToken::new()).await.unwrap();

    // 3 default phases x 2 backends
    assert_eq!(outcome.artifacts.len(), 6);
    assert!(outcome.phase_errors.is_empty());
    assert_eq!(f.repository.len(), 6);

    // Ranked best first, one score per artifact
    assert_eq!(outcome.scores.len(), 6);
    assert!(outcome.scores.windows(2).all(|w| w[0].total >= w[1].total));
    let ids: Vec<_> = outcome.artifacts.iter().map(|a| a.id).collect();
    let scored: Vec<_> = outcome.scores.iter().map(|s| s.artifact_id).collect();
    assert_eq!(ids, scored);

    let mut phases: Vec<&str> = outcome.artifacts.iter().map(|a| a.phase.as_str()).collect();
    phases.sort();
    assert_eq!(
        phases,
        vec!["extraction", "extraction", "refinement", "refinement", "rewriting", "rewriting"]
    );

    let selected = outcome.selected.unwrap();
    let winner = outcome
        .artifacts
        .iter()
        .find(|a| a.id == selected.selected.candidate)
        .unwrap();
    assert_eq!(winner.backend, "gamma");
    assert_eq!(winner.phase, PhaseName::refinement());
    assert_eq!(selected.alternatives.len(), 1);
}

#[tokio::test]
async fn test_generate_without_ranking_keeps_phase_order() {
    let f = fixture_with(false);
    let request = GenerateRequest {
        input: "a short story about tides".to_string(),
        providers: vec!["alpha".to_string(), "gamma".to_string()],
        ..Default::default()
    };

    let outcome = f.service.generate(request, &CancellationToken::new()).await.unwrap();
    assert!(outcome.scores.is_empty());
    let phases: Vec<&str> = outcome.artifacts.iter().map(|a| a.phase.as_str()).collect();
    assert_eq!(
        phases,
        vec!["extraction", "extraction", "rewriting", "rewriting", "refinement", "refinement"]
    );
}

#[tokio::test]
async fn test_generate_best_effort_with_failing_phase() {
    let f = fixture();
    let mut overrides = HashMap::new();
    overrides.insert("rewriting".to_string(), vec!["flaky".to_string()]);

    let request = GenerateRequest {
        input: "topic".to_string(),
        providers: vec!["alpha".to_string()],
        provider_overrides: overrides,
        best_effort: Some(true),
        ..Default::default()
    };

    let outcome = f.service.generate(request, &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.artifacts.len(), 1);
    assert_eq!(outcome.artifacts[0].phase, PhaseName::extraction());

    let failed: Vec<&str> = outcome.phase_errors.iter().map(|e| e.phase.as_str()).collect();
    assert_eq!(failed, vec!["rewriting", "refinement"]);
    assert!(outcome.selected.is_none());
}

#[tokio::test]
async fn test_generate_strict_mode_fails() {
    let f = fixture();
    let mut overrides = HashMap::new();
    overrides.insert("extraction".to_string(), vec!["flaky".to_string()]);

    let request = GenerateRequest {
        input: "topic".to_string(),
        providers: vec!["alpha".to_string()],
        provider_overrides: overrides,
        best_effort: Some(false),
        ..Default::default()
    };

    assert!(f.service.generate(request, &CancellationToken::new()).await.is_err());
    assert!(f.repository.is_empty());
}

#[tokio::test]
async fn test_generate_defaults_to_strict() {
    let f = fixture();
    let mut overrides = HashMap::new();
    overrides.insert("refinement".to_string(), vec!["flaky".to_string()]);

    let request = GenerateRequest {
        input: "topic".to_string(),
        providers: vec!["alpha".to_string()],
        provider_overrides: overrides,
        ..Default::default()
    };

    assert!(f.service.generate(request, &CancellationToken::new()).await.is_err());
    assert!(f.repository.is_empty());
}

#[tokio::test]
async fn test_generate_rejects_unknown_provider() {
    let f = fixture();
    let request = GenerateRequest {
        input: "topic".to_string(),
        phases: vec![PhaseName::extraction()],
        providers: vec!["nobody".to_string()],
        ..Default::default()
    };
    assert!(f.service.generate(request, &CancellationToken::new()).await.is_err());
}

#[tokio::test]
async fn test_optimize_persists_lineage() {
    let f = fixture();
    let mut events = f.event_bus.subscribe();

    let outcome = f
        .service
        .optimize(
            OptimizeRequest {
                prompt: "write a poem".to_string(),
                task: "poetry for children".to_string(),
                target_score: Some(9.0),
                ..Default::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(outcome.converged);
    assert_eq!(outcome.termination, Termination::Converged);
    assert_eq!(outcome.original_score, 6.0);
    assert_eq!(outcome.final_score, 9.3);
    assert_eq!(outcome.optimized_prompt, "revised prompt");
    assert_eq!(outcome.iterations.len(), 1);

    let stored = f.repository.find_by_id(outcome.optimized.id).await.unwrap().unwrap();
    assert_eq!(stored.parent, Some(outcome.original));
    assert!(f.repository.find_by_id(outcome.original).await.unwrap().is_some());

    let mut saw_completion = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, DomainEvent::Optimization(_)) {
            saw_completion = true;
        }
    }
    assert!(saw_completion);
}
