// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Engine Configuration Types
//
// Typed configuration for every alembic subsystem:
// - Phase orchestration (phase bindings, timeouts, fan-out bound, circuit breakers)
// - Learning engine (EMA rate, decay, confidence floor, maintenance cadence)
// - Iterative optimizer (iteration budget, target score, judge settings)
// - Candidate selection (weighted criteria)
// - Embedding / relationship worker
// - Multi-factor ranking of generated artifacts
//
// Locating and reading the file is the caller's concern; `AlembicConfig::from_yaml`
// accepts the document text. Every field has a default so partial documents work.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::artifact::PhaseName;
use crate::domain::judge::WeightedCriterion;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlembicConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub ranking: RankingConfig,
}

impl AlembicConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        let config: AlembicConfig = serde_yaml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let o = &self.orchestrator;
        if o.max_concurrency == 0 {
            return Err(ConfigError::Invalid("orchestrator.max_concurrency must be at least 1".into()));
        }
        if o.phase_timeout.is_zero() {
            return Err(ConfigError::Invalid("orchestrator.phase_timeout must be positive".into()));
        }
        if o.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.circuit_breaker.failure_threshold must be at least 1".into(),
            ));
        }

        let l = &self.learning;
        for (name, value) in [
            ("learning_rate", l.learning_rate),
            ("decay_rate", l.decay_rate),
            ("min_confidence", l.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("learning.{} must be within [0, 1]", name)));
            }
        }
        for (name, value) in [
            ("decay_interval", l.decay_interval),
            ("consolidation_interval", l.consolidation_interval),
            ("cleanup_interval", l.cleanup_interval),
            ("feedback_window", l.feedback_window),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("learning.{} must be positive", name)));
            }
        }
        if l.batch_size == 0 {
            return Err(ConfigError::Invalid("learning.batch_size must be at least 1".into()));
        }

        let opt = &self.optimizer;
        if !(0.0..=10.0).contains(&opt.target_score) {
            return Err(ConfigError::Invalid("optimizer.target_score must be within [0, 10]".into()));
        }
        if opt.judge_timeout.is_zero() {
            return Err(ConfigError::Invalid("optimizer.judge_timeout must be positive".into()));
        }

        crate::domain::judge::normalize_criteria(&self.selection.criteria)
            .map_err(|e| ConfigError::Invalid(format!("selection.criteria: {}", e)))?;

        if self.embedding.embedding_batch == 0 || self.embedding.relationship_batch == 0 {
            return Err(ConfigError::Invalid("embedding batch sizes must be at least 1".into()));
        }
        if self.embedding.embed_timeout.is_zero() {
            return Err(ConfigError::Invalid("embedding.embed_timeout must be positive".into()));
        }

        let r = &self.ranking;
        let w = &r.weights;
        for (name, value) in [
            ("temperature", w.temperature),
            ("token", w.token),
            ("semantic", w.semantic),
            ("length", w.length),
            ("historical", w.historical),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("ranking.weights.{} must be non-negative", name)));
            }
        }
        if r.optimal_temperature <= 0.0 {
            return Err(ConfigError::Invalid("ranking.optimal_temperature must be positive".into()));
        }
        if r.embed_timeout.is_zero() {
            return Err(ConfigError::Invalid("ranking.embed_timeout must be positive".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per backend call timeout
    #[serde(default = "default_phase_timeout", with = "humantime_serde")]
    pub phase_timeout: Duration,

    /// Maximum simultaneous in-flight backend calls within one run
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Return partial results with a failure list instead of failing the request
    #[serde(default)]
    pub best_effort: bool,

    /// Ordered phase pipeline
    #[serde(default = "default_phases")]
    pub phases: Vec<PhaseBinding>,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            phase_timeout: default_phase_timeout(),
            max_concurrency: default_max_concurrency(),
            best_effort: false,
            phases: default_phases(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// How one phase is executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseBinding {
    pub name: PhaseName,

    /// Backends invoked for this phase, by registry name. Empty means "use the
    /// request's provider list".
    #[serde(default)]
    pub backends: Vec<String>,

    /// Backend retried once when a primary call fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,

    /// Handlebars template overriding the built-in phase prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl PhaseBinding {
    pub fn new(name: PhaseName) -> Self {
        Self {
            name,
            backends: Vec::new(),
            fallback: None,
            template: None,
            temperature: default_generation_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an open breaker rejects calls before admitting a trial
    #[serde(default = "default_breaker_cooldown", with = "humantime_serde")]
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown: default_breaker_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// EMA weight given to each new observation
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Relevance lost per day without use
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,

    /// Statistics untouched for longer than this are purged
    #[serde(default = "default_feedback_window", with = "humantime_serde")]
    pub feedback_window: Duration,

    /// Patterns must exceed this confidence to influence ranking; patterns
    /// below half of it are evicted
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Artifacts unused for longer than this are subject to decay
    #[serde(default = "default_decay_cutoff", with = "humantime_serde")]
    pub decay_cutoff: Duration,

    #[serde(default = "default_decay_interval", with = "humantime_serde")]
    pub decay_interval: Duration,

    #[serde(default = "default_consolidation_interval", with = "humantime_serde")]
    pub consolidation_interval: Duration,

    #[serde(default = "default_cleanup_interval", with = "humantime_serde")]
    pub cleanup_interval: Duration,

    /// Entries handled per maintenance batch before yielding
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Whether background maintenance runs at all
    #[serde(default = "default_true")]
    pub maintenance_enabled: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            decay_rate: default_decay_rate(),
            feedback_window: default_feedback_window(),
            min_confidence: default_min_confidence(),
            decay_cutoff: default_decay_cutoff(),
            decay_interval: default_decay_interval(),
            consolidation_interval: default_consolidation_interval(),
            cleanup_interval: default_cleanup_interval(),
            batch_size: default_batch_size(),
            maintenance_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Judge score (0-10) at which the loop stops
    #[serde(default = "default_target_score")]
    pub target_score: f64,

    #[serde(default = "default_judge_timeout", with = "humantime_serde")]
    pub judge_timeout: Duration,

    #[serde(default = "default_judge_temperature")]
    pub judge_temperature: f32,

    #[serde(default = "default_generation_temperature")]
    pub revision_temperature: f32,

    #[serde(default = "default_revision_timeout", with = "humantime_serde")]
    pub revision_timeout: Duration,

    #[serde(default = "default_max_tokens")]
    pub revision_max_tokens: u32,

    /// Registry name of the backend that writes revisions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_backend: Option<String>,

    /// Registry name of the backend behind the judge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_backend: Option<String>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            target_score: default_target_score(),
            judge_timeout: default_judge_timeout(),
            judge_temperature: default_judge_temperature(),
            revision_temperature: default_generation_temperature(),
            revision_timeout: default_revision_timeout(),
            revision_max_tokens: default_max_tokens(),
            revision_backend: None,
            judge_backend: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "WeightedCriterion::defaults")]
    pub criteria: Vec<WeightedCriterion>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            criteria: WeightedCriterion::defaults(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_embedding_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Artifacts embedded per tick
    #[serde(default = "default_embedding_batch")]
    pub embedding_batch: usize,

    /// High-quality artifacts analysed for relationships per tick
    #[serde(default = "default_relationship_batch")]
    pub relationship_batch: usize,

    /// Relevance an artifact needs to take part in relationship analysis
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    /// Cosine similarity above which two artifacts are related
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_max_similar")]
    pub max_similar: usize,

    /// Bound on a single embedding call
    #[serde(default = "default_embed_timeout", with = "humantime_serde")]
    pub embed_timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_embedding_interval(),
            embedding_batch: default_embedding_batch(),
            relationship_batch: default_relationship_batch(),
            quality_threshold: default_quality_threshold(),
            similarity_threshold: default_similarity_threshold(),
            max_similar: default_max_similar(),
            embed_timeout: default_embed_timeout(),
        }
    }
}

/// Scoring of generated artifacts against the request input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub weights: RankingWeights,

    /// Sampling temperature that earns a full temperature score
    #[serde(default = "default_generation_temperature")]
    pub optimal_temperature: f32,

    /// Bound on each embedding call made for semantic similarity
    #[serde(default = "default_ranking_embed_timeout", with = "humantime_serde")]
    pub embed_timeout: Duration,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: RankingWeights::default(),
            optimal_temperature: default_generation_temperature(),
            embed_timeout: default_ranking_embed_timeout(),
        }
    }
}

/// Relative factor weights; normalized to sum to 1 before use
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub temperature: f64,
    pub token: f64,
    pub semantic: f64,
    pub length: f64,
    pub historical: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            token: 0.2,
            semantic: 0.3,
            length: 0.1,
            historical: 0.2,
        }
    }
}

impl RankingWeights {
    /// Weights scaled to sum to 1. All-zero weights are returned unchanged.
    pub fn normalized(&self) -> Self {
        let sum = self.temperature + self.token + self.semantic + self.length + self.historical;
        if sum <= 0.0 {
            return *self;
        }
        Self {
            temperature: self.temperature / sum,
            token: self.token / sum,
            semantic: self.semantic / sum,
            length: self.length / sum,
            historical: self.historical / sum,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_phase_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_concurrency() -> usize {
    4
}

fn default_phases() -> Vec<PhaseBinding> {
    PhaseName::default_pipeline()
        .into_iter()
        .map(PhaseBinding::new)
        .collect()
}

fn default_generation_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_breaker_cooldown() -> Duration {
    Duration::from_secs(30)
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_decay_rate() -> f64 {
    0.01
}

fn default_feedback_window() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_decay_cutoff() -> Duration {
    Duration::from_secs(7 * 24 * 3600)
}

fn default_decay_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_consolidation_interval() -> Duration {
    Duration::from_secs(6 * 3600)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_batch_size() -> usize {
    100
}

fn default_max_iterations() -> u32 {
    5
}

fn default_target_score() -> f64 {
    8.5
}

fn default_judge_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_judge_temperature() -> f32 {
    0.1
}

fn default_revision_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_embedding_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_embedding_batch() -> usize {
    10
}

fn default_relationship_batch() -> usize {
    5
}

fn default_quality_threshold() -> f64 {
    0.7
}

fn default_similarity_threshold() -> f64 {
    0.7
}

fn default_max_similar() -> usize {
    3
}

fn default_embed_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_ranking_embed_timeout() -> Duration {
    Duration::from_secs(10)
}
