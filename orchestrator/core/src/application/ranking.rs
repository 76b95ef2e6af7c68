// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Multi-factor Ranking
//!
//! Orders the artifacts of a generation run against the request input using
//! five factors, each in [0, 1]:
//!
//! - **temperature**: closeness of the sampling temperature to the configured optimum
//! - **token**: content length inside the 100..=2000 character band scores 1
//! - **semantic**: cosine similarity between content and input embeddings
//! - **length**: ratio of the shorter to the longer of content and input
//! - **historical**: the artifact's learned relevance
//!
//! The total is the weighted sum with weights normalized to 1. Semantic
//! similarity needs an embedding-capable backend; without one, or when an
//! embedding call fails, the factor is 0 and the run is still ranked.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::artifact::{clamp_unit, Artifact, ArtifactId};
use crate::domain::config::{RankingConfig, RankingWeights};
use crate::infrastructure::llm::{BackendRegistry, GuardedBackend};

const MIN_EFFICIENT_CHARS: usize = 100;
const MAX_EFFICIENT_CHARS: usize = 2000;

/// Temperature score for artifacts generated at an unknown temperature
const UNKNOWN_TEMPERATURE_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RankingFactors {
    pub temperature: f64,
    pub token: f64,
    pub semantic: f64,
    pub length: f64,
    pub historical: f64,
}

impl RankingFactors {
    pub fn weighted(&self, weights: &RankingWeights) -> f64 {
        self.temperature * weights.temperature
            + self.token * weights.token
            + self.semantic * weights.semantic
            + self.length * weights.length
            + self.historical * weights.historical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactScore {
    pub artifact_id: ArtifactId,
    pub total: f64,
    pub factors: RankingFactors,
}

/// Artifacts and their scores, best first
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    pub artifacts: Vec<Artifact>,
    pub scores: Vec<ArtifactScore>,
}

pub struct MultiFactorRanker {
    config: RankingConfig,
    weights: RankingWeights,
    registry: Arc<BackendRegistry>,
}

impl MultiFactorRanker {
    pub fn new(config: RankingConfig, registry: Arc<BackendRegistry>) -> Self {
        Self {
            weights: config.weights.normalized(),
            config,
            registry,
        }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Score `artifacts` against `input` and sort them best first. Ties keep
    /// their incoming order.
    ///
    /// Embeddings computed for the semantic factor are attached to artifacts
    /// that had none.
    pub async fn rank(&self, artifacts: Vec<Artifact>, input: &str, cancel: &CancellationToken) -> Ranking {
        if artifacts.is_empty() {
            return Ranking::default();
        }

        let (input_vector, artifacts) = self.attach_embeddings(artifacts, input, cancel).await;

        let mut scored: Vec<(Artifact, ArtifactScore)> = artifacts
            .into_iter()
            .map(|artifact| {
                let factors = self.factors(&artifact, input, input_vector.as_deref());
                let score = ArtifactScore {
                    artifact_id: artifact.id,
                    total: factors.weighted(&self.weights),
                    factors,
                };
                debug!(
                    artifact_id = %artifact.id,
                    score = score.total,
                    temperature = factors.temperature,
                    token = factors.token,
                    semantic = factors.semantic,
                    length = factors.length,
                    historical = factors.historical,
                    "Scored artifact"
                );
                (artifact, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total.total_cmp(&a.1.total));

        let (artifacts, scores) = scored.into_iter().unzip();
        Ranking { artifacts, scores }
    }

    fn factors(&self, artifact: &Artifact, input: &str, input_vector: Option<&[f32]>) -> RankingFactors {
        let semantic = match (input_vector, artifact.embedding.as_deref()) {
            (Some(a), Some(b)) => cosine_similarity(a, b).map(clamp_unit).unwrap_or(0.0),
            _ => 0.0,
        };
        RankingFactors {
            temperature: artifact
                .temperature
                .map(|t| temperature_score(t, self.config.optimal_temperature))
                .unwrap_or(UNKNOWN_TEMPERATURE_SCORE),
            token: token_score(&artifact.content),
            semantic,
            length: length_ratio(&artifact.content, input),
            historical: clamp_unit(artifact.relevance_score),
        }
    }

    /// Embed the input and every artifact lacking an embedding. Returns the
    /// input vector, if one could be produced, with the updated artifacts.
    async fn attach_embeddings(
        &self,
        artifacts: Vec<Artifact>,
        input: &str,
        cancel: &CancellationToken,
    ) -> (Option<Vec<f32>>, Vec<Artifact>) {
        if self.weights.semantic <= 0.0 {
            return (None, artifacts);
        }
        let Some(embedder) = self.registry.guarded_embedding(self.config.embed_timeout) else {
            debug!("No embedding-capable backend registered, semantic factor is 0");
            return (None, artifacts);
        };

        let Some(input_vector) = embed(&embedder, input, cancel).await else {
            return (None, artifacts);
        };

        let artifacts = join_all(artifacts.into_iter().map(|mut artifact| {
            let embedder = &embedder;
            async move {
                if !artifact.has_embedding() {
                    artifact.embedding = embed(embedder, &artifact.content, cancel).await;
                }
                artifact
            }
        }))
        .await;
        (Some(input_vector), artifacts)
    }
}

async fn embed(embedder: &GuardedBackend, text: &str, cancel: &CancellationToken) -> Option<Vec<f32>> {
    match embedder.embed(text, cancel).await {
        Ok(vector) if !vector.is_empty() => Some(vector),
        Ok(_) => {
            warn!(backend = embedder.name(), "Backend returned an empty embedding");
            None
        }
        Err(e) => {
            warn!(backend = embedder.name(), error = %e, "Embedding for ranking failed");
            None
        }
    }
}

fn temperature_score(temperature: f32, optimal: f32) -> f64 {
    let optimal = f64::from(optimal);
    clamp_unit(1.0 - (f64::from(temperature) - optimal).abs() / optimal)
}

fn token_score(content: &str) -> f64 {
    let chars = content.chars().count();
    if chars < MIN_EFFICIENT_CHARS {
        chars as f64 / MIN_EFFICIENT_CHARS as f64
    } else if chars > MAX_EFFICIENT_CHARS {
        MAX_EFFICIENT_CHARS as f64 / chars as f64
    } else {
        1.0
    }
}

fn length_ratio(a: &str, b: &str) -> f64 {
    let (a, b) = (a.chars().count(), b.chars().count());
    if a == 0 || b == 0 {
        return 0.0;
    }
    a.min(b) as f64 / a.max(b) as f64
}

/// Cosine similarity of two vectors; `None` when lengths differ or either is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
