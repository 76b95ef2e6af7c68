// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::llm::{BackendError, GenerationRequest, ModelBackend};

/// Upper bound of the single-candidate judge scale
pub const MAX_SCORE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedCriterion {
    pub name: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl WeightedCriterion {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Default selection criteria
    pub fn defaults() -> Vec<WeightedCriterion> {
        vec![
            Self::new("relevance", 0.3).describe("How well the candidate addresses the request"),
            Self::new("clarity", 0.3).describe("How clear and unambiguous the candidate is"),
            Self::new("completeness", 0.2).describe("Whether the candidate covers everything needed"),
            Self::new("conciseness", 0.1).describe("Absence of unnecessary content"),
            Self::new("toxicity", 0.1).describe("Freedom from harmful content (1.0 = fully safe)"),
        ]
    }
}

/// Scale weights so they sum to 1.
///
/// Fails on an empty list, duplicate names, negative or non-finite weights,
/// or a zero total.
pub fn normalize_criteria(criteria: &[WeightedCriterion]) -> Result<Vec<WeightedCriterion>, JudgeError> {
    if criteria.is_empty() {
        return Err(JudgeError::InvalidCriteria("no criteria supplied".to_string()));
    }

    let mut seen = HashSet::new();
    for c in criteria {
        if !c.weight.is_finite() || c.weight < 0.0 {
            return Err(JudgeError::InvalidCriteria(format!(
                "criterion '{}' has invalid weight {}",
                c.name, c.weight
            )));
        }
        if !seen.insert(c.name.as_str()) {
            return Err(JudgeError::InvalidCriteria(format!("duplicate criterion '{}'", c.name)));
        }
    }

    let total: f64 = criteria.iter().map(|c| c.weight).sum();
    if total <= 0.0 {
        return Err(JudgeError::InvalidCriteria("criterion weights sum to zero".to_string()));
    }

    Ok(criteria
        .iter()
        .map(|c| WeightedCriterion {
            weight: c.weight / total,
            ..c.clone()
        })
        .collect())
}

/// Structured result of judging one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Overall score on the 0-10 scale
    pub score: f64,
    pub sub_scores: BTreeMap<String, f64>,
    pub reasoning: String,
    pub improvements: Vec<String>,
}

/// Per-candidate result of a batched judge call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScores {
    /// Position of the candidate in the submitted batch
    pub index: usize,

    /// Per-criterion scores in [0, 1]
    pub sub_scores: BTreeMap<String, f64>,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Judge backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Judge response did not match the score schema: {0}")]
    Parse(String),

    #[error("Judge call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),
}

#[async_trait]
pub trait Judge: Send + Sync {
    /// Score one candidate against weighted criteria
    async fn evaluate(
        &self,
        candidate: &str,
        criteria: &[WeightedCriterion],
    ) -> Result<Evaluation, JudgeError>;

    /// Score every candidate in a single call. The result holds exactly one
    /// entry per candidate, ordered by `index`.
    async fn evaluate_batch(
        &self,
        candidates: &[String],
        criteria: &[WeightedCriterion],
    ) -> Result<Vec<CandidateScores>, JudgeError>;
}

/// Judge backed by a model backend.
///
/// Uses a low sampling temperature and a short per-call timeout. Responses
/// that do not match the schema are reported as [`JudgeError::Parse`]; no
/// default score is ever substituted.
pub struct LlmJudge {
    backend: Arc<dyn ModelBackend>,
    temperature: f32,
    batch_temperature: f32,
    timeout: Duration,
    max_tokens: u32,
}

const JUDGE_SYSTEM_PROMPT: &str =
    "You are a strict, consistent evaluator. Respond only with the JSON requested.";

impl LlmJudge {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            backend,
            temperature: 0.1,
            batch_temperature: 0.0,
            timeout: Duration::from_secs(15),
            max_tokens: 1024,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn call(&self, prompt: String, temperature: f32) -> Result<String, JudgeError> {
        let request = GenerationRequest::new(JUDGE_SYSTEM_PROMPT, prompt)
            .temperature(temperature)
            .max_tokens(self.max_tokens);

        let response = tokio::time::timeout(self.timeout, self.backend.generate(&request))
            .await
            .map_err(|_| JudgeError::Timeout(self.timeout))??;
        Ok(response.content)
    }

    fn criteria_block(criteria: &[WeightedCriterion]) -> String {
        criteria
            .iter()
            .map(|c| match &c.description {
                Some(d) => format!("- {} (weight {:.2}): {}", c.name, c.weight, d),
                None => format!("- {} (weight {:.2})", c.name, c.weight),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn evaluation_prompt(candidate: &str, criteria: &[WeightedCriterion]) -> String {
        format!(
            r#"Evaluate the candidate below.

Candidate:
```
{candidate}
```

Criteria:
{criteria}

Respond in JSON format:
{{
  "score": 0-10 overall score,
  "sub_scores": {{"<criterion>": 0-10}},
  "reasoning": "Brief explanation",
  "improvements": ["Concrete, actionable improvement"]
}}"#,
            candidate = candidate,
            criteria = Self::criteria_block(criteria),
        )
    }

    fn batch_prompt(candidates: &[String], criteria: &[WeightedCriterion]) -> String {
        let listed = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("Candidate {}:\n```\n{}\n```", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n\n");
        let names = criteria
            .iter()
            .map(|c| format!("\"{}\": 0.0-1.0", c.name))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"Score every candidate below against each criterion.

{listed}

Criteria:
{criteria}

Respond with a JSON array containing one object per candidate:
[
  {{"candidate": 1, "scores": {{{names}}}, "confidence": 0.0-1.0, "reasoning": "Brief explanation"}}
]"#,
            listed = listed,
            criteria = Self::criteria_block(criteria),
            names = names,
        )
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn evaluate(
        &self,
        candidate: &str,
        criteria: &[WeightedCriterion],
    ) -> Result<Evaluation, JudgeError> {
        let content = self
            .call(Self::evaluation_prompt(candidate, criteria), self.temperature)
            .await?;
        parse_evaluation(&content)
    }

    async fn evaluate_batch(
        &self,
        candidates: &[String],
        criteria: &[WeightedCriterion],
    ) -> Result<Vec<CandidateScores>, JudgeError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let content = self
            .call(Self::batch_prompt(candidates, criteria), self.batch_temperature)
            .await?;
        parse_batch(&content, candidates.len(), criteria)
    }
}

#[derive(Deserialize)]
struct RawEvaluation {
    score: f64,
    #[serde(default)]
    sub_scores: BTreeMap<String, f64>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    improvements: Vec<String>,
}

#[derive(Deserialize)]
struct RawCandidateScores {
    candidate: usize,
    scores: BTreeMap<String, f64>,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

/// Pull a JSON document out of a model response: a fenced ```json block, a
/// generic fenced block, or the outermost `{...}` / `[...]` span.
pub fn extract_json(text: &str) -> Option<&str> {
    for marker in ["```json", "```"] {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end_offset) = text[content_start..].find("```") {
                return Some(text[content_start..content_start + end_offset].trim());
            }
        }
    }

    let trimmed = text.trim();
    let open = trimmed.find(['{', '['])?;
    let close_char = if trimmed[open..].starts_with('{') { '}' } else { ']' };
    let close = trimmed.rfind(close_char)?;
    (close > open).then(|| &trimmed[open..=close])
}

fn in_range(value: f64, max: f64) -> bool {
    value.is_finite() && (0.0..=max).contains(&value)
}

pub fn parse_evaluation(content: &str) -> Result<Evaluation, JudgeError> {
    let json = extract_json(content)
        .ok_or_else(|| JudgeError::Parse("no JSON object in judge response".to_string()))?;
    let raw: RawEvaluation =
        serde_json::from_str(json).map_err(|e| JudgeError::Parse(e.to_string()))?;

    if !in_range(raw.score, MAX_SCORE) {
        return Err(JudgeError::Parse(format!("score {} outside 0-10", raw.score)));
    }
    if let Some((name, value)) = raw.sub_scores.iter().find(|(_, v)| !in_range(**v, MAX_SCORE)) {
        return Err(JudgeError::Parse(format!("sub-score '{}' = {} outside 0-10", name, value)));
    }

    Ok(Evaluation {
        score: raw.score,
        sub_scores: raw.sub_scores,
        reasoning: raw.reasoning,
        improvements: raw.improvements,
    })
}

/// Parse a batched judge response. Every candidate must appear exactly once
/// and carry a [0, 1] score for every criterion.
pub fn parse_batch(
    content: &str,
    expected: usize,
    criteria: &[WeightedCriterion],
) -> Result<Vec<CandidateScores>, JudgeError> {
    let json = extract_json(content)
        .ok_or_else(|| JudgeError::Parse("no JSON array in judge response".to_string()))?;
    let raw: Vec<RawCandidateScores> =
        serde_json::from_str(json).map_err(|e| JudgeError::Parse(e.to_string()))?;

    if raw.len() != expected {
        return Err(JudgeError::Parse(format!(
            "expected scores for {} candidates, got {}",
            expected,
            raw.len()
        )));
    }

    let mut parsed: Vec<CandidateScores> = Vec::with_capacity(expected);
    let mut seen = HashSet::new();
    for entry in raw {
        if entry.candidate == 0 || entry.candidate > expected || !seen.insert(entry.candidate) {
            return Err(JudgeError::Parse(format!(
                "unexpected or duplicate candidate number {}",
                entry.candidate
            )));
        }
        if !in_range(entry.confidence, 1.0) {
            return Err(JudgeError::Parse(format!(
                "candidate {} confidence {} outside 0-1",
                entry.candidate, entry.confidence
            )));
        }
        for criterion in criteria {
            match entry.scores.get(&criterion.name) {
                Some(v) if in_range(*v, 1.0) => {}
                Some(v) => {
                    return Err(JudgeError::Parse(format!(
                        "candidate {} criterion '{}' = {} outside 0-1",
                        entry.candidate, criterion.name, v
                    )))
                }
                None => {
                    return Err(JudgeError::Parse(format!(
                        "candidate {} missing criterion '{}'",
                        entry.candidate, criterion.name
                    )))
                }
            }
        }

        parsed.push(CandidateScores {
            index: entry.candidate - 1,
            sub_scores: entry.scores,
            confidence: entry.confidence,
            reasoning: entry.reasoning,
        });
    }

    parsed.sort_by_key(|s| s.index);
    Ok(parsed)
}
