// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Batched Candidate Selection
//!
//! Scores N ready-made candidates with one judge call and picks the best by
//! weighted criteria. Weights are normalized to sum to 1. A judge response
//! that does not match the score schema fails the selection; there is no
//! default score.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::artifact::{Artifact, ArtifactId};
use crate::domain::events::OptimizationEvent;
use crate::domain::judge::{normalize_criteria, Judge, JudgeError, WeightedCriterion};
use crate::infrastructure::event_bus::EventBus;

/// Orders artifacts by learned preference. Used to break score ties.
pub trait ArtifactRanker: Send + Sync {
    /// Ids of `artifacts`, most preferred first
    fn rank_order(&self, artifacts: &[Artifact]) -> Vec<ArtifactId>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionScore {
    pub candidate: ArtifactId,

    /// Position of the candidate in the submitted list
    pub position: usize,

    /// Weighted overall score in [0, 1]
    pub overall: f64,
    pub sub_scores: BTreeMap<String, f64>,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub selected: SelectionScore,

    /// Remaining candidates, best first
    pub alternatives: Vec<SelectionScore>,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("No candidates to select from")]
    NoCandidates,

    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("Judge failed: {0}")]
    Judge(#[source] JudgeError),
}

impl From<JudgeError> for SelectionError {
    fn from(e: JudgeError) -> Self {
        match e {
            JudgeError::InvalidCriteria(reason) => SelectionError::InvalidCriteria(reason),
            other => SelectionError::Judge(other),
        }
    }
}

pub struct CandidateSelector {
    judge: Arc<dyn Judge>,
    event_bus: EventBus,
    criteria: Vec<WeightedCriterion>,
    ranker: Option<Arc<dyn ArtifactRanker>>,
}

impl CandidateSelector {
    pub fn new(judge: Arc<dyn Judge>, event_bus: EventBus) -> Self {
        Self {
            judge,
            event_bus,
            criteria: WeightedCriterion::defaults(),
            ranker: None,
        }
    }

    pub fn with_criteria(mut self, criteria: Vec<WeightedCriterion>) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn ArtifactRanker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    /// Select among `candidates` using the configured criteria
    pub async fn select(&self, candidates: &[Artifact]) -> Result<SelectionOutcome, SelectionError> {
        self.select_with(candidates, &self.criteria).await
    }

    /// Select among `candidates` using caller-supplied criteria
    pub async fn select_with(
        &self,
        candidates: &[Artifact],
        criteria: &[WeightedCriterion],
    ) -> Result<SelectionOutcome, SelectionError> {
        if candidates.is_empty() {
            return Err(SelectionError::NoCandidates);
        }
        let criteria = normalize_criteria(criteria)?;

        let texts: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let scored = self.judge.evaluate_batch(&texts, &criteria).await?;
        if scored.len() != candidates.len() {
            return Err(SelectionError::Judge(JudgeError::Parse(format!(
                "expected {} scored candidates, got {}",
                candidates.len(),
                scored.len()
            ))));
        }

        let preference: HashMap<ArtifactId, usize> = self
            .ranker
            .as_ref()
            .map(|r| {
                r.rank_order(candidates)
                    .into_iter()
                    .enumerate()
                    .map(|(pos, id)| (id, pos))
                    .collect()
            })
            .unwrap_or_default();

        let mut seen = vec![false; candidates.len()];
        let mut scores = Vec::with_capacity(scored.len());
        for entry in scored {
            let candidate = candidates.get(entry.index).ok_or_else(|| {
                SelectionError::Judge(JudgeError::Parse(format!("candidate index {} out of range", entry.index)))
            })?;
            if std::mem::replace(&mut seen[entry.index], true) {
                return Err(SelectionError::Judge(JudgeError::Parse(format!(
                    "candidate {} scored more than once",
                    entry.index + 1
                ))));
            }

            let mut overall = 0.0;
            for c in &criteria {
                let score = entry.sub_scores.get(&c.name).copied().ok_or_else(|| {
                    SelectionError::Judge(JudgeError::Parse(format!(
                        "candidate {} is missing a score for '{}'",
                        entry.index + 1,
                        c.name
                    )))
                })?;
                overall += c.weight * score;
            }
            scores.push(SelectionScore {
                candidate: candidate.id,
                position: entry.index,
                overall,
                sub_scores: entry.sub_scores,
                confidence: entry.confidence,
                reasoning: entry.reasoning,
            });
        }

        scores.sort_by(|a, b| {
            tie_key(b.overall)
                .cmp(&tie_key(a.overall))
                .then_with(|| preference_of(&preference, a).cmp(&preference_of(&preference, b)))
                .then_with(|| a.position.cmp(&b.position))
        });

        let mut ranked = scores.into_iter();
        let selected = ranked.next().ok_or(SelectionError::NoCandidates)?;
        let alternatives: Vec<SelectionScore> = ranked.collect();

        debug!(alternatives = alternatives.len(), "Ranked candidates");
        info!(
            artifact_id = %selected.candidate,
            score = selected.overall,
            candidates = candidates.len(),
            "Candidate selected"
        );
        self.event_bus.publish_optimization_event(OptimizationEvent::CandidateSelected {
            artifact_id: selected.candidate,
            score: selected.overall,
            candidate_count: candidates.len(),
            selected_at: Utc::now(),
        });

        Ok(SelectionOutcome { selected, alternatives })
    }
}

/// Scores equal to nine decimal places count as tied
fn tie_key(score: f64) -> i64 {
    (score * 1e9).round() as i64
}

fn preference_of(preference: &HashMap<ArtifactId, usize>, score: &SelectionScore) -> usize {
    preference.get(&score.candidate).copied().unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::artifact::PhaseName;
    use crate::domain::judge::{CandidateScores, Evaluation};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Gives every criterion the same per-candidate score
    struct FlatJudge {
        scores: Vec<f64>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Judge for FlatJudge {
        async fn evaluate(&self, _: &str, _: &[WeightedCriterion]) -> Result<Evaluation, JudgeError> {
            unreachable!("selection uses batch scoring")
        }

        async fn evaluate_batch(
            &self,
            candidates: &[String],
            criteria: &[WeightedCriterion],
        ) -> Result<Vec<CandidateScores>, JudgeError> {
            *self.calls.lock() += 1;
            Ok(candidates
                .iter()
                .enumerate()
                .map(|(index, _)| CandidateScores {
                    index,
                    sub_scores: criteria.iter().map(|c| (c.name.clone(), self.scores[index])).collect(),
                    confidence: 0.9,
                    reasoning: format!("candidate {}", index + 1),
                })
                .collect())
        }
    }

    struct BrokenJudge;

    #[async_trait]
    impl Judge for BrokenJudge {
        async fn evaluate(&self, _: &str, _: &[WeightedCriterion]) -> Result<Evaluation, JudgeError> {
            Err(JudgeError::Parse("garbage".to_string()))
        }

        async fn evaluate_batch(
            &self,
            _: &[String],
            _: &[WeightedCriterion],
        ) -> Result<Vec<CandidateScores>, JudgeError> {
            Err(JudgeError::Parse("garbage".to_string()))
        }
    }

    struct ReverseRanker;

    impl ArtifactRanker for ReverseRanker {
        fn rank_order(&self, artifacts: &[Artifact]) -> Vec<ArtifactId> {
            artifacts.iter().rev().map(|a| a.id).collect()
        }
    }

    fn candidates(n: usize) -> Vec<Artifact> {
        (0..n)
            .map(|i| Artifact::new(format!("candidate {}", i + 1), PhaseName::refinement(), "b", "m"))
            .collect()
    }

    fn selector_for(scores: Vec<f64>) -> (Arc<FlatJudge>, CandidateSelector) {
        let judge = Arc::new(FlatJudge {
            scores,
            calls: Mutex::new(0),
        });
        let selector = CandidateSelector::new(judge.clone(), EventBus::new(8));
        (judge, selector)
    }

    #[tokio::test]
    async fn test_selects_highest_weighted_score() {
        let (judge, selector) = selector_for(vec![0.8, 0.7, 0.6]);
        let list = candidates(3);
        let outcome = selector.select(&list).await.unwrap();

        assert_eq!(outcome.selected.candidate, list[0].id);
        assert!((outcome.selected.overall - 0.8).abs() < 1e-9);
        let alternatives: Vec<ArtifactId> = outcome.alternatives.iter().map(|s| s.candidate).collect();
        assert_eq!(alternatives, vec![list[1].id, list[2].id]);
        assert_eq!(*judge.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_weights_are_normalized() {
        let (_, selector) = selector_for(vec![0.4, 0.9]);
        let criteria = vec![WeightedCriterion::new("relevance", 3.0), WeightedCriterion::new("clarity", 1.0)];
        let outcome = selector.select_with(&candidates(2), &criteria).await.unwrap();
        assert!((outcome.selected.overall - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ties_follow_input_order_without_ranker() {
        let (_, selector) = selector_for(vec![0.5, 0.5, 0.5]);
        let list = candidates(3);
        let outcome = selector.select(&list).await.unwrap();
        assert_eq!(outcome.selected.candidate, list[0].id);
    }

    #[tokio::test]
    async fn test_ties_follow_ranker_order() {
        let (_, selector) = selector_for(vec![0.5, 0.5, 0.2]);
        let selector = selector.with_ranker(Arc::new(ReverseRanker));
        let list = candidates(3);
        let outcome = selector.select(&list).await.unwrap();
        assert_eq!(outcome.selected.candidate, list[1].id);
        assert_eq!(outcome.alternatives[0].candidate, list[0].id);
    }

    #[tokio::test]
    async fn test_parse_failure_propagates() {
        let selector = CandidateSelector::new(Arc::new(BrokenJudge), EventBus::new(8));
        let err = selector.select(&candidates(2)).await.unwrap_err();
        assert!(matches!(err, SelectionError::Judge(JudgeError::Parse(_))));
    }

    /// Replays a fixed batch response regardless of input
    struct CannedJudge(Vec<CandidateScores>);

    #[async_trait]
    impl Judge for CannedJudge {
        async fn evaluate(&self, _: &str, _: &[WeightedCriterion]) -> Result<Evaluation, JudgeError> {
            unreachable!("selection uses batch scoring")
        }

        async fn evaluate_batch(
            &self,
            _: &[String],
            _: &[WeightedCriterion],
        ) -> Result<Vec<CandidateScores>, JudgeError> {
            Ok(self.0.clone())
        }
    }

    fn scores(index: usize, criteria: &[&str], value: f64) -> CandidateScores {
        CandidateScores {
            index,
            sub_scores: criteria.iter().map(|c| (c.to_string(), value)).collect(),
            confidence: 0.5,
            reasoning: String::new(),
        }
    }

    #[tokio::test]
    async fn test_missing_criterion_score_is_rejected() {
        let criteria = vec![WeightedCriterion::new("relevance", 1.0), WeightedCriterion::new("clarity", 1.0)];
        let judge = CannedJudge(vec![scores(0, &["relevance", "clarity"], 0.9), scores(1, &["relevance"], 0.9)]);
        let selector = CandidateSelector::new(Arc::new(judge), EventBus::new(8));

        let err = selector.select_with(&candidates(2), &criteria).await.unwrap_err();
        assert!(matches!(err, SelectionError::Judge(JudgeError::Parse(ref m)) if m.contains("clarity")));
    }

    #[tokio::test]
    async fn test_duplicate_candidate_index_is_rejected() {
        let criteria = vec![WeightedCriterion::new("relevance", 1.0)];
        let judge = CannedJudge(vec![scores(0, &["relevance"], 0.9), scores(0, &["relevance"], 0.1)]);
        let selector = CandidateSelector::new(Arc::new(judge), EventBus::new(8));

        let err = selector.select_with(&candidates(2), &criteria).await.unwrap_err();
        assert!(matches!(err, SelectionError::Judge(JudgeError::Parse(_))));
    }

    #[tokio::test]
    async fn test_empty_and_invalid_inputs() {
        let (_, selector) = selector_for(vec![]);
        assert!(matches!(selector.select(&[]).await, Err(SelectionError::NoCandidates)));

        let (_, selector) = selector_for(vec![0.5]);
        let err = selector
            .select_with(&candidates(1), &[WeightedCriterion::new("relevance", -1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::InvalidCriteria(_)));
    }
}
