//! Question-level comparison between two experiment versions.
//!
//! Records are paired by position: question N of one version is compared
//! with question N of the other, whatever their prompt text. When the two
//! versions hold a different number of questions the extra ones are
//! skipped and the comparison is flagged as misaligned.

use crate::types::{MetricKind, ResultRecord, ScoreTriple};
use serde::{Deserialize, Serialize};

/// Change of one question between two versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDelta {
    /// 1-based position of the question.
    pub question_number: usize,
    pub prompt: String,
    /// Percent change; 0 when the metric is not scored on both sides.
    pub correctness: f64,
    pub correctness_weighted: f64,
    pub faithfulness: f64,
    pub previous: ScoreTriple,
    pub current: ScoreTriple,
    /// Mean of the percent changes of the metrics scored on both sides.
    pub avg_change: f64,
    /// Metrics that took part in `avg_change`.
    pub compared_metrics: Vec<MetricKind>,
}

impl QuestionDelta {
    pub fn change(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Correctness => self.correctness,
            MetricKind::CorrectnessWeighted => self.correctness_weighted,
            MetricKind::Faithfulness => self.faithfulness,
        }
    }
}

/// Outcome of comparing two versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub biggest_improvement: Option<QuestionDelta>,
    pub biggest_decline: Option<QuestionDelta>,
    /// Every qualifying question, sorted by descending `avg_change`.
    pub changes: Vec<QuestionDelta>,
    /// True when the two versions hold a different number of questions.
    pub misaligned: bool,
}

/// Percent change from `previous` to `current`.
///
/// A zero baseline maps to `+100` when the value grew and to `0` otherwise.
pub fn percentage_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current > 0.0 { 100.0 } else { 0.0 };
    }
    (current - previous) / previous * 100.0
}

/// Percent change of an aggregate metric between two versions.
///
/// Unlike [`percentage_change`] this is undefined for a zero baseline.
pub fn experiment_change(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous * 100.0)
    }
}

/// Delta of a single question pair, or `None` when no metric is scored on both sides.
pub fn question_delta(
    question_number: usize,
    current: &ResultRecord,
    previous: &ResultRecord,
) -> Option<QuestionDelta> {
    let mut changes = [0.0; 3];
    let mut compared_metrics = Vec::new();
    let mut total = 0.0;

    for (slot, metric) in MetricKind::ALL.into_iter().enumerate() {
        if let (Some(c), Some(p)) = (
            current.score(metric).value(),
            previous.score(metric).value(),
        ) {
            changes[slot] = percentage_change(c, p);
            total += changes[slot];
            compared_metrics.push(metric);
        }
    }

    if compared_metrics.is_empty() {
        return None;
    }

    Some(QuestionDelta {
        question_number,
        prompt: current.prompt_text().to_string(),
        correctness: changes[0],
        correctness_weighted: changes[1],
        faithfulness: changes[2],
        previous: previous.scores(),
        current: current.scores(),
        avg_change: total / compared_metrics.len() as f64,
        compared_metrics,
    })
}

/// Compare two versions' results question by question.
pub fn compare_metrics(current: &[ResultRecord], previous: &[ResultRecord]) -> Comparison {
    let misaligned = current.len() != previous.len();
    if misaligned {
        tracing::warn!(
            current = current.len(),
            previous = previous.len(),
            "comparing versions with different question counts; pairing by position"
        );
    }

    let mut changes: Vec<QuestionDelta> = current
        .iter()
        .zip(previous)
        .enumerate()
        .filter_map(|(index, (c, p))| question_delta(index + 1, c, p))
        .collect();

    // Stable: questions with equal change keep their original order.
    changes.sort_by(|a, b| b.avg_change.total_cmp(&a.avg_change));

    Comparison {
        biggest_improvement: changes.first().cloned(),
        biggest_decline: changes.last().cloned(),
        changes,
        misaligned,
    }
}
