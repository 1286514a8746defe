//! Per-metric aggregation with a memoizing cache.
//!
//! Each metric is averaged independently: a record that is unscored for one
//! metric still contributes its other scores.

use crate::types::{MetricKind, ResultRecord, Score, ScoreTriple};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default lifetime of a cached aggregation.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Faithfulness at or above this value counts as high.
pub const HIGH_FAITHFULNESS_THRESHOLD: f64 = 0.85;

/// Average score per metric. A metric with no scored records averages to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub correctness: f64,
    pub correctness_weighted: f64,
    pub faithfulness: f64,
}

impl Metrics {
    pub fn get(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::Correctness => self.correctness,
            MetricKind::CorrectnessWeighted => self.correctness_weighted,
            MetricKind::Faithfulness => self.faithfulness,
        }
    }
}

/// Raw per-record scores, sentinels included, in record order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndividualScores {
    pub correctness: Vec<Score>,
    pub correctness_weighted: Vec<Score>,
    pub faithfulness: Vec<Score>,
}

impl IndividualScores {
    pub fn get(&self, metric: MetricKind) -> &[Score] {
        match metric {
            MetricKind::Correctness => &self.correctness,
            MetricKind::CorrectnessWeighted => &self.correctness_weighted,
            MetricKind::Faithfulness => &self.faithfulness,
        }
    }
}

/// Result of [`MetricsCalculator::calculate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsOutcome {
    pub metrics: Metrics,
    pub individual_scores: IndividualScores,
}

struct CacheEntry {
    outcome: MetricsOutcome,
    stored_at: Instant,
}

/// Computes [`Metrics`] and memoizes them by score content.
///
/// The cache key covers only the three scores of every record, so two
/// batches that differ in prompts but not in scores share an entry.
/// Entries are recomputed on access once older than the TTL; there is no
/// other eviction.
pub struct MetricsCalculator {
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
    computations: AtomicU64,
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl MetricsCalculator {
    /// Create a calculator whose cache entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
            computations: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of times an outcome was computed rather than served from cache.
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.lock_cache().clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.lock_cache().len()
    }

    /// Compute per-metric averages and raw score arrays for `results`.
    pub fn calculate(&self, results: &[ResultRecord]) -> MetricsOutcome {
        let Some(key) = cache_key(results) else {
            return self.compute(results);
        };

        if let Some(entry) = self.lock_cache().get(&key) {
            if entry.stored_at.elapsed() < self.ttl {
                tracing::debug!(records = results.len(), "metrics cache hit");
                return entry.outcome.clone();
            }
        }

        let outcome = self.compute(results);
        self.lock_cache().insert(
            key,
            CacheEntry {
                outcome: outcome.clone(),
                stored_at: Instant::now(),
            },
        );
        outcome
    }

    fn compute(&self, results: &[ResultRecord]) -> MetricsOutcome {
        self.computations.fetch_add(1, Ordering::Relaxed);

        let metrics = Metrics {
            correctness: average(results, MetricKind::Correctness),
            correctness_weighted: average(results, MetricKind::CorrectnessWeighted),
            faithfulness: average(results, MetricKind::Faithfulness),
        };

        tracing::debug!(
            records = results.len(),
            correctness = metrics.correctness,
            correctness_weighted = metrics.correctness_weighted,
            faithfulness = metrics.faithfulness,
            "computed metrics"
        );

        let column = |metric: MetricKind| -> Vec<Score> {
            results.iter().map(|r| r.score(metric).clone()).collect()
        };

        MetricsOutcome {
            metrics,
            individual_scores: IndividualScores {
                correctness: column(MetricKind::Correctness),
                correctness_weighted: column(MetricKind::CorrectnessWeighted),
                faithfulness: column(MetricKind::Faithfulness),
            },
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn cache_key(results: &[ResultRecord]) -> Option<String> {
    let triples: Vec<ScoreTriple> = results.iter().map(ResultRecord::scores).collect();
    serde_json::to_string(&triples).ok()
}

/// Mean of the scored values of one metric, or 0 when none are scored.
pub fn average(results: &[ResultRecord], metric: MetricKind) -> f64 {
    let (sum, count) = results
        .iter()
        .filter_map(|r| r.score(metric).value())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count > 0 { sum / count as f64 } else { 0.0 }
}

/// Number of scored questions per metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredCounts {
    pub correctness: usize,
    pub correctness_weighted: usize,
    pub faithfulness: usize,
}

impl ScoredCounts {
    pub fn get(&self, metric: MetricKind) -> usize {
        match metric {
            MetricKind::Correctness => self.correctness,
            MetricKind::CorrectnessWeighted => self.correctness_weighted,
            MetricKind::Faithfulness => self.faithfulness,
        }
    }
}

pub fn scored_counts(results: &[ResultRecord]) -> ScoredCounts {
    let count = |metric: MetricKind| results.iter().filter(|r| r.score(metric).is_scored()).count();
    ScoredCounts {
        correctness: count(MetricKind::Correctness),
        correctness_weighted: count(MetricKind::CorrectnessWeighted),
        faithfulness: count(MetricKind::Faithfulness),
    }
}

/// Questions scored on all three metrics versus the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringSplit {
    pub scored: usize,
    pub unscored: usize,
}

pub fn fully_scored_split(results: &[ResultRecord]) -> ScoringSplit {
    let scored = results.iter().filter(|r| r.is_fully_scored()).count();
    ScoringSplit {
        scored,
        unscored: results.len() - scored,
    }
}

/// How many scored answers reach a faithfulness threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaithfulnessStats {
    pub high_faithfulness: usize,
    pub total_valid: usize,
}

pub fn high_faithfulness(results: &[ResultRecord], threshold: f64) -> FaithfulnessStats {
    let scored: Vec<f64> = results.iter().filter_map(|r| r.faithfulness.value()).collect();
    FaithfulnessStats {
        high_faithfulness: scored.iter().filter(|v| **v >= threshold).count(),
        total_valid: scored.len(),
    }
}
