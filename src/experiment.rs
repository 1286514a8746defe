//! Experiment assembly.
//!
//! An [`Experiment`] bundles one version's raw results with their metrics
//! and validation report. Loading an experiment also loads every earlier
//! version so the change against the previous version is available
//! immediately. Versions are kept in an [`ExperimentHistory`] keyed by
//! version number; an experiment refers to its predecessor by version.

use crate::error::{DashboardError, Result};
use crate::metrics::{
    FaithfulnessStats, IndividualScores, Metrics, MetricsCalculator, ScoredCounts, ScoringSplit,
    HIGH_FAITHFULNESS_THRESHOLD,
};
use crate::source::{DataSource, ExperimentEntry, ExperimentIndex};
use crate::types::ResultRecord;
use crate::validator::{self, ValidationCheck, ValidationReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One assembled experiment version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub name: String,
    pub description: String,
    /// 1-based chronological position.
    pub version: u32,
    /// Where the results were read from.
    pub data_path: String,
    /// Every record as loaded, including invalid ones.
    pub results: Vec<ResultRecord>,
    pub metrics: Metrics,
    pub individual_scores: IndividualScores,
    pub validation: ValidationReport,
    pub checks: Vec<ValidationCheck>,
    /// Version of the previous experiment, when it was loaded.
    pub previous_version: Option<u32>,
}

impl Experiment {
    pub fn total_questions(&self) -> usize {
        self.results.len()
    }

    pub fn valid_questions(&self) -> usize {
        self.validation.valid_count()
    }

    pub fn scored_counts(&self) -> ScoredCounts {
        crate::metrics::scored_counts(&self.results)
    }

    pub fn scoring_split(&self) -> ScoringSplit {
        crate::metrics::fully_scored_split(&self.results)
    }

    pub fn faithfulness_stats(&self) -> FaithfulnessStats {
        crate::metrics::high_faithfulness(&self.results, HIGH_FAITHFULNESS_THRESHOLD)
    }
}

/// A loaded experiment together with the earlier versions that loaded.
///
/// The chain from the head back through `previous_version` always ends at
/// version 1 or at the first version that failed to load.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentHistory {
    experiments: BTreeMap<u32, Experiment>,
    head: u32,
}

impl ExperimentHistory {
    fn new(head: Experiment) -> Self {
        let version = head.version;
        let mut experiments = BTreeMap::new();
        experiments.insert(version, head);
        Self {
            experiments,
            head: version,
        }
    }

    /// The experiment that was requested.
    pub fn current(&self) -> &Experiment {
        &self.experiments[&self.head]
    }

    pub fn get(&self, version: u32) -> Option<&Experiment> {
        self.experiments.get(&version)
    }

    pub fn by_name(&self, name: &str) -> Option<&Experiment> {
        self.experiments.values().find(|e| e.name == name)
    }

    /// The predecessor of `experiment` in this history.
    pub fn previous(&self, experiment: &Experiment) -> Option<&Experiment> {
        experiment.previous_version.and_then(|v| self.get(v))
    }

    /// Walk from the current experiment back to the oldest loaded one.
    pub fn chain(&self) -> impl Iterator<Item = &Experiment> {
        std::iter::successors(Some(self.current()), |e| self.previous(e))
    }

    /// Loaded versions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Experiment> {
        self.experiments.values()
    }

    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}

/// Loads experiments from a [`DataSource`] and assembles them.
pub struct ExperimentLoader<S> {
    source: S,
    calculator: Arc<MetricsCalculator>,
}

impl<S: DataSource> ExperimentLoader<S> {
    /// Create a loader with its own metrics calculator.
    pub fn new(source: S) -> Self {
        Self::with_calculator(source, Arc::new(MetricsCalculator::default()))
    }

    /// Create a loader sharing an existing metrics calculator.
    pub fn with_calculator(source: S, calculator: Arc<MetricsCalculator>) -> Self {
        Self { source, calculator }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn calculator(&self) -> &MetricsCalculator {
        &self.calculator
    }

    /// Load and check the experiment index.
    pub async fn index(&self) -> Result<ExperimentIndex> {
        let entries = self.source.load_index().await?;
        ExperimentIndex::new(entries)
    }

    /// Load the raw records of one experiment.
    pub async fn load_raw(&self, entry: &ExperimentEntry) -> Result<Vec<ResultRecord>> {
        let value = self
            .source
            .load_run(entry)
            .await
            .map_err(|e| match e {
                e @ DashboardError::LoadFailure { .. } => e,
                other => DashboardError::load(&entry.name, other),
            })?;

        let serde_json::Value::Array(items) = value else {
            return Err(DashboardError::StructuralFailure(entry.name.clone()));
        };

        tracing::info!(experiment = %entry.name, records = items.len(), "loaded raw results");

        Ok(items.into_iter().map(ResultRecord::from_value).collect())
    }

    /// Load, validate and aggregate one experiment without its predecessors.
    pub async fn assemble(&self, entry: &ExperimentEntry) -> Result<Experiment> {
        let results = self.load_raw(entry).await?;

        let description = match self.source.load_description(entry).await {
            Some(text) => text,
            None if !entry.description.trim().is_empty() => entry.description.clone(),
            None => description_from_name(&entry.name),
        };

        let validation = validator::validate(&results);
        validator::log_report(&entry.name, &validation);
        let checks = validator::validation_checks(&results, &validation);
        let outcome = self.calculator.calculate(&results);

        Ok(Experiment {
            name: entry.name.clone(),
            description,
            version: entry.version,
            data_path: self.source.data_path(entry),
            results,
            metrics: outcome.metrics,
            individual_scores: outcome.individual_scores,
            validation,
            checks,
            previous_version: None,
        })
    }

    /// Load an experiment and its earlier versions.
    ///
    /// Returns `None` when the experiment itself cannot be loaded; the cause
    /// is logged. A failing earlier version only ends the chain.
    pub async fn load_experiment(&self, name: &str) -> Option<ExperimentHistory> {
        match self.try_load_experiment(name).await {
            Ok(history) => Some(history),
            Err(e) => {
                tracing::error!(experiment = name, error = %e, "failed to load experiment");
                None
            }
        }
    }

    /// Like [`load_experiment`](Self::load_experiment), but reports the failure.
    pub async fn try_load_experiment(&self, name: &str) -> Result<ExperimentHistory> {
        let index = self.index().await?;
        let entry = index
            .get(name)
            .ok_or_else(|| DashboardError::ExperimentNotFound(name.to_string()))?;

        let mut history = ExperimentHistory::new(self.assemble(entry).await?);

        let mut successor = entry.version;
        while let Some(entry) = successor.checked_sub(1).and_then(|v| index.by_version(v)) {
            match self.assemble(entry).await {
                Ok(experiment) => {
                    if let Some(next) = history.experiments.get_mut(&successor) {
                        next.previous_version = Some(entry.version);
                    }
                    history.experiments.insert(entry.version, experiment);
                    successor = entry.version;
                }
                Err(e) => {
                    tracing::warn!(
                        experiment = %entry.name,
                        version = entry.version,
                        error = %e,
                        "previous version failed to load"
                    );
                    break;
                }
            }
        }

        Ok(history)
    }

    /// Load the experiment with the given version and its earlier versions.
    pub async fn load_version(&self, version: u32) -> Result<ExperimentHistory> {
        let index = self.index().await?;
        let entry = index
            .by_version(version)
            .ok_or(DashboardError::VersionNotFound(version))?;
        self.try_load_experiment(&entry.name).await
    }

    /// Load every indexed experiment once, in version order.
    ///
    /// Experiments that fail to load are skipped. `previous_version` is set
    /// when the directly preceding version loaded.
    pub async fn load_all(&self) -> Result<Vec<Experiment>> {
        let index = self.index().await?;
        let mut experiments: Vec<Experiment> = Vec::with_capacity(index.len());

        for entry in index.entries() {
            match self.assemble(entry).await {
                Ok(mut experiment) => {
                    if experiments
                        .last()
                        .is_some_and(|p| p.version + 1 == entry.version)
                    {
                        experiment.previous_version = Some(entry.version - 1);
                    }
                    experiments.push(experiment);
                }
                Err(e) => {
                    tracing::error!(
                        experiment = %entry.name,
                        error = %e,
                        "failed to load experiment"
                    );
                }
            }
        }

        Ok(experiments)
    }
}

/// Title-case an experiment name: `results_basic_prompts` becomes `Results Basic Prompts`.
pub fn description_from_name(name: &str) -> String {
    let mut description = String::with_capacity(name.len());
    let mut at_word_start = true;
    for c in name.chars() {
        let c = if c == '_' { ' ' } else { c };
        if at_word_start {
            description.extend(c.to_uppercase());
        } else {
            description.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Bundle;
    use crate::source::BundleSource;
    use crate::types::Score;
    use serde_json::{Value, json};

    const NAMES: [&str; 3] = [
        "results_basic_prompts",
        "results_perfect_prompts",
        "results_perfect_prompts_4o",
    ];

    fn run(scores: &[f64]) -> Value {
        Value::Array(
            scores
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    json!({
                        "run_name": format!("run-{}", i),
                        "prompt": format!("Question {}", i + 1),
                        "response": "answer",
                        "correctness": s,
                        "correctness_weighted": s,
                        "faithfulness": s,
                        "correctness_claims": [],
                        "correctness_weighted_claims": [],
                        "faithfulness_claims": []
                    })
                })
                .collect(),
        )
    }

    fn bundle() -> Bundle {
        let mut bundle = Bundle::default();
        for (i, name) in NAMES.iter().enumerate() {
            let version = i as u32 + 1;
            let mut entry = ExperimentEntry::new(*name, version, format!("{}. {}", version, name));
            if version == 2 {
                entry.description = "Perfected prompts".to_string();
            }
            bundle.experiments.push(entry);
            bundle
                .experiment_results
                .insert(name.to_string(), run(&[0.2 * version as f64, -1.0]));
        }
        bundle
    }

    fn loader(bundle: Bundle) -> ExperimentLoader<BundleSource> {
        ExperimentLoader::new(BundleSource::new(bundle))
    }

    #[tokio::test]
    async fn test_first_version_has_no_previous() {
        let history = loader(bundle()).load_experiment(NAMES[0]).await.unwrap();
        let current = history.current();

        assert_eq!(current.version, 1);
        assert_eq!(current.previous_version, None);
        assert_eq!(history.len(), 1);
        assert_eq!(current.description, "Results Basic Prompts");
        assert_eq!(current.data_path, "bundle:results_basic_prompts");
    }

    #[tokio::test]
    async fn test_chain_reaches_version_one() {
        let history = loader(bundle()).load_experiment(NAMES[2]).await.unwrap();
        let current = history.current();

        assert_eq!(current.version, 3);
        let previous = history.previous(current).unwrap();
        assert_eq!(previous.version, 2);
        assert_eq!(previous.description, "Perfected prompts");

        let versions: Vec<u32> = history.chain().map(|e| e.version).collect();
        assert_eq!(versions, vec![3, 2, 1]);
        assert_eq!(history.by_name(NAMES[0]).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_metrics_and_validation_are_attached() {
        let history = loader(bundle()).load_experiment(NAMES[1]).await.unwrap();
        let current = history.current();

        assert!((current.metrics.correctness - 0.4).abs() < 1e-9);
        assert_eq!(
            current.individual_scores.correctness,
            vec![Score::Scored(0.4), Score::Unscored]
        );
        assert!(current.validation.is_valid);
        assert_eq!(current.total_questions(), 2);
        assert_eq!(current.valid_questions(), 2);
        assert_eq!(current.checks.len(), 3);
        assert_eq!(current.scored_counts().correctness, 1);
    }

    #[tokio::test]
    async fn test_unknown_experiment_returns_none() {
        let loader = loader(bundle());
        assert!(loader.load_experiment("does_not_exist").await.is_none());
        assert!(matches!(
            loader.try_load_experiment("does_not_exist").await,
            Err(DashboardError::ExperimentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_structural_failure_returns_none() {
        let mut bundle = bundle();
        bundle
            .experiment_results
            .insert(NAMES[2].to_string(), json!({"results": []}));

        let loader = loader(bundle);
        assert!(matches!(
            loader.try_load_experiment(NAMES[2]).await,
            Err(DashboardError::StructuralFailure(_))
        ));
        assert!(loader.load_experiment(NAMES[2]).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_ancestor_ends_chain() {
        let mut bundle = bundle();
        bundle.experiment_results.remove(NAMES[0]);

        let history = loader(bundle).load_experiment(NAMES[2]).await.unwrap();
        let versions: Vec<u32> = history.chain().map(|e| e.version).collect();
        assert_eq!(versions, vec![3, 2]);
        assert_eq!(history.get(2).unwrap().previous_version, None);
    }

    #[tokio::test]
    async fn test_ancestors_are_validated_independently() {
        let mut bundle = bundle();
        bundle.experiment_results.insert(
            NAMES[0].to_string(),
            json!([{"prompt": "", "response": "a", "correctness": 3, "correctness_weighted": 0.1, "faithfulness": 0.1}]),
        );

        let history = loader(bundle).load_experiment(NAMES[1]).await.unwrap();
        assert!(history.current().validation.is_valid);

        let first = history.get(1).unwrap();
        assert!(!first.validation.is_valid);
        assert_eq!(first.validation.errors.len(), 2);
        assert_eq!(first.metrics.correctness, 0.0);
    }

    #[tokio::test]
    async fn test_records_with_null_claim_context_are_averaged() {
        let mut bundle = bundle();
        bundle.experiment_results.insert(
            NAMES[0].to_string(),
            json!([
                {
                    "prompt": "q1",
                    "response": "a1",
                    "correctness": 0.8,
                    "correctness_weighted": 0.8,
                    "faithfulness": 0.8,
                    "correctness_claims": [{"statement": "s", "score": 1.0, "context": null}]
                },
                {
                    "prompt": "q2",
                    "response": "a2",
                    "correctness": 0.4,
                    "correctness_weighted": 0.4,
                    "faithfulness": 0.4
                }
            ]),
        );

        let history = loader(bundle).load_experiment(NAMES[0]).await.unwrap();
        let current = history.current();

        assert!(current.validation.errors.is_empty());
        assert_eq!(current.valid_questions(), 2);
        assert!((current.metrics.correctness - 0.6).abs() < 1e-9);
        assert_eq!(current.results[0].correctness_claims.len(), 1);
    }

    #[tokio::test]
    async fn test_load_version() {
        let loader = loader(bundle());
        let history = loader.load_version(2).await.unwrap();
        assert_eq!(history.current().name, NAMES[1]);
        assert!(matches!(
            loader.load_version(9).await,
            Err(DashboardError::VersionNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_load_all_skips_failures() {
        let mut bundle = bundle();
        bundle.experiment_results.remove(NAMES[1]);

        let experiments = loader(bundle).load_all().await.unwrap();
        let versions: Vec<u32> = experiments.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 3]);
        assert_eq!(experiments[0].previous_version, None);
        assert_eq!(experiments[1].previous_version, None);
    }

    #[test]
    fn test_shared_calculator_caches_across_loads() {
        let calculator = Arc::new(MetricsCalculator::default());
        let loader =
            ExperimentLoader::with_calculator(BundleSource::new(bundle()), calculator.clone());

        tokio_test::block_on(async {
            loader.load_experiment(NAMES[2]).await.unwrap();
            loader.load_experiment(NAMES[2]).await.unwrap();
        });

        assert_eq!(calculator.computations(), 3);
        assert_eq!(loader.calculator().cached_entries(), 3);
    }

    #[test]
    fn test_description_from_name() {
        assert_eq!(description_from_name("results_basic_prompts"), "Results Basic Prompts");
        assert_eq!(
            description_from_name("results_perfect_prompts_4o_no_ref"),
            "Results Perfect Prompts 4o No Ref"
        );
        assert_eq!(description_from_name(""), "");
    }
}
