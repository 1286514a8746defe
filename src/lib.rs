//! Experiment Dashboard - validation, aggregation and comparison of
//! evaluation results across experiment versions.
//!
//! # Overview
//!
//! Each experiment is one versioned run of an evaluation pipeline: a list of
//! question/answer records scored for correctness, weighted correctness and
//! faithfulness. This crate:
//! 1. Validates raw result batches and reports every problem it finds
//! 2. Aggregates per-metric averages, caching them for a few minutes
//! 3. Assembles experiments with their chain of previous versions
//! 4. Finds the questions that improved or declined the most between versions
//!
//! # Quick Start
//!
//! ```no_run
//! use experiment_dashboard::{
//!     comparison::compare_metrics,
//!     experiment::ExperimentLoader,
//!     source::DirectorySource,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let loader = ExperimentLoader::new(DirectorySource::new("data"));
//!
//!     // Load an experiment together with every earlier version
//!     let history = loader.try_load_experiment("results_perfect_prompts").await?;
//!     let current = history.current();
//!     println!("{}: {:.3}", current.name, current.metrics.correctness);
//!
//!     if let Some(previous) = history.previous(current) {
//!         let comparison = compare_metrics(&current.results, &previous.results);
//!         if let Some(best) = comparison.biggest_improvement {
//!             println!("Most improved: question {}", best.question_number);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **DataSource**: Reads the experiment index and raw results (directory, HTTP, bundle)
//! - **validator**: Classifies records and collects validation errors
//! - **MetricsCalculator**: Averages scored values behind a TTL cache
//! - **ExperimentLoader**: Builds experiments and their previous-version chain
//! - **comparison**: Per-question deltas between two versions

pub mod comparison;
pub mod config;
pub mod error;
pub mod experiment;
pub mod history;
pub mod metrics;
pub mod persistence;
pub mod report;
pub mod source;
pub mod types;
pub mod validator;

// Re-export commonly used types
pub use comparison::{Comparison, QuestionDelta, compare_metrics};
pub use config::Config;
pub use error::{DashboardError, Result};
pub use experiment::{Experiment, ExperimentHistory, ExperimentLoader};
pub use metrics::{Metrics, MetricsCalculator};
pub use persistence::{Bundle, load_bundle, save_bundle};
pub use source::{BundleSource, DataSource, DirectorySource, HttpSource};
pub use types::{Claim, MetricKind, ResultRecord, Score};
pub use validator::{ValidationReport, validate};
