//! Validation of raw result batches.
//!
//! Problems with individual records never abort a batch: each record is
//! classified valid or invalid and every problem is collected as a message
//! in the [`ValidationReport`].

use crate::types::{MetricKind, ResultRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Counters describing a validated batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_results: usize,
    /// Incremented once per missing field (prompt and response counted separately).
    pub results_with_missing_data: usize,
    /// Incremented once per invalid metric.
    pub results_with_invalid_data: usize,
}

/// Outcome of validating a batch of result records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// True only when no record produced an error.
    pub is_valid: bool,
    /// Records that passed every check, in input order.
    pub valid_results: Vec<ResultRecord>,
    pub errors: Vec<String>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn valid_count(&self) -> usize {
        self.valid_results.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.summary.total_results - self.valid_results.len()
    }
}

/// A named, human-readable check shown alongside a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub description: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Validate a batch of records.
pub fn validate(results: &[ResultRecord]) -> ValidationReport {
    let mut report = ValidationReport {
        is_valid: true,
        valid_results: Vec::new(),
        errors: Vec::new(),
        summary: ValidationSummary {
            total_results: results.len(),
            ..Default::default()
        },
    };

    for (index, result) in results.iter().enumerate() {
        let mut errors = Vec::new();

        if result.prompt.as_deref().is_none_or(str::is_empty) {
            errors.push(format!("Result {}: Missing prompt", index));
            report.summary.results_with_missing_data += 1;
        }
        if result.response.as_deref().is_none_or(str::is_empty) {
            errors.push(format!("Result {}: Missing response", index));
            report.summary.results_with_missing_data += 1;
        }

        for metric in MetricKind::ALL {
            if !result.score(metric).is_valid() {
                errors.push(format!("Result {}: Invalid {} value", index, metric.phrase()));
                report.summary.results_with_invalid_data += 1;
            }
        }

        if errors.is_empty() {
            report.valid_results.push(result.clone());
        } else {
            report.errors.extend(errors);
        }
    }

    report.is_valid = report.errors.is_empty();
    report
}

/// Validate a raw JSON document that should hold an array of records.
///
/// A non-array document yields an invalid report with no results instead
/// of an error.
pub fn validate_value(value: &Value) -> ValidationReport {
    let Some(items) = value.as_array() else {
        return structural_failure();
    };

    let records: Vec<ResultRecord> = items
        .iter()
        .cloned()
        .map(ResultRecord::from_value)
        .collect();

    validate(&records)
}

fn structural_failure() -> ValidationReport {
    ValidationReport {
        is_valid: false,
        errors: vec!["Results must be an array".to_string()],
        ..Default::default()
    }
}

/// Build the checks displayed next to an experiment's validation report.
pub fn validation_checks(
    results: &[ResultRecord],
    report: &ValidationReport,
) -> Vec<ValidationCheck> {
    let metrics_typed = report
        .valid_results
        .iter()
        .all(|r| MetricKind::ALL.iter().all(|m| r.score(*m).is_valid()));

    vec![
        ValidationCheck {
            description: "JSON file structure".to_string(),
            passed: true,
            details: Some(format!("Valid array structure with {} results", results.len())),
        },
        ValidationCheck {
            description: "Result validation".to_string(),
            passed: report.valid_count() > 0,
            details: Some(format!(
                "Found {} valid results out of {}",
                report.valid_count(),
                results.len()
            )),
        },
        ValidationCheck {
            description: "Metrics".to_string(),
            passed: metrics_typed,
            details: Some("All metrics have a numeric type".to_string()),
        },
    ]
}

/// Emit a validation report through `tracing`.
pub fn log_report(name: &str, report: &ValidationReport) {
    tracing::info!(
        experiment = name,
        total = report.summary.total_results,
        valid = report.valid_count(),
        missing = report.summary.results_with_missing_data,
        invalid = report.summary.results_with_invalid_data,
        "validation finished"
    );
    for error in &report.errors {
        tracing::debug!(experiment = name, "{}", error);
    }
}
