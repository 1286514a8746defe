//! Text rendering of experiments, validation reports and comparisons.

use crate::comparison::{Comparison, QuestionDelta, experiment_change};
use crate::experiment::{Experiment, ExperimentHistory};
use crate::history::{QuestionHistory, filter_results};
use crate::types::{Claim, MetricKind, ResultRecord, Score};

const RULE_WIDTH: usize = 72;

/// Format a score as a percentage with one decimal, or `-` when unscored.
pub fn format_metric_value(score: &Score) -> String {
    match score {
        Score::Scored(v) => format_percent(*v),
        Score::Unscored => "-".to_string(),
        Score::Malformed(raw) => match raw.as_f64() {
            Some(v) => format_percent(v),
            None => "invalid".to_string(),
        },
    }
}

/// Format a score with three decimals, or `N/A` when unscored.
pub fn format_metric_raw(score: &Score) -> String {
    match score {
        Score::Scored(v) => format!("{:.3}", v),
        Score::Unscored => "N/A".to_string(),
        Score::Malformed(raw) => raw.to_string(),
    }
}

/// Format a 0..1 value as a percentage with one decimal.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Format a percent change with its sign, or `-` when undefined.
pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(c) if c > 0.0 => format!("+{:.1}%", c),
        Some(c) => format!("{:.1}%", c),
        None => "-".to_string(),
    }
}

/// Confirmed versus unconfirmed claims of one metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimSummary {
    pub confirmed: usize,
    pub unconfirmed: usize,
    pub total: usize,
}

impl ClaimSummary {
    pub fn from_claims(claims: &[Claim]) -> Self {
        let confirmed = claims.iter().filter(|c| c.is_confirmed()).count();
        Self {
            confirmed,
            unconfirmed: claims.len() - confirmed,
            total: claims.len(),
        }
    }
}

fn rule() -> String {
    "─".repeat(RULE_WIDTH)
}

fn find_version(experiments: &[Experiment], version: Option<u32>) -> Option<&Experiment> {
    let version = version?;
    experiments.iter().find(|e| e.version == version)
}

/// Table of every experiment with its change against the previous version.
pub fn render_experiment_list(experiments: &[Experiment]) -> String {
    if experiments.is_empty() {
        return "No experiments found.\n".to_string();
    }

    let mut out = format!(
        "{:<4} {:<36} {:>16} {:>16} {:>16} {:>10}\n",
        "Ver", "Experiment", "Correctness", "Weighted", "Faithfulness", "High faith"
    );
    out.push_str(&rule());
    out.push('\n');

    for experiment in experiments {
        let previous = find_version(experiments, experiment.previous_version);
        let cell = |metric: MetricKind| {
            let current = experiment.metrics.get(metric);
            match previous {
                Some(p) => format!(
                    "{} ({})",
                    format_percent(current),
                    format_change(experiment_change(current, p.metrics.get(metric)))
                ),
                None => format_percent(current),
            }
        };
        let faith = experiment.faithfulness_stats();

        out.push_str(&format!(
            "{:<4} {:<36} {:>16} {:>16} {:>16} {:>10}\n",
            format!("v{}", experiment.version),
            experiment.name,
            cell(MetricKind::Correctness),
            cell(MetricKind::CorrectnessWeighted),
            cell(MetricKind::Faithfulness),
            format!("{}/{}", faith.high_faithfulness, faith.total_valid),
        ));
    }

    out
}

fn render_record(number: usize, record: &ResultRecord) -> String {
    let mut out = format!("#{} {}\n", number, record.prompt_text());
    out.push_str(&format!("   Answer: {}\n", record.response_text()));

    let scores: Vec<String> = MetricKind::ALL
        .iter()
        .map(|m| format!("{} {}", m.label(), format_metric_value(record.score(*m))))
        .collect();
    out.push_str(&format!("   {}\n", scores.join(" | ")));

    for metric in MetricKind::ALL {
        let claims = ClaimSummary::from_claims(record.claims(metric));
        if claims.total > 0 {
            out.push_str(&format!(
                "   {} claims: {} confirmed, {} unconfirmed, {} total\n",
                metric.label(),
                claims.confirmed,
                claims.unconfirmed,
                claims.total
            ));
        }
    }

    out
}

/// Detailed view of the current experiment of `history`.
pub fn render_experiment_details(
    history: &ExperimentHistory,
    search: Option<&str>,
) -> String {
    let experiment = history.current();
    let previous = history.previous(experiment);
    let counts = experiment.scored_counts();
    let split = experiment.scoring_split();

    let mut out = format!("{} (v{})\n", experiment.name, experiment.version);
    out.push_str(&format!("{}\n", experiment.description));
    out.push_str(&rule());
    out.push('\n');

    for metric in MetricKind::ALL {
        let value = experiment.metrics.get(metric);
        let change = previous
            .map(|p| {
                let change = experiment_change(value, p.metrics.get(metric));
                format!(" vs v{}: {}", p.version, format_change(change))
            })
            .unwrap_or_default();
        out.push_str(&format!(
            "  {:<22} {:>7}  across {} scored questions{}\n",
            metric.label(),
            format_percent(value),
            counts.get(metric),
            change
        ));
    }

    out.push_str(&format!(
        "  Scored questions: {}  Unscored questions: {}\n",
        split.scored, split.unscored
    ));
    out.push_str(&format!(
        "  Validation: {} valid of {} ({})\n",
        experiment.valid_questions(),
        experiment.total_questions(),
        if experiment.validation.is_valid { "ok" } else { "errors found" }
    ));
    out.push_str(&rule());
    out.push('\n');

    let matches = filter_results(&experiment.results, search.unwrap_or_default());
    if let Some(term) = search {
        out.push_str(&format!(
            "Showing {} of {} results matching \"{}\"\n\n",
            matches.len(),
            experiment.total_questions(),
            term
        ));
    }
    for (number, record) in matches {
        out.push_str(&render_record(number, record));
        out.push('\n');
    }

    out
}

/// Validation status of one experiment.
pub fn render_validation(experiment: &Experiment) -> String {
    let report = &experiment.validation;
    let mut out = format!("Validation for {} (v{})\n", experiment.name, experiment.version);
    out.push_str(&rule());
    out.push('\n');
    out.push_str(&format!("  Data path:      {}\n", experiment.data_path));
    out.push_str(&format!(
        "  Status:         {}\n",
        if report.is_valid { "valid" } else { "invalid" }
    ));
    out.push_str(&format!("  Total results:  {}\n", report.summary.total_results));
    out.push_str(&format!("  Valid results:  {}\n", report.valid_count()));
    out.push_str(&format!("  Missing data:   {}\n", report.summary.results_with_missing_data));
    out.push_str(&format!("  Invalid data:   {}\n", report.summary.results_with_invalid_data));
    out.push('\n');

    for check in &experiment.checks {
        out.push_str(&format!(
            "  [{}] {}",
            if check.passed { "pass" } else { "FAIL" },
            check.description
        ));
        if let Some(details) = &check.details {
            out.push_str(&format!(": {}", details));
        }
        out.push('\n');
    }

    if !report.errors.is_empty() {
        out.push_str("\nErrors:\n");
        for error in &report.errors {
            out.push_str(&format!("  - {}\n", error));
        }
    }

    out
}

fn render_delta(title: &str, delta: &QuestionDelta) -> String {
    let mut out = format!(
        "{}: question {} ({})\n  {}\n",
        title,
        delta.question_number,
        format_change(Some(delta.avg_change)),
        delta.prompt
    );
    for metric in MetricKind::ALL {
        let before = delta.previous.get(metric);
        let after = delta.current.get(metric);
        let change = if delta.compared_metrics.contains(&metric) {
            format_change(Some(delta.change(metric)))
        } else {
            "-".to_string()
        };
        out.push_str(&format!(
            "  {:<22} {:>7} -> {:<7} {}\n",
            metric.label(),
            format_metric_value(before),
            format_metric_value(after),
            change
        ));
    }
    out
}

/// Biggest improvement and decline between two versions.
pub fn render_comparison(
    current: &Experiment,
    previous: &Experiment,
    comparison: &Comparison,
) -> String {
    let mut out = format!(
        "Current version v{} ({}) vs version v{} ({})\n",
        current.version, current.name, previous.version, previous.name
    );
    out.push_str(&rule());
    out.push('\n');

    if comparison.misaligned {
        out.push_str(&format!(
            "Warning: question counts differ ({} vs {}); questions are paired by position.\n\n",
            current.total_questions(),
            previous.total_questions()
        ));
    }

    match (&comparison.biggest_improvement, &comparison.biggest_decline) {
        (Some(best), Some(worst)) => {
            out.push_str(&render_delta("Biggest improvement", best));
            out.push('\n');
            out.push_str(&render_delta("Biggest decline", worst));
        }
        _ => out.push_str("No questions scored in both versions.\n"),
    }

    out
}

/// Every question with the answers each experiment gave.
pub fn render_question_history(questions: &[QuestionHistory]) -> String {
    if questions.is_empty() {
        return "No questions found.\n".to_string();
    }

    let mut out = String::new();
    for question in questions {
        out.push_str(&format!("Question: {}\n", question.question));
        for answer in &question.answers {
            let scores: Vec<String> = MetricKind::ALL
                .iter()
                .map(|m| format_metric_value(answer.scores.get(*m)))
                .collect();
            out.push_str(&format!(
                "  v{} {:<36} [{}]\n    {}\n",
                answer.version,
                answer.experiment_name,
                scores.join(" / "),
                answer.answer
            ));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::compare_metrics;
    use crate::experiment::ExperimentLoader;
    use crate::history::{SortOrder, question_history};
    use crate::metrics::MetricsCalculator;
    use crate::persistence::Bundle;
    use crate::source::{BundleSource, ExperimentEntry};
    use crate::validator;
    use serde_json::json;

    fn experiment(name: &str, version: u32, results: Vec<ResultRecord>) -> Experiment {
        let outcome = MetricsCalculator::default().calculate(&results);
        let validation = validator::validate(&results);
        Experiment {
            name: name.to_string(),
            description: "Test run".to_string(),
            version,
            data_path: format!("/data/{}/run.json", name),
            checks: validator::validation_checks(&results, &validation),
            results,
            metrics: outcome.metrics,
            individual_scores: outcome.individual_scores,
            validation,
            previous_version: version.checked_sub(1).filter(|v| *v > 0),
        }
    }

    #[test]
    fn test_format_metric_value() {
        assert_eq!(format_metric_value(&Score::Scored(0.8567)), "85.7%");
        assert_eq!(format_metric_value(&Score::Unscored), "-");
        assert_eq!(format_metric_value(&Score::Malformed(json!(1.5))), "150.0%");
        assert_eq!(format_metric_value(&Score::Malformed(json!("x"))), "invalid");
    }

    #[test]
    fn test_format_metric_raw() {
        assert_eq!(format_metric_raw(&Score::Scored(0.5)), "0.500");
        assert_eq!(format_metric_raw(&Score::Unscored), "N/A");
    }

    #[test]
    fn test_format_change() {
        assert_eq!(format_change(Some(12.345)), "+12.3%");
        assert_eq!(format_change(Some(-3.0)), "-3.0%");
        assert_eq!(format_change(Some(0.0)), "0.0%");
        assert_eq!(format_change(None), "-");
    }

    #[test]
    fn test_claim_summary() {
        let claims = vec![
            Claim::new("a", 1.0, ""),
            Claim::new("b", 0.5, ""),
            Claim::new("c", 0.2, ""),
        ];
        let summary = ClaimSummary::from_claims(&claims);
        assert_eq!(summary, ClaimSummary { confirmed: 2, unconfirmed: 1, total: 3 });
        assert_eq!(ClaimSummary::from_claims(&[]).total, 0);
    }

    #[test]
    fn test_render_experiment_list() {
        let experiments = vec![
            experiment("v_one", 1, vec![ResultRecord::new("q", "a", 0.5, 0.5, 0.9)]),
            experiment("v_two", 2, vec![ResultRecord::new("q", "a", 0.6, 0.5, 0.8)]),
        ];
        let text = render_experiment_list(&experiments);

        assert!(text.contains("v_one"));
        assert!(text.contains("60.0% (+20.0%)"));
        assert!(text.contains("1/1"));
        assert_eq!(render_experiment_list(&[]), "No experiments found.\n");
    }

    #[test]
    fn test_render_validation() {
        let exp = experiment("bad", 1, vec![ResultRecord::new("", "a", 0.5, 0.5, 0.5)]);
        let text = render_validation(&exp);

        assert!(text.contains("invalid"));
        assert!(text.contains("Result 0: Missing prompt"));
        assert!(text.contains("[FAIL] Result validation"));
        assert!(text.contains("/data/bad/run.json"));
    }

    #[test]
    fn test_render_comparison() {
        let current = experiment(
            "cur",
            2,
            vec![
                ResultRecord::new("q1", "a", 0.5, -1.0, -1.0),
                ResultRecord::new("q2", "a", 0.9, -1.0, -1.0),
            ],
        );
        let previous = experiment(
            "prev",
            1,
            vec![
                ResultRecord::new("q1", "a", 0.4, -1.0, -1.0),
                ResultRecord::new("q2", "a", 0.9, -1.0, -1.0),
            ],
        );
        let comparison = compare_metrics(&current.results, &previous.results);
        let text = render_comparison(&current, &previous, &comparison);

        assert!(text.contains("Biggest improvement: question 1 (+25.0%)"));
        assert!(text.contains("Biggest decline: question 2 (0.0%)"));
        assert!(!text.contains("Warning"));

        let empty = render_comparison(&current, &previous, &Comparison::default());
        assert!(empty.contains("No questions scored in both versions."));
    }

    fn two_version_loader() -> ExperimentLoader<BundleSource> {
        let mut bundle = Bundle::default();
        for (version, score) in [(1u32, 0.5), (2, 0.6)] {
            let name = format!("run_v{}", version);
            bundle
                .experiments
                .push(ExperimentEntry::new(name.clone(), version, name.clone()));
            bundle.experiment_results.insert(
                name,
                json!([
                    {
                        "prompt": "What is Rust?",
                        "response": "A systems language",
                        "correctness": score,
                        "correctness_weighted": score,
                        "faithfulness": 0.9,
                        "correctness_claims": [
                            {"statement": "s", "score": 1.0, "context": "c"},
                            {"statement": "t", "score": 0.2, "context": "c"}
                        ]
                    },
                    {
                        "prompt": "Define ownership",
                        "response": "Memory rules",
                        "correctness": -1,
                        "correctness_weighted": -1,
                        "faithfulness": -1
                    }
                ]),
            );
        }
        ExperimentLoader::new(BundleSource::new(bundle))
    }

    #[tokio::test]
    async fn test_render_experiment_details() {
        let history = two_version_loader().load_experiment("run_v2").await.unwrap();
        let text = render_experiment_details(&history, None);

        assert!(text.starts_with("run_v2 (v2)\nRun V2\n"));
        assert!(text.contains("60.0%  across 1 scored questions vs v1: +20.0%"));
        assert!(text.contains("Scored questions: 1  Unscored questions: 1"));
        assert!(text.contains("Validation: 2 valid of 2 (ok)"));
        assert!(text.contains("#1 What is Rust?"));
        assert!(text.contains("#2 Define ownership"));
        assert!(text.contains("Correctness claims: 1 confirmed, 1 unconfirmed, 2 total"));
        assert!(!text.contains("Showing"));
    }

    #[tokio::test]
    async fn test_render_experiment_details_with_search() {
        let history = two_version_loader().load_experiment("run_v2").await.unwrap();
        let text = render_experiment_details(&history, Some("OWNERSHIP"));

        assert!(text.contains("Showing 1 of 2 results matching \"OWNERSHIP\""));
        assert!(text.contains("#2 Define ownership"));
        assert!(text.contains("Correctness - | Weighted Correctness - | Faithfulness -"));
        assert!(!text.contains("#1 What is Rust?"));
    }

    #[tokio::test]
    async fn test_render_question_history() {
        let experiments = two_version_loader().load_all().await.unwrap();
        let questions = question_history(&experiments, None, SortOrder::Ascending);
        let text = render_question_history(&questions);

        let ownership = text.find("Question: Define ownership").unwrap();
        let rust = text.find("Question: What is Rust?").unwrap();
        assert!(ownership < rust);
        assert!(text.contains("[- / - / -]"));
        assert!(text.contains("[50.0% / 50.0% / 90.0%]"));
        assert!(text.contains("[60.0% / 60.0% / 90.0%]"));
        assert!(text.contains("\n    A systems language\n"));

        assert_eq!(render_question_history(&[]), "No questions found.\n");
    }
}
