//! Browsing results across experiments.
//!
//! Groups every experiment's answers by question text and provides the
//! free-text search used when listing results.

use crate::experiment::Experiment;
use crate::types::{ResultRecord, ScoreTriple};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sort direction for question listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// One experiment's answer to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswer {
    pub experiment_name: String,
    pub experiment_description: String,
    pub version: u32,
    pub answer: String,
    pub scores: ScoreTriple,
}

/// A question with the answers every experiment gave to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionHistory {
    pub question: String,
    pub answers: Vec<QuestionAnswer>,
}

impl QuestionHistory {
    fn matches(&self, needle: &str) -> bool {
        self.question.to_lowercase().contains(needle)
            || self.answers.iter().any(|a| a.answer.to_lowercase().contains(needle))
    }
}

/// Group the results of `experiments` by question text.
///
/// Answers appear in the order of `experiments`. When `search` is given,
/// only questions whose text or any answer contains it (ignoring case) are
/// kept.
pub fn question_history(
    experiments: &[Experiment],
    search: Option<&str>,
    order: SortOrder,
) -> Vec<QuestionHistory> {
    let mut questions: Vec<QuestionHistory> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for experiment in experiments {
        for result in &experiment.results {
            let prompt = result.prompt_text();
            let position = *positions.entry(prompt.to_string()).or_insert_with(|| {
                questions.push(QuestionHistory {
                    question: prompt.to_string(),
                    answers: Vec::new(),
                });
                questions.len() - 1
            });

            questions[position].answers.push(QuestionAnswer {
                experiment_name: experiment.name.clone(),
                experiment_description: experiment.description.clone(),
                version: experiment.version,
                answer: result.response_text().to_string(),
                scores: result.scores(),
            });
        }
    }

    if let Some(needle) = search.map(str::to_lowercase).filter(|s| !s.is_empty()) {
        questions.retain(|q| q.matches(&needle));
    }

    match order {
        SortOrder::Ascending => questions.sort_by(|a, b| a.question.cmp(&b.question)),
        SortOrder::Descending => questions.sort_by(|a, b| b.question.cmp(&a.question)),
    }

    questions
}

/// Results whose prompt or response contains `term`, ignoring case.
///
/// Returns each match with its 1-based question number.
pub fn filter_results<'a>(
    results: &'a [ResultRecord],
    term: &str,
) -> Vec<(usize, &'a ResultRecord)> {
    let needle = term.to_lowercase();
    results
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            r.prompt_text().to_lowercase().contains(&needle)
                || r.response_text().to_lowercase().contains(&needle)
        })
        .map(|(i, r)| (i + 1, r))
        .collect()
}
