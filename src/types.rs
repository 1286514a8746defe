//! Core data model: result records, claims and scores.
//!
//! Records are produced upstream by the evaluation pipeline and are
//! read-only here. Scores use an explicit tagged type instead of the `-1`
//! sentinel found on the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Wire value marking a metric that was not evaluated.
pub const UNSCORED_SENTINEL: f64 = -1.0;

/// One of the three evaluation metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Correctness,
    CorrectnessWeighted,
    Faithfulness,
}

impl MetricKind {
    /// All metrics in display order.
    pub const ALL: [MetricKind; 3] = [
        MetricKind::Correctness,
        MetricKind::CorrectnessWeighted,
        MetricKind::Faithfulness,
    ];

    /// Field name used in the JSON data files.
    pub fn field_name(&self) -> &'static str {
        match self {
            MetricKind::Correctness => "correctness",
            MetricKind::CorrectnessWeighted => "correctness_weighted",
            MetricKind::Faithfulness => "faithfulness",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Correctness => "Correctness",
            MetricKind::CorrectnessWeighted => "Weighted Correctness",
            MetricKind::Faithfulness => "Faithfulness",
        }
    }

    /// Lowercase phrase used in validation messages.
    pub(crate) fn phrase(&self) -> &'static str {
        match self {
            MetricKind::Correctness => "correctness",
            MetricKind::CorrectnessWeighted => "weighted correctness",
            MetricKind::Faithfulness => "faithfulness",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A metric score as read from a result file.
///
/// On the wire a score is a number in `[0, 1]`, or exactly `-1` for
/// "not evaluated". Anything else is kept verbatim as `Malformed` so the
/// validator can report it and serialization round-trips the input.
#[derive(Debug, Clone, PartialEq)]
pub enum Score {
    /// A valid score in `[0, 1]`.
    Scored(f64),
    /// The metric was not evaluated for this record.
    Unscored,
    /// Not a number, or a number outside `[0, 1] ∪ {-1}`.
    Malformed(Value),
}

impl Score {
    /// Classify a raw JSON value.
    pub fn from_value(value: Value) -> Self {
        match value.as_f64() {
            Some(v) if v == UNSCORED_SENTINEL => Score::Unscored,
            Some(v) if (0.0..=1.0).contains(&v) => Score::Scored(v),
            _ => Score::Malformed(value),
        }
    }

    /// The score, if it can take part in an average.
    pub fn value(&self) -> Option<f64> {
        match self {
            Score::Scored(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self, Score::Scored(_))
    }

    /// True for anything except `Malformed`.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Score::Malformed(_))
    }

    /// The score in its wire representation.
    pub fn to_value(&self) -> Value {
        match self {
            Score::Scored(v) => Value::from(*v),
            Score::Unscored => Value::from(UNSCORED_SENTINEL),
            Score::Malformed(raw) => raw.clone(),
        }
    }
}

impl Default for Score {
    /// A missing score field is malformed.
    fn default() -> Self {
        Score::Malformed(Value::Null)
    }
}

impl From<f64> for Score {
    fn from(value: f64) -> Self {
        Score::from_value(Value::from(value))
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Score::from_value)
    }
}

/// An atomic fact check backing a correctness or faithfulness judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// The statement being checked.
    #[serde(default, deserialize_with = "lenient_text")]
    pub statement: String,
    /// Support for the statement, 0..1.
    #[serde(default, deserialize_with = "lenient_number")]
    pub score: f64,
    /// Source context the statement was checked against.
    #[serde(default, deserialize_with = "lenient_text")]
    pub context: String,
}

impl Claim {
    /// Minimum score for a claim to count as confirmed.
    pub const CONFIRMED_THRESHOLD: f64 = 0.5;

    pub fn new(statement: impl Into<String>, score: f64, context: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            score,
            context: context.into(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.score >= Self::CONFIRMED_THRESHOLD
    }
}

/// One evaluated prompt/response pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub run_name: String,

    /// The question asked. Absent when missing or not a string.
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub prompt: Option<String>,

    /// The model's answer. Absent when missing or not a string.
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub response: Option<String>,

    #[serde(default)]
    pub correctness: Score,

    #[serde(default)]
    pub correctness_weighted: Score,

    #[serde(default)]
    pub faithfulness: Score,

    #[serde(default, deserialize_with = "lenient_claims")]
    pub correctness_claims: Vec<Claim>,

    #[serde(default, deserialize_with = "lenient_claims")]
    pub correctness_weighted_claims: Vec<Claim>,

    #[serde(default, deserialize_with = "lenient_claims")]
    pub faithfulness_claims: Vec<Claim>,
}

impl ResultRecord {
    /// Decode one item of a results document.
    ///
    /// Fields the validator checks are kept as found and every other field
    /// falls back to its default, so only a non-object item loses data.
    pub fn from_value(item: Value) -> Self {
        serde_json::from_value(item).unwrap_or_default()
    }

    /// Create a record with the given prompt, response and scores, and no claims.
    pub fn new(
        prompt: impl Into<String>,
        response: impl Into<String>,
        correctness: impl Into<Score>,
        correctness_weighted: impl Into<Score>,
        faithfulness: impl Into<Score>,
    ) -> Self {
        Self {
            run_name: String::new(),
            prompt: Some(prompt.into()),
            response: Some(response.into()),
            correctness: correctness.into(),
            correctness_weighted: correctness_weighted.into(),
            faithfulness: faithfulness.into(),
            correctness_claims: Vec::new(),
            correctness_weighted_claims: Vec::new(),
            faithfulness_claims: Vec::new(),
        }
    }

    /// Set the run name.
    pub fn with_run_name(mut self, run_name: impl Into<String>) -> Self {
        self.run_name = run_name.into();
        self
    }

    pub fn score(&self, metric: MetricKind) -> &Score {
        match metric {
            MetricKind::Correctness => &self.correctness,
            MetricKind::CorrectnessWeighted => &self.correctness_weighted,
            MetricKind::Faithfulness => &self.faithfulness,
        }
    }

    pub fn claims(&self, metric: MetricKind) -> &[Claim] {
        match metric {
            MetricKind::Correctness => &self.correctness_claims,
            MetricKind::CorrectnessWeighted => &self.correctness_weighted_claims,
            MetricKind::Faithfulness => &self.faithfulness_claims,
        }
    }

    /// The three scores of this record.
    pub fn scores(&self) -> ScoreTriple {
        ScoreTriple {
            correctness: self.correctness.clone(),
            correctness_weighted: self.correctness_weighted.clone(),
            faithfulness: self.faithfulness.clone(),
        }
    }

    /// Prompt text, or an empty string when missing.
    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or_default()
    }

    /// Response text, or an empty string when missing.
    pub fn response_text(&self) -> &str {
        self.response.as_deref().unwrap_or_default()
    }

    /// True when every metric is scored.
    pub fn is_fully_scored(&self) -> bool {
        MetricKind::ALL.iter().all(|m| self.score(*m).is_scored())
    }
}

/// The three scores of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTriple {
    pub correctness: Score,
    pub correctness_weighted: Score,
    pub faithfulness: Score,
}

impl ScoreTriple {
    pub fn get(&self, metric: MetricKind) -> &Score {
        match metric {
            MetricKind::Correctness => &self.correctness,
            MetricKind::CorrectnessWeighted => &self.correctness_weighted,
            MetricKind::Faithfulness => &self.faithfulness,
        }
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// A string field, or an empty string for anything else.
pub(crate) fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_f64().unwrap_or_default())
}

/// A list of claims. Items that are not claim objects are dropped.
fn lenient_claims<'de, D>(deserializer: D) -> std::result::Result<Vec<Claim>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}
