//! Aggregation of normalized Tally responses into per-question statistics.
//!
//! [`aggregate_responses`] is a pure function: every answer is classified
//! by its value shape and question type tag into choice counts, numeric
//! values, boolean counts or free-text samples, then each question is
//! finalized into a [`QuestionInsight`].

mod accumulator;

pub use accumulator::{is_choice_type, is_numeric_type, parse_numeric, percentage};

use accumulator::QuestionAccumulator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tally::{parse_timestamp, NormalizedResponse};

/// Question keys never aggregated: respondent name, email and LinkedIn URL.
pub const EXCLUDED_QUESTION_KEYS: [&str; 3] = ["Wz0E5Q", "QV0WQX", "7xZL1R"];

/// Whether a question key is excluded from aggregation.
pub fn is_excluded_question(key: &str) -> bool {
    EXCLUDED_QUESTION_KEYS.contains(&key)
}

/// Count and share of one choice value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceStatistic {
    pub value: String,
    pub count: u64,
    /// Percent of the question's responses, one decimal.
    pub percentage: f64,
}

/// Numeric answer summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    /// Mean, two decimals.
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

/// Finalized statistics for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInsight {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub answer_type: String,
    pub response_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_choices: Option<Vec<ChoiceStatistic>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_summary: Option<NumericSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean_breakdown: Option<Vec<ChoiceStatistic>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_samples: Option<Vec<String>>,
}

/// Submission-level totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionTotals {
    pub submissions: u64,
    pub completed_submissions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_submitted_at: Option<String>,
    pub question_count: u64,
}

/// Output of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedTallyData {
    pub totals: SubmissionTotals,
    /// Sorted by label.
    pub questions: Vec<QuestionInsight>,
}

/// Aggregate normalized responses into totals and per-question insights.
pub fn aggregate_responses(responses: &[NormalizedResponse]) -> AggregatedTallyData {
    let mut accumulators: HashMap<String, QuestionAccumulator> = HashMap::new();
    let mut latest: Option<(DateTime<Utc>, &str)> = None;
    let mut completed = 0u64;

    for response in responses {
        if response.completed == Some(true) {
            completed += 1;
        }

        if let Some(raw) = response.submitted_at.as_deref() {
            if let Some(at) = parse_timestamp(raw) {
                if latest.map_or(true, |(current, _)| at > current) {
                    latest = Some((at, raw));
                }
            }
        }

        for answer in &response.answers {
            if is_excluded_question(&answer.key) {
                continue;
            }

            accumulators
                .entry(answer.key.clone())
                .or_insert_with(|| QuestionAccumulator::new(&answer.label, &answer.answer_type))
                .record(answer);
        }
    }

    let question_count = accumulators.len() as u64;
    let mut questions: Vec<QuestionInsight> = accumulators
        .into_iter()
        .map(|(key, acc)| acc.into_insight(key))
        .collect();
    questions.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.key.cmp(&b.key)));

    AggregatedTallyData {
        totals: SubmissionTotals {
            submissions: responses.len() as u64,
            completed_submissions: completed,
            last_submitted_at: latest.map(|(_, raw)| raw.to_string()),
            question_count,
        },
        questions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::{AnswerValue, NormalizedAnswer};
    use pretty_assertions::assert_eq;

    fn response(id: &str, answers: Vec<NormalizedAnswer>) -> NormalizedResponse {
        let mut r = NormalizedResponse::new(id);
        r.answers = answers;
        r
    }

    #[test]
    fn test_empty_input() {
        let aggregated = aggregate_responses(&[]);
        assert_eq!(aggregated.totals.submissions, 0);
        assert_eq!(aggregated.totals.completed_submissions, 0);
        assert_eq!(aggregated.totals.question_count, 0);
        assert!(aggregated.totals.last_submitted_at.is_none());
        assert!(aggregated.questions.is_empty());
    }

    #[test]
    fn test_numeric_end_to_end() {
        let responses = vec![
            response(
                "s1",
                vec![NormalizedAnswer::new("Q1", "Years", "number", AnswerValue::Number(5.0))],
            ),
            response(
                "s2",
                vec![NormalizedAnswer::new("Q1", "Years", "number", AnswerValue::Number(7.0))],
            ),
            response(
                "s3",
                vec![NormalizedAnswer::new("Q1", "Years", "number", AnswerValue::Null)],
            ),
        ];

        let aggregated = aggregate_responses(&responses);
        let q1 = &aggregated.questions[0];
        assert_eq!(q1.response_count, 3);
        assert_eq!(
            q1.numeric_summary,
            Some(NumericSummary {
                average: 6.0,
                min: 5.0,
                max: 7.0
            })
        );
    }

    #[test]
    fn test_average_invariant_under_reordering() {
        let build = |values: &[f64]| -> Vec<NormalizedResponse> {
            values
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    response(
                        &format!("s{}", i),
                        vec![NormalizedAnswer::new("Q", "Score", "RATING", AnswerValue::Number(*v))],
                    )
                })
                .collect()
        };

        let forward = aggregate_responses(&build(&[3.0, 5.0, 4.0]));
        let backward = aggregate_responses(&build(&[4.0, 5.0, 3.0]));
        assert_eq!(forward.questions[0].numeric_summary, backward.questions[0].numeric_summary);
        assert_eq!(
            forward.questions[0].numeric_summary,
            Some(NumericSummary {
                average: 4.0,
                min: 3.0,
                max: 5.0
            })
        );
    }

    #[test]
    fn test_excluded_keys_never_reported() {
        let responses: Vec<NormalizedResponse> = (0..4)
            .map(|i| {
                response(
                    &format!("s{}", i),
                    vec![
                        NormalizedAnswer::new(
                            "Wz0E5Q",
                            "Name",
                            "INPUT_TEXT",
                            AnswerValue::Text(format!("Person {}", i)),
                        ),
                        NormalizedAnswer::new(
                            "7xZL1R",
                            "LinkedIn",
                            "INPUT_LINK",
                            AnswerValue::Text("https://linkedin.com/in/x".to_string()),
                        ),
                        NormalizedAnswer::new("Q2", "Role", "text", AnswerValue::Text("Dev".into())),
                    ],
                )
            })
            .collect();

        let aggregated = aggregate_responses(&responses);
        assert_eq!(aggregated.totals.question_count, 1);
        assert_eq!(aggregated.questions.len(), 1);
        assert!(aggregated
            .questions
            .iter()
            .all(|q| !is_excluded_question(&q.key)));
    }

    #[test]
    fn test_totals() {
        let responses = vec![
            NormalizedResponse::new("s1")
                .with_completed(true)
                .with_submitted_at("2024-05-01T10:00:00.000Z"),
            NormalizedResponse::new("s2")
                .with_completed(false)
                .with_submitted_at("not a date"),
            NormalizedResponse::new("s3")
                .with_completed(true)
                .with_submitted_at("2024-05-03T08:30:00.000Z"),
            NormalizedResponse::new("s4").with_submitted_at("2024-05-02T00:00:00.000Z"),
        ];

        let aggregated = aggregate_responses(&responses);
        assert_eq!(aggregated.totals.submissions, 4);
        assert_eq!(aggregated.totals.completed_submissions, 2);
        assert_eq!(
            aggregated.totals.last_submitted_at.as_deref(),
            Some("2024-05-03T08:30:00.000Z")
        );
    }

    #[test]
    fn test_questions_sorted_by_label() {
        let responses = vec![response(
            "s1",
            vec![
                NormalizedAnswer::new("Q1", "Zeta", "text", AnswerValue::Text("z".into())),
                NormalizedAnswer::new("Q2", "Alpha", "text", AnswerValue::Text("a".into())),
                NormalizedAnswer::new("Q3", "Mid", "text", AnswerValue::Text("m".into())),
            ],
        )];

        let labels: Vec<String> = aggregate_responses(&responses)
            .questions
            .into_iter()
            .map(|q| q.label)
            .collect();
        assert_eq!(labels, vec!["Alpha", "Mid", "Zeta"]);
    }

    #[test]
    fn test_insight_serialization_omits_empty_sections() {
        let responses = vec![response(
            "s1",
            vec![NormalizedAnswer::new("Q1", "Attending?", "checkbox", AnswerValue::Bool(true))],
        )];

        let json = serde_json::to_value(aggregate_responses(&responses)).unwrap();
        let question = &json["questions"][0];
        assert_eq!(question["responseCount"], 1);
        assert_eq!(question["type"], "checkbox");
        assert_eq!(question["booleanBreakdown"][0]["value"], "Yes");
        assert!(question.get("topChoices").is_none());
        assert!(question.get("numericSummary").is_none());
        assert!(json["totals"].get("lastSubmittedAt").is_none());
    }
}
