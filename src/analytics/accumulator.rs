use super::{ChoiceStatistic, NumericSummary, QuestionInsight};
use crate::tally::{format_number, AnswerValue, NormalizedAnswer};

const TEXT_SAMPLE_LIMIT: usize = 3;
const TOP_CHOICE_LIMIT: usize = 5;

const CHOICE_TYPE_MARKERS: [&str; 5] = ["choice", "select", "dropdown", "checkbox", "radio"];
const NUMERIC_TYPE_MARKERS: [&str; 4] = ["number", "rating", "score", "scale"];

/// Whether a type tag names a selectable-option question.
pub fn is_choice_type(answer_type: &str) -> bool {
    let normalized = answer_type.to_lowercase();
    CHOICE_TYPE_MARKERS.iter().any(|m| normalized.contains(m))
}

/// Whether a type tag names a numeric question.
pub fn is_numeric_type(answer_type: &str) -> bool {
    let normalized = answer_type.to_lowercase();
    NUMERIC_TYPE_MARKERS.iter().any(|m| normalized.contains(m))
}

/// Parse a trimmed string as a plain decimal number (optional sign,
/// fraction, exponent). Hex literals, `NaN` and infinities are rejected.
pub fn parse_numeric(trimmed: &str) -> Option<f64> {
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Running statistics for one question during a single aggregation pass.
#[derive(Debug)]
pub(crate) struct QuestionAccumulator {
    label: String,
    answer_type: String,
    response_count: u64,
    /// Insertion order is kept so equal counts rank by first sighting.
    choice_counts: Vec<(String, u64)>,
    numeric_values: Vec<f64>,
    text_samples: Vec<String>,
    boolean_counts: Vec<(String, u64)>,
}

impl QuestionAccumulator {
    pub(crate) fn new(label: impl Into<String>, answer_type: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            answer_type: answer_type.into(),
            response_count: 0,
            choice_counts: Vec::new(),
            numeric_values: Vec::new(),
            text_samples: Vec::new(),
            boolean_counts: Vec::new(),
        }
    }

    /// Classify one answer into this question's buckets.
    pub(crate) fn record(&mut self, answer: &NormalizedAnswer) {
        self.response_count += 1;

        match &answer.value {
            AnswerValue::Null => {}
            AnswerValue::Number(n) => self.numeric_values.push(*n),
            AnswerValue::Bool(b) => {
                let key = if *b { "Yes" } else { "No" };
                bump(&mut self.boolean_counts, key);
            }
            AnswerValue::List(entries) => {
                for entry in entries {
                    let normalized = entry.trim();
                    if !normalized.is_empty() {
                        bump(&mut self.choice_counts, normalized);
                    }
                }
            }
            AnswerValue::Text(text) => self.record_text(text),
        }
    }

    fn record_text(&mut self, value: &str) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }

        // The accumulator keeps the type tag of the first answer seen.
        if let Some(number) = parse_numeric(trimmed) {
            if trimmed == format_number(number) || is_numeric_type(&self.answer_type) {
                self.numeric_values.push(number);
                return;
            }
        }

        if self.text_samples.len() < TEXT_SAMPLE_LIMIT {
            self.text_samples.push(trimmed.to_string());
        }

        if is_choice_type(&self.answer_type) {
            bump(&mut self.choice_counts, trimmed);
        }
    }

    pub(crate) fn into_insight(self, key: String) -> QuestionInsight {
        let total = self.response_count;

        let mut choices = to_statistics(self.choice_counts, total);
        choices.sort_by(|a, b| b.count.cmp(&a.count));
        choices.truncate(TOP_CHOICE_LIMIT);

        let mut booleans = to_statistics(self.boolean_counts, total);
        booleans.sort_by(|a, b| b.count.cmp(&a.count));

        let numeric_summary = summarize_numeric(&self.numeric_values);

        QuestionInsight {
            key,
            label: self.label,
            answer_type: self.answer_type,
            response_count: total,
            top_choices: (!choices.is_empty()).then_some(choices),
            numeric_summary,
            boolean_breakdown: (!booleans.is_empty()).then_some(booleans),
            text_samples: (!self.text_samples.is_empty()).then_some(self.text_samples),
        }
    }
}

fn bump(counts: &mut Vec<(String, u64)>, key: &str) {
    match counts.iter_mut().find(|(k, _)| k == key) {
        Some((_, count)) => *count += 1,
        None => counts.push((key.to_string(), 1)),
    }
}

fn to_statistics(counts: Vec<(String, u64)>, total: u64) -> Vec<ChoiceStatistic> {
    counts
        .into_iter()
        .map(|(value, count)| ChoiceStatistic {
            percentage: percentage(count, total),
            value,
            count,
        })
        .collect()
}

/// Share of `total`, in percent, rounded to one decimal. Zero when `total`
/// is zero.
pub fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(count as f64 / total as f64 * 100.0, 1)
}

fn summarize_numeric(values: &[f64]) -> Option<NumericSummary> {
    if values.is_empty() {
        return None;
    }

    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(NumericSummary {
        average: round_to(sum / values.len() as f64, 2),
        min,
        max,
    })
}

/// Round to `decimals` places from the exact binary value of `value`, so
/// `0.075` (stored as 0.07499..) gives `0.07`. Exact halfway points round
/// away from zero.
fn round_to(value: f64, decimals: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }

    // An exact tie is an odd multiple of 2^-(decimals + 1)
    let halves = value.abs() * 2f64.powi(decimals as i32 + 1);
    if halves.fract() == 0.0 && halves % 2.0 == 1.0 {
        let factor = 10f64.powi(decimals as i32);
        return ((value.abs() * factor).ceil() / factor).copysign(value);
    }

    format!("{:.*}", decimals, value).parse().unwrap_or(value)
}
