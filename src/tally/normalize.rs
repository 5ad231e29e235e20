//! Conversion of raw Tally submissions into [`NormalizedResponse`]s.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::types::{
    AnswerValue, NormalizedAnswer, NormalizedResponse, RawAnswer, Scalar, TallyQuestion,
    TallyResponseEntry, TallySubmission,
};

/// Question metadata lookup, keyed by question id.
pub type QuestionMap = HashMap<String, TallyQuestion>;

/// Label and type tag for a question.
pub fn question_metadata(question: Option<&TallyQuestion>) -> (String, String) {
    let Some(question) = question else {
        return ("Unknown question".to_string(), "text".to_string());
    };

    let primary = question.fields.first();

    let label = primary
        .and_then(|f| f.title.clone())
        .or_else(|| question.title.clone())
        .unwrap_or_else(|| question.id.clone());
    let answer_type = primary
        .and_then(|f| f.question_type.clone())
        .or_else(|| question.question_type.clone())
        .unwrap_or_else(|| "text".to_string());

    (label, answer_type)
}

/// Coerce a raw answer into one of the normalized value shapes.
pub fn coerce_value(raw: RawAnswer) -> AnswerValue {
    match raw {
        RawAnswer::Null => AnswerValue::Null,
        RawAnswer::Scalar(scalar) => scalar.into(),
        RawAnswer::Array(items) => AnswerValue::List(
            items
                .into_iter()
                .filter_map(coerce_list_entry)
                .filter(|entry| !entry.is_empty())
                .collect(),
        ),
        RawAnswer::Object(map) => coerce_object(map),
    }
}

fn coerce_list_entry(entry: Value) -> Option<String> {
    match entry {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) => format_number(f),
            None => n.to_string(),
        }),
        Value::Object(ref map) => {
            let projected = ["label", "text"]
                .iter()
                .find_map(|field| map.get(*field).and_then(Value::as_str));
            match projected {
                Some(s) => Some(s.to_string()),
                None => Some(entry.to_string()),
            }
        }
        Value::Array(_) => Some(entry.to_string()),
    }
}

fn coerce_object(map: Map<String, Value>) -> AnswerValue {
    for field in ["text", "label"] {
        if let Some(Value::String(s)) = map.get(field) {
            return AnswerValue::Text(s.clone());
        }
    }

    match map.get("value") {
        Some(Value::String(s)) => return AnswerValue::Text(s.clone()),
        Some(Value::Bool(b)) => return AnswerValue::Bool(*b),
        Some(Value::Number(n)) => {
            if let Some(f) = n.as_f64() {
                return AnswerValue::Number(f);
            }
        }
        _ => {}
    }

    AnswerValue::Text(Value::Object(map).to_string())
}

/// Normalize one response entry. Entries with neither a question id nor an
/// entry id are dropped.
pub fn normalize_answer(
    entry: TallyResponseEntry,
    question: Option<&TallyQuestion>,
) -> Option<NormalizedAnswer> {
    let key = entry.question_id.or(entry.id)?;
    let (label, answer_type) = question_metadata(question);
    let raw = entry
        .answer
        .filter(|v| !v.is_null())
        .or(entry.value)
        .map(RawAnswer::from_json)
        .unwrap_or(RawAnswer::Null);

    Some(NormalizedAnswer {
        key,
        label,
        answer_type,
        value: coerce_value(raw),
    })
}

/// Normalize a submission against the question metadata seen so far.
///
/// Duplicate question keys within one submission keep the last value.
pub fn normalize_submission(
    submission: TallySubmission,
    questions: &QuestionMap,
) -> NormalizedResponse {
    let mut answers: Vec<NormalizedAnswer> = Vec::with_capacity(submission.responses.len());

    for entry in submission.responses {
        let question = entry.question_id.as_deref().and_then(|id| questions.get(id));
        let Some(answer) = normalize_answer(entry, question) else {
            continue;
        };

        match answers.iter_mut().find(|a| a.key == answer.key) {
            Some(existing) => *existing = answer,
            None => answers.push(answer),
        }
    }

    NormalizedResponse {
        id: submission.id,
        form_id: submission.form_id,
        submitted_at: submission
            .submitted_at
            .or(submission.updated_at)
            .or(submission.created_at),
        completed: submission.is_completed,
        answers,
    }
}

/// Render a number the way the forms frontend displays it: integers without
/// a fractional part, exponent notation outside `[1e-6, 1e21)`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return if value.is_nan() {
            "NaN".to_string()
        } else if value > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }

    let magnitude = value.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return value.to_string();
    }

    let formatted = format!("{:e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if exponent.starts_with('-') => {
            format!("{}e{}", mantissa, exponent)
        }
        Some((mantissa, exponent)) => format!("{}e+{}", mantissa, exponent),
        None => formatted,
    }
}

/// Parse a submission timestamp. Accepts RFC 3339 and naive ISO-8601
/// (treated as UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
