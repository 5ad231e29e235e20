use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Wire types (Tally submissions endpoint)
// ============================================================================

/// One page of `GET /forms/{formId}/submissions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionsPage {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub questions: Vec<TallyQuestion>,
    #[serde(default)]
    pub submissions: Vec<TallySubmission>,
}

/// Question definition from the form metadata.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyQuestion {
    pub id: String,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub question_type: Option<String>,
    #[serde(default)]
    pub fields: Vec<TallyQuestionField>,
}

/// Nested field descriptor; the first field carries the label and type tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyQuestionField {
    pub uuid: Option<String>,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub question_type: Option<String>,
    pub title: Option<String>,
}

/// A single form submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallySubmission {
    pub id: String,
    pub form_id: Option<String>,
    pub is_completed: Option<bool>,
    pub submitted_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    #[serde(default)]
    pub responses: Vec<TallyResponseEntry>,
}

/// One answered question inside a submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyResponseEntry {
    pub id: Option<String>,
    pub question_id: Option<String>,
    pub answer: Option<Value>,
    pub value: Option<Value>,
}

// ============================================================================
// Decoded answer shapes
// ============================================================================

/// A scalar JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Bool(bool),
}

/// Raw answer payload, decoded from arbitrary JSON into the shapes the
/// normalizer knows how to coerce.
#[derive(Debug, Clone, PartialEq)]
pub enum RawAnswer {
    Null,
    Scalar(Scalar),
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl RawAnswer {
    /// Decode a JSON value. Numbers that cannot be represented as `f64`
    /// are kept as objects so they fall through to JSON stringification.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => RawAnswer::Null,
            Value::String(s) => RawAnswer::Scalar(Scalar::Text(s)),
            Value::Bool(b) => RawAnswer::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_f64() {
                Some(f) => RawAnswer::Scalar(Scalar::Number(f)),
                None => RawAnswer::Scalar(Scalar::Text(n.to_string())),
            },
            Value::Array(items) => RawAnswer::Array(items),
            Value::Object(map) => RawAnswer::Object(map),
        }
    }
}

// ============================================================================
// Normalized types
// ============================================================================

/// Coerced answer value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
    Null,
}

impl From<Scalar> for AnswerValue {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Text(s) => AnswerValue::Text(s),
            Scalar::Number(n) => AnswerValue::Number(n),
            Scalar::Bool(b) => AnswerValue::Bool(b),
        }
    }
}

/// An answer with its question metadata resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAnswer {
    /// Stable question identifier.
    pub key: String,
    /// Human-readable prompt.
    pub label: String,
    /// Source type tag, e.g. `MULTIPLE_CHOICE`, `INPUT_NUMBER`, `text`.
    #[serde(rename = "type")]
    pub answer_type: String,
    pub value: AnswerValue,
}

/// A submission with every answer normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    pub answers: Vec<NormalizedAnswer>,
}

impl NormalizedAnswer {
    /// Create a new answer
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        answer_type: impl Into<String>,
        value: AnswerValue,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            answer_type: answer_type.into(),
            value,
        }
    }
}

impl NormalizedResponse {
    /// Create a new response with no answers
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            form_id: None,
            submitted_at: None,
            completed: None,
            answers: Vec::new(),
        }
    }

    /// Set the submission timestamp
    pub fn with_submitted_at(mut self, submitted_at: impl Into<String>) -> Self {
        self.submitted_at = Some(submitted_at.into());
        self
    }

    /// Set the completion flag
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Append an answer
    pub fn with_answer(mut self, answer: NormalizedAnswer) -> Self {
        self.answers.push(answer);
        self
    }
}
