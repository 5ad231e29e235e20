//! Storage layer for participants, connection analyses and synced Tally
//! submissions.
//!
//! [`Storage`] is the seam used by the rest of the crate;
//! [`SqliteStorage`] is the only implementation.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::tally::format_number;

/// Question whose text answer is promoted to `respondent_name`.
pub const RESPONDENT_NAME_QUESTION: &str = "Wz0E5Q";
/// Question whose text answer is promoted to `respondent_linkedin`.
pub const RESPONDENT_LINKEDIN_QUESTION: &str = "7xZL1R";

// ============================================================================
// Participants
// ============================================================================

/// A workshop participant in the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub linkedin_image: String,
    pub email: String,
    pub linkedin_profile: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParticipant {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub linkedin_image: String,
    pub email: String,
    #[serde(default)]
    pub linkedin_profile: String,
}

/// Partial participant update; only supplied fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub linkedin_image: Option<String>,
    pub email: Option<String>,
    pub linkedin_profile: Option<String>,
}

impl Participant {
    /// Create a participant record with a fresh id
    pub fn new(fields: NewParticipant) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            first_name: fields.first_name,
            last_name: fields.last_name,
            linkedin_image: fields.linkedin_image,
            email: fields.email,
            linkedin_profile: fields.linkedin_profile,
            created_at: Utc::now(),
        }
    }

    /// "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: ParticipantUpdate) {
        if let Some(v) = update.first_name {
            self.first_name = v;
        }
        if let Some(v) = update.last_name {
            self.last_name = v;
        }
        if let Some(v) = update.linkedin_image {
            self.linkedin_image = v;
        }
        if let Some(v) = update.email {
            self.email = v;
        }
        if let Some(v) = update.linkedin_profile {
            self.linkedin_profile = v;
        }
    }
}

// ============================================================================
// Connections
// ============================================================================

/// A stored connection analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub participant1_id: String,
    pub participant2_id: String,
    /// Raw model output.
    pub analysis: String,
    pub commonalities: Vec<String>,
    pub recommendations: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Fields for storing a connection analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConnection {
    pub participant1_id: String,
    pub participant2_id: String,
    pub analysis: String,
    pub commonalities: Vec<String>,
    pub recommendations: String,
    pub created_at: i64,
}

// ============================================================================
// Tally submissions
// ============================================================================

/// An answer ready for storage, with at most one value slot set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerInput {
    pub question_id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub answer_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_number: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_boolean: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_list: Option<Vec<String>>,
}

/// A submission ready for upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionInput {
    pub submission_id: String,
    /// Epoch milliseconds.
    pub submitted_at: Option<i64>,
    pub completed: Option<bool>,
    pub answers: Vec<AnswerInput>,
}

impl SubmissionInput {
    /// Text value of the answer to `question_id`, if any.
    pub fn answer_text(&self, question_id: &str) -> Option<String> {
        self.answers
            .iter()
            .find(|a| a.question_id == question_id)
            .and_then(|a| a.value_string.clone())
    }
}

/// Counts from one `sync_submissions` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub total: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

/// A stored submission row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSubmission {
    pub id: String,
    pub form_id: String,
    pub submission_id: String,
    pub submitted_at: Option<i64>,
    pub completed: bool,
    pub synced_at: i64,
    pub respondent_name: Option<String>,
    pub respondent_linkedin: Option<String>,
}

/// A stored answer row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnswer {
    pub id: String,
    /// Id of the owning [`StoredSubmission`].
    pub submission_ref: String,
    pub question_id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub answer_type: String,
    pub value_string: Option<String>,
    pub value_number: Option<f64>,
    pub value_boolean: Option<bool>,
    pub value_list: Option<Vec<String>>,
}

impl StoredAnswer {
    /// Answer rendered as text: the string slot, else the number, else the
    /// boolean, else the list joined with ", ". Empty when no slot is set.
    pub fn display_value(&self) -> String {
        if let Some(s) = self.value_string.as_ref().filter(|s| !s.is_empty()) {
            return s.clone();
        }
        if let Some(n) = self.value_number {
            return format_number(n);
        }
        if let Some(b) = self.value_boolean {
            return b.to_string();
        }
        if let Some(list) = &self.value_list {
            return list.join(", ");
        }
        String::new()
    }
}

/// A submission with its answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionWithAnswers {
    pub submission: StoredSubmission,
    pub answers: Vec<StoredAnswer>,
}

/// A flattened question/answer pair used as chat context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
    pub question: String,
    pub answer: String,
    #[serde(rename = "type")]
    pub answer_type: String,
    pub submission_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respondent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respondent_linkedin: Option<String>,
}

/// Counts from `clear_all_tally_data`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearSummary {
    pub deleted_submissions: u64,
    pub deleted_answers: u64,
}

// ============================================================================
// Storage trait
// ============================================================================

/// Persistence operations used by the application.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    // Participant operations

    /// List every participant.
    async fn get_all_participants(&self) -> StorageResult<Vec<Participant>>;
    /// Get a participant by ID.
    async fn get_participant(&self, id: &str) -> StorageResult<Option<Participant>>;
    /// Create a participant and return the stored record.
    async fn create_participant(&self, fields: NewParticipant) -> StorageResult<Participant>;
    /// Patch the supplied fields and return the updated record.
    async fn update_participant(
        &self,
        id: &str,
        update: ParticipantUpdate,
    ) -> StorageResult<Participant>;
    /// Delete a participant by ID.
    async fn delete_participant(&self, id: &str) -> StorageResult<()>;

    // Tally submission operations

    /// Upsert submissions keyed by `(form_id, submission_id)`.
    ///
    /// Unchanged submissions that already carry respondent fields are
    /// skipped. Updated submissions have their answer rows replaced.
    async fn sync_submissions(
        &self,
        form_id: &str,
        submissions: &[SubmissionInput],
    ) -> StorageResult<SyncSummary>;
    /// Most recently synced submissions with their answers.
    async fn get_recent_summaries(
        &self,
        form_id: &str,
        limit: u32,
    ) -> StorageResult<Vec<SubmissionWithAnswers>>;
    /// Every stored answer of a form, flattened for chat context.
    async fn get_all_answers_for_chat(&self, form_id: &str) -> StorageResult<Vec<ChatAnswer>>;
    /// Delete every submission and answer of a form.
    async fn clear_all_tally_data(&self, form_id: &str) -> StorageResult<ClearSummary>;

    // Connection operations

    /// Store a connection analysis and return its ID.
    async fn insert_connection(&self, connection: NewConnection) -> StorageResult<String>;
    /// Latest analysis for a pair, in either participant order.
    async fn get_connection_analysis(
        &self,
        participant1_id: &str,
        participant2_id: &str,
    ) -> StorageResult<Option<Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(question_id: &str) -> StoredAnswer {
        StoredAnswer {
            id: "a".to_string(),
            submission_ref: "s".to_string(),
            question_id: question_id.to_string(),
            label: "Label".to_string(),
            answer_type: "text".to_string(),
            value_string: None,
            value_number: None,
            value_boolean: None,
            value_list: None,
        }
    }

    #[test]
    fn test_display_value_slots() {
        let mut a = answer("Q1");
        assert_eq!(a.display_value(), "");

        a.value_list = Some(vec!["Cursor".to_string(), "Claude".to_string()]);
        assert_eq!(a.display_value(), "Cursor, Claude");

        a.value_boolean = Some(false);
        assert_eq!(a.display_value(), "false");

        a.value_number = Some(8.0);
        assert_eq!(a.display_value(), "8");

        a.value_string = Some(String::new());
        assert_eq!(a.display_value(), "8");

        a.value_string = Some("hello".to_string());
        assert_eq!(a.display_value(), "hello");
    }

    #[test]
    fn test_participant_apply_update() {
        let mut p = Participant::new(NewParticipant {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            linkedin_image: String::new(),
            email: "ada@example.com".to_string(),
            linkedin_profile: String::new(),
        });

        p.apply(ParticipantUpdate {
            email: Some("ada@analytical.engine".to_string()),
            ..Default::default()
        });

        assert_eq!(p.email, "ada@analytical.engine");
        assert_eq!(p.first_name, "Ada");
        assert_eq!(p.full_name(), "Ada Lovelace");
    }

    #[test]
    fn test_submission_answer_text() {
        let submission = SubmissionInput {
            submission_id: "s1".to_string(),
            submitted_at: None,
            completed: None,
            answers: vec![AnswerInput {
                question_id: RESPONDENT_NAME_QUESTION.to_string(),
                label: "Name".to_string(),
                answer_type: "INPUT_TEXT".to_string(),
                value_string: Some("Grace".to_string()),
                ..Default::default()
            }],
        };

        assert_eq!(
            submission.answer_text(RESPONDENT_NAME_QUESTION),
            Some("Grace".to_string())
        );
        assert_eq!(submission.answer_text(RESPONDENT_LINKEDIN_QUESTION), None);
    }
}
