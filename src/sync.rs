//! Conversion of normalized responses into store inputs, and the persist
//! step shared by the insights pipeline, the sync endpoint and the CLI.

use tracing::{error, info};

use crate::analytics::is_excluded_question;
use crate::error::{StorageError, StorageResult};
use crate::storage::{
    AnswerInput, Storage, SubmissionInput, SyncSummary, RESPONDENT_LINKEDIN_QUESTION,
    RESPONDENT_NAME_QUESTION,
};
use crate::tally::{parse_timestamp, AnswerValue, NormalizedAnswer, NormalizedResponse};

const PERSIST_HINT: &str =
    "Ensure the database path is writable and the schema migrations have been applied";

/// Whether an answer should be written to the store. Excluded keys are
/// dropped, except the respondent keys the store promotes to columns.
fn is_persisted(key: &str) -> bool {
    key == RESPONDENT_NAME_QUESTION
        || key == RESPONDENT_LINKEDIN_QUESTION
        || !is_excluded_question(key)
}

/// Map an answer to exactly one typed value slot (or none for null).
pub fn to_answer_input(answer: &NormalizedAnswer) -> AnswerInput {
    let mut input = AnswerInput {
        question_id: answer.key.clone(),
        label: answer.label.clone(),
        answer_type: answer.answer_type.clone(),
        ..Default::default()
    };

    match &answer.value {
        AnswerValue::Null => {}
        AnswerValue::Text(s) => input.value_string = Some(s.clone()),
        AnswerValue::Number(n) => input.value_number = Some(*n),
        AnswerValue::Bool(b) => input.value_boolean = Some(*b),
        AnswerValue::List(items) => input.value_list = Some(items.clone()),
    }

    input
}

/// Serialize a normalized response for `Storage::sync_submissions`.
pub fn to_submission_input(response: &NormalizedResponse) -> SubmissionInput {
    let submitted_at = response
        .submitted_at
        .as_deref()
        .and_then(parse_timestamp)
        .map(|at| at.timestamp_millis());

    SubmissionInput {
        submission_id: response.id.clone(),
        submitted_at,
        completed: Some(response.completed.unwrap_or(false)),
        answers: response
            .answers
            .iter()
            .filter(|a| is_persisted(&a.key))
            .map(to_answer_input)
            .collect(),
    }
}

/// Upsert normalized responses into the store.
///
/// An empty slice returns a zero summary without touching the store.
pub async fn persist_submissions(
    storage: &dyn Storage,
    form_id: &str,
    responses: &[NormalizedResponse],
) -> StorageResult<SyncSummary> {
    if responses.is_empty() {
        return Ok(SyncSummary::default());
    }

    let submissions: Vec<SubmissionInput> = responses.iter().map(to_submission_input).collect();

    match storage.sync_submissions(form_id, &submissions).await {
        Ok(summary) => {
            info!(
                form_id = %form_id,
                total = summary.total,
                inserted = summary.inserted,
                updated = summary.updated,
                skipped = summary.skipped,
                "Persisted Tally submissions"
            );
            Ok(summary)
        }
        Err(e) => {
            error!(form_id = %form_id, error = %e, "Failed to persist Tally submissions");
            Err(StorageError::Persist {
                message: format!("{}. {}", e, PERSIST_HINT),
            })
        }
    }
}
