//! Integration tests for SQLite storage layer
//!
//! Tests database operations using an in-memory SQLite database, plus one
//! file-backed database in a temporary directory.

use workshop_insights::config::DatabaseConfig;
use workshop_insights::error::StorageError;
use workshop_insights::storage::{
    AnswerInput, NewConnection, NewParticipant, ParticipantUpdate, SqliteStorage, Storage,
    SubmissionInput, SyncSummary, RESPONDENT_LINKEDIN_QUESTION, RESPONDENT_NAME_QUESTION,
};

const FORM_ID: &str = "wor9ON";

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn text_answer(question_id: &str, label: &str, value: &str) -> AnswerInput {
    AnswerInput {
        question_id: question_id.to_string(),
        label: label.to_string(),
        answer_type: "INPUT_TEXT".to_string(),
        value_string: Some(value.to_string()),
        ..Default::default()
    }
}

fn submission(id: &str, submitted_at: i64, name: &str) -> SubmissionInput {
    SubmissionInput {
        submission_id: id.to_string(),
        submitted_at: Some(submitted_at),
        completed: Some(true),
        answers: vec![
            text_answer(RESPONDENT_NAME_QUESTION, "Name", name),
            text_answer(
                RESPONDENT_LINKEDIN_QUESTION,
                "LinkedIn",
                &format!("https://linkedin.com/in/{}", id),
            ),
            AnswerInput {
                question_id: "Q_tools".to_string(),
                label: "Tools".to_string(),
                answer_type: "CHECKBOXES".to_string(),
                value_list: Some(vec!["Cursor".to_string(), "Claude".to_string()]),
                ..Default::default()
            },
            AnswerInput {
                question_id: "Q_years".to_string(),
                label: "Years".to_string(),
                answer_type: "INPUT_NUMBER".to_string(),
                value_number: Some(3.0),
                ..Default::default()
            },
        ],
    }
}

fn participant(first: &str, profile: &str) -> NewParticipant {
    NewParticipant {
        first_name: first.to_string(),
        last_name: "Tester".to_string(),
        linkedin_image: String::new(),
        email: format!("{}@example.com", first.to_lowercase()),
        linkedin_profile: profile.to_string(),
    }
}

#[cfg(test)]
mod sync_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_first_sync_inserts() {
        let storage = create_test_storage().await;

        let summary = storage
            .sync_submissions(
                FORM_ID,
                &[submission("s1", 1_000, "Ada"), submission("s2", 2_000, "Grace")],
            )
            .await
            .unwrap();

        assert_eq!(
            summary,
            SyncSummary {
                total: 2,
                inserted: 2,
                updated: 0,
                skipped: 0
            }
        );
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() {
        let storage = create_test_storage().await;
        let input = vec![submission("s1", 1_000, "Ada"), submission("s2", 2_000, "Grace")];

        storage.sync_submissions(FORM_ID, &input).await.unwrap();
        let second = storage.sync_submissions(FORM_ID, &input).await.unwrap();

        assert_eq!(second.skipped, second.total);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 0);

        let results = storage.get_recent_summaries(FORM_ID, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(result.answers.len(), 4, "no duplicate answer rows");
        }
    }

    #[tokio::test]
    async fn test_changed_submission_replaces_answers() {
        let storage = create_test_storage().await;
        storage
            .sync_submissions(FORM_ID, &[submission("s1", 1_000, "Ada")])
            .await
            .unwrap();

        let mut changed = submission("s1", 5_000, "Ada King");
        changed.answers.truncate(2);
        let summary = storage.sync_submissions(FORM_ID, &[changed]).await.unwrap();
        assert_eq!(summary.updated, 1);

        let results = storage.get_recent_summaries(FORM_ID, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].submission.submitted_at, Some(5_000));
        assert_eq!(results[0].submission.respondent_name.as_deref(), Some("Ada King"));
        assert_eq!(results[0].answers.len(), 2);
    }

    #[tokio::test]
    async fn test_backfills_missing_respondent_fields() {
        let storage = create_test_storage().await;

        let mut anonymous = submission("s1", 1_000, "Ada");
        anonymous.answers.retain(|a| a.question_id.starts_with("Q_"));
        storage.sync_submissions(FORM_ID, &[anonymous]).await.unwrap();

        // Same timestamps, but the stored row has no respondent fields yet
        let summary = storage
            .sync_submissions(FORM_ID, &[submission("s1", 1_000, "Ada")])
            .await
            .unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 0);

        let results = storage.get_recent_summaries(FORM_ID, 10).await.unwrap();
        assert_eq!(results[0].submission.respondent_name.as_deref(), Some("Ada"));
        assert_eq!(
            results[0].submission.respondent_linkedin.as_deref(),
            Some("https://linkedin.com/in/s1")
        );
    }

    #[tokio::test]
    async fn test_recent_summaries_limit_and_form_scope() {
        let storage = create_test_storage().await;
        storage
            .sync_submissions(FORM_ID, &[submission("s1", 1_000, "Ada")])
            .await
            .unwrap();
        storage
            .sync_submissions(FORM_ID, &[submission("s2", 2_000, "Grace")])
            .await
            .unwrap();
        storage
            .sync_submissions("otherForm", &[submission("s3", 3_000, "Linus")])
            .await
            .unwrap();

        let results = storage.get_recent_summaries(FORM_ID, 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].submission.submission_id, "s2");

        let all = storage.get_recent_summaries(FORM_ID, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_answers_for_chat() {
        let storage = create_test_storage().await;
        storage
            .sync_submissions(FORM_ID, &[submission("s1", 1_000, "Ada")])
            .await
            .unwrap();

        let answers = storage.get_all_answers_for_chat(FORM_ID).await.unwrap();
        assert_eq!(answers.len(), 4);

        let tools = answers.iter().find(|a| a.question == "Tools").unwrap();
        assert_eq!(tools.answer, "Cursor, Claude");
        assert_eq!(tools.submission_id, "s1");
        assert_eq!(tools.respondent_name.as_deref(), Some("Ada"));

        let years = answers.iter().find(|a| a.question == "Years").unwrap();
        assert_eq!(years.answer, "3");
        assert_eq!(years.answer_type, "INPUT_NUMBER");
    }

    #[tokio::test]
    async fn test_clear_all_tally_data() {
        let storage = create_test_storage().await;
        storage
            .sync_submissions(
                FORM_ID,
                &[submission("s1", 1_000, "Ada"), submission("s2", 2_000, "Grace")],
            )
            .await
            .unwrap();
        storage
            .sync_submissions("otherForm", &[submission("s3", 3_000, "Linus")])
            .await
            .unwrap();

        let cleared = storage.clear_all_tally_data(FORM_ID).await.unwrap();
        assert_eq!(cleared.deleted_submissions, 2);
        assert_eq!(cleared.deleted_answers, 8);

        assert!(storage.get_recent_summaries(FORM_ID, 10).await.unwrap().is_empty());
        assert_eq!(storage.get_recent_summaries("otherForm", 10).await.unwrap().len(), 1);

        let again = storage.clear_all_tally_data(FORM_ID).await.unwrap();
        assert_eq!(again.deleted_submissions, 0);
    }
}

#[cfg(test)]
mod participant_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_and_get_participant() {
        let storage = create_test_storage().await;

        let created = storage
            .create_participant(participant("Ada", "https://linkedin.com/in/ada"))
            .await
            .unwrap();
        let fetched = storage.get_participant(&created.id).await.unwrap().unwrap();

        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.first_name, "Ada");
        assert_eq!(fetched.linkedin_profile, "https://linkedin.com/in/ada");
    }

    #[tokio::test]
    async fn test_get_nonexistent_participant() {
        let storage = create_test_storage().await;
        assert!(storage.get_participant("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_participants() {
        let storage = create_test_storage().await;
        storage.create_participant(participant("Ada", "")).await.unwrap();
        storage.create_participant(participant("Grace", "")).await.unwrap();

        let all = storage.get_all_participants().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_update_participant_patches_fields() {
        let storage = create_test_storage().await;
        let created = storage.create_participant(participant("Ada", "")).await.unwrap();

        let updated = storage
            .update_participant(
                &created.id,
                ParticipantUpdate {
                    linkedin_profile: Some("https://linkedin.com/in/ada".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Ada");
        assert_eq!(updated.linkedin_profile, "https://linkedin.com/in/ada");

        let fetched = storage.get_participant(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.linkedin_profile, "https://linkedin.com/in/ada");
    }

    #[tokio::test]
    async fn test_update_missing_participant() {
        let storage = create_test_storage().await;
        let err = storage
            .update_participant("missing", ParticipantUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ParticipantNotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_participant() {
        let storage = create_test_storage().await;
        let created = storage.create_participant(participant("Ada", "")).await.unwrap();

        storage.delete_participant(&created.id).await.unwrap();
        assert!(storage.get_participant(&created.id).await.unwrap().is_none());

        let err = storage.delete_participant(&created.id).await.unwrap_err();
        assert!(matches!(err, StorageError::ParticipantNotFound { .. }));
    }
}

#[cfg(test)]
mod connection_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_connection(p1: &str, p2: &str, created_at: i64, note: &str) -> NewConnection {
        NewConnection {
            participant1_id: p1.to_string(),
            participant2_id: p2.to_string(),
            analysis: format!("raw {}", note),
            commonalities: vec!["Rust".to_string(), note.to_string()],
            recommendations: format!("Meet up: {}", note),
            created_at,
        }
    }

    /// Store with two participants; connections reference them.
    async fn storage_with_pair() -> (SqliteStorage, String, String) {
        let storage = create_test_storage().await;
        let first = storage.create_participant(participant("Ada", "")).await.unwrap();
        let second = storage.create_participant(participant("Grace", "")).await.unwrap();
        (storage, first.id, second.id)
    }

    #[tokio::test]
    async fn test_insert_and_find_either_order() {
        let (storage, p1, p2) = storage_with_pair().await;
        let id = storage
            .insert_connection(new_connection(&p1, &p2, 1_000, "first"))
            .await
            .unwrap();

        let forward = storage.get_connection_analysis(&p1, &p2).await.unwrap().unwrap();
        let reverse = storage.get_connection_analysis(&p2, &p1).await.unwrap().unwrap();

        assert_eq!(forward.id, id);
        assert_eq!(reverse.id, id);
        assert_eq!(forward.participant1_id, p1);
        assert_eq!(forward.commonalities, vec!["Rust", "first"]);
    }

    #[tokio::test]
    async fn test_latest_analysis_wins() {
        let (storage, p1, p2) = storage_with_pair().await;
        storage
            .insert_connection(new_connection(&p1, &p2, 1_000, "old"))
            .await
            .unwrap();
        storage
            .insert_connection(new_connection(&p2, &p1, 2_000, "new"))
            .await
            .unwrap();

        let found = storage.get_connection_analysis(&p1, &p2).await.unwrap().unwrap();
        assert_eq!(found.recommendations, "Meet up: new");
    }

    #[tokio::test]
    async fn test_unknown_participant_rejected() {
        let (storage, p1, _) = storage_with_pair().await;
        let result = storage
            .insert_connection(new_connection(&p1, "missing", 1_000, "orphan"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_commonalities_read_as_empty() {
        let (storage, p1, p2) = storage_with_pair().await;
        let id = storage
            .insert_connection(new_connection(&p1, &p2, 1_000, "first"))
            .await
            .unwrap();

        sqlx::query("UPDATE connections SET commonalities = 'not json' WHERE id = ?")
            .bind(&id)
            .execute(storage.pool())
            .await
            .unwrap();

        let found = storage.get_connection_analysis(&p1, &p2).await.unwrap().unwrap();
        assert!(found.commonalities.is_empty());
        assert_eq!(found.recommendations, "Meet up: first");
    }

    #[tokio::test]
    async fn test_missing_pair() {
        let storage = create_test_storage().await;
        assert!(storage.get_connection_analysis("a", "b").await.unwrap().is_none());
    }
}

#[cfg(test)]
mod file_backed_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file_config(dir: &tempfile::TempDir, max_connections: u32) -> DatabaseConfig {
        DatabaseConfig {
            path: dir.path().join("nested").join("workshop.db"),
            max_connections,
        }
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir, 2);

        {
            let storage = SqliteStorage::new(&config).await.unwrap();
            storage
                .sync_submissions(FORM_ID, &[submission("s1", 1_000, "Ada")])
                .await
                .unwrap();
            storage.pool().close().await;
        }

        let reopened = SqliteStorage::new(&config).await.unwrap();
        let results = reopened.get_recent_summaries(FORM_ID, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].answers.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_syncs_converge() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(&file_config(&dir, 5)).await.unwrap();

        let batch: Vec<SubmissionInput> = (0..20)
            .map(|i| submission(&format!("s{}", i), 1_000 + i, &format!("Person {}", i)))
            .collect();

        for _ in 0..3 {
            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let storage = storage.clone();
                    let batch = batch.clone();
                    tokio::spawn(async move { storage.sync_submissions(FORM_ID, &batch).await })
                })
                .collect();

            for task in tasks {
                let summary = task.await.unwrap().expect("concurrent sync must not fail");
                assert_eq!(summary.total, 20);
            }
        }

        let results = storage.get_recent_summaries(FORM_ID, 100).await.unwrap();
        assert_eq!(results.len(), 20);
        for result in results {
            assert_eq!(result.answers.len(), 4, "no duplicate answer rows");
        }

        let cleared = storage.clear_all_tally_data(FORM_ID).await.unwrap();
        assert_eq!(cleared.deleted_submissions, 20);
        assert_eq!(cleared.deleted_answers, 80);
    }
}
