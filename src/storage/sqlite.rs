use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ChatAnswer, ClearSummary, Connection, NewConnection, NewParticipant, Participant,
    ParticipantUpdate, Storage, StoredAnswer, StoredSubmission, SubmissionInput,
    SubmissionWithAnswers, SyncSummary, RESPONDENT_LINKEDIN_QUESTION, RESPONDENT_NAME_QUESTION,
};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Write transactions take the write lock up front; concurrent writers wait
/// up to `BUSY_TIMEOUT` for it.
const WRITE_TRANSACTION: &str = "BEGIN IMMEDIATE";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SUBMISSION_COLUMNS: &str = "id, form_id, submission_id, submitted_at, completed, synced_at, respondent_name, respondent_linkedin";
const ANSWER_COLUMNS: &str = "id, submission_ref, question_id, label, type, value_string, value_number, value_boolean, value_list";
const PARTICIPANT_COLUMNS: &str =
    "id, first_name, last_name, linkedin_image, email, linkedin_profile, created_at";

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory instance (single connection, so every query sees
    /// the same database)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn answers_for(&self, submission_ref: &str) -> StorageResult<Vec<StoredAnswer>> {
        let rows: Vec<AnswerRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tally_answers WHERE submission_ref = ? ORDER BY rowid ASC",
            ANSWER_COLUMNS
        ))
        .bind(submission_ref)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredAnswer::try_from).collect()
    }

    async fn submissions_by_recency(
        &self,
        form_id: &str,
        limit: Option<u32>,
    ) -> StorageResult<Vec<StoredSubmission>> {
        let rows: Vec<SubmissionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tally_submissions WHERE form_id = ? ORDER BY synced_at DESC, rowid DESC LIMIT ?",
            SUBMISSION_COLUMNS
        ))
        .bind(form_id)
        // SQLite treats a negative LIMIT as unbounded
        .bind(limit.map(i64::from).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StoredSubmission::from).collect())
    }
}

async fn insert_answers(
    tx: &mut Transaction<'_, Sqlite>,
    submission_ref: &str,
    submission: &SubmissionInput,
) -> StorageResult<()> {
    for answer in &submission.answers {
        let value_list = answer
            .value_list
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::Query {
                message: format!("Failed to encode answer list: {}", e),
            })?;

        sqlx::query(
            r#"
            INSERT INTO tally_answers (id, submission_ref, question_id, label, type, value_string, value_number, value_boolean, value_list)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(submission_ref)
        .bind(&answer.question_id)
        .bind(&answer.label)
        .bind(&answer.answer_type)
        .bind(&answer.value_string)
        .bind(answer.value_number)
        .bind(answer.value_boolean)
        .bind(value_list)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_all_participants(&self) -> StorageResult<Vec<Participant>> {
        let rows: Vec<ParticipantRow> = sqlx::query_as(&format!(
            "SELECT {} FROM participants ORDER BY created_at ASC",
            PARTICIPANT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_participant(&self, id: &str) -> StorageResult<Option<Participant>> {
        let row: Option<ParticipantRow> = sqlx::query_as(&format!(
            "SELECT {} FROM participants WHERE id = ?",
            PARTICIPANT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn create_participant(&self, fields: NewParticipant) -> StorageResult<Participant> {
        let participant = Participant::new(fields);

        sqlx::query(
            r#"
            INSERT INTO participants (id, first_name, last_name, linkedin_image, email, linkedin_profile, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&participant.id)
        .bind(&participant.first_name)
        .bind(&participant.last_name)
        .bind(&participant.linkedin_image)
        .bind(&participant.email)
        .bind(&participant.linkedin_profile)
        .bind(participant.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(participant)
    }

    async fn update_participant(
        &self,
        id: &str,
        update: ParticipantUpdate,
    ) -> StorageResult<Participant> {
        let mut participant =
            self.get_participant(id)
                .await?
                .ok_or_else(|| StorageError::ParticipantNotFound { id: id.to_string() })?;
        participant.apply(update);

        sqlx::query(
            r#"
            UPDATE participants
            SET first_name = ?, last_name = ?, linkedin_image = ?, email = ?, linkedin_profile = ?
            WHERE id = ?
            "#,
        )
        .bind(&participant.first_name)
        .bind(&participant.last_name)
        .bind(&participant.linkedin_image)
        .bind(&participant.email)
        .bind(&participant.linkedin_profile)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(participant)
    }

    async fn delete_participant(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM participants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ParticipantNotFound { id: id.to_string() });
        }

        Ok(())
    }

    async fn sync_submissions(
        &self,
        form_id: &str,
        submissions: &[SubmissionInput],
    ) -> StorageResult<SyncSummary> {
        let mut summary = SyncSummary {
            total: submissions.len() as u64,
            ..Default::default()
        };

        let mut tx = self.pool.begin_with(WRITE_TRANSACTION).await?;

        for submission in submissions {
            let existing: Option<SubmissionRow> = sqlx::query_as(&format!(
                "SELECT {} FROM tally_submissions WHERE form_id = ? AND submission_id = ?",
                SUBMISSION_COLUMNS
            ))
            .bind(form_id)
            .bind(&submission.submission_id)
            .fetch_optional(&mut *tx)
            .await?;

            let completed = submission.completed.unwrap_or(false);
            let respondent_name = submission.answer_text(RESPONDENT_NAME_QUESTION);
            let respondent_linkedin = submission.answer_text(RESPONDENT_LINKEDIN_QUESTION);

            if let Some(row) = &existing {
                let has_respondent_data =
                    row.respondent_name.is_some() || row.respondent_linkedin.is_some();
                if row.submitted_at == submission.submitted_at
                    && row.completed == completed
                    && has_respondent_data
                {
                    summary.skipped += 1;
                    continue;
                }
            }

            let synced_at = Utc::now().timestamp_millis();

            let submission_ref = match existing {
                Some(row) => {
                    sqlx::query(
                        r#"
                        UPDATE tally_submissions
                        SET submitted_at = ?, completed = ?, synced_at = ?, respondent_name = ?, respondent_linkedin = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(submission.submitted_at)
                    .bind(completed)
                    .bind(synced_at)
                    .bind(&respondent_name)
                    .bind(&respondent_linkedin)
                    .bind(&row.id)
                    .execute(&mut *tx)
                    .await?;

                    sqlx::query("DELETE FROM tally_answers WHERE submission_ref = ?")
                        .bind(&row.id)
                        .execute(&mut *tx)
                        .await?;

                    summary.updated += 1;
                    row.id
                }
                None => {
                    let id = Uuid::new_v4().to_string();
                    sqlx::query(
                        r#"
                        INSERT INTO tally_submissions (id, form_id, submission_id, submitted_at, completed, synced_at, respondent_name, respondent_linkedin)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&id)
                    .bind(form_id)
                    .bind(&submission.submission_id)
                    .bind(submission.submitted_at)
                    .bind(completed)
                    .bind(synced_at)
                    .bind(&respondent_name)
                    .bind(&respondent_linkedin)
                    .execute(&mut *tx)
                    .await?;

                    summary.inserted += 1;
                    id
                }
            };

            insert_answers(&mut tx, &submission_ref, submission).await?;
        }

        tx.commit().await?;

        debug!(
            form_id = %form_id,
            total = summary.total,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "Submissions synced"
        );

        Ok(summary)
    }

    async fn get_recent_summaries(
        &self,
        form_id: &str,
        limit: u32,
    ) -> StorageResult<Vec<SubmissionWithAnswers>> {
        let submissions = self.submissions_by_recency(form_id, Some(limit)).await?;

        let mut results = Vec::with_capacity(submissions.len());
        for submission in submissions {
            let answers = self.answers_for(&submission.id).await?;
            results.push(SubmissionWithAnswers {
                submission,
                answers,
            });
        }

        Ok(results)
    }

    async fn get_all_answers_for_chat(&self, form_id: &str) -> StorageResult<Vec<ChatAnswer>> {
        let submissions = self.submissions_by_recency(form_id, None).await?;

        let mut formatted = Vec::new();
        for submission in submissions {
            for answer in self.answers_for(&submission.id).await? {
                formatted.push(ChatAnswer {
                    answer: answer.display_value(),
                    question: answer.label,
                    answer_type: answer.answer_type,
                    submission_id: submission.submission_id.clone(),
                    respondent_name: submission.respondent_name.clone(),
                    respondent_linkedin: submission.respondent_linkedin.clone(),
                });
            }
        }

        Ok(formatted)
    }

    async fn clear_all_tally_data(&self, form_id: &str) -> StorageResult<ClearSummary> {
        let mut tx = self.pool.begin_with(WRITE_TRANSACTION).await?;

        let answers = sqlx::query(
            r#"
            DELETE FROM tally_answers
            WHERE submission_ref IN (SELECT id FROM tally_submissions WHERE form_id = ?)
            "#,
        )
        .bind(form_id)
        .execute(&mut *tx)
        .await?;

        let submissions = sqlx::query("DELETE FROM tally_submissions WHERE form_id = ?")
            .bind(form_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ClearSummary {
            deleted_submissions: submissions.rows_affected(),
            deleted_answers: answers.rows_affected(),
        })
    }

    async fn insert_connection(&self, connection: NewConnection) -> StorageResult<String> {
        let id = Uuid::new_v4().to_string();
        let commonalities =
            serde_json::to_string(&connection.commonalities).map_err(|e| StorageError::Query {
                message: format!("Failed to encode commonalities: {}", e),
            })?;

        sqlx::query(
            r#"
            INSERT INTO connections (id, participant1_id, participant2_id, analysis, commonalities, recommendations, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&connection.participant1_id)
        .bind(&connection.participant2_id)
        .bind(&connection.analysis)
        .bind(&commonalities)
        .bind(&connection.recommendations)
        .bind(connection.created_at)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_connection_analysis(
        &self,
        participant1_id: &str,
        participant2_id: &str,
    ) -> StorageResult<Option<Connection>> {
        let row: Option<ConnectionRow> = sqlx::query_as(
            r#"
            SELECT id, participant1_id, participant2_id, analysis, commonalities, recommendations, created_at
            FROM connections
            WHERE (participant1_id = ? AND participant2_id = ?)
               OR (participant1_id = ? AND participant2_id = ?)
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(participant1_id)
        .bind(participant2_id)
        .bind(participant2_id)
        .bind(participant1_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: String,
    first_name: String,
    last_name: String,
    linkedin_image: String,
    email: String,
    linkedin_profile: String,
    created_at: String,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            linkedin_image: row.linkedin_image,
            email: row.email,
            linkedin_profile: row.linkedin_profile,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: String,
    form_id: String,
    submission_id: String,
    submitted_at: Option<i64>,
    completed: bool,
    synced_at: i64,
    respondent_name: Option<String>,
    respondent_linkedin: Option<String>,
}

impl From<SubmissionRow> for StoredSubmission {
    fn from(row: SubmissionRow) -> Self {
        Self {
            id: row.id,
            form_id: row.form_id,
            submission_id: row.submission_id,
            submitted_at: row.submitted_at,
            completed: row.completed,
            synced_at: row.synced_at,
            respondent_name: row.respondent_name,
            respondent_linkedin: row.respondent_linkedin,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AnswerRow {
    id: String,
    submission_ref: String,
    question_id: String,
    label: String,
    #[sqlx(rename = "type")]
    answer_type: String,
    value_string: Option<String>,
    value_number: Option<f64>,
    value_boolean: Option<bool>,
    value_list: Option<String>,
}

impl TryFrom<AnswerRow> for StoredAnswer {
    type Error = StorageError;

    fn try_from(row: AnswerRow) -> Result<Self, Self::Error> {
        let value_list = row
            .value_list
            .map(|raw| serde_json::from_str::<Vec<String>>(&raw))
            .transpose()
            .map_err(|e| StorageError::Query {
                message: format!("Corrupt answer list for {}: {}", row.id, e),
            })?;

        Ok(Self {
            id: row.id,
            submission_ref: row.submission_ref,
            question_id: row.question_id,
            label: row.label,
            answer_type: row.answer_type,
            value_string: row.value_string,
            value_number: row.value_number,
            value_boolean: row.value_boolean,
            value_list,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: String,
    participant1_id: String,
    participant2_id: String,
    analysis: String,
    commonalities: String,
    recommendations: String,
    created_at: i64,
}

impl From<ConnectionRow> for Connection {
    fn from(row: ConnectionRow) -> Self {
        let commonalities = serde_json::from_str(&row.commonalities).unwrap_or_else(|e| {
            warn!(connection_id = %row.id, error = %e, "Corrupt commonalities, returning none");
            Vec::new()
        });

        Self {
            id: row.id,
            participant1_id: row.participant1_id,
            participant2_id: row.participant2_id,
            analysis: row.analysis,
            commonalities,
            recommendations: row.recommendations,
            created_at: row.created_at,
        }
    }
}
