//! Operator commands that run against the store and the forms API
//! without starting the HTTP server.

use clap::Subcommand;
use std::collections::{BTreeMap, HashSet};

use crate::analytics::aggregate_responses;
use crate::storage::{Storage, SubmissionWithAnswers};
use crate::sync::persist_submissions;
use crate::tally::{FetchOptions, TallyClient};

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Run the HTTP application (default)
    Serve,

    /// Fetch every submission, persist it and print the totals
    Sync,

    /// Show statistics about stored submissions
    Stats {
        /// Maximum number of submissions to inspect
        #[arg(long, default_value = "1000")]
        limit: u32,
    },

    /// Delete every stored submission and answer for the form
    Clear,
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Fetch, persist and aggregate once.
pub async fn execute_sync(tally: &TallyClient, storage: &dyn Storage) -> CliResult {
    let responses = match tally.fetch_form_responses(FetchOptions::default()).await {
        Ok(responses) => responses,
        Err(e) => return CliResult::error(format!("✗ Sync failed: {}", e)),
    };

    let summary = match persist_submissions(storage, tally.form_id(), &responses).await {
        Ok(summary) => summary,
        Err(e) => return CliResult::error(format!("✗ Sync failed: {}", e)),
    };

    let totals = aggregate_responses(&responses).totals;

    let mut output = String::new();
    output.push_str(&format!("Form ID: {}\n\n", tally.form_id()));
    output.push_str("✓ Sync completed\n");
    output.push_str(&format!("  Total:    {}\n", summary.total));
    output.push_str(&format!("  Inserted: {}\n", summary.inserted));
    output.push_str(&format!("  Updated:  {}\n", summary.updated));
    output.push_str(&format!("  Skipped:  {}\n\n", summary.skipped));
    output.push_str(&format!("  Submissions: {}\n", totals.submissions));
    output.push_str(&format!("  Completed:   {}\n", totals.completed_submissions));
    output.push_str(&format!("  Questions:   {}\n", totals.question_count));
    if let Some(last) = totals.last_submitted_at {
        output.push_str(&format!("  Last submitted at: {}\n", last));
    }

    CliResult::success(output)
}

/// Answer-count statistics over stored submissions.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub total_submissions: usize,
    pub total_answers: usize,
    pub min_answers: usize,
    pub max_answers: usize,
    pub unique_questions: usize,
    /// Answers-per-submission → number of submissions.
    pub distribution: BTreeMap<usize, usize>,
    /// `(question_id, label)` in first-seen order.
    pub question_labels: Vec<(String, String)>,
}

impl StoreStats {
    pub fn from_summaries(results: &[SubmissionWithAnswers]) -> Self {
        let mut distribution = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut question_labels = Vec::new();

        for result in results {
            *distribution.entry(result.answers.len()).or_insert(0) += 1;
            for answer in &result.answers {
                if seen.insert(answer.question_id.clone()) {
                    question_labels.push((answer.question_id.clone(), answer.label.clone()));
                }
            }
        }

        let counts = results.iter().map(|r| r.answers.len());

        Self {
            total_submissions: results.len(),
            total_answers: counts.clone().sum(),
            min_answers: counts.clone().min().unwrap_or(0),
            max_answers: counts.max().unwrap_or(0),
            unique_questions: seen.len(),
            distribution,
            question_labels,
        }
    }

    pub fn average_answers(&self) -> f64 {
        if self.total_submissions == 0 {
            return 0.0;
        }
        self.total_answers as f64 / self.total_submissions as f64
    }

    pub fn render(&self) -> String {
        let mut output = String::new();

        output.push_str("📊 Database Statistics:\n");
        output.push_str(&format!("  Total submissions: {}\n", self.total_submissions));
        output.push_str(&format!("  Total answers: {}\n", self.total_answers));
        output.push_str(&format!(
            "  Average answers per submission: {:.2}\n",
            self.average_answers()
        ));
        output.push_str(&format!("  Min answers in a submission: {}\n", self.min_answers));
        output.push_str(&format!("  Max answers in a submission: {}\n", self.max_answers));
        output.push_str(&format!("  Unique questions: {}\n\n", self.unique_questions));

        output.push_str("📈 Distribution of answers per submission:\n");
        for (count, submissions) in &self.distribution {
            let bar = "█".repeat(submissions.div_ceil(2));
            output.push_str(&format!(
                "  {} answers: {} ({} submissions)\n",
                count, bar, submissions
            ));
        }

        output.push_str("\n📝 Questions being stored:\n");
        for (id, label) in &self.question_labels {
            output.push_str(&format!("  - {} ({})\n", label, id));
        }

        output
    }
}

/// Print store statistics for a form.
pub async fn execute_stats(storage: &dyn Storage, form_id: &str, limit: u32) -> CliResult {
    match storage.get_recent_summaries(form_id, limit).await {
        Ok(results) => CliResult::success(format!(
            "Form ID: {}\n\n{}",
            form_id,
            StoreStats::from_summaries(&results).render()
        )),
        Err(e) => CliResult::error(format!("✗ Failed to fetch stats: {}", e)),
    }
}

/// Delete every stored submission of a form.
pub async fn execute_clear(storage: &dyn Storage, form_id: &str) -> CliResult {
    match storage.clear_all_tally_data(form_id).await {
        Ok(result) => CliResult::success(format!(
            "Form ID: {}\n\n✓ Cleanup completed successfully!\n  - Deleted {} submissions\n  - Deleted {} answers",
            form_id, result.deleted_submissions, result.deleted_answers
        )),
        Err(e) => CliResult::error(format!("✗ Cleanup failed: {}", e)),
    }
}
