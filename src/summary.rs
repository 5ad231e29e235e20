//! Short AI commentary over an aggregate. Never fails: every problem
//! degrades to a fixed message.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::analytics::{AggregatedTallyData, ChoiceStatistic, NumericSummary, SubmissionTotals};
use crate::error::LlmError;
use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::prompts::summary_prompt;

pub const MISSING_KEY_SUMMARY: &str = "Set OPENAI_API_KEY to enable AI-powered commentary.";
pub const EMPTY_SUMMARY: &str = "Insight summary unavailable.";
pub const FAILED_SUMMARY: &str = "Insight summary unavailable due to an AI service error.";

const SUMMARY_TEMPERATURE: f32 = 0.3;
const SUMMARY_MAX_TOKENS: u32 = 320;

const TOP_QUESTIONS: usize = 5;
const CHOICES_PER_QUESTION: usize = 3;
const HIGHLIGHTS_PER_QUESTION: usize = 2;

/// Commentary text and the model that produced it (absent on fallbacks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl SummaryResult {
    fn fallback(summary: &str) -> Self {
        Self {
            summary: summary.to_string(),
            model: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct SanitizedInsights<'a> {
    totals: &'a SubmissionTotals,
    #[serde(rename = "topQuestions")]
    top_questions: Vec<SanitizedQuestion<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SanitizedQuestion<'a> {
    label: &'a str,
    response_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_choices: Option<&'a [ChoiceStatistic]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    numeric_summary: Option<&'a NumericSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_highlights: Option<&'a [String]>,
}

/// Projection sent to the model: totals plus the first few questions,
/// each trimmed to a handful of choices and text highlights.
fn sanitize(insights: &AggregatedTallyData) -> SanitizedInsights<'_> {
    SanitizedInsights {
        totals: &insights.totals,
        top_questions: insights
            .questions
            .iter()
            .take(TOP_QUESTIONS)
            .map(|q| SanitizedQuestion {
                label: &q.label,
                response_count: q.response_count,
                top_choices: q
                    .top_choices
                    .as_deref()
                    .map(|c| &c[..c.len().min(CHOICES_PER_QUESTION)]),
                numeric_summary: q.numeric_summary.as_ref(),
                text_highlights: q
                    .text_samples
                    .as_deref()
                    .map(|t| &t[..t.len().min(HIGHLIGHTS_PER_QUESTION)]),
            })
            .collect(),
    }
}

/// Generates insights commentary with the configured chat model.
#[derive(Clone)]
pub struct Summarizer {
    client: Option<LlmClient>,
    model: String,
}

impl Summarizer {
    pub fn new(client: Option<LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Summarize an aggregate.
    pub async fn generate(&self, insights: &AggregatedTallyData) -> SummaryResult {
        let Some(client) = &self.client else {
            return SummaryResult::fallback(MISSING_KEY_SUMMARY);
        };

        let data = match serde_json::to_string(&sanitize(insights)) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "Failed to encode insights for summary");
                return SummaryResult::fallback(FAILED_SUMMARY);
            }
        };

        let request = ChatRequest::new(&self.model, vec![ChatMessage::user(summary_prompt(&data))])
            .with_temperature(SUMMARY_TEMPERATURE)
            .with_max_tokens(SUMMARY_MAX_TOKENS);

        match client.complete(request).await {
            Ok(summary) => SummaryResult {
                summary,
                model: Some(self.model.clone()),
            },
            Err(LlmError::EmptyCompletion) => {
                warn!(model = %self.model, "Summary model returned no text");
                SummaryResult {
                    summary: EMPTY_SUMMARY.to_string(),
                    model: Some(self.model.clone()),
                }
            }
            Err(e) => {
                error!(model = %self.model, error = %e, "Failed to generate AI summary");
                SummaryResult::fallback(FAILED_SUMMARY)
            }
        }
    }
}
