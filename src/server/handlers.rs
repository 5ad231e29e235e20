use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{error, info, warn};

use super::AppState;
use crate::analytics::aggregate_responses;
use crate::connections::ConnectionAnalysis;
use crate::error::{ApiError, ApiResult, AppError};
use crate::insights::TallyInsightsResult;
use crate::llm::{ChatMessage, ChatRequest};
use crate::prompts::chat_system_prompt;
use crate::storage::{ChatAnswer, Connection, NewParticipant, Participant, ParticipantUpdate};
use crate::sync::persist_submissions;
use crate::tally::FetchOptions;

const CHAT_TEMPERATURE: f32 = 0.7;
const CHAT_MAX_TOKENS: u32 = 1000;
const DEBUG_SUBMISSION_LIMIT: u32 = 100;

// ============================================================================
// Request / response bodies
// ============================================================================

/// One question/answer pair of chat context.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatDataItem {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub chat_data: Option<Vec<ChatDataItem>>,
}

/// Per-question count in the diagnostics endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCount {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub answer_type: String,
    pub response_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPair {
    pub participant1_id: String,
    pub participant2_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    #[serde(flatten)]
    pub analysis: ConnectionAnalysis,
}

// ============================================================================
// Helpers
// ============================================================================

/// Check the bearer token when one is configured.
fn authorize(headers: &HeaderMap, expected: Option<&str>) -> ApiResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(strip_bearer)
        .unwrap_or("");

    if provided == expected {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn strip_bearer(value: &str) -> &str {
    let value = value.trim();
    match value.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => value[7..].trim(),
        _ => value,
    }
}

/// Count answers per question id, keeping first-seen label and type.
fn count_questions<'a>(
    answers: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>,
) -> Vec<QuestionCount> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<QuestionCount> = Vec::new();

    for (id, label, answer_type) in answers {
        match index.get(id) {
            Some(&i) => counts[i].response_count += 1,
            None => {
                index.insert(id, counts.len());
                counts.push(QuestionCount {
                    id: id.to_string(),
                    label: label.to_string(),
                    answer_type: answer_type.to_string(),
                    response_count: 1,
                });
            }
        }
    }

    counts
}

fn chat_context(chat_data: &[ChatDataItem]) -> String {
    chat_data
        .iter()
        .map(|item| format!("Q: {}\nA: {}", item.question, item.answer))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn sync_failure(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "ok": false, "error": message })),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Insights for the configured form, memoized within this request.
pub async fn get_insights(State(state): State<AppState>) -> Json<TallyInsightsResult> {
    let scope = state.insights.scope();
    Json(scope.get_tally_insights().await.clone())
}

/// Stream a chat reply grounded in the supplied form data.
pub async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> Response {
    info!(
        messages = body.messages.len(),
        chat_data = body.chat_data.as_ref().map_or(0, Vec::len),
        "Chat request received"
    );

    let Some(llm) = state.llm.as_ref() else {
        error!("OpenAI API key not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "OpenAI API key not configured",
        )
            .into_response();
    };

    let context = match body.chat_data.as_deref() {
        Some(items) if !items.is_empty() => chat_context(items),
        _ => {
            warn!("No chat data provided, answering with unavailable message");
            String::new()
        }
    };

    let mut messages = Vec::with_capacity(body.messages.len() + 1);
    messages.push(ChatMessage::system(chat_system_prompt(&context)));
    messages.extend(body.messages);

    let request = ChatRequest::new(&state.chat_model, messages)
        .with_temperature(CHAT_TEMPERATURE)
        .with_max_tokens(CHAT_MAX_TOKENS);

    match llm.stream(request).await {
        Ok(stream) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(stream),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Chat API error");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Stored answers of the configured form, flattened for chat.
pub async fn chat_context_data(State(state): State<AppState>) -> ApiResult<Json<Vec<ChatAnswer>>> {
    let answers = state
        .storage
        .get_all_answers_for_chat(state.tally.form_id())
        .await?;
    Ok(Json(answers))
}

/// Fetch, persist and aggregate on demand.
pub async fn sync_tally(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&headers, state.sync_token.as_deref()) {
        return e.into_response();
    }

    let responses = match state
        .tally
        .fetch_form_responses(FetchOptions::default())
        .await
    {
        Ok(responses) => responses,
        Err(e) => {
            error!(error = %e, "Failed to backfill Tally submissions");
            return sync_failure(e.to_string());
        }
    };

    let persisted =
        match persist_submissions(state.storage.as_ref(), state.tally.form_id(), &responses).await
        {
            Ok(summary) => summary,
            Err(e) => return sync_failure(e.to_string()),
        };

    let aggregated = aggregate_responses(&responses);

    Json(json!({
        "ok": true,
        "persisted": persisted,
        "totals": aggregated.totals,
    }))
    .into_response()
}

/// Live question inventory straight from the forms API.
pub async fn tally_questions(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let responses = state
        .tally
        .fetch_form_responses(FetchOptions::default())
        .await
        .inspect_err(|e| error!(error = %e, "Failed to fetch Tally questions"))?;

    if responses.is_empty() {
        return Ok(Json(json!({ "message": "No submissions found" })));
    }

    let mut questions = count_questions(responses.iter().flat_map(|r| {
        r.answers
            .iter()
            .map(|a| (a.key.as_str(), a.label.as_str(), a.answer_type.as_str()))
    }));
    questions.sort_by(|a, b| b.response_count.cmp(&a.response_count));

    Ok(Json(json!({
        "totalSubmissions": responses.len(),
        "questions": questions,
    })))
}

/// Question inventory of what the store holds.
pub async fn tally_debug(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let results = state
        .storage
        .get_recent_summaries(state.tally.form_id(), DEBUG_SUBMISSION_LIMIT)
        .await?;

    let total_answers: usize = results.iter().map(|r| r.answers.len()).sum();
    let questions = count_questions(results.iter().flat_map(|r| {
        r.answers.iter().map(|a| {
            (
                a.question_id.as_str(),
                a.label.as_str(),
                a.answer_type.as_str(),
            )
        })
    }));

    Ok(Json(json!({
        "totalSubmissions": results.len(),
        "totalAnswers": total_answers,
        "questions": questions,
    })))
}

/// Delete every stored submission of the configured form.
pub async fn clear_tally(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    authorize(&headers, state.sync_token.as_deref())?;

    let result = state
        .storage
        .clear_all_tally_data(state.tally.form_id())
        .await
        .inspect_err(|e| error!(error = %e, "Failed to clear Tally data"))?;

    Ok(Json(json!({
        "success": true,
        "deletedSubmissions": result.deleted_submissions,
        "deletedAnswers": result.deleted_answers,
    })))
}

pub async fn list_participants(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Participant>>> {
    Ok(Json(state.storage.get_all_participants().await?))
}

pub async fn create_participant(
    State(state): State<AppState>,
    Json(fields): Json<NewParticipant>,
) -> ApiResult<(StatusCode, Json<Participant>)> {
    let participant = state.storage.create_participant(fields).await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

pub async fn get_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Participant>> {
    state
        .storage
        .get_participant(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Participant not found: {}", id)))
}

pub async fn update_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ParticipantUpdate>,
) -> ApiResult<Json<Participant>> {
    Ok(Json(state.storage.update_participant(&id, update).await?))
}

pub async fn delete_participant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.storage.delete_participant(&id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn analyze_connection(
    State(state): State<AppState>,
    Json(pair): Json<ConnectionPair>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let analysis = state
        .connections
        .analyze_connection(&pair.participant1_id, &pair.participant2_id)
        .await
        .map_err(|e| {
            error!(error = %e, "Error analyzing connection");
            match e {
                AppError::NotFound { message } => ApiError::NotFound(message),
                other => ApiError::Internal(format!("Failed to analyze connection: {}", other)),
            }
        })?;

    Ok(Json(AnalyzeResponse {
        success: true,
        analysis,
    }))
}

pub async fn get_connection(
    State(state): State<AppState>,
    Query(pair): Query<ConnectionPair>,
) -> ApiResult<Json<Connection>> {
    state
        .storage
        .get_connection_analysis(&pair.participant1_id, &pair.participant2_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Connection analysis not found".to_string()))
}
