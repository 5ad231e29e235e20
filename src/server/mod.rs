//! HTTP application: shared state and the axum router.

mod handlers;

pub use handlers::*;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::connections::ConnectionAnalyzer;
use crate::error::AppResult;
use crate::insights::InsightsService;
use crate::linkedin::LinkedinClient;
use crate::llm::LlmClient;
use crate::storage::Storage;
use crate::summary::Summarizer;
use crate::tally::TallyClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub tally: TallyClient,
    /// `None` when no language model API key is configured.
    pub llm: Option<LlmClient>,
    /// Model used by the chat assistant.
    pub chat_model: String,
    /// Bearer token for the sync and clear endpoints; open when `None`.
    pub sync_token: Option<String>,
    pub insights: InsightsService,
    pub connections: ConnectionAnalyzer,
}

impl AppState {
    /// Build every client from configuration around a shared store.
    pub fn new(config: &Config, storage: Arc<dyn Storage>) -> AppResult<Self> {
        let tally = TallyClient::new(&config.tally, config.request.clone())?;
        let llm = LlmClient::from_config(&config.llm, config.request.clone())?;
        let linkedin = LinkedinClient::new(&config.linkedin, config.request.clone())?;

        let insights = InsightsService::new(
            tally.clone(),
            storage.clone(),
            Summarizer::new(llm.clone(), &config.llm.model),
        );
        let connections = ConnectionAnalyzer::new(
            storage.clone(),
            linkedin,
            llm.clone(),
            &config.llm.analysis_model,
        );

        tracing::info!(
            form_id = %tally.form_id(),
            llm_configured = llm.is_some(),
            sync_gated = config.server.sync_token.is_some(),
            "Application state initialized"
        );

        Ok(Self {
            storage,
            tally,
            llm,
            chat_model: config.llm.model.clone(),
            sync_token: config.server.sync_token.clone(),
            insights,
            connections,
        })
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/insights", get(get_insights))
        .route("/api/chat", post(chat))
        .route("/api/chat/context", get(chat_context_data))
        .route("/api/tally/sync", post(sync_tally))
        .route("/api/clear-tally/sync", post(sync_tally))
        .route("/api/tally-questions", get(tally_questions))
        .route("/api/tally-debug", get(tally_debug))
        .route("/api/clear-tally", post(clear_tally))
        .route(
            "/api/participants",
            get(list_participants).post(create_participant),
        )
        .route(
            "/api/participants/:id",
            get(get_participant)
                .patch(update_participant)
                .delete(delete_participant),
        )
        .route("/api/connections/analyze", post(analyze_connection))
        .route("/api/connections", get(get_connection))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
