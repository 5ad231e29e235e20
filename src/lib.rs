//! # Workshop Insights
//!
//! Backend for a workshop registration form hosted on Tally. It pulls
//! every submission through the Tally API, keeps a local SQLite copy,
//! aggregates answers into per-question statistics and adds short AI
//! commentary. The same data feeds a streaming chat assistant, and a
//! participant directory supports LinkedIn-based connection analysis.
//!
//! ## Architecture
//!
//! ```text
//! Tally API ──► tally (fetch + normalize) ──► analytics (aggregate) ──► summary (LLM)
//!                        │                                                  │
//!                        └──► sync ──► storage (SQLite)      insights ◄────┘
//!                                          ▲
//!              server (axum) ──────────────┴──► connections ──► linkedin agent
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use workshop_insights::{build_router, AppState, Config};
//! use workshop_insights::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let storage = Arc::new(SqliteStorage::new(&config.database).await?);
//!     let state = AppState::new(&config, storage)?;
//!     let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
//!     axum::serve(listener, build_router(state)).await?;
//!     Ok(())
//! }
//! ```

/// Per-question aggregation of normalized responses.
pub mod analytics;
/// Operator subcommands.
pub mod cli;
/// Configuration loaded from the environment.
pub mod config;
/// Participant connection analysis.
pub mod connections;
/// Error types and result aliases for the application.
pub mod error;
/// Fetch, persist, aggregate and summarize in one pipeline.
pub mod insights;
/// LinkedIn agent service client.
pub mod linkedin;
/// Chat completions client.
pub mod llm;
/// Language model prompts.
pub mod prompts;
/// HTTP application.
pub mod server;
/// SQLite storage layer for persistence.
pub mod storage;
/// AI commentary over aggregated insights.
pub mod summary;
/// Conversion of normalized responses into store inputs.
pub mod sync;
/// Tally API client and answer normalization.
pub mod tally;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{build_router, AppState};
