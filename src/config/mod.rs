use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;

/// Default Tally API endpoint.
pub const DEFAULT_TALLY_API_BASE: &str = "https://api.tally.so";
/// Default workshop registration form.
pub const DEFAULT_TALLY_FORM_ID: &str = "wor9ON";
/// Default model for commentary and chat.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub tally: TallyConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub linkedin: LinkedinConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
}

/// Tally forms API configuration
#[derive(Debug, Clone)]
pub struct TallyConfig {
    /// Bearer token; fetching fails with a configuration error when absent.
    pub api_key: Option<String>,
    pub base_url: String,
    pub form_id: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Language model API configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model used for insight commentary and chat.
    pub model: String,
    /// Model used for participant connection analysis.
    pub analysis_model: String,
}

/// LinkedIn agent service configuration
#[derive(Debug, Clone)]
pub struct LinkedinConfig {
    pub agent_url: String,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Bearer token guarding the sync and clear endpoints.
    pub sync_token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let tally = TallyConfig {
            api_key: non_empty_var("TALLY_API_KEY"),
            base_url: env::var("TALLY_API_BASE")
                .unwrap_or_else(|_| DEFAULT_TALLY_API_BASE.to_string()),
            form_id: env::var("TALLY_FORM_ID").unwrap_or_else(|_| DEFAULT_TALLY_FORM_ID.to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                first_var(&["DATABASE_PATH", "STORE_PATH", "DATABASE_URL"])
                    .map(|v| strip_sqlite_scheme(&v).to_string())
                    .unwrap_or_else(|| "./data/workshop.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let llm = LlmConfig {
            api_key: non_empty_var("OPENAI_API_KEY"),
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            analysis_model: env::var("ANALYSIS_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        };

        let linkedin = LinkedinConfig {
            agent_url: env::var("LINKEDIN_AGENT_URL")
                .unwrap_or_else(|_| "http://localhost:3002".to_string()),
        };

        let bind_raw = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let server = ServerConfig {
            bind_addr: bind_raw.parse().map_err(|_| AppError::Config {
                message: format!("BIND_ADDR is not a valid socket address: {}", bind_raw),
            })?,
            sync_token: non_empty_var("TALLY_SYNC_TOKEN"),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30000),
        };

        Ok(Config {
            tally,
            database,
            llm,
            linkedin,
            server,
            logging,
            request,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 30000 }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First of several alias variables that is set and non-empty.
fn first_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| non_empty_var(name))
}

fn strip_sqlite_scheme(value: &str) -> &str {
    value
        .strip_prefix("sqlite://")
        .or_else(|| value.strip_prefix("sqlite:"))
        .unwrap_or(value)
}
