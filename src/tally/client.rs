use reqwest::{Client, Response};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::normalize::{normalize_submission, QuestionMap};
use super::types::{NormalizedResponse, SubmissionsPage};
use crate::config::{RequestConfig, TallyConfig};
use crate::error::{AppError, AppResult, TallyError, TallyResult};

/// Options for a submissions fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Form to read; defaults to the configured form.
    pub form_id: Option<String>,
    /// First page to request; defaults to 1.
    pub start_page: Option<u32>,
}

/// Client for the Tally submissions API
#[derive(Clone)]
pub struct TallyClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    form_id: String,
    request_config: RequestConfig,
}

impl TallyClient {
    /// Create a new Tally client
    pub fn new(config: &TallyConfig, request_config: RequestConfig) -> TallyResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(TallyError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            form_id: config.form_id.clone(),
            request_config,
        })
    }

    /// The form read when no override is given
    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch every submission of a form, page by page, and normalize it.
    ///
    /// Question metadata accumulates across pages, so a later page can
    /// introduce questions. A failed page aborts the whole fetch.
    pub async fn fetch_form_responses(
        &self,
        options: FetchOptions,
    ) -> AppResult<Vec<NormalizedResponse>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| AppError::Config {
            message: "Missing TALLY_API_KEY environment variable.".to_string(),
        })?;
        let form_id = options.form_id.as_deref().unwrap_or(&self.form_id);

        let start = Instant::now();
        let mut questions = QuestionMap::new();
        let mut results = Vec::new();
        let mut page = options.start_page.unwrap_or(1);
        let mut pages_fetched = 0u32;

        loop {
            let payload = self.fetch_page(api_key, form_id, page).await?;
            pages_fetched += 1;

            debug!(
                form_id = %form_id,
                page,
                submissions = payload.submissions.len(),
                has_more = payload.has_more,
                "Fetched Tally page"
            );

            for question in payload.questions {
                questions.insert(question.id.clone(), question);
            }

            results.extend(
                payload
                    .submissions
                    .into_iter()
                    .map(|submission| normalize_submission(submission, &questions)),
            );

            if !payload.has_more {
                break;
            }
            page += 1;
        }

        info!(
            form_id = %form_id,
            submissions = results.len(),
            pages = pages_fetched,
            last_page = page,
            latency_ms = start.elapsed().as_millis(),
            "Tally responses fetched"
        );

        Ok(results)
    }

    async fn fetch_page(
        &self,
        api_key: &str,
        form_id: &str,
        page: u32,
    ) -> TallyResult<SubmissionsPage> {
        let url = format!("{}/forms/{}/submissions", self.base_url, form_id);

        let response = self
            .client
            .get(&url)
            .query(&[("page", page.to_string())])
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TallyError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    TallyError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TallyError::Api {
                status: status.as_u16(),
                message: extract_error_message(response).await,
            });
        }

        response
            .json::<SubmissionsPage>()
            .await
            .map_err(|e| TallyError::InvalidResponse {
                message: format!("Failed to parse submissions page {}: {}", page, e),
            })
    }
}

/// Best-effort error message: a JSON `message` or `error` string, the whole
/// JSON body otherwise, and the HTTP status text when the body is not JSON.
async fn extract_error_message(response: Response) -> String {
    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string();

    let Ok(body) = response.text().await else {
        return fallback;
    };

    match serde_json::from_str::<Value>(&body) {
        Ok(data) => ["message", "error"]
            .iter()
            .find_map(|field| data.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| data.to_string()),
        Err(_) => fallback,
    }
}
