//! The insights pipeline: fetch, best-effort persist, aggregate, summarize.
//!
//! [`InsightsService::get_tally_insights`] never returns an error; fetch
//! failures become [`TallyInsightsResult::Error`]. An [`InsightsScope`]
//! memoizes the result for the lifetime of one request so repeated calls
//! share a single upstream fetch.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, warn};

use crate::analytics::{aggregate_responses, AggregatedTallyData};
use crate::error::AppResult;
use crate::storage::Storage;
use crate::summary::Summarizer;
use crate::sync::persist_submissions;
use crate::tally::{FetchOptions, TallyClient};

/// Outcome of one insights run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TallyInsightsResult {
    Success {
        aggregated: AggregatedTallyData,
        summary: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    Error {
        message: String,
    },
}

/// Runs the insights pipeline against the configured form.
#[derive(Clone)]
pub struct InsightsService {
    tally: TallyClient,
    storage: Arc<dyn Storage>,
    summarizer: Summarizer,
}

impl InsightsService {
    pub fn new(tally: TallyClient, storage: Arc<dyn Storage>, summarizer: Summarizer) -> Self {
        Self {
            tally,
            storage,
            summarizer,
        }
    }

    /// Start a memoization scope, typically one per request.
    pub fn scope(&self) -> InsightsScope<'_> {
        InsightsScope {
            service: self,
            result: OnceCell::new(),
        }
    }

    /// Run the pipeline once, without memoization.
    pub async fn get_tally_insights(&self) -> TallyInsightsResult {
        let aggregated = match self.fetch_and_aggregate().await {
            Ok(aggregated) => aggregated,
            Err(e) => {
                error!(error = %e, "Unable to load Tally insights");
                return TallyInsightsResult::Error {
                    message: e.to_string(),
                };
            }
        };

        let summary = self.summarizer.generate(&aggregated).await;

        TallyInsightsResult::Success {
            aggregated,
            summary: summary.summary,
            model: summary.model,
        }
    }

    async fn fetch_and_aggregate(&self) -> AppResult<AggregatedTallyData> {
        let responses = self
            .tally
            .fetch_form_responses(FetchOptions::default())
            .await?;

        // Store failures must not block the page
        if let Err(e) =
            persist_submissions(self.storage.as_ref(), self.tally.form_id(), &responses).await
        {
            warn!(error = %e, "Best-effort Tally sync failed");
        }

        Ok(aggregate_responses(&responses))
    }
}

/// Request-scoped memoization of [`InsightsService::get_tally_insights`].
pub struct InsightsScope<'a> {
    service: &'a InsightsService,
    result: OnceCell<TallyInsightsResult>,
}

impl InsightsScope<'_> {
    /// The first call runs the pipeline; later calls reuse its result.
    pub async fn get_tally_insights(&self) -> &TallyInsightsResult {
        self.result
            .get_or_init(|| self.service.get_tally_insights())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RequestConfig, TallyConfig};
    use crate::error::StorageError;
    use crate::storage::{MockStorage, SyncSummary};
    use crate::summary::MISSING_KEY_SUMMARY;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tally_for(server: &MockServer, api_key: Option<&str>) -> TallyClient {
        let config = TallyConfig {
            api_key: api_key.map(str::to_string),
            base_url: server.uri(),
            form_id: "wor9ON".to_string(),
        };
        TallyClient::new(&config, RequestConfig::default()).unwrap()
    }

    fn one_page() -> serde_json::Value {
        json!({
            "page": 1,
            "hasMore": false,
            "questions": [
                {"id": "Q1", "title": "Experience", "type": "MULTIPLE_CHOICE", "fields": []}
            ],
            "submissions": [
                {
                    "id": "sub_1",
                    "isCompleted": true,
                    "submittedAt": "2024-05-01T10:00:00.000Z",
                    "responses": [{"questionId": "Q1", "answer": "Beginner"}]
                },
                {
                    "id": "sub_2",
                    "isCompleted": false,
                    "submittedAt": "2024-05-02T10:00:00.000Z",
                    "responses": [{"questionId": "Q1", "answer": "Expert"}]
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_scope_fetches_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forms/wor9ON/submissions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(one_page()))
            .expect(1)
            .mount(&server)
            .await;

        let mut storage = MockStorage::new();
        storage
            .expect_sync_submissions()
            .times(1)
            .returning(|_, s| {
                Ok(SyncSummary {
                    total: s.len() as u64,
                    inserted: s.len() as u64,
                    ..Default::default()
                })
            });

        let service = InsightsService::new(
            tally_for(&server, Some("tly-test")),
            Arc::new(storage),
            Summarizer::new(None, "gpt-4o-mini"),
        );

        let scope = service.scope();
        let first = scope.get_tally_insights().await.clone();
        let second = scope.get_tally_insights().await;
        assert_eq!(&first, second);

        match first {
            TallyInsightsResult::Success {
                aggregated,
                summary,
                model,
            } => {
                assert_eq!(aggregated.totals.submissions, 2);
                assert_eq!(aggregated.totals.completed_submissions, 1);
                assert_eq!(summary, MISSING_KEY_SUMMARY);
                assert!(model.is_none());
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_failure_does_not_fail_insights() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(one_page()))
            .mount(&server)
            .await;

        let mut storage = MockStorage::new();
        storage.expect_sync_submissions().returning(|_, _| {
            Err(StorageError::Connection {
                message: "database is locked".to_string(),
            })
        });

        let service = InsightsService::new(
            tally_for(&server, Some("tly-test")),
            Arc::new(storage),
            Summarizer::new(None, "gpt-4o-mini"),
        );

        assert!(matches!(
            service.get_tally_insights().await,
            TallyInsightsResult::Success { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_error_variant() {
        let server = MockServer::start().await;
        let mut storage = MockStorage::new();
        storage.expect_sync_submissions().never();

        let service = InsightsService::new(
            tally_for(&server, None),
            Arc::new(storage),
            Summarizer::new(None, "gpt-4o-mini"),
        );

        assert_eq!(
            service.get_tally_insights().await,
            TallyInsightsResult::Error {
                message: "Missing TALLY_API_KEY environment variable.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_upstream_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid API key"})),
            )
            .mount(&server)
            .await;

        let service = InsightsService::new(
            tally_for(&server, Some("bad")),
            Arc::new(MockStorage::new()),
            Summarizer::new(None, "gpt-4o-mini"),
        );

        match service.get_tally_insights().await {
            TallyInsightsResult::Error { message } => {
                assert_eq!(message, "Failed to fetch Tally responses (status 401): Invalid API key");
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_result_serialization() {
        let value = serde_json::to_value(TallyInsightsResult::Error {
            message: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"kind": "error", "message": "nope"}));

        let value = serde_json::to_value(TallyInsightsResult::Success {
            aggregated: AggregatedTallyData::default(),
            summary: "s".to_string(),
            model: None,
        })
        .unwrap();
        assert_eq!(value["kind"], "success");
        assert!(value.get("model").is_none());
    }
}
