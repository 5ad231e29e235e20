use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::types::{FetchProfilesRequest, FetchProfilesResponse, ProfileData};
use crate::config::{LinkedinConfig, RequestConfig};
use crate::error::{LinkedinError, LinkedinResult};

/// Client for the LinkedIn agent service
#[derive(Clone)]
pub struct LinkedinClient {
    client: Client,
    base_url: String,
}

impl LinkedinClient {
    /// Create a new LinkedIn agent client
    pub fn new(config: &LinkedinConfig, request_config: RequestConfig) -> LinkedinResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LinkedinError::Http)?;

        Ok(Self {
            client,
            base_url: config.agent_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch two profiles in one call. Both must come back.
    pub async fn fetch_profile_pair(
        &self,
        first_url: &str,
        second_url: &str,
    ) -> LinkedinResult<(ProfileData, ProfileData)> {
        let url = format!("{}/fetch-profiles", self.base_url);
        let start = Instant::now();

        debug!(agent = %self.base_url, "Fetching LinkedIn profiles");

        let response = self
            .client
            .post(&url)
            .json(&FetchProfilesRequest {
                profile_urls: vec![first_url.to_string(), second_url.to_string()],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LinkedinError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let body: FetchProfilesResponse = response.json().await?;

        if !body.success || body.profiles.len() != 2 {
            return Err(LinkedinError::MissingProfiles {
                message: "Failed to fetch both LinkedIn profiles from agent service".to_string(),
            });
        }

        let mut profiles = body.profiles.into_iter();
        match (profiles.next().flatten(), profiles.next().flatten()) {
            (Some(first), Some(second)) => {
                info!(
                    latency_ms = start.elapsed().as_millis(),
                    "LinkedIn profiles fetched"
                );
                Ok((first, second))
            }
            _ => Err(LinkedinError::MissingProfiles {
                message: "One or both profiles returned null from agent service".to_string(),
            }),
        }
    }
}
