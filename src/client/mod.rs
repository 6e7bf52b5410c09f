//! HTTP client for the backend API.
//!
//! The UI never talks to the backend directly; it goes through these
//! wrappers, which degrade every failure into an `{error, status}` value
//! (status 0 for transport errors) instead of propagating faults. An
//! unreachable backend therefore renders as an empty list, not a crash.

pub mod model;

use model::Endpoint;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend API outcome in the shape the UI consumes:
/// `{data, status}` on success, `{error, status}` otherwise.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ApiResult<T> {
    Data { data: T, status: u16 },
    Error { error: String, status: u16 },
}

impl<T> ApiResult<T> {
    pub fn is_data(&self) -> bool {
        matches!(self, ApiResult::Data { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Generic GET. Transport errors map to status 0, non-2xx responses
    /// to their own status; both become `ApiResult::Error`.
    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> ApiResult<T> {
        let url = self.url(endpoint);
        tracing::debug!("API Request: GET {}", url);

        let resp = match self.client.get(&url).timeout(REQUEST_TIMEOUT).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("API Request failed: {}", e);
                return ApiResult::Error {
                    error: e.to_string(),
                    status: 0,
                };
            }
        };

        let status = resp.status();
        if !status.is_success() {
            tracing::error!("API Error: {}", status);
            return ApiResult::Error {
                error: format!("HTTP {}", status),
                status: status.as_u16(),
            };
        }

        match resp.json::<T>().await {
            Ok(data) => ApiResult::Data {
                data,
                status: status.as_u16(),
            },
            Err(e) => {
                tracing::error!("API response body invalid: {}", e);
                ApiResult::Error {
                    error: format!("Invalid response body: {}", e),
                    status: status.as_u16(),
                }
            }
        }
    }

    /// List all endpoints registered in the backend.
    pub async fn get_endpoints(&self) -> ApiResult<Vec<Endpoint>> {
        self.get_json("/api/endpoint-management/endpoints").await
    }

    /// Backend liveness check against the base URL.
    pub async fn test_connection(&self) -> bool {
        match self
            .client
            .get(&self.url("/"))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::error!("Backend connection test failed: {}", e);
                false
            }
        }
    }
}
