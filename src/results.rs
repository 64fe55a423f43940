//! Client for the results service, the authoritative source of per-instance
//! outcomes for external host checks.

use crate::core::CheckResult;
use crate::error::NotifyError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Looks up the most recent results of a check.
#[async_trait]
pub trait ResultsService: Send + Sync {
    async fn get_check_results(
        &self,
        check_id: &str,
        customer_id: &str,
    ) -> Result<Vec<CheckResult>, NotifyError>;
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    results: Vec<CheckResult>,
}

/// HTTP implementation of [`ResultsService`].
pub struct HttpResultsClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpResultsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl ResultsService for HttpResultsClient {
    #[instrument(skip(self))]
    async fn get_check_results(
        &self,
        check_id: &str,
        customer_id: &str,
    ) -> Result<Vec<CheckResult>, NotifyError> {
        let response = self
            .http
            .get(format!("{}/results", self.base_url))
            .query(&[("check_id", check_id), ("customer_id", customer_id)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::upstream(
                "results service",
                format!("status {}: {}", status, body),
            ));
        }

        let parsed: ResultsResponse = response.json().await?;
        debug!(count = parsed.results.len(), "Fetched check results");
        Ok(parsed.results)
    }
}
