//! The built-in vendor client, modeled on Databento's historical-data HTTP
//! API: one GET per date chunk, returning newline-delimited JSON.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::adapter::{decode, execute_with_retry, Attempt, DateChunk, DecodeFailure, FetchOutcome, VendorAdapter};
use crate::config::{JobConfig, RetryConfig};
use crate::enums::Schema;
use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://hist.databento.com/v0";

/// Fetches historical records over HTTP from the vendor's `/timeseries.get_range`
/// endpoint, retrying transient failures per [`RetryConfig`].
pub struct DatabentoAdapter {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl DatabentoAdapter {
    /// Builds an adapter authenticating with `api_key`, using `retry` as its
    /// backoff policy.
    pub fn new(api_key: impl Into<String>, retry: RetryConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            retry,
        }
    }

    /// Overrides the base URL; used in tests against a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request_once(
        &self,
        job: &JobConfig,
        chunk: DateChunk,
    ) -> Attempt<String> {
        let url = format!("{}/timeseries.get_range", self.base_url);
        let query = [
            ("dataset", job.dataset.clone()),
            ("schema", job.schema.clone()),
            ("symbols", job.symbols.join(",")),
            ("stype_in", job.symbol_type.to_string()),
            ("start", chunk.start.to_string()),
            ("end", chunk.end.to_string()),
            ("encoding", "json".to_owned()),
        ];
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_key, Some(""))
            .query(&query)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() || e.is_connect() => {
                return Attempt::Retry {
                    error: Error::TransientIo {
                        attempts: 0,
                        source: e,
                    },
                    retry_after: None,
                };
            }
            Err(e) => return Attempt::Abort(Error::VendorRequest {
                status: 0,
                body: e.to_string(),
            }),
        };

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Attempt::Abort(Error::Auth(format!(
                "vendor returned {status} for dataset {}",
                job.dataset
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = Error::VendorRequest {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            };
            return if self.retry.is_retryable_status(status.as_u16()) {
                Attempt::Retry { error, retry_after }
            } else {
                Attempt::Abort(error)
            };
        }

        match response.text().await {
            Ok(body) => Attempt::Done(body),
            Err(e) => Attempt::Retry {
                error: Error::TransientIo {
                    attempts: 0,
                    source: e,
                },
                retry_after,
            },
        }
    }
}

#[async_trait]
impl VendorAdapter for DatabentoAdapter {
    async fn fetch_chunk(&self, job: &JobConfig, chunk: DateChunk) -> Result<FetchOutcome> {
        let schema = Schema::from_str(&job.schema)?;
        debug!(job = %job.name, schema = %schema, start = %chunk.start, end = %chunk.end, "fetching chunk");

        let body = execute_with_retry(&self.retry, |_attempt| self.request_once(job, chunk)).await?;

        let mut outcome = FetchOutcome::default();
        for line in body.lines().filter(|line| !line.trim().is_empty()) {
            let decoded = serde_json::from_str::<serde_json::Value>(line)
                .map_err(|e| Error::Decode {
                    schema: schema.code(),
                    detail: format!("malformed JSON line: {e}"),
                })
                .and_then(|raw| decode::decode_record(&schema, &raw));
            match decoded {
                Ok(record) => outcome.records.push(record),
                Err(error) => outcome.decode_failures.push(DecodeFailure {
                    raw: line.to_owned(),
                    error,
                }),
            }
        }

        info!(
            job = %job.name,
            decoded = outcome.records.len(),
            decode_failures = outcome.decode_failures.len(),
            "fetched chunk"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_build_does_not_panic() {
        let adapter = DatabentoAdapter::new("key", RetryConfig::default());
        assert_eq!(adapter.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn with_base_url_overrides_default() {
        let adapter =
            DatabentoAdapter::new("key", RetryConfig::default()).with_base_url("http://localhost:9999");
        assert_eq!(adapter.base_url, "http://localhost:9999");
    }
}
