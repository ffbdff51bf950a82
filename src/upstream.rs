//! Market-data upstream
//!
//! The [`Upstream`] trait is the single seam between the guard and the paid
//! API. [`TwelveDataClient`] implements it over HTTP; tests substitute a
//! counting mock.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::metrics;

/// Metered market-data API
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Latest quotes for `symbols` in one call
    async fn quotes(&self, symbols: &[String]) -> Result<Value>;

    /// Time series for one symbol
    async fn time_series(&self, symbol: &str, interval: &str, output_size: u32) -> Result<Value>;
}

/// HTTP client for the Twelve Data API
#[derive(Clone)]
pub struct TwelveDataClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    api_key: String,
}

impl fmt::Debug for TwelveDataClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwelveDataClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl TwelveDataClient {
    /// Build a client from configuration
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = reqwest::Url::parse(&config.base_url)
            .with_context(|| format!("Invalid upstream base URL: {}", config.base_url))?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Full request URL for `endpoint` with `params` and the API key
    fn endpoint_url(&self, endpoint: &str, params: &[(&str, String)]) -> Result<reqwest::Url> {
        let mut url = self
            .base_url
            .join(endpoint)
            .with_context(|| format!("Invalid endpoint: {}", endpoint))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .append_pair("apikey", &self.api_key);
        Ok(url)
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint_url(endpoint, params)?;
        debug!(endpoint, "Calling upstream");

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_upstream_request(endpoint, "error");
                // reqwest errors embed the URL, which carries the API key
                return Err(e.without_url()).with_context(|| format!("Request to /{} failed", endpoint));
            }
        };

        let status = response.status();
        metrics::record_upstream_request(endpoint, status.as_str());
        if !status.is_success() {
            bail!("Upstream /{} returned HTTP {}", endpoint, status);
        }

        let body: Value = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Invalid JSON from /{}", endpoint))?;

        // The API reports failures in-band with HTTP 200
        if body.get("status").and_then(Value::as_str) == Some("error") {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            bail!("Upstream /{} error: {}", endpoint, message);
        }

        Ok(body)
    }
}

#[async_trait]
impl Upstream for TwelveDataClient {
    async fn quotes(&self, symbols: &[String]) -> Result<Value> {
        self.get_json("quote", &[("symbol", symbols.join(","))]).await
    }

    async fn time_series(&self, symbol: &str, interval: &str, output_size: u32) -> Result<Value> {
        self.get_json(
            "time_series",
            &[
                ("symbol", symbol.to_string()),
                ("interval", interval.to_string()),
                ("outputsize", output_size.to_string()),
            ],
        )
        .await
    }
}
