//! HTTP market-data provider.
//!
//! Fetches OHLC bars from a REST endpoint and renders them as a compact
//! text snapshot:
//!
//! ```text
//! GET {base_url}/ohlc?pair=XAU%2FUSD&as_of=2026-10-19T08:30:00Z&limit=30
//! Authorization: Bearer <token>
//!
//! { "pair": "XAU/USD", "bars": [ { "time": "...", "open": 1.0, "high": 1.0,
//!   "low": 1.0, "close": 1.0, "volume": 10.0 }, ... ] }
//! ```
//!
//! The reqwest client carries the request timeout; callers await without one.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use signalsight_config::EnrichmentConfig;
use signalsight_core::enrichment::EnrichmentProvider;
use signalsight_core::error::EnrichmentError;
use std::time::Duration;
use tracing::{debug, warn};

/// Market-data provider backed by an OHLC REST endpoint.
pub struct HttpEnrichmentProvider {
    base_url: String,
    api_key: Option<String>,
    max_bars: usize,
    client: reqwest::Client,
}

impl HttpEnrichmentProvider {
    /// Create a provider for `base_url` with the given request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            max_bars: 30,
            client,
        })
    }

    /// Build from the `[enrichment]` config section.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            EnrichmentError::NotConfigured("enrichment.base_url is not set".into())
        })?;

        let mut provider = Self::new(base_url, config.timeout())?.with_max_bars(config.max_bars);
        provider.api_key = config.api_key.clone();
        Ok(provider)
    }

    /// Fallback credential used when the caller supplies no auth token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_bars(mut self, max_bars: usize) -> Self {
        self.max_bars = max_bars.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EnrichmentProvider for HttpEnrichmentProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn market_snapshot(
        &self,
        pair: &str,
        as_of: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> Result<String, EnrichmentError> {
        let url = format!("{}/ohlc", self.base_url);
        let as_of_param = as_of.to_rfc3339_opts(SecondsFormat::Secs, true);
        let limit = self.max_bars.to_string();

        let mut request = self.client.get(&url).query(&[
            ("pair", pair),
            ("as_of", as_of_param.as_str()),
            ("limit", limit.as_str()),
        ]);
        if let Some(token) = auth_token.or(self.api_key.as_deref()) {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        debug!(pair, as_of = %as_of_param, "Requesting market snapshot");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EnrichmentError::Timeout(e.to_string())
            } else {
                EnrichmentError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(EnrichmentError::Unauthorized(
                "Invalid or missing market data token".into(),
            ));
        }

        if status == 408 || status == 504 {
            return Err(EnrichmentError::Timeout(format!(
                "market data service returned {status}"
            )));
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Market data service returned error");
            return Err(EnrichmentError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let body: OhlcResponse = response
            .json()
            .await
            .map_err(|e| EnrichmentError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        render_bars(body.pair.as_deref().unwrap_or(pair), &body.bars, self.max_bars)
    }
}

#[derive(Debug, Deserialize)]
struct OhlcResponse {
    #[serde(default)]
    pair: Option<String>,
    #[serde(default)]
    bars: Vec<OhlcBar>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OhlcBar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Render the most recent `max_bars` bars, oldest first, ending with the
/// latest close on its own line.
pub fn render_bars(pair: &str, bars: &[OhlcBar], max_bars: usize) -> Result<String, EnrichmentError> {
    let Some(last) = bars.last() else {
        return Err(EnrichmentError::InvalidResponse(format!(
            "no bars returned for {pair}"
        )));
    };

    let start = bars.len().saturating_sub(max_bars.max(1));
    let window = &bars[start..];

    let mut out = format!("OHLC {pair} ({} bars)\n", window.len());
    for bar in window {
        out.push_str(&format!(
            "{} o={} h={} l={} c={}",
            bar.time.format("%Y-%m-%dT%H:%MZ"),
            bar.open,
            bar.high,
            bar.low,
            bar.close
        ));
        if let Some(volume) = bar.volume {
            out.push_str(&format!(" v={volume}"));
        }
        out.push('\n');
    }
    out.push_str(&format!("close={}", last.close));
    Ok(out)
}
