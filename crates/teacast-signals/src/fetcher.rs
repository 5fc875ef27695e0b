//! Signal fetching.
//!
//! [`SignalTransport`] is the seam between the aggregation engine and the
//! outside world. [`HttpTransport`] is the reqwest-backed implementation;
//! tests plug in fakes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use tracing::debug;

use crate::config::{AuthStyle, SignalsConfig, SourceEndpoint};
use crate::error::{SignalError, SignalResult};
use crate::source::{PagingParams, RawPayload, SignalSource};

/// Fetches raw payloads for a search term from an external source.
///
/// Implementations must report throttling as [`SignalError::RateLimited`]
/// and everything else as a non-retryable error.
#[async_trait]
pub trait SignalTransport: Send + Sync {
    async fn fetch(
        &self,
        source: SignalSource,
        term: &str,
        params: &PagingParams,
    ) -> SignalResult<RawPayload>;
}

/// HTTP transport for every configured source.
pub struct HttpTransport {
    config: SignalsConfig,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: SignalsConfig) -> SignalResult<Self> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SignalError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &SignalsConfig {
        &self.config
    }

    fn request(
        &self,
        source: SignalSource,
        endpoint: &SourceEndpoint,
        term: &str,
        params: &PagingParams,
        cursor: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut query: Vec<(String, String)> = endpoint
            .query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        query.push((source.term_param().to_string(), term.to_string()));
        if let (Some(name), Some(count)) = (source.count_param(), params.count) {
            query.push((name.to_string(), count.to_string()));
        }
        if let (Some(name), Some(cursor)) = (source.cursor_param(), cursor) {
            query.push((name.to_string(), cursor.to_string()));
        }

        let mut request = self.http_client.get(&endpoint.url);
        if let Some(key) = &endpoint.api_key {
            match &endpoint.auth {
                AuthStyle::QueryParam(name) => query.push((name.clone(), key.clone())),
                AuthStyle::Bearer => request = request.bearer_auth(key),
                AuthStyle::Header(name) => request = request.header(name.as_str(), key.as_str()),
            }
        }
        request.query(&query)
    }

    async fn fetch_page(
        &self,
        source: SignalSource,
        endpoint: &SourceEndpoint,
        term: &str,
        params: &PagingParams,
        cursor: Option<&str>,
    ) -> SignalResult<serde_json::Value> {
        let response = self
            .request(source, endpoint, term, params, cursor)
            .send()
            .await
            .map_err(|e| transport_error(source, &e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SignalError::RateLimited {
                origin: source,
                retry_after: retry_after(response.headers()),
            });
        }
        if !status.is_success() {
            return Err(SignalError::Transport {
                origin: source,
                reason: format!("unexpected status {status}"),
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| SignalError::Decode {
                origin: source,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl SignalTransport for HttpTransport {
    async fn fetch(
        &self,
        source: SignalSource,
        term: &str,
        params: &PagingParams,
    ) -> SignalResult<RawPayload> {
        let endpoint = self.config.endpoint(source)?;
        let mut pages = Vec::new();
        let mut cursor = params.cursor.clone();

        for page_index in 0..params.max_pages.max(1) {
            let page = self
                .fetch_page(source, endpoint, term, params, cursor.as_deref())
                .await?;
            cursor = source.next_cursor(&page);
            pages.push(page);
            debug!(source = %source, term = %term, page = page_index, "fetched page");
            if cursor.is_none() {
                break;
            }
        }

        Ok(RawPayload {
            source,
            term: term.to_string(),
            pages,
        })
    }
}

fn transport_error(source: SignalSource, err: &reqwest::Error) -> SignalError {
    if err.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        return SignalError::RateLimited {
            origin: source,
            retry_after: None,
        };
    }
    SignalError::Transport {
        origin: source,
        reason: err.to_string(),
    }
}

/// Parse a `Retry-After` header given in seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
