//! Signal source configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{SignalError, SignalResult};
use crate::retry::RetryPolicy;
use crate::source::{PagingParams, SignalSource};

/// How the API key is presented to a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "style", content = "name")]
pub enum AuthStyle {
    /// `?<name>=<key>`
    QueryParam(String),
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `<name>: <key>`
    Header(String),
}

/// HTTP endpoint for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEndpoint {
    pub url: String,
    pub auth: AuthStyle,
    /// Never serialised; supplied from the environment or by the caller.
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Fixed query parameters sent with every request.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

impl SourceEndpoint {
    pub fn new(url: &str, auth: AuthStyle) -> Self {
        Self {
            url: url.to_string(),
            auth,
            api_key: None,
            query: BTreeMap::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }
}

/// Configuration for the signal layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default = "default_endpoints")]
    pub endpoints: BTreeMap<SignalSource, SourceEndpoint>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub paging: PagingParams,
    /// Upper bound on terms fetched concurrently.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Per-request HTTP timeout (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("teacast-signals/{}", env!("CARGO_PKG_VERSION"))
}

fn default_endpoints() -> BTreeMap<SignalSource, SourceEndpoint> {
    BTreeMap::from([
        (
            SignalSource::GoogleTrends,
            SourceEndpoint::new(
                "https://serpapi.com/search.json",
                AuthStyle::QueryParam("api_key".to_string()),
            )
            .with_query("engine", "google_trends")
            .with_query("data_type", "TIMESERIES")
            .with_query("date", "all"),
        ),
        (
            SignalSource::Twitter,
            SourceEndpoint::new(
                "https://api.twitter.com/2/tweets/search/recent",
                AuthStyle::Bearer,
            )
            .with_query("tweet.fields", "created_at,public_metrics"),
        ),
        (
            SignalSource::Facebook,
            SourceEndpoint::new(
                "https://facebook-scraper3.p.rapidapi.com/search/posts",
                AuthStyle::Header("x-rapidapi-key".to_string()),
            ),
        ),
        (
            SignalSource::Instagram,
            SourceEndpoint::new(
                "https://instagram-scraper-api2.p.rapidapi.com/v1/hashtag",
                AuthStyle::Header("x-rapidapi-key".to_string()),
            ),
        ),
    ])
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            retry: RetryPolicy::default(),
            paging: PagingParams::default(),
            max_concurrent: default_max_concurrent(),
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl SignalsConfig {
    /// Default endpoints with API keys read from `TEACAST_<SOURCE>_API_KEY`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.load_api_keys_from_env();
        config
    }

    pub fn load_api_keys_from_env(&mut self) {
        for (source, endpoint) in self.endpoints.iter_mut() {
            if let Ok(key) = std::env::var(source.api_key_env()) {
                endpoint.api_key = Some(key);
            }
        }
    }

    pub fn endpoint(&self, source: SignalSource) -> SignalResult<&SourceEndpoint> {
        self.endpoints.get(&source).ok_or_else(|| {
            SignalError::InvalidConfig(format!("no endpoint configured for {source}"))
        })
    }

    pub fn validate(&self) -> SignalResult<()> {
        self.retry.validate()?;
        if self.max_concurrent == 0 {
            return Err(SignalError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(SignalError::InvalidConfig(format!(
                "max_concurrent must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.paging.max_pages == 0 {
            return Err(SignalError::InvalidConfig(
                "paging.max_pages must be at least 1".to_string(),
            ));
        }
        for (source, endpoint) in &self.endpoints {
            if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
                return Err(SignalError::InvalidConfig(format!(
                    "{source} endpoint is not an http(s) URL: {}",
                    endpoint.url
                )));
            }
        }
        Ok(())
    }
}
