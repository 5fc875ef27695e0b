//! Signal sources and the raw payloads they return.

use serde::{Deserialize, Serialize};

/// External source of search or social signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    GoogleTrends,
    Twitter,
    Facebook,
    Instagram,
}

impl SignalSource {
    pub const ALL: [SignalSource; 4] = [
        SignalSource::GoogleTrends,
        SignalSource::Twitter,
        SignalSource::Facebook,
        SignalSource::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::GoogleTrends => "google_trends",
            SignalSource::Twitter => "twitter",
            SignalSource::Facebook => "facebook",
            SignalSource::Instagram => "instagram",
        }
    }

    /// Environment variable holding this source's API key.
    pub fn api_key_env(&self) -> String {
        format!("TEACAST_{}_API_KEY", self.as_str().to_uppercase())
    }

    /// Query parameter carrying the search term.
    pub fn term_param(&self) -> &'static str {
        match self {
            SignalSource::GoogleTrends => "q",
            SignalSource::Twitter => "query",
            SignalSource::Facebook => "keyword",
            SignalSource::Instagram => "hashtag",
        }
    }

    /// Query parameter carrying the page size, if the source pages at all.
    pub fn count_param(&self) -> Option<&'static str> {
        match self {
            SignalSource::GoogleTrends => None,
            SignalSource::Twitter => Some("max_results"),
            SignalSource::Facebook | SignalSource::Instagram => Some("count"),
        }
    }

    /// Query parameter carrying the continuation cursor.
    pub fn cursor_param(&self) -> Option<&'static str> {
        match self {
            SignalSource::GoogleTrends => None,
            SignalSource::Twitter => Some("next_token"),
            SignalSource::Facebook => Some("cursor"),
            SignalSource::Instagram => Some("pagination_token"),
        }
    }

    /// Extract the continuation cursor from one response page.
    pub fn next_cursor(&self, page: &serde_json::Value) -> Option<String> {
        let cursor = match self {
            SignalSource::GoogleTrends => return None,
            SignalSource::Twitter => page.pointer("/meta/next_token"),
            SignalSource::Facebook => page.get("cursor"),
            SignalSource::Instagram => page.get("pagination_token"),
        };
        cursor
            .and_then(serde_json::Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignalSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        SignalSource::ALL
            .into_iter()
            .find(|src| src.as_str() == normalized)
            .ok_or_else(|| format!("unknown signal source: {s}"))
    }
}

/// Paging parameters for one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingParams {
    /// Items requested per page, when the source supports it.
    #[serde(default)]
    pub count: Option<u32>,
    /// Cursor to resume from.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Upper bound on pages followed in one fetch.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_max_pages() -> u32 {
    5
}

impl Default for PagingParams {
    fn default() -> Self {
        Self {
            count: None,
            cursor: None,
            max_pages: default_max_pages(),
        }
    }
}

impl PagingParams {
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }
}

/// Unprocessed response body for one term, possibly spanning several pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    pub source: SignalSource,
    pub term: String,
    pub pages: Vec<serde_json::Value>,
}

impl RawPayload {
    pub fn single(source: SignalSource, term: &str, body: serde_json::Value) -> Self {
        Self {
            source,
            term: term.to_string(),
            pages: vec![body],
        }
    }
}
