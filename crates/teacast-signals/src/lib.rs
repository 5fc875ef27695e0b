//! Teacast Signals
//!
//! Aggregates search and social signals (Google Trends, Twitter, Facebook,
//! Instagram) into time-bucketed series, one entry per query term, with
//! bounded rate-limit retry and cooperative cancellation.

pub mod aggregator;
pub mod bucket;
pub mod cancel;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod obs;
pub mod retry;
pub mod source;

pub use aggregator::{AggregationRequest, AggregationResult, SignalAggregator, TermOutcome};
pub use bucket::{aggregate, BucketKey, Buckets, Granularity, Reduction};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::{AuthStyle, SignalsConfig, SourceEndpoint};
pub use error::{SignalError, SignalResult};
pub use fetcher::{HttpTransport, SignalTransport};
pub use normalize::{normalize, normalizer_for, NormalizedBatch, Observation, PayloadNormalizer};
pub use retry::{fetch_with_retry, retry_rate_limited, Retried, RetryPolicy};
pub use source::{PagingParams, RawPayload, SignalSource};
