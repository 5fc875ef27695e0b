//! Aggregation orchestration across query terms.
//!
//! [`SignalAggregator`] runs fetch → retry → normalise → bucket for every
//! term concurrently. A term's failure is recorded against that term only;
//! the result always carries exactly one entry per distinct requested term.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

use crate::bucket::{aggregate, Buckets, Granularity, Reduction};
use crate::cancel::CancelSignal;
use crate::config::SignalsConfig;
use crate::error::{SignalError, SignalResult};
use crate::fetcher::SignalTransport;
use crate::normalize::normalize;
use crate::obs::{
    aggregation_span, emit_aggregation_finished, emit_records_skipped, emit_term_aggregated,
    emit_term_failed,
};
use crate::retry::{fetch_with_retry, RetryPolicy};
use crate::source::{PagingParams, SignalSource};

/// What the caller wants out of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub source: SignalSource,
    pub terms: Vec<String>,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default)]
    pub reduction: Reduction,
    /// Overrides the configured paging for this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<PagingParams>,
}

impl AggregationRequest {
    pub fn new(source: SignalSource, terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            source,
            terms: terms.into_iter().map(Into::into).collect(),
            granularity: Granularity::default(),
            reduction: Reduction::default(),
            paging: None,
        }
    }

    pub fn by(mut self, granularity: Granularity, reduction: Reduction) -> Self {
        self.granularity = granularity;
        self.reduction = reduction;
        self
    }

    pub fn with_paging(mut self, paging: PagingParams) -> Self {
        self.paging = Some(paging);
        self
    }
}

/// Outcome for one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TermOutcome {
    Succeeded {
        buckets: Buckets,
        /// Malformed records dropped during normalisation.
        skipped_records: usize,
        attempts: u32,
    },
    Failed {
        kind: String,
        message: String,
    },
    /// Cancelled before the term finished.
    Cancelled,
}

impl TermOutcome {
    fn from_error(err: &SignalError) -> Self {
        match err {
            SignalError::Cancelled => TermOutcome::Cancelled,
            other => TermOutcome::Failed {
                kind: other.kind().to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn buckets(&self) -> Option<&Buckets> {
        match self {
            TermOutcome::Succeeded { buckets, .. } => Some(buckets),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TermOutcome::Succeeded { .. })
    }
}

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub run_id: Uuid,
    pub source: SignalSource,
    pub granularity: Granularity,
    pub reduction: Reduction,
    /// One entry per distinct requested term.
    pub terms: BTreeMap<String, TermOutcome>,
    pub finished_at: DateTime<Utc>,
}

impl AggregationResult {
    fn terms_where(&self, pred: impl Fn(&TermOutcome) -> bool) -> Vec<&str> {
        self.terms
            .iter()
            .filter(|(_, outcome)| pred(outcome))
            .map(|(term, _)| term.as_str())
            .collect()
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.terms_where(TermOutcome::is_success)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.terms_where(|o| matches!(o, TermOutcome::Failed { .. }))
    }

    pub fn cancelled(&self) -> Vec<&str> {
        self.terms_where(|o| matches!(o, TermOutcome::Cancelled))
    }

    pub fn outcome(&self, term: &str) -> Option<&TermOutcome> {
        self.terms.get(term)
    }

    /// Err with [`SignalError::PartialAggregationFailure`] unless every term
    /// succeeded.
    pub fn ensure_complete(&self) -> SignalResult<()> {
        let failed = self.terms.len() - self.succeeded().len();
        if failed > 0 {
            return Err(SignalError::PartialAggregationFailure {
                failed,
                total: self.terms.len(),
            });
        }
        Ok(())
    }
}

/// Fans aggregation out across terms with bounded concurrency.
pub struct SignalAggregator {
    transport: Arc<dyn SignalTransport>,
    retry: RetryPolicy,
    paging: PagingParams,
    max_concurrent: usize,
}

impl SignalAggregator {
    pub fn new(transport: Arc<dyn SignalTransport>, config: &SignalsConfig) -> SignalResult<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            retry: config.retry.clone(),
            paging: config.paging.clone(),
            max_concurrent: config.max_concurrent,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Aggregate every term in `request`.
    ///
    /// Never fails as a whole: per-term errors and cancellation are recorded
    /// in the returned map. Duplicate terms share one entry.
    pub async fn aggregate(
        &self,
        request: &AggregationRequest,
        cancel: &CancelSignal,
    ) -> AggregationResult {
        let run_id = Uuid::new_v4();
        let terms: Vec<String> = request
            .terms
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let span = aggregation_span(&run_id, request.source, terms.len());
        let started = tokio::time::Instant::now();

        let outcomes = self
            .run_terms(request, &terms, cancel)
            .instrument(span.clone())
            .await;

        let result = AggregationResult {
            run_id,
            source: request.source,
            granularity: request.granularity,
            reduction: request.reduction,
            terms: terms.into_iter().zip(outcomes).collect(),
            finished_at: Utc::now(),
        };
        span.in_scope(|| {
            emit_aggregation_finished(
                result.source,
                result.succeeded().len(),
                result.failed().len(),
                result.cancelled().len(),
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            )
        });
        result
    }

    async fn run_terms(
        &self,
        request: &AggregationRequest,
        terms: &[String],
        cancel: &CancelSignal,
    ) -> Vec<TermOutcome> {
        let sem = Arc::new(Semaphore::new(self.max_concurrent));
        let paging = request.paging.as_ref().unwrap_or(&self.paging);
        let mut join_set = JoinSet::new();

        for (idx, term) in terms.iter().cloned().enumerate() {
            let job = TermJob {
                transport: Arc::clone(&self.transport),
                source: request.source,
                granularity: request.granularity,
                reduction: request.reduction,
                retry: self.retry.clone(),
                paging: paging.clone(),
                term,
            };
            let sem = Arc::clone(&sem);
            let mut cancel = cancel.clone();
            join_set.spawn(
                async move {
                    let _permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return (idx, TermOutcome::Cancelled),
                        permit = sem.acquire_owned() => permit.ok(),
                    };
                    (idx, job.run(&cancel).await)
                }
                .in_current_span(),
            );
        }

        let mut ordered: Vec<Option<TermOutcome>> = vec![None; terms.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, outcome)) => ordered[idx] = Some(outcome),
                Err(e) => tracing::warn!(event = "term.task_failed", error = %e),
            }
        }

        ordered
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| TermOutcome::Failed {
                    kind: "task_failed".to_string(),
                    message: "term task ended without a result".to_string(),
                })
            })
            .collect()
    }
}

/// Everything one spawned term task owns.
struct TermJob {
    transport: Arc<dyn SignalTransport>,
    source: SignalSource,
    granularity: Granularity,
    reduction: Reduction,
    retry: RetryPolicy,
    paging: PagingParams,
    term: String,
}

impl TermJob {
    async fn run(self, cancel: &CancelSignal) -> TermOutcome {
        let fetched = fetch_with_retry(
            self.transport.as_ref(),
            self.source,
            &self.term,
            &self.paging,
            &self.retry,
            cancel,
        )
        .await;

        let retried = match fetched {
            Ok(retried) => retried,
            Err(err) => {
                emit_term_failed(self.source, &self.term, err.kind(), &err);
                return TermOutcome::from_error(&err);
            }
        };

        let batch = normalize(&retried.value);
        if batch.skipped > 0 {
            emit_records_skipped(
                self.source,
                &self.term,
                batch.skipped,
                batch.observations.len(),
            );
        }
        let buckets = aggregate(&batch.observations, self.granularity, self.reduction);
        emit_term_aggregated(self.source, &self.term, buckets.len(), retried.attempts);
        TermOutcome::Succeeded {
            buckets,
            skipped_records: batch.skipped,
            attempts: retried.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketKey;
    use crate::source::RawPayload;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticTransport;

    #[async_trait]
    impl SignalTransport for StaticTransport {
        async fn fetch(
            &self,
            source: SignalSource,
            term: &str,
            _params: &PagingParams,
        ) -> SignalResult<RawPayload> {
            if term == "broken" {
                return Err(SignalError::Transport {
                    origin: source,
                    reason: "connection refused".to_string(),
                });
            }
            Ok(RawPayload::single(
                source,
                term,
                json!({ "results": [
                    { "timestamp": 1_614_556_800_000_000i64, "reactions_count": 4 },
                    { "timestamp": 1_635_724_800_000_000i64, "reactions_count": 6 }
                ]}),
            ))
        }
    }

    fn aggregator() -> SignalAggregator {
        SignalAggregator::new(Arc::new(StaticTransport), &SignalsConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_terms_share_one_entry() {
        let request = AggregationRequest::new(
            SignalSource::Facebook,
            ["green_tea", "green_tea", "black_tea"],
        );
        let result = aggregator().aggregate(&request, &CancelSignal::never()).await;
        assert_eq!(result.terms.len(), 2);
        assert!(result.ensure_complete().is_ok());
        let buckets = result.outcome("green_tea").unwrap().buckets().unwrap();
        assert_eq!(buckets[&BucketKey::year(2021)], 2.0);
    }

    #[tokio::test]
    async fn test_failed_term_is_reported_not_raised() {
        let request = AggregationRequest::new(SignalSource::Facebook, ["broken", "green_tea"])
            .by(Granularity::Year, Reduction::Sum);
        let result = aggregator().aggregate(&request, &CancelSignal::never()).await;
        assert_eq!(result.succeeded(), vec!["green_tea"]);
        assert_eq!(result.failed(), vec!["broken"]);
        assert!(matches!(
            result.outcome("broken"),
            Some(TermOutcome::Failed { kind, .. }) if kind == "transport"
        ));
        assert_eq!(
            result.outcome("green_tea").unwrap().buckets().unwrap()[&BucketKey::year(2021)],
            10.0
        );
        assert!(matches!(
            result.ensure_complete(),
            Err(SignalError::PartialAggregationFailure { failed: 1, total: 2 })
        ));
    }

    #[tokio::test]
    async fn test_empty_request() {
        let request = AggregationRequest::new(SignalSource::Twitter, Vec::<String>::new());
        let result = aggregator().aggregate(&request, &CancelSignal::never()).await;
        assert!(result.terms.is_empty());
        assert!(result.ensure_complete().is_ok());
    }

    #[test]
    fn test_outcome_json_is_tagged() {
        let outcome = TermOutcome::Succeeded {
            buckets: Buckets::from([(BucketKey::year_month(2021, 3), 2.0)]),
            skipped_records: 1,
            attempts: 1,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["buckets"]["2021-03"], 2.0);
        assert_eq!(
            serde_json::to_value(TermOutcome::Cancelled).unwrap(),
            json!({ "status": "cancelled" })
        );
    }

    #[test]
    fn test_request_paging_is_optional() {
        let request: AggregationRequest =
            serde_json::from_value(json!({ "source": "twitter", "terms": ["matcha"] })).unwrap();
        assert_eq!(request.paging, None);

        let request: AggregationRequest = serde_json::from_value(json!({
            "source": "twitter",
            "terms": ["matcha"],
            "paging": { "count": 50 }
        }))
        .unwrap();
        let paging = request.paging.unwrap();
        assert_eq!(paging.count, Some(50));
        assert_eq!(paging.max_pages, 5);
    }
}
