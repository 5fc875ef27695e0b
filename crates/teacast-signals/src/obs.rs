//! Structured observability hooks for aggregation runs.

use std::time::Duration;

use tracing::{info, warn};

use crate::source::SignalSource;

/// Span covering one aggregation run. Attach with `Instrument` so it follows
/// the run across `.await` points and into spawned term tasks.
pub fn aggregation_span(run_id: &uuid::Uuid, source: SignalSource, terms: usize) -> tracing::Span {
    tracing::info_span!(
        "teacast.aggregation",
        run_id = %run_id,
        source = %source,
        terms = terms,
    )
}

/// Emit event: one term aggregated into buckets.
pub fn emit_term_aggregated(source: SignalSource, term: &str, buckets: usize, attempts: u32) {
    info!(
        event = "term.aggregated",
        source = %source,
        term = %term,
        buckets = buckets,
        attempts = attempts,
    );
}

/// Emit event: one term failed (warning level).
pub fn emit_term_failed(source: SignalSource, term: &str, kind: &str, error: &dyn std::fmt::Display) {
    warn!(event = "term.failed", source = %source, term = %term, kind = %kind, error = %error);
}

/// Emit event: malformed records dropped during normalisation.
pub fn emit_records_skipped(source: SignalSource, term: &str, skipped: usize, kept: usize) {
    warn!(
        event = "normalize.records_skipped",
        source = %source,
        term = %term,
        skipped = skipped,
        kept = kept,
    );
}

/// Emit event: a rate-limited fetch will be retried.
pub fn emit_retry_scheduled(source: SignalSource, attempt: u32, delay: Duration) {
    info!(
        event = "fetch.retry_scheduled",
        source = %source,
        attempt = attempt,
        delay_ms = millis(delay),
    );
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Emit event: aggregation run finished.
pub fn emit_aggregation_finished(
    source: SignalSource,
    succeeded: usize,
    failed: usize,
    cancelled: usize,
    duration_ms: u64,
) {
    info!(
        event = "aggregation.finished",
        source = %source,
        succeeded = succeeded,
        failed = failed,
        cancelled = cancelled,
        duration_ms = duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_span_create() {
        let span = aggregation_span(&uuid::Uuid::new_v4(), SignalSource::Twitter, 3);
        let _entered = span.enter();
        emit_term_aggregated(SignalSource::Twitter, "green_tea", 2, 1);
    }

    #[test]
    fn test_retry_delay_saturates() {
        assert_eq!(millis(Duration::from_secs(2)), 2000);
        assert_eq!(millis(Duration::MAX), u64::MAX);
        emit_retry_scheduled(SignalSource::GoogleTrends, 1, Duration::MAX);
    }
}
