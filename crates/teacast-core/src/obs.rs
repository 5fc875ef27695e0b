//! Structured observability hooks for forecast requests.
//!
//! Events are emitted at `info!` level with an `event` key so they can be
//! filtered downstream (`RUST_LOG=teacast_core=info`).

use tracing::info;

use crate::error::{ForecastError, ForecastStage};

/// RAII guard that enters a request-scoped span for one forecast.
///
/// ```ignore
/// let _span = ForecastSpan::enter(request_id, "sales_quantity");
/// ```
pub struct ForecastSpan {
    _span: tracing::span::EnteredSpan,
}

impl ForecastSpan {
    pub fn enter(request_id: &uuid::Uuid, operation: &str) -> Self {
        let span = tracing::info_span!("teacast.forecast", request_id = %request_id, operation = %operation);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: forecast completed.
pub fn emit_forecast_completed(operation: &str, ensemble: &str, value: f64, members: usize) {
    info!(
        event = "forecast.completed",
        operation = %operation,
        ensemble = %ensemble,
        value = value,
        members = members,
    );
}

/// Emit event: forecast failed (warning level). `stage` is the last state
/// the request reached.
pub fn emit_forecast_failed(operation: &str, stage: ForecastStage, error: &ForecastError) {
    tracing::warn!(
        event = "forecast.failed",
        operation = %operation,
        kind = error.kind(),
        stage = %stage,
        error = %error,
    );
}

/// Emit event: drift correction applied.
pub fn emit_drift_applied(operation: &str, year: i32, adjustment: f64) {
    tracing::debug!(event = "forecast.drift_applied", operation = %operation, year = year, adjustment = adjustment);
}
