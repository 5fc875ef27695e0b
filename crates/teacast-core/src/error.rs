//! Error taxonomy for the forecasting engine.

use serde::{Deserialize, Serialize};

/// Orchestrator state in which a forecast request failed.
///
/// A request moves `Received -> Encoded -> FeatureBuilt -> Predicted ->
/// Combined -> Adjusted -> Completed`; any error is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastStage {
    Received,
    Encoded,
    FeatureBuilt,
    Predicted,
    Combined,
    Adjusted,
    Completed,
}

impl std::fmt::Display for ForecastStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ForecastStage::Received => "received",
            ForecastStage::Encoded => "encoded",
            ForecastStage::FeatureBuilt => "feature_built",
            ForecastStage::Predicted => "predicted",
            ForecastStage::Combined => "combined",
            ForecastStage::Adjusted => "adjusted",
            ForecastStage::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Errors produced by the forecasting engine.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    /// A categorical value has no mapping and its domain has no unknown slot.
    #[error("invalid category for domain '{domain}': {value:?}")]
    InvalidCategory { domain: String, value: String },

    /// A required numeric field was absent from the request.
    #[error("missing required feature '{field}' for operation '{operation}'")]
    MissingFeature { operation: String, field: String },

    /// A request field is present but its value cannot be used.
    #[error("invalid value for '{field}' in operation '{operation}': {reason}")]
    InvalidInput {
        operation: String,
        field: String,
        reason: String,
    },

    /// The underlying model rejected the vector or failed internally.
    #[error("prediction failed in model '{model}': {reason}")]
    PredictionFailure { model: String, reason: String },

    /// Ensemble weights and members disagree, or weights are malformed.
    #[error("ensemble '{ensemble}' misconfigured: {detail}")]
    EnsembleConfig { ensemble: String, detail: String },

    #[error("unknown forecasting operation: {0}")]
    UnknownOperation(String),

    #[error("predictor not registered: {0}")]
    UnknownPredictor(String),

    #[error("invalid forecast configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ForecastError {
    /// Earliest orchestrator state this kind of error is entered from.
    ///
    /// The `forecast.failed` event reports the state a particular request
    /// actually reached.
    pub fn stage(&self) -> ForecastStage {
        match self {
            ForecastError::UnknownOperation(_) | ForecastError::Serialization(_) => {
                ForecastStage::Received
            }
            ForecastError::InvalidCategory { .. } => ForecastStage::Received,
            ForecastError::MissingFeature { .. } => ForecastStage::Encoded,
            ForecastError::PredictionFailure { .. } => ForecastStage::FeatureBuilt,
            ForecastError::InvalidInput { .. } => ForecastStage::Combined,
            ForecastError::EnsembleConfig { .. }
            | ForecastError::UnknownPredictor(_)
            | ForecastError::InvalidConfig(_) => ForecastStage::Received,
        }
    }

    /// Short machine-readable kind, used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::InvalidCategory { .. } => "invalid_category",
            ForecastError::MissingFeature { .. } => "missing_feature",
            ForecastError::InvalidInput { .. } => "invalid_input",
            ForecastError::PredictionFailure { .. } => "prediction_failure",
            ForecastError::EnsembleConfig { .. } => "ensemble_config",
            ForecastError::UnknownOperation(_) => "unknown_operation",
            ForecastError::UnknownPredictor(_) => "unknown_predictor",
            ForecastError::InvalidConfig(_) => "invalid_config",
            ForecastError::Serialization(_) => "serialization",
        }
    }
}

/// Result type for forecasting operations.
pub type Result<T> = std::result::Result<T, ForecastError>;
