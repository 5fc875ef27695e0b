//! Teacast Core Library
//!
//! Ensemble forecasting for tea market variables: categorical encoding,
//! feature assembly, predictor invocation, weighted combination and
//! year-based drift correction.

pub mod config;
pub mod drift;
pub mod encoder;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod forecast;
pub mod obs;
pub mod predictor;
pub mod requests;
pub mod telemetry;

pub use config::{
    DriftSettings, EnsembleSelection, ForecastConfig, ForecastTarget, OperationConfig,
};
pub use drift::{adjust, DriftPolicy};
pub use encoder::{
    CaseNormalization, CategoricalCode, CategoricalEncoder, CategoryDomain, UnknownPolicy,
};
pub use ensemble::{combine, BoundEnsemble, EnsembleSpec, Weighting};
pub use error::{ForecastError, ForecastStage, Result};
pub use features::{FeatureField, FeatureInputs, FeatureSchema, FeatureVector};
pub use forecast::{ForecastEngine, ForecastResult};
pub use predictor::{FnPredictor, LinearPredictor, Predictor, PredictorRegistry};
pub use requests::{
    CountryProductionRequest, DemandRequest, ForecastInput, PriceRequest, ProductionRequest,
    RawForecastRequest, SalesRequest,
};
pub use telemetry::init_tracing;

/// Teacast version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
