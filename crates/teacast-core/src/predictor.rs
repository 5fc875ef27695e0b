//! Predictor gateway and the read-only predictor registry.
//!
//! Trained models are produced outside this crate. Anything that can map a
//! [`FeatureVector`] to a scalar implements [`Predictor`]; the engine never
//! looks past that one operation. Predictors are loaded once into a
//! [`PredictorRegistry`] and shared by reference for the life of the process.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::features::FeatureVector;

/// A trained model exposing a single prediction operation.
///
/// Implementations must be safe for concurrent read-only use. Failures are
/// deterministic for a fixed model and vector, so callers never retry.
pub trait Predictor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<f64>;

    /// Expected vector length, when the model knows it.
    fn arity(&self) -> Option<usize> {
        None
    }
}

/// Linear model: `intercept + Σ coefficient_i * x_i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPredictor {
    #[serde(default)]
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearPredictor {
    pub fn new(intercept: f64, coefficients: Vec<f64>) -> Self {
        Self {
            intercept,
            coefficients,
        }
    }
}

impl Predictor for LinearPredictor {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        if features.len() != self.coefficients.len() {
            return Err(ForecastError::PredictionFailure {
                model: "linear".to_string(),
                reason: format!(
                    "expected {} features, got {}",
                    self.coefficients.len(),
                    features.len()
                ),
            });
        }
        let value = self.intercept
            + self
                .coefficients
                .iter()
                .zip(features.as_slice())
                .map(|(c, x)| c * x)
                .sum::<f64>();
        if !value.is_finite() {
            return Err(ForecastError::PredictionFailure {
                model: "linear".to_string(),
                reason: "non-finite output".to_string(),
            });
        }
        Ok(value)
    }

    fn arity(&self) -> Option<usize> {
        Some(self.coefficients.len())
    }
}

/// Wraps a closure as a predictor.
pub struct FnPredictor<F> {
    f: F,
    arity: Option<usize>,
}

impl<F> FnPredictor<F>
where
    F: Fn(&[f64]) -> std::result::Result<f64, String> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f, arity: None }
    }

    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(&[f64]) -> std::result::Result<f64, String> + Send + Sync,
{
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        (self.f)(features.as_slice()).map_err(|reason| ForecastError::PredictionFailure {
            model: "fn".to_string(),
            reason,
        })
    }

    fn arity(&self) -> Option<usize> {
        self.arity
    }
}

/// Immutable name -> predictor map, built once at startup.
#[derive(Clone, Default)]
pub struct PredictorRegistry {
    predictors: BTreeMap<String, Arc<dyn Predictor>>,
}

impl std::fmt::Debug for PredictorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictorRegistry")
            .field("predictors", &self.predictors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PredictorRegistry {
    pub fn builder() -> PredictorRegistryBuilder {
        PredictorRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Predictor>> {
        self.predictors
            .get(name)
            .cloned()
            .ok_or_else(|| ForecastError::UnknownPredictor(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predictors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.predictors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.predictors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictors.is_empty()
    }

    /// Load linear models from a JSON object of `name -> {intercept, coefficients}`.
    pub fn from_linear_json(json: &str) -> Result<Self> {
        let models: BTreeMap<String, LinearPredictor> = serde_json::from_str(json)?;
        let mut builder = Self::builder();
        for (name, model) in models {
            builder = builder.register(name, model);
        }
        Ok(builder.build())
    }
}

/// Collects predictors before freezing them into a [`PredictorRegistry`].
#[derive(Default)]
pub struct PredictorRegistryBuilder {
    predictors: BTreeMap<String, Arc<dyn Predictor>>,
}

impl PredictorRegistryBuilder {
    pub fn register(mut self, name: impl Into<String>, predictor: impl Predictor + 'static) -> Self {
        self.predictors.insert(name.into(), Arc::new(predictor));
        self
    }

    pub fn register_shared(mut self, name: impl Into<String>, predictor: Arc<dyn Predictor>) -> Self {
        self.predictors.insert(name.into(), predictor);
        self
    }

    pub fn build(self) -> PredictorRegistry {
        tracing::info!(predictors = self.predictors.len(), "predictor registry loaded");
        PredictorRegistry {
            predictors: self.predictors,
        }
    }
}
