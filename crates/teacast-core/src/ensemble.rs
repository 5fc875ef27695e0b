//! Ensemble combination.
//!
//! An [`EnsembleSpec`] names an ordered list of predictors and a
//! [`Weighting`]. Positional correspondence between members and weights is
//! checked once, when the spec is bound against a registry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};
use crate::features::FeatureVector;
use crate::predictor::{Predictor, PredictorRegistry};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// How member predictions are reduced to one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "weights")]
pub enum Weighting {
    /// Arithmetic mean.
    Average,
    /// `Σ prediction_i * weight_i`, weights in member order.
    Fixed(Vec<f64>),
}

/// Combine predictions under `weighting`.
///
/// Callers are expected to have validated the weighting against the member
/// count; a length mismatch here is reported rather than truncated.
pub fn combine(predictions: &[f64], weighting: &Weighting) -> Result<f64> {
    if predictions.is_empty() {
        return Err(ForecastError::EnsembleConfig {
            ensemble: "<anonymous>".to_string(),
            detail: "no predictions to combine".to_string(),
        });
    }
    match weighting {
        Weighting::Average => Ok(predictions.iter().sum::<f64>() / predictions.len() as f64),
        Weighting::Fixed(weights) => {
            if weights.len() != predictions.len() {
                return Err(ForecastError::EnsembleConfig {
                    ensemble: "<anonymous>".to_string(),
                    detail: format!(
                        "{} weights for {} predictions",
                        weights.len(),
                        predictions.len()
                    ),
                });
            }
            Ok(predictions.iter().zip(weights).map(|(p, w)| p * w).sum())
        }
    }
}

/// Named ensemble configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSpec {
    pub name: String,
    pub members: Vec<String>,
    pub weighting: Weighting,
}

impl EnsembleSpec {
    pub fn average(name: &str, members: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            weighting: Weighting::Average,
        }
    }

    pub fn weighted(name: &str, members: &[(&str, f64)]) -> Self {
        Self {
            name: name.to_string(),
            members: members.iter().map(|(m, _)| m.to_string()).collect(),
            weighting: Weighting::Fixed(members.iter().map(|(_, w)| *w).collect()),
        }
    }

    fn config_error(&self, detail: impl Into<String>) -> ForecastError {
        ForecastError::EnsembleConfig {
            ensemble: self.name.clone(),
            detail: detail.into(),
        }
    }

    /// Check member/weight arity, weight sign and weight sum.
    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(self.config_error("ensemble has no members"));
        }
        if let Weighting::Fixed(weights) = &self.weighting {
            if weights.len() != self.members.len() {
                return Err(self.config_error(format!(
                    "{} weights for {} members",
                    weights.len(),
                    self.members.len()
                )));
            }
            if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
                return Err(self.config_error(format!("weight {w} is not a non-negative number")));
            }
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(self.config_error(format!("weights sum to {sum}, expected 1.0")));
            }
        }
        Ok(())
    }

    /// Resolve member names against `registry`.
    pub fn bind(&self, registry: &PredictorRegistry) -> Result<BoundEnsemble> {
        self.validate()?;
        let members = self
            .members
            .iter()
            .map(|name| Ok((name.clone(), registry.get(name)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundEnsemble {
            name: self.name.clone(),
            members,
            weighting: self.weighting.clone(),
        })
    }
}

/// Ensemble with its predictors resolved.
#[derive(Clone)]
pub struct BoundEnsemble {
    name: String,
    members: Vec<(String, Arc<dyn Predictor>)>,
    weighting: Weighting,
}

impl std::fmt::Debug for BoundEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundEnsemble")
            .field("name", &self.name)
            .field(
                "members",
                &self.members.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("weighting", &self.weighting)
            .finish()
    }
}

impl BoundEnsemble {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(n, _)| n.as_str())
    }

    /// Check each member that declares an arity agrees with `expected`.
    pub fn check_arity(&self, expected: usize) -> Result<()> {
        for (name, predictor) in &self.members {
            if let Some(arity) = predictor.arity() {
                if arity != expected {
                    return Err(ForecastError::EnsembleConfig {
                        ensemble: self.name.clone(),
                        detail: format!(
                            "member '{name}' expects {arity} features, schema provides {expected}"
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run every member. Any single failure fails the whole ensemble.
    pub fn predict_members(&self, features: &FeatureVector) -> Result<Vec<f64>> {
        self.members
            .iter()
            .map(|(name, predictor)| {
                predictor.predict(features).map_err(|e| match e {
                    ForecastError::PredictionFailure { reason, .. } => {
                        ForecastError::PredictionFailure {
                            model: name.clone(),
                            reason,
                        }
                    }
                    other => other,
                })
            })
            .collect()
    }

    pub fn combine(&self, predictions: &[f64]) -> Result<f64> {
        combine(predictions, &self.weighting).map_err(|e| match e {
            ForecastError::EnsembleConfig { detail, .. } => ForecastError::EnsembleConfig {
                ensemble: self.name.clone(),
                detail,
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{FnPredictor, LinearPredictor};

    #[test]
    fn test_weighted_combination() {
        let combined = combine(&[10.0, 20.0, 30.0], &Weighting::Fixed(vec![0.4, 0.3, 0.3])).unwrap();
        assert!((combined - 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_combination() {
        let combined = combine(&[10.0, 20.0, 30.0], &Weighting::Average).unwrap();
        assert!((combined - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_member_is_identity_under_both_modes() {
        let avg = combine(&[42.5], &Weighting::Average).unwrap();
        let fixed = combine(&[42.5], &Weighting::Fixed(vec![1.0])).unwrap();
        assert_eq!(avg, 42.5);
        assert_eq!(fixed, 42.5);
    }

    #[test]
    fn test_weight_arity_mismatch_is_config_error() {
        let spec = EnsembleSpec {
            name: "sales".to_string(),
            members: vec!["a".to_string(), "b".to_string()],
            weighting: Weighting::Fixed(vec![1.0]),
        };
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, ForecastError::EnsembleConfig { ref ensemble, .. } if ensemble == "sales"));
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let spec = EnsembleSpec::weighted("s", &[("a", 0.5), ("b", 0.6)]);
        assert!(spec.validate().is_err());
        let spec = EnsembleSpec::weighted("s", &[("a", 1.2), ("b", -0.2)]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_bind_resolves_members_in_order() {
        let registry = PredictorRegistry::builder()
            .register("a", LinearPredictor::new(10.0, vec![0.0]))
            .register("b", LinearPredictor::new(20.0, vec![0.0]))
            .register("c", LinearPredictor::new(30.0, vec![0.0]))
            .build();
        let spec = EnsembleSpec::weighted("s", &[("c", 0.4), ("b", 0.3), ("a", 0.3)]);
        let bound = spec.bind(&registry).unwrap();
        let preds = bound.predict_members(&FeatureVector::from(vec![1.0])).unwrap();
        assert_eq!(preds, vec![30.0, 20.0, 10.0]);
        assert!((bound.combine(&preds).unwrap() - 21.0).abs() < 1e-9);
    }

    #[test]
    fn test_bind_unknown_member_fails() {
        let registry = PredictorRegistry::builder().build();
        let spec = EnsembleSpec::average("s", &["ghost"]);
        assert!(matches!(spec.bind(&registry), Err(ForecastError::UnknownPredictor(_))));
    }

    #[test]
    fn test_member_failure_names_member() {
        let registry = PredictorRegistry::builder()
            .register("ok", LinearPredictor::new(1.0, vec![0.0]))
            .register("bad", FnPredictor::new(|_: &[f64]| Err("boom".to_string())))
            .build();
        let bound = EnsembleSpec::average("s", &["ok", "bad"]).bind(&registry).unwrap();
        let err = bound.predict_members(&FeatureVector::from(vec![0.0])).unwrap_err();
        assert!(matches!(err, ForecastError::PredictionFailure { ref model, .. } if model == "bad"));
    }

    #[test]
    fn test_arity_check_against_schema() {
        let registry = PredictorRegistry::builder()
            .register("a", LinearPredictor::new(0.0, vec![1.0, 1.0]))
            .build();
        let bound = EnsembleSpec::average("s", &["a"]).bind(&registry).unwrap();
        assert!(bound.check_arity(2).is_ok());
        assert!(bound.check_arity(3).is_err());
    }
}
