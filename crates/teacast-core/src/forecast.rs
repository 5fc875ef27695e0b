//! Forecast orchestration.
//!
//! [`ForecastEngine`] binds each configured operation to its predictors once,
//! then serves requests through
//! `encode -> build features -> predict (xN) -> combine -> adjust`.
//! A failure at any step ends the request; nothing is substituted.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::{DriftSettings, EnsembleSelection, ForecastConfig, ForecastTarget, OperationConfig};
use crate::encoder::{CategoricalCode, CategoricalEncoder};
use crate::ensemble::BoundEnsemble;
use crate::error::{ForecastError, ForecastStage, Result};
use crate::features::{self, FeatureField, FeatureInputs, FeatureSchema};
use crate::obs::{emit_drift_applied, emit_forecast_completed, emit_forecast_failed, ForecastSpan};
use crate::predictor::PredictorRegistry;
use crate::requests::{
    CountryProductionRequest, DemandRequest, ForecastInput, PriceRequest, ProductionRequest,
    SalesRequest,
};

/// Outcome of a completed forecast request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub request_id: Uuid,
    pub target: ForecastTarget,
    pub label: String,
    /// Final value after drift correction.
    pub value: f64,
    /// Ensemble output before drift correction.
    pub combined: f64,
    pub drift_adjustment: f64,
    /// Individual member outputs, in ensemble order.
    pub member_predictions: Vec<f64>,
    pub ensemble: String,
    /// Encoded categoricals echoed back, keyed by field name.
    pub encoded: BTreeMap<String, CategoricalCode>,
    pub produced_at: DateTime<Utc>,
}

#[derive(Debug)]
enum BoundSelection {
    Fixed(BoundEnsemble),
    Category {
        field: String,
        domain: String,
        variants: BTreeMap<CategoricalCode, BoundEnsemble>,
    },
}

#[derive(Debug)]
struct BoundOperation {
    target: ForecastTarget,
    label: String,
    schema: FeatureSchema,
    selection: BoundSelection,
    drift: Option<DriftSettings>,
}

impl BoundOperation {
    fn bind(
        op: &OperationConfig,
        encoder: &CategoricalEncoder,
        registry: &PredictorRegistry,
    ) -> Result<Self> {
        let schema = FeatureSchema::new(op.target.as_str(), op.fields.clone());
        schema.validate(encoder)?;

        if let Some(drift) = &op.drift {
            let has_year = op.fields.iter().any(|f| {
                matches!(f, FeatureField::Numeric { name, optional: false } if *name == drift.year_field)
            });
            if !has_year {
                return Err(ForecastError::InvalidConfig(format!(
                    "operation '{}' drifts on '{}' which is not a required numeric field",
                    op.target, drift.year_field
                )));
            }
        }

        let selection = match &op.selection {
            EnsembleSelection::Fixed { ensemble } => {
                let bound = ensemble.bind(registry)?;
                bound.check_arity(schema.len())?;
                BoundSelection::Fixed(bound)
            }
            EnsembleSelection::Category { field, variants } => {
                let domain = op
                    .fields
                    .iter()
                    .find_map(|f| match f {
                        FeatureField::Categorical { name, domain } if name == field => {
                            Some(domain.clone())
                        }
                        _ => None,
                    })
                    .ok_or_else(|| {
                        ForecastError::InvalidConfig(format!(
                            "operation '{}' selects by '{}' which is not a categorical field",
                            op.target, field
                        ))
                    })?;
                let mut bound_variants = BTreeMap::new();
                for (value, ensemble) in variants {
                    let code = encoder.encode(&domain, value)?;
                    let bound = ensemble.bind(registry)?;
                    bound.check_arity(schema.len())?;
                    if bound_variants.insert(code, bound).is_some() {
                        return Err(ForecastError::InvalidConfig(format!(
                            "operation '{}' maps code {} to more than one ensemble",
                            op.target, code
                        )));
                    }
                }
                BoundSelection::Category {
                    field: field.clone(),
                    domain,
                    variants: bound_variants,
                }
            }
        };

        Ok(Self {
            target: op.target,
            label: op.label.clone(),
            schema,
            selection,
            drift: op.drift.clone(),
        })
    }

    fn select(
        &self,
        inputs: &FeatureInputs,
        encoded: &BTreeMap<String, CategoricalCode>,
    ) -> Result<&BoundEnsemble> {
        match &self.selection {
            BoundSelection::Fixed(ensemble) => Ok(ensemble),
            BoundSelection::Category {
                field,
                domain,
                variants,
            } => encoded
                .get(field)
                .and_then(|code| variants.get(code))
                .ok_or_else(|| ForecastError::InvalidCategory {
                    domain: domain.clone(),
                    value: inputs.categorical.get(field).cloned().unwrap_or_default(),
                }),
        }
    }

    fn query_year(&self, drift: &DriftSettings, inputs: &FeatureInputs) -> Result<i32> {
        let year = inputs
            .number(&drift.year_field)
            .ok_or_else(|| ForecastError::MissingFeature {
                operation: self.target.to_string(),
                field: drift.year_field.clone(),
            })?;
        let in_range = (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&year);
        if !in_range || year.fract() != 0.0 {
            return Err(ForecastError::InvalidInput {
                operation: self.target.to_string(),
                field: drift.year_field.clone(),
                reason: format!("expected a whole year, got {year}"),
            });
        }
        Ok(year as i32)
    }

    fn run(&self, encoder: &CategoricalEncoder, inputs: &FeatureInputs) -> Result<ForecastResult> {
        let request_id = Uuid::new_v4();
        let _span = ForecastSpan::enter(&request_id, self.target.as_str());
        let mut stage = ForecastStage::Received;
        self.run_stages(request_id, encoder, inputs, &mut stage)
            .inspect_err(|e| emit_forecast_failed(self.target.as_str(), stage, e))
    }

    /// Walk the request through every stage. On failure `stage` holds the
    /// last state reached.
    fn run_stages(
        &self,
        request_id: Uuid,
        encoder: &CategoricalEncoder,
        inputs: &FeatureInputs,
        stage: &mut ForecastStage,
    ) -> Result<ForecastResult> {
        let encoded = features::encode_inputs(&self.schema, inputs, encoder)?;
        advance(stage, ForecastStage::Encoded);

        let vector = features::build(&self.schema, inputs, &encoded)?;
        advance(stage, ForecastStage::FeatureBuilt);

        let ensemble = self.select(inputs, &encoded)?;
        let member_predictions = ensemble.predict_members(&vector)?;
        advance(stage, ForecastStage::Predicted);

        let combined = ensemble.combine(&member_predictions)?;
        advance(stage, ForecastStage::Combined);

        let drift_adjustment = match &self.drift {
            Some(drift) => {
                let year = self.query_year(drift, inputs)?;
                let adjustment = drift.policy.adjustment(combined, year);
                emit_drift_applied(self.target.as_str(), year, adjustment);
                adjustment
            }
            None => 0.0,
        };
        advance(stage, ForecastStage::Adjusted);
        advance(stage, ForecastStage::Completed);

        let value = combined + drift_adjustment;
        emit_forecast_completed(
            self.target.as_str(),
            ensemble.name(),
            value,
            member_predictions.len(),
        );

        Ok(ForecastResult {
            request_id,
            target: self.target,
            label: self.label.clone(),
            value,
            combined,
            drift_adjustment,
            member_predictions,
            ensemble: ensemble.name().to_string(),
            encoded,
            produced_at: Utc::now(),
        })
    }
}

fn advance(stage: &mut ForecastStage, to: ForecastStage) {
    let from = *stage;
    debug!(from = %from, to = %to, "forecast stage");
    *stage = to;
}

/// Serves every configured forecasting operation.
///
/// Holds only read-only state; share it behind an `Arc` across tasks.
#[derive(Debug)]
pub struct ForecastEngine {
    encoder: CategoricalEncoder,
    operations: BTreeMap<ForecastTarget, BoundOperation>,
    registry: Arc<PredictorRegistry>,
}

impl ForecastEngine {
    /// Validate `config` and bind it to `registry`.
    ///
    /// Ensemble arity and weight problems are reported here, never per request.
    pub fn new(config: &ForecastConfig, registry: Arc<PredictorRegistry>) -> Result<Self> {
        let encoder = CategoricalEncoder::new(config.domains.iter().cloned())?;
        let mut operations = BTreeMap::new();
        for op in &config.operations {
            let bound = BoundOperation::bind(op, &encoder, &registry)?;
            if operations.insert(op.target, bound).is_some() {
                return Err(ForecastError::InvalidConfig(format!(
                    "operation '{}' configured twice",
                    op.target
                )));
            }
        }
        tracing::info!(
            operations = operations.len(),
            predictors = registry.len(),
            "forecast engine ready"
        );
        Ok(Self {
            encoder,
            operations,
            registry,
        })
    }

    pub fn encoder(&self) -> &CategoricalEncoder {
        &self.encoder
    }

    pub fn registry(&self) -> &PredictorRegistry {
        &self.registry
    }

    pub fn targets(&self) -> impl Iterator<Item = ForecastTarget> + '_ {
        self.operations.keys().copied()
    }

    /// Run the operation for `request.target()`.
    pub fn forecast<R: ForecastInput + ?Sized>(&self, request: &R) -> Result<ForecastResult> {
        let target = request.target();
        let op = self
            .operations
            .get(&target)
            .ok_or_else(|| ForecastError::UnknownOperation(target.to_string()))
            .inspect_err(|e| emit_forecast_failed(target.as_str(), ForecastStage::Received, e))?;
        op.run(&self.encoder, &request.to_inputs())
    }

    pub fn forecast_sales(&self, request: &SalesRequest) -> Result<ForecastResult> {
        self.forecast(request)
    }

    pub fn forecast_price(&self, request: &PriceRequest) -> Result<ForecastResult> {
        self.forecast(request)
    }

    pub fn forecast_demand(&self, request: &DemandRequest) -> Result<ForecastResult> {
        self.forecast(request)
    }

    pub fn forecast_production(&self, request: &ProductionRequest) -> Result<ForecastResult> {
        self.forecast(request)
    }

    pub fn forecast_country_production(
        &self,
        request: &CountryProductionRequest,
    ) -> Result<ForecastResult> {
        self.forecast(request)
    }
}
