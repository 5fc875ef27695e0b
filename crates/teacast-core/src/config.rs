//! Forecasting configuration.
//!
//! Every tunable that affects a forecast (categorical domains, feature
//! order, ensemble members and weights, drift policy) is plain data here and
//! is handed to [`crate::forecast::ForecastEngine::new`] at construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::drift::DriftPolicy;
use crate::encoder::{
    standard_domains, CategoryDomain, COMMODITY_TYPE, COUNTRY, ELEVATION, PROCESSING_METHOD,
    PRODUCTION_ELEVATION, QUANTITY_TIER, TEA_TYPE,
};
use crate::ensemble::EnsembleSpec;
use crate::features::FeatureField;

/// Target variable of a forecasting operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastTarget {
    SalesQuantity,
    UnitPrice,
    Demand,
    Production,
    CountryProduction,
}

impl ForecastTarget {
    pub const ALL: [ForecastTarget; 5] = [
        ForecastTarget::SalesQuantity,
        ForecastTarget::UnitPrice,
        ForecastTarget::Demand,
        ForecastTarget::Production,
        ForecastTarget::CountryProduction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastTarget::SalesQuantity => "sales_quantity",
            ForecastTarget::UnitPrice => "unit_price",
            ForecastTarget::Demand => "demand",
            ForecastTarget::Production => "production",
            ForecastTarget::CountryProduction => "country_production",
        }
    }
}

impl std::fmt::Display for ForecastTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ForecastTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ForecastTarget::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown forecast target: {s}"))
    }
}

/// Drift settings for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSettings {
    #[serde(flatten)]
    pub policy: DriftPolicy,
    /// Numeric input holding the query year.
    #[serde(default = "default_year_field")]
    pub year_field: String,
}

fn default_year_field() -> String {
    "year".to_string()
}

impl DriftSettings {
    pub fn new(reference_year: i32, rate_percent: f64) -> Self {
        Self {
            policy: DriftPolicy::new(reference_year, rate_percent),
            year_field: default_year_field(),
        }
    }
}

/// How an operation picks its ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum EnsembleSelection {
    /// One ensemble for every request.
    Fixed { ensemble: EnsembleSpec },
    /// The value of a categorical field picks the ensemble, e.g. one model
    /// per country. Keys are raw domain values.
    Category {
        field: String,
        variants: BTreeMap<String, EnsembleSpec>,
    },
}

/// Configuration of a single forecasting operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationConfig {
    pub target: ForecastTarget,
    /// Human-readable label attached to results.
    pub label: String,
    pub fields: Vec<FeatureField>,
    pub selection: EnsembleSelection,
    #[serde(default)]
    pub drift: Option<DriftSettings>,
}

/// Complete forecasting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub domains: Vec<CategoryDomain>,
    pub operations: Vec<OperationConfig>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl ForecastConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn operation(&self, target: ForecastTarget) -> Option<&OperationConfig> {
        self.operations.iter().find(|o| o.target == target)
    }

    /// The built-in tea market configuration.
    ///
    /// Sales and country production drift at 0.1% per year, price and
    /// production at 1% per year.
    pub fn standard() -> Self {
        let country_variants = [
            ("China", "country_production_china"),
            ("India", "country_production_india"),
            ("Kenya", "country_production_kenya"),
            ("Sri Lanka", "country_production_sri_lanka"),
        ]
        .into_iter()
        .map(|(country, model)| {
            (
                country.to_string(),
                EnsembleSpec::average(model, &[model]),
            )
        })
        .collect();

        Self {
            domains: standard_domains(),
            operations: vec![
                OperationConfig {
                    target: ForecastTarget::SalesQuantity,
                    label: "Sales quantity (kg)".to_string(),
                    fields: vec![
                        FeatureField::numeric("sales_code"),
                        FeatureField::numeric("dollar_rate"),
                        FeatureField::numeric("avg_price"),
                        FeatureField::categorical("elevation", ELEVATION),
                        FeatureField::numeric("year"),
                    ],
                    selection: EnsembleSelection::Fixed {
                        ensemble: EnsembleSpec::weighted(
                            "sales_quantity",
                            &[("sales_rf", 0.4), ("sales_xgb", 0.3), ("sales_lgbm", 0.3)],
                        ),
                    },
                    drift: Some(DriftSettings::new(2023, 0.1)),
                },
                OperationConfig {
                    target: ForecastTarget::UnitPrice,
                    label: "Average price (LKR/kg)".to_string(),
                    fields: vec![
                        FeatureField::categorical("commodity_type", COMMODITY_TYPE),
                        FeatureField::categorical("elevation", ELEVATION),
                        FeatureField::numeric("year"),
                        FeatureField::numeric("month"),
                    ],
                    selection: EnsembleSelection::Fixed {
                        ensemble: EnsembleSpec::average("unit_price", &["price_rf", "price_gbr"]),
                    },
                    drift: Some(DriftSettings::new(2023, 1.0)),
                },
                OperationConfig {
                    target: ForecastTarget::Demand,
                    label: "Demand (kg)".to_string(),
                    fields: vec![
                        FeatureField::categorical("tea_type", TEA_TYPE),
                        FeatureField::categorical("quantity_tier", QUANTITY_TIER),
                        FeatureField::numeric("year"),
                        FeatureField::numeric("month"),
                    ],
                    selection: EnsembleSelection::Fixed {
                        ensemble: EnsembleSpec::average("demand", &["demand_rf", "demand_xgb"]),
                    },
                    drift: None,
                },
                OperationConfig {
                    target: ForecastTarget::Production,
                    label: "Production (kg)".to_string(),
                    fields: vec![
                        FeatureField::categorical("processing_method", PROCESSING_METHOD),
                        FeatureField::categorical("elevation", PRODUCTION_ELEVATION),
                        FeatureField::numeric("year"),
                        FeatureField::numeric("month"),
                        FeatureField::optional("temperature"),
                        FeatureField::optional("rainfall"),
                    ],
                    selection: EnsembleSelection::Fixed {
                        ensemble: EnsembleSpec::weighted(
                            "production",
                            &[("production_rf", 0.5), ("production_xgb", 0.5)],
                        ),
                    },
                    drift: Some(DriftSettings::new(2022, 1.0)),
                },
                OperationConfig {
                    target: ForecastTarget::CountryProduction,
                    label: "National production (tonnes)".to_string(),
                    fields: vec![
                        FeatureField::categorical("country", COUNTRY),
                        FeatureField::numeric("year"),
                    ],
                    selection: EnsembleSelection::Category {
                        field: "country".to_string(),
                        variants: country_variants,
                    },
                    drift: Some(DriftSettings::new(2023, 0.1)),
                },
            ],
        }
    }

    /// Names of every predictor the configuration references.
    pub fn referenced_predictors(&self) -> std::collections::BTreeSet<String> {
        let mut names = std::collections::BTreeSet::new();
        for op in &self.operations {
            match &op.selection {
                EnsembleSelection::Fixed { ensemble } => {
                    names.extend(ensemble.members.iter().cloned());
                }
                EnsembleSelection::Category { variants, .. } => {
                    for ensemble in variants.values() {
                        names.extend(ensemble.members.iter().cloned());
                    }
                }
            }
        }
        names
    }
}
