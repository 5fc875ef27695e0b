//! Typed request records, one per forecasting operation.

use serde::{Deserialize, Serialize};

use crate::config::ForecastTarget;
use crate::features::FeatureInputs;

/// A request that can be fed to [`crate::forecast::ForecastEngine::forecast`].
pub trait ForecastInput {
    fn target(&self) -> ForecastTarget;
    fn to_inputs(&self) -> FeatureInputs;
}

/// Auction sales quantity for an elevation tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRequest {
    pub elevation: String,
    pub sales_code: u32,
    pub dollar_rate: f64,
    pub avg_price: f64,
    pub year: i32,
}

impl ForecastInput for SalesRequest {
    fn target(&self) -> ForecastTarget {
        ForecastTarget::SalesQuantity
    }

    fn to_inputs(&self) -> FeatureInputs {
        FeatureInputs::new()
            .with_category("elevation", &self.elevation)
            .with_number("sales_code", f64::from(self.sales_code))
            .with_number("dollar_rate", self.dollar_rate)
            .with_number("avg_price", self.avg_price)
            .with_number("year", f64::from(self.year))
    }
}

/// Average unit price for a commodity grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub commodity_type: String,
    pub elevation: String,
    pub year: i32,
    pub month: u32,
}

impl ForecastInput for PriceRequest {
    fn target(&self) -> ForecastTarget {
        ForecastTarget::UnitPrice
    }

    fn to_inputs(&self) -> FeatureInputs {
        FeatureInputs::new()
            .with_category("commodity_type", &self.commodity_type)
            .with_category("elevation", &self.elevation)
            .with_number("year", f64::from(self.year))
            .with_number("month", f64::from(self.month))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRequest {
    pub tea_type: String,
    pub quantity_tier: String,
    pub year: i32,
    pub month: u32,
}

impl ForecastInput for DemandRequest {
    fn target(&self) -> ForecastTarget {
        ForecastTarget::Demand
    }

    fn to_inputs(&self) -> FeatureInputs {
        FeatureInputs::new()
            .with_category("tea_type", &self.tea_type)
            .with_category("quantity_tier", &self.quantity_tier)
            .with_number("year", f64::from(self.year))
            .with_number("month", f64::from(self.month))
    }
}

/// Monthly production by processing method and elevation.
///
/// Weather readings are optional and default to zero when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRequest {
    pub processing_method: String,
    pub elevation: String,
    pub year: i32,
    pub month: u32,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub rainfall: Option<f64>,
}

impl ForecastInput for ProductionRequest {
    fn target(&self) -> ForecastTarget {
        ForecastTarget::Production
    }

    fn to_inputs(&self) -> FeatureInputs {
        FeatureInputs::new()
            .with_category("processing_method", &self.processing_method)
            .with_category("elevation", &self.elevation)
            .with_number("year", f64::from(self.year))
            .with_number("month", f64::from(self.month))
            .with_optional_number("temperature", self.temperature)
            .with_optional_number("rainfall", self.rainfall)
    }
}

/// National annual production; the country selects the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryProductionRequest {
    pub country: String,
    pub year: i32,
}

impl ForecastInput for CountryProductionRequest {
    fn target(&self) -> ForecastTarget {
        ForecastTarget::CountryProduction
    }

    fn to_inputs(&self) -> FeatureInputs {
        FeatureInputs::new()
            .with_category("country", &self.country)
            .with_number("year", f64::from(self.year))
    }
}

/// Untyped request: a target plus raw inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawForecastRequest {
    pub target: ForecastTarget,
    #[serde(flatten)]
    pub inputs: FeatureInputs,
}

impl ForecastInput for RawForecastRequest {
    fn target(&self) -> ForecastTarget {
        self.target
    }

    fn to_inputs(&self) -> FeatureInputs {
        self.inputs.clone()
    }
}
