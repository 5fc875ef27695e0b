//! End-to-end forecasting against the standard configuration.

use std::sync::Arc;

use teacast_core::{
    CategoricalCode, DemandRequest, ForecastConfig, ForecastEngine, ForecastError, ForecastStage,
    ForecastTarget, LinearPredictor, PredictorRegistry, PriceRequest, ProductionRequest,
    RawForecastRequest, SalesRequest,
};

/// Registry where every referenced model returns a fixed value.
fn constant_registry(config: &ForecastConfig, value: impl Fn(&str) -> f64) -> PredictorRegistry {
    let mut builder = PredictorRegistry::builder();
    for op in &config.operations {
        let arity = op.fields.len();
        for name in member_names(op) {
            builder = builder.register(name.clone(), LinearPredictor::new(value(&name), vec![0.0; arity]));
        }
    }
    builder.build()
}

fn member_names(op: &teacast_core::OperationConfig) -> Vec<String> {
    match &op.selection {
        teacast_core::EnsembleSelection::Fixed { ensemble } => ensemble.members.clone(),
        teacast_core::EnsembleSelection::Category { variants, .. } => variants
            .values()
            .flat_map(|e| e.members.clone())
            .collect(),
    }
}

fn standard_engine() -> ForecastEngine {
    let config = ForecastConfig::standard();
    let registry = constant_registry(&config, |name| match name {
        "sales_rf" => 10.0,
        "sales_xgb" => 20.0,
        "sales_lgbm" => 30.0,
        "price_rf" => 900.0,
        "price_gbr" => 1100.0,
        "production_rf" => 5000.0,
        "production_xgb" => 7000.0,
        _ => 100.0,
    });
    ForecastEngine::new(&config, Arc::new(registry)).expect("standard config binds")
}

#[test]
fn sales_forecast_combines_weights_and_drift() {
    let engine = standard_engine();
    let result = engine
        .forecast_sales(&SalesRequest {
            elevation: "Mid grown".to_string(),
            sales_code: 4,
            dollar_rate: 300.0,
            avg_price: 1000.0,
            year: 2026,
        })
        .unwrap();
    // 0.4*10 + 0.3*20 + 0.3*30 = 19; three years past 2023 at 0.1%.
    assert!((result.combined - 19.0).abs() < 1e-9);
    assert!((result.value - 19.0 * (1.0 + 3.0 * 0.1 / 100.0)).abs() < 1e-9);
    assert_eq!(result.encoded["elevation"], CategoricalCode(2));
}

#[test]
fn price_forecast_averages_members() {
    let engine = standard_engine();
    let result = engine
        .forecast_price(&PriceRequest {
            commodity_type: "bopf".to_string(),
            elevation: "Low grown".to_string(),
            year: 2023,
            month: 5,
        })
        .unwrap();
    assert_eq!(result.combined, 1000.0);
    assert_eq!(result.value, 1000.0, "no drift in the reference year");
    assert_eq!(result.encoded["commodity_type"], CategoricalCode(1));
}

#[test]
fn production_forecast_uses_one_percent_drift() {
    let engine = standard_engine();
    let result = engine
        .forecast_production(&ProductionRequest {
            processing_method: "Orthodox".to_string(),
            elevation: "High".to_string(),
            year: 2024,
            month: 8,
            temperature: None,
            rainfall: Some(210.0),
        })
        .unwrap();
    assert_eq!(result.combined, 6000.0);
    assert!((result.value - 6120.0).abs() < 1e-9);
}

#[test]
fn unknown_elevation_degrades_to_unknown_code() {
    let engine = standard_engine();
    let result = engine
        .forecast_sales(&SalesRequest {
            elevation: "Unrecognized".to_string(),
            sales_code: 1,
            dollar_rate: 300.0,
            avg_price: 800.0,
            year: 2020,
        })
        .unwrap();
    assert_eq!(result.encoded["elevation"], CategoricalCode(3));
}

#[test]
fn unknown_processing_method_is_rejected() {
    let engine = standard_engine();
    let err = engine
        .forecast_production(&ProductionRequest {
            processing_method: "Smoked".to_string(),
            elevation: "High".to_string(),
            year: 2024,
            month: 1,
            temperature: None,
            rainfall: None,
        })
        .unwrap_err();
    assert!(matches!(err, ForecastError::InvalidCategory { ref domain, .. } if domain == "processing_method"));
    assert_eq!(err.stage(), ForecastStage::Received);
}

#[test]
fn demand_tier_is_case_insensitive() {
    let engine = standard_engine();
    let upper = engine
        .forecast_demand(&DemandRequest {
            tea_type: "GREEN TEA".to_string(),
            quantity_tier: "LOW".to_string(),
            year: 2024,
            month: 2,
        })
        .unwrap();
    let lower = engine
        .forecast_demand(&DemandRequest {
            tea_type: "green tea".to_string(),
            quantity_tier: "low".to_string(),
            year: 2024,
            month: 2,
        })
        .unwrap();
    assert_eq!(upper.encoded, lower.encoded);
}

#[test]
fn raw_request_missing_required_numeric_fails() {
    let engine = standard_engine();
    let req: RawForecastRequest = serde_json::from_str(
        r#"{
            "target": "sales_quantity",
            "numeric": { "sales_code": 4, "avg_price": 1000, "year": 2024 },
            "categorical": { "elevation": "High grown" }
        }"#,
    )
    .unwrap();
    let err = engine.forecast(&req).unwrap_err();
    assert!(matches!(err, ForecastError::MissingFeature { ref field, .. } if field == "dollar_rate"));
}

#[test]
fn missing_predictor_fails_engine_construction() {
    let config = ForecastConfig::standard();
    let registry = PredictorRegistry::builder()
        .register("sales_rf", LinearPredictor::new(1.0, vec![0.0; 5]))
        .build();
    let err = ForecastEngine::new(&config, Arc::new(registry)).unwrap_err();
    assert!(matches!(err, ForecastError::UnknownPredictor(_)));
}

#[test]
fn engine_is_shareable_across_threads() {
    let engine = Arc::new(standard_engine());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                engine
                    .forecast_sales(&SalesRequest {
                        elevation: "High grown".to_string(),
                        sales_code: i,
                        dollar_rate: 300.0,
                        avg_price: 1000.0,
                        year: 2023,
                    })
                    .map(|r| r.value)
            })
        })
        .collect();
    for handle in handles {
        let value = handle.join().unwrap().unwrap();
        assert!((value - 19.0).abs() < 1e-9);
    }
    assert_eq!(engine.targets().count(), ForecastTarget::ALL.len());
}

#[test]
fn toml_config_overrides_weights() {
    let mut config = ForecastConfig::standard();
    config
        .operations
        .retain(|o| o.target == ForecastTarget::SalesQuantity);
    let toml_text = toml::to_string(&config).unwrap();
    let edited = toml_text.replace("0.4", "0.2").replacen("0.3", "0.5", 1);
    let parsed: ForecastConfig = toml::from_str(&edited).unwrap();
    let registry = constant_registry(&parsed, |name| match name {
        "sales_rf" => 10.0,
        "sales_xgb" => 20.0,
        _ => 30.0,
    });
    let engine = ForecastEngine::new(&parsed, Arc::new(registry)).unwrap();
    let result = engine
        .forecast_sales(&SalesRequest {
            elevation: "High grown".to_string(),
            sales_code: 1,
            dollar_rate: 300.0,
            avg_price: 1000.0,
            year: 2023,
        })
        .unwrap();
    // 0.2*10 + 0.5*20 + 0.3*30
    assert!((result.value - 21.0).abs() < 1e-9);
}
