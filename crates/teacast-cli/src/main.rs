//! Teacast CLI
//!
//! The `teacast` command runs tea market forecasts and aggregates search and
//! social signals into time-bucketed trend series.
//!
//! ## Commands
//!
//! - `forecast`: Run one forecast against a set of linear models
//! - `trends`: Aggregate a signal source for a list of search terms
//! - `targets`: List forecast targets and their feature fields

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use teacast_core::{
    CountryProductionRequest, DemandRequest, ForecastConfig, ForecastEngine, ForecastResult,
    ForecastTarget, PredictorRegistry, PriceRequest, ProductionRequest, SalesRequest,
};
use teacast_signals::{
    cancel_pair, AggregationRequest, AggregationResult, Granularity, HttpTransport, PagingParams,
    Reduction, SignalAggregator, SignalSource, SignalTransport, SignalsConfig,
};

#[derive(Parser)]
#[command(name = "teacast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tea market forecasting and trend aggregation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a forecast and print the result as JSON
    Forecast {
        /// Target variable (sales_quantity, unit_price, demand, production, country_production)
        #[arg(short, long)]
        target: ForecastTarget,

        /// Request file (JSON) with the target's input fields
        #[arg(short, long)]
        input: PathBuf,

        /// Linear model file (JSON object of name -> {intercept, coefficients})
        #[arg(short, long, env = "TEACAST_MODELS")]
        models: PathBuf,

        /// Forecast configuration override (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Aggregate a signal source into time buckets per term
    Trends {
        /// Signal source (google_trends, twitter, facebook, instagram)
        #[arg(short, long)]
        source: SignalSource,

        /// Search term, hashtag or keyword (repeatable)
        #[arg(short, long = "term", required = true)]
        terms: Vec<String>,

        /// Bucket width: year or year-month
        #[arg(short, long, default_value = "year")]
        granularity: Granularity,

        /// Bucket reduction: count or sum
        #[arg(short, long, default_value = "count")]
        reduction: Reduction,

        /// Signal configuration override (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Items requested per page, overriding the configured paging
        #[arg(long)]
        count: Option<u32>,

        /// Pages followed per term, overriding the configured paging
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_pages: Option<u32>,

        /// Exit non-zero unless every term succeeded
        #[arg(long)]
        strict: bool,
    },

    /// List forecast targets and their feature fields
    Targets {
        /// Forecast configuration override (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    teacast_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Forecast {
            target,
            input,
            models,
            config,
        } => cmd_forecast(target, &input, &models, config.as_deref()),
        Commands::Trends {
            source,
            terms,
            granularity,
            reduction,
            config,
            count,
            max_pages,
            strict,
        } => {
            let request = AggregationRequest::new(source, terms).by(granularity, reduction);
            cmd_trends(request, config.as_deref(), count, max_pages, strict).await
        }
        Commands::Targets { config } => cmd_targets(config.as_deref()),
    }
}

fn cmd_forecast(
    target: ForecastTarget,
    input: &Path,
    models: &Path,
    config: Option<&Path>,
) -> Result<()> {
    let config = load_forecast_config(config)?;
    let registry = load_registry(models)?;
    let engine = ForecastEngine::new(&config, Arc::new(registry))
        .context("Failed to bind forecast configuration to models")?;

    let request = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read request file {}", input.display()))?;
    let result = run_forecast(&engine, target, &request)?;

    info!(forecast_target = %target, value = result.value, "forecast complete");
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Parse `request` as the typed request for `target` and forecast it.
fn run_forecast(engine: &ForecastEngine, target: ForecastTarget, request: &str) -> Result<ForecastResult> {
    let parse_err = || format!("Request does not match the {target} input fields");
    let result = match target {
        ForecastTarget::SalesQuantity => {
            let req: SalesRequest = serde_json::from_str(request).with_context(parse_err)?;
            engine.forecast_sales(&req)
        }
        ForecastTarget::UnitPrice => {
            let req: PriceRequest = serde_json::from_str(request).with_context(parse_err)?;
            engine.forecast_price(&req)
        }
        ForecastTarget::Demand => {
            let req: DemandRequest = serde_json::from_str(request).with_context(parse_err)?;
            engine.forecast_demand(&req)
        }
        ForecastTarget::Production => {
            let req: ProductionRequest = serde_json::from_str(request).with_context(parse_err)?;
            engine.forecast_production(&req)
        }
        ForecastTarget::CountryProduction => {
            let req: CountryProductionRequest =
                serde_json::from_str(request).with_context(parse_err)?;
            engine.forecast_country_production(&req)
        }
    };
    result.with_context(|| format!("{target} forecast failed"))
}

async fn cmd_trends(
    request: AggregationRequest,
    config: Option<&Path>,
    count: Option<u32>,
    max_pages: Option<u32>,
    strict: bool,
) -> Result<()> {
    let config = load_signals_config(config)?;
    let request = match paging_override(&config.paging, count, max_pages) {
        Some(paging) => request.with_paging(paging),
        None => request,
    };
    let transport: Arc<dyn SignalTransport> =
        Arc::new(HttpTransport::new(config.clone()).context("Failed to build HTTP transport")?);
    let aggregator =
        SignalAggregator::new(transport, &config).context("Invalid signal configuration")?;

    let (handle, signal) = cancel_pair();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling in-flight terms");
            handle.cancel();
        }
    });

    let result = aggregator.aggregate(&request, &signal).await;
    interrupt.abort();

    println!("{}", serde_json::to_string_pretty(&result)?);
    report_incomplete(&result, strict)
}

/// Configured paging with any command-line overrides applied, or `None`
/// when nothing was overridden.
fn paging_override(
    base: &PagingParams,
    count: Option<u32>,
    max_pages: Option<u32>,
) -> Option<PagingParams> {
    if count.is_none() && max_pages.is_none() {
        return None;
    }
    let mut paging = base.clone();
    if count.is_some() {
        paging.count = count;
    }
    if let Some(max_pages) = max_pages {
        paging.max_pages = max_pages;
    }
    Some(paging)
}

fn report_incomplete(result: &AggregationResult, strict: bool) -> Result<()> {
    let failed = result.failed();
    let cancelled = result.cancelled();
    if !failed.is_empty() {
        warn!(terms = ?failed, "some terms failed");
    }
    if !cancelled.is_empty() {
        warn!(terms = ?cancelled, "some terms were cancelled");
    }
    if strict {
        result.ensure_complete()?;
    }
    Ok(())
}

fn cmd_targets(config: Option<&Path>) -> Result<()> {
    let config = load_forecast_config(config)?;
    for op in &config.operations {
        let fields: Vec<&str> = op.fields.iter().map(|f| f.name()).collect();
        println!("{:<20} {:<28} {}", op.target.as_str(), op.label, fields.join(", "));
    }
    Ok(())
}

/// Standard configuration, or the TOML file at `path`.
fn load_forecast_config(path: Option<&Path>) -> Result<ForecastConfig> {
    let Some(path) = path else {
        return Ok(ForecastConfig::standard());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read forecast config {}", path.display()))?;
    toml::from_str(&text)
        .with_context(|| format!("Failed to parse forecast config {}", path.display()))
}

/// Default or TOML-overridden signal configuration, with API keys from the
/// environment.
fn load_signals_config(path: Option<&Path>) -> Result<SignalsConfig> {
    let mut config = match path {
        None => SignalsConfig::default(),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read signal config {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("Failed to parse signal config {}", path.display()))?
        }
    };
    config.load_api_keys_from_env();
    Ok(config)
}

fn load_registry(path: &Path) -> Result<PredictorRegistry> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model file {}", path.display()))?;
    let registry = PredictorRegistry::from_linear_json(&text)
        .with_context(|| format!("Failed to parse model file {}", path.display()))?;
    if registry.is_empty() {
        bail!("Model file {} defines no models", path.display());
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use teacast_core::{EnsembleSelection, OperationConfig};
    use teacast_signals::{Buckets, TermOutcome};

    fn member_names(op: &OperationConfig) -> Vec<String> {
        match &op.selection {
            EnsembleSelection::Fixed { ensemble } => ensemble.members.clone(),
            EnsembleSelection::Category { variants, .. } => {
                variants.values().flat_map(|e| e.members.clone()).collect()
            }
        }
    }

    /// Every model in the standard config as a constant (intercept-only) model.
    fn write_models(dir: &Path, value: f64) -> PathBuf {
        let config = ForecastConfig::standard();
        let mut models = serde_json::Map::new();
        for op in &config.operations {
            for name in member_names(op) {
                models.insert(
                    name,
                    json!({ "intercept": value, "coefficients": vec![0.0; op.fields.len()] }),
                );
            }
        }
        let path = dir.join("models.json");
        std::fs::write(&path, serde_json::to_string(&models).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_forecast_from_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = load_registry(&write_models(dir.path(), 500.0)).unwrap();
        let engine = ForecastEngine::new(&ForecastConfig::standard(), Arc::new(registry)).unwrap();

        let result = run_forecast(
            &engine,
            ForecastTarget::Demand,
            r#"{"tea_type": "Green Tea", "quantity_tier": "high", "year": 2024, "month": 6}"#,
        )
        .unwrap();
        assert!((result.value - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_rejects_mismatched_request() {
        let dir = tempfile::tempdir().unwrap();
        let registry = load_registry(&write_models(dir.path(), 1.0)).unwrap();
        let engine = ForecastEngine::new(&ForecastConfig::standard(), Arc::new(registry)).unwrap();

        let err = run_forecast(&engine, ForecastTarget::SalesQuantity, r#"{"country": "India"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("sales_quantity"));
    }

    #[test]
    fn test_empty_model_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(load_registry(&path).is_err());
    }

    #[test]
    fn test_forecast_config_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ForecastConfig::standard();
        config
            .operations
            .retain(|o| o.target == ForecastTarget::Demand);
        let path = dir.path().join("forecast.toml");
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = load_forecast_config(Some(&path)).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(load_forecast_config(None).unwrap(), ForecastConfig::standard());
    }

    #[test]
    fn test_signals_config_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.toml");
        std::fs::write(&path, "max_concurrent = 8\ntimeout_ms = 5000\n").unwrap();

        let config = load_signals_config(Some(&path)).unwrap();
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.timeout_ms, 5000);
        assert!(config.endpoint(SignalSource::Instagram).is_ok());
    }

    #[test]
    fn test_missing_config_file_names_path() {
        let err = load_signals_config(Some(Path::new("/nonexistent/signals.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/signals.toml"));
    }

    #[tokio::test]
    async fn test_strict_mode_fails_on_incomplete_result() {
        let transport: Arc<dyn SignalTransport> =
            Arc::new(HttpTransport::new(SignalsConfig::default()).unwrap());
        let aggregator = SignalAggregator::new(transport, &SignalsConfig::default()).unwrap();
        let (handle, signal) = cancel_pair();
        handle.cancel();
        let request = AggregationRequest::new(SignalSource::Twitter, ["green_tea"]);
        let result = aggregator.aggregate(&request, &signal).await;

        assert_eq!(result.outcome("green_tea"), Some(&TermOutcome::Cancelled));
        assert!(report_incomplete(&result, false).is_ok());
        assert!(report_incomplete(&result, true).is_err());

        let done = AggregationResult {
            terms: [(
                "green_tea".to_string(),
                TermOutcome::Succeeded {
                    buckets: Buckets::new(),
                    skipped_records: 0,
                    attempts: 1,
                },
            )]
            .into_iter()
            .collect(),
            ..result
        };
        assert!(report_incomplete(&done, true).is_ok());
    }

    #[test]
    fn test_paging_flags_override_config() {
        let base = PagingParams::default();
        assert_eq!(paging_override(&base, None, None), None);

        let paging = paging_override(&base, Some(20), None).unwrap();
        assert_eq!(paging.count, Some(20));
        assert_eq!(paging.max_pages, base.max_pages);

        let paging = paging_override(&base, None, Some(1)).unwrap();
        assert_eq!(paging.count, base.count);
        assert_eq!(paging.max_pages, 1);
    }

    #[test]
    fn test_trends_parses_paging_flags() {
        let cli = Cli::try_parse_from([
            "teacast", "trends", "-s", "twitter", "-t", "matcha", "--count", "20", "--max-pages", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Trends {
                count, max_pages, ..
            } => {
                assert_eq!(count, Some(20));
                assert_eq!(max_pages, Some(2));
            }
            _ => panic!("expected trends"),
        }

        let zero = Cli::try_parse_from([
            "teacast", "trends", "-s", "twitter", "-t", "matcha", "--max-pages", "0",
        ]);
        assert!(zero.is_err());
    }
}
