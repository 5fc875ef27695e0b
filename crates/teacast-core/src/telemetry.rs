//! Log output for the `teacast` binary.
//!
//! Forecast and aggregation events are written to stderr so stdout carries
//! only JSON results. `RUST_LOG` directives refine the default level.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the process-wide subscriber.
///
/// `level` applies to targets `RUST_LOG` does not mention. With `json` set,
/// each event becomes one JSON object per line. Returns `false` when a
/// subscriber was already installed.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let output = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let output = if json {
        output.json().boxed()
    } else {
        output.boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        init_tracing(true, Level::DEBUG);
        assert!(!init_tracing(false, Level::INFO));
        tracing::info!(event = "telemetry.ready", "subscriber installed");
    }
}
