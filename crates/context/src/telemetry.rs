//! Process-wide logging bootstrap.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

use crate::config::{LogConfig, LogFormat};
use crate::error::TelemetryError;

/// Installs the global `tracing` subscriber described by `config`.
///
/// Scope spans are reported when they close. Fails if the filter does not
/// parse or a global subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<(), TelemetryError> {
	let filter = EnvFilter::try_new(&config.filter)?;
	let (json, compact, pretty) = match config.format {
		LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json().with_span_events(FmtSpan::CLOSE)), None, None),
		LogFormat::Compact => (None, Some(tracing_subscriber::fmt::layer().compact().with_span_events(FmtSpan::CLOSE)), None),
		LogFormat::Pretty => (None, None, Some(tracing_subscriber::fmt::layer().pretty().with_span_events(FmtSpan::CLOSE))),
	};
	tracing_subscriber::registry()
		.with(filter)
		.with(json)
		.with(compact)
		.with(pretty)
		.try_init()?;
	tracing::debug!(filter = %config.filter, format = ?config.format, "telemetry.init");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bad_filters_are_reported() {
		let config = LogConfig {
			filter: "keel=[".to_string(),
			..LogConfig::default()
		};
		assert!(matches!(init(&config), Err(TelemetryError::Filter(_))));
	}

	#[test]
	fn second_install_fails() {
		let config = LogConfig::default();
		let first = init(&config);
		let second = init(&config);
		assert!(first.is_ok() || matches!(first, Err(TelemetryError::Install(_))));
		assert!(matches!(second, Err(TelemetryError::Install(_))));
	}
}
