//! Runtime configuration.
//!
//! Loaded from TOML, then overlaid with `KEEL_*` environment variables:
//!
//! ```toml
//! [log]
//! filter = "keel_context=debug,info"
//! format = "json"
//!
//! [runtime]
//! flavor = "current-thread"
//! event_capacity = 256
//! ```

use std::path::Path;
use std::str::FromStr;

use keel_worker::RuntimeFlavor;
use serde::Deserialize;

use crate::error::ConfigError;

/// Path of a TOML file read by [`RuntimeConfig::from_env`].
pub const CONFIG_VAR: &str = "KEEL_CONFIG";
/// Overrides [`LogConfig::filter`].
pub const LOG_VAR: &str = "KEEL_LOG";
/// Overrides [`LogConfig::format`].
pub const LOG_FORMAT_VAR: &str = "KEEL_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
	pub log: LogConfig,
	pub runtime: RuntimeSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
	/// `EnvFilter` directives.
	pub filter: String,
	pub format: LogFormat,
}

impl Default for LogConfig {
	fn default() -> Self {
		Self {
			filter: "info".to_string(),
			format: LogFormat::default(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	Pretty,
	#[default]
	Compact,
	Json,
}

impl FromStr for LogFormat {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"pretty" => Ok(Self::Pretty),
			"compact" => Ok(Self::Compact),
			"json" => Ok(Self::Json),
			_ => Err(()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Flavor {
	/// Every unit of work runs on one thread, switching only at await
	/// points.
	#[default]
	CurrentThread,
	MultiThread,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSection {
	pub flavor: Flavor,
	/// Worker threads for [`Flavor::MultiThread`].
	pub workers: usize,
	/// Per-subscriber event queue capacity of root scopes.
	pub event_capacity: usize,
	pub thread_name: String,
}

impl Default for RuntimeSection {
	fn default() -> Self {
		Self {
			flavor: Flavor::default(),
			workers: 2,
			event_capacity: crate::events::DEFAULT_EVENT_CAPACITY,
			thread_name: "keel".to_string(),
		}
	}
}

impl RuntimeConfig {
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(source)?)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&source)?;
		tracing::debug!(path = %path.display(), "config.loaded");
		Ok(config)
	}

	/// Reads the file named by `KEEL_CONFIG`, if set, then applies the
	/// `KEEL_LOG` and `KEEL_LOG_FORMAT` overrides.
	pub fn from_env() -> Result<Self, ConfigError> {
		let base = match std::env::var_os(CONFIG_VAR) {
			Some(path) => Self::load(path)?,
			None => Self::default(),
		};
		base.overlay(|var| std::env::var(var).ok())
	}

	/// Applies environment overrides read through `lookup`.
	pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		if let Some(filter) = lookup(LOG_VAR).filter(|f| !f.trim().is_empty()) {
			self.log.filter = filter;
		}
		if let Some(format) = lookup(LOG_FORMAT_VAR) {
			self.log.format = format.parse().map_err(|()| ConfigError::InvalidEnv {
				var: LOG_FORMAT_VAR,
				value: format,
			})?;
		}
		Ok(self)
	}

	pub fn flavor(&self) -> RuntimeFlavor {
		match self.runtime.flavor {
			Flavor::CurrentThread => RuntimeFlavor::CurrentThread,
			Flavor::MultiThread => RuntimeFlavor::MultiThread {
				workers: self.runtime.workers.max(1),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_source_yields_defaults() {
		let config = RuntimeConfig::from_toml_str("").unwrap();
		assert_eq!(config, RuntimeConfig::default());
		assert_eq!(config.flavor(), RuntimeFlavor::CurrentThread);
		assert_eq!(config.runtime.event_capacity, 1024);
	}

	#[test]
	fn sections_override_individual_fields() {
		let config = RuntimeConfig::from_toml_str(
			r#"
			[log]
			format = "json"

			[runtime]
			flavor = "multi-thread"
			workers = 4
			"#,
		)
		.unwrap();
		assert_eq!(config.log.filter, "info");
		assert_eq!(config.log.format, LogFormat::Json);
		assert_eq!(config.flavor(), RuntimeFlavor::MultiThread { workers: 4 });
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let err = RuntimeConfig::from_toml_str("[runtime]\nthreads = 3\n").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn environment_overrides_apply_last() {
		let config = RuntimeConfig::default()
			.overlay(|var| match var {
				LOG_VAR => Some("keel_context=trace".to_string()),
				LOG_FORMAT_VAR => Some("Pretty".to_string()),
				_ => None,
			})
			.unwrap();
		assert_eq!(config.log.filter, "keel_context=trace");
		assert_eq!(config.log.format, LogFormat::Pretty);
	}

	#[test]
	fn invalid_log_format_names_the_variable() {
		let err = RuntimeConfig::default()
			.overlay(|var| (var == LOG_FORMAT_VAR).then(|| "xml".to_string()))
			.unwrap_err();
		assert_eq!(err.to_string(), "invalid value for KEEL_LOG_FORMAT: \"xml\"");
	}

	#[test]
	fn missing_file_reports_its_path() {
		let err = RuntimeConfig::load("/nonexistent/keel.toml").unwrap_err();
		assert!(err.to_string().starts_with("failed to read /nonexistent/keel.toml"));
	}
}
