//! Blocking entry point that runs a root scope on a configured runtime.

use std::future::Future;

use keel_worker::{BoxError, build_runtime};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::scope::Scope;

/// Builds the runtime described by `config` and runs `body` inside a root
/// scope named `name`, blocking until the scope has fully exited.
pub fn block_on<F, T, E>(config: &RuntimeConfig, name: &str, body: F) -> Result<T, RuntimeError>
where
	F: Future<Output = Result<T, E>>,
	E: Into<BoxError>,
{
	let runtime = build_runtime(config.flavor(), &config.runtime.thread_name)?;
	let scope = Scope::root(name).event_capacity(config.runtime.event_capacity);
	let result = runtime.block_on(scope.run(body))?;
	Ok(result)
}
