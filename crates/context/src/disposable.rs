//! Disposable resources entered and exited with a scope.

use std::sync::Arc;

use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use keel_state::Record;
use keel_worker::BoxError;

use crate::error::{Failure, FailureGroup};

/// A resource with async setup and teardown that contributes state.
///
/// `enter` runs concurrently with the other disposables of the same scope
/// and may yield records to merge into the scope's state. `exit` runs
/// exactly once for every disposable whose `enter` succeeded.
#[async_trait::async_trait]
pub trait Disposable: Send + Sync {
	/// Name used in logs and failure reports.
	fn name(&self) -> &str {
		std::any::type_name::<Self>()
	}

	async fn enter(&self) -> Result<Vec<Record>, BoxError>;

	/// Releases the resource. `failure` describes why the scope is exiting
	/// when it did not complete normally.
	async fn exit(&self, failure: Option<&(dyn std::error::Error + Send + Sync)>) -> Result<(), BoxError>;
}

/// Disposables entered by one scope, in declaration order.
pub(crate) struct Entered {
	pub(crate) disposables: Vec<Arc<dyn Disposable>>,
	pub(crate) records: Vec<Vec<Record>>,
}

/// Enters every disposable concurrently.
///
/// On the first setup failure, setups that are already complete are still
/// collected: their failures join the aggregate and their successes are
/// exited with the rest. Setups still waiting are dropped.
pub(crate) async fn enter_all(scope: &str, disposables: &[Arc<dyn Disposable>]) -> Result<Entered, FailureGroup> {
	let mut pending: FuturesUnordered<_> = disposables
		.iter()
		.enumerate()
		.map(|(idx, disposable)| {
			let disposable = Arc::clone(disposable);
			async move { (idx, disposable.enter().await) }
		})
		.collect();

	let mut produced: Vec<Option<Vec<Record>>> = vec![None; disposables.len()];
	let mut failures = FailureGroup::new(scope);
	while let Some((idx, result)) = pending.next().await {
		match result {
			Ok(records) => produced[idx] = Some(records),
			Err(source) => {
				failures.push(Failure::Enter {
					name: disposables[idx].name().to_string(),
					source,
				});
				break;
			}
		}
	}
	if !failures.is_empty() {
		while let Some(Some((idx, result))) = pending.next().now_or_never() {
			match result {
				Ok(records) => produced[idx] = Some(records),
				Err(source) => failures.push(Failure::Enter {
					name: disposables[idx].name().to_string(),
					source,
				}),
			}
		}
	}
	drop(pending);

	if failures.is_empty() {
		tracing::debug!(scope, count = disposables.len(), "disposables.entered");
		return Ok(Entered {
			disposables: disposables.to_vec(),
			records: produced.into_iter().map(Option::unwrap_or_default).collect(),
		});
	}

	let entered: Vec<Arc<dyn Disposable>> = disposables
		.iter()
		.zip(&produced)
		.filter(|(_, records)| records.is_some())
		.map(|(disposable, _)| Arc::clone(disposable))
		.collect();
	tracing::warn!(scope, entered = entered.len(), "disposables.enter_failed");
	let reason = std::io::Error::other(format!("setup of scope `{scope}` failed"));
	let reason: &(dyn std::error::Error + Send + Sync) = &reason;
	for failure in exit_all(&entered, Some(reason)).await {
		failures.push(failure);
	}
	Err(failures)
}

/// Exits every disposable concurrently, collecting each failure.
pub(crate) async fn exit_all(disposables: &[Arc<dyn Disposable>], failure: Option<&(dyn std::error::Error + Send + Sync)>) -> Vec<Failure> {
	let exits = disposables.iter().map(|disposable| async move {
		disposable.exit(failure).await.map_err(|source| Failure::Exit {
			name: disposable.name().to_string(),
			source,
		})
	});
	futures::future::join_all(exits).await.into_iter().filter_map(Result::err).collect()
}
