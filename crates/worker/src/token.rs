use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
pub use tokio_util::sync::WaitForCancellationFutureOwned;

/// Monotonic id source for task groups and the tasks they own.
#[derive(Debug, Default, Clone)]
pub struct IdClock {
	next: Arc<AtomicU64>,
}

impl IdClock {
	/// Creates a new clock whose first id is 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next id.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Process-wide task id clock.
pub(crate) fn task_ids() -> &'static IdClock {
	static TASKS: std::sync::OnceLock<IdClock> = std::sync::OnceLock::new();
	TASKS.get_or_init(IdClock::new)
}

/// Cooperative cancellation flag owned by one task group or task.
///
/// Tokens form a tree: cancelling a group token cancels every task token
/// derived from it, never the other way round.
#[derive(Debug, Clone)]
pub struct CancelToken {
	owner: u64,
	cancel: CancellationToken,
}

impl CancelToken {
	/// Creates a root token owned by `owner`.
	pub fn new(owner: u64) -> Self {
		Self {
			owner,
			cancel: CancellationToken::new(),
		}
	}

	/// Id of the group or task owning this token.
	pub const fn owner(&self) -> u64 {
		self.owner
	}

	/// Returns true when cancellation is requested.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Requests cancellation.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Future resolving when cancellation is requested.
	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}

	/// Owned future resolving when cancellation is requested, for storing
	/// inside hand-written futures and streams.
	pub fn cancelled_owned(&self) -> WaitForCancellationFutureOwned {
		self.cancel.clone().cancelled_owned()
	}

	/// Creates a child token owned by `owner`, cancelled with this one.
	pub fn child(&self, owner: u64) -> Self {
		Self {
			owner,
			cancel: self.cancel.child_token(),
		}
	}

	/// Runs `fut` until it completes or this token is cancelled.
	pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Option<F::Output> {
		self.cancel.run_until_cancelled(fut).await
	}
}
