//! Structured task groups.
//!
//! A [`TaskGroup`] owns every task spawned through it. Shutting the group
//! down cancels the group token, which every task token descends from,
//! then waits until each task has settled. Cancellation is cooperative:
//! a task stops at its next suspension point, never in the middle of
//! synchronous work.

use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::join_set::TaskSet;
use crate::panic::{join_error_panic_message, panic_message};
use crate::token::{CancelToken, task_ids};

/// Boxed error returned by fallible tasks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a task did not produce its output.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
	#[error("task {task} was cancelled")]
	Cancelled { task: u64 },
	#[error("task {task} panicked: {message}")]
	Panicked { task: u64, message: String },
	#[error("task {task} failed: {source}")]
	Failed {
		task: u64,
		#[source]
		source: Arc<dyn std::error::Error + Send + Sync>,
	},
}

impl TaskError {
	pub fn task(&self) -> u64 {
		match self {
			Self::Cancelled { task } | Self::Panicked { task, .. } | Self::Failed { task, .. } => *task,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled { .. })
	}
}

/// Every non-cancellation failure collected while a group shut down.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} task(s) failed in group `{group}`", failures.len())]
pub struct TaskFailures {
	pub group: Arc<str>,
	pub failures: Vec<TaskError>,
}

/// Awaitable result of one spawned task.
///
/// Dropping the handle does not cancel the task; call [`Self::cancel`].
#[derive(Debug)]
pub struct TaskHandle<T> {
	task: u64,
	token: CancelToken,
	rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
	pub fn id(&self) -> u64 {
		self.task
	}

	/// Cancellation token observed by the task.
	pub fn token(&self) -> &CancelToken {
		&self.token
	}

	/// Requests cooperative cancellation of this task only.
	pub fn cancel(&self) {
		self.token.cancel();
	}
}

impl<T> Future for TaskHandle<T> {
	type Output = Result<T, TaskError>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let task = self.task;
		Pin::new(&mut self.rx)
			.poll(cx)
			.map(|received| received.unwrap_or(Err(TaskError::Cancelled { task })))
	}
}

/// Wraps `fut` so panics and cancellation become [`TaskError`]s.
///
/// The returned future resolves to the failure to report to an owning
/// group, if any; the handle receives the full outcome.
pub(crate) fn supervise<T, F>(task: u64, token: CancelToken, fut: F) -> (TaskHandle<T>, impl Future<Output = Option<TaskError>> + Send + 'static)
where
	T: Send + 'static,
	F: Future<Output = Result<T, TaskError>> + Send + 'static,
{
	let (tx, rx) = oneshot::channel();
	let handle = TaskHandle {
		task,
		token: token.clone(),
		rx,
	};
	let supervised = async move {
		let outcome = match token.run_until_cancelled(AssertUnwindSafe(fut).catch_unwind()).await {
			None => Err(TaskError::Cancelled { task }),
			Some(Ok(result)) => result,
			Some(Err(payload)) => Err(TaskError::Panicked {
				task,
				message: panic_message(payload.as_ref()),
			}),
		};
		let failure = match &outcome {
			Err(err) if !err.is_cancelled() => Some(err.clone()),
			_ => None,
		};
		let _ = tx.send(outcome);
		failure
	};
	(handle, supervised)
}

struct GroupInner {
	id: u64,
	name: Arc<str>,
	token: CancelToken,
	tasks: Mutex<TaskSet<Option<TaskError>>>,
	closed: AtomicBool,
}

/// Structured-concurrency boundary owning a set of tasks.
#[derive(Clone)]
pub struct TaskGroup {
	inner: Arc<GroupInner>,
}

impl TaskGroup {
	/// Creates an open group. With a `parent` token, cancelling the parent
	/// also cancels this group's tasks.
	pub fn new(name: impl AsRef<str>, parent: Option<&CancelToken>) -> Self {
		let id = task_ids().next();
		let token = match parent {
			Some(parent) => parent.child(id),
			None => CancelToken::new(id),
		};
		Self {
			inner: Arc::new(GroupInner {
				id,
				name: Arc::from(name.as_ref()),
				token,
				tasks: Mutex::new(TaskSet::new()),
				closed: AtomicBool::new(false),
			}),
		}
	}

	pub fn id(&self) -> u64 {
		self.inner.id
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Token every task of this group descends from.
	pub fn token(&self) -> &CancelToken {
		&self.inner.token
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	/// Number of tasks not yet joined.
	pub fn pending(&self) -> usize {
		self.inner.tasks.lock().len()
	}

	/// Spawns `fut` into the group.
	///
	/// # Panics
	///
	/// Panics if the group has been shut down.
	pub fn spawn<F>(&self, fut: F) -> TaskHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		self.spawn_with(|_| fut)
	}

	/// Spawns the future built by `make`, which receives the task's own
	/// cancellation token.
	///
	/// # Panics
	///
	/// Panics if the group has been shut down.
	pub fn spawn_with<M, F>(&self, make: M) -> TaskHandle<F::Output>
	where
		M: FnOnce(CancelToken) -> F,
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		self.spawn_inner(make, |_, fut| async move { Ok(fut.await) })
	}

	/// Spawns a fallible future. An `Err` is reported as a task failure both
	/// to the handle and to [`Self::shutdown`].
	///
	/// # Panics
	///
	/// Panics if the group has been shut down.
	pub fn spawn_try<M, F, T, E>(&self, make: M) -> TaskHandle<T>
	where
		M: FnOnce(CancelToken) -> F,
		F: Future<Output = Result<T, E>> + Send + 'static,
		T: Send + 'static,
		E: Into<BoxError>,
	{
		self.spawn_inner(make, |task, fut| async move {
			fut.await.map_err(|err| {
				let source: BoxError = err.into();
				TaskError::Failed { task, source: source.into() }
			})
		})
	}

	fn spawn_inner<M, F, W, WF, T>(&self, make: M, wrap: W) -> TaskHandle<T>
	where
		M: FnOnce(CancelToken) -> F,
		W: FnOnce(u64, F) -> WF,
		WF: Future<Output = Result<T, TaskError>> + Send + 'static,
		T: Send + 'static,
	{
		assert!(!self.is_closed(), "spawn into closed task group `{}`", self.inner.name);
		let task = task_ids().next();
		let token = self.inner.token.child(task);
		let fut = wrap(task, make(token.clone()));
		let (handle, supervised) = supervise(task, token, fut);
		let mut tasks = self.inner.tasks.lock();
		tasks.spawn(task, supervised);
		tracing::trace!(group = %self.inner.name, task, pending = tasks.len(), "task_group.spawn");
		handle
	}

	/// Cancels every task still running and waits for all of them.
	///
	/// Cancellations are swallowed. Panics and failures from any task are
	/// returned together once every task has settled. Further spawns panic.
	/// Calling this again after the group is drained returns `Ok(())`.
	pub async fn shutdown(&self) -> Result<(), TaskFailures> {
		self.inner.closed.store(true, Ordering::Release);
		self.inner.token.cancel();
		let mut failures = Vec::new();
		let mut joined = 0usize;
		loop {
			let mut batch = std::mem::take(&mut *self.inner.tasks.lock());
			if batch.is_empty() {
				break;
			}
			while let Some((task, result)) = batch.join_next().await {
				joined += 1;
				match result {
					Ok(Some(failure)) => failures.push(failure),
					Ok(None) => {}
					Err(err) => {
						if let Some(message) = join_error_panic_message(err) {
							failures.push(TaskError::Panicked { task, message });
						}
					}
				}
			}
		}
		tracing::debug!(group = %self.inner.name, joined, failed = failures.len(), "task_group.shutdown");
		if failures.is_empty() {
			Ok(())
		} else {
			Err(TaskFailures {
				group: Arc::clone(&self.inner.name),
				failures,
			})
		}
	}
}

impl std::fmt::Debug for TaskGroup {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TaskGroup")
			.field("id", &self.inner.id)
			.field("name", &self.inner.name)
			.field("closed", &self.is_closed())
			.field("pending", &self.pending())
			.finish()
	}
}

#[cfg(test)]
mod tests;
