use std::future::Future;
use std::sync::OnceLock;

use crate::group::{TaskHandle, supervise};
use crate::token::{CancelToken, task_ids};

/// Returns the ambient runtime handle, falling back to a shared
/// background runtime when called outside any runtime.
///
/// # Panics
///
/// Panics if the fallback runtime cannot be built.
pub fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("keel-worker-global")
			.build()
			.unwrap_or_else(|err| panic!("failed to build keel-worker global tokio runtime: {err}"))
	});
	runtime.handle().clone()
}

/// Spawns work that belongs to no task group.
///
/// The task gets its own root cancellation token. Nothing joins it; a
/// failure is logged and reported only through the returned handle.
pub fn spawn_detached<F>(fut: F) -> TaskHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let task = task_ids().next();
	let token = CancelToken::new(task);
	let (handle, supervised) = supervise(task, token, async move { Ok(fut.await) });
	tracing::trace!(task, "worker.spawn_detached");
	runtime_handle().spawn(async move {
		if let Some(failure) = supervised.await {
			tracing::warn!(task, error = %failure, "worker.detached_failed");
		}
	});
	handle
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::TaskError;

	async fn explode() {
		panic!("detached boom")
	}

	#[tokio::test]
	async fn detached_tasks_report_through_their_handle() {
		assert_eq!(spawn_detached(async { 2 + 2 }).await.unwrap(), 4);

		let err: TaskError = spawn_detached(explode()).await.unwrap_err();
		assert!(matches!(err, TaskError::Panicked { ref message, .. } if message.contains("detached boom")));
	}

	#[tokio::test]
	async fn detached_tasks_can_be_cancelled() {
		let handle = spawn_detached(std::future::pending::<()>());
		handle.cancel();
		assert!(handle.await.unwrap_err().is_cancelled());
	}

	#[test]
	fn spawning_outside_a_runtime_uses_the_fallback() {
		let handle = spawn_detached(async { "ok" });
		let out = futures::executor::block_on(handle);
		assert_eq!(out.unwrap(), "ok");
	}
}
