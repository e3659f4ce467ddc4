use std::collections::HashMap;
use std::future::Future;

use tokio::task::{Id, JoinError, JoinSet};

/// Tokio [`JoinSet`] that remembers which task id each entry was spawned
/// under, so completions and failures can be attributed.
///
/// Entries are spawned on [`runtime_handle`](crate::spawn::runtime_handle),
/// so the set works from inside and outside a runtime context.
#[derive(Debug)]
pub struct TaskSet<T> {
	inner: JoinSet<T>,
	ids: HashMap<Id, u64>,
}

impl<T> Default for TaskSet<T> {
	fn default() -> Self {
		Self {
			inner: JoinSet::new(),
			ids: HashMap::new(),
		}
	}
}

impl<T> TaskSet<T>
where
	T: Send + 'static,
{
	/// Creates an empty set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the number of tasks currently in the set.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Returns `true` if the set is empty.
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Spawns `fut` under `task` on the current runtime handle.
	pub fn spawn<F>(&mut self, task: u64, fut: F)
	where
		F: Future<Output = T> + Send + 'static,
	{
		tracing::trace!(task, pending = self.inner.len(), "worker.task_set.spawn");
		let handle = crate::spawn::runtime_handle();
		let abort = self.inner.spawn_on(fut, &handle);
		self.ids.insert(abort.id(), task);
	}

	/// Waits for the next completed task and returns its id with the result.
	pub async fn join_next(&mut self) -> Option<(u64, Result<T, JoinError>)> {
		let joined = self.inner.join_next_with_id().await?;
		Some(self.attribute(joined))
	}

	fn attribute(&mut self, joined: Result<(Id, T), JoinError>) -> (u64, Result<T, JoinError>) {
		match joined {
			Ok((id, value)) => (self.ids.remove(&id).unwrap_or_default(), Ok(value)),
			Err(err) => (self.ids.remove(&err.id()).unwrap_or_default(), Err(err)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn completions_carry_their_task_id() {
		let mut set = TaskSet::new();
		set.spawn(7, async { "seven" });
		assert_eq!(set.len(), 1);
		let (task, result) = set.join_next().await.unwrap();
		assert_eq!(task, 7);
		assert_eq!(result.unwrap(), "seven");
		assert!(set.is_empty());
		assert!(set.join_next().await.is_none());
	}

	#[tokio::test]
	async fn panicked_tasks_keep_their_id() {
		let mut set: TaskSet<()> = TaskSet::new();
		set.spawn(3, async { panic!("three") });
		let (task, result) = set.join_next().await.unwrap();
		assert_eq!(task, 3);
		assert!(result.unwrap_err().is_panic());
	}
}
