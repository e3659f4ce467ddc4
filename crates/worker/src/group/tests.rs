use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;

#[tokio::test]
async fn handles_resolve_to_task_output() {
	let group = TaskGroup::new("outputs", None);
	let handle = group.spawn(async { 40 + 2 });
	assert_eq!(handle.await.unwrap(), 42);
	assert!(group.shutdown().await.is_ok());
}

#[tokio::test]
async fn shutdown_cancels_and_waits_for_every_task() {
	let group = TaskGroup::new("shutdown", None);
	let settled = Arc::new(AtomicUsize::new(0));
	let mut handles = Vec::new();
	for _ in 0..5 {
		let settled = Arc::clone(&settled);
		handles.push(group.spawn(async move {
			struct Settle(Arc<AtomicUsize>);
			impl Drop for Settle {
				fn drop(&mut self) {
					self.0.fetch_add(1, Ordering::SeqCst);
				}
			}
			let _settle = Settle(settled);
			tokio::time::sleep(Duration::from_secs(60)).await;
		}));
	}
	for _ in 0..3 {
		tokio::task::yield_now().await;
	}

	assert!(group.shutdown().await.is_ok());
	assert_eq!(settled.load(Ordering::SeqCst), 5);
	assert_eq!(group.pending(), 0);
	for handle in handles {
		assert!(handle.await.unwrap_err().is_cancelled());
	}
}

async fn boom(message: &'static str) {
	panic!("{message}")
}

#[tokio::test]
async fn panics_are_collected_after_all_tasks_settle() {
	let group = TaskGroup::new("panics", None);
	let finished = Arc::new(AtomicUsize::new(0));
	group.spawn(boom("first"));
	let counter = Arc::clone(&finished);
	group.spawn(async move {
		tokio::task::yield_now().await;
		counter.fetch_add(1, Ordering::SeqCst);
	});
	group.spawn(boom("second"));
	for _ in 0..4 {
		tokio::task::yield_now().await;
	}

	let err = group.shutdown().await.unwrap_err();
	assert_eq!(&*err.group, "panics");
	assert_eq!(err.failures.len(), 2);
	assert!(err.failures.iter().all(|f| matches!(f, TaskError::Panicked { .. })));
	assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fallible_tasks_report_their_errors() {
	let group = TaskGroup::new("fallible", None);
	let handle = group.spawn_try(|_| async { Err::<(), _>(std::io::Error::other("disk gone")) });
	let err = handle.await.unwrap_err();
	assert!(matches!(err, TaskError::Failed { .. }));
	assert!(err.to_string().contains("disk gone"));

	let failures = group.shutdown().await.unwrap_err();
	assert_eq!(failures.failures.len(), 1);
	assert_eq!(failures.failures[0].task(), err.task());
}

#[tokio::test]
async fn tasks_observe_their_own_token() {
	let group = TaskGroup::new("tokens", None);
	let handle = group.spawn_with(|token| async move {
		token.cancel();
		token.is_cancelled()
	});
	assert!(handle.await.unwrap());
	assert!(!group.token().is_cancelled());
	group.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancelling_one_handle_leaves_siblings_running() {
	let group = TaskGroup::new("siblings", None);
	let slow = group.spawn(std::future::pending::<()>());
	let fast = group.spawn(async { "done" });
	slow.cancel();
	assert!(slow.await.unwrap_err().is_cancelled());
	assert_eq!(fast.await.unwrap(), "done");
	group.shutdown().await.unwrap();
}

#[tokio::test]
async fn parent_tokens_cascade_into_child_groups() {
	let parent = CancelToken::new(0);
	let group = TaskGroup::new("child", Some(&parent));
	let handle = group.spawn(std::future::pending::<()>());
	parent.cancel();
	assert!(handle.await.unwrap_err().is_cancelled());
	group.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_is_idempotent() {
	let group = TaskGroup::new("twice", None);
	group.spawn(async {});
	group.shutdown().await.unwrap();
	assert!(group.is_closed());
	group.shutdown().await.unwrap();
}

#[tokio::test]
#[should_panic(expected = "spawn into closed task group `closed`")]
async fn spawning_into_a_closed_group_panics() {
	let group = TaskGroup::new("closed", None);
	group.shutdown().await.unwrap();
	group.spawn(async {});
}
