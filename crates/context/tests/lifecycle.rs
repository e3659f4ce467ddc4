use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use keel_context::{
	Attributes, BoxError, Disposable, Failure, Level, ObservabilitySink, Phase, Scope, ScopeError, ScopeIdentifier, ctx,
};
use keel_state::Record;
use parking_lot::Mutex;

#[derive(Default)]
struct Resource {
	name: &'static str,
	fail_enter: bool,
	fail_exit: bool,
	entered: AtomicUsize,
	exited: AtomicUsize,
	exit_reason: Mutex<Option<String>>,
}

impl Resource {
	fn named(name: &'static str) -> Arc<Self> {
		Arc::new(Self { name, ..Self::default() })
	}
}

#[async_trait::async_trait]
impl Disposable for Resource {
	fn name(&self) -> &str {
		self.name
	}

	async fn enter(&self) -> Result<Vec<Record>, BoxError> {
		tokio::task::yield_now().await;
		if self.fail_enter {
			return Err(format!("{} unavailable", self.name).into());
		}
		self.entered.fetch_add(1, Ordering::SeqCst);
		Ok(Vec::new())
	}

	async fn exit(&self, failure: Option<&(dyn std::error::Error + Send + Sync)>) -> Result<(), BoxError> {
		self.exited.fetch_add(1, Ordering::SeqCst);
		*self.exit_reason.lock() = failure.map(ToString::to_string);
		if self.fail_exit {
			return Err(format!("{} leaked", self.name).into());
		}
		Ok(())
	}
}

struct Settle(Arc<AtomicUsize>);

impl Drop for Settle {
	fn drop(&mut self) {
		self.0.fetch_add(1, Ordering::SeqCst);
	}
}

#[tokio::test]
async fn exit_settles_every_task_and_tears_down_every_disposable_once() {
	let resources: Vec<Arc<Resource>> = (0..4)
		.map(|idx| {
			Arc::new(Resource {
				name: ["a", "b", "c", "d"][idx],
				fail_exit: idx % 2 == 1,
				..Resource::default()
			})
		})
		.collect();
	let mut scope = Scope::new("shutdown");
	for resource in &resources {
		scope = scope.shared_disposable(resource.clone());
	}

	let settled = Arc::new(AtomicUsize::new(0));
	let guard = scope.enter().await.unwrap();
	for _ in 0..6 {
		let settle = Settle(Arc::clone(&settled));
		guard.ctx().spawn(async move {
			let _settle = settle;
			tokio::time::sleep(Duration::from_secs(60)).await;
		});
	}
	guard.ctx().spawn_try(async { Err::<(), _>(std::io::Error::other("task broke")) });
	tokio::time::sleep(Duration::from_millis(20)).await;

	let err = guard.exit(None).await.unwrap_err();
	assert_eq!(settled.load(Ordering::SeqCst), 6);
	for resource in &resources {
		assert_eq!(resource.exited.load(Ordering::SeqCst), 1, "{}", resource.name);
	}
	let ScopeError::Failed(group) = err else {
		panic!("expected teardown failures");
	};
	assert_eq!(group.len(), 3);
	assert_eq!(group.iter().filter(|f| matches!(f, Failure::Exit { .. })).count(), 2);
	assert_eq!(group.iter().filter(|f| matches!(f, Failure::Task(_))).count(), 1);
	assert!(group.body().is_none());
}

#[tokio::test]
async fn body_failure_is_reported_first_and_passed_to_teardown() {
	let resource = Resource::named("conn");
	let err = Scope::new("failing")
		.shared_disposable(resource.clone())
		.run(async { Err::<(), _>(std::io::Error::other("request rejected")) })
		.await
		.unwrap_err();

	let group = err.failures();
	assert!(matches!(group.failures[0], Failure::Body(_)));
	assert_eq!(group.body().map(ToString::to_string).as_deref(), Some("request rejected"));
	assert_eq!(resource.exit_reason.lock().as_deref(), Some("request rejected"));
	assert!(err.to_string().contains("request rejected"), "{err}");
}

#[tokio::test]
async fn setup_failure_unwinds_the_entered_disposables() {
	let good = Resource::named("good");
	let bad = Arc::new(Resource {
		name: "bad",
		fail_enter: true,
		..Resource::default()
	});
	let scope = Scope::new("setup").shared_disposable(good.clone()).shared_disposable(bad.clone());
	let err = scope.enter().await.unwrap_err();

	assert!(matches!(err, ScopeError::Enter(_)));
	assert!(err.to_string().contains("bad"), "{err}");
	assert_eq!(good.entered.load(Ordering::SeqCst), good.exited.load(Ordering::SeqCst));
	assert_eq!(bad.exited.load(Ordering::SeqCst), 0);
	assert_eq!(scope.phase(), Phase::Closed);
}

#[tokio::test]
#[should_panic(expected = "entered more than once")]
async fn entering_twice_panics() {
	let scope = Scope::new("once");
	let guard = scope.enter().await.unwrap();
	guard.exit(None).await.unwrap();
	let _ = scope.enter().await;
}

#[tokio::test]
async fn phases_advance_through_the_lifecycle() {
	let scope = Scope::new("phases");
	assert_eq!(scope.phase(), Phase::New);
	let guard = scope.enter().await.unwrap();
	assert_eq!(scope.phase(), Phase::Active);
	guard.exit(None).await.unwrap();
	assert_eq!(scope.phase(), Phase::Closed);
}

async fn settle(resource: &Resource) {
	for _ in 0..200 {
		if resource.exited.load(Ordering::SeqCst) > 0 {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
}

#[tokio::test]
async fn dropping_a_guard_cancels_its_tasks_and_tears_down() {
	let resource = Resource::named("pool");
	let scope = Scope::new("dropped").shared_disposable(resource.clone());
	let guard = scope.enter().await.unwrap();
	let handle = guard.ctx().spawn(std::future::pending::<()>());
	drop(guard);
	assert!(handle.await.unwrap_err().is_cancelled());

	settle(&resource).await;
	assert_eq!(resource.exited.load(Ordering::SeqCst), 1);
	assert!(resource.exit_reason.lock().as_deref().is_some_and(|r| r.contains("cancelled")));
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert_eq!(scope.phase(), Phase::Closed);
}

#[tokio::test]
async fn abandoned_runs_still_exit_their_disposables() {
	let resource = Resource::named("socket");
	let run = Scope::new("abandoned").shared_disposable(resource.clone()).run(async {
		tokio::time::sleep(Duration::from_secs(5)).await;
		Ok::<_, BoxError>(())
	});
	assert!(tokio::time::timeout(Duration::from_millis(20), run).await.is_err());

	settle(&resource).await;
	assert_eq!(resource.entered.load(Ordering::SeqCst), 1);
	assert_eq!(resource.exited.load(Ordering::SeqCst), 1);
}

async fn explode() -> Result<(), BoxError> {
	panic!("boom")
}

#[tokio::test]
async fn panicking_bodies_tear_down_before_unwinding() {
	let resource = Resource::named("file");
	let outcome = tokio::spawn({
		let resource = resource.clone();
		async move { Scope::new("panicking").shared_disposable(resource).run(explode()).await }
	})
	.await;

	assert!(outcome.unwrap_err().is_panic());
	assert_eq!(resource.entered.load(Ordering::SeqCst), 1);
	assert_eq!(resource.exited.load(Ordering::SeqCst), 1);
	assert!(resource.exit_reason.lock().as_deref().is_some_and(|r| r.contains("boom")), "{:?}", resource.exit_reason.lock());
}

#[derive(Default)]
struct Recorder {
	lines: Mutex<Vec<String>>,
}

impl ObservabilitySink for Recorder {
	fn scope_entering(&self, scope: &ScopeIdentifier) {
		self.lines.lock().push(format!("enter {}", scope.path()));
	}

	fn scope_exiting(&self, scope: &ScopeIdentifier, failure: Option<&(dyn std::error::Error + Send + Sync)>) {
		self.lines.lock().push(format!("exit {} failed={}", scope.path(), failure.is_some()));
	}

	fn log(&self, scope: &ScopeIdentifier, level: Level, message: &str, _: Attributes<'_>) {
		self.lines.lock().push(format!("{level} {} {message}", scope.name()));
	}

	fn metric(&self, _: &ScopeIdentifier, name: &str, value: f64, unit: Option<&str>, _: Attributes<'_>) {
		self.lines.lock().push(format!("metric {name}={value}{}", unit.unwrap_or("")));
	}

	fn event(&self, _: &ScopeIdentifier, name: &str, attributes: Attributes<'_>) {
		self.lines.lock().push(format!("event {name} {}", attributes.len()));
	}

	fn attributes(&self, _: &ScopeIdentifier, attributes: Attributes<'_>) {
		let keys: Vec<&str> = attributes.iter().map(|(key, _)| *key).collect();
		self.lines.lock().push(format!("attributes {}", keys.join(",")));
	}
}

#[tokio::test]
async fn observability_follows_the_scope_tree() {
	let recorder = Arc::new(Recorder::default());
	Scope::root("app")
		.observability(recorder.clone())
		.run(async {
			ctx::log_info("starting");
			ctx::record_metric("latency", 2.5, Some("ms"), &[]);
			Scope::new("request")
				.run(async {
					ctx::log_warning("slow");
					ctx::record_event("retry", &[("attempt", 2i64.into())]);
					ctx::record_attributes(&[("user", "ada".into())]);
					Ok::<_, BoxError>(())
				})
				.await?;
			Ok::<_, BoxError>(())
		})
		.await
		.unwrap();

	assert_eq!(
		*recorder.lines.lock(),
		vec![
			"enter app",
			"info app starting",
			"metric latency=2.5ms",
			"enter app/request",
			"warning request slow",
			"event retry 1",
			"attributes user",
			"exit app/request failed=false",
			"exit app failed=false",
		]
	);
}

#[tokio::test]
#[should_panic(expected = "already overridden")]
async fn nested_observability_overrides_panic() {
	let _ = Scope::root("app")
		.observability(Arc::new(Recorder::default()))
		.run(async {
			Scope::new("inner").observability(Arc::new(Recorder::default())).run(async { Ok::<_, BoxError>(()) }).await?;
			Ok::<_, BoxError>(())
		})
		.await;
}

#[tokio::test]
async fn trace_ids_are_shared_below_a_root_and_fresh_per_root() {
	let (outer, inner, other) = Scope::root("app")
		.run(async {
			let outer = ctx::trace_id()?;
			let inner = Scope::new("child").run(async { Ok::<_, BoxError>(ctx::trace_id()?) }).await?;
			let other = Scope::root("detached").run(async { Ok::<_, BoxError>(ctx::trace_id()?) }).await?;
			Ok::<_, BoxError>((outer, inner, other))
		})
		.await
		.unwrap();
	assert_eq!(outer, inner);
	assert_ne!(outer, other);
}
