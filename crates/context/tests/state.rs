use keel_context::{BoxError, ContextError, Disposable, Preset, Scope, ctx};
use keel_state::{DefaultValue, Record, Schema, SchemaRegistry, TypeExpr, Value};
use pretty_assertions::assert_eq;

struct Schemas {
	config: Schema,
	endpoint: Schema,
}

fn schemas() -> Schemas {
	let registry = SchemaRegistry::new();
	Schemas {
		config: Schema::builder("Config")
			.field_with("retries", TypeExpr::Int, DefaultValue::value(3))
			.build_in(&registry)
			.unwrap(),
		endpoint: Schema::builder("Endpoint").field("url", TypeExpr::Str).build_in(&registry).unwrap(),
	}
}

fn config(schema: &Schema, retries: i64) -> Record {
	schema.construct([("retries", Value::Int(retries))]).unwrap()
}

fn retries(record: &Record) -> Option<i64> {
	match record.get("retries") {
		Some(Value::Int(n)) => Some(*n),
		_ => None,
	}
}

struct Produces(Record);

#[async_trait::async_trait]
impl Disposable for Produces {
	async fn enter(&self) -> Result<Vec<Record>, BoxError> {
		Ok(vec![self.0.clone()])
	}

	async fn exit(&self, _failure: Option<&(dyn std::error::Error + Send + Sync)>) -> Result<(), BoxError> {
		Ok(())
	}
}

#[tokio::test]
async fn explicit_state_beats_disposables_presets_and_parents() {
	let s = schemas();
	let preset = Preset::new("defaults").with_state(config(&s.config, 1));
	let outer = Scope::new("outer").state(config(&s.config, 10));

	let seen = outer
		.run(async {
			let parent = retries(&ctx::state(&s.config)?);
			let preset_only = Scope::new("preset")
				.preset(preset.clone())
				.run(async { Ok::<_, ContextError>(retries(&ctx::state(&s.config)?)) })
				.await?;
			let disposable = Scope::new("disposable")
				.preset(preset.clone())
				.disposable(Produces(config(&s.config, 2)))
				.run(async { Ok::<_, ContextError>(retries(&ctx::state(&s.config)?)) })
				.await?;
			let explicit = Scope::new("explicit")
				.preset(preset.clone())
				.disposable(Produces(config(&s.config, 2)))
				.state(config(&s.config, 3))
				.run(async { Ok::<_, ContextError>(retries(&ctx::state(&s.config)?)) })
				.await?;
			let inherited = Scope::new("inherited").run(async { Ok::<_, ContextError>(retries(&ctx::state(&s.config)?)) }).await?;
			Ok::<_, BoxError>([parent, preset_only, disposable, explicit, inherited])
		})
		.await
		.unwrap();

	assert_eq!(seen, [Some(10), Some(1), Some(2), Some(3), Some(10)]);
}

#[tokio::test]
async fn preset_disposables_land_in_the_preset_tier() {
	let s = schemas();
	let preset = Preset::new("db").with_disposable(Produces(config(&s.config, 7)));
	let seen = Scope::new("root")
		.preset(preset)
		.disposable(Produces(config(&s.config, 8)))
		.run(async { Ok::<_, ContextError>(retries(&ctx::state(&s.config)?)) })
		.await
		.unwrap();
	assert_eq!(seen, Some(8));
}

#[tokio::test]
async fn defaults_are_synthesized_and_missing_state_is_named() {
	let s = schemas();
	Scope::root("app")
		.run(async {
			assert!(!ctx::check_state(&s.config, false)?);
			assert!(ctx::check_state(&s.config, true)?);
			assert_eq!(retries(&ctx::state(&s.config)?), Some(3));
			assert!(!ctx::check_state(&s.config, false)?);

			let err = ctx::state(&s.endpoint).unwrap_err();
			assert!(err.is_missing_state());
			assert!(err.to_string().contains("`Endpoint`"), "{err}");
			assert!(err.to_string().contains("`app`"), "{err}");
			Ok::<_, ContextError>(())
		})
		.await
		.unwrap();
}

#[tokio::test]
async fn lookups_outside_a_scope_report_missing_context() {
	let s = schemas();
	assert!(matches!(ctx::state(&s.config), Err(ContextError::MissingContext)));
	assert!(matches!(ctx::check_state(&s.config, true), Err(ContextError::MissingContext)));
	assert!(matches!(ctx::current(), Err(ContextError::MissingContext)));
}

#[tokio::test]
async fn spawned_tasks_resolve_through_the_spawning_scope() {
	let s = schemas();
	let seen = Scope::new("root")
		.state(config(&s.config, 4))
		.run(async {
			let schema = s.config.clone();
			let handle = ctx::spawn(async move {
				let inner = Scope::new("task-child").run(async { Ok::<_, ContextError>(ctx::scope_name()?) }).await?;
				let record = ctx::state(&schema)?;
				Ok::<_, BoxError>((retries(&record), inner))
			});
			Ok::<_, BoxError>(handle.await??)
		})
		.await
		.unwrap();
	assert_eq!(seen, (Some(4), "task-child".to_string()));
}

#[tokio::test]
async fn explicit_handles_carry_the_same_state() {
	let s = schemas();
	let guard = Scope::new("manual").state(config(&s.config, 5)).enter().await.unwrap();
	let ctx = guard.ctx().clone();
	assert_eq!(retries(&ctx.state(&s.config).unwrap()), Some(5));
	assert_eq!(ctx.scope().path(), "manual");
	assert!(ctx.check_state(&s.config, false));
	guard.exit(None).await.unwrap();
}
