use std::io;

/// Scheduler used for a runtime built by [`build_runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeFlavor {
	/// One thread, cooperative switching at suspension points only.
	#[default]
	CurrentThread,
	/// Work-stealing pool with `workers` threads.
	MultiThread { workers: usize },
}

impl RuntimeFlavor {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::CurrentThread => "current_thread",
			Self::MultiThread { .. } => "multi_thread",
		}
	}
}

/// Builds a tokio runtime with timers enabled.
pub fn build_runtime(flavor: RuntimeFlavor, thread_name: &str) -> io::Result<tokio::runtime::Runtime> {
	tracing::debug!(flavor = flavor.as_str(), thread_name, "worker.runtime.build");
	match flavor {
		RuntimeFlavor::CurrentThread => tokio::runtime::Builder::new_current_thread().enable_time().build(),
		RuntimeFlavor::MultiThread { workers } => tokio::runtime::Builder::new_multi_thread()
			.enable_time()
			.worker_threads(workers.max(1))
			.thread_name(thread_name)
			.build(),
	}
}
