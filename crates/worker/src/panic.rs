use std::any::Any;

use tokio::task::JoinError;

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		(*msg).to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

/// Returns the panic message of a failed join, or `None` if the task was
/// aborted instead.
pub fn join_error_panic_message(err: JoinError) -> Option<String> {
	err.try_into_panic().ok().map(|payload| panic_message(payload.as_ref()))
}

#[cfg(test)]
#[path = "panic_tests.rs"]
mod tests;
