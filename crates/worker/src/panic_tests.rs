use std::panic::{AssertUnwindSafe, catch_unwind};

use super::{join_error_panic_message, panic_message};

fn caught(f: impl FnOnce()) -> String {
	let payload = catch_unwind(AssertUnwindSafe(f)).unwrap_err();
	panic_message(payload.as_ref())
}

#[test]
fn payload_kinds_map_to_messages() {
	assert_eq!(caught(|| panic!("static")), "static");
	assert_eq!(caught(|| panic!("{}-{}", "formatted", 3)), "formatted-3");
	assert_eq!(caught(|| std::panic::panic_any(7_u32)), "non-string panic payload");
}

#[tokio::test]
async fn joined_panics_keep_their_message() {
	let handle = tokio::spawn(async { panic!("{}", String::from("task exploded")) });
	let err = handle.await.unwrap_err();
	assert_eq!(join_error_panic_message(err).as_deref(), Some("task exploded"));
}

#[tokio::test]
async fn aborted_tasks_have_no_message() {
	let handle = tokio::spawn(std::future::pending::<()>());
	handle.abort();
	let err = handle.await.unwrap_err();
	assert!(join_error_panic_message(err).is_none());
}
