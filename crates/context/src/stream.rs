//! Streams polled under a scope's context.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use keel_worker::WaitForCancellationFutureOwned;

use crate::context::{CURRENT, Ctx};

pin_project_lite::pin_project! {
	/// Stream adapter that installs a scope context around every poll of
	/// the inner stream and ends once that scope's unit of work is
	/// cancelled.
	///
	/// Values are pulled on the caller's task; nothing is spawned.
	#[must_use = "streams do nothing unless polled"]
	pub struct ScopedStream<S> {
		ctx: Ctx,
		#[pin]
		inner: S,
		#[pin]
		cancelled: WaitForCancellationFutureOwned,
		done: bool,
	}
}

impl<S> ScopedStream<S> {
	pub(crate) fn new(ctx: Ctx, inner: S) -> Self {
		let cancelled = ctx.token.cancelled_owned();
		Self {
			ctx,
			inner,
			cancelled,
			done: false,
		}
	}

	pub fn ctx(&self) -> &Ctx {
		&self.ctx
	}
}

impl<S: Stream> Stream for ScopedStream<S> {
	type Item = S::Item;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S::Item>> {
		let this = self.project();
		if *this.done {
			return Poll::Ready(None);
		}
		if this.cancelled.poll(cx).is_ready() {
			tracing::debug!(scope = %this.ctx.scope, "scope.stream_cancelled");
			*this.done = true;
			return Poll::Ready(None);
		}
		let inner = this.inner;
		let polled = CURRENT.sync_scope(this.ctx.clone(), || inner.poll_next(cx));
		if let Poll::Ready(None) = polled {
			*this.done = true;
		}
		polled
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		if self.done { (0, Some(0)) } else { (0, self.inner.size_hint().1) }
	}
}
