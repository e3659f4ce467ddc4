//! Root-scoped publish/subscribe bus keyed by exact schema identity.
//!
//! Delivery is ephemeral: events reach the subscribers registered at the
//! moment of sending and are never stored for later ones. Each subscriber
//! owns a bounded queue; a full queue drops the event for that subscriber
//! only.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::Stream;
use keel_state::{Record, Schema, SchemaId};
use keel_worker::CancelToken;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Default per-subscriber queue capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

type Subscribers = HashMap<SchemaId, Vec<(u64, mpsc::Sender<Record>)>>;

struct BusInner {
	subscribers: Mutex<Subscribers>,
	next_id: AtomicU64,
	capacity: usize,
}

/// Event bus shared by every scope under one root.
#[derive(Clone)]
pub struct EventBus {
	inner: Arc<BusInner>,
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_EVENT_CAPACITY)
	}
}

impl EventBus {
	/// Creates a bus whose subscriber queues hold `capacity` events.
	///
	/// # Panics
	///
	/// Panics if `capacity` is zero.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "event bus capacity must be positive");
		Self {
			inner: Arc::new(BusInner {
				subscribers: Mutex::new(HashMap::new()),
				next_id: AtomicU64::new(1),
				capacity,
			}),
		}
	}

	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}

	/// Delivers `event` to every subscriber of its schema and returns how
	/// many queues accepted it.
	///
	/// Subscribers whose receiving side is gone are removed here as well as
	/// on drop.
	pub fn send(&self, event: Record) -> usize {
		let schema = event.schema().id();
		let mut subscribers = self.inner.subscribers.lock();
		let Some(queues) = subscribers.get_mut(&schema) else {
			tracing::trace!(schema = %event.schema().name(), "event_bus.no_subscribers");
			return 0;
		};
		let mut delivered = 0;
		queues.retain(|(id, tx)| match tx.try_send(event.clone()) {
			Ok(()) => {
				delivered += 1;
				true
			}
			Err(mpsc::error::TrySendError::Full(_)) => {
				tracing::warn!(schema = %event.schema().name(), subscriber = *id, "event_bus.subscriber_full");
				true
			}
			Err(mpsc::error::TrySendError::Closed(_)) => false,
		});
		if queues.is_empty() {
			subscribers.remove(&schema);
		}
		tracing::trace!(schema = %event.schema().name(), delivered, "event_bus.send");
		delivered
	}

	/// Registers a queue for events of exactly `schema`.
	///
	/// The subscription ends when dropped, closed, or when `token` is
	/// cancelled.
	pub fn subscribe(&self, schema: &Schema, token: Option<CancelToken>) -> Subscription {
		let (tx, rx) = mpsc::channel(self.inner.capacity);
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		self.inner.subscribers.lock().entry(schema.id()).or_default().push((id, tx));
		tracing::debug!(schema = %schema.name(), subscriber = id, "event_bus.subscribe");
		Subscription {
			bus: self.clone(),
			schema: schema.id(),
			id,
			rx,
			token,
			open: true,
		}
	}

	/// Number of live subscribers for `schema`.
	pub fn subscriber_count(&self, schema: &Schema) -> usize {
		self.inner.subscribers.lock().get(&schema.id()).map_or(0, Vec::len)
	}

	fn remove(&self, schema: SchemaId, id: u64) {
		let mut subscribers = self.inner.subscribers.lock();
		if let Some(queues) = subscribers.get_mut(&schema) {
			queues.retain(|(queued, _)| *queued != id);
			if queues.is_empty() {
				subscribers.remove(&schema);
			}
		}
	}
}

impl std::fmt::Debug for EventBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let subscribers = self.inner.subscribers.lock();
		f.debug_struct("EventBus")
			.field("schemas", &subscribers.len())
			.field("subscribers", &subscribers.values().map(Vec::len).sum::<usize>())
			.field("capacity", &self.inner.capacity)
			.finish()
	}
}

/// Single-consumer queue of events for one schema.
pub struct Subscription {
	bus: EventBus,
	schema: SchemaId,
	id: u64,
	rx: mpsc::Receiver<Record>,
	token: Option<CancelToken>,
	open: bool,
}

impl Subscription {
	/// Waits for the next event. Returns `None` once the subscription has
	/// ended; it never yields again afterwards.
	pub async fn next(&mut self) -> Option<Record> {
		if !self.open {
			return None;
		}
		let received = match &self.token {
			Some(token) => token.run_until_cancelled(self.rx.recv()).await.flatten(),
			None => self.rx.recv().await,
		};
		if received.is_none() {
			self.close();
		}
		received
	}

	/// Takes an already queued event without waiting.
	pub fn try_next(&mut self) -> Option<Record> {
		if !self.open {
			return None;
		}
		self.rx.try_recv().ok()
	}

	/// Turns the subscription into a stream that ends with it.
	pub fn into_stream(self) -> impl Stream<Item = Record> + Send + 'static {
		futures::stream::unfold(self, |mut subscription| async move {
			let event = subscription.next().await?;
			Some((event, subscription))
		})
	}

	/// Deregisters the queue. Already queued events are discarded.
	pub fn close(&mut self) {
		if std::mem::replace(&mut self.open, false) {
			self.rx.close();
			self.bus.remove(self.schema, self.id);
			tracing::debug!(subscriber = self.id, "event_bus.unsubscribe");
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.close();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription").field("id", &self.id).field("open", &self.open).finish()
	}
}

#[cfg(test)]
mod tests {
	use futures::StreamExt;
	use keel_state::{SchemaRegistry, TypeExpr, Value};

	use super::*;

	fn schemas() -> (Schema, Schema) {
		let registry = SchemaRegistry::new();
		let ping = Schema::builder("Ping").field("n", TypeExpr::Int).build_in(&registry).unwrap();
		let pong = Schema::builder("Pong").field("n", TypeExpr::Int).build_in(&registry).unwrap();
		(ping, pong)
	}

	fn event(schema: &Schema, n: i64) -> Record {
		schema.construct([("n", Value::Int(n))]).unwrap()
	}

	#[tokio::test]
	async fn delivers_by_exact_schema_in_send_order() {
		let (ping, pong) = schemas();
		let bus = EventBus::default();
		let mut pings = bus.subscribe(&ping, None);
		let mut pongs = bus.subscribe(&pong, None);

		assert_eq!(bus.send(event(&ping, 1)), 1);
		assert_eq!(bus.send(event(&ping, 2)), 1);
		assert_eq!(pings.next().await.unwrap().get("n"), Some(&Value::Int(1)));
		assert_eq!(pings.next().await.unwrap().get("n"), Some(&Value::Int(2)));
		assert!(pongs.try_next().is_none());
	}

	#[tokio::test]
	async fn events_without_subscribers_are_dropped() {
		let (ping, _) = schemas();
		let bus = EventBus::default();
		assert_eq!(bus.send(event(&ping, 1)), 0);
		let mut late = bus.subscribe(&ping, None);
		assert!(late.try_next().is_none());
	}

	#[tokio::test]
	async fn dropping_a_subscription_deregisters_it() {
		let (ping, _) = schemas();
		let bus = EventBus::default();
		let first = bus.subscribe(&ping, None);
		let second = bus.subscribe(&ping, None);
		assert_eq!(bus.subscriber_count(&ping), 2);
		drop(first);
		assert_eq!(bus.subscriber_count(&ping), 1);
		drop(second);
		assert_eq!(bus.subscriber_count(&ping), 0);
	}

	#[tokio::test]
	async fn full_queues_drop_only_for_that_subscriber() {
		let (ping, _) = schemas();
		let bus = EventBus::new(1);
		let mut slow = bus.subscribe(&ping, None);
		let mut fast = bus.subscribe(&ping, None);
		assert_eq!(bus.send(event(&ping, 1)), 2);
		assert!(fast.try_next().is_some());
		assert_eq!(bus.send(event(&ping, 2)), 1);
		assert_eq!(slow.try_next().unwrap().get("n"), Some(&Value::Int(1)));
		assert!(slow.try_next().is_none());
		assert_eq!(fast.try_next().unwrap().get("n"), Some(&Value::Int(2)));
	}

	#[tokio::test]
	async fn cancellation_ends_the_stream_and_deregisters() {
		let (ping, _) = schemas();
		let bus = EventBus::default();
		let token = CancelToken::new(1);
		let stream = bus.subscribe(&ping, Some(token.clone())).into_stream();
		bus.send(event(&ping, 7));
		token.cancel();
		let collected: Vec<Record> = stream.collect().await;
		assert!(collected.len() <= 1);
		assert_eq!(bus.subscriber_count(&ping), 0);
	}
}
