//! Per-event-type handler for ordinary callback dispatch.

use std::any::Any;

use rustc_hash::FxHashSet;

use crate::dispatch::ErasedHandler;
use crate::error::{BusError, Result};
use crate::event::{Callback, CallbackId, Event, QueuedEvent};
use crate::target::Target;

/// One subscriber entry: the callback plus the target scoping it.
struct Subscriber<E> {
	target: Target,
	callback: Callback<E>,
	id: CallbackId,
}

/// Handler for one event payload type.
///
/// Owns the subscriber list (subscription order preserved) and the pending
/// queue. Dispatch happens only at [`flush`](Self::flush); `enqueue` never
/// invokes callbacks.
pub(crate) struct StandardHandler<E> {
	subscribers: Vec<Subscriber<E>>,
	/// O(1) duplicate detection over (target, callback identity).
	index: FxHashSet<(Target, CallbackId)>,
	pending: Vec<QueuedEvent<E>>,
}

impl<E: Event> StandardHandler<E> {
	pub fn new() -> Self {
		Self {
			subscribers: Vec::new(),
			index: FxHashSet::default(),
			pending: Vec::new(),
		}
	}

	/// Registers `callback` under `target`.
	///
	/// Fails with [`BusError::DuplicateSubscription`] when the pair is
	/// already registered; the failed call leaves the handler unchanged.
	pub fn subscribe(&mut self, target: Target, callback: Callback<E>) -> Result<()> {
		let id = CallbackId::of(&callback);
		if !self.index.insert((target, id)) {
			return Err(BusError::DuplicateSubscription {
				event_type: std::any::type_name::<E>(),
				target,
			});
		}
		self.subscribers.push(Subscriber {
			target,
			callback,
			id,
		});
		Ok(())
	}

	/// Removes the (target, callback) pair. Absent pairs are a no-op.
	pub fn unsubscribe(&mut self, target: Target, callback: &Callback<E>) {
		let id = CallbackId::of(callback);
		if self.index.remove(&(target, id))
			&& let Some(position) = self
				.subscribers
				.iter()
				.position(|sub| sub.target == target && sub.id == id)
		{
			// Shift-remove keeps subscription order for the survivors.
			self.subscribers.remove(position);
		}
	}

	/// Appends a (target, event) record to the pending queue.
	pub fn enqueue(&mut self, target: Target, event: E) {
		self.pending.push(QueuedEvent { target, event });
	}
}

impl<E: Event> ErasedHandler for StandardHandler<E> {
	fn enqueue_erased(&mut self, target: Target, event: &dyn Any) {
		let event = event
			.downcast_ref::<E>()
			.expect("queued event type does not match handler");
		self.enqueue(target, *event);
	}

	fn flush(&mut self) -> u64 {
		if self.pending.is_empty() {
			return 0;
		}
		// The queue is taken before dispatch: a panicking callback drops the
		// rest of the batch instead of leaving it queued for the next tick.
		let pending = std::mem::take(&mut self.pending);

		let mut dispatched = 0u64;
		for record in &pending {
			for sub in &self.subscribers {
				if sub.target == record.target {
					(sub.callback)(record.event);
					dispatched += 1;
				}
			}
		}

		// Hand the drained allocation back for the next tick.
		self.pending = pending;
		self.pending.clear();
		dispatched
	}

	fn reset(&mut self) {
		self.subscribers.clear();
		self.index.clear();
		self.pending.clear();
	}

	fn subscriber_count(&self) -> usize {
		self.subscribers.len()
	}

	fn event_type(&self) -> &'static str {
		std::any::type_name::<E>()
	}

	fn job_type(&self) -> Option<&'static str> {
		None
	}

	fn subscriber_targets(&self) -> Vec<Target> {
		self.subscribers.iter().map(|sub| sub.target).collect()
	}
}
