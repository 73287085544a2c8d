//! Event and job payload contracts, callback aliases, and callback identity.

use std::sync::Arc;

use crate::target::Target;

/// Marker for event payload types.
///
/// Payloads are copied into the pending queue at send time and again into
/// each reduction worker, so they must be plain values: `Copy`,
/// thread-portable, and free of borrowed data. The bound is
/// blanket-implemented; a type that owns heap data (`String`, `Vec`) or
/// borrows non-`'static` data is rejected by the compiler at the first
/// subscribe or send that names it.
pub trait Event: Copy + Send + Sync + 'static {}

impl<T: Copy + Send + Sync + 'static> Event for T {}

/// Batch-reduction job folded over one flush's events.
///
/// At flush, every queued event whose target matches a subscriber is folded
/// into that subscriber's accumulator with [`execute`](Self::execute). Large
/// batches are chunked across worker threads: each worker folds its chunk
/// into a `Default::default()` partial, and partials are combined with
/// [`merge`](Self::merge) after all workers join. `Default` must therefore
/// be the identity of the reduction, and `execute`/`merge` must be
/// associative and order-insensitive, since worker interleaving is not
/// guaranteed.
///
/// The accumulator is the job value itself and is never cleared by the bus
/// between flushes. A subscriber that wants per-flush aggregates either
/// derives them from deltas in its completion callback or re-seeds by
/// unsubscribing and subscribing again.
pub trait EventJob<E: Event>: Copy + Default + Send + Sync + 'static {
	/// Folds one event into the accumulator.
	fn execute(&mut self, event: E);

	/// Combines a partial accumulator produced by another worker.
	fn merge(&mut self, other: Self);
}

/// Subscriber callback for ordinary dispatch.
///
/// Held and compared by `Arc` identity: the `Arc` passed to subscribe is the
/// token for unsubscribe, and subscribing the same `Arc` twice under one
/// target is a duplicate. Two separately-allocated closures with identical
/// bodies are distinct subscribers. Bind as the alias so clones and borrows
/// keep the erased type:
///
/// ```
/// use std::sync::Arc;
/// use tickbus_events::Callback;
///
/// let on_hit: Callback<u32> = Arc::new(|amount| {
/// 	let _ = amount;
/// });
/// ```
pub type Callback<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Completion callback for job dispatch, receiving the finished accumulator.
///
/// Identity semantics match [`Callback`].
pub type JobCallback<J> = Arc<dyn Fn(J) + Send + Sync>;

/// Stable identity of a callback `Arc`: the address of its allocation.
///
/// Addresses stay valid as identities for as long as the subscription holds
/// its `Arc` alive; entries are removed before the `Arc` can be dropped, so
/// a recycled allocation can never collide with a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CallbackId(usize);

impl CallbackId {
	pub(crate) fn of<T: ?Sized>(callback: &Arc<T>) -> CallbackId {
		CallbackId(Arc::as_ptr(callback).cast::<()>() as usize)
	}
}

/// A (target, payload) record awaiting flush.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueuedEvent<E> {
	pub target: Target,
	pub event: E,
}
