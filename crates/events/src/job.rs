//! Per-(job, event)-type handler for batch reduction dispatch.
//!
//! Flush here is two-phase: every pending event is folded into the
//! accumulator of each subscriber whose target matches, then each completion
//! callback runs exactly once with its finished accumulator. The fold is the
//! only place the bus spawns threads: batches above the configured threshold
//! are chunked across scoped workers, each folding a [`Default`] partial,
//! with partials merged in chunk order after the join barrier.

use std::any::Any;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::dispatch::ErasedHandler;
use crate::error::{BusError, Result};
use crate::event::{CallbackId, Event, EventJob, JobCallback, QueuedEvent};
use crate::target::Target;

/// Controls when a flush's reduction pass goes parallel.
#[derive(Debug, Clone, Copy)]
pub struct ReduceConfig {
	/// Upper bound on reduction workers per batch.
	pub max_workers: usize,
	/// Minimum events per worker before another worker is added.
	///
	/// Folding a small `Copy` payload is cheap, so the default keeps small
	/// batches on the flushing thread. Tune down for jobs whose `execute`
	/// does real work per event.
	pub min_events_per_worker: usize,
}

impl Default for ReduceConfig {
	fn default() -> Self {
		Self {
			max_workers: std::thread::available_parallelism().map_or(1, |threads| threads.get()),
			min_events_per_worker: 512,
		}
	}
}

impl ReduceConfig {
	/// Keeps every reduction on the flushing thread.
	pub fn sequential() -> Self {
		Self {
			max_workers: 1,
			min_events_per_worker: usize::MAX,
		}
	}

	fn worker_count(&self, batch_len: usize) -> usize {
		(batch_len / self.min_events_per_worker.max(1)).clamp(1, self.max_workers.max(1))
	}
}

/// One job subscriber: the live accumulator plus its completion callback.
struct JobSubscriber<J> {
	target: Target,
	job: J,
	on_complete: JobCallback<J>,
	id: CallbackId,
}

/// Handler for one (job type, event type) pair.
///
/// Subscription binds (target, seed accumulator, completion callback); the
/// accumulator is mutated in place across flushes and dropped with the entry
/// on unsubscribe.
pub(crate) struct JobHandler<J, E> {
	subscribers: Vec<JobSubscriber<J>>,
	/// O(1) duplicate detection over (target, completion-callback identity).
	index: FxHashSet<(Target, CallbackId)>,
	pending: Vec<QueuedEvent<E>>,
	config: ReduceConfig,
}

impl<J: EventJob<E>, E: Event> JobHandler<J, E> {
	pub fn new(config: ReduceConfig) -> Self {
		Self {
			subscribers: Vec::new(),
			index: FxHashSet::default(),
			pending: Vec::new(),
			config,
		}
	}

	/// Registers `on_complete` under `target` with `job` as the seed
	/// accumulator.
	///
	/// Fails with [`BusError::DuplicateSubscription`] when the
	/// (target, callback) pair is already registered; the existing entry and
	/// its accumulator are left unchanged.
	pub fn subscribe(&mut self, target: Target, job: J, on_complete: JobCallback<J>) -> Result<()> {
		let id = CallbackId::of(&on_complete);
		if !self.index.insert((target, id)) {
			return Err(BusError::DuplicateSubscription {
				event_type: std::any::type_name::<E>(),
				target,
			});
		}
		self.subscribers.push(JobSubscriber {
			target,
			job,
			on_complete,
			id,
		});
		Ok(())
	}

	/// Removes by (target, completion callback) identity, independent of the
	/// accumulator value, which is dropped with the entry. Absent pairs are
	/// a no-op.
	pub fn unsubscribe(&mut self, target: Target, on_complete: &JobCallback<J>) {
		let id = CallbackId::of(on_complete);
		if self.index.remove(&(target, id))
			&& let Some(position) = self
				.subscribers
				.iter()
				.position(|sub| sub.target == target && sub.id == id)
		{
			self.subscribers.remove(position);
		}
	}

	pub fn enqueue(&mut self, target: Target, event: E) {
		self.pending.push(QueuedEvent { target, event });
	}
}

impl<J: EventJob<E>, E: Event> ErasedHandler for JobHandler<J, E> {
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
		let pending = std::mem::take(&mut self.pending);

		// Bucket events by target, only for targets somebody subscribed to;
		// the rest of the batch is dropped like ordinary no-subscriber events.
		let mut buckets: FxHashMap<Target, Vec<E>> = FxHashMap::default();
		for sub in &self.subscribers {
			buckets.entry(sub.target).or_default();
		}
		for record in &pending {
			if let Some(bucket) = buckets.get_mut(&record.target) {
				bucket.push(record.event);
			}
		}

		for sub in &mut self.subscribers {
			let batch = buckets.get(&sub.target).map_or(&[][..], Vec::as_slice);
			sub.job = reduce(sub.job, batch, self.config);
		}

		// Completion runs only after every reduction has joined.
		let mut completions = 0u64;
		for sub in &self.subscribers {
			(sub.on_complete)(sub.job);
			completions += 1;
		}

		self.pending = pending;
		self.pending.clear();
		completions
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
		Some(std::any::type_name::<J>())
	}

	fn subscriber_targets(&self) -> Vec<Target> {
		self.subscribers.iter().map(|sub| sub.target).collect()
	}
}

/// Folds `events` into `seed`, going wide when the batch justifies it.
fn reduce<J: EventJob<E>, E: Event>(seed: J, events: &[E], config: ReduceConfig) -> J {
	let workers = config.worker_count(events.len());
	if workers == 1 {
		return reduce_sequential(seed, events);
	}

	let events_per_worker = events.len().div_ceil(workers);
	let mut accumulator = seed;
	std::thread::scope(|scope| {
		let mut tasks = Vec::with_capacity(workers);
		for chunk in events.chunks(events_per_worker) {
			tasks.push(scope.spawn(move || {
				let mut partial = J::default();
				for &event in chunk {
					partial.execute(event);
				}
				partial
			}));
		}

		// Join in chunk order; merge order is deterministic either way since
		// the job contract demands associativity.
		for task in tasks {
			accumulator.merge(task.join().expect("reduction worker panicked"));
		}
	});
	accumulator
}

fn reduce_sequential<J: EventJob<E>, E: Event>(mut accumulator: J, events: &[E]) -> J {
	for &event in events {
		accumulator.execute(event);
	}
	accumulator
}
