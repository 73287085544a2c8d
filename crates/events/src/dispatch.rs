//! Type-erased handler registry and dispatch fabric for one phase.
//!
//! Handlers are created lazily, exactly once per type, and live for the
//! dispatcher's lifetime (reset clears their contents, not the registry).
//! The creation-ordered list drives flush/reset/leak iteration; the
//! `TypeId`-keyed maps serve resolution, each fronted by a single-entry MRU
//! slot so repeated same-type traffic skips the map probe entirely.

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{BusError, Result};
use crate::event::{Callback, Event, EventJob, JobCallback};
use crate::job::{JobHandler, ReduceConfig};
use crate::standard::StandardHandler;
use crate::target::Target;

/// Type-erased face of a handler, for uniform iteration in creation order.
pub(crate) trait ErasedHandler: Any + Send + Sync {
	/// Queues a payload whose concrete type matches this handler's event
	/// type; used by the job fan-out path.
	fn enqueue_erased(&mut self, target: Target, event: &dyn Any);
	/// Dispatches everything pending; returns callback invocations run.
	fn flush(&mut self) -> u64;
	/// Drops all subscribers and pending events.
	fn reset(&mut self);
	/// Live subscription count.
	fn subscriber_count(&self) -> usize;
	/// Event type this handler dispatches (diagnostics).
	fn event_type(&self) -> &'static str;
	/// Job type for reduction handlers, `None` for ordinary dispatch.
	fn job_type(&self) -> Option<&'static str>;
	/// Targets with live subscriptions, in subscription order (diagnostics).
	fn subscriber_targets(&self) -> Vec<Target>;
}

/// Indices of the job handlers fed by one event type.
type FanOut = SmallVec<[usize; 4]>;

/// Dispatch totals for one phase since bus creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
	/// Events accepted by `send`.
	pub enqueued_total: u64,
	/// Callback invocations run by flushes (ordinary dispatches plus job
	/// completions).
	pub dispatched_total: u64,
	/// Flush passes run, counting empty ones.
	pub flushes_total: u64,
}

/// One phase's handler registry.
pub(crate) struct Dispatcher {
	/// Phase label carried into log events.
	label: &'static str,
	/// Every handler ever created, in creation order.
	handlers: Vec<Box<dyn ErasedHandler>>,
	/// Event type → index of its ordinary handler.
	standard: FxHashMap<TypeId, usize>,
	/// (job type, event type) → index of the job handler.
	jobs: FxHashMap<(TypeId, TypeId), usize>,
	/// Event type → every job handler fed by it.
	fan_out: FxHashMap<TypeId, FanOut>,
	/// MRU slot for ordinary resolution.
	last_standard: Option<(TypeId, usize)>,
	/// MRU slot for job resolution.
	last_job: Option<((TypeId, TypeId), usize)>,
	/// MRU slot for the enqueue fan-out list.
	last_fan_out: Option<(TypeId, FanOut)>,
	config: ReduceConfig,
	stats: BusStats,
}

impl Dispatcher {
	pub fn new(label: &'static str, config: ReduceConfig) -> Self {
		Self {
			label,
			handlers: Vec::new(),
			standard: FxHashMap::default(),
			jobs: FxHashMap::default(),
			fan_out: FxHashMap::default(),
			last_standard: None,
			last_job: None,
			last_fan_out: None,
			config,
			stats: BusStats::default(),
		}
	}

	/// Index of the ordinary handler for `E`, creating it on first use.
	fn standard_index<E: Event>(&mut self) -> usize {
		let type_id = TypeId::of::<E>();
		if let Some((cached, index)) = self.last_standard
			&& cached == type_id
		{
			return index;
		}

		let index = match self.standard.get(&type_id) {
			Some(&index) => index,
			None => {
				let index = self.handlers.len();
				self.handlers.push(Box::new(StandardHandler::<E>::new()));
				self.standard.insert(type_id, index);
				tracing::debug!(
					phase = self.label,
					event = std::any::type_name::<E>(),
					index,
					"bus.handler.created"
				);
				index
			}
		};
		self.last_standard = Some((type_id, index));
		index
	}

	/// Index of the job handler for `(J, E)`, creating and fan-out-indexing
	/// it on first use.
	fn job_index<J: EventJob<E>, E: Event>(&mut self) -> usize {
		let key = (TypeId::of::<J>(), TypeId::of::<E>());
		if let Some((cached, index)) = self.last_job
			&& cached == key
		{
			return index;
		}

		let index = match self.jobs.get(&key) {
			Some(&index) => index,
			None => {
				let index = self.handlers.len();
				self.handlers.push(Box::new(JobHandler::<J, E>::new(self.config)));
				self.jobs.insert(key, index);
				self.fan_out.entry(key.1).or_default().push(index);
				// The cached fan-out list for this event type just grew.
				if let Some((cached, _)) = &self.last_fan_out
					&& *cached == key.1
				{
					self.last_fan_out = None;
				}
				tracing::debug!(
					phase = self.label,
					job = std::any::type_name::<J>(),
					event = std::any::type_name::<E>(),
					index,
					"bus.handler.created"
				);
				index
			}
		};
		self.last_job = Some((key, index));
		index
	}

	fn standard_mut<E: Event>(&mut self) -> &mut StandardHandler<E> {
		let index = self.standard_index::<E>();
		let handler: &mut dyn Any = self.handlers[index].as_mut();
		handler
			.downcast_mut::<StandardHandler<E>>()
			.expect("handler index registered under a different event type")
	}

	fn job_mut<J: EventJob<E>, E: Event>(&mut self) -> &mut JobHandler<J, E> {
		let index = self.job_index::<J, E>();
		let handler: &mut dyn Any = self.handlers[index].as_mut();
		handler
			.downcast_mut::<JobHandler<J, E>>()
			.expect("handler index registered under a different job type")
	}

	pub fn subscribe<E: Event>(&mut self, target: Target, callback: Callback<E>) -> Result<()> {
		self.standard_mut::<E>().subscribe(target, callback)
	}

	pub fn unsubscribe<E: Event>(&mut self, target: Target, callback: &Callback<E>) {
		self.standard_mut::<E>().unsubscribe(target, callback);
	}

	pub fn subscribe_job<J: EventJob<E>, E: Event>(
		&mut self,
		target: Target,
		job: J,
		on_complete: JobCallback<J>,
	) -> Result<()> {
		self.job_mut::<J, E>().subscribe(target, job, on_complete)
	}

	pub fn unsubscribe_job<J: EventJob<E>, E: Event>(
		&mut self,
		target: Target,
		on_complete: &JobCallback<J>,
	) {
		self.job_mut::<J, E>().unsubscribe(target, on_complete);
	}

	/// Queues `event` into the ordinary handler for `E` and into every job
	/// handler registered against `E`. Never dispatches synchronously.
	pub fn enqueue<E: Event>(&mut self, target: Target, event: E) {
		self.stats.enqueued_total += 1;
		self.standard_mut::<E>().enqueue(target, event);

		let type_id = TypeId::of::<E>();
		let fan_out = match &self.last_fan_out {
			Some((cached, list)) if *cached == type_id => list.clone(),
			_ => {
				let list = self.fan_out.get(&type_id).cloned().unwrap_or_default();
				self.last_fan_out = Some((type_id, list.clone()));
				list
			}
		};
		for index in fan_out {
			self.handlers[index].enqueue_erased(target, &event);
		}
	}

	/// Flushes every handler ever created, in creation order.
	pub fn flush(&mut self) {
		self.stats.flushes_total += 1;
		let mut dispatched = 0u64;
		for handler in &mut self.handlers {
			dispatched += handler.flush();
		}
		self.stats.dispatched_total += dispatched;
		if dispatched > 0 {
			tracing::trace!(
				phase = self.label,
				dispatched,
				handlers = self.handlers.len(),
				"bus.flush"
			);
		}
	}

	/// Clears subscribers and queues everywhere; handler instances stay
	/// registered.
	pub fn reset(&mut self) {
		for handler in &mut self.handlers {
			handler.reset();
		}
		tracing::debug!(phase = self.label, handlers = self.handlers.len(), "bus.reset");
	}

	/// Fails on the first handler with live subscribers, in creation order.
	pub fn verify_no_subscribers(&self) -> Result<()> {
		for handler in &self.handlers {
			let count = handler.subscriber_count();
			if count > 0 {
				return Err(BusError::SubscriberLeak {
					event_type: handler.event_type(),
					count,
					targets: handler.subscriber_targets(),
				});
			}
		}
		Ok(())
	}

	/// Logs every handler with live subscribers and returns the total count,
	/// never failing.
	pub fn report_lingering_subscribers(&self) -> usize {
		let mut lingering = 0;
		for handler in &self.handlers {
			let count = handler.subscriber_count();
			if count > 0 {
				lingering += count;
				tracing::warn!(
					phase = self.label,
					event = handler.event_type(),
					job = handler.job_type(),
					count,
					targets = ?handler.subscriber_targets(),
					"bus.leak"
				);
			}
		}
		lingering
	}

	pub fn stats(&self) -> BusStats {
		self.stats
	}
}
