//! Phase-multiplexed front door over the per-phase dispatchers.

use crate::dispatch::{BusStats, Dispatcher};
use crate::error::Result;
use crate::event::{Callback, Event, EventJob, JobCallback};
use crate::job::ReduceConfig;
use crate::target::Target;

/// Dispatch point within one step of the host loop.
///
/// The number and identity of phases is fixed; the host scheduler decides
/// when each phase's flush runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
	/// Flushed once per fixed simulation step.
	PreSim,
	/// Flushed once per variable step.
	Sim,
	/// Flushed once per late/UI step.
	PostSim,
}

impl Phase {
	/// Every phase, in flush-all order.
	pub const ALL: [Phase; 3] = [Phase::PreSim, Phase::Sim, Phase::PostSim];

	/// Short name carried into log events.
	pub const fn label(self) -> &'static str {
		match self {
			Phase::PreSim => "pre_sim",
			Phase::Sim => "sim",
			Phase::PostSim => "post_sim",
		}
	}

	const fn index(self) -> usize {
		self as usize
	}
}

/// Owning handle over the three per-phase dispatchers.
///
/// Construct one at startup, pass it by `&mut` to whoever subscribes or
/// sends, and drop it at shutdown (tests typically run
/// [`verify_no_subscribers_all`](Self::verify_no_subscribers_all) first).
/// Every mutating operation takes `&mut self`: one writer at a time per bus,
/// and a flush cannot re-enter because callbacks receive payloads, never the
/// bus. The handle is `Send`, so ownership may move between threads between
/// ticks.
///
/// Each phase's dispatcher is fully independent: handlers, queues, and
/// subscriptions never cross phases.
pub struct EventBus {
	phases: [Dispatcher; 3],
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new()
	}
}

impl EventBus {
	/// Creates a bus with default reduction thresholds.
	pub fn new() -> Self {
		Self::with_reduce_config(ReduceConfig::default())
	}

	/// Creates a bus with explicit reduction thresholds.
	pub fn with_reduce_config(config: ReduceConfig) -> Self {
		Self {
			phases: Phase::ALL.map(|phase| Dispatcher::new(phase.label(), config)),
		}
	}

	fn dispatcher(&self, phase: Phase) -> &Dispatcher {
		&self.phases[phase.index()]
	}

	fn dispatcher_mut(&mut self, phase: Phase) -> &mut Dispatcher {
		&mut self.phases[phase.index()]
	}

	/// Registers `callback` for events of type `E` sent to `target` on
	/// `phase`.
	///
	/// Fails with [`BusError::DuplicateSubscription`] when the same
	/// (target, callback) pair is already registered on that phase.
	///
	/// [`BusError::DuplicateSubscription`]: crate::BusError::DuplicateSubscription
	pub fn subscribe<E: Event>(
		&mut self,
		target: Target,
		callback: Callback<E>,
		phase: Phase,
	) -> Result<()> {
		self.dispatcher_mut(phase).subscribe(target, callback)
	}

	/// Removes the (target, callback) registration from `phase`. Absent
	/// pairs are a no-op.
	pub fn unsubscribe<E: Event>(&mut self, target: Target, callback: &Callback<E>, phase: Phase) {
		self.dispatcher_mut(phase).unsubscribe(target, callback);
	}

	/// Registers a reduction job for events of type `E` sent to `target` on
	/// `phase`, with `job` as the seed accumulator.
	///
	/// Both type parameters are usually spelled out, since the event type
	/// does not appear in the arguments:
	/// `bus.subscribe_with_job::<SumDamage, Damage>(..)`.
	pub fn subscribe_with_job<J: EventJob<E>, E: Event>(
		&mut self,
		target: Target,
		job: J,
		on_complete: JobCallback<J>,
		phase: Phase,
	) -> Result<()> {
		self.dispatcher_mut(phase)
			.subscribe_job::<J, E>(target, job, on_complete)
	}

	/// Removes a job registration by (target, completion callback) identity,
	/// dropping its accumulator. Absent pairs are a no-op.
	pub fn unsubscribe_with_job<J: EventJob<E>, E: Event>(
		&mut self,
		target: Target,
		on_complete: &JobCallback<J>,
		phase: Phase,
	) {
		self.dispatcher_mut(phase)
			.unsubscribe_job::<J, E>(target, on_complete);
	}

	/// Queues `event` against `target` on `phase`. Never dispatches
	/// synchronously; delivery happens at the next [`flush`](Self::flush) of
	/// that phase.
	pub fn send<E: Event>(&mut self, target: Target, event: E, phase: Phase) {
		self.dispatcher_mut(phase).enqueue(target, event);
	}

	/// Dispatches everything queued on `phase`, in handler creation order.
	pub fn flush(&mut self, phase: Phase) {
		self.dispatcher_mut(phase).flush();
	}

	/// Flushes all three phases, in [`Phase::ALL`] order.
	pub fn flush_all(&mut self) {
		for dispatcher in &mut self.phases {
			dispatcher.flush();
		}
	}

	/// Drops every subscriber and queued event on `phase` unconditionally
	/// (hard reset, e.g. scene reload).
	pub fn reset(&mut self, phase: Phase) {
		self.dispatcher_mut(phase).reset();
	}

	/// Resets all three phases.
	pub fn reset_all(&mut self) {
		for dispatcher in &mut self.phases {
			dispatcher.reset();
		}
	}

	/// Fails with [`BusError::SubscriberLeak`] if any handler on `phase`
	/// still has subscribers. Suitable for test and teardown assertions.
	///
	/// [`BusError::SubscriberLeak`]: crate::BusError::SubscriberLeak
	pub fn verify_no_subscribers(&self, phase: Phase) -> Result<()> {
		self.dispatcher(phase).verify_no_subscribers()
	}

	/// Leak check across all three phases; fails on the first offender.
	pub fn verify_no_subscribers_all(&self) -> Result<()> {
		for dispatcher in &self.phases {
			dispatcher.verify_no_subscribers()?;
		}
		Ok(())
	}

	/// Non-failing leak check: logs every offending handler on `phase` and
	/// returns the number of lingering subscriptions.
	pub fn report_lingering_subscribers(&self, phase: Phase) -> usize {
		self.dispatcher(phase).report_lingering_subscribers()
	}

	/// Non-failing leak check across all three phases.
	pub fn report_lingering_subscribers_all(&self) -> usize {
		self.phases
			.iter()
			.map(Dispatcher::report_lingering_subscribers)
			.sum()
	}

	/// Dispatch totals for `phase` since bus creation.
	pub fn stats(&self, phase: Phase) -> BusStats {
		self.dispatcher(phase).stats()
	}

	/// Bus view with `phase` and `target` fixed.
	pub fn scoped(&mut self, phase: Phase, target: Target) -> Scoped<'_> {
		Scoped {
			bus: self,
			phase,
			target,
		}
	}

	/// Bus view over the application-wide broadcast target
	/// ([`Target::GLOBAL`]) on `phase`.
	pub fn global(&mut self, phase: Phase) -> Scoped<'_> {
		self.scoped(phase, Target::GLOBAL)
	}
}

/// Bus view with a fixed phase and target.
///
/// Tick-local code holds one of these instead of repeating the
/// (phase, target) pair at every call site.
pub struct Scoped<'bus> {
	bus: &'bus mut EventBus,
	phase: Phase,
	target: Target,
}

impl Scoped<'_> {
	/// The fixed target of this view.
	pub fn target(&self) -> Target {
		self.target
	}

	/// The fixed phase of this view.
	pub fn phase(&self) -> Phase {
		self.phase
	}

	/// See [`EventBus::subscribe`].
	pub fn subscribe<E: Event>(&mut self, callback: Callback<E>) -> Result<()> {
		self.bus.subscribe(self.target, callback, self.phase)
	}

	/// See [`EventBus::unsubscribe`].
	pub fn unsubscribe<E: Event>(&mut self, callback: &Callback<E>) {
		self.bus.unsubscribe(self.target, callback, self.phase);
	}

	/// See [`EventBus::subscribe_with_job`].
	pub fn subscribe_with_job<J: EventJob<E>, E: Event>(
		&mut self,
		job: J,
		on_complete: JobCallback<J>,
	) -> Result<()> {
		self.bus
			.subscribe_with_job::<J, E>(self.target, job, on_complete, self.phase)
	}

	/// See [`EventBus::unsubscribe_with_job`].
	pub fn unsubscribe_with_job<J: EventJob<E>, E: Event>(&mut self, on_complete: &JobCallback<J>) {
		self.bus
			.unsubscribe_with_job::<J, E>(self.target, on_complete, self.phase);
	}

	/// See [`EventBus::send`].
	pub fn send<E: Event>(&mut self, event: E) {
		self.bus.send(self.target, event, self.phase);
	}

	/// Flushes the scoped phase (all targets and types, not just this
	/// view's).
	pub fn flush(&mut self) {
		self.bus.flush(self.phase);
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use rstest::rstest;

	use super::*;

	#[derive(Debug, Clone, Copy)]
	struct Tick(u32);

	fn counting_callback(counter: &Arc<AtomicUsize>) -> Callback<Tick> {
		let counter = counter.clone();
		Arc::new(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		})
	}

	#[test]
	fn test_phase_labels_are_stable() {
		assert_eq!(Phase::ALL.len(), 3);
		assert_eq!(Phase::PreSim.label(), "pre_sim");
		assert_eq!(Phase::Sim.label(), "sim");
		assert_eq!(Phase::PostSim.label(), "post_sim");
	}

	#[rstest]
	#[case::pre_sim(Phase::PreSim)]
	#[case::sim(Phase::Sim)]
	#[case::post_sim(Phase::PostSim)]
	fn test_send_and_flush_round_trip(#[case] phase: Phase) {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = EventBus::new();
		let target = Target::create();

		bus.subscribe(target, counting_callback(&counter), phase)
			.unwrap();
		bus.send(target, Tick(1), phase);
		assert_eq!(counter.load(Ordering::SeqCst), 0);

		bus.flush(phase);
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[rstest]
	#[case::pre_vs_sim(Phase::PreSim, Phase::Sim)]
	#[case::pre_vs_post(Phase::PreSim, Phase::PostSim)]
	#[case::sim_vs_pre(Phase::Sim, Phase::PreSim)]
	#[case::sim_vs_post(Phase::Sim, Phase::PostSim)]
	#[case::post_vs_pre(Phase::PostSim, Phase::PreSim)]
	#[case::post_vs_sim(Phase::PostSim, Phase::Sim)]
	fn test_phases_are_isolated(#[case] used: Phase, #[case] other: Phase) {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = EventBus::new();
		let target = Target::create();

		bus.subscribe(target, counting_callback(&counter), used)
			.unwrap();
		bus.send(target, Tick(1), used);

		// Flushing any other phase delivers nothing.
		bus.flush(other);
		assert_eq!(counter.load(Ordering::SeqCst), 0);

		bus.flush(used);
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_same_pair_on_two_phases_is_not_a_duplicate() {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = EventBus::new();
		let target = Target::create();
		let callback = counting_callback(&counter);

		bus.subscribe(target, callback.clone(), Phase::Sim).unwrap();
		bus.subscribe(target, callback.clone(), Phase::PostSim).unwrap();

		bus.send(target, Tick(1), Phase::Sim);
		bus.send(target, Tick(1), Phase::PostSim);
		bus.flush_all();

		assert_eq!(counter.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn test_flush_all_covers_every_phase() {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = EventBus::new();
		let target = Target::create();

		for phase in Phase::ALL {
			bus.subscribe(target, counting_callback(&counter), phase)
				.unwrap();
			bus.send(target, Tick(0), phase);
		}

		bus.flush_all();
		assert_eq!(counter.load(Ordering::SeqCst), 3);
	}

	#[test]
	fn test_reset_all_silences_every_phase() {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = EventBus::new();
		let target = Target::create();

		for phase in Phase::ALL {
			bus.subscribe(target, counting_callback(&counter), phase)
				.unwrap();
			bus.send(target, Tick(0), phase);
		}

		bus.reset_all();
		bus.flush_all();

		assert_eq!(counter.load(Ordering::SeqCst), 0);
		assert!(bus.verify_no_subscribers_all().is_ok());
	}

	#[test]
	fn test_leak_verification_modes() {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = EventBus::new();
		let target = Target::create();
		let callback = counting_callback(&counter);

		bus.subscribe(target, callback.clone(), Phase::Sim).unwrap();

		assert!(bus.verify_no_subscribers(Phase::PreSim).is_ok());
		assert!(bus.verify_no_subscribers(Phase::Sim).is_err());
		assert!(bus.verify_no_subscribers_all().is_err());
		assert_eq!(bus.report_lingering_subscribers(Phase::Sim), 1);
		assert_eq!(bus.report_lingering_subscribers_all(), 1);

		bus.unsubscribe(target, &callback, Phase::Sim);
		assert!(bus.verify_no_subscribers_all().is_ok());
		assert_eq!(bus.report_lingering_subscribers_all(), 0);
	}

	#[test]
	fn test_stats_are_per_phase() {
		let mut bus = EventBus::new();
		let target = Target::create();

		bus.send(target, Tick(1), Phase::Sim);
		bus.send(target, Tick(2), Phase::Sim);
		bus.flush(Phase::Sim);

		assert_eq!(bus.stats(Phase::Sim).enqueued_total, 2);
		assert_eq!(bus.stats(Phase::Sim).flushes_total, 1);
		assert_eq!(bus.stats(Phase::PostSim).enqueued_total, 0);
	}

	#[test]
	fn test_scoped_view_forwards_the_fixed_pair() {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = EventBus::new();
		let target = Target::create();
		let callback = counting_callback(&counter);

		{
			let mut scope = bus.scoped(Phase::PostSim, target);
			assert_eq!(scope.target(), target);
			assert_eq!(scope.phase(), Phase::PostSim);

			scope.subscribe(callback.clone()).unwrap();
			scope.send(Tick(9));
			scope.flush();
		}
		assert_eq!(counter.load(Ordering::SeqCst), 1);

		// The same pair through the long-form API is the same subscription.
		let err = bus
			.subscribe(target, callback.clone(), Phase::PostSim)
			.unwrap_err();
		assert!(matches!(err, crate::BusError::DuplicateSubscription { .. }));

		bus.scoped(Phase::PostSim, target).unsubscribe(&callback);
		assert!(bus.verify_no_subscribers_all().is_ok());
	}

	#[test]
	fn test_global_scope_uses_the_broadcast_target() {
		let counter = Arc::new(AtomicUsize::new(0));
		let mut bus = EventBus::new();
		let callback = counting_callback(&counter);

		bus.global(Phase::Sim).subscribe(callback.clone()).unwrap();
		assert_eq!(bus.global(Phase::Sim).target(), Target::GLOBAL);

		// Reachable from the long-form API under the same target.
		bus.send(Target::GLOBAL, Tick(0), Phase::Sim);
		bus.flush(Phase::Sim);
		assert_eq!(counter.load(Ordering::SeqCst), 1);

		bus.global(Phase::Sim).unsubscribe(&callback);
	}
}
