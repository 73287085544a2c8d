//! Error types for subscription management and target allocation.

use thiserror::Error;

use crate::target::Target;

/// Errors surfaced by subscription calls, leak verification, and target
/// allocation.
///
/// Payload-contract violations (an event or job type that is not a plain
/// copyable value) have no runtime representation here: the [`Event`] and
/// [`EventJob`] bounds reject such types at compile time, at the call site
/// that first names them.
///
/// [`Event`]: crate::Event
/// [`EventJob`]: crate::EventJob
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
	/// The same (target, callback) pair was subscribed twice on one handler.
	///
	/// The second call is rejected and the handler is left unchanged; the
	/// original subscription stays active.
	#[error("duplicate subscription for {event_type} on {target:?}")]
	DuplicateSubscription {
		/// Event type the handler dispatches.
		event_type: &'static str,
		/// Target the callback was already registered under.
		target: Target,
	},

	/// A leak check found subscribers still registered at a teardown boundary.
	///
	/// Signals a missing unsubscribe. Raised by the hard verification mode;
	/// the soft mode logs the same information instead.
	#[error("{count} subscriber(s) still registered for {event_type} (targets: {targets:?})")]
	SubscriberLeak {
		/// Event type of the offending handler.
		event_type: &'static str,
		/// Number of lingering subscriptions.
		count: usize,
		/// Targets of the lingering subscriptions, in subscription order.
		targets: Vec<Target>,
	},

	/// A reservation index was outside the reserved block.
	#[error("reservation index {index} out of range (reserved {count})")]
	ReservationOutOfRange {
		/// The offending index.
		index: u64,
		/// Size of the reservation.
		count: u64,
	},

	/// A block reservation would exhaust the identity space.
	#[error("cannot reserve {requested} targets: identity counter would overflow")]
	CounterOverflow {
		/// Size of the rejected reservation.
		requested: u64,
	},
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
