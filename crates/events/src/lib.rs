//! Deferred, target-scoped events with tick-phase dispatch.
//!
//! Senders queue events against an opaque [`Target`]; nothing runs until the
//! owning loop flushes a [`Phase`]. Subscribers attach either a plain
//! [`Callback`] that runs once per matching event, or an [`EventJob`] that
//! reduces the whole matching batch (in parallel for large batches) and
//! reports once per flush.
//!
//! # Model
//!
//! - **Deferred**: [`EventBus::send`] never invokes anything. Delivery
//!   happens at [`EventBus::flush`], in handler creation order, then event
//!   FIFO order within a handler.
//! - **Target-scoped**: a subscriber sees only events sent to its exact
//!   target. [`Target::GLOBAL`] is an ordinary target used by convention
//!   for application-wide broadcast.
//! - **Phase-multiplexed**: the bus keeps three independent dispatchers,
//!   one per [`Phase`]. Subscriptions and queues never cross phases.
//!
//! # Concurrency
//!
//! The bus is single-writer by construction: every mutating call takes
//! `&mut EventBus`. Parallelism lives inside job flushes, where batches are
//! split across scoped worker threads and merged in order (see
//! [`ReduceConfig`]). Callbacks run on the flushing thread.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use tickbus_events::{Callback, EventBus, Phase, Target};
//!
//! #[derive(Debug, Clone, Copy)]
//! struct Damage(u32);
//!
//! let mut bus = EventBus::new();
//! let player = Target::create();
//!
//! let on_damage: Callback<Damage> = Arc::new(|event| {
//!     println!("took {} damage", event.0);
//! });
//! bus.subscribe(player, on_damage.clone(), Phase::Sim)?;
//!
//! bus.send(player, Damage(7), Phase::Sim);
//! bus.flush(Phase::Sim);
//!
//! bus.unsubscribe(player, &on_damage, Phase::Sim);
//! bus.verify_no_subscribers_all()?;
//! # Ok::<(), tickbus_events::BusError>(())
//! ```

mod bus;
mod dispatch;
mod error;
mod event;
mod job;
mod standard;
mod target;

pub use bus::{EventBus, Phase, Scoped};
pub use dispatch::BusStats;
pub use error::{BusError, Result};
pub use event::{Callback, Event, EventJob, JobCallback};
pub use job::ReduceConfig;
pub use target::{Target, TargetCache, TargetReservation};
