//! Opaque target identities, block reservation, and the external-key cache.
//!
//! A [`Target`] scopes subscriptions and events to a logical recipient. The
//! bus never interprets targets beyond equality: they are plain 64-bit
//! numbers split into two spaces. Everything below 2^32 is caller territory
//! ([`Target::from_raw`], engine instance ids, array indices); the
//! process-wide allocator mints from 2^32 upward, so the spaces never
//! collide. `u64::MAX` is reserved as the null sentinel and is never minted.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::error::{BusError, Result};

/// First identity handed out by the process-wide allocator.
const FIRST_MINTED_ID: u64 = u32::MAX as u64 + 1;

/// Opaque identity scoping subscriptions and events to a logical recipient.
///
/// Equality and hashing are defined purely on the numeric identity. Minted
/// identities are process-unique and never reused while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Target(u64);

impl Target {
	/// Sentinel for "no target". Never minted by the allocator.
	pub const NULL: Target = Target(u64::MAX);

	/// Conventional application-wide broadcast target (raw id 0).
	///
	/// Used by [`EventBus::global`](crate::EventBus::global); nothing
	/// enforces the convention beyond callers agreeing on it.
	pub const GLOBAL: Target = Target(0);

	/// Mints a fresh process-unique target.
	///
	/// Single mints are unchecked: walking a 64-bit counter one identity at
	/// a time does not realistically reach the sentinel. Block reservation
	/// is the checked path ([`Target::reserve`]).
	pub fn create() -> Target {
		ALLOCATOR.create()
	}

	/// Reserves `count` contiguous never-otherwise-minted identities.
	///
	/// Fails with [`BusError::CounterOverflow`] if the block would wrap the
	/// identity counter or reach the null sentinel; the counter is left
	/// untouched on failure.
	pub fn reserve(count: u64) -> Result<TargetReservation> {
		ALLOCATOR.reserve(count)
	}

	/// Wraps a caller-managed identity.
	///
	/// Raw ids below 2^32 never collide with minted targets; values above
	/// that are the allocator's space and may clash with [`Target::create`].
	pub const fn from_raw(raw: u64) -> Target {
		Target(raw)
	}

	/// Returns the numeric identity.
	pub const fn raw(self) -> u64 {
		self.0
	}

	/// Returns true for the null sentinel.
	pub const fn is_null(self) -> bool {
		self.0 == u64::MAX
	}
}

/// Monotonic identity allocator.
///
/// The arithmetic lives on a struct so reservation overflow stays testable
/// against a private counter; public allocation goes through the process-wide
/// [`ALLOCATOR`] static.
#[derive(Debug)]
struct TargetAllocator {
	next: AtomicU64,
}

static ALLOCATOR: TargetAllocator = TargetAllocator::new(FIRST_MINTED_ID);

impl TargetAllocator {
	const fn new(start: u64) -> Self {
		Self {
			next: AtomicU64::new(start),
		}
	}

	fn create(&self) -> Target {
		let id = self.next.fetch_add(1, Ordering::Relaxed);
		debug_assert!(id != u64::MAX, "identity counter reached the null sentinel");
		Target(id)
	}

	fn reserve(&self, count: u64) -> Result<TargetReservation> {
		// The block must stop short of the all-ones sentinel, and the
		// counter must never rest on it either.
		self.next
			.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |start| {
				start.checked_add(count).filter(|&end| end < u64::MAX)
			})
			.map(|start| TargetReservation { start, count })
			.map_err(|_| BusError::CounterOverflow { requested: count })
	}
}

/// Pre-allocated contiguous block of target identities.
///
/// Lets a caller assign identities to items it manages itself (array
/// elements, particles, pooled entities) without minting one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetReservation {
	start: u64,
	count: u64,
}

impl TargetReservation {
	/// Returns the reserved target at `index`.
	///
	/// Fails with [`BusError::ReservationOutOfRange`] when
	/// `index >= len()`.
	pub fn get(&self, index: u64) -> Result<Target> {
		if index >= self.count {
			return Err(BusError::ReservationOutOfRange {
				index,
				count: self.count,
			});
		}
		Ok(Target(self.start + index))
	}

	/// Number of reserved identities.
	pub fn len(&self) -> u64 {
		self.count
	}

	/// Returns true for an empty reservation.
	pub fn is_empty(&self) -> bool {
		self.count == 0
	}
}

/// Caller-side cache mapping external object identities to stable targets.
///
/// The bus holds no references to external objects, only numeric targets;
/// whoever introduces an association owns it and must
/// [`invalidate`](Self::invalidate) when the external object is destroyed.
/// Targets themselves are never reused.
pub struct TargetCache<K> {
	targets: FxHashMap<K, Target>,
}

impl<K> Default for TargetCache<K> {
	fn default() -> Self {
		Self {
			targets: FxHashMap::default(),
		}
	}
}

impl<K: Hash + Eq> TargetCache<K> {
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the stable target for `key`, minting one on first sight.
	///
	/// Repeated calls with the same key return the same target until the
	/// entry is invalidated.
	pub fn get_or_create(&mut self, key: K) -> Target {
		*self.targets.entry(key).or_insert_with(Target::create)
	}

	/// Like [`get_or_create`](Self::get_or_create), mapping an absent key to
	/// [`Target::NULL`].
	pub fn target_for(&mut self, key: Option<K>) -> Target {
		match key {
			Some(key) => self.get_or_create(key),
			None => Target::NULL,
		}
	}

	/// Drops the association for `key`, returning the target it had.
	///
	/// Call when the external object dies. Late events against the old
	/// target simply find no subscribers.
	pub fn invalidate(&mut self, key: &K) -> Option<Target> {
		self.targets.remove(key)
	}

	/// Number of live associations.
	pub fn len(&self) -> usize {
		self.targets.len()
	}

	/// Returns true when no associations are cached.
	pub fn is_empty(&self) -> bool {
		self.targets.is_empty()
	}
}
