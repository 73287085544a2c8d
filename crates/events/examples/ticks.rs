//! Minimal game-loop wiring: two units, per-hit subscribers, and a damage
//! total reduced once per tick.
//!
//! Run with `cargo run --example ticks`.

use std::sync::Arc;

use tickbus_events::{Callback, EventBus, EventJob, JobCallback, Phase, Result, TargetCache};

#[derive(Debug, Clone, Copy)]
struct DamageTaken {
	amount: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct TotalDamage(u64);

impl EventJob<DamageTaken> for TotalDamage {
	fn execute(&mut self, event: DamageTaken) {
		self.0 += u64::from(event.amount);
	}

	fn merge(&mut self, other: Self) {
		self.0 += other.0;
	}
}

fn on_hit(name: &'static str) -> Callback<DamageTaken> {
	Arc::new(move |event| println!("{name} took {} damage", event.amount))
}

fn main() -> Result<()> {
	let mut bus = EventBus::new();
	let mut units = TargetCache::new();

	let hero = units.get_or_create("hero");
	let goblin = units.get_or_create("goblin");

	let hero_hit = on_hit("hero");
	let goblin_hit = on_hit("goblin");
	bus.subscribe(hero, hero_hit.clone(), Phase::Sim)?;
	bus.subscribe(goblin, goblin_hit.clone(), Phase::Sim)?;

	// One reduction over everything the hero takes, reported once per flush.
	let report: JobCallback<TotalDamage> =
		Arc::new(|total| println!("hero total so far: {}", total.0));
	bus.subscribe_with_job::<TotalDamage, DamageTaken>(
		hero,
		TotalDamage::default(),
		report.clone(),
		Phase::Sim,
	)?;

	for tick in 1..=3 {
		println!("-- tick {tick} --");
		bus.send(hero, DamageTaken { amount: tick }, Phase::Sim);
		bus.send(goblin, DamageTaken { amount: tick * 2 }, Phase::Sim);
		bus.flush(Phase::Sim);
	}

	bus.unsubscribe(hero, &hero_hit, Phase::Sim);
	bus.unsubscribe(goblin, &goblin_hit, Phase::Sim);
	bus.unsubscribe_with_job::<TotalDamage, DamageTaken>(hero, &report, Phase::Sim);
	bus.verify_no_subscribers_all()?;

	Ok(())
}
