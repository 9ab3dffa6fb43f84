// Monte Carlo Infrastructure - N runs per scenario with statistical aggregation
// Each scenario runs N times with seeds base..base+N, computing mean ± 95% CI

use orbital_grid_engine::ledger::TxKind;
use orbital_grid_engine::{EventKind, SimConfig, SimEvent, Simulation};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::report::*;
use crate::scenarios::Scenario;
use crate::time_series::TimeSeriesRecorder;
use crate::traffic::TrafficGenerator;

use std::time::Instant;

/// Keeps task arrivals independent of the world's own seeded draws.
const TRAFFIC_SALT: u64 = 0x5eed_7a5c;

// ─── Event Tally ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Tally {
    assigned: u32,
    completed: u32,
    dropped: u32,
    harvests: usize,
    charges: usize,
    recharges: usize,
    volume: f64,
    blackouts_avoided: u32,
    recalls: u32,
    timeouts: u32,
    auto_launches: u32,
    corrections: u32,
}

impl Tally {
    fn absorb(&mut self, events: &[SimEvent]) {
        for event in events {
            match &event.kind {
                EventKind::TaskAssigned { .. } => self.assigned += 1,
                EventKind::TaskCompleted { .. } => self.completed += 1,
                EventKind::TaskDropped { .. } => self.dropped += 1,
                EventKind::TransactionCompleted { kind, cost, .. } => {
                    match kind {
                        TxKind::Harvest => self.harvests += 1,
                        TxKind::Charge => self.charges += 1,
                        TxKind::SourceRecharge => self.recharges += 1,
                    }
                    self.volume += cost.to_f64();
                }
                EventKind::AlertBlackoutAvoided { .. } => self.blackouts_avoided += 1,
                EventKind::CarrierRecalled { .. } => self.recalls += 1,
                EventKind::CarrierTimeoutRecovery { .. } => self.timeouts += 1,
                EventKind::CarrierLaunched { auto: true, .. } => self.auto_launches += 1,
                EventKind::AlertStateCorrected { .. } => self.corrections += 1,
                _ => {}
            }
        }
    }
}

/// Any bound broken in the post-tick world.
fn violates_invariants(sim: &Simulation) -> bool {
    let world = sim.world();
    let cap = sim.config().max_drones_per_node;

    let nodes_bad = world.nodes.values().any(|n| {
        !(0.0..=n.max_energy).contains(&n.energy) || n.processing_in_use() > n.processing_capacity + 1e-9
    });
    let carriers_bad = world.carriers.values().any(|c| {
        c.reserve < 0.0 || !(0.0..=c.payload_max).contains(&c.payload) || !c.is_consistent()
    });
    let crowded = world.nodes.keys().any(|id| world.engaged_at(id) > cap);

    nodes_bad || carriers_bad || crowded
}

/// Run a single scenario iteration with a specific seed.
pub fn run_single(
    scenario: &Scenario,
    base: &SimConfig,
    seed: u64,
    time_series_dir: Option<&std::path::Path>,
) -> BenchResult {
    let start = Instant::now();

    let mut config = SimConfig { seed, ..base.clone() };
    if let Some(tweak) = scenario.tweak {
        tweak(&mut config);
    }
    let mut sim = Simulation::new(config).expect("scenario config must validate");

    let rng = ChaCha8Rng::seed_from_u64(seed ^ TRAFFIC_SALT);
    let mut traffic = TrafficGenerator::new(rng);
    let mut time_series = time_series_dir.map(|_| TimeSeriesRecorder::new());

    let mut tally = Tally::default();
    let mut rejected: u32 = 0;
    let mut invariant_violations: u32 = 0;
    let mut min_node_energy = f64::INFINITY;

    // Pre-scenario setup (drain nodes, empty payloads, etc.)
    if let Some(setup) = &scenario.setup {
        setup(&mut sim);
    }

    for tick in 0..scenario.ticks {
        if let Some(event) = &scenario.mid_event {
            event(&mut sim, tick);
        }

        let load = scenario.load_curve.map_or(scenario.load, |curve| curve(tick));
        let lambda = TrafficGenerator::compute_lambda(load, sim.world().nodes.len());
        for spec in traffic.generate_tick(lambda) {
            if sim.inject_task(spec).is_err() {
                rejected += 1;
            }
        }

        let result = sim.tick_core();
        tally.absorb(&result.events);

        if violates_invariants(&sim) {
            invariant_violations += 1;
        }
        let tick_min = sim.world().nodes.values().map(|n| n.energy).fold(f64::INFINITY, f64::min);
        min_node_energy = min_node_energy.min(tick_min);

        if let Some(ref mut ts) = time_series {
            ts.record(&sim, &result);
        }
    }

    if let (Some(ts), Some(dir)) = (&time_series, time_series_dir) {
        let path = dir.join(format!("seed-{}.jsonl", seed));
        if let Err(e) = ts.write_jsonl(&path) {
            eprintln!("  Warning: failed to write time series ({} ticks): {}", ts.len(), e);
        }
    }

    let elapsed = start.elapsed();
    let elapsed_ms = elapsed.as_millis();
    let elapsed_secs = elapsed.as_secs_f64().max(0.001);

    let spawned = traffic.spawn_count;
    let completion_rate = if spawned > 0 {
        tally.completed as f64 / spawned as f64 * 100.0
    } else {
        0.0
    };

    // Evaluate pass/fail
    let criteria = &scenario.criteria;
    let mut failures = Vec::new();
    if invariant_violations > criteria.max_invariant_violations {
        failures.push(format!("{invariant_violations} ticks broke an invariant"));
    }
    if let Some(max) = criteria.max_state_corrections {
        if tally.corrections > max {
            failures.push(format!("{} state corrections", tally.corrections));
        }
    }
    if let Some(min_rate) = criteria.min_completion_rate {
        if completion_rate < min_rate {
            failures.push(format!("completion {completion_rate:.1}% < {min_rate}%"));
        }
    }
    if let Some(min) = criteria.min_harvests {
        if tally.harvests < min {
            failures.push(format!("{} harvests < {min}", tally.harvests));
        }
    }
    if let Some(min) = criteria.min_charges {
        if tally.charges < min {
            failures.push(format!("{} charges < {min}", tally.charges));
        }
    }
    if let Some(max) = criteria.max_auto_launches {
        if tally.auto_launches > max {
            failures.push(format!("{} auto launches > {max}", tally.auto_launches));
        }
    }

    let world = sim.world();
    BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        seed,
        pass: failures.is_empty(),
        failures,
        ticks: scenario.ticks,
        tasks_spawned: spawned,
        tasks_assigned: tally.assigned,
        tasks_completed: tally.completed,
        tasks_dropped: tally.dropped + rejected,
        completion_rate,
        harvests: tally.harvests,
        charges: tally.charges,
        recharges: tally.recharges,
        total_volume: tally.volume,
        average_price: world.ledger.average_price(sim.config().average_price_window).to_f64(),
        blackouts_avoided: tally.blackouts_avoided,
        recalls: tally.recalls,
        timeouts: tally.timeouts,
        auto_launches: tally.auto_launches,
        state_corrections: tally.corrections,
        invariant_violations,
        min_node_energy: if min_node_energy.is_finite() { min_node_energy } else { 0.0 },
        final_total_energy: world.total_energy(),
        final_avg_utilization: world.avg_utilization(),
        final_carriers: world.carriers.len(),
        elapsed_ms,
        throughput_per_sec: scenario.ticks as f64 / elapsed_secs,
    }
}

/// Run Monte Carlo: N runs of a scenario, aggregate stats.
pub fn run_monte_carlo(
    scenario: &Scenario,
    base: &SimConfig,
    n_runs: usize,
    base_seed: u64,
    time_series_base: Option<&std::path::Path>,
) -> MonteCarloReport {
    let ts_dir = time_series_base.map(|base| base.join(scenario.name.to_lowercase()));

    let results: Vec<BenchResult> = (0..n_runs)
        .map(|i| run_single(scenario, base, base_seed + i as u64, ts_dir.as_deref()))
        .collect();

    aggregate(scenario, results)
}

fn stats_of(results: &[BenchResult], metric: impl Fn(&BenchResult) -> f64) -> Stats {
    Stats::from_samples(&results.iter().map(metric).collect::<Vec<_>>())
}

/// Aggregate individual runs into a MonteCarloReport.
fn aggregate(scenario: &Scenario, results: Vec<BenchResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();
    let pass_rate = if n > 0 { passed as f64 / n as f64 } else { 0.0 };

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate,
        completion_rate: stats_of(&results, |r| r.completion_rate),
        harvests: stats_of(&results, |r| r.harvests as f64),
        charges: stats_of(&results, |r| r.charges as f64),
        total_volume: stats_of(&results, |r| r.total_volume),
        min_node_energy: stats_of(&results, |r| r.min_node_energy),
        final_total_energy: stats_of(&results, |r| r.final_total_energy),
        invariant_violations: stats_of(&results, |r| r.invariant_violations as f64),
        elapsed_ms: stats_of(&results, |r| r.elapsed_ms as f64),
        throughput_per_sec: stats_of(&results, |r| r.throughput_per_sec),
        individual_runs: results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::scenarios;

    fn scenario(name: &str) -> Scenario {
        scenarios()
            .into_iter()
            .find(|s| s.name == name)
            .expect("scenario exists")
    }

    #[test]
    fn test_same_seed_same_result() {
        let s = scenario("BASELINE");
        let a = run_single(&s, &SimConfig::default(), 3, None);
        let b = run_single(&s, &SimConfig::default(), 3, None);
        assert_eq!(a.tasks_spawned, b.tasks_spawned);
        assert_eq!(a.tasks_completed, b.tasks_completed);
        assert_eq!(a.harvests, b.harvests);
        assert_eq!(a.final_total_energy, b.final_total_energy);
    }

    #[test]
    fn test_baseline_keeps_invariants() {
        let r = run_single(&scenario("BASELINE"), &SimConfig::default(), 0, None);
        assert_eq!(r.invariant_violations, 0);
        assert_eq!(r.state_corrections, 0);
        assert!(r.tasks_spawned > 0);
    }

    #[test]
    fn test_manual_dispatch_never_auto_launches() {
        let r = run_single(&scenario("MANUAL_DISPATCH"), &SimConfig::default(), 1, None);
        assert_eq!(r.auto_launches, 0);
    }

    #[test]
    fn test_aggregate_counts_runs() {
        let s = scenario("SURGE");
        let report = run_monte_carlo(&s, &SimConfig::default(), 2, 10, None);
        assert_eq!(report.n_runs, 2);
        assert_eq!(report.individual_runs.len(), 2);
        assert_eq!(report.individual_runs[1].seed, 11);
    }
}
