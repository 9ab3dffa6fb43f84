// Per-Tick JSONL Time Series Recorder
// Outputs one JSON line per tick for independent analysis

use orbital_grid_engine::equilibrium::EquilibriumStatus;
use orbital_grid_engine::{Simulation, TickResult, TickSummary};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
pub struct TickSnapshot {
    #[serde(flatten)]
    pub summary: TickSummary,
    pub avg_utilization: f64,
    pub min_node_energy: f64,
    pub active_carriers: usize,
    pub idle_carriers: usize,
    pub average_price: f64,
    pub events: usize,
    /// Present on equilibrium check ticks only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equilibrium: Option<EquilibriumStatus>,
}

impl TickSnapshot {
    pub fn from_tick(sim: &Simulation, result: &TickResult) -> Self {
        let world = sim.world();
        let min_node_energy = world
            .nodes
            .values()
            .map(|n| n.energy)
            .fold(f64::INFINITY, f64::min);

        Self {
            summary: result.summary.clone(),
            avg_utilization: world.avg_utilization(),
            min_node_energy: if min_node_energy.is_finite() { min_node_energy } else { 0.0 },
            active_carriers: world.active_carriers(),
            idle_carriers: world.idle_carriers(),
            average_price: world.ledger.average_price(sim.config().average_price_window).to_f64(),
            events: result.events.len(),
            equilibrium: result.equilibrium.as_ref().map(|r| r.status),
        }
    }
}

/// Time series recorder that accumulates snapshots and writes JSONL
pub struct TimeSeriesRecorder {
    snapshots: Vec<TickSnapshot>,
}

impl TimeSeriesRecorder {
    pub fn new() -> Self {
        Self { snapshots: Vec::new() }
    }

    pub fn record(&mut self, sim: &Simulation, result: &TickResult) {
        self.snapshots.push(TickSnapshot::from_tick(sim, result));
    }

    /// Write all snapshots to a JSONL file
    pub fn write_jsonl(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        for snapshot in &self.snapshots {
            let line = serde_json::to_string(snapshot)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }
}
