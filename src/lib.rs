// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite

pub mod units;
pub mod types;
pub mod config;
pub mod error;
pub mod events;
pub mod pricing;
pub mod ledger;
pub mod world;
pub mod delegator;
pub mod carrier;
pub mod equilibrium;
pub mod simulation;
pub mod clock;

pub use config::{ConfigPatch, SimConfig};
pub use error::{DropReason, EngineError, LedgerError};
pub use events::{EventKind, EventSink, SimEvent};
pub use clock::{ClockState, EngineHandle};
#[cfg(not(target_arch = "wasm32"))]
pub use clock::SimulationClock;
pub use simulation::{Simulation, TickResult};
pub use types::*;
pub use units::{CarrierId, Credits, NodeId, Position, TaskId, TxId};

use wasm_bindgen::prelude::*;

// ─── WASM Interface ──────────────────────────────────────────────────────────

/// Browser-facing wrapper; the page drives ticks itself.
#[wasm_bindgen]
pub struct GridSimulation {
    sim: Simulation,
}

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[wasm_bindgen]
impl GridSimulation {
    /// `config` is a full or partial `SimConfig` object; `undefined` means defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<GridSimulation, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config: SimConfig = if config.is_undefined() || config.is_null() {
            SimConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        let sim = Simulation::new(config).map_err(js_err)?;
        Ok(Self { sim })
    }

    pub fn tick(&mut self) -> JsValue {
        let result = self.sim.tick_core();
        serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
    }

    /// Run N ticks without returning results.
    pub fn run_batch(&mut self, ticks: u32) {
        self.sim.run_batch(u64::from(ticks));
    }

    pub fn current_tick(&self) -> u64 {
        self.sim.tick()
    }

    /// Returns the new task id, or throws the drop reason.
    pub fn inject_task(&mut self, energy_need: f64, processing_power_needed: f64, priority: &str) -> Result<String, JsValue> {
        let priority: Priority = priority.parse().map_err(js_err)?;
        let spec = TaskSpec { energy_need, processing_power_needed, priority };
        self.sim
            .inject_task(spec)
            .map(|id| id.to_string())
            .map_err(js_err)
    }

    /// Partial config; applied before the next tick.
    pub fn set_config(&mut self, patch: JsValue) -> Result<(), JsValue> {
        let patch: ConfigPatch = serde_wasm_bindgen::from_value(patch)?;
        self.sim.set_config(&patch).map_err(js_err)
    }

    /// Ids of the carriers sent.
    pub fn launch_carrier(&mut self, count: u32, node_id: &str) -> Result<JsValue, JsValue> {
        let launched = self
            .sim
            .launch_carrier(count as usize, &NodeId::from(node_id))
            .map_err(js_err)?;
        Ok(serde_wasm_bindgen::to_value(&launched)?)
    }

    pub fn snapshot(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.sim.snapshot()).unwrap_or(JsValue::NULL)
    }

    pub fn get_nodes(&self) -> JsValue {
        let nodes: Vec<&Node> = self.sim.world().nodes.values().collect();
        serde_wasm_bindgen::to_value(&nodes).unwrap_or(JsValue::NULL)
    }

    pub fn get_carriers(&self) -> JsValue {
        let carriers: Vec<&Carrier> = self.sim.world().carriers.values().collect();
        serde_wasm_bindgen::to_value(&carriers).unwrap_or(JsValue::NULL)
    }

    pub fn get_ledger_summary(&self) -> JsValue {
        let summary = self.sim.ledger().summary(self.sim.config().average_price_window);
        serde_wasm_bindgen::to_value(&summary).unwrap_or(JsValue::NULL)
    }

    pub fn recent_transactions(&self, limit: u32) -> JsValue {
        serde_wasm_bindgen::to_value(&self.sim.ledger().recent(limit as usize).to_vec()).unwrap_or(JsValue::NULL)
    }

    pub fn get_equilibrium(&self) -> JsValue {
        match self.sim.monitor().last_report() {
            Some(report) => serde_wasm_bindgen::to_value(report).unwrap_or(JsValue::NULL),
            None => JsValue::NULL,
        }
    }

    /// Reset simulation to the seeded state; config is kept.
    pub fn reset(&mut self) {
        self.sim.reset();
    }
}
