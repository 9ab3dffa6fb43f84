// Scenario Definitions - load, energy, carrier and control-plane stress
// Zero engine changes: all scenario logic is in config tweaks, load curves and setup/event closures

use orbital_grid_engine::{ConfigPatch, NodeId, SimConfig, Simulation};
use tracing::warn;

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub ticks: u64,
    /// Task load; 1.0 roughly saturates the seeded fleet.
    pub load: f64,
    pub load_curve: Option<fn(u64) -> f64>,
    /// Applied to the default config before the run is seeded.
    pub tweak: Option<fn(&mut SimConfig)>,
    pub criteria: PassCriteria,
    /// Pre-run setup (e.g., drain nodes, empty payloads)
    pub setup: Option<Box<dyn Fn(&mut Simulation) + Send + Sync>>,
    /// Mid-simulation events (e.g., launch carriers at a specific tick)
    pub mid_event: Option<Box<dyn Fn(&mut Simulation, u64) + Send + Sync>>,
}

pub struct PassCriteria {
    pub max_invariant_violations: u32,
    pub max_state_corrections: Option<u32>,
    pub min_completion_rate: Option<f64>,
    pub min_harvests: Option<usize>,
    pub min_charges: Option<usize>,
    pub max_auto_launches: Option<u32>,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            max_invariant_violations: 0,
            max_state_corrections: Some(0),
            min_completion_rate: None,
            min_harvests: None,
            min_charges: None,
            max_auto_launches: None,
        }
    }
}

// ─── Curve Functions ────────────────────────────────────────────────────────

/// One orbit of day/night demand every 200 ticks.
fn diurnal_load(tick: u64) -> f64 {
    let t = tick as f64;
    0.6 + 0.5 * (t * std::f64::consts::PI / 100.0).sin()
}

/// Quiet, then a sustained surge from tick 150 to 300.
fn surge_load(tick: u64) -> f64 {
    if (150..300).contains(&tick) { 2.5 } else { 0.3 }
}

// ─── Config Tweaks ──────────────────────────────────────────────────────────

fn distance_travel(config: &mut SimConfig) {
    config.travel_instant = false;
    config.speed_km_per_tick = 1500.0;
}

fn manual_only(config: &mut SimConfig) {
    config.auto_dispatch_enabled = false;
}

fn large_fleet(config: &mut SimConfig) {
    config.seed_carriers = 8;
}

// ─── Setup / Event Helpers ──────────────────────────────────────────────────

fn set_solar(sim: &mut Simulation, rate: f64) {
    for node in sim.world_mut().nodes.values_mut() {
        node.solar_gen_rate = rate;
    }
}

fn empty_payloads(sim: &mut Simulation) {
    for carrier in sim.world_mut().carriers.values_mut() {
        carrier.payload = 0.0;
    }
}

fn drain_node(sim: &mut Simulation, node: &str, energy: f64) {
    if let Some(node) = sim.world_mut().nodes.get_mut(&NodeId::from(node)) {
        node.energy = energy;
    }
}

fn launch(sim: &mut Simulation, count: usize, node: &str) {
    if let Err(err) = sim.launch_carrier(count, &NodeId::from(node)) {
        warn!(node, %err, "scenario launch failed");
    }
}

// ─── Scenario Definitions ───────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        // ─── Task Load (4) ──────────────────────────────────────────────
        Scenario { name: "BASELINE", label: "Baseline", category: "load",
            ticks: 600, load: 0.5, load_curve: None, tweak: None,
            criteria: PassCriteria { min_completion_rate: Some(50.0), ..Default::default() },
            setup: None, mid_event: None },
        Scenario { name: "SATURATION", label: "Saturation", category: "load",
            ticks: 400, load: 1.5, load_curve: None, tweak: None,
            criteria: PassCriteria::default(),
            setup: None, mid_event: None },
        Scenario { name: "DIURNAL", label: "Diurnal Demand", category: "load",
            ticks: 800, load: 0.6, load_curve: Some(diurnal_load), tweak: None,
            criteria: PassCriteria::default(),
            setup: None, mid_event: None },
        Scenario { name: "SURGE", label: "Demand Surge", category: "load",
            ticks: 450, load: 0.3, load_curve: Some(surge_load), tweak: None,
            criteria: PassCriteria::default(),
            setup: None, mid_event: None },

        // ─── Energy (2) ─────────────────────────────────────────────────
        Scenario { name: "SOLAR_DROUGHT", label: "Solar Drought", category: "energy",
            ticks: 600, load: 0.8, load_curve: None, tweak: Some(large_fleet),
            criteria: PassCriteria::default(),
            setup: Some(Box::new(|sim| set_solar(sim, 0.05))), mid_event: None },
        Scenario { name: "NODE_BLACKOUT", label: "Node Blackout Rescue", category: "energy",
            ticks: 300, load: 0.5, load_curve: None, tweak: None,
            criteria: PassCriteria { min_charges: Some(1), ..Default::default() },
            setup: None,
            mid_event: Some(Box::new(|sim, tick| {
                if tick == 100 {
                    drain_node(sim, "sat-03", 5.0);
                    launch(sim, 1, "sat-03");
                }
            })) },

        // ─── Carriers (2) ───────────────────────────────────────────────
        Scenario { name: "HARVEST_MARKET", label: "Harvest Market", category: "carrier",
            ticks: 300, load: 0.3, load_curve: None, tweak: Some(large_fleet),
            criteria: PassCriteria { min_harvests: Some(1), ..Default::default() },
            setup: Some(Box::new(|sim| {
                empty_payloads(sim);
                launch(sim, 1, "sat-01");
                launch(sim, 1, "sat-04");
            })),
            mid_event: None },
        Scenario { name: "DISTANCE_TRAVEL", label: "Distance-Mode Travel", category: "carrier",
            ticks: 400, load: 0.5, load_curve: None, tweak: Some(distance_travel),
            criteria: PassCriteria::default(),
            setup: None,
            mid_event: Some(Box::new(|sim, tick| {
                if tick == 50 {
                    drain_node(sim, "sat-02", 12.0);
                    launch(sim, 2, "sat-02");
                }
            })) },

        // ─── Control Plane (3) ──────────────────────────────────────────
        Scenario { name: "MANUAL_DISPATCH", label: "Auto-Dispatch Off", category: "control",
            ticks: 500, load: 1.0, load_curve: None, tweak: Some(manual_only),
            criteria: PassCriteria { max_auto_launches: Some(0), ..Default::default() },
            setup: Some(Box::new(|sim| set_solar(sim, 0.1))), mid_event: None },
        Scenario { name: "CONFIG_HOT_SWAP", label: "Config Hot Swap", category: "control",
            ticks: 400, load: 0.6, load_curve: None, tweak: None,
            criteria: PassCriteria::default(),
            setup: None,
            mid_event: Some(Box::new(|sim, tick| {
                if tick == 200 {
                    let patch = ConfigPatch {
                        harvest_rate: Some(5.0),
                        charge_rate: Some(12.0),
                        travel_instant: Some(false),
                        ..Default::default()
                    };
                    if let Err(err) = sim.set_config(&patch) {
                        warn!(%err, "scenario config patch rejected");
                    }
                }
            })) },
        Scenario { name: "MID_RUN_RESET", label: "Mid-Run Reset", category: "control",
            ticks: 400, load: 0.5, load_curve: None, tweak: None,
            criteria: PassCriteria::default(),
            setup: None,
            mid_event: Some(Box::new(|sim, tick| {
                if tick == 200 {
                    sim.reset();
                }
            })) },
    ]
}
