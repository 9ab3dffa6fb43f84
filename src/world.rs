// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - World State

//! The single store every component reads and mutates.
//!
//! Nothing here is global: the owning [`Simulation`](crate::simulation::Simulation)
//! passes `&mut WorldState` down the tick pipeline, which keeps mutation
//! single-writer by construction.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};
use tracing::{info, warn};

use crate::config::SimConfig;
use crate::error::DropReason;
use crate::ledger::Ledger;
use crate::types::{Carrier, CarrierStatus, Node, Priority, Snapshot, Task, TaskSpec};
use crate::units::{CarrierId, NodeId, Position, TaskId};

pub const NODE_OWNERS: [&str; 4] = ["OrbitPower Inc", "SkyGrid Energy", "SolarSat Systems", "NexGen Space"];
pub const CARRIER_OWNERS: [&str; 4] = ["DroneFleet Co", "PowerShuttle Ltd", "Orbital Logistics", "Battery Express"];

/// (energy, max_energy, processing_capacity, solar_gen_rate)
const SEED_NODES: [(f64, f64, f64, f64); 4] = [
    (90.0, 120.0, 2500.0, 0.45),
    (65.0, 120.0, 1800.0, 0.35),
    (40.0, 120.0, 2200.0, 0.40),
    (75.0, 120.0, 2000.0, 0.38),
];

/// Baseline housekeeping drain of a seeded node, per tick.
const SEED_CONSUMPTION_RATE: f64 = 0.2;

/// Outcome of queue admission.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub task_id: TaskId,
    /// Queued task evicted to make room.
    pub evicted: Option<Task>,
}

#[derive(Debug, Clone)]
pub struct WorldState {
    pub nodes: BTreeMap<NodeId, Node>,
    pub carriers: BTreeMap<CarrierId, Carrier>,
    pub pending: VecDeque<Task>,
    pub ledger: Ledger,
    next_task: u64,
    next_carrier: u64,
    rng: ChaCha8Rng,
}

impl WorldState {
    /// Empty world; ids and launched-carrier owners derive from `seed`.
    pub fn empty(seed: u64) -> Self {
        Self {
            nodes: BTreeMap::new(),
            carriers: BTreeMap::new(),
            pending: VecDeque::new(),
            ledger: Ledger::new(),
            next_task: 0,
            next_carrier: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Fixed fleet of four nodes plus `seed_carriers` docked carriers.
    ///
    /// Positions and owners are drawn from `config.seed`, so the same seed
    /// always yields the same world.
    pub fn seeded(config: &SimConfig) -> Self {
        let mut world = Self::empty(config.seed);

        for (i, &(energy, max_energy, capacity, solar)) in SEED_NODES.iter().enumerate() {
            let position = Position::new(world.rng.gen_range(-60.0..60.0), world.rng.gen_range(-180.0..180.0));
            let owner = NODE_OWNERS.choose(&mut world.rng).copied().unwrap_or(NODE_OWNERS[0]);
            let node = Node::new(format!("sat-{:02}", i + 1), energy, max_energy, capacity)
                .with_owner(owner)
                .with_position(position)
                .with_rates(solar, SEED_CONSUMPTION_RATE);
            world.add_node(node);
        }

        for _ in 0..config.seed_carriers {
            world.spawn_carrier(config);
        }

        info!(
            seed = config.seed,
            nodes = world.nodes.len(),
            carriers = world.carriers.len(),
            "world seeded"
        );
        world
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn add_carrier(&mut self, carrier: Carrier) {
        self.carriers.insert(carrier.id.clone(), carrier);
    }

    /// New carrier docked at the source with full tanks.
    pub fn spawn_carrier(&mut self, config: &SimConfig) -> CarrierId {
        let id = self.next_carrier_id();
        let owner = CARRIER_OWNERS.choose(&mut self.rng).copied().unwrap_or(CARRIER_OWNERS[0]);
        let carrier = Carrier::new(id.clone(), config.reserve_max, config.payload_max, config.payload_max)
            .with_owner(owner)
            .with_position(config.source_position);
        self.add_carrier(carrier);
        id
    }

    fn next_carrier_id(&mut self) -> CarrierId {
        loop {
            self.next_carrier += 1;
            let id = CarrierId(format!("drone-{:02}", self.next_carrier));
            if !self.carriers.contains_key(&id) {
                return id;
            }
        }
    }

    fn next_task_id(&mut self) -> TaskId {
        self.next_task += 1;
        TaskId(format!("task-{:06}", self.next_task))
    }

    // ─── Task admission ─────────────────────────────────────────────────

    /// Append a task to the pending queue.
    ///
    /// When the queue is full the oldest task of the lowest queued priority
    /// makes room, unless that priority outranks the newcomer, in which case
    /// the newcomer is refused.
    pub fn admit_task(&mut self, spec: &TaskSpec, tick: u64, max_pending: usize) -> Result<Admission, DropReason> {
        let valid = |v: f64| v.is_finite() && v >= 0.0;
        if !valid(spec.energy_need) || !valid(spec.processing_power_needed) {
            warn!(?spec, "task rejected: invalid spec");
            return Err(DropReason::InvalidSpec);
        }

        let mut evicted = None;
        if self.pending.len() >= max_pending {
            let lowest = self.pending.iter().map(|t| t.priority).min().unwrap_or(Priority::Low);
            if lowest > spec.priority {
                warn!(priority = ?spec.priority, "task rejected: pending queue full");
                return Err(DropReason::QueueOverflow);
            }
            if let Some(pos) = self.pending.iter().position(|t| t.priority == lowest) {
                evicted = self.pending.remove(pos);
            }
        }

        let task = Task {
            id: self.next_task_id(),
            energy_need: spec.energy_need,
            processing_power_needed: spec.processing_power_needed,
            priority: spec.priority,
            created_at: tick,
        };
        let task_id = task.id.clone();
        self.pending.push_back(task);
        Ok(Admission { task_id, evicted })
    }

    // ─── Carrier occupancy ──────────────────────────────────────────────

    /// Carriers charging or harvesting at `node`.
    pub fn engaged_at(&self, node: &NodeId) -> usize {
        self.carriers
            .values()
            .filter(|c| c.status.is_engaged() && c.is_targeting(node))
            .count()
    }

    /// Carriers heading to or working at `node`.
    pub fn targeting(&self, node: &NodeId) -> usize {
        self.carriers.values().filter(|c| c.is_targeting(node)).count()
    }

    pub fn in_status_at(&self, node: &NodeId, status: CarrierStatus) -> usize {
        self.carriers
            .values()
            .filter(|c| c.status == status && c.is_targeting(node))
            .count()
    }

    pub fn idle_carriers(&self) -> usize {
        self.carriers.values().filter(|c| c.status.is_idle()).count()
    }

    pub fn active_carriers(&self) -> usize {
        self.carriers.len() - self.idle_carriers()
    }

    // ─── Aggregates ─────────────────────────────────────────────────────

    pub fn total_energy(&self) -> f64 {
        self.nodes.values().map(|n| n.energy).sum()
    }

    pub fn total_capacity(&self) -> f64 {
        self.nodes.values().map(|n| n.max_energy).sum()
    }

    pub fn avg_utilization(&self) -> f64 {
        let capacity = self.total_capacity();
        if capacity <= 0.0 {
            return 0.0;
        }
        self.total_energy() / capacity
    }

    pub fn active_tasks(&self) -> usize {
        self.nodes.values().map(|n| n.tasks.len()).sum()
    }

    pub fn snapshot(&self, tick: u64, price_window: usize) -> Snapshot {
        Snapshot {
            tick,
            nodes: self.nodes.values().cloned().collect(),
            carriers: self.carriers.values().cloned().collect(),
            pending_tasks: self.pending.iter().cloned().collect(),
            ledger_summary: self.ledger.summary(price_window),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;

    fn spec(priority: Priority) -> TaskSpec {
        TaskSpec { energy_need: 2.0, processing_power_needed: 100.0, priority }
    }

    #[test]
    fn seeding_is_deterministic() {
        let cfg = SimConfig::default();
        let a = WorldState::seeded(&cfg);
        let b = WorldState::seeded(&cfg);
        assert_eq!(a.nodes.len(), 4);
        assert_eq!(a.carriers.len(), 2);
        for (na, nb) in a.nodes.values().zip(b.nodes.values()) {
            assert_eq!(na.position, nb.position);
            assert_eq!(na.owner_id, nb.owner_id);
        }
        let energies: Vec<f64> = a.nodes.values().map(|n| n.energy).collect();
        assert_eq!(energies, vec![90.0, 65.0, 40.0, 75.0]);
        assert!(a.carriers.values().all(|c| c.status == CarrierStatus::AtSource && c.payload == cfg.payload_max));
    }

    #[test]
    fn different_seed_moves_nodes() {
        let a = WorldState::seeded(&SimConfig::default());
        let b = WorldState::seeded(&SimConfig { seed: 7, ..SimConfig::default() });
        let pa: Vec<_> = a.nodes.values().map(|n| n.position).collect();
        let pb: Vec<_> = b.nodes.values().map(|n| n.position).collect();
        assert_ne!(pa, pb);
    }

    #[test]
    fn admission_is_fifo_and_ids_increase() {
        let mut world = WorldState::empty(1);
        let a = world.admit_task(&spec(Priority::High), 0, 10).unwrap();
        let b = world.admit_task(&spec(Priority::Low), 0, 10).unwrap();
        assert_eq!(a.task_id.as_str(), "task-000001");
        assert_eq!(b.task_id.as_str(), "task-000002");
        assert_eq!(world.pending[0].id, a.task_id);
        assert_eq!(world.pending[0].priority, Priority::High);
    }

    #[test]
    fn overflow_evicts_oldest_low_priority() {
        let mut world = WorldState::empty(1);
        let high = world.admit_task(&spec(Priority::High), 0, 3).unwrap().task_id;
        let low_old = world.admit_task(&spec(Priority::Low), 0, 3).unwrap().task_id;
        world.admit_task(&spec(Priority::Low), 0, 3).unwrap();
        let adm = world.admit_task(&spec(Priority::Medium), 1, 3).unwrap();
        assert_eq!(adm.evicted.map(|t| t.id), Some(low_old));
        assert_eq!(world.pending.len(), 3);
        assert_eq!(world.pending[0].id, high);
    }

    #[test]
    fn overflow_refuses_lower_priority_newcomer() {
        let mut world = WorldState::empty(1);
        world.admit_task(&spec(Priority::High), 0, 1).unwrap();
        assert_eq!(world.admit_task(&spec(Priority::Medium), 0, 1), Err(DropReason::QueueOverflow));
        assert_eq!(world.pending.len(), 1);
    }

    #[test]
    fn invalid_spec_rejected() {
        let mut world = WorldState::empty(1);
        let bad = TaskSpec { energy_need: f64::NAN, processing_power_needed: 1.0, priority: Priority::Low };
        assert_eq!(world.admit_task(&bad, 0, 10), Err(DropReason::InvalidSpec));
    }

    #[test]
    fn occupancy_counts_by_target() {
        let mut world = WorldState::empty(1);
        let node = NodeId::from("sat-01");
        world.add_carrier(Carrier::new("d1", 100.0, 50.0, 120.0).with_status(CarrierStatus::Charging, Some(Target::Node(node.clone()))));
        world.add_carrier(Carrier::new("d2", 100.0, 50.0, 120.0).with_status(CarrierStatus::Enroute, Some(Target::Node(node.clone()))));
        world.add_carrier(Carrier::new("d3", 100.0, 50.0, 120.0));
        assert_eq!(world.engaged_at(&node), 1);
        assert_eq!(world.targeting(&node), 2);
        assert_eq!(world.idle_carriers(), 1);
        assert_eq!(world.active_carriers(), 2);
    }

    #[test]
    fn spawned_carrier_ids_skip_taken() {
        let cfg = SimConfig::default();
        let mut world = WorldState::empty(1);
        world.add_carrier(Carrier::new("drone-01", 1.0, 1.0, 1.0));
        let id = world.spawn_carrier(&cfg);
        assert_eq!(id.as_str(), "drone-02");
        assert_eq!(world.carriers[&id].reserve, cfg.reserve_max);
    }
}
