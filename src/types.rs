// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Type Definitions

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerSummary;
use crate::units::{CarrierId, Credits, NodeId, Position, TaskId};

// ─── Priority ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Default for Priority {
    fn default() -> Self { Priority::Low }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

// ─── Task ────────────────────────────────────────────────────────────────────

/// Caller-supplied description of a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub energy_need: f64,
    pub processing_power_needed: f64,
    #[serde(default)]
    pub priority: Priority,
}

/// A work item waiting in the pending queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub energy_need: f64,
    pub processing_power_needed: f64,
    pub priority: Priority,
    /// Tick at which the task was admitted.
    pub created_at: u64,
}

/// A task owned by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task_id: TaskId,
    pub remaining_energy: f64,
    /// Processing capacity reserved on the node until completion.
    pub processing_reserved: f64,
    /// Completion fraction in [0, 1].
    pub progress: f64,
    pub priority: Priority,
    pub assigned_at: u64,
}

// ─── Node ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub energy: f64,
    pub max_energy: f64,
    /// Baseline drain per tick, independent of tasks.
    pub consumption_rate: f64,
    pub solar_gen_rate: f64,
    pub processing_capacity: f64,
    pub tasks: Vec<TaskAssignment>,
    pub owner_id: String,
    pub position: Position,
    pub price_per_unit: Credits,
    pub total_revenue: Credits,
    pub total_energy_sold: f64,
}

impl Node {
    /// Idle node with no generation or baseline drain.
    pub fn new(id: impl Into<NodeId>, energy: f64, max_energy: f64, processing_capacity: f64) -> Self {
        Self {
            id: id.into(),
            energy,
            max_energy,
            consumption_rate: 0.0,
            solar_gen_rate: 0.0,
            processing_capacity,
            tasks: Vec::new(),
            owner_id: String::new(),
            position: Position::default(),
            price_per_unit: Credits::zero(),
            total_revenue: Credits::zero(),
            total_energy_sold: 0.0,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner_id = owner.into();
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_rates(mut self, solar_gen_rate: f64, consumption_rate: f64) -> Self {
        self.solar_gen_rate = solar_gen_rate;
        self.consumption_rate = consumption_rate;
        self
    }

    pub fn utilization(&self) -> f64 {
        if self.max_energy <= 0.0 {
            return 0.0;
        }
        (self.energy / self.max_energy).clamp(0.0, 1.0)
    }

    /// Processing capacity currently reserved by assigned tasks.
    pub fn processing_in_use(&self) -> f64 {
        self.tasks.iter().map(|t| t.processing_reserved).sum()
    }

    pub fn spare_processing(&self) -> f64 {
        (self.processing_capacity - self.processing_in_use()).max(0.0)
    }

    pub fn queue_len(&self) -> usize {
        self.tasks.len()
    }
}

// ─── Carrier ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CarrierStatus {
    AtSource,
    Enroute,
    Charging,
    Harvesting,
    Standby,
    Returning,
}

impl CarrierStatus {
    /// Idle carriers may be dispatched.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::AtSource | Self::Standby)
    }

    /// Working a node: counts against the per-node concurrency cap.
    pub fn is_engaged(&self) -> bool {
        matches!(self, Self::Charging | Self::Harvesting)
    }

    pub fn requires_target(&self) -> bool {
        !self.is_idle()
    }
}

/// Where a carrier is heading or working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    Node(NodeId),
    Source,
}

impl Target {
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            Target::Node(id) => Some(id),
            Target::Source => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carrier {
    pub id: CarrierId,
    /// Mobility fuel.
    pub reserve: f64,
    /// Energy carried for delivery.
    pub payload: f64,
    pub payload_max: f64,
    pub status: CarrierStatus,
    pub target: Option<Target>,
    pub owner_id: String,
    pub position: Position,
    /// Kilometres left on the current leg.
    #[serde(default)]
    pub leg_remaining_km: f64,
    /// Ticks spent in the current status.
    #[serde(default)]
    pub state_ticks: u32,
    /// Consecutive ticks without a transfer or arrival.
    #[serde(default)]
    pub stalled_ticks: u32,
    pub total_spent: Credits,
    pub total_energy_bought: f64,
}

impl Carrier {
    /// Docked carrier with the given tanks.
    pub fn new(id: impl Into<CarrierId>, reserve: f64, payload: f64, payload_max: f64) -> Self {
        Self {
            id: id.into(),
            reserve,
            payload,
            payload_max,
            status: CarrierStatus::AtSource,
            target: None,
            owner_id: String::new(),
            position: Position::default(),
            leg_remaining_km: 0.0,
            state_ticks: 0,
            stalled_ticks: 0,
            total_spent: Credits::zero(),
            total_energy_bought: 0.0,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner_id = owner.into();
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Place the carrier mid-mission; the caller keeps `status` and `target` consistent.
    pub fn with_status(mut self, status: CarrierStatus, target: Option<Target>) -> Self {
        self.status = status;
        self.target = target;
        self
    }

    pub fn target_node(&self) -> Option<&NodeId> {
        self.target.as_ref().and_then(Target::node)
    }

    pub fn is_targeting(&self, node: &NodeId) -> bool {
        self.target_node() == Some(node)
    }

    /// `status` and `target` agree: idle carriers have none, all others have one.
    pub fn is_consistent(&self) -> bool {
        self.status.requires_target() == self.target.is_some()
            && match self.status {
                CarrierStatus::Returning => self.target == Some(Target::Source),
                CarrierStatus::Charging | CarrierStatus::Harvesting => self.target_node().is_some(),
                _ => true,
            }
    }
}

// ─── TickSummary ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: u64,
    pub node_count: usize,
    pub carrier_count: usize,
    pub pending_tasks: usize,
    pub active_tasks: usize,
    pub tasks_assigned: u32,
    pub tasks_completed: u32,
    pub tasks_dropped: u32,
    pub total_energy: f64,
    pub total_capacity: f64,
    pub net_energy_delta: f64,
    pub transactions: usize,
    pub volume_delta: Credits,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Read-only view of the world as of the last completed tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub nodes: Vec<Node>,
    pub carriers: Vec<Carrier>,
    pub pending_tasks: Vec<Task>,
    pub ledger_summary: LedgerSummary,
}

impl Snapshot {
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn carrier(&self, id: &CarrierId) -> Option<&Carrier> {
        self.carriers.iter().find(|c| &c.id == id)
    }
}
