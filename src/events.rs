// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Events

//! Closed event vocabulary and the non-blocking sinks that consume it.
//!
//! Components push into an [`EventBuffer`] while a tick runs; the clock hands
//! the finished buffer to every [`EventSink`] afterwards. Sinks must return
//! promptly: a slow consumer loses events, it never stalls a tick.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;
use tracing::debug;

use crate::equilibrium::EquilibriumReport;
use crate::error::DropReason;
use crate::ledger::TxKind;
use crate::types::{CarrierStatus, Priority, Target, TickSummary};
use crate::units::{CarrierId, Credits, NodeId, TaskId, TxId};

// ---------------------------------------------------------------------------
// Event vocabulary
// ---------------------------------------------------------------------------

/// Why a carrier was sent back to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallReason {
    NoMission,
    InsufficientReserve,
    ReserveExhausted,
    TargetLost,
}

/// Why a charging or harvesting stint ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionEnd {
    NodeFull,
    PayloadEmpty,
    PayloadFull,
    SourceDrained,
    MaxDwell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    /// Nested so the summary's own `tick` does not collide with the envelope.
    #[serde(rename = "tick")]
    Tick { summary: TickSummary },

    #[serde(rename = "task.created")]
    TaskCreated { task_id: TaskId, priority: Priority },
    #[serde(rename = "task.assigned")]
    TaskAssigned { task_id: TaskId, node_id: NodeId, score: f64 },
    #[serde(rename = "task.completed")]
    TaskCompleted { task_id: TaskId, node_id: NodeId },
    #[serde(rename = "task.dropped")]
    TaskDropped { task_id: TaskId, reason: DropReason },

    #[serde(rename = "carrier.launched")]
    CarrierLaunched { carrier_id: CarrierId, node_id: NodeId, auto: bool },
    #[serde(rename = "carrier.enroute")]
    CarrierEnroute { carrier_id: CarrierId, target: Target, eta_ticks: u32 },
    #[serde(rename = "carrier.arrived")]
    CarrierArrived { carrier_id: CarrierId, target: Target },
    #[serde(rename = "carrier.charging_started")]
    CarrierChargingStarted { carrier_id: CarrierId, node_id: NodeId },
    #[serde(rename = "carrier.harvesting_started")]
    CarrierHarvestingStarted { carrier_id: CarrierId, node_id: NodeId },
    #[serde(rename = "carrier.charged")]
    CarrierCharged { carrier_id: CarrierId, node_id: NodeId, amount: f64 },
    #[serde(rename = "carrier.harvested")]
    CarrierHarvested { carrier_id: CarrierId, node_id: NodeId, amount: f64, cost: Credits },
    #[serde(rename = "carrier.recharged")]
    CarrierRecharged { carrier_id: CarrierId, amount: f64 },
    #[serde(rename = "carrier.recalled")]
    CarrierRecalled { carrier_id: CarrierId, reason: RecallReason },
    #[serde(rename = "carrier.mission_complete")]
    CarrierMissionComplete { carrier_id: CarrierId, node_id: NodeId, reason: MissionEnd },
    #[serde(rename = "carrier.timeout_recovery")]
    CarrierTimeoutRecovery { carrier_id: CarrierId, stuck_in: CarrierStatus, ticks: u32 },

    #[serde(rename = "alert.low_energy")]
    AlertLowEnergy { node_id: NodeId, energy: f64 },
    #[serde(rename = "alert.overloaded")]
    AlertOverloaded { node_id: NodeId, tasks: usize, processing_in_use: f64 },
    #[serde(rename = "alert.blackout_avoided")]
    AlertBlackoutAvoided { node_id: NodeId, energy: f64 },
    #[serde(rename = "alert.state_corrected")]
    AlertStateCorrected { entity: String, field: String, observed: f64, clamped: f64 },

    #[serde(rename = "transaction.completed")]
    TransactionCompleted {
        tx_id: TxId,
        from: String,
        to: String,
        amount: f64,
        cost: Credits,
        kind: TxKind,
    },

    #[serde(rename = "equilibrium.update")]
    EquilibriumUpdate { report: EquilibriumReport },

    #[serde(rename = "config.applied")]
    ConfigApplied,
    #[serde(rename = "sim.reset")]
    SimReset { config_reset: bool },
}

impl EventKind {
    /// Wire name, e.g. `carrier.harvested`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tick { .. } => "tick",
            Self::TaskCreated { .. } => "task.created",
            Self::TaskAssigned { .. } => "task.assigned",
            Self::TaskCompleted { .. } => "task.completed",
            Self::TaskDropped { .. } => "task.dropped",
            Self::CarrierLaunched { .. } => "carrier.launched",
            Self::CarrierEnroute { .. } => "carrier.enroute",
            Self::CarrierArrived { .. } => "carrier.arrived",
            Self::CarrierChargingStarted { .. } => "carrier.charging_started",
            Self::CarrierHarvestingStarted { .. } => "carrier.harvesting_started",
            Self::CarrierCharged { .. } => "carrier.charged",
            Self::CarrierHarvested { .. } => "carrier.harvested",
            Self::CarrierRecharged { .. } => "carrier.recharged",
            Self::CarrierRecalled { .. } => "carrier.recalled",
            Self::CarrierMissionComplete { .. } => "carrier.mission_complete",
            Self::CarrierTimeoutRecovery { .. } => "carrier.timeout_recovery",
            Self::AlertLowEnergy { .. } => "alert.low_energy",
            Self::AlertOverloaded { .. } => "alert.overloaded",
            Self::AlertBlackoutAvoided { .. } => "alert.blackout_avoided",
            Self::AlertStateCorrected { .. } => "alert.state_corrected",
            Self::TransactionCompleted { .. } => "transaction.completed",
            Self::EquilibriumUpdate { .. } => "equilibrium.update",
            Self::ConfigApplied => "config.applied",
            Self::SimReset { .. } => "sim.reset",
        }
    }
}

/// One emitted record, stamped with the tick that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// Ordered events produced while a tick (or a control operation) runs.
#[derive(Debug, Default)]
pub struct EventBuffer {
    tick: u64,
    events: Vec<SimEvent>,
}

impl EventBuffer {
    pub fn new(tick: u64) -> Self {
        Self { tick, events: Vec::new() }
    }

    pub fn push(&mut self, kind: EventKind) {
        debug!(tick = self.tick, event = kind.name(), "event");
        self.events.push(SimEvent { tick: self.tick, kind });
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.kind.name() == name).count()
    }

    pub fn into_events(self) -> Vec<SimEvent> {
        self.events
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Consumer of emitted events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &SimEvent);
}

/// Bounded in-memory log; the oldest entry is evicted when full.
pub struct EventLog {
    capacity: usize,
    entries: Mutex<VecDeque<SimEvent>>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
        }
    }

    /// Newest `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<SimEvent> {
        let entries = self.entries.lock();
        let start = entries.len().saturating_sub(limit);
        entries.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl EventSink for EventLog {
    fn publish(&self, event: &SimEvent) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(event.clone());
    }
}

/// Forwards events over a bounded channel, dropping when the receiver lags.
pub struct ChannelSink {
    tx: Mutex<SyncSender<SimEvent>>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new(tx: SyncSender<SimEvent>) -> Self {
        Self { tx: Mutex::new(tx), dropped: AtomicU64::new(0) }
    }

    /// Events discarded because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: &SimEvent) {
        match self.tx.lock().try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Fan-out over every registered sink.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn publish_all(&self, events: &[SimEvent]) {
        for event in events {
            for sink in &self.sinks {
                sink.publish(event);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
