// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Simulation Core

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::carrier::CarrierRouter;
use crate::config::{ConfigPatch, SimConfig};
use crate::delegator::Delegator;
use crate::equilibrium::{EnergySample, EquilibriumMonitor, EquilibriumReport};
use crate::error::{DropReason, EngineError};
use crate::events::{EventBuffer, EventKind, SimEvent};
use crate::ledger::Ledger;
use crate::pricing::PricingEngine;
use crate::types::{CarrierStatus, Snapshot, TaskSpec, TickSummary};
use crate::units::{CarrierId, NodeId, TaskId};
use crate::world::WorldState;

/// Everything one tick produced, in pipeline order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResult {
    pub summary: TickSummary,
    pub events: Vec<SimEvent>,
    pub equilibrium: Option<EquilibriumReport>,
}

/// Energy bookkeeping from the node step.
#[derive(Debug, Default, Clone, Copy)]
struct NodeStep {
    generated: f64,
    consumed: f64,
    completed: u32,
    dropped: u32,
}

// ─── Simulation ─────────────────────────────────────────────────────────────

/// Single-owner simulation core. Every mutation takes `&mut self`, so ticks
/// are serialised by the borrow checker; sharing across threads goes through
/// [`EngineHandle`](crate::clock::EngineHandle).
#[derive(Debug, Clone)]
pub struct Simulation {
    pub(crate) config: SimConfig,
    pub(crate) world: WorldState,
    pub(crate) pricing: PricingEngine,
    pub(crate) delegator: Delegator,
    pub(crate) monitor: EquilibriumMonitor,
    /// Validated config waiting for the next tick boundary.
    pub(crate) staged: Option<SimConfig>,
    pub(crate) tick: u64,
    /// Events raised by control operations between ticks.
    pub(crate) outbox: Vec<SimEvent>,
}

impl Simulation {
    /// Seeded world built from `config`.
    pub fn new(config: SimConfig) -> Result<Self, EngineError> {
        let world = WorldState::seeded(&config);
        Self::with_world(config, world)
    }

    /// Run over a caller-built world.
    pub fn with_world(config: SimConfig, mut world: WorldState) -> Result<Self, EngineError> {
        config.validate()?;
        let pricing = PricingEngine::new(config.base_price);
        refresh_prices(&pricing, &mut world);
        Ok(Self {
            delegator: Delegator::from_config(&config),
            monitor: EquilibriumMonitor::new(),
            staged: None,
            tick: 0,
            outbox: Vec::new(),
            config,
            world,
            pricing,
        })
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Direct store access between ticks, for fixtures and tooling.
    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn ledger(&self) -> &Ledger {
        &self.world.ledger
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    pub fn monitor(&self) -> &EquilibriumMonitor {
        &self.monitor
    }

    pub fn staged_config(&self) -> Option<&SimConfig> {
        self.staged.as_ref()
    }

    // ─── Tick pipeline ──────────────────────────────────────────────────

    pub fn tick_core(&mut self) -> TickResult {
        self.tick += 1;
        let tick = self.tick;
        let mut events = EventBuffer::new(tick);

        if let Some(next) = self.staged.take() {
            self.install_config(next);
            info!(tick, "staged config applied");
            events.push(EventKind::ConfigApplied);
        }
        let volume_before = self.world.ledger.total_volume();

        // 1. Generation, baseline drain and task execution
        let nodes = step_nodes(&self.config, &mut self.world, tick, &mut events);

        // 2. Drain the pending queue through the delegator, oldest first
        let (assigned, no_capacity) = self.delegate(&mut events);

        // 3. Carriers
        let router = CarrierRouter::new(&self.config, &self.pricing);
        let flows = router.step_all(&mut self.world, tick, &mut events);

        // 4. Equilibrium window, check and auto-dispatch
        let net_delta = nodes.generated - nodes.consumed - flows.harvested_out + flows.charged_in;
        self.monitor.record(
            EnergySample { net_delta, utilization: self.world.avg_utilization() },
            self.config.window_ticks,
        );
        let mut equilibrium = None;
        if self.monitor.is_due(tick, &self.config) {
            let report = self.monitor.check(&self.world, tick, &self.config);
            events.push(EventKind::EquilibriumUpdate { report: report.clone() });
            if EquilibriumMonitor::wants_dispatch(&report, &self.config) {
                let plan = EquilibriumMonitor::plan_dispatch(&report, &self.world, &self.config, &router);
                for (carrier_id, node_id) in plan {
                    if let Err(err) = router.dispatch(&mut self.world, &carrier_id, &node_id, true, &mut events) {
                        warn!(carrier = %carrier_id, node = %node_id, %err, "auto-dispatch failed");
                    }
                }
            }
            equilibrium = Some(report);
        }

        // 5. Invariant guard and prices for the next tick
        guard_invariants(&mut self.world, &mut events);
        refresh_prices(&self.pricing, &mut self.world);

        // 6. Summary
        let summary = TickSummary {
            tick,
            node_count: self.world.nodes.len(),
            carrier_count: self.world.carriers.len(),
            pending_tasks: self.world.pending.len(),
            active_tasks: self.world.active_tasks(),
            tasks_assigned: assigned,
            tasks_completed: nodes.completed,
            tasks_dropped: nodes.dropped + no_capacity,
            total_energy: self.world.total_energy(),
            total_capacity: self.world.total_capacity(),
            net_energy_delta: net_delta,
            transactions: flows.transactions,
            volume_delta: self.world.ledger.total_volume() - volume_before,
        };
        events.push(EventKind::Tick { summary: summary.clone() });
        debug!(tick, net_delta, transactions = flows.transactions, "tick complete");

        let mut all = std::mem::take(&mut self.outbox);
        all.extend(events.into_events());
        TickResult { summary, events: all, equilibrium }
    }

    /// Run `ticks` ticks, discarding results.
    pub fn run_batch(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick_core();
        }
    }

    fn delegate(&mut self, events: &mut EventBuffer) -> (u32, u32) {
        let tick = self.tick;
        let pending = std::mem::take(&mut self.world.pending);
        let (mut assigned, mut dropped) = (0, 0);

        for task in pending {
            match self.delegator.assign(&task, &mut self.world.nodes, tick) {
                Ok(placement) => {
                    assigned += 1;
                    events.push(EventKind::TaskAssigned {
                        task_id: task.id.clone(),
                        node_id: placement.node_id.clone(),
                        score: placement.score,
                    });
                    if placement.saturated {
                        if let Some(node) = self.world.nodes.get(&placement.node_id) {
                            events.push(EventKind::AlertOverloaded {
                                node_id: node.id.clone(),
                                tasks: node.queue_len(),
                                processing_in_use: node.processing_in_use(),
                            });
                        }
                    }
                }
                Err(reason) => {
                    dropped += 1;
                    let err = EngineError::NoCapacity { task: task.id.clone() };
                    warn!(%err, need = task.processing_power_needed, "task dropped");
                    events.push(EventKind::TaskDropped { task_id: task.id.clone(), reason });
                }
            }
        }
        (assigned, dropped)
    }

    fn install_config(&mut self, config: SimConfig) {
        self.pricing = PricingEngine::new(config.base_price);
        self.delegator = Delegator::from_config(&config);
        self.config = config;
    }

    fn emit(&mut self, kind: EventKind) {
        debug!(tick = self.tick, event = kind.name(), "control event");
        self.outbox.push(SimEvent { tick: self.tick, kind });
    }

    // ─── Control operations ─────────────────────────────────────────────

    /// Queue a task for delegation on the next tick.
    pub fn inject_task(&mut self, spec: TaskSpec) -> Result<TaskId, DropReason> {
        let admission = self.world.admit_task(&spec, self.tick, self.config.max_pending_tasks)?;
        if let Some(evicted) = admission.evicted {
            warn!(task = %evicted.id, "pending queue full, evicted oldest low-priority task");
            self.emit(EventKind::TaskDropped { task_id: evicted.id, reason: DropReason::QueueOverflow });
        }
        self.emit(EventKind::TaskCreated { task_id: admission.task_id.clone(), priority: spec.priority });
        Ok(admission.task_id)
    }

    /// Validate `patch` against the current (or already staged) config and
    /// stage the result for the next tick. Nothing changes on error.
    pub fn set_config(&mut self, patch: &ConfigPatch) -> Result<(), EngineError> {
        let base = self.staged.as_ref().unwrap_or(&self.config);
        match base.patched(patch) {
            Ok(next) => {
                debug!(?patch, "config patch staged");
                self.staged = Some(next);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "config patch rejected");
                Err(err)
            }
        }
    }

    /// Stage a complete replacement config.
    pub fn apply_config(&mut self, config: SimConfig) -> Result<(), EngineError> {
        if let Err(err) = config.validate() {
            warn!(%err, "config rejected");
            return Err(err);
        }
        self.staged = Some(config);
        Ok(())
    }

    /// Back to the seeded world with an empty ledger. Config is kept.
    pub fn reset(&mut self) {
        self.world = WorldState::seeded(&self.config);
        refresh_prices(&self.pricing, &mut self.world);
        self.monitor.clear();
        self.tick = 0;
        self.outbox.clear();
        info!(seed = self.config.seed, "simulation reset");
        self.emit(EventKind::SimReset { config_reset: false });
    }

    /// Reset and replace the config in one step.
    pub fn reset_with_config(&mut self, config: SimConfig) -> Result<(), EngineError> {
        config.validate()?;
        self.install_config(config);
        self.staged = None;
        self.reset();
        if let Some(last) = self.outbox.last_mut() {
            last.kind = EventKind::SimReset { config_reset: true };
        }
        Ok(())
    }

    /// Send up to `count` carriers to `node_id` now, bypassing the monitor.
    ///
    /// Docked carriers go first, then parked ones; the fleet grows with
    /// fresh carriers at the source when that is not enough. Carriers that
    /// cannot reach the node are skipped.
    pub fn launch_carrier(&mut self, count: usize, node_id: &NodeId) -> Result<Vec<CarrierId>, EngineError> {
        let dest = self
            .world
            .nodes
            .get(node_id)
            .map(|n| n.position)
            .ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;

        let router = CarrierRouter::new(&self.config, &self.pricing);
        let mut events = EventBuffer::new(self.tick);
        let mut launched = Vec::new();

        let idle: Vec<CarrierId> = [CarrierStatus::AtSource, CarrierStatus::Standby]
            .iter()
            .flat_map(|status| {
                self.world
                    .carriers
                    .values()
                    .filter(move |c| c.status == *status)
                    .map(|c| c.id.clone())
            })
            .collect();

        for carrier_id in idle {
            if launched.len() >= count {
                break;
            }
            match router.dispatch(&mut self.world, &carrier_id, node_id, false, &mut events) {
                Ok(()) => launched.push(carrier_id),
                Err(err) => debug!(carrier = %carrier_id, %err, "skipping carrier for launch"),
            }
        }

        let fresh_cost = router.leg_cost(&self.config.source_position, &dest) + self.config.reserve_min_to_continue;
        while launched.len() < count {
            if self.config.reserve_max < fresh_cost {
                warn!(node = %node_id, requested = count, launched = launched.len(), "target out of range for new carriers");
                break;
            }
            let carrier_id = self.world.spawn_carrier(&self.config);
            info!(carrier = %carrier_id, "carrier added to fleet");
            if let Err(err) = router.dispatch(&mut self.world, &carrier_id, node_id, false, &mut events) {
                warn!(carrier = %carrier_id, %err, "new carrier could not launch; left at source");
                break;
            }
            launched.push(carrier_id);
        }

        self.outbox.extend(events.into_events());
        Ok(launched)
    }

    /// Take events raised by control operations since the last tick.
    pub fn take_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// State as of the last completed tick.
    pub fn snapshot(&self) -> Snapshot {
        self.world.snapshot(self.tick, self.config.average_price_window)
    }
}

// ─── Node step ──────────────────────────────────────────────────────────────

fn step_nodes(config: &SimConfig, world: &mut WorldState, tick: u64, events: &mut EventBuffer) -> NodeStep {
    let mut step = NodeStep::default();

    for node in world.nodes.values_mut() {
        // Generation first; anything over capacity is lost.
        if node.energy < node.max_energy {
            let before = node.energy;
            node.energy = (node.energy + node.solar_gen_rate.max(0.0)).min(node.max_energy);
            step.generated += node.energy - before;
        }

        let baseline = node.consumption_rate.max(0.0).min(node.energy.max(0.0));
        node.energy -= baseline;
        step.consumed += baseline;

        let mut kept = Vec::with_capacity(node.tasks.len());
        for mut task in std::mem::take(&mut node.tasks) {
            if tick.saturating_sub(task.assigned_at) > config.task_max_ticks {
                warn!(task = %task.task_id, node = %node.id, "task timed out");
                step.dropped += 1;
                events.push(EventKind::TaskDropped { task_id: task.task_id, reason: DropReason::Timeout });
                continue;
            }

            let burn = config.task_energy_rate.min(task.remaining_energy.max(0.0));
            if node.energy >= burn {
                node.energy -= burn;
                step.consumed += burn;
                task.remaining_energy -= burn;
                task.progress += config.task_progress_rate;
            } else {
                task.progress += config.task_progress_rate * config.starved_progress_factor;
            }

            if task.progress >= 1.0 || task.remaining_energy <= 0.0 {
                step.completed += 1;
                events.push(EventKind::TaskCompleted { task_id: task.task_id, node_id: node.id.clone() });
            } else {
                kept.push(task);
            }
        }
        node.tasks = kept;

        if node.energy < config.low_energy_alert {
            events.push(EventKind::AlertLowEnergy { node_id: node.id.clone(), energy: node.energy });
        }
    }
    step
}

// ─── Invariant guard ────────────────────────────────────────────────────────

fn clamp_field(value: &mut f64, max: f64, entity: &str, field: &'static str, events: &mut EventBuffer) {
    let clamped = if value.is_finite() { value.clamp(0.0, max.max(0.0)) } else { 0.0 };
    if clamped != *value {
        let err = EngineError::StateCorruption { entity: entity.to_string(), field, value: *value };
        error!(%err, clamped, "invariant violated, clamping");
        events.push(EventKind::AlertStateCorrected {
            entity: entity.to_string(),
            field: field.to_string(),
            observed: *value,
            clamped,
        });
        *value = clamped;
    }
}

/// Clamp every bounded quantity back into range, reporting each repair.
fn guard_invariants(world: &mut WorldState, events: &mut EventBuffer) {
    for node in world.nodes.values_mut() {
        let max = node.max_energy;
        clamp_field(&mut node.energy, max, node.id.as_str(), "energy", events);
    }
    for carrier in world.carriers.values_mut() {
        let max = carrier.payload_max;
        clamp_field(&mut carrier.payload, max, carrier.id.as_str(), "payload", events);
        clamp_field(&mut carrier.reserve, f64::MAX, carrier.id.as_str(), "reserve", events);
    }
}

fn refresh_prices(pricing: &PricingEngine, world: &mut WorldState) {
    for node in world.nodes.values_mut() {
        node.price_per_unit = pricing.price(node);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
