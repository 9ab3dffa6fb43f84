// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Carrier Routing

//! Carrier state machine and its per-tick driver.
//!
//! Every status change goes through [`transition`], a single
//! `(status, event) -> status` table:
//!
//! ```text
//!                     Dispatch                 BeginCharge
//!   at_source/standby ────────> enroute ──────────────────> charging
//!                                 │  └───── BeginHarvest ──> harvesting
//!                                 │
//!   enroute/charging/harvesting ──┼─ Recall / Timeout ─────> returning
//!                                 └─ Park ─────────────────> standby
//!   returning ── Dock / Timeout ──────────────────────────> at_source
//! ```
//!
//! Charging and harvesting may also `Dispatch` straight to the next target.
//! [`CarrierRouter`] decides which event fires for each carrier once per
//! tick, moves energy, and records every transfer in the ledger.

use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::error::EngineError;
use crate::events::{EventBuffer, EventKind, MissionEnd, RecallReason};
use crate::ledger::Transaction;
use crate::pricing::PricingEngine;
use crate::types::{Carrier, CarrierStatus, Node, Target};
use crate::units::{CarrierId, NodeId, Position};
use crate::world::WorldState;

/// Legs shorter than this count as arrived.
const ARRIVAL_EPS_KM: f64 = 1e-6;

// ─── State machine ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierEvent {
    /// Assigned a node to fly to.
    Dispatch,
    /// Arrived at a needy node with payload to give.
    BeginCharge,
    /// Arrived at an eligible harvest source.
    BeginHarvest,
    /// Nothing to do; hold position.
    Park,
    /// Head back to the source.
    Recall,
    /// No progress for too long.
    Timeout,
    /// Reached the source.
    Dock,
}

pub fn transition(from: CarrierStatus, event: CarrierEvent) -> Result<CarrierStatus, EngineError> {
    use CarrierEvent as E;
    use CarrierStatus as S;

    let next = match (from, event) {
        (S::AtSource | S::Standby | S::Enroute | S::Charging | S::Harvesting, E::Dispatch) => S::Enroute,
        (S::Enroute, E::BeginCharge) => S::Charging,
        (S::Enroute, E::BeginHarvest) => S::Harvesting,
        (S::Enroute | S::Charging | S::Harvesting, E::Park) => S::Standby,
        (S::Standby | S::Enroute | S::Charging | S::Harvesting, E::Recall) => S::Returning,
        (S::Enroute | S::Charging | S::Harvesting, E::Timeout) => S::Returning,
        (S::Returning, E::Dock | E::Timeout) => S::AtSource,
        _ => {
            return Err(EngineError::InvalidTransition {
                from: format!("{from:?}"),
                event: format!("{event:?}"),
            })
        }
    };
    Ok(next)
}

/// Fire `event` and install the matching target.
fn apply(carrier: &mut Carrier, event: CarrierEvent, target: Option<Target>) -> Result<(), EngineError> {
    let next = transition(carrier.status, event)?;
    debug!(carrier = %carrier.id, from = ?carrier.status, to = ?next, ?event, "carrier transition");
    carrier.status = next;
    carrier.target = target;
    carrier.state_ticks = 0;
    carrier.stalled_ticks = 0;
    Ok(())
}

// ─── Router ─────────────────────────────────────────────────────────────────

/// Energy moved by carriers during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RouterReport {
    pub charged_in: f64,
    pub harvested_out: f64,
    pub transactions: usize,
    pub recalls: u32,
    pub timeouts: u32,
}

enum Travel {
    Arrived,
    Moving,
    OutOfReserve { needed: f64 },
}

pub struct CarrierRouter<'a> {
    config: &'a SimConfig,
    pricing: &'a PricingEngine,
}

impl<'a> CarrierRouter<'a> {
    pub fn new(config: &'a SimConfig, pricing: &'a PricingEngine) -> Self {
        Self { config, pricing }
    }

    /// Step every carrier once, in id order.
    ///
    /// The carrier being stepped is lifted out of the store, so occupancy
    /// counts seen during its step cover the other carriers only.
    pub fn step_all(&self, world: &mut WorldState, tick: u64, events: &mut EventBuffer) -> RouterReport {
        let mut report = RouterReport::default();
        let ids: Vec<CarrierId> = world.carriers.keys().cloned().collect();
        for id in ids {
            let Some(mut carrier) = world.carriers.remove(&id) else {
                continue;
            };
            if let Err(err) = self.step(&mut carrier, world, tick, events, &mut report) {
                warn!(carrier = %id, %err, "carrier step failed");
            }
            world.carriers.insert(id, carrier);
        }
        report
    }

    fn step(
        &self,
        carrier: &mut Carrier,
        world: &mut WorldState,
        tick: u64,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        carrier.state_ticks = carrier.state_ticks.saturating_add(1);
        match carrier.status {
            CarrierStatus::AtSource => {
                self.top_up_reserve(carrier);
                Ok(())
            }
            CarrierStatus::Standby => Ok(()),
            CarrierStatus::Enroute => self.fly_to_node(carrier, world, events, report),
            CarrierStatus::Returning => self.fly_home(carrier, world, tick, events, report),
            CarrierStatus::Charging => self.charge(carrier, world, tick, events, report),
            CarrierStatus::Harvesting => self.harvest(carrier, world, tick, events, report),
        }
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Send an idle carrier to `node_id`, bypassing mission selection.
    pub fn dispatch(
        &self,
        world: &mut WorldState,
        carrier_id: &CarrierId,
        node_id: &NodeId,
        auto: bool,
        events: &mut EventBuffer,
    ) -> Result<(), EngineError> {
        let dest = world
            .nodes
            .get(node_id)
            .map(|n| n.position)
            .ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;
        let carrier = world
            .carriers
            .get_mut(carrier_id)
            .ok_or_else(|| EngineError::UnknownCarrier(carrier_id.clone()))?;

        let eta = self.set_course(carrier, node_id, dest)?;
        events.push(EventKind::CarrierLaunched {
            carrier_id: carrier_id.clone(),
            node_id: node_id.clone(),
            auto,
        });
        events.push(EventKind::CarrierEnroute {
            carrier_id: carrier_id.clone(),
            target: Target::Node(node_id.clone()),
            eta_ticks: eta,
        });
        info!(carrier = %carrier_id, node = %node_id, auto, "carrier dispatched");
        Ok(())
    }

    /// Reserve needed to fly from `from` to `to`.
    pub fn leg_cost(&self, from: &Position, to: &Position) -> f64 {
        from.distance_km(to) * self.config.reserve_per_km
    }

    /// Enough reserve to fly there and still keep the operating minimum.
    pub fn can_reach(&self, carrier: &Carrier, dest: &Position) -> bool {
        carrier.reserve >= self.leg_cost(&carrier.position, dest) + self.config.reserve_min_to_continue
    }

    fn eta_ticks(&self, km: f64) -> u32 {
        if self.config.travel_instant || km <= ARRIVAL_EPS_KM {
            0
        } else {
            (km / self.config.speed_km_per_tick).ceil() as u32
        }
    }

    fn set_course(&self, carrier: &mut Carrier, node_id: &NodeId, dest: Position) -> Result<u32, EngineError> {
        if !self.can_reach(carrier, &dest) {
            return Err(EngineError::InsufficientReserve {
                carrier: carrier.id.clone(),
                needed: self.leg_cost(&carrier.position, &dest) + self.config.reserve_min_to_continue,
                available: carrier.reserve,
            });
        }
        apply(carrier, CarrierEvent::Dispatch, Some(Target::Node(node_id.clone())))?;
        carrier.leg_remaining_km = carrier.position.distance_km(&dest);
        Ok(self.eta_ticks(carrier.leg_remaining_km))
    }

    fn redirect(&self, carrier: &mut Carrier, node: &Node, events: &mut EventBuffer) -> Result<(), EngineError> {
        let eta = self.set_course(carrier, &node.id, node.position)?;
        events.push(EventKind::CarrierEnroute {
            carrier_id: carrier.id.clone(),
            target: Target::Node(node.id.clone()),
            eta_ticks: eta,
        });
        Ok(())
    }

    fn recall(
        &self,
        carrier: &mut Carrier,
        reason: RecallReason,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        apply(carrier, CarrierEvent::Recall, Some(Target::Source))?;
        carrier.leg_remaining_km = carrier.position.distance_km(&self.config.source_position);
        match reason {
            RecallReason::NoMission => debug!(carrier = %carrier.id, "no mission, returning to source"),
            _ => warn!(carrier = %carrier.id, ?reason, "carrier recalled"),
        }
        report.recalls += 1;
        events.push(EventKind::CarrierRecalled { carrier_id: carrier.id.clone(), reason });
        events.push(EventKind::CarrierEnroute {
            carrier_id: carrier.id.clone(),
            target: Target::Source,
            eta_ticks: self.eta_ticks(carrier.leg_remaining_km),
        });
        Ok(())
    }

    fn time_out(&self, carrier: &mut Carrier, events: &mut EventBuffer, report: &mut RouterReport) -> Result<(), EngineError> {
        let stuck_in = carrier.status;
        let ticks = carrier.state_ticks;
        apply(carrier, CarrierEvent::Timeout, Some(Target::Source))?;
        carrier.leg_remaining_km = carrier.position.distance_km(&self.config.source_position);
        warn!(carrier = %carrier.id, ?stuck_in, ticks, "timeout recovery");
        report.timeouts += 1;
        events.push(EventKind::CarrierTimeoutRecovery { carrier_id: carrier.id.clone(), stuck_in, ticks });
        Ok(())
    }

    // ─── Movement ───────────────────────────────────────────────────────

    /// Cover this tick's share of the leg, paying reserve for the distance
    /// actually flown. A carrier bound for the source always completes the
    /// leg, even if that empties its reserve.
    fn advance(&self, carrier: &mut Carrier, dest: Position, homebound: bool) -> Travel {
        if carrier.leg_remaining_km <= ARRIVAL_EPS_KM {
            carrier.leg_remaining_km = carrier.position.distance_km(&dest);
        }
        let leg = carrier.leg_remaining_km;
        let step = if self.config.travel_instant { leg } else { leg.min(self.config.speed_km_per_tick) };
        let cost = step * self.config.reserve_per_km;

        if cost > carrier.reserve {
            if !homebound {
                return Travel::OutOfReserve { needed: cost };
            }
            warn!(carrier = %carrier.id, needed = cost, available = carrier.reserve, "reserve short on return leg");
        }
        carrier.reserve = (carrier.reserve - cost).max(0.0);
        carrier.leg_remaining_km = leg - step;

        if carrier.leg_remaining_km <= ARRIVAL_EPS_KM {
            carrier.leg_remaining_km = 0.0;
            carrier.position = dest;
            Travel::Arrived
        } else {
            let f = step / leg;
            carrier.position = Position::new(
                carrier.position.lat + (dest.lat - carrier.position.lat) * f,
                carrier.position.lon + (dest.lon - carrier.position.lon) * f,
            );
            Travel::Moving
        }
    }

    fn fly_to_node(
        &self,
        carrier: &mut Carrier,
        world: &mut WorldState,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        let Some(node_id) = carrier.target_node().cloned() else {
            return self.recall(carrier, RecallReason::TargetLost, events, report);
        };
        let Some(dest) = world.nodes.get(&node_id).map(|n| n.position) else {
            return self.recall(carrier, RecallReason::TargetLost, events, report);
        };

        match self.advance(carrier, dest, false) {
            Travel::OutOfReserve { needed } => {
                let err = EngineError::InsufficientReserve {
                    carrier: carrier.id.clone(),
                    needed,
                    available: carrier.reserve,
                };
                warn!(%err, "abandoning leg");
                self.recall(carrier, RecallReason::InsufficientReserve, events, report)
            }
            Travel::Moving => {
                if carrier.state_ticks >= self.config.enroute_max_ticks {
                    self.time_out(carrier, events, report)
                } else {
                    Ok(())
                }
            }
            Travel::Arrived => {
                events.push(EventKind::CarrierArrived {
                    carrier_id: carrier.id.clone(),
                    target: Target::Node(node_id.clone()),
                });
                self.on_arrival(carrier, &node_id, world, events, report)
            }
        }
    }

    fn on_arrival(
        &self,
        carrier: &mut Carrier,
        node_id: &NodeId,
        world: &mut WorldState,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        let Some(node) = world.nodes.get(node_id) else {
            return self.recall(carrier, RecallReason::TargetLost, events, report);
        };

        if self.can_charge(carrier, node, world) {
            apply(carrier, CarrierEvent::BeginCharge, Some(Target::Node(node_id.clone())))?;
            events.push(EventKind::CarrierChargingStarted { carrier_id: carrier.id.clone(), node_id: node_id.clone() });
            return Ok(());
        }

        match self.check_source(carrier, node, world) {
            Ok(()) => {
                apply(carrier, CarrierEvent::BeginHarvest, Some(Target::Node(node_id.clone())))?;
                events.push(EventKind::CarrierHarvestingStarted { carrier_id: carrier.id.clone(), node_id: node_id.clone() });
                Ok(())
            }
            Err(err) => {
                debug!(carrier = %carrier.id, %err, "arrival target unusable, choosing next mission");
                self.next_mission(carrier, world, Some(node_id), events, report)
            }
        }
    }

    fn fly_home(
        &self,
        carrier: &mut Carrier,
        world: &mut WorldState,
        tick: u64,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        let source = self.config.source_position;
        match self.advance(carrier, source, true) {
            Travel::Arrived => self.dock(carrier, world, tick, events, report),
            Travel::Moving | Travel::OutOfReserve { .. } => {
                if carrier.state_ticks >= self.config.enroute_max_ticks {
                    carrier.position = source;
                    carrier.leg_remaining_km = 0.0;
                    let ticks = carrier.state_ticks;
                    warn!(carrier = %carrier.id, ticks, "return leg stuck, forcing dock");
                    report.timeouts += 1;
                    events.push(EventKind::CarrierTimeoutRecovery {
                        carrier_id: carrier.id.clone(),
                        stuck_in: CarrierStatus::Returning,
                        ticks,
                    });
                    self.dock(carrier, world, tick, events, report)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Refill the payload for free and enter `at_source`.
    fn dock(
        &self,
        carrier: &mut Carrier,
        world: &mut WorldState,
        tick: u64,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        events.push(EventKind::CarrierArrived { carrier_id: carrier.id.clone(), target: Target::Source });

        let refill = (carrier.payload_max - carrier.payload).max(0.0);
        if refill > 0.0 {
            let tx = Transaction::source_recharge(world.ledger.next_id(), tick, carrier, refill);
            let tx = world.ledger.record(tx)?;
            report.transactions += 1;
            events.push(transaction_event(tx));
            carrier.payload = carrier.payload_max;
        }
        apply(carrier, CarrierEvent::Dock, None)?;
        events.push(EventKind::CarrierRecharged { carrier_id: carrier.id.clone(), amount: refill });
        Ok(())
    }

    fn top_up_reserve(&self, carrier: &mut Carrier) {
        if carrier.reserve < self.config.reserve_max {
            debug!(carrier = %carrier.id, from = carrier.reserve, "reserve topped up at source");
            carrier.reserve = self.config.reserve_max;
        }
    }

    // ─── Transfers ──────────────────────────────────────────────────────

    fn charge(
        &self,
        carrier: &mut Carrier,
        world: &mut WorldState,
        tick: u64,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        let Some(node_id) = carrier.target_node().cloned() else {
            return self.recall(carrier, RecallReason::TargetLost, events, report);
        };
        let Some(node) = world.nodes.get(&node_id) else {
            return self.recall(carrier, RecallReason::TargetLost, events, report);
        };
        if let Some(reason) = self.charge_end(carrier, node) {
            return self.finish_mission(carrier, &node_id, reason, world, events, report);
        }

        let amount = self.config.charge_rate.min(carrier.payload).min(node.max_energy - node.energy).max(0.0);
        if amount > 0.0 {
            let tx = Transaction::charge(world.ledger.next_id(), tick, carrier, node, amount);
            let tx = world.ledger.record(tx)?.clone();
            let node = world
                .nodes
                .get_mut(&node_id)
                .ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;

            let was_dark = node.energy < self.config.low_energy_alert;
            carrier.payload -= amount;
            node.energy = (node.energy + amount).min(node.max_energy);
            carrier.stalled_ticks = 0;
            report.charged_in += amount;
            report.transactions += 1;

            events.push(EventKind::CarrierCharged { carrier_id: carrier.id.clone(), node_id: node_id.clone(), amount });
            events.push(transaction_event(&tx));
            if was_dark && node.energy >= self.config.low_energy_alert {
                events.push(EventKind::AlertBlackoutAvoided { node_id: node_id.clone(), energy: node.energy });
            }
        } else {
            carrier.stalled_ticks += 1;
        }

        if carrier.stalled_ticks >= self.config.stall_max_ticks {
            return self.time_out(carrier, events, report);
        }
        let node = world.nodes.get(&node_id).ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;
        match self.charge_end(carrier, node) {
            Some(reason) => self.finish_mission(carrier, &node_id, reason, world, events, report),
            None => Ok(()),
        }
    }

    fn harvest(
        &self,
        carrier: &mut Carrier,
        world: &mut WorldState,
        tick: u64,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        let Some(node_id) = carrier.target_node().cloned() else {
            return self.recall(carrier, RecallReason::TargetLost, events, report);
        };
        let Some(node) = world.nodes.get(&node_id) else {
            return self.recall(carrier, RecallReason::TargetLost, events, report);
        };

        let home_cost = self.leg_cost(&carrier.position, &self.config.source_position);
        if carrier.reserve < home_cost {
            let err = EngineError::InsufficientReserve {
                carrier: carrier.id.clone(),
                needed: home_cost,
                available: carrier.reserve,
            };
            warn!(%err, "reserve exhausted while harvesting");
            return self.recall(carrier, RecallReason::ReserveExhausted, events, report);
        }
        if let Some(reason) = self.harvest_end(carrier, node) {
            return self.finish_mission(carrier, &node_id, reason, world, events, report);
        }

        let floor = self.config.harvest_floor;
        let amount = self
            .config
            .harvest_rate
            .min(node.energy - floor)
            .min(carrier.payload_max - carrier.payload)
            .max(0.0);
        if amount > 0.0 {
            let price = self.pricing.price(node);
            let tx = Transaction::harvest(world.ledger.next_id(), tick, node, carrier, amount, price);
            let tx = world.ledger.record(tx)?.clone();
            let node = world
                .nodes
                .get_mut(&node_id)
                .ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;

            node.energy = (node.energy - amount).max(floor);
            node.total_revenue += tx.total_cost;
            node.total_energy_sold += amount;
            carrier.payload = (carrier.payload + amount).min(carrier.payload_max);
            carrier.total_spent += tx.total_cost;
            carrier.total_energy_bought += amount;
            carrier.stalled_ticks = 0;
            report.harvested_out += amount;
            report.transactions += 1;

            events.push(EventKind::CarrierHarvested {
                carrier_id: carrier.id.clone(),
                node_id: node_id.clone(),
                amount,
                cost: tx.total_cost,
            });
            events.push(transaction_event(&tx));
        } else {
            carrier.stalled_ticks += 1;
        }

        if carrier.stalled_ticks >= self.config.stall_max_ticks {
            return self.time_out(carrier, events, report);
        }
        let node = world.nodes.get(&node_id).ok_or_else(|| EngineError::UnknownNode(node_id.clone()))?;
        match self.harvest_end(carrier, node) {
            Some(reason) => self.finish_mission(carrier, &node_id, reason, world, events, report),
            None => Ok(()),
        }
    }

    fn charge_end(&self, carrier: &Carrier, node: &Node) -> Option<MissionEnd> {
        if self.node_full(node) {
            Some(MissionEnd::NodeFull)
        } else if carrier.payload < self.config.payload_min_to_charge {
            Some(MissionEnd::PayloadEmpty)
        } else if carrier.state_ticks >= self.config.max_dwell_ticks {
            Some(MissionEnd::MaxDwell)
        } else {
            None
        }
    }

    fn harvest_end(&self, carrier: &Carrier, node: &Node) -> Option<MissionEnd> {
        if node.energy <= self.config.harvest_floor {
            Some(MissionEnd::SourceDrained)
        } else if self.payload_full(carrier) {
            Some(MissionEnd::PayloadFull)
        } else if carrier.state_ticks >= self.config.max_dwell_ticks {
            Some(MissionEnd::MaxDwell)
        } else {
            None
        }
    }

    fn finish_mission(
        &self,
        carrier: &mut Carrier,
        node_id: &NodeId,
        reason: MissionEnd,
        world: &mut WorldState,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        debug!(carrier = %carrier.id, node = %node_id, ?reason, "mission complete");
        events.push(EventKind::CarrierMissionComplete {
            carrier_id: carrier.id.clone(),
            node_id: node_id.clone(),
            reason,
        });
        self.next_mission(carrier, world, Some(node_id), events, report)
    }

    // ─── Mission selection ──────────────────────────────────────────────

    /// Pick what a carrier does after finishing at a node.
    ///
    /// Low payload refills first, from a harvest source if one is in range,
    /// else at the source. Otherwise the neediest reachable node gets it,
    /// then a harvest source if there is room to fill. With nothing to do
    /// the carrier parks, provided it can still make it home.
    fn next_mission(
        &self,
        carrier: &mut Carrier,
        world: &WorldState,
        exclude: Option<&NodeId>,
        events: &mut EventBuffer,
        report: &mut RouterReport,
    ) -> Result<(), EngineError> {
        if carrier.payload < self.config.mission_payload_min {
            return match self.best_source(carrier, world, exclude) {
                Some(source) => self.redirect(carrier, source, events),
                None => self.recall(carrier, RecallReason::NoMission, events, report),
            };
        }
        if let Some(node) = self.neediest(carrier, world, exclude) {
            return self.redirect(carrier, node, events);
        }
        if !self.payload_full(carrier) {
            if let Some(source) = self.best_source(carrier, world, exclude) {
                return self.redirect(carrier, source, events);
            }
        }
        if self.can_reach(carrier, &self.config.source_position) {
            apply(carrier, CarrierEvent::Park, None)?;
            carrier.leg_remaining_km = 0.0;
            Ok(())
        } else {
            self.recall(carrier, RecallReason::NoMission, events, report)
        }
    }

    /// Lowest-energy reachable node under the needy threshold with room for
    /// another carrier.
    fn neediest<'w>(&self, carrier: &Carrier, world: &'w WorldState, exclude: Option<&NodeId>) -> Option<&'w Node> {
        world
            .nodes
            .values()
            .filter(|n| Some(&n.id) != exclude)
            .filter(|n| n.energy < self.config.needy_threshold && !self.node_full(n))
            .filter(|n| world.targeting(&n.id) < self.config.max_drones_per_node)
            .filter(|n| self.can_reach(carrier, &n.position))
            .min_by(|a, b| a.energy.total_cmp(&b.energy).then_with(|| a.id.cmp(&b.id)))
    }

    /// Highest-energy eligible source in range; nearer wins a tie.
    fn best_source<'w>(&self, carrier: &Carrier, world: &'w WorldState, exclude: Option<&NodeId>) -> Option<&'w Node> {
        world
            .nodes
            .values()
            .filter(|n| Some(&n.id) != exclude)
            .filter(|n| self.check_source(carrier, n, world).is_ok())
            .filter(|n| world.targeting(&n.id) < self.config.max_drones_per_node)
            .filter(|n| self.can_reach(carrier, &n.position))
            .min_by(|a, b| {
                b.energy
                    .total_cmp(&a.energy)
                    .then_with(|| {
                        carrier
                            .position
                            .distance_km(&a.position)
                            .total_cmp(&carrier.position.distance_km(&b.position))
                    })
                    .then_with(|| a.id.cmp(&b.id))
            })
    }

    fn can_charge(&self, carrier: &Carrier, node: &Node, world: &WorldState) -> bool {
        node.energy < self.config.needy_threshold
            && !self.node_full(node)
            && carrier.payload >= self.config.payload_min_to_charge
            && world.engaged_at(&node.id) < self.config.max_drones_per_node
    }

    /// A harvest source must sit above the start level, must not be charged
    /// by anyone, may host one harvester at a time, and stays under the
    /// per-node cap.
    pub fn check_source(&self, carrier: &Carrier, node: &Node, world: &WorldState) -> Result<(), EngineError> {
        let eligible = node.energy > self.config.harvest_start_level
            && !self.payload_full(carrier)
            && world.in_status_at(&node.id, CarrierStatus::Charging) == 0
            && world.in_status_at(&node.id, CarrierStatus::Harvesting) == 0
            && world.engaged_at(&node.id) < self.config.max_drones_per_node;
        if eligible {
            Ok(())
        } else {
            Err(EngineError::SourceIneligible { node: node.id.clone() })
        }
    }

    fn node_full(&self, node: &Node) -> bool {
        node.energy >= node.max_energy - self.config.node_full_eps
    }

    fn payload_full(&self, carrier: &Carrier) -> bool {
        carrier.payload >= carrier.payload_max - self.config.payload_full_eps
    }
}

fn transaction_event(tx: &Transaction) -> EventKind {
    EventKind::TransactionCompleted {
        tx_id: tx.id.clone(),
        from: tx.from_id.clone(),
        to: tx.to_id.clone(),
        amount: tx.energy_amount,
        cost: tx.total_cost,
        kind: tx.kind,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
