// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Equilibrium Monitor

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info};

use crate::carrier::CarrierRouter;
use crate::config::SimConfig;
use crate::units::{CarrierId, NodeId};
use crate::world::WorldState;

/// Utilisation band treated as balanced.
const BALANCED_UTIL_MIN: f64 = 0.4;
const BALANCED_UTIL_MAX: f64 = 0.7;
/// Fraction of |threshold| within which the trend counts as flat.
const FLAT_TREND_FRACTION: f64 = 0.6;
const SURPLUS_UTIL: f64 = 0.8;
/// More critical nodes than this is a fleet-wide emergency.
const CRITICAL_NODE_LIMIT: usize = 2;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// One tick's system-wide energy balance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EnergySample {
    /// generation - consumption - harvested out + charged in
    pub net_delta: f64,
    pub utilization: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EquilibriumStatus {
    Critical,
    Warning,
    Equilibrium,
    Stable,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    SevereEnergyLoss,
    ModerateEnergyLoss,
    EquilibriumAchieved,
    Monitoring,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Recommendation {
    AddCarriers { count: u32, reason: RecommendationReason },
    DispatchIdle { critical: usize, idle: usize },
    Maintain { reason: RecommendationReason },
    ReduceCarriers { count: u32 },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EquilibriumReport {
    pub tick: u64,
    /// Mean net energy delta over the window.
    pub trend: f64,
    pub avg_utilization: f64,
    /// Nodes below the auto-dispatch threshold, lowest energy first.
    pub critical_nodes: Vec<NodeId>,
    pub active_carriers: usize,
    pub idle_carriers: usize,
    pub total_carriers: usize,
    pub status: EquilibriumStatus,
    pub recommendation: Recommendation,
    pub samples: usize,
}

// ---------------------------------------------------------------------------
// EquilibriumMonitor - rolling window over system energy balance
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EquilibriumMonitor {
    window: VecDeque<EnergySample>,
    last_report: Option<EquilibriumReport>,
}

impl EquilibriumMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one tick's sample, keeping at most `window_ticks`.
    pub fn record(&mut self, sample: EnergySample, window_ticks: usize) {
        self.window.push_back(sample);
        while self.window.len() > window_ticks.max(1) {
            self.window.pop_front();
        }
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }

    pub fn trend(&self) -> f64 {
        window_mean(self.window.iter().map(|s| s.net_delta))
    }

    pub fn avg_utilization(&self) -> f64 {
        window_mean(self.window.iter().map(|s| s.utilization))
    }

    pub fn last_report(&self) -> Option<&EquilibriumReport> {
        self.last_report.as_ref()
    }

    pub fn is_due(&self, tick: u64, config: &SimConfig) -> bool {
        tick % config.check_interval.max(1) == 0 && self.samples() >= config.min_samples
    }

    /// Classify the window and recommend an action.
    pub fn check(&mut self, world: &WorldState, tick: u64, config: &SimConfig) -> EquilibriumReport {
        let trend = self.trend();
        let avg_utilization = self.avg_utilization();

        let mut critical: Vec<_> = world
            .nodes
            .values()
            .filter(|n| n.energy < config.auto_needy_threshold)
            .collect();
        critical.sort_by(|a, b| a.energy.total_cmp(&b.energy).then_with(|| a.id.cmp(&b.id)));
        let critical_nodes: Vec<NodeId> = critical.into_iter().map(|n| n.id.clone()).collect();

        let idle = world.idle_carriers();
        let threshold = config.dispatch_threshold;
        let status = classify(trend, avg_utilization, critical_nodes.len(), threshold);
        let recommendation = recommend(trend, avg_utilization, critical_nodes.len(), idle, threshold);

        let report = EquilibriumReport {
            tick,
            trend,
            avg_utilization,
            critical_nodes,
            active_carriers: world.active_carriers(),
            idle_carriers: idle,
            total_carriers: world.carriers.len(),
            status,
            recommendation,
            samples: self.samples(),
        };
        debug!(tick, trend, ?status, recommendation = ?report.recommendation, "equilibrium check");
        self.last_report = Some(report.clone());
        report
    }

    /// Whether this report should trigger auto-dispatch.
    pub fn wants_dispatch(report: &EquilibriumReport, config: &SimConfig) -> bool {
        config.auto_dispatch_enabled
            && (report.trend < config.dispatch_threshold
                || matches!(report.recommendation, Recommendation::DispatchIdle { .. }))
    }

    /// Pair needy nodes with idle carriers, neediest node first.
    ///
    /// Each node gets at most one carrier per check and only while under the
    /// per-node cap; each carrier is the nearest idle one with enough
    /// payload that can reach the node.
    pub fn plan_dispatch(
        report: &EquilibriumReport,
        world: &WorldState,
        config: &SimConfig,
        router: &CarrierRouter<'_>,
    ) -> Vec<(CarrierId, NodeId)> {
        let mut needy: Vec<_> = world
            .nodes
            .values()
            .filter(|n| n.energy < config.auto_needy_threshold)
            .collect();
        if needy.is_empty() && report.trend < config.dispatch_threshold {
            needy = world.nodes.values().filter(|n| n.energy < config.needy_threshold).collect();
        }
        needy.sort_by(|a, b| a.energy.total_cmp(&b.energy).then_with(|| a.id.cmp(&b.id)));

        let mut taken: BTreeSet<&CarrierId> = BTreeSet::new();
        let mut plan = Vec::new();
        for node in needy {
            if world.targeting(&node.id) >= config.max_drones_per_node {
                continue;
            }
            let nearest = world
                .carriers
                .values()
                .filter(|c| c.status.is_idle() && !taken.contains(&c.id))
                .filter(|c| c.payload >= config.mission_payload_min)
                .filter(|c| router.can_reach(c, &node.position))
                .min_by(|a, b| {
                    a.position
                        .distance_km(&node.position)
                        .total_cmp(&b.position.distance_km(&node.position))
                        .then_with(|| a.id.cmp(&b.id))
                });
            if let Some(carrier) = nearest {
                taken.insert(&carrier.id);
                plan.push((carrier.id.clone(), node.id.clone()));
            }
        }
        if !plan.is_empty() {
            info!(tick = report.tick, dispatches = plan.len(), "auto-dispatch planned");
        }
        plan
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.last_report = None;
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn balanced(utilization: f64) -> bool {
    (BALANCED_UTIL_MIN..=BALANCED_UTIL_MAX).contains(&utilization)
}

fn classify(trend: f64, utilization: f64, critical: usize, threshold: f64) -> EquilibriumStatus {
    if critical > CRITICAL_NODE_LIMIT || trend < 2.0 * threshold {
        EquilibriumStatus::Critical
    } else if critical > 0 || trend < threshold {
        EquilibriumStatus::Warning
    } else if trend.abs() < FLAT_TREND_FRACTION * threshold.abs() && balanced(utilization) {
        EquilibriumStatus::Equilibrium
    } else {
        EquilibriumStatus::Stable
    }
}

fn recommend(trend: f64, utilization: f64, critical: usize, idle: usize, threshold: f64) -> Recommendation {
    if trend < 2.0 * threshold {
        Recommendation::AddCarriers { count: 2, reason: RecommendationReason::SevereEnergyLoss }
    } else if trend < threshold {
        Recommendation::AddCarriers { count: 1, reason: RecommendationReason::ModerateEnergyLoss }
    } else if critical > 0 && idle > 0 {
        Recommendation::DispatchIdle { critical, idle }
    } else if balanced(utilization) && trend.abs() < threshold.abs() {
        Recommendation::Maintain { reason: RecommendationReason::EquilibriumAchieved }
    } else if idle > 1 && trend > 2.0 * threshold.abs() && utilization > SURPLUS_UTIL {
        Recommendation::ReduceCarriers { count: 1 }
    } else {
        Recommendation::Maintain { reason: RecommendationReason::Monitoring }
    }
}

fn window_mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingEngine;
    use crate::types::{Carrier, CarrierStatus, Node, Target};
    use crate::units::Position;

    fn sample(net_delta: f64, utilization: f64) -> EnergySample {
        EnergySample { net_delta, utilization }
    }

    fn filled(net_delta: f64, utilization: f64, n: usize) -> EquilibriumMonitor {
        let mut m = EquilibriumMonitor::new();
        for _ in 0..n {
            m.record(sample(net_delta, utilization), 50);
        }
        m
    }

    #[test]
    fn window_trims_oldest() {
        let mut m = EquilibriumMonitor::new();
        for i in 0..8 {
            m.record(sample(i as f64, 0.5), 5);
        }
        assert_eq!(m.samples(), 5);
        // 3..=7
        assert_eq!(m.trend(), 5.0);
    }

    #[test]
    fn empty_window_is_flat() {
        let m = EquilibriumMonitor::new();
        assert_eq!(m.trend(), 0.0);
        assert_eq!(m.avg_utilization(), 0.0);
    }

    #[test]
    fn due_only_on_interval_with_enough_samples() {
        let cfg = SimConfig::default();
        assert!(!filled(0.0, 0.5, 9).is_due(10, &cfg));
        let m = filled(0.0, 0.5, 10);
        assert!(m.is_due(10, &cfg));
        assert!(!m.is_due(11, &cfg));
    }

    #[test]
    fn status_ladder() {
        assert_eq!(classify(-11.0, 0.5, 0, -5.0), EquilibriumStatus::Critical);
        assert_eq!(classify(0.0, 0.5, 3, -5.0), EquilibriumStatus::Critical);
        assert_eq!(classify(-6.0, 0.5, 0, -5.0), EquilibriumStatus::Warning);
        assert_eq!(classify(0.0, 0.5, 1, -5.0), EquilibriumStatus::Warning);
        assert_eq!(classify(1.0, 0.5, 0, -5.0), EquilibriumStatus::Equilibrium);
        assert_eq!(classify(1.0, 0.9, 0, -5.0), EquilibriumStatus::Stable);
    }

    #[test]
    fn recommendation_ladder() {
        assert_eq!(
            recommend(-11.0, 0.5, 0, 0, -5.0),
            Recommendation::AddCarriers { count: 2, reason: RecommendationReason::SevereEnergyLoss }
        );
        assert_eq!(
            recommend(-6.0, 0.5, 0, 0, -5.0),
            Recommendation::AddCarriers { count: 1, reason: RecommendationReason::ModerateEnergyLoss }
        );
        assert_eq!(recommend(0.0, 0.5, 2, 1, -5.0), Recommendation::DispatchIdle { critical: 2, idle: 1 });
        assert_eq!(
            recommend(0.0, 0.5, 0, 0, -5.0),
            Recommendation::Maintain { reason: RecommendationReason::EquilibriumAchieved }
        );
        assert_eq!(recommend(12.0, 0.9, 0, 3, -5.0), Recommendation::ReduceCarriers { count: 1 });
        assert_eq!(
            recommend(3.0, 0.9, 0, 0, -5.0),
            Recommendation::Maintain { reason: RecommendationReason::Monitoring }
        );
    }

    fn world() -> WorldState {
        let mut w = WorldState::empty(1);
        w.add_node(Node::new("sat-01", 20.0, 120.0, 2000.0));
        w.add_node(Node::new("sat-02", 12.0, 120.0, 2000.0));
        w.add_node(Node::new("sat-03", 20.0, 120.0, 2000.0));
        w.add_node(Node::new("sat-04", 90.0, 120.0, 2000.0));
        w
    }

    #[test]
    fn check_lists_critical_nodes_neediest_first() {
        let cfg = SimConfig::default();
        let mut m = filled(-6.0, 0.3, 10);
        let report = m.check(&world(), 10, &cfg);
        assert_eq!(
            report.critical_nodes,
            vec![NodeId::from("sat-02"), NodeId::from("sat-01"), NodeId::from("sat-03")]
        );
        assert_eq!(report.status, EquilibriumStatus::Critical);
        assert!(EquilibriumMonitor::wants_dispatch(&report, &cfg));
        assert_eq!(m.last_report(), Some(&report));
    }

    #[test]
    fn plan_goes_neediest_first_with_id_tiebreak() {
        let cfg = SimConfig::default();
        let pricing = PricingEngine::new(cfg.base_price);
        let router = CarrierRouter::new(&cfg, &pricing);
        let mut w = world();
        w.add_carrier(Carrier::new("drone-01", 3000.0, 120.0, 120.0));
        w.add_carrier(Carrier::new("drone-02", 3000.0, 120.0, 120.0));
        let mut m = filled(-6.0, 0.3, 10);
        let report = m.check(&w, 10, &cfg);

        let plan = EquilibriumMonitor::plan_dispatch(&report, &w, &cfg, &router);
        assert_eq!(
            plan,
            vec![
                (CarrierId::from("drone-01"), NodeId::from("sat-02")),
                (CarrierId::from("drone-02"), NodeId::from("sat-01")),
            ]
        );
    }

    #[test]
    fn plan_respects_cap_and_payload() {
        let cfg = SimConfig::default();
        let pricing = PricingEngine::new(cfg.base_price);
        let router = CarrierRouter::new(&cfg, &pricing);
        let mut w = WorldState::empty(1);
        w.add_node(Node::new("sat-01", 5.0, 120.0, 2000.0).with_position(Position::new(1.0, 1.0)));
        for i in 1..=2 {
            w.add_carrier(
                Carrier::new(format!("drone-0{i}"), 3000.0, 120.0, 120.0)
                    .with_status(CarrierStatus::Enroute, Some(Target::Node(NodeId::from("sat-01")))),
            );
        }
        w.add_carrier(Carrier::new("drone-03", 3000.0, 120.0, 120.0));
        w.add_carrier(Carrier::new("drone-04", 3000.0, 2.0, 120.0));
        let report = filled(-6.0, 0.3, 10).check(&w, 10, &cfg);
        assert!(EquilibriumMonitor::plan_dispatch(&report, &w, &cfg, &router).is_empty());

        w.carriers.remove(&CarrierId::from("drone-02"));
        let plan = EquilibriumMonitor::plan_dispatch(&report, &w, &cfg, &router);
        assert_eq!(plan, vec![(CarrierId::from("drone-03"), NodeId::from("sat-01"))]);
    }

    #[test]
    fn trend_breach_falls_back_to_needy_threshold() {
        let cfg = SimConfig::default();
        let pricing = PricingEngine::new(cfg.base_price);
        let router = CarrierRouter::new(&cfg, &pricing);
        let mut w = WorldState::empty(1);
        w.add_node(Node::new("sat-01", 28.0, 120.0, 2000.0));
        w.add_carrier(Carrier::new("drone-01", 3000.0, 120.0, 120.0));

        let calm = filled(0.0, 0.3, 10).check(&w, 10, &cfg);
        assert!(EquilibriumMonitor::plan_dispatch(&calm, &w, &cfg, &router).is_empty());

        let falling = filled(-6.0, 0.3, 10).check(&w, 10, &cfg);
        assert_eq!(EquilibriumMonitor::plan_dispatch(&falling, &w, &cfg, &router).len(), 1);
    }

    #[test]
    fn report_serializes_with_action_tag() {
        let json = serde_json::to_value(Recommendation::ReduceCarriers { count: 1 }).unwrap();
        assert_eq!(json["action"], "reduce_carriers");
        assert_eq!(json["count"], 1);
    }
}
