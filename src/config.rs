// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Configuration

//! Tunables for every component of the tick pipeline.
//!
//! [`SimConfig`] carries the defaults of the reference deployment. Partial
//! updates arrive as a [`ConfigPatch`] and are validated as a whole before
//! anything is applied.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::Priority;
use crate::units::{Credits, Position};

// ---------------------------------------------------------------------------
// ScoringWeights
// ---------------------------------------------------------------------------

/// Delegator weights. They sum to 1 by convention only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Energy level.
    pub w1: f64,
    /// Spare processing.
    pub w2: f64,
    /// Short queue.
    pub w3: f64,
    /// Distance penalty.
    pub w4: f64,
    /// Priority boost.
    pub w5: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self { w1: 0.35, w2: 0.25, w3: 0.20, w4: 0.15, w5: 0.05 }
    }
}

impl ScoringWeights {
    fn all(&self) -> [f64; 5] {
        [self.w1, self.w2, self.w3, self.w4, self.w5]
    }
}

/// Fixed score boost per priority tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityBoost {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for PriorityBoost {
    fn default() -> Self {
        Self { low: 0.0, medium: 0.5, high: 1.0 }
    }
}

impl PriorityBoost {
    pub fn for_priority(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
        }
    }
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // Timing
    pub tick_ms: u64,
    pub seed: u64,

    // Delegation
    pub weights: ScoringWeights,
    pub priority_boost: PriorityBoost,
    pub max_tasks_per_node: usize,
    pub min_energy_to_accept: f64,
    pub task_energy_rate: f64,
    pub task_progress_rate: f64,
    pub starved_progress_factor: f64,
    pub task_max_ticks: u64,
    pub max_pending_tasks: usize,

    // Carrier movement and reserve
    pub travel_instant: bool,
    pub speed_km_per_tick: f64,
    pub reserve_per_km: f64,
    pub reserve_min_to_continue: f64,
    pub reserve_max: f64,
    pub enroute_max_ticks: u32,

    // Carrier payload
    pub charge_rate: f64,
    pub payload_min_to_charge: f64,
    pub mission_payload_min: f64,
    pub payload_max: f64,
    pub payload_full_eps: f64,

    // Harvesting
    pub harvest_rate: f64,
    pub harvest_floor: f64,
    pub harvest_start_level: f64,

    // Node thresholds
    pub node_full_eps: f64,
    pub needy_threshold: f64,
    pub low_energy_alert: f64,

    // Carrier behaviour limits
    pub max_dwell_ticks: u32,
    pub stall_max_ticks: u32,
    pub max_drones_per_node: usize,

    // Equilibrium
    pub auto_dispatch_enabled: bool,
    pub auto_needy_threshold: f64,
    pub check_interval: u64,
    pub window_ticks: usize,
    pub min_samples: usize,
    pub dispatch_threshold: f64,

    // Pricing
    pub base_price: Credits,
    pub average_price_window: usize,

    // Seeding and transport
    pub source_position: Position,
    pub seed_carriers: usize,
    pub event_log_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_ms: 500,
            seed: 42,

            weights: ScoringWeights::default(),
            priority_boost: PriorityBoost::default(),
            max_tasks_per_node: 30,
            min_energy_to_accept: 10.0,
            task_energy_rate: 0.10,
            task_progress_rate: 0.02,
            starved_progress_factor: 0.2,
            task_max_ticks: 400,
            max_pending_tasks: 500,

            travel_instant: true,
            speed_km_per_tick: 4000.0,
            reserve_per_km: 0.001,
            reserve_min_to_continue: 10.0,
            reserve_max: 3000.0,
            enroute_max_ticks: 8,

            charge_rate: 8.0,
            payload_min_to_charge: 6.0,
            mission_payload_min: 15.0,
            payload_max: 120.0,
            payload_full_eps: 1.0,

            harvest_rate: 10.0,
            harvest_floor: 70.0,
            harvest_start_level: 80.0,

            node_full_eps: 0.5,
            needy_threshold: 30.0,
            low_energy_alert: 10.0,

            max_dwell_ticks: 60,
            stall_max_ticks: 3,
            max_drones_per_node: 2,

            auto_dispatch_enabled: true,
            auto_needy_threshold: 25.0,
            check_interval: 10,
            window_ticks: 50,
            min_samples: 10,
            dispatch_threshold: -5.0,

            base_price: Credits(dec!(0.05)),
            average_price_window: 50,

            source_position: Position::default(),
            seed_carriers: 2,
            event_log_capacity: 2000,
        }
    }
}

impl SimConfig {
    /// Parse a full or partial JSON document; missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let cfg: SimConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::ConfigInvalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overlaid with `ORBIT_*` environment variables.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut cfg = Self::default();

        if let Some(v) = env_parse("ORBIT_SEED")? {
            cfg.seed = v;
        }
        if let Some(v) = env_parse("ORBIT_TICK_MS")? {
            cfg.tick_ms = v;
        }
        if let Some(v) = env_parse("ORBIT_TRAVEL_INSTANT")? {
            cfg.travel_instant = v;
        }
        if let Some(v) = env_parse("ORBIT_AUTO_DISPATCH")? {
            cfg.auto_dispatch_enabled = v;
        }
        if let Some(v) = env_parse("ORBIT_SEED_CARRIERS")? {
            cfg.seed_carriers = v;
        }
        if let Some(v) = env_parse("ORBIT_MAX_DRONES_PER_NODE")? {
            cfg.max_drones_per_node = v;
        }
        if let Some(v) = env_parse::<Decimal>("ORBIT_BASE_PRICE")? {
            cfg.base_price = Credits(v);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: &str| Err(EngineError::ConfigInvalid(msg.to_string()));

        if self.weights.all().iter().any(|w| !w.is_finite()) {
            return invalid("scoring weights must be finite");
        }
        let non_negative = [
            ("min_energy_to_accept", self.min_energy_to_accept),
            ("task_energy_rate", self.task_energy_rate),
            ("task_progress_rate", self.task_progress_rate),
            ("starved_progress_factor", self.starved_progress_factor),
            ("speed_km_per_tick", self.speed_km_per_tick),
            ("reserve_per_km", self.reserve_per_km),
            ("reserve_min_to_continue", self.reserve_min_to_continue),
            ("reserve_max", self.reserve_max),
            ("charge_rate", self.charge_rate),
            ("payload_min_to_charge", self.payload_min_to_charge),
            ("payload_full_eps", self.payload_full_eps),
            ("harvest_rate", self.harvest_rate),
            ("harvest_floor", self.harvest_floor),
            ("node_full_eps", self.node_full_eps),
            ("needy_threshold", self.needy_threshold),
            ("low_energy_alert", self.low_energy_alert),
            ("auto_needy_threshold", self.auto_needy_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::ConfigInvalid(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if !self.travel_instant && self.speed_km_per_tick <= 0.0 {
            return invalid("speed_km_per_tick must be positive when travel is not instant");
        }
        if self.harvest_floor >= self.harvest_start_level {
            return invalid("harvest_floor must be below harvest_start_level");
        }
        if !(self.payload_min_to_charge <= self.mission_payload_min
            && self.mission_payload_min <= self.payload_max)
        {
            return invalid("payload thresholds must satisfy min_to_charge <= mission_min <= payload_max");
        }
        if self.payload_max <= 0.0 {
            return invalid("payload_max must be positive");
        }
        if self.window_ticks == 0 || self.check_interval == 0 {
            return invalid("window_ticks and check_interval must be at least 1");
        }
        if self.min_samples > self.window_ticks {
            return invalid("min_samples must not exceed window_ticks");
        }
        if !self.dispatch_threshold.is_finite() {
            return invalid("dispatch_threshold must be finite");
        }
        if self.max_drones_per_node == 0 {
            return invalid("max_drones_per_node must be at least 1");
        }
        if self.max_pending_tasks == 0 {
            return invalid("max_pending_tasks must be at least 1");
        }
        if self.base_price.0 <= Decimal::ZERO {
            return invalid("base_price must be positive");
        }
        if self.average_price_window == 0 {
            return invalid("average_price_window must be at least 1");
        }
        if self.event_log_capacity == 0 {
            return invalid("event_log_capacity must be at least 1");
        }
        Ok(())
    }

    /// Apply `patch` onto a copy of `self`; the copy is returned only if valid.
    pub fn patched(&self, patch: &ConfigPatch) -> Result<SimConfig, EngineError> {
        let mut next = self.clone();
        patch.apply_to(&mut next);
        next.validate()?;
        Ok(next)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, EngineError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EngineError::ConfigInvalid(format!("{key}: cannot parse '{raw}'"))),
        Err(_) => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// ConfigPatch
// ---------------------------------------------------------------------------

macro_rules! config_patch {
    ($($field:ident : $ty:ty),* $(,)?) => {
        /// Partial update; `None` leaves the current value untouched.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default, deny_unknown_fields)]
        pub struct ConfigPatch {
            $(pub $field: Option<$ty>,)*
        }

        impl ConfigPatch {
            fn apply_to(&self, cfg: &mut SimConfig) {
                $(
                    if let Some(v) = &self.$field {
                        cfg.$field = v.clone();
                    }
                )*
            }

            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())*
            }
        }
    };
}

config_patch! {
    tick_ms: u64,
    weights: ScoringWeights,
    priority_boost: PriorityBoost,
    max_tasks_per_node: usize,
    min_energy_to_accept: f64,
    task_energy_rate: f64,
    task_progress_rate: f64,
    starved_progress_factor: f64,
    task_max_ticks: u64,
    max_pending_tasks: usize,
    travel_instant: bool,
    speed_km_per_tick: f64,
    reserve_per_km: f64,
    reserve_min_to_continue: f64,
    reserve_max: f64,
    enroute_max_ticks: u32,
    charge_rate: f64,
    payload_min_to_charge: f64,
    mission_payload_min: f64,
    payload_max: f64,
    payload_full_eps: f64,
    harvest_rate: f64,
    harvest_floor: f64,
    harvest_start_level: f64,
    node_full_eps: f64,
    needy_threshold: f64,
    low_energy_alert: f64,
    max_dwell_ticks: u32,
    stall_max_ticks: u32,
    max_drones_per_node: usize,
    auto_dispatch_enabled: bool,
    auto_needy_threshold: f64,
    check_interval: u64,
    window_ticks: usize,
    min_samples: usize,
    dispatch_threshold: f64,
    base_price: Credits,
    average_price_window: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SimConfig::default();
        assert!(cfg.validate().is_ok());
        let w = &cfg.weights;
        assert!((w.w1 + w.w2 + w.w3 + w.w4 + w.w5 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn patch_applies_only_named_fields() {
        let cfg = SimConfig::default();
        let patch = ConfigPatch {
            harvest_rate: Some(4.0),
            auto_dispatch_enabled: Some(false),
            ..Default::default()
        };
        let next = cfg.patched(&patch).expect("valid patch");
        assert_eq!(next.harvest_rate, 4.0);
        assert!(!next.auto_dispatch_enabled);
        assert_eq!(next.charge_rate, cfg.charge_rate);
    }

    #[test]
    fn invalid_patch_leaves_original_untouched() {
        let cfg = SimConfig::default();
        let patch = ConfigPatch {
            harvest_rate: Some(2.0),
            harvest_floor: Some(95.0),
            ..Default::default()
        };
        let err = cfg.patched(&patch).expect_err("floor above start level");
        assert!(matches!(err, EngineError::ConfigInvalid(_)));
        assert_eq!(cfg.harvest_rate, 10.0);
    }

    #[test]
    fn negative_rate_rejected() {
        let patch = ConfigPatch { charge_rate: Some(-1.0), ..Default::default() };
        assert!(SimConfig::default().patched(&patch).is_err());
    }

    #[test]
    fn patch_deserializes_from_partial_json() {
        let patch: ConfigPatch =
            serde_json::from_str(r#"{"weights":{"w1":0.5,"w2":0.2,"w3":0.2,"w4":0.05,"w5":0.05},"max_drones_per_node":3}"#)
                .unwrap();
        assert!(!patch.is_empty());
        let next = SimConfig::default().patched(&patch).unwrap();
        assert_eq!(next.weights.w1, 0.5);
        assert_eq!(next.max_drones_per_node, 3);
        assert!(ConfigPatch::default().is_empty());
    }

    #[test]
    fn unknown_patch_field_rejected() {
        let res: Result<ConfigPatch, _> = serde_json::from_str(r#"{"warp_speed":9}"#);
        assert!(res.is_err());
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let cfg = SimConfig::from_json(r#"{"seed":7,"travel_instant":false}"#).unwrap();
        assert_eq!(cfg.seed, 7);
        assert!(!cfg.travel_instant);
        assert_eq!(cfg.payload_max, 120.0);
    }

    #[test]
    fn window_shorter_than_min_samples_rejected() {
        let cfg = SimConfig { window_ticks: 5, ..SimConfig::default() };
        assert!(matches!(cfg.validate(), Err(EngineError::ConfigInvalid(_))));

        let patch = ConfigPatch { window_ticks: Some(5), ..Default::default() };
        assert!(SimConfig::default().patched(&patch).is_err());

        let both = ConfigPatch { window_ticks: Some(5), min_samples: Some(5), ..Default::default() };
        assert_eq!(SimConfig::default().patched(&both).unwrap().window_ticks, 5);
    }

    #[test]
    fn from_env_overlays_defaults() {
        std::env::set_var("ORBIT_SEED", "7");
        std::env::set_var("ORBIT_BASE_PRICE", "0.08");
        std::env::set_var("ORBIT_TRAVEL_INSTANT", "false");
        let cfg = SimConfig::from_env();

        std::env::set_var("ORBIT_SEED", "not-a-number");
        let bad = SimConfig::from_env();

        for key in ["ORBIT_SEED", "ORBIT_BASE_PRICE", "ORBIT_TRAVEL_INSTANT"] {
            std::env::remove_var(key);
        }

        let cfg = cfg.unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.base_price, Credits(dec!(0.08)));
        assert!(!cfg.travel_instant);
        assert_eq!(cfg.charge_rate, 8.0);
        assert!(matches!(bad, Err(EngineError::ConfigInvalid(_))));
    }
}
