// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Dynamic Pricing

//! Utilisation-bracket pricing.
//!
//! Scarce energy carries a premium and abundant energy a discount:
//!
//! ```text
//! utilisation  [0, .2)  [.2, .4)  [.4, .6)  [.6, .8)  [.8, 1]
//! multiplier     2.5      1.8       1.3       1.0       0.7
//! ```
//!
//! Brackets are scanned in order; the first whose exclusive upper bound
//! exceeds the utilisation wins, so a value exactly on a bound belongs to
//! the bracket above it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Node;
use crate::units::Credits;

/// One row of the bracket table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBracket {
    /// Exclusive upper bound on utilisation.
    pub upper_bound: f64,
    pub multiplier: Decimal,
}

/// Default scarcity/abundance table.
pub const DEFAULT_BRACKETS: [PriceBracket; 5] = [
    PriceBracket { upper_bound: 0.2, multiplier: dec!(2.5) },
    PriceBracket { upper_bound: 0.4, multiplier: dec!(1.8) },
    PriceBracket { upper_bound: 0.6, multiplier: dec!(1.3) },
    PriceBracket { upper_bound: 0.8, multiplier: dec!(1.0) },
    PriceBracket { upper_bound: f64::INFINITY, multiplier: dec!(0.7) },
];

/// Stateless price function over node utilisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEngine {
    base_price: Credits,
    brackets: Vec<PriceBracket>,
}

impl PricingEngine {
    pub fn new(base_price: Credits) -> Self {
        Self { base_price, brackets: DEFAULT_BRACKETS.to_vec() }
    }

    pub fn base_price(&self) -> Credits {
        self.base_price
    }

    /// Multiplier for a utilisation in [0, 1].
    pub fn multiplier(&self, utilization: f64) -> Decimal {
        let u = if utilization.is_nan() { 0.0 } else { utilization };
        self.brackets
            .iter()
            .find(|b| u < b.upper_bound)
            .or_else(|| self.brackets.last())
            .map(|b| b.multiplier)
            .unwrap_or(Decimal::ONE)
    }

    pub fn price_for_utilization(&self, utilization: f64) -> Credits {
        self.base_price * self.multiplier(utilization)
    }

    /// Price per energy unit for `node` at its current energy level.
    pub fn price(&self, node: &Node) -> Credits {
        self.price_for_utilization(node.utilization())
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(Credits(dec!(0.05)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
