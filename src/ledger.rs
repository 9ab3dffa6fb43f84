// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Transaction Ledger

//! Append-only settlement log.
//!
//! Every energy transfer is recorded once and never mutated. Only harvests
//! are paid; charges and source recharges move energy the carrier already
//! owns or that the source gives away, so they must carry a zero cost:
//!
//! ```text
//! harvest          total_cost = price_per_unit * energy_amount
//! charge           total_cost = 0
//! source_recharge  total_cost = 0
//! ```
//!
//! Leaderboards and efficiency rankings are derived on read.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::LedgerError;
use crate::types::{Carrier, Node};
use crate::units::{to_decimal, Credits, TxId};

/// Identifier used for the free energy source in ledger entries.
pub const SOURCE_ID: &str = "source";
pub const SOURCE_OWNER: &str = "Source Energy Authority";

const SETTLEMENT_TOLERANCE: Decimal = rust_decimal_macros::dec!(0.00000001);
const LEADERBOARD_SIZE: usize = 3;

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Harvest,
    Charge,
    SourceRecharge,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Harvest => "harvest",
            Self::Charge => "charge",
            Self::SourceRecharge => "source_recharge",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Harvest)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    /// Tick of settlement.
    pub timestamp: u64,
    pub from_id: String,
    pub to_id: String,
    pub from_owner: String,
    pub to_owner: String,
    pub energy_amount: f64,
    pub price_per_unit: Credits,
    pub total_cost: Credits,
    pub kind: TxKind,
}

impl Transaction {
    /// Paid transfer from a node into a carrier's payload.
    pub fn harvest(id: TxId, tick: u64, node: &Node, carrier: &Carrier, amount: f64, price: Credits) -> Self {
        Self {
            id,
            timestamp: tick,
            from_id: node.id.to_string(),
            to_id: carrier.id.to_string(),
            from_owner: node.owner_id.clone(),
            to_owner: carrier.owner_id.clone(),
            energy_amount: amount,
            price_per_unit: price,
            total_cost: price.times_energy(amount),
            kind: TxKind::Harvest,
        }
    }

    /// Free transfer from a carrier's payload into a node.
    pub fn charge(id: TxId, tick: u64, carrier: &Carrier, node: &Node, amount: f64) -> Self {
        Self {
            id,
            timestamp: tick,
            from_id: carrier.id.to_string(),
            to_id: node.id.to_string(),
            from_owner: carrier.owner_id.clone(),
            to_owner: node.owner_id.clone(),
            energy_amount: amount,
            price_per_unit: Credits::zero(),
            total_cost: Credits::zero(),
            kind: TxKind::Charge,
        }
    }

    /// Free payload refill at the source.
    pub fn source_recharge(id: TxId, tick: u64, carrier: &Carrier, amount: f64) -> Self {
        Self {
            id,
            timestamp: tick,
            from_id: SOURCE_ID.to_string(),
            to_id: carrier.id.to_string(),
            from_owner: SOURCE_OWNER.to_string(),
            to_owner: carrier.owner_id.clone(),
            energy_amount: amount,
            price_per_unit: Credits::zero(),
            total_cost: Credits::zero(),
            kind: TxKind::SourceRecharge,
        }
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if !(self.energy_amount.is_finite() && self.energy_amount > 0.0) {
            return Err(LedgerError::NonPositiveAmount(self.energy_amount));
        }
        match self.kind {
            TxKind::Harvest => {
                let expected = self.price_per_unit.times_energy(self.energy_amount);
                if (expected.0 - self.total_cost.0).abs() > SETTLEMENT_TOLERANCE {
                    return Err(LedgerError::CostMismatch {
                        expected: expected.to_string(),
                        recorded: self.total_cost.to_string(),
                    });
                }
            }
            TxKind::Charge | TxKind::SourceRecharge => {
                if !self.total_cost.is_zero() {
                    return Err(LedgerError::NonZeroCost {
                        kind: self.kind.as_str(),
                        cost: self.total_cost.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Derived aggregates
// ---------------------------------------------------------------------------

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerTotal {
    pub owner: String,
    pub amount: Credits,
    pub energy: f64,
}

/// Revenue per unit of energy sold, for a node-owning company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyEfficiency {
    pub owner: String,
    pub revenue: Credits,
    pub energy_sold: f64,
    pub efficiency: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub transaction_count: usize,
    pub total_volume: Credits,
    pub average_price: Credits,
    pub harvest_count: usize,
    pub charge_count: usize,
    pub source_recharge_count: usize,
    pub top_earners: Vec<OwnerTotal>,
    pub top_spenders: Vec<OwnerTotal>,
    pub most_efficient: Option<CompanyEfficiency>,
    pub least_efficient: Option<CompanyEfficiency>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    entries: Vec<Transaction>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier the next appended transaction should carry.
    pub fn next_id(&self) -> TxId {
        TxId(format!("txn-{:06}", self.entries.len() + 1))
    }

    /// Validate and append. Existing entries are never touched.
    pub fn record(&mut self, tx: Transaction) -> Result<&Transaction, LedgerError> {
        tx.validate()?;
        self.entries.push(tx);
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.entries
    }

    /// Newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[Transaction] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn transaction_count(&self) -> usize {
        self.entries.len()
    }

    pub fn count_of(&self, kind: TxKind) -> usize {
        self.entries.iter().filter(|t| t.kind == kind).count()
    }

    pub fn total_volume(&self) -> Credits {
        self.entries.iter().map(|t| t.total_cost).sum()
    }

    /// Mean `price_per_unit` over the last `window` paid transactions.
    ///
    /// Free transfers carry no market price and are left out.
    pub fn average_price(&self, window: usize) -> Credits {
        let prices: Vec<Decimal> = self
            .entries
            .iter()
            .rev()
            .filter(|t| t.kind.is_paid())
            .take(window)
            .map(|t| t.price_per_unit.0)
            .collect();
        if prices.is_empty() {
            return Credits::zero();
        }
        let sum: Decimal = prices.iter().sum();
        Credits(sum / Decimal::from(prices.len()))
    }

    /// Harvest revenue per node-owning company.
    pub fn revenue_by_owner(&self) -> BTreeMap<String, (Credits, f64)> {
        let mut out: BTreeMap<String, (Credits, f64)> = BTreeMap::new();
        for t in self.entries.iter().filter(|t| t.kind.is_paid()) {
            let entry = out.entry(t.from_owner.clone()).or_default();
            entry.0 += t.total_cost;
            entry.1 += t.energy_amount;
        }
        out
    }

    /// Harvest spend per carrier-owning company.
    pub fn spend_by_owner(&self) -> BTreeMap<String, (Credits, f64)> {
        let mut out: BTreeMap<String, (Credits, f64)> = BTreeMap::new();
        for t in self.entries.iter().filter(|t| t.kind.is_paid()) {
            let entry = out.entry(t.to_owner.clone()).or_default();
            entry.0 += t.total_cost;
            entry.1 += t.energy_amount;
        }
        out
    }

    pub fn top_earners(&self, n: usize) -> Vec<OwnerTotal> {
        leaderboard(self.revenue_by_owner(), n)
    }

    pub fn top_spenders(&self, n: usize) -> Vec<OwnerTotal> {
        leaderboard(self.spend_by_owner(), n)
    }

    /// `revenue / energy_sold` per company; companies that sold nothing are
    /// not ranked.
    pub fn efficiency_ranking(&self) -> Vec<CompanyEfficiency> {
        let mut ranked: Vec<CompanyEfficiency> = self
            .revenue_by_owner()
            .into_iter()
            .filter(|(_, (_, energy))| *energy > 0.0)
            .filter_map(|(owner, (revenue, energy_sold))| {
                let efficiency = revenue.0.checked_div(to_decimal(energy_sold))?;
                Some(CompanyEfficiency { owner, revenue, energy_sold, efficiency })
            })
            .collect();
        ranked.sort_by(|a, b| b.efficiency.cmp(&a.efficiency).then_with(|| a.owner.cmp(&b.owner)));
        ranked
    }

    pub fn most_efficient(&self) -> Option<CompanyEfficiency> {
        self.efficiency_ranking().into_iter().next()
    }

    pub fn least_efficient(&self) -> Option<CompanyEfficiency> {
        self.efficiency_ranking().pop()
    }

    pub fn summary(&self, price_window: usize) -> LedgerSummary {
        let ranking = self.efficiency_ranking();
        LedgerSummary {
            transaction_count: self.transaction_count(),
            total_volume: self.total_volume(),
            average_price: self.average_price(price_window),
            harvest_count: self.count_of(TxKind::Harvest),
            charge_count: self.count_of(TxKind::Charge),
            source_recharge_count: self.count_of(TxKind::SourceRecharge),
            top_earners: self.top_earners(LEADERBOARD_SIZE),
            top_spenders: self.top_spenders(LEADERBOARD_SIZE),
            most_efficient: ranking.first().cloned(),
            least_efficient: ranking.last().cloned(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn leaderboard(totals: BTreeMap<String, (Credits, f64)>, n: usize) -> Vec<OwnerTotal> {
    let mut rows: Vec<OwnerTotal> = totals
        .into_iter()
        .map(|(owner, (amount, energy))| OwnerTotal { owner, amount, energy })
        .collect();
    // BTreeMap order already sorts owners, so a stable sort keeps ties by name.
    rows.sort_by(|a, b| b.amount.cmp(&a.amount));
    rows.truncate(n);
    rows
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
