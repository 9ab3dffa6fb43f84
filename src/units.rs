// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Identifiers, Money and Geometry

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self { $name(s) }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self { $name(s.to_string()) }
        }
    };
}

string_id!(
    /// Satellite identifier. Ordering is used as the final delegation tie-break.
    NodeId
);
string_id!(
    /// Drone identifier.
    CarrierId
);
string_id!(
    /// Work item identifier.
    TaskId
);
string_id!(
    /// Ledger entry identifier.
    TxId
);

// ---------------------------------------------------------------------------
// Credits
// ---------------------------------------------------------------------------

/// Simulated settlement currency backed by `rust_decimal::Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credits(pub Decimal);

impl Credits {
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_decimal(d: Decimal) -> Self {
        Self(d)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Price of `amount` energy units at `self` per unit.
    pub fn times_energy(self, amount: f64) -> Credits {
        Credits(self.0 * to_decimal(amount))
    }

    pub fn to_f64(self) -> f64 {
        from_decimal(self.0)
    }
}

impl Add for Credits {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Credits {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Credits {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Credits {
    type Output = Self;
    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl std::iter::Sum for Credits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Credits::zero(), |acc, c| acc + c)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}cr", self.0)
    }
}

/// Convert f64 to Decimal (lossy but sufficient for simulation).
pub fn to_decimal(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or(Decimal::ZERO)
}

/// Convert Decimal to f64.
pub fn from_decimal(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Ground-track position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

impl Position {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &Position) -> f64 {
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lon.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn credits_times_energy_is_exact_for_simple_amounts() {
        let price = Credits(dec!(0.035));
        assert_eq!(price.times_energy(10.0), Credits(dec!(0.35)));
    }

    #[test]
    fn credits_sum_and_display() {
        let total: Credits = [Credits(dec!(1.5)), Credits(dec!(2.25))].into_iter().sum();
        assert_eq!(total, Credits(dec!(3.75)));
        assert_eq!(total.to_string(), "3.75cr");
    }

    #[test]
    fn distance_zero_for_same_point() {
        let p = Position::new(12.0, -40.0);
        assert!(p.distance_km(&p).abs() < 1e-9);
    }

    #[test]
    fn distance_along_meridian_matches_arc_length() {
        let origin = Position::default();
        let lat = (1000.0 / EARTH_RADIUS_KM).to_degrees();
        let d = origin.distance_km(&Position::new(lat, 0.0));
        assert!((d - 1000.0).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn ids_order_lexicographically() {
        let a = NodeId::from("sat-01");
        let b = NodeId::from("sat-02");
        assert!(a < b);
        assert_eq!(a.as_str(), "sat-01");
    }
}
