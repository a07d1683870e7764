//! Fixed-point wire types.
//!
//! Protocol fields never carry floats: float bit patterns vary across
//! platforms and serializers, and a single divergent byte breaks digest
//! equality. Money travels as micro-dollars, ratios as parts-per-million.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A USD amount in micro-dollars (1e-6 USD).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MicroUsd(pub i64);

impl MicroUsd {
    pub const ZERO: Self = Self(0);

    /// Construct from a float dollar amount. Returns `None` for non-finite
    /// or out-of-range input.
    pub fn from_usd(usd: f64) -> Option<Self> {
        if !usd.is_finite() {
            return None;
        }
        let micros = usd * 1_000_000.0;
        if micros > i64::MAX as f64 || micros < i64::MIN as f64 {
            return None;
        }
        Some(Self(micros.round() as i64))
    }

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Dollar value for display. Never feed this back into a digest path.
    pub fn to_usd(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Display for MicroUsd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.6}", self.to_usd())
    }
}

/// A ratio in parts-per-million (0..=1_000_000 covers 0%..100%).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Ppm(pub u32);

impl Ppm {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1_000_000);

    /// Construct from a ratio in [0, 1]; values are clamped.
    pub fn from_ratio(ratio: f64) -> Self {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Self::ZERO;
        }
        if ratio >= 1.0 {
            return Self::ONE;
        }
        Self((ratio * 1_000_000.0).round() as u32)
    }

    /// Ratio value for display.
    pub fn to_ratio(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}
