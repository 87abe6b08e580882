//! Rounding of fractional minor-unit amounts
//!
//! Discounts introduce fractions of a penny. They are carried unrounded
//! through the calculation and rounded exactly once, when the export row
//! is written.

use crate::{Error, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Rule used to bring a net amount back to whole minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    /// Nearest unit, ties away from zero (2.5 -> 3, -2.5 -> -3)
    #[default]
    HalfUp,
    /// Nearest unit, ties to even (2.5 -> 2, 3.5 -> 4)
    HalfEven,
    /// Toward zero
    Down,
    /// Toward negative infinity
    Floor,
    /// Toward positive infinity
    Ceiling,
}

impl RoundingRule {
    /// Round `value` to zero decimal places
    pub fn apply(self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(0, self.strategy())
    }

    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingRule::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingRule::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingRule::Down => RoundingStrategy::ToZero,
            RoundingRule::Floor => RoundingStrategy::ToNegativeInfinity,
            RoundingRule::Ceiling => RoundingStrategy::ToPositiveInfinity,
        }
    }
}

impl FromStr for RoundingRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "half_up" => Ok(RoundingRule::HalfUp),
            "half_even" => Ok(RoundingRule::HalfEven),
            "down" => Ok(RoundingRule::Down),
            "floor" => Ok(RoundingRule::Floor),
            "ceiling" => Ok(RoundingRule::Ceiling),
            other => Err(Error::Config(format!("Unknown rounding rule: {}", other))),
        }
    }
}
