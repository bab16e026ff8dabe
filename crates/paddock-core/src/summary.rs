//! Summary strategies and the per-quantity strategy table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use paddock_types::Quantity;

use crate::error::Error;

/// How the readings of one bucket are reduced to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryFn {
    Sum,
    Mean,
    Min,
    Max,
    /// Mean direction of compass bearings in degrees, in `[0, 360)`.
    CircularMean,
}

impl SummaryFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryFn::Sum => "sum",
            SummaryFn::Mean => "mean",
            SummaryFn::Min => "min",
            SummaryFn::Max => "max",
            SummaryFn::CircularMean => "circular_mean",
        }
    }

    /// Reduce `values` to one number, or `None` when there are no values.
    ///
    /// Callers that need order-independent results pass the values sorted.
    #[must_use]
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let value = match self {
            SummaryFn::Sum => values.iter().sum(),
            SummaryFn::Mean => values.iter().sum::<f64>() / n,
            SummaryFn::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            SummaryFn::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            SummaryFn::CircularMean => {
                let (sin, cos) = values.iter().fold((0.0_f64, 0.0_f64), |(s, c), deg| {
                    let rad = deg.to_radians();
                    (s + rad.sin(), c + rad.cos())
                });
                let mean = sin.atan2(cos).to_degrees().rem_euclid(360.0);
                // rem_euclid rounds tiny negative angles up to 360.0
                if mean >= 360.0 { 0.0 } else { mean }
            }
        };
        Some(value)
    }
}

impl fmt::Display for SummaryFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryFn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(SummaryFn::Sum),
            "mean" | "avg" | "average" => Ok(SummaryFn::Mean),
            "min" => Ok(SummaryFn::Min),
            "max" => Ok(SummaryFn::Max),
            "circular_mean" => Ok(SummaryFn::CircularMean),
            other => Err(Error::InvalidConfig(format!(
                "unknown summary strategy '{other}'"
            ))),
        }
    }
}

/// Summary strategy per quantity.
///
/// Quantities missing from the table are summed.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    strategies: BTreeMap<Quantity, SummaryFn>,
}

impl Default for SummaryTable {
    /// Rainfall depths add up, rain-gauge totals keep their maximum, wind
    /// direction uses a circular mean and everything else is averaged.
    fn default() -> Self {
        let strategies = Quantity::ALL
            .into_iter()
            .map(|quantity| {
                let summary = match quantity {
                    Quantity::RainfallHourly => SummaryFn::Sum,
                    Quantity::RainAccumulation => SummaryFn::Max,
                    Quantity::WindDirection => SummaryFn::CircularMean,
                    _ => SummaryFn::Mean,
                };
                (quantity, summary)
            })
            .collect();
        Self { strategies }
    }
}

impl SummaryTable {
    /// A table with no entries, so every quantity is summed.
    pub fn empty() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// Replace the strategy for one quantity.
    #[must_use]
    pub fn with(mut self, quantity: Quantity, summary: SummaryFn) -> Self {
        self.strategies.insert(quantity, summary);
        self
    }

    /// Apply a set of overrides on top of this table.
    #[must_use]
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (Quantity, SummaryFn)>,
    {
        self.strategies.extend(overrides);
        self
    }

    /// The strategy for `quantity`.
    #[must_use]
    pub fn get(&self, quantity: Quantity) -> SummaryFn {
        self.strategies
            .get(&quantity)
            .copied()
            .unwrap_or(SummaryFn::Sum)
    }

    /// Explicit entries, in quantity order.
    pub fn iter(&self) -> impl Iterator<Item = (Quantity, SummaryFn)> + '_ {
        self.strategies.iter().map(|(q, s)| (*q, *s))
    }
}
