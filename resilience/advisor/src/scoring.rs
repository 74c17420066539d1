use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AdvisorError;

/// Risk score above which the level is high.
pub const HIGH_RISK_CUTOFF: f64 = 0.6;
/// Risk score above which the level is medium.
pub const MEDIUM_RISK_CUTOFF: f64 = 0.3;

/// The four supply-chain indicators supplied by the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    /// Units on hand.
    pub inventory: f64,
    /// Replenishment lead time in days.
    pub lead_time: f64,
    /// Supplier quality score in [0, 1].
    pub supplier_score: f64,
    /// Weather favourability index in [0, 1].
    pub weather_index: f64,
}

impl Indicators {
    /// Validates and builds the indicator set.
    pub fn new(
        inventory: f64,
        lead_time: f64,
        supplier_score: f64,
        weather_index: f64,
    ) -> Result<Self, AdvisorError> {
        let indicators = Self {
            inventory,
            lead_time,
            supplier_score,
            weather_index,
        };
        indicators.validate()?;
        Ok(indicators)
    }

    /// Rejects non-finite values, negative quantities and scores outside [0, 1].
    pub fn validate(&self) -> Result<(), AdvisorError> {
        for (name, value) in self.fields() {
            if !value.is_finite() {
                return Err(AdvisorError::InvalidInput(format!(
                    "{name} must be a finite number, got {value}"
                )));
            }
        }
        non_negative("inventory", self.inventory)?;
        non_negative("lead_time", self.lead_time)?;
        unit_interval("supplier_score", self.supplier_score)?;
        unit_interval("weather_index", self.weather_index)?;
        Ok(())
    }

    /// Name/value pairs in prompt order.
    #[must_use]
    pub const fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("inventory", self.inventory),
            ("lead_time", self.lead_time),
            ("supplier_score", self.supplier_score),
            ("weather_index", self.weather_index),
        ]
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), AdvisorError> {
    if value < 0.0 {
        return Err(AdvisorError::InvalidInput(format!(
            "{name} must be >= 0, got {value}"
        )));
    }
    Ok(())
}

fn unit_interval(name: &str, value: f64) -> Result<(), AdvisorError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AdvisorError::InvalidInput(format!(
            "{name} must be in [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Parses one indicator typed by the user.
pub fn parse_indicator(name: &str, raw: &str) -> Result<f64, AdvisorError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AdvisorError::InvalidInput(format!("{name}: '{}' is not a number", raw.trim())))
}

/// Coarse risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Score at or below the medium cutoff.
    Low,
    /// Score above the medium cutoff, at or below the high cutoff.
    Medium,
    /// Score above the high cutoff.
    High,
}

impl RiskLevel {
    /// Bands a risk score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > HIGH_RISK_CUTOFF {
            Self::High
        } else if score > MEDIUM_RISK_CUTOFF {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Deterministic scores derived from the indicators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// `inventory * 1.2 - lead_time * 5`; may be negative.
    pub predicted_sales: f64,
    /// Mean shortfall of supplier score and weather index.
    pub risk_score: f64,
    /// Band of `risk_score`.
    pub risk_level: RiskLevel,
}

/// Scores the indicators.
#[must_use]
pub fn assess(indicators: &Indicators) -> Assessment {
    let predicted_sales = indicators.inventory.mul_add(1.2, -(indicators.lead_time * 5.0));
    let risk_score =
        (1.0 - indicators.supplier_score).mul_add(0.5, (1.0 - indicators.weather_index) * 0.5);
    Assessment {
        predicted_sales,
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
    }
}
