use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::dataset::Record;

/// Day offsets used for the lagged risk columns.
pub const LAG_OFFSETS: [usize; 4] = [1, 2, 3, 7];
/// Trailing window of the rolling risk average.
pub const ROLLING_WINDOW: usize = 7;
/// Name of the regression target column.
pub const TARGET: &str = "disruption_risk";

/// Model input columns, in the order the regressor consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Feature {
    /// Daily shipments.
    #[serde(rename = "num_shipments")]
    NumShipments,
    /// Weather risk score.
    #[serde(rename = "weather_risk")]
    WeatherRisk,
    /// Supplier reliability.
    #[serde(rename = "supplier_reliability")]
    SupplierReliability,
    /// Port congestion flag.
    #[serde(rename = "port_congestion")]
    PortCongestion,
    /// Maintenance-needed flag.
    #[serde(rename = "maintenance_needed")]
    MaintenanceNeeded,
    /// Risk one day earlier.
    #[serde(rename = "disruption_risk_lag1")]
    RiskLag1,
    /// Risk two days earlier.
    #[serde(rename = "disruption_risk_lag2")]
    RiskLag2,
    /// Risk three days earlier.
    #[serde(rename = "disruption_risk_lag3")]
    RiskLag3,
    /// Risk seven days earlier.
    #[serde(rename = "disruption_risk_lag7")]
    RiskLag7,
    /// Trailing seven-day mean risk.
    #[serde(rename = "rolling_avg7")]
    RollingAvg7,
}

impl Feature {
    /// Every feature, in model column order.
    pub const ALL: [Self; 10] = [
        Self::NumShipments,
        Self::WeatherRisk,
        Self::SupplierReliability,
        Self::PortCongestion,
        Self::MaintenanceNeeded,
        Self::RiskLag1,
        Self::RiskLag2,
        Self::RiskLag3,
        Self::RiskLag7,
        Self::RollingAvg7,
    ];

    /// Column name as written in reports.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NumShipments => "num_shipments",
            Self::WeatherRisk => "weather_risk",
            Self::SupplierReliability => "supplier_reliability",
            Self::PortCongestion => "port_congestion",
            Self::MaintenanceNeeded => "maintenance_needed",
            Self::RiskLag1 => "disruption_risk_lag1",
            Self::RiskLag2 => "disruption_risk_lag2",
            Self::RiskLag3 => "disruption_risk_lag3",
            Self::RiskLag7 => "disruption_risk_lag7",
            Self::RollingAvg7 => "rolling_avg7",
        }
    }

    /// Column index in the design matrix.
    #[must_use]
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|f| *f == self).unwrap_or(0)
    }

    /// True for columns derived from past risk values rather than observed inputs.
    #[must_use]
    pub const fn is_derived(self) -> bool {
        matches!(
            self,
            Self::RiskLag1 | Self::RiskLag2 | Self::RiskLag3 | Self::RiskLag7 | Self::RollingAvg7
        )
    }

    /// Observed (non-derived) features, in column order.
    pub fn observed() -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(|f| !f.is_derived())
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let key = raw.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == key)
            .ok_or_else(|| format!("unknown feature '{key}'"))
    }
}

/// A record plus its derived lag and rolling columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Raw daily record.
    pub record: Record,
    /// Lagged risk, aligned with [`LAG_OFFSETS`].
    pub lags: [f64; 4],
    /// Trailing seven-day mean risk.
    pub rolling_avg7: f64,
}

impl FeatureRow {
    /// Value of a model feature.
    #[must_use]
    pub fn value(&self, feature: Feature) -> f64 {
        let r = &self.record;
        match feature {
            Feature::NumShipments => f64::from(r.num_shipments),
            Feature::WeatherRisk => r.weather_risk,
            Feature::SupplierReliability => r.supplier_reliability,
            Feature::PortCongestion => f64::from(r.port_congestion),
            Feature::MaintenanceNeeded => f64::from(r.maintenance_needed),
            Feature::RiskLag1 => self.lags[0],
            Feature::RiskLag2 => self.lags[1],
            Feature::RiskLag3 => self.lags[2],
            Feature::RiskLag7 => self.lags[3],
            Feature::RollingAvg7 => self.rolling_avg7,
        }
    }

    /// Regression target.
    #[must_use]
    pub const fn target(&self) -> f64 {
        self.record.disruption_risk
    }

    /// Calendar day of the row.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.record.date
    }
}

/// Risk shifted forward by `lag` days; leading gaps take the first shifted value.
#[must_use]
pub fn lagged(series: &[f64], lag: usize) -> Vec<f64> {
    (0..series.len())
        .map(|idx| series[idx.checked_sub(lag).unwrap_or(0)])
        .collect()
}

/// Trailing mean over at most `window` values ending at each index.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rolling_mean(series: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..series.len())
        .map(|idx| {
            let start = (idx + 1).saturating_sub(window);
            let slice = &series[start..=idx];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Chronologically ordered feature rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Derives lag and rolling columns from the records, which must be in date order.
    #[must_use]
    pub fn build(records: &[Record]) -> Self {
        let risk: Vec<f64> = records.iter().map(|r| r.disruption_risk).collect();
        let lag_columns: Vec<Vec<f64>> = LAG_OFFSETS.iter().map(|&lag| lagged(&risk, lag)).collect();
        let rolling = rolling_mean(&risk, ROLLING_WINDOW);
        let rows = records
            .iter()
            .enumerate()
            .map(|(idx, record)| FeatureRow {
                record: record.clone(),
                lags: [
                    lag_columns[0][idx],
                    lag_columns[1][idx],
                    lag_columns[2][idx],
                    lag_columns[3][idx],
                ],
                rolling_avg7: rolling[idx],
            })
            .collect();
        Self { rows }
    }

    /// Wraps already-built rows.
    #[must_use]
    pub const fn from_rows(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrowed rows.
    #[must_use]
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// Most recent row.
    #[must_use]
    pub fn last(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }

    /// Values of one feature column.
    #[must_use]
    pub fn column(&self, feature: Feature) -> Vec<f64> {
        self.rows.iter().map(|row| row.value(feature)).collect()
    }

    /// Row dates, in table order.
    #[must_use]
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(FeatureRow::date).collect()
    }

    /// `rows x features` matrix in [`Feature::ALL`] column order.
    #[must_use]
    pub fn design_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows.len(), Feature::ALL.len()), |(row, col)| {
            self.rows[row].value(Feature::ALL[col])
        })
    }

    /// Target vector.
    #[must_use]
    pub fn targets(&self) -> Array1<f64> {
        self.rows.iter().map(FeatureRow::target).collect()
    }

    /// Splits into `[0, at)` and `[at, len)`.
    #[must_use]
    pub fn split_at(&self, at: usize) -> (Self, Self) {
        let at = at.min(self.rows.len());
        let (head, tail) = self.rows.split_at(at);
        (Self::from_rows(head.to_vec()), Self::from_rows(tail.to_vec()))
    }
}
