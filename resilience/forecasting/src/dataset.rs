use std::path::Path;

use chrono::{Days, NaiveDate};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Bernoulli, Distribution, Normal, Poisson, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default file name of the persisted synthetic dataset.
pub const DEFAULT_DATASET_FILE: &str = "logistics_disruption_dataset.csv";

/// CSV header written for every dataset, in column order.
pub const CSV_COLUMNS: [&str; 7] = [
    "date",
    "num_shipments",
    "weather_risk",
    "supplier_reliability",
    "port_congestion",
    "maintenance_needed",
    "disruption_risk",
];

const MEAN_DAILY_SHIPMENTS: f64 = 50.0;
const CONGESTION_PROBABILITY: f64 = 0.3;
const MAINTENANCE_PROBABILITY: f64 = 0.1;
const NOISE_SCALE: f64 = 0.05;

/// One simulated calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Calendar day.
    pub date: NaiveDate,
    /// Shipments handled that day.
    pub num_shipments: u32,
    /// Weather risk score in `[0, 1]`.
    pub weather_risk: f64,
    /// Supplier reliability in `[0.8, 1]`.
    pub supplier_reliability: f64,
    /// Port congestion flag (0/1).
    pub port_congestion: u8,
    /// Maintenance-needed flag (0/1).
    pub maintenance_needed: u8,
    /// Derived disruption risk, always clipped to `[0, 1]`.
    pub disruption_risk: f64,
}

/// Parameters controlling dataset synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisSettings {
    /// RNG seed; equal seeds yield identical datasets.
    pub seed: u64,
    /// Number of consecutive days to simulate.
    pub days: usize,
    /// First simulated day.
    pub start_date: NaiveDate,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            days: 365,
            start_date: default_start_date(),
        }
    }
}

/// First day of the default simulation window (2024-01-01).
#[must_use]
pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Errors raised while generating or persisting the dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A sampling distribution rejected its parameters.
    #[error("invalid distribution: {0}")]
    Distribution(String),
    /// The simulated window runs past the representable calendar.
    #[error("date overflow after {0} days")]
    DateOverflow(usize),
    /// A persisted row violates the record invariants.
    #[error("row {row}: {reason}")]
    InvalidRecord {
        /// One-based data row.
        row: usize,
        /// What was wrong.
        reason: String,
    },
    /// CSV encoding or decoding failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Noise-free risk from the raw daily indicators.
#[must_use]
pub fn base_risk(weather: f64, reliability: f64, congestion: u8, maintenance: u8) -> f64 {
    0.2 + weather * 0.4
        + (1.0 - reliability) * 0.2
        + f64::from(congestion) * 0.1
        + f64::from(maintenance) * 0.1
}

/// Bounds a risk value to `[0, 1]`.
#[must_use]
pub fn clip_risk(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Generates the labelled daily series.
///
/// Each raw column is sampled independently (shipments first, then weather, reliability,
/// congestion, maintenance and finally the label noise) so a seed always maps to the same table.
pub fn synthesize(settings: &SynthesisSettings) -> Result<Vec<Record>, DatasetError> {
    let days = settings.days;
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);

    let shipments_dist = Poisson::new(MEAN_DAILY_SHIPMENTS)
        .map_err(|err| DatasetError::Distribution(err.to_string()))?;
    let congestion_dist = Bernoulli::new(CONGESTION_PROBABILITY)
        .map_err(|err| DatasetError::Distribution(err.to_string()))?;
    let maintenance_dist = Bernoulli::new(MAINTENANCE_PROBABILITY)
        .map_err(|err| DatasetError::Distribution(err.to_string()))?;
    let noise_dist =
        Normal::new(0.0, NOISE_SCALE).map_err(|err| DatasetError::Distribution(err.to_string()))?;

    let shipments: Vec<u32> = (0..days)
        .map(|_| {
            let draw: f64 = shipments_dist.sample(&mut rng);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let count = draw as u32;
            count
        })
        .collect();
    let weather: Vec<f64> = Uniform::new(0.0, 1.0)
        .sample_iter(&mut rng)
        .take(days)
        .collect();
    let reliability: Vec<f64> = Uniform::new(0.8, 1.0)
        .sample_iter(&mut rng)
        .take(days)
        .collect();
    let congestion: Vec<u8> = (0..days)
        .map(|_| u8::from(congestion_dist.sample(&mut rng)))
        .collect();
    let maintenance: Vec<u8> = (0..days)
        .map(|_| u8::from(maintenance_dist.sample(&mut rng)))
        .collect();

    let mut records = Vec::with_capacity(days);
    for day in 0..days {
        let date = settings
            .start_date
            .checked_add_days(Days::new(day as u64))
            .ok_or(DatasetError::DateOverflow(day))?;
        let noise = noise_dist.sample(&mut rng);
        let risk = base_risk(
            weather[day],
            reliability[day],
            congestion[day],
            maintenance[day],
        ) + noise;
        records.push(Record {
            date,
            num_shipments: shipments[day],
            weather_risk: weather[day],
            supplier_reliability: reliability[day],
            port_congestion: congestion[day],
            maintenance_needed: maintenance[day],
            disruption_risk: clip_risk(risk),
        });
    }
    Ok(records)
}

/// Writes the dataset as CSV with the [`CSV_COLUMNS`] header.
pub fn write_csv(path: impl AsRef<Path>, records: &[Record]) -> Result<(), DatasetError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    if records.is_empty() {
        writer.write_record(CSV_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a dataset previously written by [`write_csv`].
pub fn read_csv(path: impl AsRef<Path>) -> Result<Vec<Record>, DatasetError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<Record>().enumerate() {
        let record = row?;
        validate(&record).map_err(|reason| DatasetError::InvalidRecord {
            row: idx + 1,
            reason,
        })?;
        records.push(record);
    }
    Ok(records)
}

fn validate(record: &Record) -> Result<(), String> {
    if !(0.0..=1.0).contains(&record.disruption_risk) {
        return Err(format!(
            "disruption_risk {} outside [0, 1]",
            record.disruption_risk
        ));
    }
    if record.port_congestion > 1 || record.maintenance_needed > 1 {
        return Err("flag columns must be 0 or 1".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> Vec<Record> {
        synthesize(&SynthesisSettings::default()).unwrap()
    }

    #[test]
    fn generates_one_record_per_day() {
        let records = sample();
        assert_eq!(records.len(), 365);
        assert_eq!(records[0].date, default_start_date());
        for pair in records.windows(2) {
            assert_eq!(pair[0].date.succ_opt(), Some(pair[1].date));
        }
    }

    #[test]
    fn risk_and_raw_fields_stay_in_range() {
        for record in sample() {
            assert!((0.0..=1.0).contains(&record.disruption_risk));
            assert!((0.0..1.0).contains(&record.weather_risk));
            assert!((0.8..1.0).contains(&record.supplier_reliability));
            assert!(record.port_congestion <= 1);
            assert!(record.maintenance_needed <= 1);
        }
    }

    #[test]
    fn same_seed_same_dataset() {
        let settings = SynthesisSettings {
            days: 30,
            ..SynthesisSettings::default()
        };
        assert_eq!(synthesize(&settings).unwrap(), synthesize(&settings).unwrap());
        let other = SynthesisSettings {
            seed: 7,
            ..settings.clone()
        };
        assert_ne!(synthesize(&settings).unwrap(), synthesize(&other).unwrap());
    }

    #[test]
    fn sampled_rates_track_their_distributions() {
        let records = sample();
        let n = records.len() as f64;
        let shipments = records.iter().map(|r| f64::from(r.num_shipments)).sum::<f64>() / n;
        let congestion = records.iter().map(|r| f64::from(r.port_congestion)).sum::<f64>() / n;
        assert!((shipments - 50.0).abs() < 2.5, "mean shipments {shipments}");
        assert!((congestion - 0.3).abs() < 0.1, "congestion rate {congestion}");
    }

    #[test]
    fn clipping_bounds_extreme_values() {
        let worst = base_risk(1.0, 0.8, 1, 1);
        assert!((worst - 0.84).abs() < 1e-12);
        assert!((clip_risk(worst + 0.5) - 1.0).abs() < f64::EPSILON);
        assert!(clip_risk(-0.2).abs() < f64::EPSILON);
        assert!((clip_risk(0.42) - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn csv_round_trip_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_DATASET_FILE);
        let records = sample();
        write_csv(&path, &records).unwrap();

        let header = std::fs::read_to_string(&path).unwrap();
        assert_eq!(header.lines().next().unwrap(), CSV_COLUMNS.join(","));

        let restored = read_csv(&path).unwrap();
        assert_eq!(restored.len(), records.len());
        for (a, b) in records.iter().zip(&restored) {
            assert_eq!(a.date, b.date);
            assert_eq!(a.num_shipments, b.num_shipments);
            assert_eq!(a.port_congestion, b.port_congestion);
            assert_eq!(a.maintenance_needed, b.maintenance_needed);
            assert!((a.weather_risk - b.weather_risk).abs() < 1e-12);
            assert!((a.supplier_reliability - b.supplier_reliability).abs() < 1e-12);
            assert!((a.disruption_risk - b.disruption_risk).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_out_of_range_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "date,num_shipments,weather_risk,supplier_reliability,port_congestion,maintenance_needed,disruption_risk\n\
             2024-01-01,50,0.5,0.9,0,0,1.4\n",
        )
        .unwrap();
        let err = read_csv(&path).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidRecord { row: 1, .. }));
    }
}
