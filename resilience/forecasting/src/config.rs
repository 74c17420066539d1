use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared_logging::LogLevel;
use thiserror::Error;

use crate::{
    boosting::BoostingParams,
    dataset::{default_start_date, SynthesisSettings, DEFAULT_DATASET_FILE},
    training::ModelSettings,
};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("reading {}: {source}", .path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Config file is not valid TOML for this schema.
    #[error("parsing {}: {source}", .path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// Values parsed but are unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ForecastConfig {
    /// Synthetic dataset settings.
    pub dataset: DatasetSection,
    /// Model and split settings.
    pub model: ModelSection,
    /// Chart output settings.
    pub report: ReportSection,
    /// Log and event sinks.
    pub telemetry: TelemetrySection,
}

/// `[dataset]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSection {
    /// RNG seed.
    pub seed: u64,
    /// Days to simulate.
    pub days: usize,
    /// First simulated day.
    pub start_date: NaiveDate,
    /// Where the CSV is written.
    pub csv_path: PathBuf,
}

impl Default for DatasetSection {
    fn default() -> Self {
        let defaults = SynthesisSettings::default();
        Self {
            seed: defaults.seed,
            days: defaults.days,
            start_date: default_start_date(),
            csv_path: PathBuf::from(DEFAULT_DATASET_FILE),
        }
    }
}

/// `[model]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Trees in the ensemble.
    pub n_estimators: usize,
    /// Shrinkage.
    pub learning_rate: f64,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// L2 leaf penalty.
    pub lambda: f64,
    /// Minimum hessian per child.
    pub min_child_weight: f64,
    /// Minimum split gain.
    pub gamma: f64,
    /// Held-out tail fraction.
    pub test_ratio: f64,
}

impl Default for ModelSection {
    fn default() -> Self {
        let boosting = BoostingParams::default();
        Self {
            n_estimators: boosting.n_estimators,
            learning_rate: boosting.learning_rate,
            max_depth: boosting.max_depth,
            lambda: boosting.lambda,
            min_child_weight: boosting.min_child_weight,
            gamma: boosting.gamma,
            test_ratio: ModelSettings::default().test_ratio,
        }
    }
}

/// `[report]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Directory receiving the SVG charts.
    pub output_dir: PathBuf,
    /// Chart width in pixels.
    pub width: u32,
    /// Chart height in pixels.
    pub height: u32,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("charts"),
            width: 1200,
            height: 700,
        }
    }
}

/// `[telemetry]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// JSON-lines run log.
    pub log_path: Option<PathBuf>,
    /// JSON-lines event log.
    pub event_log: Option<PathBuf>,
    /// Lowest level written to the run log.
    pub min_level: LogLevel,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            log_path: None,
            event_log: None,
            min_level: LogLevel::Info,
        }
    }
}

impl ForecastConfig {
    /// Loads a TOML file; relative paths inside it resolve against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.resolve_relative_to(&base);
        config.validate()?;
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |candidate: &mut PathBuf| {
            if candidate.is_relative() {
                *candidate = base.join(&*candidate);
            }
        };
        resolve(&mut self.dataset.csv_path);
        resolve(&mut self.report.output_dir);
        if let Some(log) = self.telemetry.log_path.as_mut() {
            resolve(log);
        }
        if let Some(events) = self.telemetry.event_log.as_mut() {
            resolve(events);
        }
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset.days < 2 {
            return Err(ConfigError::Invalid(format!(
                "dataset.days must be at least 2, got {}",
                self.dataset.days
            )));
        }
        let ratio = self.model.test_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "model.test_ratio must be in (0, 1), got {ratio}"
            )));
        }
        self.model_settings()
            .boosting
            .validate()
            .map_err(|err| ConfigError::Invalid(format!("model: {err}")))
    }

    /// Dataset synthesis parameters.
    #[must_use]
    pub fn synthesis_settings(&self) -> SynthesisSettings {
        SynthesisSettings {
            seed: self.dataset.seed,
            days: self.dataset.days,
            start_date: self.dataset.start_date,
        }
    }

    /// Training parameters.
    #[must_use]
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            boosting: BoostingParams {
                n_estimators: self.model.n_estimators,
                learning_rate: self.model.learning_rate,
                max_depth: self.model.max_depth,
                lambda: self.model.lambda,
                min_child_weight: self.model.min_child_weight,
                gamma: self.model.gamma,
            },
            test_ratio: self.model.test_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_reference_run() {
        let config = ForecastConfig::default();
        assert_eq!(config.synthesis_settings(), SynthesisSettings::default());
        assert_eq!(config.model_settings(), ModelSettings::default());
        assert_eq!(config.dataset.csv_path, PathBuf::from(DEFAULT_DATASET_FILE));
        config.validate().unwrap();
    }

    #[test]
    fn loads_partial_file_and_resolves_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("forecast.toml");
        fs::write(
            &path,
            r#"
[dataset]
seed = 7
days = 120
start_date = "2023-06-01"

[model]
n_estimators = 20

[telemetry]
log_path = "logs/run.jsonl"
min_level = "DEBUG"
"#,
        )
        .unwrap();
        let config = ForecastConfig::load(&path).unwrap();
        assert_eq!(config.dataset.seed, 7);
        assert_eq!(config.dataset.days, 120);
        assert_eq!(config.model.n_estimators, 20);
        assert!((config.model.learning_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.dataset.csv_path, dir.path().join(DEFAULT_DATASET_FILE));
        assert_eq!(
            config.telemetry.log_path,
            Some(dir.path().join("logs/run.jsonl"))
        );
        assert_eq!(config.telemetry.min_level, LogLevel::Debug);
    }

    #[test]
    fn rejects_unusable_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[model]\ntest_ratio = 1.5\n").unwrap();
        assert!(matches!(
            ForecastConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
        fs::write(&path, "[model\n").unwrap();
        assert!(matches!(ForecastConfig::load(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            ForecastConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
