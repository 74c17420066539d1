#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Logistics disruption forecasting: synthetic history, lag features, boosted trees and charts.

/// Synthetic daily logistics dataset and CSV persistence.
pub mod dataset;

/// Lag and rolling-window feature construction.
pub mod features;

/// Gradient-boosted regression trees.
pub mod boosting;

/// Chronological split, fitting and held-out scoring.
pub mod training;

/// Typed validation of user-supplied feature values.
pub mod schema;

/// Next-day prediction and rule-based recommendations.
pub mod predictor;

/// Forecast chart and correlation heatmap rendering.
pub mod report;

/// TOML pipeline configuration.
pub mod config;

/// Telemetry builder/hook for forecasting stages.
pub mod telemetry;

/// End-to-end stage orchestration.
pub mod pipeline;

pub use boosting::{BoostingParams, GradientBoostedRegressor, TrainingError};
pub use config::{ConfigError, ForecastConfig};
pub use dataset::{Record, SynthesisSettings};
pub use features::{Feature, FeatureTable};
pub use pipeline::{ForecastPipeline, ForecastRun, Prediction};
pub use predictor::{Recommendation, Sample, SampleBuilder};
pub use telemetry::ForecastTelemetry;
pub use training::{EvaluationReport, ModelSettings, TrainedModel};
