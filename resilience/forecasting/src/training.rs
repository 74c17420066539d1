use chrono::NaiveDate;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::{
    boosting::{BoostingParams, GradientBoostedRegressor, TrainingError},
    features::FeatureTable,
};

/// Training configuration: ensemble parameters plus the held-out tail fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Boosting hyper-parameters.
    pub boosting: BoostingParams,
    /// Fraction of the most recent rows held out for evaluation.
    pub test_ratio: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            boosting: BoostingParams::default(),
            test_ratio: 0.1,
        }
    }
}

/// Evaluation summary of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Model family.
    pub model: String,
    /// Root-mean-squared error on the held-out tail.
    pub rmse: f64,
    /// Rows used for fitting.
    pub train_rows: usize,
    /// Rows held out.
    pub test_rows: usize,
    /// Trees in the ensemble.
    pub n_estimators: usize,
    /// Shrinkage used.
    pub learning_rate: f64,
    /// Last training day.
    pub train_end: NaiveDate,
    /// First held-out day.
    pub test_start: NaiveDate,
}

impl EvaluationReport {
    /// Renders a concise summary string.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "[forecast] model={} rmse={:.4} train={} test={} trees={} lr={}",
            self.model,
            self.rmse,
            self.train_rows,
            self.test_rows,
            self.n_estimators,
            self.learning_rate
        )
    }
}

/// A fitted regressor and how well it did on unseen days.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    /// Read-only fitted ensemble.
    pub model: GradientBoostedRegressor,
    /// Held-out evaluation.
    pub report: EvaluationReport,
}

/// Fails unless row dates strictly increase.
pub fn ensure_chronological(table: &FeatureTable) -> Result<(), TrainingError> {
    match table
        .rows()
        .windows(2)
        .position(|pair| pair[0].date() >= pair[1].date())
    {
        Some(idx) => Err(TrainingError::UnorderedSeries { row: idx + 1 }),
        None => Ok(()),
    }
}

/// Splits a time series into a leading train part and a trailing test part without shuffling.
///
/// The test side gets `ceil(len * test_ratio)` rows.
pub fn chronological_split(
    table: &FeatureTable,
    test_ratio: f64,
) -> Result<(FeatureTable, FeatureTable), TrainingError> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(TrainingError::InvalidParameter(format!(
            "test_ratio must be in (0, 1), got {test_ratio}"
        )));
    }
    ensure_chronological(table)?;
    let rows = table.len();
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let test_rows = (rows as f64 * test_ratio).ceil() as usize;
    let train_rows = rows.saturating_sub(test_rows);
    if train_rows == 0 || test_rows == 0 {
        return Err(TrainingError::DegenerateSplit {
            rows,
            ratio: test_ratio,
        });
    }
    Ok(table.split_at(train_rows))
}

/// Root-mean-squared error; `None` for empty or mismatched inputs.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn root_mean_squared_error(
    predictions: ArrayView1<'_, f64>,
    actual: ArrayView1<'_, f64>,
) -> Option<f64> {
    if predictions.is_empty() || predictions.len() != actual.len() {
        return None;
    }
    let mse = predictions
        .iter()
        .zip(actual.iter())
        .map(|(pred, target)| (pred - target).powi(2))
        .sum::<f64>()
        / predictions.len() as f64;
    Some(mse.sqrt())
}

/// Splits chronologically, fits on the head and scores the tail.
pub fn train_and_evaluate(
    table: &FeatureTable,
    settings: &ModelSettings,
) -> Result<TrainedModel, TrainingError> {
    let (train, test) = chronological_split(table, settings.test_ratio)?;
    let model = GradientBoostedRegressor::fit(
        train.design_matrix().view(),
        train.targets().view(),
        &settings.boosting,
    )?;
    let predictions = model.predict(test.design_matrix().view())?;
    let rmse = root_mean_squared_error(predictions.view(), test.targets().view()).ok_or(
        TrainingError::DegenerateSplit {
            rows: table.len(),
            ratio: settings.test_ratio,
        },
    )?;
    let (Some(train_last), Some(test_first)) = (train.last(), test.rows().first()) else {
        return Err(TrainingError::DegenerateSplit {
            rows: table.len(),
            ratio: settings.test_ratio,
        });
    };
    let report = EvaluationReport {
        model: "gradient_boosted_trees".into(),
        rmse,
        train_rows: train.len(),
        test_rows: test.len(),
        n_estimators: settings.boosting.n_estimators,
        learning_rate: settings.boosting.learning_rate,
        train_end: train_last.date(),
        test_start: test_first.date(),
    };
    Ok(TrainedModel { model, report })
}
