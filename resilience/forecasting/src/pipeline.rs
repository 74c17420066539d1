use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::ForecastConfig,
    dataset::{synthesize, write_csv, Record},
    features::{Feature, FeatureTable},
    predictor::{predict_next, recommend, Recommendation, Sample, SampleBuilder},
    report::{ChartPaths, ChartRenderer},
    telemetry::ForecastTelemetry,
    training::{train_and_evaluate, EvaluationReport, TrainedModel},
};

/// Next-day prediction with its advice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted disruption risk; not clamped.
    pub risk: f64,
    /// Advice in display order.
    pub recommendations: Vec<Recommendation>,
}

impl Prediction {
    /// Recommendation texts in display order.
    #[must_use]
    pub fn messages(&self) -> Vec<&'static str> {
        self.recommendations.iter().map(|r| r.message()).collect()
    }
}

/// Summary of one end-to-end run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRun {
    /// CSV the dataset was written to.
    pub dataset_path: PathBuf,
    /// Simulated days.
    pub rows: usize,
    /// Held-out evaluation.
    pub evaluation: EvaluationReport,
    /// Feature vector the prediction was made for.
    pub sample: Sample,
    /// Prediction and advice.
    pub prediction: Prediction,
    /// Rendered charts.
    pub charts: ChartPaths,
}

/// Runs the dataset, feature, training, prediction and chart stages.
#[derive(Debug, Clone)]
pub struct ForecastPipeline {
    config: ForecastConfig,
    telemetry: ForecastTelemetry,
}

impl ForecastPipeline {
    /// Creates a pipeline; the config is expected to be validated.
    #[must_use]
    pub const fn new(config: ForecastConfig, telemetry: ForecastTelemetry) -> Self {
        Self { config, telemetry }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Simulates the dataset and writes it to the configured CSV path.
    pub fn generate_dataset(&self) -> Result<Vec<Record>> {
        let settings = self.config.synthesis_settings();
        let records = synthesize(&settings).context("synthesizing dataset")?;
        let path = &self.config.dataset.csv_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        write_csv(path, &records).with_context(|| format!("writing {}", path.display()))?;
        self.telemetry.stage(
            "forecast.dataset_written",
            json!({
                "path": path.display().to_string(),
                "rows": records.len(),
                "seed": settings.seed,
            }),
        )?;
        Ok(records)
    }

    /// Adds lag and rolling columns.
    pub fn build_features(&self, records: &[Record]) -> Result<FeatureTable> {
        let table = FeatureTable::build(records);
        self.telemetry.stage(
            "forecast.features_built",
            json!({ "rows": table.len(), "columns": Feature::ALL.len() }),
        )?;
        Ok(table)
    }

    /// Fits on the leading rows and scores the held-out tail.
    pub fn train(&self, table: &FeatureTable) -> Result<TrainedModel> {
        let settings = self.config.model_settings();
        let trained = train_and_evaluate(table, &settings).context("training model")?;
        self.telemetry.log(
            LogLevel::Debug,
            "forecast.split",
            json!({
                "train": trained.report.train_rows,
                "test": trained.report.test_rows,
                "train_end": trained.report.train_end,
                "test_start": trained.report.test_start,
            }),
        )?;
        self.telemetry.stage(
            "forecast.model_trained",
            serde_json::to_value(&trained.report)?,
        )?;
        Ok(trained)
    }

    /// Starts an input sample carrying lag features from the table's last row.
    pub fn sample_builder(&self, table: &FeatureTable) -> Result<SampleBuilder> {
        Ok(SampleBuilder::new(table)?)
    }

    /// Predicts next-day risk and derives recommendations.
    pub fn predict(&self, trained: &TrainedModel, sample: &Sample) -> Result<Prediction> {
        let risk = predict_next(&trained.model, sample).context("predicting next day")?;
        let prediction = Prediction {
            risk,
            recommendations: recommend(risk, sample),
        };
        self.telemetry.stage(
            "forecast.prediction",
            json!({
                "risk": risk,
                "recommendations": prediction.recommendations,
            }),
        )?;
        Ok(prediction)
    }

    /// Writes the forecast chart and the correlation heatmap.
    pub fn render(
        &self,
        records: &[Record],
        table: &FeatureTable,
        prediction: &Prediction,
    ) -> Result<ChartPaths> {
        let report = &self.config.report;
        let charts = ChartRenderer::new(&report.output_dir, report.width, report.height)
            .render(records, table, prediction.risk)
            .context("rendering charts")?;
        self.telemetry.stage(
            "forecast.charts_rendered",
            json!({
                "forecast": charts.forecast.display().to_string(),
                "heatmap": charts.heatmap.display().to_string(),
            }),
        )?;
        Ok(charts)
    }

    /// Runs every stage; `fill` completes the sample once the model is trained.
    pub fn run_with<F>(&self, fill: F) -> Result<ForecastRun>
    where
        F: FnOnce(&TrainedModel, SampleBuilder) -> Result<Sample>,
    {
        self.run_observed(|_, _| Ok(()), fill)
    }

    /// Like [`Self::run_with`], calling `on_dataset` as soon as the CSV is on disk.
    pub fn run_observed<D, F>(&self, on_dataset: D, fill: F) -> Result<ForecastRun>
    where
        D: FnOnce(&Path, &[Record]) -> Result<()>,
        F: FnOnce(&TrainedModel, SampleBuilder) -> Result<Sample>,
    {
        let records = self.generate_dataset()?;
        on_dataset(&self.config.dataset.csv_path, &records)?;
        let table = self.build_features(&records)?;
        let trained = self.train(&table)?;
        let sample = fill(&trained, self.sample_builder(&table)?)?;
        let prediction = self.predict(&trained, &sample)?;
        let charts = self.render(&records, &table, &prediction)?;
        Ok(ForecastRun {
            dataset_path: self.config.dataset.csv_path.clone(),
            rows: records.len(),
            evaluation: trained.report,
            sample,
            prediction,
            charts,
        })
    }
}
