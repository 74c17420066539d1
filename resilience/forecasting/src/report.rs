use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use chrono::{Days, NaiveDate};
use ndarray::Array2;
use plotters::{
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    dataset::Record,
    features::{Feature, FeatureTable, TARGET},
};

/// File name of the forecast line chart.
pub const FORECAST_CHART_FILE: &str = "disruption_forecast.svg";
/// File name of the correlation heatmap.
pub const HEATMAP_FILE: &str = "feature_correlation_heatmap.svg";

const FONT: &str = "sans-serif";

// YlGnBu anchor colours, low to high.
const PALETTE: [(f64, (u8, u8, u8)); 5] = [
    (0.0, (255, 255, 217)),
    (0.25, (199, 233, 180)),
    (0.5, (65, 182, 196)),
    (0.75, (34, 94, 168)),
    (1.0, (8, 29, 88)),
];

/// Errors raised while rendering charts.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Nothing to plot.
    #[error("cannot chart an empty series")]
    EmptySeries,
    /// Drawing backend failure.
    #[error("render error: {0}")]
    Render(String),
    /// I/O error (filesystem).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_err(err: impl Display) -> ReportError {
    ReportError::Render(err.to_string())
}

/// Pearson correlations between every feature and the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    /// Column labels, features first then the target.
    pub labels: Vec<String>,
    /// Square matrix; NaN where a column is constant.
    pub values: Array2<f64>,
}

impl CorrelationMatrix {
    /// Correlations over [`Feature::ALL`] plus the target column.
    #[must_use]
    pub fn from_table(table: &FeatureTable) -> Self {
        let mut labels: Vec<String> = Feature::ALL.iter().map(|f| f.name().to_owned()).collect();
        labels.push(TARGET.to_owned());
        let mut columns: Vec<Vec<f64>> = Feature::ALL.iter().map(|f| table.column(*f)).collect();
        columns.push(table.targets().to_vec());
        Self {
            labels,
            values: correlate(&columns),
        }
    }

    /// Correlation between two labelled columns.
    #[must_use]
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.labels.iter().position(|l| l == a)?;
        let j = self.labels.iter().position(|l| l == b)?;
        Some(self.values[[i, j]])
    }
}

/// Pairwise Pearson correlation of equally long columns.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn correlate(columns: &[Vec<f64>]) -> Array2<f64> {
    let k = columns.len();
    let stats: Vec<(f64, f64)> = columns
        .iter()
        .map(|col| {
            let n = col.len() as f64;
            let mean = col.iter().sum::<f64>() / n;
            let ss = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            (mean, ss.sqrt())
        })
        .collect();
    Array2::from_shape_fn((k, k), |(i, j)| {
        let (mi, si) = stats[i];
        let (mj, sj) = stats[j];
        if si == 0.0 || sj == 0.0 || !si.is_finite() || !sj.is_finite() {
            return f64::NAN;
        }
        let cross = columns[i]
            .iter()
            .zip(&columns[j])
            .map(|(a, b)| (a - mi) * (b - mj))
            .sum::<f64>();
        (cross / (si * sj)).clamp(-1.0, 1.0)
    })
}

fn palette(value: f64) -> RGBColor {
    if !value.is_finite() {
        return RGBColor(200, 200, 200);
    }
    let t = ((value + 1.0) / 2.0).clamp(0.0, 1.0);
    for pair in PALETTE.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let w = (t - t0) / (t1 - t0);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * w).round() as u8;
            return RGBColor(mix(c0.0, c1.0), mix(c0.1, c1.1), mix(c0.2, c1.2));
        }
    }
    let (_, last) = PALETTE[PALETTE.len() - 1];
    RGBColor(last.0, last.1, last.2)
}

/// Where the charts of a run were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPaths {
    /// Forecast line chart.
    pub forecast: PathBuf,
    /// Correlation heatmap.
    pub heatmap: PathBuf,
}

/// Renders the run charts as SVG files into one directory.
#[derive(Debug, Clone)]
pub struct ChartRenderer {
    output_dir: PathBuf,
    size: (u32, u32),
}

impl ChartRenderer {
    /// Creates a renderer writing `width x height` charts into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, width: u32, height: u32) -> Self {
        Self {
            output_dir: output_dir.into(),
            size: (width.max(200), height.max(200)),
        }
    }

    /// Draws both charts.
    pub fn render(
        &self,
        records: &[Record],
        table: &FeatureTable,
        prediction: f64,
    ) -> Result<ChartPaths, ReportError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let forecast = self.output_dir.join(FORECAST_CHART_FILE);
        let heatmap = self.output_dir.join(HEATMAP_FILE);
        render_forecast_chart(&forecast, self.size, records, prediction)?;
        render_correlation_heatmap(&heatmap, self.size, &CorrelationMatrix::from_table(table))?;
        Ok(ChartPaths { forecast, heatmap })
    }
}

/// Historical risk line with the next-day prediction one day past the last date.
#[allow(clippy::cast_possible_wrap)]
pub fn render_forecast_chart(
    path: &Path,
    size: (u32, u32),
    records: &[Record],
    prediction: f64,
) -> Result<(), ReportError> {
    let start: NaiveDate = records.first().ok_or(ReportError::EmptySeries)?.date;
    let days = records.len() as i64;
    let observed_max = records
        .iter()
        .map(|r| r.disruption_risk)
        .fold(prediction, f64::max);
    let observed_min = records
        .iter()
        .map(|r| r.disruption_risk)
        .fold(prediction, f64::min);
    let y_range = observed_min.min(0.0)..(observed_max.max(1.0) + 0.02);

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Logistics Disruption Risk Forecast & User Prediction",
            (FONT, 22),
        )
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(0i64..days + 1, y_range)
        .map_err(render_err)?;

    let date_label = |offset: &i64| {
        u64::try_from(*offset)
            .ok()
            .and_then(|d| start.checked_add_days(Days::new(d)))
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    };
    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("Disruption Risk")
        .x_labels(8)
        .x_label_formatter(&date_label)
        .y_label_formatter(&|v: &f64| format!("{v:.2}"))
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(LineSeries::new(
            records
                .iter()
                .enumerate()
                .map(|(idx, r)| (idx as i64, r.disruption_risk)),
            BLUE.stroke_width(2),
        ))
        .map_err(render_err)?
        .label("Actual Disruption Risk")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));

    chart
        .draw_series(std::iter::once(Circle::new(
            (days, prediction),
            5,
            RED.filled(),
        )))
        .map_err(render_err)?
        .label("Prediction")
        .legend(|(x, y)| Circle::new((x + 10, y), 4, RED.filled()));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()
        .map_err(render_err)?;
    root.present().map_err(render_err)?;
    Ok(())
}

/// Annotated correlation heatmap.
pub fn render_correlation_heatmap(
    path: &Path,
    size: (u32, u32),
    matrix: &CorrelationMatrix,
) -> Result<(), ReportError> {
    let k = matrix.labels.len();
    if k == 0 {
        return Err(ReportError::EmptySeries);
    }
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;
    let body = root
        .titled("Feature Correlation Heatmap", (FONT, 22))
        .map_err(render_err)?;

    let (width, height) = body.dim_in_pixel();
    let (width, height) = (i32::try_from(width).unwrap_or(i32::MAX), i32::try_from(height).unwrap_or(i32::MAX));
    let left = 170;
    let bottom = 150;
    let cells = i32::try_from(k).unwrap_or(1);
    let cell_w = ((width - left - 20) / cells).max(1);
    let cell_h = ((height - bottom - 10) / cells).max(1);

    let centered = Pos::new(HPos::Center, VPos::Center);
    let value_font = (FONT, 11).into_font();
    let label_font = (FONT, 12).into_font();

    for (i, row_label) in matrix.labels.iter().enumerate() {
        let row = i32::try_from(i).unwrap_or(0);
        let y0 = row * cell_h;
        body.draw(&Text::new(
            row_label.clone(),
            (left - 6, y0 + cell_h / 2),
            label_font.clone().color(&BLACK).pos(Pos::new(HPos::Right, VPos::Center)),
        ))
        .map_err(render_err)?;
        for j in 0..k {
            let col = i32::try_from(j).unwrap_or(0);
            let x0 = left + col * cell_w;
            let value = matrix.values[[i, j]];
            body.draw(&Rectangle::new(
                [(x0, y0), (x0 + cell_w, y0 + cell_h)],
                palette(value).filled(),
            ))
            .map_err(render_err)?;
            let ink = if value.is_finite() && value > 0.2 { WHITE } else { BLACK };
            let text = if value.is_finite() {
                format!("{value:.2}")
            } else {
                "nan".to_owned()
            };
            body.draw(&Text::new(
                text,
                (x0 + cell_w / 2, y0 + cell_h / 2),
                value_font.clone().color(&ink).pos(centered),
            ))
            .map_err(render_err)?;
        }
    }

    let axis_y = cells * cell_h + 6;
    for (j, col_label) in matrix.labels.iter().enumerate() {
        let col = i32::try_from(j).unwrap_or(0);
        body.draw(&Text::new(
            col_label.clone(),
            (left + col * cell_w + cell_w / 2, axis_y),
            label_font
                .clone()
                .transform(FontTransform::Rotate90)
                .color(&BLACK)
                .pos(Pos::new(HPos::Left, VPos::Center)),
        ))
        .map_err(render_err)?;
    }
    root.present().map_err(render_err)?;
    Ok(())
}
