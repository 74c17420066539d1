use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::Parser;
use resilience_forecasting::{
    dataset::Record,
    pipeline::{ForecastPipeline, ForecastRun},
    telemetry::ForecastTelemetry,
    ForecastConfig,
};
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "forecast",
    version,
    about = "Synthesizes logistics history, trains a disruption-risk model and predicts the next day"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the dataset seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Overrides the number of simulated days.
    #[arg(long)]
    days: Option<usize>,
    /// Where the synthetic dataset CSV is written.
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Directory receiving the SVG charts.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// JSON-lines run log.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// JSON-lines event log.
    #[arg(long)]
    event_log: Option<PathBuf>,
    /// Supplies an observed feature up front, e.g. `--set weather_risk=0.4`.
    #[arg(long = "set", value_name = "FEATURE=VALUE")]
    assignments: Vec<String>,
    /// Prints the run summary as JSON instead of the text report.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn resolve_config(&self) -> Result<ForecastConfig> {
        let mut config = match &self.config {
            Some(path) => ForecastConfig::load(path)?,
            None => ForecastConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.dataset.seed = seed;
        }
        if let Some(days) = self.days {
            config.dataset.days = days;
        }
        if let Some(csv) = &self.csv {
            config.dataset.csv_path = csv.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.report.output_dir = dir.clone();
        }
        if let Some(log) = &self.log_file {
            config.telemetry.log_path = Some(log.clone());
        }
        if let Some(events) = &self.event_log {
            config.telemetry.event_log = Some(events.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn build_telemetry(config: &ForecastConfig) -> Result<ForecastTelemetry> {
    let mut builder = ForecastTelemetry::builder("forecast").min_level(config.telemetry.min_level);
    if let Some(path) = &config.telemetry.log_path {
        builder = builder.log_path(path);
    }
    if let Some(path) = &config.telemetry.event_log {
        builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
    }
    builder.build()
}

fn print_report(run: &ForecastRun) {
    println!(
        "\nPredicted Disruption Risk for next day: {:.3}",
        run.prediction.risk
    );
    println!("\nRecommendations:");
    for message in run.prediction.messages() {
        println!("- {message}");
    }
    println!(
        "\nCharts saved as '{}' and '{}'.",
        run.charts.forecast.display(),
        run.charts.heatmap.display()
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    let telemetry = build_telemetry(&config).context("initialising telemetry")?;
    let pipeline = ForecastPipeline::new(config, telemetry.clone());

    // JSON mode keeps stdout machine-readable; prompts and progress go to stderr.
    let mut console: Box<dyn Write> = if cli.json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let json_mode = cli.json;

    let announce_dataset = |path: &Path, _: &[Record]| -> Result<()> {
        let line = format!(
            "Synthetic logistics disruption dataset saved as '{}'.",
            path.display()
        );
        if json_mode {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
        Ok(())
    };
    let outcome = pipeline.run_observed(announce_dataset, |trained, mut builder| {
        writeln!(console, "Test RMSE: {:.3}", trained.report.rmse)?;
        for assignment in &cli.assignments {
            builder.provide_assignment(assignment)?;
        }
        if !builder.missing().is_empty() {
            writeln!(console, "\nEnter values for next-day prediction:")?;
            let stdin = io::stdin();
            builder.prompt_missing(&mut stdin.lock(), &mut console)?;
        }
        Ok(builder.finish()?)
    });

    let run = match outcome {
        Ok(run) => run,
        Err(err) => {
            telemetry.log(
                LogLevel::Error,
                "forecast.failed",
                serde_json::json!({ "error": format!("{err:#}") }),
            )?;
            return Err(err);
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_report(&run);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("forecast.toml");
        fs::write(
            &path,
            "[dataset]\nseed = 7\ndays = 120\ncsv_path = \"data/risk.csv\"\n\n[report]\noutput_dir = \"svg\"\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "forecast",
            "--config",
            path.to_str().unwrap(),
            "--days",
            "90",
            "--output-dir",
            "out",
            "--set",
            "weather_risk=0.4",
            "--set",
            "port_congestion=1",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.dataset.seed, 7);
        assert_eq!(config.dataset.days, 90);
        assert_eq!(config.dataset.csv_path, dir.path().join("data/risk.csv"));
        assert_eq!(config.report.output_dir, PathBuf::from("out"));
        assert_eq!(cli.assignments, vec!["weather_risk=0.4", "port_congestion=1"]);
    }

    #[test]
    fn defaults_apply_without_config() {
        let cli = Cli::try_parse_from(["forecast", "--seed", "3", "--json"]).unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.dataset.seed, 3);
        assert_eq!(config.dataset.days, 365);
        assert!(cli.json);
        assert!(config.telemetry.log_path.is_none());
    }

    #[test]
    fn overrides_are_validated() {
        let cli = Cli::try_parse_from(["forecast", "--days", "1"]).unwrap();
        assert!(cli.resolve_config().is_err());
    }
}
