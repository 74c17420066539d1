use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use resilience_advisor::{
    advise,
    client::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS},
    scoring::parse_indicator,
    AdvisorError, GeminiClient, GeminiSettings, Indicators,
};
use serde_json::json;
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tokio::runtime::Builder;

#[derive(Parser, Debug)]
#[command(
    name = "advisor",
    version,
    about = "Supply Chain Resilience AI (terminal version)"
)]
struct Cli {
    /// Inventory value.
    #[arg(long)]
    inventory: Option<f64>,
    /// Lead time in days.
    #[arg(long = "lead_time", alias = "lead-time")]
    lead_time: Option<f64>,
    /// Supplier score (0-1).
    #[arg(long = "supplier_score", alias = "supplier-score")]
    supplier_score: Option<f64>,
    /// Weather index (0-1).
    #[arg(long = "weather_index", alias = "weather-index")]
    weather_index: Option<f64>,
    /// Hosted model name.
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
    /// API base URL.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
    /// Request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
    /// API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// JSON-lines run log.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn ask<R, W>(input: &mut R, output: &mut W, label: &str, name: &str) -> Result<f64, AdvisorError>
where
    R: BufRead,
    W: Write,
{
    let console = |err: io::Error| AdvisorError::InvalidInput(err.to_string());
    write!(output, "{label}: ").map_err(console)?;
    output.flush().map_err(console)?;
    let mut line = String::new();
    if input.read_line(&mut line).map_err(console)? == 0 {
        return Err(AdvisorError::InvalidInput(format!(
            "input ended before {name} was entered"
        )));
    }
    parse_indicator(name, &line)
}

impl Cli {
    /// Indicators from flags, prompting on `output` for any that were omitted.
    fn indicators<R, W>(&self, input: &mut R, output: &mut W) -> Result<Indicators, AdvisorError>
    where
        R: BufRead,
        W: Write,
    {
        let mut value = |given: Option<f64>, label: &str, name: &str| match given {
            Some(value) => Ok(value),
            None => ask(&mut *input, &mut *output, label, name),
        };
        let inventory = value(self.inventory, "Enter Inventory", "inventory")?;
        let lead_time = value(self.lead_time, "Enter Lead Time (days)", "lead_time")?;
        let supplier_score = value(
            self.supplier_score,
            "Enter Supplier Score (0-1)",
            "supplier_score",
        )?;
        let weather_index = value(
            self.weather_index,
            "Enter Weather Index (0-1)",
            "weather_index",
        )?;
        Indicators::new(inventory, lead_time, supplier_score, weather_index)
    }

    fn settings(&self) -> GeminiSettings {
        GeminiSettings {
            api_key: self.api_key.clone().unwrap_or_default(),
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

/// Builds the client before asking for anything, so bad settings fail without prompting.
fn prepare<R, W>(
    cli: &Cli,
    input: &mut R,
    output: &mut W,
) -> Result<(GeminiClient, Indicators), AdvisorError>
where
    R: BufRead,
    W: Write,
{
    let client = GeminiClient::new(cli.settings())?;
    let indicators = cli.indicators(input, output)?;
    Ok((client, indicators))
}

fn run(cli: &Cli, logger: Option<&JsonLogger>) -> Result<(), AdvisorError> {
    let (client, indicators) = prepare(cli, &mut io::stdin().lock(), &mut io::stdout())?;
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AdvisorError::Configuration(format!("starting runtime: {err}")))?;
    let report = runtime.block_on(advise(&client, indicators))?;
    if let Some(logger) = logger {
        let record = LogRecord::new("advisor", LogLevel::Info, "advisor.report").with_metadata(json!({
            "model": client.settings().model,
            "predicted_sales": report.assessment.predicted_sales,
            "risk_score": report.assessment.risk_score,
            "risk_level": report.assessment.risk_level,
            "generated": report.advice.is_ok(),
        }));
        if let Err(err) = logger.log(&record) {
            eprintln!("warning: could not write run log: {err:#}");
        }
    }
    print!("{}", report.render());
    Ok(())
}

fn log_failure(logger: &JsonLogger, err: &AdvisorError) {
    let record = LogRecord::new("advisor", LogLevel::Error, "advisor.failed")
        .with_metadata(json!({ "kind": err.kind(), "error": err.to_string() }));
    if let Err(log_err) = logger.log(&record) {
        eprintln!("warning: could not write run log: {log_err:#}");
    }
}

fn main() {
    let cli = Cli::parse();
    let logger = match cli.log_file.as_ref().map(JsonLogger::new).transpose() {
        Ok(logger) => logger,
        Err(err) => {
            let err = AdvisorError::Configuration(format!("{err:#}"));
            eprintln!("Error: {err}");
            std::process::exit(err.exit_code());
        }
    };
    if let Err(err) = run(&cli, logger.as_ref()) {
        if let Some(logger) = &logger {
            log_failure(logger, &err);
        }
        eprintln!("Error: {err}");
        std::process::exit(err.exit_code());
    }
}
