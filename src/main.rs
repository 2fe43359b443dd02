use std::{env, fs, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use stockcast::prelude::*;
use time::macros::format_description;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const APP_NAME: &str = "stockcast";
const OVERVIEW_ROWS: usize = 10;

/// Forecast a stock-price series with ARIMA, Prophet or LSTM.
#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about)]
struct Cli {
    /// CSV file with a date and a closing-price column. Defaults to the bundled dataset.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Forecasting model: arima, prophet or lstm.
    #[arg(long)]
    model: Option<ModelKind>,

    /// Number of future points to predict.
    #[arg(long)]
    horizon: Option<usize>,

    /// Number of historical points shown before the forecast.
    #[arg(long)]
    tail: Option<usize>,

    /// JSON pipeline configuration. Command-line flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed of the LSTM weight initialization and shuffling.
    #[arg(long)]
    seed: Option<u64>,

    /// Directory receiving the history, forecast and display tables.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Output format of the written tables: csv or json.
    #[arg(long, default_value = "csv")]
    format: FileExtension,

    /// Print a short description of the selected model.
    #[arg(long)]
    explain: bool,

    /// Log to stderr instead of a file under the user state directory.
    #[arg(long)]
    log_stderr: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = match init_tracing(cli.log_stderr) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            None
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Run failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = pipeline_config(&cli)?;
    let pipeline = Pipeline::new(cfg).context("Invalid pipeline configuration")?;

    let raw = RawTable::load(cli.input.as_deref()).map_err(|e| e.at(Stage::Load))?;
    let out = pipeline.run(&raw)?;

    print_overview(&out)?;

    let model = pipeline.config().model();
    if cli.explain {
        println!("\n{model}: {}", model.description());
    }

    println!("\n--- Forecast ({model}, {} steps) ---", out.forecast.len());
    println!("{}", out.forecast.to_frame()?);

    if let Some(dir) = &cli.out {
        write_outputs(&out, dir, cli.format).map_err(|e| e.at(Stage::Assemble))?;
        println!("\nWrote {} tables to {}", cli.format, dir.display());
    }

    Ok(())
}

fn pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(model) = cli.model {
        cfg = cfg.with_model(model);
    }
    if let Some(horizon) = cli.horizon {
        cfg = cfg.with_horizon(Horizon::new(horizon)?);
    }
    if let Some(tail) = cli.tail {
        cfg = cfg.with_display_tail(tail);
    }
    if let Some(seed) = cli.seed {
        let lstm = cfg.lstm().with_seed(Some(seed));
        cfg = cfg.with_lstm(lstm);
    }
    Ok(cfg)
}

fn print_overview(out: &PipelineRun) -> Result<()> {
    let s = &out.summary;
    println!("--- Data overview ---");
    println!(
        "columns: date = '{}', close = '{}'",
        s.date_column, s.close_column
    );
    println!(
        "rows: {} read, {} dropped, {} duplicates collapsed, {} used",
        s.input_rows,
        s.dropped_rows,
        s.duplicate_rows,
        s.output_rows()
    );
    if let (Some(first), Some(last)) = (out.history.first(), out.history.last()) {
        println!("range: {} .. {}", first.timestamp, last.timestamp);
    }
    println!("{}", out.history.to_frame()?.tail(Some(OVERVIEW_ROWS)));
    Ok(())
}

fn write_outputs(out: &PipelineRun, dir: &std::path::Path, format: FileExtension) -> PipelineResult<()> {
    let display = out.display_default();
    match format {
        FileExtension::Csv => {
            out.history.to_csv(dir, None, None)?;
            out.forecast.to_csv(dir, None, None)?;
            display.to_csv(dir, None, None)?;
        }
        FileExtension::Json => {
            out.history.to_json_file(dir)?;
            out.forecast.to_json_file(dir)?;
            display.to_json_file(dir)?;
        }
    }
    info!(dir = %dir.display(), %format, "Outputs written");
    Ok(())
}

// ================================================================================================
// Tracing Configuration
// ================================================================================================

fn init_tracing(log_stderr: bool) -> Result<Option<WorkerGuard>> {
    // Detect if running in container
    let in_container =
        env::var("CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_stderr || in_container {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_current_span(true)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        info!("Logging to stderr");
        return Ok(None);
    }

    let log_dir = match dirs::state_dir() {
        Some(dir) => dir.join(APP_NAME).join("logs"),
        None => dirs::home_dir()
            .context("Failed to find home directory")?
            .join(format!(".local/state/{APP_NAME}/logs")),
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let timestamp = time::OffsetDateTime::now_utc()
        .format(&format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .context("Failed to format timestamp")?;
    let file_name = format!("{APP_NAME}-{timestamp}.log");
    let file_path = log_dir.join(&file_name);

    let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
        .with_current_span(true)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    info!(log_file = %file_path.display(), "Logging to file");
    Ok(Some(guard))
}
