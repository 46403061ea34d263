use clap::{Parser, Subcommand};
use invoice_export::config::{Config, DEFAULT_CONFIG_PATH};
use invoice_export::invoice::DATE_FORMAT;
use invoice_export::{ExportError, export, extract, layout};
use std::path::PathBuf;
use time::{Date, OffsetDateTime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "invoice-export")]
#[command(about = "Export outgoing invoices from a 1C 7.7 database to PDF")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export today's invoices
    Today,
    /// Export invoices of one day (DD.MM.YYYY)
    Date { date: String },
    /// Export invoices of a date range (DD.MM.YYYY DD.MM.YYYY)
    Range { start: String, end: String },
    /// Print the page plan as JSON without rendering
    Plan { start: String, end: Option<String> },
    /// Print the effective configuration
    Settings,
    /// Store the 1C database directory in the configuration file
    SetDatabase { path: String },
}

fn parse_date(text: &str) -> Result<Date, ExportError> {
    Date::parse(text.trim(), DATE_FORMAT)
        .map_err(|e| ExportError::Config(format!("invalid date {text:?}, expected DD.MM.YYYY: {e}")))
}

fn parse_range(start: &str, end: &str) -> Result<(Date, Date), ExportError> {
    let (start, end) = (parse_date(start)?, parse_date(end)?);
    if start > end {
        return Err(ExportError::Config(
            "start date is after end date".to_string(),
        ));
    }
    Ok((start, end))
}

fn run_export(cfg: &Config, start: Date, end: Date) -> Result<(), ExportError> {
    match export(cfg, start, end)? {
        Some(path) => println!("{}", path.display()),
        None => println!("No invoices found"),
    }
    Ok(())
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = args.config;
    let load = || Config::load(&config_path);

    match args.command {
        Command::Today => {
            let today = OffsetDateTime::now_local()
                .unwrap_or_else(|_| OffsetDateTime::now_utc())
                .date();
            run_export(&load()?, today, today)?;
        }
        Command::Date { date } => {
            let date = parse_date(&date)?;
            run_export(&load()?, date, date)?;
        }
        Command::Range { start, end } => {
            let (start, end) = parse_range(&start, &end)?;
            run_export(&load()?, start, end)?;
        }
        Command::Plan { start, end } => {
            let (start, end) = parse_range(&start, end.as_deref().unwrap_or(&start))?;
            let cfg = load()?;
            let invoices = extract(&cfg, start, end)?;
            let pages = layout(&invoices, &cfg);
            println!("{}", serde_json::to_string_pretty(&pages)?);
        }
        Command::Settings => {
            println!("{}", toml::to_string_pretty(&load()?)?);
        }
        Command::SetDatabase { path } => {
            Config::set_database_path(&config_path, &path)?;
            info!(config = %config_path.display(), database = %path, "Database path saved");
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // init tracing
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(args) {
        error!(error = %e, "Export failed");
        return Err(e);
    }
    Ok(())
}
