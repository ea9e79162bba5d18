pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use storepulse_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig};
use storepulse_core::PurchaseFilter;

use commands::{CommandResult, EXIT_CONFIG};

#[derive(Debug, Parser)]
#[command(
    name = "storepulse",
    about = "Storepulse purchase analytics and recommendation CLI",
    long_about = "Train the purchase-based recommender, produce product recommendations, and inspect sales analytics and customer segments.",
    after_help = "Examples:\n  storepulse train\n  storepulse recommend --customer 42 --count 5\n  storepulse summary --from 2024-01-01 --to 2024-03-31 --category Books\n  storepulse doctor --json"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    #[arg(long, global = true, help = "Path to a storepulse.toml config file")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Purchase corpus CSV, overriding data.corpus_path")]
    pub data: Option<PathBuf>,
    #[arg(long, global = true, help = "Directory for model.json and best_params.json")]
    pub artifact_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Log level written to stderr (trace|debug|info|warn|error)")]
    pub log_level: Option<String>,
    #[arg(long, global = true, help = "Evaluate grid candidates on a single thread")]
    pub sequential: bool,
    #[arg(long, global = true, help = "Seed for data splits and factor initialisation")]
    pub seed: Option<u64>,
}

impl GlobalArgs {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                corpus_path: self.data.clone(),
                artifact_dir: self.artifact_dir.clone(),
                log_level: self.log_level.clone(),
                parallel: self.sequential.then_some(false),
                seed: self.seed,
            },
        }
    }
}

/// Date-range and category filter shared by the analytics commands.
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    #[arg(long, value_name = "YYYY-MM-DD", help = "Only purchases on or after this date")]
    pub from: Option<NaiveDate>,
    #[arg(long, value_name = "YYYY-MM-DD", help = "Only purchases on or before this date")]
    pub to: Option<NaiveDate>,
    #[arg(long, help = "Only purchases in this category")]
    pub category: Option<String>,
}

impl FilterArgs {
    pub fn purchase_filter(&self) -> PurchaseFilter {
        PurchaseFilter { start: self.from, end: self.to, category: self.category.clone() }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Train the recommender, or load stored artifacts when they are current")]
    Train {
        #[arg(long, help = "Discard stored artifacts and run the grid search again")]
        retrain: bool,
    },
    #[command(about = "Recommend products a customer has not bought yet")]
    Recommend {
        #[arg(long, help = "Customer id to recommend for")]
        customer: i64,
        #[arg(long, help = "Number of recommendations (defaults to recommend.default_count)")]
        count: Option<usize>,
    },
    #[command(about = "Headline sales metrics with category and subcategory narratives")]
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
    },
    #[command(about = "Products ranked by total revenue")]
    Popularity {
        #[arg(long, help = "Show only the top N products")]
        limit: Option<usize>,
    },
    #[command(about = "Revenue per unit by product, optionally within one category")]
    Profitability {
        #[command(flatten)]
        filter: FilterArgs,
    },
    #[command(about = "Spending summary for a single customer")]
    Customer {
        #[arg(long, help = "Customer id to summarise")]
        customer: i64,
        #[command(flatten)]
        filter: FilterArgs,
    },
    #[command(about = "Cluster customers into behavioural segments")]
    Segments,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, corpus readability, and model artifact state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    let result = match cli.command {
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::Train { retrain } => {
            with_config(options, |config| commands::train::run(config, retrain))
        }
        Command::Recommend { customer, count } => {
            with_config(options, |config| commands::recommend::run(config, customer, count))
        }
        Command::Summary { filter } => with_config(options, |config| {
            commands::summary::run(config, &filter.purchase_filter())
        }),
        Command::Popularity { limit } => {
            with_config(options, |config| commands::popularity::run(config, limit))
        }
        Command::Profitability { filter } => with_config(options, |config| {
            commands::profitability::run(config, &filter.purchase_filter())
        }),
        Command::Customer { customer, filter } => with_config(options, |config| {
            commands::customer::run(config, customer, &filter.purchase_filter())
        }),
        Command::Segments => with_config(options, commands::segments::run),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Loads configuration and starts logging before running a data command.
fn with_config(
    options: LoadOptions,
    command: impl FnOnce(&AppConfig) -> CommandResult,
) -> CommandResult {
    match AppConfig::load(options) {
        Ok(config) => {
            if let Err(error) = init_logging(&config.logging) {
                eprintln!("storepulse: {error}");
            }
            command(&config)
        }
        Err(error) => CommandResult::failure(
            "startup",
            "config_validation",
            format!("config validation failed: {error}"),
            EXIT_CONFIG,
        ),
    }
}

/// Structured logs go to stderr so stdout carries only the command payload.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing::Level;

    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow!("could not initialise logging: {error}"))
}
