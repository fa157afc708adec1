//! Signal alerts - main entry point
//!
//! This binary provides three subcommands:
//! - scan: Evaluate the configured instruments once and print their signals
//! - watch: Run monitor cycles periodically and deliver alerts
//! - state: Inspect or reset persisted last-notified state

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "signal-alerts")]
#[command(about = "Indicator-driven BUY/SELL alerts with ATR trade levels", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate signals once without sending notifications
    Scan {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/alerts.json")]
        config: String,

        /// Symbols to scan (overrides config file)
        #[arg(short, long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Rule set: simple, filtered or confluence (overrides config file)
        #[arg(short, long)]
        ruleset: Option<String>,

        /// Bar interval, e.g. 1d or 1h (overrides config file)
        #[arg(short, long)]
        interval: Option<String>,

        /// Number of recent transitions to list per symbol
        #[arg(long, default_value = "5")]
        transitions: usize,
    },

    /// Run monitor cycles and deliver alerts until Ctrl+C
    Watch {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/alerts.json")]
        config: String,

        /// Seconds between cycles (overrides config file)
        #[arg(short, long)]
        poll: Option<u64>,

        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Inspect or reset persisted last-notified state
    State {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/alerts.json")]
        config: String,

        #[command(subcommand)]
        action: StateAction,
    },
}

#[derive(Subcommand, Debug)]
enum StateAction {
    /// Print stored state
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forget stored state so the next observation is a cold start
    Reset {
        /// Only reset this symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy HTTP crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Scan { .. } => "scan",
        Commands::Watch { .. } => "watch",
        Commands::State { .. } => "state",
    };

    setup_logging(cli.verbose, command_name)?;

    // Webhook URL and state database may come from .env
    dotenv::dotenv().ok();

    match cli.command {
        Commands::Scan {
            config,
            symbols,
            ruleset,
            interval,
            transitions,
        } => commands::scan::run(config, symbols, ruleset, interval, transitions),

        Commands::Watch { config, poll, once } => commands::watch::run(config, poll, once),

        Commands::State { config, action } => match action {
            StateAction::Show { json } => commands::state::show(config, json),
            StateAction::Reset { symbol } => commands::state::reset(config, symbol),
        },
    }
}
