use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use class_scraper::PipelineConfig;
use class_scraper::history::DatasetChange;
use class_scraper::pipeline;
use log::LevelFilter;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "class-scraper")]
#[command(about = "Scrape the GoStudioPro class schedule into a versioned JSON file", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[arg(
        long,
        value_name = "PATH",
        default_value = "cookies.json",
        help = "Cookie file exported from a logged-in browser session"
    )]
    cookies: PathBuf,

    #[arg(
        short = 'o',
        long,
        value_name = "PATH",
        default_value = "class-data.json",
        help = "Versioned class data file to update"
    )]
    output: PathBuf,

    #[arg(long, help = "Run the browser without a window (manual login impossible)")]
    headless: bool,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Progress goes to stdout; the server hands it back as the refresh output.
    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .target(env_logger::Target::Stdout)
        .init();

    let config = PipelineConfig {
        cookies_path: cli.cookies,
        history_path: cli.output,
        headless: cli.headless,
        ..Default::default()
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping...");
            on_signal.cancel();
        }
    });

    log::info!("Starting class data extraction...");

    let summary = pipeline::run(&config, cancel).await.unwrap_or_else(|e| {
        log::error!("Error during extraction: {}", e);
        process::exit(1);
    });

    log::info!(
        "Extracted {} of {} class(es)",
        summary.extracted,
        summary.links_found
    );

    match summary.outcome.change {
        DatasetChange::Unchanged => log::info!("No changes detected, history left as is"),
        DatasetChange::Initial => log::info!("Initial data saved"),
        DatasetChange::CountChanged { from, to } => {
            log::info!("Class count changed from {} to {}", from, to)
        }
        DatasetChange::ContentChanged { classes } => {
            log::info!("Content changed in: {}", classes.join(", "))
        }
    }

    if summary.outcome.saved {
        log::info!(
            "Saved version {} to {}",
            summary.outcome.version,
            config.history_path.display()
        );
    }
}
