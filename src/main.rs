// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::app_config::Config;
use app_controller::Controller;
use watcher::DirectoryWatcher;

mod app_config;
mod app_controller;
mod database;
mod errors;
mod file_utils;
mod http_cache;
mod language_utils;
mod providers;
mod query_extractor;
mod subsync;
mod subtitle_processor;
mod watcher;

/// Seconds between library change polls
const POLL_INTERVAL_SECS: u64 = 30;

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions for subagent
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// SubAgent - automatic subtitle fetching and synchronization
///
/// Watches a movie library, resolves each video against the IMDb catalog,
/// downloads candidate subtitles from OpenSubtitles and keeps the one that
/// aligns best with the video's own audio and subtitle streams.
#[derive(Parser, Debug)]
#[command(name = "subagent")]
#[command(version = "1.0.0")]
#[command(about = "Automatic subtitle fetching and synchronization")]
#[command(long_about = "SubAgent scans a movie library and fetches synchronized subtitles for it.

EXAMPLES:
    subagent /movies en                     # Watch /movies, fetch English subtitles
    subagent /movies en fr de               # Fetch several languages
    subagent --once /movies en              # Single scan, then exit
    subagent --clean /movies                # Remove all generated subtitles
    subagent --log-level debug /movies en   # Verbose logging
    subagent completions bash               # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically. Languages given on the command line override
    the configured ones.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Library root to scan and watch
    #[arg(value_name = "SCAN_ROOT")]
    scan_root: Option<PathBuf>,

    /// Subtitle languages to fetch (ISO codes, e.g. 'en', 'fr')
    #[arg(value_name = "LANGUAGE")]
    languages: Vec<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Cache directory override
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Remove every generated subtitle under SCAN_ROOT and exit
    #[arg(long)]
    clean: bool,

    /// Run a single scan instead of watching the library
    #[arg(long)]
    once: bool,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let color = Self::color_for_level(record.level());
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {}\x1B[0m", color, now, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "subagent", &mut std::io::stdout());
        return Ok(());
    }

    let scan_root = cli
        .scan_root
        .clone()
        .ok_or_else(|| anyhow!("SCAN_ROOT is required"))?;
    if !scan_root.is_dir() {
        return Err(anyhow!("Scan root is not a directory: {:?}", scan_root));
    }

    if let Some(cmd_log_level) = &cli.log_level {
        let config_log_level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level_filter(&config_log_level));
    }

    let config = load_config(&cli)?;
    config.validate().context("Configuration validation failed")?;
    if cli.log_level.is_none() {
        log::set_max_level(level_filter(&config.log_level));
    }

    let controller = Controller::with_config(config.clone())?;

    if cli.clean {
        return controller.clean(&scan_root);
    }

    controller.try_scan(&scan_root).await?;
    if cli.once {
        return Ok(());
    }

    watch_library(&controller, &scan_root, &config).await
}

/// Load the config file, creating a default one when missing, and apply
/// command line overrides on top.
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let config_path = &cli.config_path;
    let mut config = if Path::new(config_path).exists() {
        let file = File::open(config_path)
            .context(format!("Failed to open config file: {}", config_path))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .context(format!("Failed to parse config file: {}", config_path))?
    } else {
        warn!(
            "Config file not found at '{}', creating default config.",
            config_path
        );
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize default config to JSON")?;
        std::fs::write(config_path, config_json)
            .context(format!("Failed to write default config to file: {}", config_path))?;
        config
    };

    if !cli.languages.is_empty() {
        config.languages = cli.languages.clone();
    }
    if let Some(cache) = &cli.cache {
        config.cache_dir = cache.clone();
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }
    Ok(config)
}

/// Watch the library forever, rescanning on changes and on a fixed
/// schedule.
async fn watch_library(controller: &Controller, root: &Path, config: &Config) -> Result<()> {
    let mut watcher = DirectoryWatcher::new(root);
    // Establish the baseline; the initial scan already ran.
    watcher.poll()?;

    let rescan_interval = Duration::from_secs(config.scan.interval_hours * 3600);
    let mut last_full_scan = Instant::now();
    info!(
        "Watching {:?}, full rescan every {} hours",
        root, config.scan.interval_hours
    );

    loop {
        tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
        let changed = watcher.poll()?;
        let scheduled = last_full_scan.elapsed() >= rescan_interval;
        if changed || scheduled {
            if scheduled {
                info!("Scheduled rescan of {:?}", root);
            }
            last_full_scan = Instant::now();
            if let Err(e) = controller.try_scan(root).await {
                log::error!("Scan failed: {}", e);
            }
        }
    }
}
