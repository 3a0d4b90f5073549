// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lingoclip::app_config::{self, Config, ExtractionStrategy};
use lingoclip::media::{FfmpegTool, MediaTool};
use lingoclip::providers::{DirectoryNarration, NarrationProvider, NoNarration};
use lingoclip::{Controller, LayoutKind, RunRequest, load_selections};

/// CLI Wrapper for LayoutKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLayout {
    Wide,
    Short,
    Batched,
}

impl From<CliLayout> for LayoutKind {
    fn from(cli_layout: CliLayout) -> Self {
        match cli_layout {
            CliLayout::Wide => LayoutKind::Wide,
            CliLayout::Short => LayoutKind::Short,
            CliLayout::Batched => LayoutKind::BatchedShort,
        }
    }
}

/// CLI Wrapper for ExtractionStrategy to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliStrategy {
    Copy,
    Encode,
    Auto,
}

impl From<CliStrategy> for ExtractionStrategy {
    fn from(cli_strategy: CliStrategy) -> Self {
        match cli_strategy {
            CliStrategy::Copy => ExtractionStrategy::Copy,
            CliStrategy::Encode => ExtractionStrategy::Encode,
            CliStrategy::Auto => ExtractionStrategy::Auto,
        }
    }
}

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

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble study clips for a list of selections
    Run(RunArgs),

    /// Print probed media metadata as JSON
    Probe {
        /// Media file to probe
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Configuration file path
        #[arg(short, long, default_value = "conf.json")]
        config_path: String,
    },

    /// Generate shell completions for lingoclip
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Source video file
    #[arg(short, long)]
    source: PathBuf,

    /// JSON file with the ordered list of selections
    #[arg(long)]
    selections: PathBuf,

    /// Output layout
    #[arg(short = 'L', long, value_enum, default_value = "wide")]
    layout: CliLayout,

    /// Directory receiving the published clips and manifest.json
    #[arg(short, long)]
    output: PathBuf,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Override the configured extraction strategy
    #[arg(long, value_enum)]
    strategy: Option<CliStrategy>,

    /// Directory with pre-rendered narration audio named by selection id
    #[arg(long)]
    narration: Option<PathBuf>,

    /// Override the worker cap
    #[arg(short, long)]
    workers: Option<usize>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Overwrite existing outputs
    #[arg(short, long)]
    force: bool,

    /// Hide the progress bar
    #[arg(long)]
    quiet: bool,
}

/// LingoClip - bilingual study clips from video
///
/// Cuts selected dialogue moments out of a video, burns in bilingual
/// subtitles, repeats the key expression and lays the result out next to an
/// explanatory slide.
#[derive(Parser, Debug)]
#[command(name = "lingoclip")]
#[command(version)]
#[command(about = "Assemble language-learning clips from video")]
#[command(long_about = "LingoClip turns selected dialogue moments into language-learning clips.

EXAMPLES:
    lingoclip run -s ep1.mkv --selections picks.json -o out/             # Wide clips
    lingoclip run -s ep1.mkv --selections picks.json -L batched -o out/  # Short-form batches
    lingoclip run -s ep1.mkv --selections picks.json -o out/ --strategy encode
    lingoclip probe ep1.mkv                                               # Print media metadata
    lingoclip completions bash > lingoclip.bash                           # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
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

    // @returns: Prefix and ANSI colour for a log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("ERROR", "1;31"),
            Level::Warn => ("WARN ", "1;33"),
            Level::Info => ("INFO ", "1;32"),
            Level::Debug => ("DEBUG", "1;36"),
            Level::Trace => ("TRACE", "1;35"),
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
            let (prefix, colour) = Self::style_for_level(record.level());
            let _ = writeln!(
                std::io::stderr(),
                "\x1B[{}m{} {} {}\x1B[0m",
                colour,
                now,
                prefix,
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
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

#[tokio::main]
async fn main() -> Result<()> {
    // Trace is the ceiling; the effective level is set once the config is loaded
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "lingoclip", &mut std::io::stdout());
            Ok(())
        }
        Commands::Probe { file, config_path } => {
            let config = load_or_create_config(&config_path)?;
            run_probe(&config, &file).await
        }
        Commands::Run(args) => run_assembly(args).await,
    }
}

/// Wait for Ctrl-C or SIGTERM and return the matching exit code
async fn shutdown_signal() -> i32 {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => tokio::select! {
                _ = tokio::signal::ctrl_c() => 130,
                _ = terminate.recv() => 143,
            },
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                130
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        130
    }
}

/// Load the configuration file, creating it with defaults when missing
fn load_or_create_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        return Config::from_file(config_path);
    }

    warn!("Config file not found at '{}', creating default config.", config_path);
    let config = Config::default();
    let config_json =
        serde_json::to_string_pretty(&config).context("Failed to serialize default config to JSON")?;
    std::fs::write(config_path, config_json)
        .with_context(|| format!("Failed to write default config to file: {}", config_path))?;
    Ok(config)
}

async fn run_probe(config: &Config, file: &Path) -> Result<()> {
    if !file.is_file() {
        return Err(anyhow!("Input file does not exist: {:?}", file));
    }
    let tool = FfmpegTool::new(&config.tool);
    let info = tool
        .probe(file)
        .await
        .with_context(|| format!("Failed to probe {:?}", file))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn run_assembly(options: RunArgs) -> Result<()> {
    let mut config = load_or_create_config(&options.config_path)?;

    // Override config with CLI options if provided
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
    if let Some(strategy) = &options.strategy {
        config.extraction.strategy = strategy.clone().into();
    }
    if let Some(workers) = options.workers {
        config.concurrency.max_workers = Some(workers);
    }

    config.validate().context("Configuration validation failed")?;
    log::set_max_level(level_filter(&config.log_level));

    let selections = load_selections(&options.selections)?;
    info!(
        "Loaded {} selection(s) from {:?}",
        selections.len(),
        options.selections
    );

    let narration: Arc<dyn NarrationProvider> = match &options.narration {
        Some(dir) if dir.is_dir() => Arc::new(DirectoryNarration::new(dir)),
        Some(dir) => return Err(anyhow!("Narration directory does not exist: {:?}", dir)),
        None => Arc::new(NoNarration),
    };
    let tool: Arc<dyn MediaTool> = Arc::new(FfmpegTool::new(&config.tool));
    let controller = Controller::with_parts(config, tool, narration)?.with_progress(!options.quiet);
    let janitor = controller.janitor();

    let request = RunRequest {
        source: options.source.clone(),
        selections,
        layout: options.layout.into(),
        output_dir: options.output.clone(),
        strategy: options.strategy.map(Into::into),
        force: options.force,
    };

    let mut run = Box::pin(controller.run(request));
    let manifest = tokio::select! {
        result = &mut run => result?,
        code = shutdown_signal() => {
            error!("Interrupted, stopping pipelines and removing intermediate files");
            // dropping the run aborts its tasks and kills their ffmpeg children
            drop(run);
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
            janitor.finish();
            std::process::exit(code);
        }
    };

    if manifest.skipped.is_empty() {
        info!(
            "Success: {} clip(s) in {:?}",
            manifest.entries.len(),
            options.output
        );
    } else {
        for skipped in &manifest.skipped {
            warn!("Skipped '{}' at {}: {}", skipped.id, skipped.stage, skipped.reason);
        }
        warn!(
            "{} of {} selection(s) skipped; see {:?}",
            manifest.skipped.len(),
            manifest.entries.len() + manifest.skipped.len(),
            options.output.join("manifest.json")
        );
    }

    Ok(())
}
