//! beamscore CLI application
//!
//! Scores target sentences, or decodes source sentences, with an ensemble
//! of sequence-to-sequence models under beam search.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing::{error, warn};

use beamscore_cli::config::{CliConfig, ConfigBuilder, EXAMPLE_CONFIG};
use beamscore_cli::exit::{exit_code_for, EXIT_SUCCESS};
use beamscore_cli::score::{run_score, ScoreArgs};

/// beamscore - ensemble beam-search scoring for sequence-to-sequence models
#[derive(Parser)]
#[command(name = "beamscore")]
#[command(about = "Ensemble beam-search scoring for sequence-to-sequence models")]
#[command(long_about = r#"
beamscore loads one or more sequence-to-sequence models and a dataset, then
scores every source/target pair (forced decoding) or decodes every source
sentence with an ensemble beam search.

Examples:
  # Score the validation split with one model
  beamscore score --dataset data/ --models model.json

  # Ensemble of two models with explicit weights, results as .npy
  beamscore score --dataset data/ --models a.json b.json --weights 0.7 0.3 \
      --save-mode numpy --dest scores.npy

  # Decode new sentences with the dataset's vocabularies
  beamscore score --dataset data/ --models model.json --source new.txt

  # Print a commented configuration file
  beamscore config example > beamscore.toml
"#)]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ./beamscore.toml when present)
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Debug logging, including search statistics
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Worker threads for parallel batches
    #[arg(long, value_name = "N", global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score targets or decode sources
    Score(ScoreArgs),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print a commented example configuration
    Example,
}

impl Cli {
    fn log_level_override(&self) -> Option<String> {
        if self.quiet {
            Some("error".to_string())
        } else if self.verbose {
            Some("debug".to_string())
        } else {
            self.log_level.clone()
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("Command failed: {}", e);
            let mut source = e.source();
            while let Some(err) = source {
                error!("  Caused by: {}", err);
                source = err.source();
            }
            if !tracing::dispatcher::has_been_set() {
                eprintln!("{} {e:#}", style("error:").red().bold());
            }
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let config = load_configuration(cli)?;
    setup_logging(&config);
    configure_threads(&config);

    match &cli.command {
        Commands::Score(args) => {
            let summary = run_score(args, &config)?;
            if !cli.quiet {
                let mark = if summary.failures == 0 { style("✓").green() } else { style("!").yellow() };
                eprintln!(
                    "{mark} {} example(s) in {} split(s), {} failed",
                    summary.examples, summary.splits, summary.failures
                );
            }
            Ok(summary.exit_code())
        }
        Commands::Config { action } => {
            handle_config_command(action, &config)?;
            Ok(EXIT_SUCCESS)
        }
    }
}

/// Load configuration from file and merge with CLI arguments
fn load_configuration(cli: &Cli) -> Result<CliConfig> {
    let builder = match CliConfig::config_path(cli.config.as_deref()) {
        Some(path) => ConfigBuilder::from_file(&path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?,
        None => ConfigBuilder::new(),
    };
    let builder = match &cli.command {
        Commands::Score(args) => builder
            .beam_size(args.beam_size)
            .max_batch_size(args.batch_size)
            .save_mode(args.save_mode.clone())
            .dest(args.dest.clone()),
        Commands::Config { .. } => builder,
    };
    let config = builder
        .log_level(cli.log_level_override())
        .threads(cli.threads)
        .build()
        .context("Failed to build configuration")?;
    Ok(config)
}

/// Setup logging based on configuration; `RUST_LOG` takes precedence.
fn setup_logging(config: &CliConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match config.logging.format.as_str() {
        "json" => {
            subscriber.json().with_timer(tracing_subscriber::fmt::time::uptime()).init();
        }
        "compact" => {
            subscriber.compact().init();
        }
        _ => {
            subscriber.pretty().init();
        }
    }
}

fn configure_threads(config: &CliConfig) {
    if !config.prediction.parallel_batches {
        return;
    }
    let threads = config.performance.effective_threads();
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        warn!("Could not size the worker pool to {threads} threads: {e}");
    }
}

fn handle_config_command(action: &ConfigAction, config: &CliConfig) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config_str =
                toml::to_string_pretty(config).context("Failed to serialize configuration")?;
            println!("{config_str}");
        }
        ConfigAction::Example => print!("{EXAMPLE_CONFIG}"),
    }
    Ok(())
}
