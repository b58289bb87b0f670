use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CliConfig;
use crate::exit::{EXIT_DECODING, EXIT_SUCCESS};
use beamscore_common::{EnsembleWeights, ScoreError, Vocabulary};
use beamscore_data::{
    build_tokenizer, load_unk_mapping, save_results, split_destination, Dataset, ResultRecord,
    SaveMode,
};
use beamscore_inference::{
    BeamSearchEngine, ExampleOutput, InferencePort, ScoringDriver, SearchMetrics,
    UnknownResolver,
};
use beamscore_models::ModelLoader;

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    /// Dataset directory with vocabularies and `<split>.src` / `<split>.trg` files
    #[arg(long, value_name = "DIR")]
    pub dataset: PathBuf,

    /// Model files; more than one scores with an ensemble
    #[arg(long, required = true, num_args = 1.., value_name = "PATH")]
    pub models: Vec<PathBuf>,

    /// Replace the text of every split with this source file
    #[arg(long, value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// Targets for `--source`; without it the sources are decoded
    #[arg(long, value_name = "FILE")]
    pub target: Option<PathBuf>,

    /// Splits to score, in order
    #[arg(long, num_args = 1.., default_value = "val", value_name = "SPLIT")]
    pub splits: Vec<String>,

    /// Where to write results (stdout if omitted)
    #[arg(long, value_name = "FILE")]
    pub dest: Option<PathBuf>,

    /// One weight per model; uniform when omitted
    #[arg(long, num_args = 1.., value_name = "W")]
    pub weights: Vec<f32>,

    /// Override `prediction.beam_size`
    #[arg(long, value_name = "N")]
    pub beam_size: Option<usize>,

    /// Override `prediction.max_batch_size`
    #[arg(long, value_name = "SIZE")]
    pub batch_size: Option<usize>,

    /// Override `output.save_mode` (list, numpy)
    #[arg(long, value_name = "MODE")]
    pub save_mode: Option<String>,
}

impl ScoreArgs {
    /// Checks that need no file access.
    pub fn validate(&self) -> beamscore_common::Result<()> {
        if self.target.is_some() && self.source.is_none() {
            return Err(ScoreError::config("--target needs a matching --source file"));
        }
        if self.splits.is_empty() {
            return Err(ScoreError::config("at least one split is required"));
        }
        Ok(())
    }
}

/// Totals of a scoring run.
#[derive(Debug, Clone, Default)]
pub struct ScoreSummary {
    pub splits: usize,
    pub examples: usize,
    pub failures: usize,
    pub metrics: SearchMetrics,
}

impl ScoreSummary {
    /// Process exit code: any failed example makes the run a decoding failure.
    pub const fn exit_code(&self) -> i32 {
        if self.failures > 0 {
            EXIT_DECODING
        } else {
            EXIT_SUCCESS
        }
    }
}

/// Score or decode every requested split and write the results.
///
/// Decoding failures of single examples do not stop the run; they are
/// written as `nan` and counted in the summary.
pub fn run_score(args: &ScoreArgs, config: &CliConfig) -> Result<ScoreSummary> {
    args.validate()?;
    let weights = EnsembleWeights::resolve(&args.weights, args.models.len())?;
    let save_mode = config.output.mode()?;
    let dataset = load_dataset(args)?;
    check_numpy_targets(args, &dataset, save_mode)?;

    let models = ModelLoader::new()
        .expect_vocab_size(dataset.target_vocab.vocab_size())
        .load_ensemble(&args.models)
        .context("Failed to load models")?;
    score_dataset(args, config, &dataset, models, weights, save_mode)
}

/// [`run_score`] with an ensemble that is already loaded; `args.models` is
/// not read.
pub fn score_with_models(
    args: &ScoreArgs,
    config: &CliConfig,
    models: Vec<Arc<dyn InferencePort>>,
) -> Result<ScoreSummary> {
    args.validate()?;
    let weights = EnsembleWeights::resolve(&args.weights, models.len())?;
    let save_mode = config.output.mode()?;
    let dataset = load_dataset(args)?;
    check_numpy_targets(args, &dataset, save_mode)?;
    score_dataset(args, config, &dataset, models, weights, save_mode)
}

fn check_numpy_targets(args: &ScoreArgs, dataset: &Dataset, save_mode: SaveMode) -> Result<()> {
    if save_mode == SaveMode::Numpy {
        for split in &args.splits {
            if !dataset.split(split)?.has_targets() {
                return Err(ScoreError::config(format!(
                    "split '{split}' has no targets; numpy output needs scores, use the list mode"
                ))
                .into());
            }
        }
    }
    Ok(())
}

fn score_dataset(
    args: &ScoreArgs,
    config: &CliConfig,
    dataset: &Dataset,
    models: Vec<Arc<dyn InferencePort>>,
    weights: EnsembleWeights,
    save_mode: SaveMode,
) -> Result<ScoreSummary> {
    let tokenizer = build_tokenizer(config.data.tokenization);
    let resolver = if config.prediction.pos_unk {
        let resolver = match &config.data.unk_mapping {
            Some(path) => UnknownResolver::with_mapping(load_unk_mapping(path)?),
            None => UnknownResolver::new(),
        };
        Some(resolver)
    } else {
        None
    };

    if weights.is_explicit() && weights.len() > 1 {
        info!("Using weights: {:?}", weights.as_slice());
    }
    let engine = BeamSearchEngine::new(
        models,
        weights,
        config.prediction.clone(),
        dataset.target_vocab.special_tokens(),
    )
    .context("Failed to build the search engine")?;
    let driver = ScoringDriver::new(&engine);

    let mut summary = ScoreSummary::default();
    let dest = args.dest.as_deref().or(config.output.dest.as_deref());
    for split in &args.splits {
        info!("Scoring split '{split}'");
        let examples = dataset.examples(split, tokenizer.as_ref())?;
        let source_words = if resolver.is_some() {
            dataset.source_words(split, tokenizer.as_ref())?
        } else {
            Vec::new()
        };

        let mut stream = driver.stream(examples);
        let mut records = Vec::new();
        for (id, result) in stream.by_ref() {
            let record = match result {
                Ok(ExampleOutput::Score(score)) => ResultRecord::Score(score),
                Ok(ExampleOutput::Decoded(decoded)) => {
                    let best = decoded.best();
                    let pieces = match &resolver {
                        Some(resolver) => resolver.resolve(
                            best,
                            source_words.get(id).map_or(&[][..], Vec::as_slice),
                            &dataset.target_vocab,
                        ),
                        None => dataset.target_vocab.decode(&best.tokens),
                    };
                    ResultRecord::Text(tokenizer.detokenize(&pieces))
                }
                Err(e) => {
                    warn!(split = %split, example = id, "{e}");
                    summary.failures += 1;
                    ResultRecord::Failed
                }
            };
            records.push(record);
        }
        log_metrics(split, stream.batches(), stream.metrics());
        summary.metrics.merge(stream.metrics());
        summary.examples += records.len();
        summary.splits += 1;

        let split_dest = dest.map(|d| split_destination(d, split, args.splits.len()));
        save_results(&records, save_mode, split_dest.as_deref())
            .with_context(|| format!("Failed to save results of split '{split}'"))?;
    }
    Ok(summary)
}

fn load_dataset(args: &ScoreArgs) -> Result<Dataset> {
    let dataset = match &args.source {
        Some(source) => {
            let mut dataset = Dataset::open(&args.dataset, &[])
                .with_context(|| format!("Failed to open dataset {}", args.dataset.display()))?;
            dataset.override_from_files(&args.splits, source, args.target.as_deref())?;
            dataset
        }
        None => Dataset::open(&args.dataset, &args.splits)
            .with_context(|| format!("Failed to open dataset {}", args.dataset.display()))?,
    };
    Ok(dataset)
}

fn log_metrics(split: &str, batches: usize, metrics: &SearchMetrics) {
    debug!(
        split = %split,
        batches,
        steps = metrics.steps,
        port_calls = metrics.port_calls,
        expansions = metrics.expansions,
        pruned = metrics.pruned,
        early_stops = metrics.early_stops,
        forced_finishes = metrics.forced_finishes,
        failures = metrics.failures,
        search_time_ms = metrics.search_time_ms,
        "search statistics"
    );
}
