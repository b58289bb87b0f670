//! Configuration file handling.
//!
//! Precedence is defaults, then the TOML file, then command-line flags.
//! [`ConfigBuilder::build`] validates the merged result once, before any
//! model is loaded.

use beamscore_common::{PredictionConfig, Result, ScoreError};
use beamscore_data::{DataConfig, SaveMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "beamscore.toml";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Complete CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub prediction: PredictionConfig,
    pub data: DataConfig,
    pub output: OutputSettings,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    /// `list` or `numpy`.
    pub save_mode: String,
    /// Results file; stdout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { save_mode: SaveMode::List.to_string(), dest: None }
    }
}

impl OutputSettings {
    pub fn mode(&self) -> Result<SaveMode> {
        self.save_mode.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceConfig {
    /// Worker threads for parallel batches; all cores when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

impl PerformanceConfig {
    pub fn effective_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }
}

impl CliConfig {
    /// Path of the configuration file to read, if any.
    ///
    /// An explicit path is always returned so a missing file is reported;
    /// the default file is only used when it exists.
    pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.prediction.validate()?;
        self.output.mode()?;
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ScoreError::config(format!(
                "unknown log level '{}'. Expected one of: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ScoreError::config(format!(
                "unknown log format '{}'. Expected one of: {}",
                self.logging.format,
                LOG_FORMATS.join(", ")
            )));
        }
        if self.performance.threads == Some(0) {
            return Err(ScoreError::config("performance.threads must be at least 1"));
        }
        Ok(())
    }
}

/// Merges configuration layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: CliConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the defaults with a TOML file; absent keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ScoreError::io(path, e))?;
        Self::from_toml(&content).map_err(|e| match e {
            ScoreError::Configuration(msg) => ScoreError::config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(Self { config: toml::from_str(content)? })
    }

    #[must_use]
    pub fn beam_size(mut self, beam_size: Option<usize>) -> Self {
        if let Some(beam_size) = beam_size {
            self.config.prediction.beam_size = beam_size;
        }
        self
    }

    #[must_use]
    pub fn max_batch_size(mut self, size: Option<usize>) -> Self {
        if let Some(size) = size {
            self.config.prediction.max_batch_size = size;
        }
        self
    }

    #[must_use]
    pub fn save_mode(mut self, mode: Option<String>) -> Self {
        if let Some(mode) = mode {
            self.config.output.save_mode = mode;
        }
        self
    }

    #[must_use]
    pub fn dest(mut self, dest: Option<PathBuf>) -> Self {
        if dest.is_some() {
            self.config.output.dest = dest;
        }
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: Option<String>) -> Self {
        if let Some(level) = level {
            self.config.logging.level = level;
        }
        self
    }

    #[must_use]
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        if threads.is_some() {
            self.config.performance.threads = threads;
        }
        self
    }

    pub fn build(self) -> Result<CliConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Commented configuration printed by `beamscore config example`.
pub const EXAMPLE_CONFIG: &str = r#"# beamscore configuration. Every key is optional.

[prediction]
beam_size = 6
max_batch_size = 50
# Absolute output bound; also caps max_length_factor * source length.
max_length = 70
max_length_factor = 3.0
min_length = 0
min_length_factor = 0.5
# Length normalization of finished hypotheses: "gnmt" or "additive".
length_penalty = false
length_norm_factor = 0.0
length_normalization = "gnmt"
coverage_penalty = false
coverage_norm_factor = 0.0
# Combine models in probability space and divide scores by len^alpha_factor.
normalize_probs = false
alpha_factor = 1.0
# Replace unknown target tokens with the aligned source word.
pos_unk = false
pad_on_batch = true
state_below_max_length = 50
parallel_batches = false

[data]
# "whitespace" or "characters".
tokenization = "whitespace"
# unk_mapping = "unk_mapping.json"

[output]
# "list" or "numpy".
save_mode = "list"
# dest = "scores.txt"

[logging]
level = "info"
# "pretty", "compact" or "json".
format = "pretty"

[performance]
# threads = 8
"#;
