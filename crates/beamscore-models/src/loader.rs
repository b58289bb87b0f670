//! Model loading utilities

use crate::table::TableModel;
use beamscore_common::{Result, ScoreError};
use beamscore_inference::InferencePort;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Loads table models from JSON files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelLoader {
    expected_vocab: Option<usize>,
}

impl ModelLoader {
    pub const fn new() -> Self {
        Self { expected_vocab: None }
    }

    /// Reject models whose vocabulary differs from `vocab_size`.
    #[must_use]
    pub const fn expect_vocab_size(mut self, vocab_size: usize) -> Self {
        self.expected_vocab = Some(vocab_size);
        self
    }

    /// Load and validate one model.
    ///
    /// Unreadable files are `Io` errors; malformed JSON or tables are
    /// `Configuration` errors. A model without a name is named after its
    /// file stem.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<TableModel> {
        let path = path.as_ref();
        info!("Loading model from: {}", path.display());

        let text = std::fs::read_to_string(path).map_err(|e| ScoreError::io(path, e))?;
        let mut model: TableModel = serde_json::from_str(&text).map_err(|e| {
            ScoreError::config(format!("{} is not a valid model file: {e}", path.display()))
        })?;
        if model.name.is_empty() {
            model.name = path
                .file_stem()
                .map_or_else(|| "model".to_string(), |s| s.to_string_lossy().into_owned());
        }
        model.validate()?;

        if let Some(expected) = self.expected_vocab {
            if model.vocab_size != expected {
                return Err(ScoreError::config(format!(
                    "model '{}' has {} output tokens but the target vocabulary has {expected}",
                    model.name, model.vocab_size
                )));
            }
        }
        debug!(
            model = %model.name,
            vocab_size = model.vocab_size,
            source_bias = model.source_bias,
            "model loaded"
        );
        Ok(model)
    }

    /// Load every model of an ensemble, in order.
    pub fn load_ensemble<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<Arc<dyn InferencePort>>> {
        if paths.is_empty() {
            return Err(ScoreError::config("at least one model is required"));
        }
        let models = paths
            .iter()
            .map(|p| self.load(p).map(|m| Arc::new(m) as Arc<dyn InferencePort>))
            .collect::<Result<Vec<_>>>()?;
        info!("Loaded {} model(s)", models.len());
        Ok(models)
    }
}
