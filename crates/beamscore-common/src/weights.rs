//! Per-model ensemble weights.

use crate::error::{Result, ScoreError};

/// Non-negative weight for every ensemble member, indexed by model position.
///
/// Built once per run. An empty request resolves to uniform `1/N` weights;
/// an explicit request must name exactly one weight per model.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleWeights {
    weights: Vec<f32>,
    explicit: bool,
}

impl EnsembleWeights {
    /// Uniform `1/N` weights for `model_count` models.
    pub fn uniform(model_count: usize) -> Result<Self> {
        if model_count == 0 {
            return Err(ScoreError::config("an ensemble needs at least one model"));
        }
        #[allow(clippy::cast_precision_loss)]
        let w = 1.0 / model_count as f32;
        Ok(Self { weights: vec![w; model_count], explicit: false })
    }

    /// Caller-supplied weights, checked against the model count.
    pub fn explicit(weights: Vec<f32>, model_count: usize) -> Result<Self> {
        if weights.len() != model_count {
            return Err(ScoreError::config(format!(
                "you should give a weight to each model: got {model_count} models and {} weights",
                weights.len()
            )));
        }
        if let Some((idx, w)) =
            weights.iter().enumerate().find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(ScoreError::config(format!(
                "weight {idx} must be a non-negative number, got {w}"
            )));
        }
        if weights.iter().sum::<f32>() <= 0.0 {
            return Err(ScoreError::config("ensemble weights must not all be zero"));
        }
        Ok(Self { weights, explicit: true })
    }

    /// Uniform when `weights` is empty, explicit otherwise.
    pub fn resolve(weights: &[f32], model_count: usize) -> Result<Self> {
        if weights.is_empty() {
            Self::uniform(model_count)
        } else {
            Self::explicit(weights.to_vec(), model_count)
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn get(&self, model_index: usize) -> Option<f32> {
        self.weights.get(model_index).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    pub fn total(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// Whether the weights were supplied by the caller.
    pub const fn is_explicit(&self) -> bool {
        self.explicit
    }
}
