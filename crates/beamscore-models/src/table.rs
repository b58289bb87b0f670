//! Transition-table model.

use beamscore_common::{Result, ScoreError};
use beamscore_inference::{DecoderQuery, InferencePort, StepOutput};
use beamscore_logits::softmax_in_place;
use serde::{Deserialize, Serialize};

fn default_sharpness() -> f32 {
    1.0
}

/// First-order model over the target vocabulary.
///
/// The logits for the next token are the transition row of the last emitted
/// token (the start token on an empty prefix), plus `source_bias` on every
/// token id that occurs in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableModel {
    #[serde(default)]
    pub name: String,
    pub vocab_size: usize,
    pub start_token: u32,
    /// `vocab_size` rows of `vocab_size` logits.
    pub transitions: Vec<Vec<f32>>,
    #[serde(default)]
    pub source_bias: f32,
    /// Sharpness of the diagonal attention. Larger is more peaked.
    #[serde(default = "default_sharpness")]
    pub attention_sharpness: f32,
}

impl TableModel {
    /// Check dimensions and values; every failure is a configuration error.
    pub fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 {
            return Err(ScoreError::config(format!("model '{}': vocab_size must be positive", self.name)));
        }
        if self.start_token as usize >= self.vocab_size {
            return Err(ScoreError::config(format!(
                "model '{}': start_token {} is outside the vocabulary of {} tokens",
                self.name, self.start_token, self.vocab_size
            )));
        }
        if self.transitions.len() != self.vocab_size {
            return Err(ScoreError::config(format!(
                "model '{}': expected {} transition rows, found {}",
                self.name,
                self.vocab_size,
                self.transitions.len()
            )));
        }
        for (i, row) in self.transitions.iter().enumerate() {
            if row.len() != self.vocab_size {
                return Err(ScoreError::config(format!(
                    "model '{}': transition row {i} has {} entries, expected {}",
                    self.name,
                    row.len(),
                    self.vocab_size
                )));
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(ScoreError::config(format!(
                    "model '{}': transition row {i} contains a non-finite logit",
                    self.name
                )));
            }
        }
        if !self.source_bias.is_finite() {
            return Err(ScoreError::config(format!("model '{}': source_bias must be finite", self.name)));
        }
        if !self.attention_sharpness.is_finite() || self.attention_sharpness < 0.0 {
            return Err(ScoreError::config(format!(
                "model '{}': attention_sharpness must be a non-negative number",
                self.name
            )));
        }
        Ok(())
    }

    /// Next-token probabilities for one query.
    pub fn distribution(&self, query: &DecoderQuery<'_>) -> Vec<f32> {
        let last = query.prefix.last().copied().unwrap_or(self.start_token);
        let mut logits = self
            .transitions
            .get(last as usize)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.vocab_size]);
        for &token in &query.encoder.tokens {
            if let Some(logit) = logits.get_mut(token as usize) {
                *logit += self.source_bias;
            }
        }
        softmax_in_place(&mut logits);
        logits
    }

    /// Attention over source positions for one query.
    pub fn alignment(&self, query: &DecoderQuery<'_>) -> Vec<f32> {
        #[allow(clippy::cast_precision_loss)]
        let step = query.step() as f32;
        let mut scores: Vec<f32> = (0..query.encoder.source_len())
            .map(|j| {
                #[allow(clippy::cast_precision_loss)]
                let distance = (j as f32 - step).abs();
                -self.attention_sharpness * distance
            })
            .collect();
        softmax_in_place(&mut scores);
        scores
    }
}

impl InferencePort for TableModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn supports_alignments(&self) -> bool {
        true
    }

    fn next_token_distribution(
        &self,
        queries: &[DecoderQuery<'_>],
        with_alignments: bool,
    ) -> Result<StepOutput> {
        let distributions = queries.iter().map(|q| self.distribution(q)).collect();
        let alignments =
            with_alignments.then(|| queries.iter().map(|q| self.alignment(q)).collect());
        Ok(StepOutput { distributions, alignments })
    }
}
