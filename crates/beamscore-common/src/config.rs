//! Prediction configuration
//!
//! [`PredictionConfig`] is the typed snapshot of every option that shapes a
//! scoring run. It is deserialized from the `[prediction]` table of the
//! configuration file, merged with command-line overrides, validated once,
//! and then shared read-only by every batch.

use crate::error::{Result, ScoreError};
use serde::{Deserialize, Serialize};

/// How finished hypotheses are normalized for length when
/// [`PredictionConfig::length_penalty`] is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthNormalization {
    /// Wu et al. (GNMT): `score / ((5 + len) / 6)^factor`.
    #[default]
    Gnmt,
    /// Per-token charge: `score - factor * len`.
    Additive,
}

impl std::str::FromStr for LengthNormalization {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gnmt" => Ok(Self::Gnmt),
            "additive" => Ok(Self::Additive),
            other => Err(ScoreError::config(format!(
                "unknown length normalization '{other}'. Expected one of: gnmt, additive"
            ))),
        }
    }
}

impl std::fmt::Display for LengthNormalization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gnmt => write!(f, "gnmt"),
            Self::Additive => write!(f, "additive"),
        }
    }
}

/// Output length window for one source example.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBounds {
    /// Tokens that must be emitted before the end token is allowed.
    pub min: usize,
    /// Hard cap on hypothesis length, end token included.
    pub max: usize,
}

/// Immutable per-run prediction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PredictionConfig {
    pub beam_size: usize,
    pub max_batch_size: usize,
    pub max_length: usize,
    pub max_length_factor: Option<f32>,
    pub min_length: usize,
    pub min_length_factor: Option<f32>,
    pub length_penalty: bool,
    pub length_norm_factor: f32,
    pub length_normalization: LengthNormalization,
    pub coverage_penalty: bool,
    pub coverage_norm_factor: f32,
    pub normalize_probs: bool,
    pub alpha_factor: f32,
    pub pos_unk: bool,
    pub pad_on_batch: bool,
    pub state_below_max_length: usize,
    pub parallel_batches: bool,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            beam_size: 6,
            max_batch_size: 50,
            max_length: 70,
            max_length_factor: Some(3.0),
            min_length: 0,
            min_length_factor: Some(0.5),
            length_penalty: false,
            length_norm_factor: 0.0,
            length_normalization: LengthNormalization::Gnmt,
            coverage_penalty: false,
            coverage_norm_factor: 0.0,
            normalize_probs: false,
            alpha_factor: 1.0,
            pos_unk: false,
            pad_on_batch: true,
            state_below_max_length: 50,
            parallel_batches: false,
        }
    }
}

impl PredictionConfig {
    /// Check every field, returning the first violation as a
    /// configuration error.
    pub fn validate(&self) -> Result<()> {
        if self.beam_size == 0 {
            return Err(ScoreError::config("beam_size must be at least 1"));
        }
        if self.max_batch_size == 0 {
            return Err(ScoreError::config("max_batch_size must be at least 1"));
        }
        if self.max_length == 0 {
            return Err(ScoreError::config("max_length must be at least 1"));
        }
        if let Some(factor) = self.max_length_factor {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(ScoreError::config(format!(
                    "max_length_factor must be a positive number, got {factor}"
                )));
            }
        }
        if let Some(factor) = self.min_length_factor {
            if !factor.is_finite() || factor < 0.0 {
                return Err(ScoreError::config(format!(
                    "min_length_factor must be a non-negative number, got {factor}"
                )));
            }
        }
        if !self.length_norm_factor.is_finite() {
            return Err(ScoreError::config("length_norm_factor must be finite"));
        }
        if self.length_penalty {
            let factor = self.length_norm_factor;
            let in_range = match self.length_normalization {
                LengthNormalization::Gnmt => (0.0..=1.0).contains(&factor),
                LengthNormalization::Additive => factor >= 0.0,
            };
            if !in_range {
                return Err(ScoreError::config(format!(
                    "length_norm_factor {factor} is out of range for {} normalization \
                     (gnmt takes [0, 1], additive takes a non-negative charge)",
                    self.length_normalization
                )));
            }
        }
        if !self.coverage_norm_factor.is_finite() || self.coverage_norm_factor < 0.0 {
            return Err(ScoreError::config(format!(
                "coverage_norm_factor must be a non-negative number, got {}",
                self.coverage_norm_factor
            )));
        }
        if !self.alpha_factor.is_finite() || self.alpha_factor < 0.0 {
            return Err(ScoreError::config(format!(
                "alpha_factor must be a non-negative number, got {}",
                self.alpha_factor
            )));
        }
        if !self.pad_on_batch && self.state_below_max_length == 0 {
            return Err(ScoreError::config(
                "state_below_max_length must be at least 1 when pad_on_batch is disabled",
            ));
        }
        Ok(())
    }

    /// Validate and return `self`, for builder-style call sites.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Effective length window for a source of `source_len` tokens.
    ///
    /// `min` is clamped below `max` so the end token always stays reachable
    /// before the forced stop.
    pub fn bounds_for(&self, source_len: usize) -> LengthBounds {
        let max = match self.max_length_factor {
            Some(factor) => scaled_length(factor, source_len).clamp(1, self.max_length.max(1)),
            None => self.max_length.max(1),
        };
        let min = match self.min_length_factor {
            Some(factor) => scaled_length(factor, source_len),
            None => self.min_length,
        };
        LengthBounds { min: min.min(max - 1), max }
    }

    /// Whether the engine must collect per-step alignment weights.
    pub const fn needs_alignments(&self) -> bool {
        self.coverage_penalty || self.pos_unk
    }

    /// Target truncation bound in forced decoding, if any.
    pub const fn target_truncation(&self) -> Option<usize> {
        if self.pad_on_batch {
            None
        } else {
            Some(self.state_below_max_length)
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_length(factor: f32, source_len: usize) -> usize {
    (factor * source_len as f32).ceil().max(0.0) as usize
}
