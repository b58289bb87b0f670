//! Ensemble Combiner.
//!
//! Merges the next-token probability rows of N models into one row of
//! log-probabilities the search can accumulate.

use beamscore_common::{EnsembleWeights, Result, ScoreError};
use beamscore_logits::{has_nan, is_degenerate, ln_in_place, MIN_PROBABILITY_MASS};

/// Where per-model distributions are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombinationSpace {
    /// `Σ w_i · ln p_i(v)`: weighted geometric mean, not renormalised.
    #[default]
    Log,
    /// `ln(Σ w_i · p_i(v) / Σ w_i)`: weighted arithmetic mean of probabilities.
    Probability,
}

impl CombinationSpace {
    /// Probability space when probabilities are normalised, log space otherwise.
    pub const fn for_normalize_probs(normalize_probs: bool) -> Self {
        if normalize_probs {
            Self::Probability
        } else {
            Self::Log
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleCombiner {
    weights: EnsembleWeights,
    space: CombinationSpace,
}

impl EnsembleCombiner {
    /// Fails with a configuration error unless there is one weight per model.
    pub fn new(weights: EnsembleWeights, model_count: usize, space: CombinationSpace) -> Result<Self> {
        if weights.len() != model_count {
            return Err(ScoreError::config(format!(
                "you should give a weight to each model: got {model_count} models and {} weights",
                weights.len()
            )));
        }
        Ok(Self { weights, space })
    }

    pub fn model_count(&self) -> usize {
        self.weights.len()
    }

    pub const fn space(&self) -> CombinationSpace {
        self.space
    }

    pub const fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    /// Combine one probability row per model into a log-probability row.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the row count differs from the model count.
    /// - `Decoding` if a row has NaN, a different width, if every row is
    ///   (near) zero mass, or if nothing finite survives the combination.
    pub fn combine(&self, rows: &[&[f32]]) -> Result<Vec<f32>> {
        if rows.len() != self.weights.len() {
            return Err(ScoreError::config(format!(
                "ensemble expects {} distributions, got {}",
                self.weights.len(),
                rows.len()
            )));
        }
        let width = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != width) {
            return Err(ScoreError::decoding("ensemble members disagree on vocabulary size"));
        }
        if let Some(model) = rows.iter().position(|r| has_nan(r)) {
            return Err(ScoreError::decoding(format!("model {model} produced NaN probabilities")));
        }
        if rows.iter().all(|r| is_degenerate(r, MIN_PROBABILITY_MASS)) {
            return Err(ScoreError::decoding(
                "every model returned (approximately) zero probability mass",
            ));
        }

        let combined = match self.space {
            CombinationSpace::Log => self.combine_log(rows, width),
            CombinationSpace::Probability => self.combine_probability(rows, width),
        };
        if !combined.iter().any(|v| v.is_finite()) {
            return Err(ScoreError::decoding("combined distribution has no finite entry"));
        }
        Ok(combined)
    }

    fn combine_log(&self, rows: &[&[f32]], width: usize) -> Vec<f32> {
        if let ([row], Some(w)) = (rows, self.weights.get(0)) {
            let mut out = row.to_vec();
            ln_in_place(&mut out);
            if (w - 1.0).abs() > f32::EPSILON {
                for v in out.iter_mut().filter(|v| v.is_finite()) {
                    *v *= w;
                }
            }
            return out;
        }

        let mut out = vec![0.0f32; width];
        for (row, &w) in rows.iter().zip(self.weights.as_slice()) {
            // A zero weight must not turn a zero probability into NaN.
            if w <= 0.0 {
                continue;
            }
            for (acc, &p) in out.iter_mut().zip(row.iter()) {
                *acc += if p > 0.0 { w * p.ln() } else { f32::NEG_INFINITY };
            }
        }
        out
    }

    fn combine_probability(&self, rows: &[&[f32]], width: usize) -> Vec<f32> {
        let total = self.weights.total();
        let mut out = vec![0.0f32; width];
        for (row, &w) in rows.iter().zip(self.weights.as_slice()) {
            for (acc, &p) in out.iter_mut().zip(row.iter()) {
                if p.is_finite() && p > 0.0 {
                    *acc += w * p;
                }
            }
        }
        if (total - 1.0).abs() > f32::EPSILON {
            for v in &mut out {
                *v /= total;
            }
        }
        ln_in_place(&mut out);
        out
    }

    /// Weight-normalised mean of the alignment rows of the models that
    /// reported one. `None` when no model did.
    pub fn combine_alignments(&self, rows: &[Option<&[f32]>]) -> Option<Vec<f32>> {
        let mut out: Option<Vec<f32>> = None;
        let mut total = 0.0f32;
        for (row, &w) in rows.iter().zip(self.weights.as_slice()) {
            let Some(row) = row else { continue };
            let acc = out.get_or_insert_with(|| vec![0.0; row.len()]);
            if acc.len() != row.len() {
                continue;
            }
            for (a, &v) in acc.iter_mut().zip(row.iter()) {
                *a += w * v;
            }
            total += w;
        }
        let mut out = out?;
        if total > 0.0 {
            for v in &mut out {
                *v /= total;
            }
        }
        Some(out)
    }
}
