//! Finalisation rules for finished hypotheses.
//!
//! Applied in order: length penalty, probability normalisation
//! (`len^alpha`), coverage penalty.

use beamscore_common::{LengthNormalization, PredictionConfig};

/// Coverage below this is floored before taking the log.
const MIN_COVERAGE: f32 = 1e-6;

// ── Length Penalty ─────────────────────────────────────────────────────────

/// Length normalisation of a raw log score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthPenalty {
    pub kind: LengthNormalization,
    pub factor: f32,
}

impl LengthPenalty {
    pub const fn new(kind: LengthNormalization, factor: f32) -> Self {
        Self { kind, factor }
    }

    /// Wu et al. divisor: `((5 + len) / 6)^factor`.
    pub fn gnmt_divisor(&self, length: usize) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let base = (5.0 + length as f32) / 6.0;
        base.powf(self.factor)
    }

    pub fn apply(&self, score: f32, length: usize) -> f32 {
        match self.kind {
            LengthNormalization::Gnmt => score / self.gnmt_divisor(length),
            #[allow(clippy::cast_precision_loss)]
            LengthNormalization::Additive => score - self.factor * length as f32,
        }
    }
}

// ── Coverage Penalty ───────────────────────────────────────────────────────

/// GNMT coverage penalty: `beta · Σ_j ln(min(c_j, 1))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoveragePenalty {
    pub beta: f32,
}

impl CoveragePenalty {
    pub const fn new(beta: f32) -> Self {
        Self { beta }
    }

    /// Penalty term, never positive. Exactly `0.0` when every position is
    /// covered at least once.
    pub fn term(&self, coverage: &[f32]) -> f32 {
        if coverage.iter().all(|&c| c >= 1.0) {
            return 0.0;
        }
        let deficit: f32 =
            coverage.iter().filter(|&&c| c < 1.0).map(|&c| c.max(MIN_COVERAGE).ln()).sum();
        self.beta * deficit
    }
}

// ── Hypothesis Scorer ──────────────────────────────────────────────────────

/// Every enabled finalisation rule of a run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HypothesisScorer {
    pub length: Option<LengthPenalty>,
    /// `alpha_factor` when `normalize_probs` is set.
    pub alpha: Option<f32>,
    pub coverage: Option<CoveragePenalty>,
}

impl HypothesisScorer {
    pub fn from_config(config: &PredictionConfig) -> Self {
        Self {
            length: config
                .length_penalty
                .then(|| LengthPenalty::new(config.length_normalization, config.length_norm_factor)),
            alpha: config.normalize_probs.then_some(config.alpha_factor),
            coverage: config
                .coverage_penalty
                .then(|| CoveragePenalty::new(config.coverage_norm_factor)),
        }
    }

    /// Length-dependent part of the final score.
    pub fn normalize(&self, score: f32, length: usize) -> f32 {
        let mut score = match self.length {
            Some(lp) => lp.apply(score, length),
            None => score,
        };
        if let Some(alpha) = self.alpha {
            #[allow(clippy::cast_precision_loss)]
            let divisor = (length.max(1) as f32).powf(alpha);
            score /= divisor;
        }
        score
    }

    pub fn final_score(&self, score: f32, length: usize, coverage: &[f32]) -> f32 {
        let normalized = self.normalize(score, length);
        match self.coverage {
            Some(cp) => normalized + cp.term(coverage),
            None => normalized,
        }
    }

    /// Best final score a live hypothesis of `length` tokens could still
    /// reach before `max_length`.
    ///
    /// Raw log scores never increase, so only the normalisation can help;
    /// the coverage term is at best `0.0`.
    pub fn optimistic_bound(&self, score: f32, length: usize, max_length: usize) -> f32 {
        if self.length.is_none() && self.alpha.is_none() {
            return score;
        }
        (length + 1..=max_length.max(length + 1))
            .map(|len| self.normalize(score, len))
            .fold(f32::NEG_INFINITY, f32::max)
    }
}
