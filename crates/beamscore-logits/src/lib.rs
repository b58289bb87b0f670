//! Pure distribution transforms for beam search.
//!
//! All functions operate on `f32` slices and have no dependencies. Models use
//! [`softmax_in_place`] to turn logits into the probabilities they report;
//! the ensemble and the search engine use the rest to move between
//! probability and log space, detect degenerate rows and pick candidates.
//!
//! ## Typical pipeline
//!
//! ```
//! use beamscore_logits::*;
//!
//! let mut row = vec![1.0f32, 2.0, 3.0, 0.5];
//! softmax_in_place(&mut row);
//! assert!(!is_degenerate(&row, MIN_PROBABILITY_MASS));
//!
//! ln_in_place(&mut row);
//! mask_token(&mut row, 3);
//! let best = top_k(&row, 2);
//! assert_eq!(best[0].0, 2);
//! ```

use std::cmp::Ordering;

/// Rows whose total probability is below this are treated as empty.
pub const MIN_PROBABILITY_MASS: f32 = 1e-12;

/// Convert raw logits to a probability distribution in-place via softmax.
///
/// Uses the numerically-stable "subtract max" form. `f32::NEG_INFINITY`
/// entries become `0.0`.
///
/// Falls back to a uniform distribution when all exponentiated values
/// underflow to zero (rare with finite logits).
///
/// # Examples
///
/// ```
/// use beamscore_logits::softmax_in_place;
///
/// let mut logits = vec![1.0f32, 2.0, 3.0];
/// softmax_in_place(&mut logits);
/// let sum: f32 = logits.iter().sum();
/// assert!((sum - 1.0).abs() < 1e-5);
/// assert!(logits[2] > logits[1] && logits[1] > logits[0]);
/// ```
pub fn softmax_in_place(logits: &mut [f32]) {
    if logits.is_empty() {
        return;
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for l in logits.iter_mut() {
        let v = *l;
        if v == f32::NEG_INFINITY {
            *l = 0.0;
        } else {
            let exp = (v - max).exp();
            *l = exp;
            sum += exp;
        }
    }
    if sum > 0.0 {
        let inv_sum = 1.0 / sum;
        for l in logits.iter_mut() {
            *l *= inv_sum;
        }
    } else {
        #[allow(clippy::cast_precision_loss)]
        let uniform = 1.0_f32 / logits.len() as f32;
        for l in logits.iter_mut() {
            *l = uniform;
        }
    }
}

/// Log-softmax: `log(softmax(x))`, computed without leaving log space.
///
/// # Examples
///
/// ```
/// use beamscore_logits::log_softmax;
///
/// let lp = log_softmax(&[0.0f32, 0.0]);
/// assert!((lp[0] - 0.5f32.ln()).abs() < 1e-6);
/// ```
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return vec![f32::NEG_INFINITY; logits.len()];
    }
    let sum_exp: f32 = logits.iter().map(|&v| (v - max).exp()).sum();
    let log_sum_exp = max + sum_exp.ln();
    logits.iter().map(|&v| v - log_sum_exp).collect()
}

/// Replace probabilities with their natural log. Zeros become `-inf`.
pub fn ln_in_place(probs: &mut [f32]) {
    for p in probs.iter_mut() {
        *p = if *p > 0.0 { p.ln() } else { f32::NEG_INFINITY };
    }
}

/// Total probability mass of a row, ignoring non-finite entries.
pub fn probability_mass(probs: &[f32]) -> f32 {
    probs.iter().copied().filter(|p| p.is_finite() && *p > 0.0).sum()
}

/// Whether any entry is NaN.
pub fn has_nan(values: &[f32]) -> bool {
    values.iter().any(|v| v.is_nan())
}

/// Whether a probability row carries (approximately) no mass or contains NaN.
///
/// # Examples
///
/// ```
/// use beamscore_logits::{is_degenerate, MIN_PROBABILITY_MASS};
///
/// assert!(is_degenerate(&[0.0, 0.0, 0.0], MIN_PROBABILITY_MASS));
/// assert!(is_degenerate(&[0.5, f32::NAN], MIN_PROBABILITY_MASS));
/// assert!(!is_degenerate(&[0.25, 0.75], MIN_PROBABILITY_MASS));
/// ```
pub fn is_degenerate(probs: &[f32], min_mass: f32) -> bool {
    has_nan(probs) || probability_mass(probs) < min_mass
}

/// Set one entry to `-inf`, excluding the token from selection.
///
/// Out-of-range ids are ignored.
pub fn mask_token(log_probs: &mut [f32], token_id: u32) {
    if let Some(v) = log_probs.get_mut(token_id as usize) {
        *v = f32::NEG_INFINITY;
    }
}

/// Return the `k` best `(token_id, value)` pairs, best first.
///
/// Ordering is deterministic: higher value first, lower token id first on
/// ties. Non-finite entries are never returned, so the result may be
/// shorter than `k`.
///
/// # Examples
///
/// ```
/// use beamscore_logits::top_k;
///
/// let values = vec![0.1f32, 0.7, 0.7, f32::NEG_INFINITY, 0.2];
/// let best = top_k(&values, 3);
/// assert_eq!(best, vec![(1, 0.7), (2, 0.7), (4, 0.2)]);
/// ```
pub fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
    if k == 0 {
        return Vec::new();
    }
    let mut indexed: Vec<(u32, f32)> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| {
            #[allow(clippy::cast_possible_truncation)]
            let id = i as u32;
            (id, v)
        })
        .collect();
    if indexed.len() > k {
        // Partition first so large vocabularies only sort `k` entries.
        indexed.select_nth_unstable_by(k - 1, |a, b| rank_desc(*a, *b));
        indexed.truncate(k);
    }
    indexed.sort_unstable_by(|a, b| rank_desc(*a, *b));
    indexed
}

/// Index of the maximum value; the first maximum wins on ties.
///
/// Returns `0` on an empty slice.
///
/// # Examples
///
/// ```
/// use beamscore_logits::argmax;
///
/// assert_eq!(argmax(&[0.1f32, 0.9, 0.9, 0.2]), 1);
/// assert_eq!(argmax(&[]), 0);
/// ```
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if f32_descending(v, values[best]) == Ordering::Less {
            best = i;
        }
    }
    best
}

// --- helpers ---------------------------------------------------------------

#[inline]
fn f32_descending(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[inline]
fn rank_desc(a: (u32, f32), b: (u32, f32)) -> Ordering {
    f32_descending(a.1, b.1).then(a.0.cmp(&b.0))
}

// ---------------------------------------------------------------------------
