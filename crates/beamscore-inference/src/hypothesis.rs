//! Search state: hypotheses and per-example beams.

use crate::penalty::HypothesisScorer;
use beamscore_common::LengthBounds;
use std::cmp::Ordering;

// ── Hypothesis ────────────────────────────────────────────────────────────

/// A partial or finished output sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Token ids emitted so far, end token included once finished.
    pub tokens: Vec<u32>,
    /// Cumulative combined log-probability.
    pub score: f32,
    /// Accumulated attention per source position.
    pub coverage: Vec<f32>,
    /// Alignment row of every step, kept only when unknown tokens are resolved.
    pub alignments: Vec<Vec<f32>>,
    /// Set once the hypothesis emitted the end token or was force-finished.
    pub finished: bool,
    /// Normalised score; equals `score` until the hypothesis is finished.
    pub final_score: f32,
}

impl Hypothesis {
    /// Empty hypothesis for a source of `source_len` tokens.
    pub fn root(source_len: usize) -> Self {
        Self {
            tokens: Vec::new(),
            score: 0.0,
            coverage: vec![0.0; source_len],
            alignments: Vec::new(),
            finished: false,
            final_score: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Extend with `token`, whose cumulative score is `score`.
    ///
    /// `alignment` is the attention of the step that produced `token`; it is
    /// added to the coverage and, with `keep_alignment`, stored for
    /// unknown-token resolution.
    #[must_use]
    pub fn extend(&self, token: u32, score: f32, alignment: Option<&[f32]>, keep_alignment: bool) -> Self {
        let mut tokens = Vec::with_capacity(self.tokens.len() + 1);
        tokens.extend_from_slice(&self.tokens);
        tokens.push(token);

        let mut coverage = self.coverage.clone();
        let mut alignments = if keep_alignment { self.alignments.clone() } else { Vec::new() };
        if let Some(row) = alignment {
            for (c, a) in coverage.iter_mut().zip(row) {
                *c += a;
            }
            if keep_alignment {
                alignments.push(row.to_vec());
            }
        }

        Self { tokens, score, coverage, alignments, finished: false, final_score: score }
    }

    /// Freeze the hypothesis and compute its final score.
    #[must_use]
    pub fn finish(mut self, scorer: &HypothesisScorer) -> Self {
        self.final_score = scorer.final_score(self.score, self.tokens.len(), &self.coverage);
        self.finished = true;
        self
    }
}

/// Descending by final score; `Equal` on NaN so sorting stays stable.
pub(crate) fn by_final_score_desc(a: &Hypothesis, b: &Hypothesis) -> Ordering {
    b.final_score.partial_cmp(&a.final_score).unwrap_or(Ordering::Equal)
}

// ── Beam ──────────────────────────────────────────────────────────────────

/// Live and finished hypotheses of one source example.
///
/// Both sets are bounded by `capacity`. The finished set is kept sorted,
/// best first; earlier arrivals win ties.
#[derive(Debug, Clone)]
pub struct Beam {
    live: Vec<Hypothesis>,
    finished: Vec<Hypothesis>,
    capacity: usize,
    bounds: LengthBounds,
    done: bool,
}

impl Beam {
    pub fn new(capacity: usize, bounds: LengthBounds, source_len: usize) -> Self {
        Self {
            live: vec![Hypothesis::root(source_len)],
            finished: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            bounds,
            done: false,
        }
    }

    pub fn live(&self) -> &[Hypothesis] {
        &self.live
    }

    pub fn finished(&self) -> &[Hypothesis] {
        &self.finished
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn bounds(&self) -> LengthBounds {
        self.bounds
    }

    pub const fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_full(&self) -> bool {
        self.finished.len() >= self.capacity
    }

    /// Lowest final score in a full finished set.
    pub fn worst_finished(&self) -> Option<f32> {
        if self.is_full() {
            self.finished.last().map(|h| h.final_score)
        } else {
            None
        }
    }

    /// Insert a finished hypothesis. Returns `false` if it fell off the end.
    pub fn push_finished(&mut self, hypothesis: Hypothesis) -> bool {
        let at = self
            .finished
            .iter()
            .position(|h| by_final_score_desc(h, &hypothesis) == Ordering::Greater)
            .unwrap_or(self.finished.len());
        if at >= self.capacity {
            return false;
        }
        self.finished.insert(at, hypothesis);
        self.finished.truncate(self.capacity);
        true
    }

    pub fn set_live(&mut self, live: Vec<Hypothesis>) {
        self.live = live;
        if self.live.is_empty() {
            self.done = true;
        }
    }

    pub fn mark_done(&mut self) {
        self.live.clear();
        self.done = true;
    }

    pub fn into_finished(self) -> Vec<Hypothesis> {
        self.finished
    }
}
