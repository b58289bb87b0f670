//! Deterministic in-memory models for engine tests.

#![allow(dead_code)]

use beamscore_common::{Result, SpecialTokens};
use beamscore_inference::{DecoderQuery, InferencePort, StepOutput};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const UNK: u32 = 0;
pub const BOS: u32 = 1;
pub const EOS: u32 = 2;
pub const SPECIAL: SpecialTokens = SpecialTokens { start: BOS, end: EOS, unknown: UNK };

/// Pseudo-random but reproducible distributions keyed on the seed, the
/// source and the prefix. Counts batched calls and the rows they carry.
pub struct HashedModel {
    pub name: String,
    pub vocab: usize,
    pub seed: u64,
    pub calls: AtomicUsize,
    pub rows_seen: AtomicUsize,
}

impl HashedModel {
    pub fn new(seed: u64, vocab: usize) -> Arc<Self> {
        Arc::new(Self {
            name: format!("hashed-{seed}"),
            vocab,
            seed,
            calls: AtomicUsize::new(0),
            rows_seen: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Query rows across every call so far.
    pub fn rows_seen(&self) -> usize {
        self.rows_seen.load(Ordering::SeqCst)
    }

    fn row(&self, query: &DecoderQuery<'_>) -> Vec<f32> {
        let mut state = self.seed ^ 0x9E37_79B9_7F4A_7C15;
        for &t in query.encoder.tokens.iter().chain([u32::MAX].iter()).chain(query.prefix) {
            state = mix(state ^ u64::from(t));
        }
        let mut row: Vec<f32> = (0..self.vocab)
            .map(|_| {
                state = mix(state);
                #[allow(clippy::cast_precision_loss)]
                let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
                0.05 + unit
            })
            .collect();
        if let Some(eos) = row.get_mut(EOS as usize) {
            #[allow(clippy::cast_precision_loss)]
            let growth = 1.0 + query.step() as f32;
            *eos *= growth;
        }
        let total: f32 = row.iter().sum();
        for p in &mut row {
            *p /= total;
        }
        row
    }
}

fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

impl InferencePort for HashedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn vocab_size(&self) -> usize {
        self.vocab
    }

    fn supports_alignments(&self) -> bool {
        true
    }

    fn next_token_distribution(
        &self,
        queries: &[DecoderQuery<'_>],
        with_alignments: bool,
    ) -> Result<StepOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rows_seen.fetch_add(queries.len(), Ordering::SeqCst);
        let distributions = queries.iter().map(|q| self.row(q)).collect();
        let alignments = with_alignments.then(|| {
            queries
                .iter()
                .map(|q| {
                    let n = q.encoder.source_len();
                    let focus = q.step().min(n.saturating_sub(1));
                    (0..n).map(|j| if j == focus { 1.0 } else { 0.0 }).collect()
                })
                .collect()
        });
        Ok(StepOutput { distributions, alignments })
    }
}

pub fn ports(models: &[Arc<HashedModel>]) -> Vec<Arc<dyn InferencePort>> {
    models.iter().map(|m| Arc::clone(m) as Arc<dyn InferencePort>).collect()
}
