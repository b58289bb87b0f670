//! Scoring Driver.
//!
//! Groups examples into batches of at most `max_batch_size`, runs each batch
//! through the engine and hands results out one at a time. Nothing is
//! computed until the stream is polled. With `parallel_batches` a window of
//! batches is processed on the rayon pool; each batch owns its search state
//! and results still come out in input order.

use crate::engine::{BeamSearchEngine, Decoded};
use crate::metrics::SearchMetrics;
use beamscore_common::Result;
use rayon::prelude::*;
use std::collections::VecDeque;
use tracing::debug;

/// One source sentence and, in scoring mode, its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub id: usize,
    pub source: Vec<u32>,
    /// Target ids including the end token. `None` to decode instead.
    pub target: Option<Vec<u32>>,
}

impl Example {
    pub const fn decode(id: usize, source: Vec<u32>) -> Self {
        Self { id, source, target: None }
    }

    pub const fn score(id: usize, source: Vec<u32>, target: Vec<u32>) -> Self {
        Self { id, source, target: Some(target) }
    }
}

/// Result for one example.
#[derive(Debug, Clone, PartialEq)]
pub enum ExampleOutput {
    /// Final score of the supplied target.
    Score(f32),
    /// Finished hypotheses of a free search.
    Decoded(Decoded),
}

impl ExampleOutput {
    /// The score reported for this example.
    pub fn score(&self) -> f32 {
        match self {
            Self::Score(score) => *score,
            Self::Decoded(decoded) => decoded.best().final_score,
        }
    }
}

/// Creates lazy result streams over a shared engine.
#[derive(Debug, Clone, Copy)]
pub struct ScoringDriver<'e> {
    engine: &'e BeamSearchEngine,
}

impl<'e> ScoringDriver<'e> {
    pub const fn new(engine: &'e BeamSearchEngine) -> Self {
        Self { engine }
    }

    pub fn stream<I>(&self, examples: I) -> ScoredStream<'e, I::IntoIter>
    where
        I: IntoIterator<Item = Example>,
    {
        let window = if self.engine.config().parallel_batches {
            rayon::current_num_threads().max(1)
        } else {
            1
        };
        ScoredStream {
            engine: self.engine,
            examples: examples.into_iter(),
            pending: VecDeque::new(),
            metrics: SearchMetrics::default(),
            batches: 0,
            window,
            exhausted: false,
        }
    }
}

/// Finite, single-pass sequence of `(example_id, result)` pairs.
pub struct ScoredStream<'e, I> {
    engine: &'e BeamSearchEngine,
    examples: I,
    pending: VecDeque<(usize, Result<ExampleOutput>)>,
    metrics: SearchMetrics,
    batches: usize,
    window: usize,
    exhausted: bool,
}

impl<I> ScoredStream<'_, I>
where
    I: Iterator<Item = Example>,
{
    /// Counters summed over every batch processed so far.
    pub const fn metrics(&self) -> &SearchMetrics {
        &self.metrics
    }

    pub const fn batches(&self) -> usize {
        self.batches
    }

    fn next_batch(&mut self) -> Vec<Example> {
        let size = self.engine.config().max_batch_size;
        self.examples.by_ref().take(size).collect()
    }

    fn refill(&mut self) {
        let batches: Vec<Vec<Example>> = (0..self.window)
            .map(|_| self.next_batch())
            .take_while(|batch| !batch.is_empty())
            .collect();
        if batches.is_empty() {
            self.exhausted = true;
            return;
        }

        let engine = self.engine;
        let processed: Vec<_> = if batches.len() > 1 {
            batches.par_iter().map(|batch| run_batch(engine, batch)).collect()
        } else {
            batches.iter().map(|batch| run_batch(engine, batch)).collect()
        };
        for (results, metrics) in processed {
            self.batches += 1;
            debug!(
                batch = self.batches,
                examples = results.len(),
                steps = metrics.steps,
                failures = metrics.failures,
                elapsed_ms = metrics.search_time_ms,
                "batch done"
            );
            self.metrics.merge(&metrics);
            self.pending.extend(results);
        }
    }
}

impl<I> Iterator for ScoredStream<'_, I>
where
    I: Iterator<Item = Example>,
{
    type Item = (usize, Result<ExampleOutput>);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pending.is_empty() && !self.exhausted {
            self.refill();
        }
        self.pending.pop_front()
    }
}

/// Run one batch, scoring examples with targets and decoding the rest.
fn run_batch(
    engine: &BeamSearchEngine,
    batch: &[Example],
) -> (Vec<(usize, Result<ExampleOutput>)>, SearchMetrics) {
    let mut metrics = SearchMetrics::default();
    let mut slots: Vec<Option<Result<ExampleOutput>>> = batch.iter().map(|_| None).collect();

    let (scored, decoded): (Vec<usize>, Vec<usize>) =
        (0..batch.len()).partition(|&i| batch[i].target.is_some());

    if !scored.is_empty() {
        let pairs: Vec<(&[u32], &[u32])> = scored
            .iter()
            .map(|&i| (batch[i].source.as_slice(), batch[i].target.as_deref().unwrap_or_default()))
            .collect();
        let outcome = engine.score_batch(&pairs);
        metrics.merge(&outcome.metrics);
        for (&i, result) in scored.iter().zip(outcome.results) {
            slots[i] = Some(result.map(|h| ExampleOutput::Score(h.final_score)));
        }
    }
    if !decoded.is_empty() {
        let sources: Vec<&[u32]> = decoded.iter().map(|&i| batch[i].source.as_slice()).collect();
        let outcome = engine.decode_batch(&sources);
        metrics.merge(&outcome.metrics);
        for (&i, result) in decoded.iter().zip(outcome.results) {
            slots[i] = Some(result.map(ExampleOutput::Decoded));
        }
    }

    let results = batch
        .iter()
        .zip(slots)
        .filter_map(|(example, slot)| slot.map(|result| (example.id, result)))
        .collect();
    (results, metrics)
}
