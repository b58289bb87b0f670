//! Beam Search Engine.
//!
//! Every example of a batch is advanced in lockstep: one step issues exactly
//! one batched call per ensemble member, covering every live hypothesis of
//! every example that is still searching. Examples that finish or fail drop
//! out of later calls.
//!
//! Two entry points share the machinery:
//!
//! - [`BeamSearchEngine::decode_batch`] searches freely for the best output.
//! - [`BeamSearchEngine::score_batch`] follows a given target exactly
//!   (forced decoding, no branching) and reports its final score.

use crate::ensemble::{CombinationSpace, EnsembleCombiner};
use crate::hypothesis::{Beam, Hypothesis};
use crate::metrics::SearchMetrics;
use crate::penalty::HypothesisScorer;
use crate::port::{DecoderQuery, EncoderState, InferencePort, StepOutput};
use beamscore_common::{EnsembleWeights, PredictionConfig, Result, ScoreError, SpecialTokens};
use beamscore_logits::{mask_token, top_k};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

// ── Results ───────────────────────────────────────────────────────────────

/// Finished hypotheses of one example, best first. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    finished: Vec<Hypothesis>,
}

impl Decoded {
    fn new(finished: Vec<Hypothesis>) -> Option<Self> {
        if finished.is_empty() {
            None
        } else {
            Some(Self { finished })
        }
    }

    pub fn best(&self) -> &Hypothesis {
        &self.finished[0]
    }

    pub fn finished(&self) -> &[Hypothesis] {
        &self.finished
    }
}

/// Per-example results of one batch, in input order.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub results: Vec<Result<T>>,
    pub metrics: SearchMetrics,
}

impl<T> BatchOutcome<T> {
    /// Every example fails with the batch-level error.
    fn aborted(size: usize, err: &ScoreError, mut metrics: SearchMetrics) -> Self {
        warn!(examples = size, error = %err, "batch aborted");
        metrics.failures = size;
        let results =
            (0..size).map(|_| Err(ScoreError::decoding(format!("batch aborted: {err}")))).collect();
        Self { results, metrics }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────

/// One combined step row for a single live hypothesis.
struct StepRow {
    log_probs: Vec<f32>,
    alignment: Option<Vec<f32>>,
}

struct Candidate {
    parent: usize,
    token: u32,
    score: f32,
}

/// Ensemble beam search over a fixed set of models.
///
/// Immutable once built; safe to share across threads.
pub struct BeamSearchEngine {
    models: Vec<Arc<dyn InferencePort>>,
    combiner: EnsembleCombiner,
    scorer: HypothesisScorer,
    config: PredictionConfig,
    special: SpecialTokens,
    vocab_size: usize,
    early_stopping: bool,
}

impl std::fmt::Debug for BeamSearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeamSearchEngine")
            .field("models", &self.models.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("combiner", &self.combiner)
            .field("scorer", &self.scorer)
            .field("special", &self.special)
            .field("early_stopping", &self.early_stopping)
            .finish_non_exhaustive()
    }
}

impl BeamSearchEngine {
    /// Validate the configuration against the ensemble.
    ///
    /// # Errors
    ///
    /// `Configuration` when the config is invalid, there are no models,
    /// models disagree on vocabulary size, the weights do not match the
    /// models, the end token is outside the vocabulary, or alignments are
    /// required but no model can report them.
    pub fn new(
        models: Vec<Arc<dyn InferencePort>>,
        weights: EnsembleWeights,
        config: PredictionConfig,
        special: SpecialTokens,
    ) -> Result<Self> {
        let config = config.validated()?;
        let Some(first) = models.first() else {
            return Err(ScoreError::config("an ensemble needs at least one model"));
        };
        let vocab_size = first.vocab_size();
        if let Some(other) = models.iter().find(|m| m.vocab_size() != vocab_size) {
            return Err(ScoreError::config(format!(
                "model '{}' has a vocabulary of {} tokens but '{}' has {vocab_size}",
                other.name(),
                other.vocab_size(),
                first.name()
            )));
        }
        for (role, id) in [("start", special.start), ("end", special.end), ("unknown", special.unknown)] {
            if id as usize >= vocab_size {
                return Err(ScoreError::config(format!(
                    "{role} token {id} is outside the model vocabulary of {vocab_size} tokens"
                )));
            }
        }
        if config.needs_alignments() && !models.iter().any(|m| m.supports_alignments()) {
            return Err(ScoreError::config(
                "coverage_penalty and pos_unk need at least one model that reports alignments",
            ));
        }
        let space = CombinationSpace::for_normalize_probs(config.normalize_probs);
        let combiner = EnsembleCombiner::new(weights, models.len(), space)?;
        let scorer = HypothesisScorer::from_config(&config);
        Ok(Self { models, combiner, scorer, config, special, vocab_size, early_stopping: true })
    }

    /// Stop a beam once no live hypothesis can beat its worst finished one
    /// (on by default). Disabling it runs every beam to the length limit,
    /// which only costs port calls: the finished set is the same.
    #[must_use]
    pub fn with_early_stopping(mut self, enabled: bool) -> Self {
        self.early_stopping = enabled;
        self
    }

    pub const fn config(&self) -> &PredictionConfig {
        &self.config
    }

    pub const fn special_tokens(&self) -> SpecialTokens {
        self.special
    }

    pub const fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub const fn scorer(&self) -> &HypothesisScorer {
        &self.scorer
    }

    // ── Free decoding ─────────────────────────────────────────────────────

    /// Search for the best outputs of every source in the batch.
    pub fn decode_batch(&self, sources: &[&[u32]]) -> BatchOutcome<Decoded> {
        let start = Instant::now();
        let mut metrics = SearchMetrics::default();
        let encoders = match self.encode_all(sources) {
            Ok(encoders) => encoders,
            Err(err) => return BatchOutcome::aborted(sources.len(), &err, metrics),
        };

        let mut beams: Vec<Beam> = sources
            .iter()
            .map(|s| Beam::new(self.config.beam_size, self.config.bounds_for(s.len()), s.len()))
            .collect();
        let mut failures: Vec<Option<ScoreError>> = sources.iter().map(|_| None).collect();

        loop {
            // (example, live hypothesis) of every query row this step
            let slots: Vec<(usize, usize)> = beams
                .iter()
                .enumerate()
                .filter(|(e, beam)| !beam.is_done() && failures[*e].is_none())
                .flat_map(|(e, beam)| (0..beam.live().len()).map(move |h| (e, h)))
                .collect();
            if slots.is_empty() {
                break;
            }
            metrics.steps += 1;

            let prefixes: Vec<(usize, &[u32])> =
                slots.iter().map(|&(e, h)| (e, beams[e].live()[h].tokens.as_slice())).collect();
            let outputs = match self.run_models(&encoders, &prefixes, &mut metrics) {
                Ok(outputs) => outputs,
                Err(err) => return BatchOutcome::aborted(sources.len(), &err, metrics),
            };

            let mut rows: Vec<Vec<StepRow>> = beams.iter().map(|_| Vec::new()).collect();
            for (q, &(e, _)) in slots.iter().enumerate() {
                if failures[e].is_some() {
                    continue;
                }
                match self.combine_row(&outputs, q) {
                    Ok(row) => rows[e].push(row),
                    Err(err) => {
                        warn!(example = e, step = metrics.steps, error = %err, "example failed");
                        failures[e] = Some(err);
                    }
                }
            }
            for (e, example_rows) in rows.into_iter().enumerate() {
                if failures[e].is_none() && !example_rows.is_empty() {
                    self.advance(&mut beams[e], example_rows, &mut metrics);
                }
            }
        }

        let results: Vec<Result<Decoded>> = beams
            .into_iter()
            .zip(failures)
            .map(|(beam, failure)| match failure {
                Some(err) => Err(err),
                None => Decoded::new(beam.into_finished()).ok_or_else(|| {
                    ScoreError::decoding("no hypothesis survived the search")
                }),
            })
            .collect();
        self.finish_metrics(&mut metrics, &results, start, "decoded batch");
        BatchOutcome { results, metrics }
    }

    /// One search step for one example: rank candidates, move end tokens
    /// to the finished set, keep the best continuations live, and stop the
    /// beam at the length limit or when it cannot improve.
    fn advance(&self, beam: &mut Beam, mut rows: Vec<StepRow>, metrics: &mut SearchMetrics) {
        let bounds = beam.bounds();
        let width = beam.capacity();
        let eos = self.special.end;
        let keep_alignment = self.config.pos_unk;

        let mut candidates = Vec::with_capacity(rows.len() * 2 * width);
        for (h, (parent, row)) in beam.live().iter().zip(rows.iter_mut()).enumerate() {
            if parent.len() < bounds.min {
                mask_token(&mut row.log_probs, eos);
            }
            for (token, log_prob) in top_k(&row.log_probs, 2 * width) {
                candidates.push(Candidate { parent: h, token, score: parent.score + log_prob });
            }
        }
        metrics.expansions += candidates.len();
        // Stable: ties keep hypothesis order, then token order.
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let mut next_live = Vec::with_capacity(width);
        let mut newly_finished = Vec::new();
        for (rank, candidate) in candidates.iter().enumerate() {
            if rank >= width && next_live.len() >= width {
                break;
            }
            let parent = &beam.live()[candidate.parent];
            let alignment = rows[candidate.parent].alignment.as_deref();
            if candidate.token == eos {
                if rank < width {
                    let finished = parent
                        .extend(candidate.token, candidate.score, alignment, keep_alignment)
                        .finish(&self.scorer);
                    newly_finished.push(finished);
                }
            } else if next_live.len() < width {
                next_live.push(parent.extend(candidate.token, candidate.score, alignment, keep_alignment));
            }
        }
        metrics.pruned += candidates.len() - newly_finished.len() - next_live.len();

        for hypothesis in newly_finished {
            beam.push_finished(hypothesis);
        }
        let (at_limit, live): (Vec<_>, Vec<_>) =
            next_live.into_iter().partition(|h| h.len() >= bounds.max);
        for hypothesis in at_limit {
            metrics.forced_finishes += 1;
            beam.push_finished(hypothesis.finish(&self.scorer));
        }
        beam.set_live(live);
        if beam.is_done() || !self.early_stopping {
            return;
        }

        if let Some(worst) = beam.worst_finished() {
            let hopeless = beam
                .live()
                .iter()
                .all(|h| self.scorer.optimistic_bound(h.score, h.len(), bounds.max) <= worst);
            if hopeless {
                metrics.early_stops += 1;
                beam.mark_done();
            }
        }
    }

    // ── Forced decoding ───────────────────────────────────────────────────

    /// Score each `(source, target)` pair by following the target exactly.
    ///
    /// Issues one batched call per model per target position; the target is
    /// used as given (callers append the end token) and truncated when
    /// `pad_on_batch` is disabled.
    pub fn score_batch(&self, pairs: &[(&[u32], &[u32])]) -> BatchOutcome<Hypothesis> {
        let start = Instant::now();
        let mut metrics = SearchMetrics::default();
        let limit = self.config.target_truncation();
        let sources: Vec<&[u32]> = pairs.iter().map(|(source, _)| *source).collect();
        let targets: Vec<&[u32]> = pairs
            .iter()
            .map(|(_, target)| match limit {
                Some(n) => &target[..target.len().min(n)],
                None => *target,
            })
            .collect();
        let encoders = match self.encode_all(&sources) {
            Ok(encoders) => encoders,
            Err(err) => return BatchOutcome::aborted(pairs.len(), &err, metrics),
        };

        let keep_alignment = self.config.pos_unk;
        let mut hypotheses: Vec<Hypothesis> =
            sources.iter().map(|s| Hypothesis::root(s.len())).collect();
        let mut failures: Vec<Option<ScoreError>> = targets
            .iter()
            .map(|t| t.is_empty().then(|| ScoreError::decoding("target sequence is empty")))
            .collect();

        let steps = targets.iter().map(|t| t.len()).max().unwrap_or(0);
        for t in 0..steps {
            let slots: Vec<usize> =
                (0..pairs.len()).filter(|&e| failures[e].is_none() && t < targets[e].len()).collect();
            if slots.is_empty() {
                break;
            }
            metrics.steps += 1;

            let prefixes: Vec<(usize, &[u32])> =
                slots.iter().map(|&e| (e, &targets[e][..t])).collect();
            let outputs = match self.run_models(&encoders, &prefixes, &mut metrics) {
                Ok(outputs) => outputs,
                Err(err) => return BatchOutcome::aborted(pairs.len(), &err, metrics),
            };

            for (q, &e) in slots.iter().enumerate() {
                let token = targets[e][t];
                let step = self.combine_row(&outputs, q).and_then(|row| {
                    let log_prob = row.log_probs.get(token as usize).copied().ok_or_else(|| {
                        ScoreError::decoding(format!("target token {token} is outside the vocabulary"))
                    })?;
                    Ok((log_prob, row.alignment))
                });
                match step {
                    Ok((log_prob, alignment)) => {
                        metrics.expansions += 1;
                        let score = hypotheses[e].score + log_prob;
                        hypotheses[e] =
                            hypotheses[e].extend(token, score, alignment.as_deref(), keep_alignment);
                    }
                    Err(err) => {
                        warn!(example = e, step = t, error = %err, "example failed");
                        failures[e] = Some(err);
                    }
                }
            }
        }

        let results: Vec<Result<Hypothesis>> = hypotheses
            .into_iter()
            .zip(failures)
            .map(|(hypothesis, failure)| match failure {
                Some(err) => Err(err),
                None => Ok(hypothesis.finish(&self.scorer)),
            })
            .collect();
        self.finish_metrics(&mut metrics, &results, start, "scored batch");
        BatchOutcome { results, metrics }
    }

    // ── Shared step machinery ─────────────────────────────────────────────

    /// Encoder states indexed `[model][example]`.
    fn encode_all(&self, sources: &[&[u32]]) -> Result<Vec<Vec<EncoderState>>> {
        self.models
            .iter()
            .map(|model| sources.iter().map(|source| model.encode(source)).collect())
            .collect()
    }

    /// One batched call per model for the given `(example, prefix)` rows.
    fn run_models(
        &self,
        encoders: &[Vec<EncoderState>],
        prefixes: &[(usize, &[u32])],
        metrics: &mut SearchMetrics,
    ) -> Result<Vec<StepOutput>> {
        let with_alignments = self.config.needs_alignments();
        let mut outputs = Vec::with_capacity(self.models.len());
        for (model, states) in self.models.iter().zip(encoders) {
            let queries: Vec<DecoderQuery<'_>> =
                prefixes.iter().map(|&(e, prefix)| DecoderQuery::new(&states[e], prefix)).collect();
            metrics.port_calls += 1;
            let output = model
                .next_token_distribution(&queries, with_alignments && model.supports_alignments())?;
            output.check_shape(&queries, model.vocab_size(), model.name())?;
            outputs.push(output);
        }
        Ok(outputs)
    }

    /// Combine row `q` of every model's output.
    fn combine_row(&self, outputs: &[StepOutput], q: usize) -> Result<StepRow> {
        let rows: Vec<&[f32]> = outputs.iter().map(|o| o.distributions[q].as_slice()).collect();
        let log_probs = self.combiner.combine(&rows)?;
        let alignment = if self.config.needs_alignments() {
            let rows: Vec<Option<&[f32]>> = outputs
                .iter()
                .map(|o| o.alignments.as_ref().and_then(|a| a.get(q)).map(Vec::as_slice))
                .collect();
            let combined = self
                .combiner
                .combine_alignments(&rows)
                .ok_or_else(|| ScoreError::decoding("no model reported alignment weights"))?;
            Some(combined)
        } else {
            None
        };
        Ok(StepRow { log_probs, alignment })
    }

    fn finish_metrics<T>(
        &self,
        metrics: &mut SearchMetrics,
        results: &[Result<T>],
        start: Instant,
        what: &str,
    ) {
        metrics.failures = results.iter().filter(|r| r.is_err()).count();
        metrics.search_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            examples = results.len(),
            steps = metrics.steps,
            port_calls = metrics.port_calls,
            expansions = metrics.expansions,
            pruned = metrics.pruned,
            early_stops = metrics.early_stops,
            forced_finishes = metrics.forced_finishes,
            failures = metrics.failures,
            "{what}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    const EOS: u32 = 2;
    const WORD: u32 = 3;
    const SPECIAL: SpecialTokens = SpecialTokens { start: 1, end: EOS, unknown: 0 };

    /// Port whose rows are computed from each query by a closure.
    struct FnPort<F> {
        vocab: usize,
        calls: AtomicUsize,
        alignments: bool,
        row: F,
    }

    impl<F> FnPort<F>
    where
        F: Fn(&DecoderQuery<'_>) -> Vec<f32> + Send + Sync,
    {
        fn new(vocab: usize, row: F) -> Arc<Self> {
            Arc::new(Self { vocab, calls: AtomicUsize::new(0), alignments: false, row })
        }

        fn with_alignments(vocab: usize, row: F) -> Arc<Self> {
            Arc::new(Self { vocab, calls: AtomicUsize::new(0), alignments: true, row })
        }
    }

    impl<F> InferencePort for FnPort<F>
    where
        F: Fn(&DecoderQuery<'_>) -> Vec<f32> + Send + Sync,
    {
        fn name(&self) -> &str {
            "fn"
        }

        fn vocab_size(&self) -> usize {
            self.vocab
        }

        fn supports_alignments(&self) -> bool {
            self.alignments
        }

        fn next_token_distribution(
            &self,
            queries: &[DecoderQuery<'_>],
            with_alignments: bool,
        ) -> Result<StepOutput> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            let distributions = queries.iter().map(|q| (self.row)(q)).collect();
            let alignments = with_alignments.then(|| {
                queries
                    .iter()
                    .map(|q| {
                        let n = q.encoder.source_len();
                        (0..n).map(|j| if j == q.step().min(n.saturating_sub(1)) { 1.0 } else { 0.0 }).collect()
                    })
                    .collect()
            });
            Ok(StepOutput { distributions, alignments })
        }
    }

    struct FailingPort;

    impl InferencePort for FailingPort {
        fn name(&self) -> &str {
            "failing"
        }

        fn vocab_size(&self) -> usize {
            4
        }

        fn next_token_distribution(&self, _: &[DecoderQuery<'_>], _: bool) -> Result<StepOutput> {
            Err(ScoreError::decoding("device lost"))
        }
    }

    /// Favours `WORD` for two steps, then the end token.
    fn two_words(q: &DecoderQuery<'_>) -> Vec<f32> {
        if q.step() < 2 {
            vec![0.05, 0.05, 0.1, 0.8]
        } else {
            vec![0.05, 0.05, 0.8, 0.1]
        }
    }

    fn config(beam_size: usize) -> PredictionConfig {
        PredictionConfig {
            beam_size,
            max_length: 10,
            max_length_factor: None,
            min_length: 0,
            min_length_factor: None,
            ..Default::default()
        }
    }

    fn engine(models: Vec<Arc<dyn InferencePort>>, config: PredictionConfig) -> BeamSearchEngine {
        let weights = EnsembleWeights::uniform(models.len()).unwrap();
        BeamSearchEngine::new(models, weights, config, SPECIAL).unwrap()
    }

    #[test]
    fn greedy_search_follows_the_most_likely_path() {
        let engine = engine(vec![FnPort::new(4, two_words)], config(1));
        let outcome = engine.decode_batch(&[&[5, 6]]);
        let decoded = outcome.results.into_iter().next().unwrap().unwrap();
        assert_eq!(decoded.best().tokens, vec![WORD, WORD, EOS]);
        assert!(decoded.best().finished);
        assert_eq!(decoded.finished().len(), 1);
        assert_eq!(outcome.metrics.early_stops, 1);
    }

    #[test]
    fn min_length_masks_the_end_token() {
        let mut cfg = config(2);
        cfg.min_length = 3;
        let engine = engine(vec![FnPort::new(4, two_words)], cfg);
        let outcome = engine.decode_batch(&[&[5]]);
        let decoded = outcome.results.into_iter().next().unwrap().unwrap();
        for h in decoded.finished() {
            assert!(h.len() > 3, "{:?}", h.tokens);
        }
    }

    #[test]
    fn max_length_force_finishes_live_hypotheses() {
        let mut cfg = config(2);
        cfg.max_length = 4;
        let port = FnPort::new(4, |_: &DecoderQuery<'_>| vec![0.001, 0.001, 0.001, 0.997]);
        let engine = engine(vec![port], cfg);
        let outcome = engine.decode_batch(&[&[5]]);
        assert!(outcome.metrics.forced_finishes > 0);
        let decoded = outcome.results.into_iter().next().unwrap().unwrap();
        assert_eq!(decoded.best().tokens, vec![WORD; 4]);
        assert!(decoded.finished().iter().all(|h| h.len() <= 4));
    }

    #[test]
    fn degenerate_rows_only_fail_their_example() {
        let port = FnPort::new(4, |q: &DecoderQuery<'_>| {
            if q.encoder.tokens.first() == Some(&99) {
                vec![0.0; 4]
            } else {
                two_words(q)
            }
        });
        let engine = engine(vec![port], config(2));
        let outcome = engine.decode_batch(&[&[99], &[5]]);
        assert!(outcome.results[0].as_ref().unwrap_err().is_decoding());
        assert!(outcome.results[1].is_ok());
        assert_eq!(outcome.metrics.failures, 1);
    }

    #[test]
    fn port_failure_aborts_the_batch() {
        let engine = engine(vec![Arc::new(FailingPort)], config(2));
        let outcome = engine.decode_batch(&[&[5], &[6]]);
        assert!(outcome.results.iter().all(|r| r.as_ref().is_err_and(ScoreError::is_decoding)));
        assert_eq!(outcome.metrics.failures, 2);
    }

    #[test]
    fn lockstep_makes_one_call_per_model_per_step() {
        let a = FnPort::new(4, two_words);
        let b = FnPort::new(4, two_words);
        let engine = engine(vec![a.clone(), b.clone()], config(3));
        let outcome = engine.decode_batch(&[&[5], &[6, 7], &[8]]);
        let steps = outcome.metrics.steps;
        assert_eq!(a.calls.load(AtomicOrdering::SeqCst), steps);
        assert_eq!(b.calls.load(AtomicOrdering::SeqCst), steps);
        assert_eq!(outcome.metrics.port_calls, 2 * steps);
    }

    #[test]
    fn forced_decoding_sums_target_log_probs() {
        let port = FnPort::new(4, two_words);
        let engine = engine(vec![port.clone()], config(1));
        let target = [WORD, WORD, EOS];
        let outcome = engine.score_batch(&[(&[5, 6], &target)]);
        let hypothesis = outcome.results.into_iter().next().unwrap().unwrap();
        let expected = 0.8f32.ln() + 0.8f32.ln() + 0.8f32.ln();
        assert!((hypothesis.final_score - expected).abs() < 1e-5);
        assert_eq!(port.calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[test]
    fn forced_decoding_truncates_without_padding() {
        let mut cfg = config(1);
        cfg.pad_on_batch = false;
        cfg.state_below_max_length = 2;
        let engine = engine(vec![FnPort::new(4, two_words)], cfg);
        let outcome = engine.score_batch(&[(&[5], &[WORD, WORD, EOS])]);
        let hypothesis = outcome.results.into_iter().next().unwrap().unwrap();
        assert_eq!(hypothesis.tokens, vec![WORD, WORD]);
    }

    #[test]
    fn forced_decoding_rejects_out_of_vocabulary_targets() {
        let engine = engine(vec![FnPort::new(4, two_words)], config(1));
        let outcome = engine.score_batch(&[(&[5], &[WORD, 17]), (&[5], &[])]);
        assert!(outcome.results[0].as_ref().unwrap_err().is_decoding());
        assert!(outcome.results[1].as_ref().unwrap_err().is_decoding());
    }

    #[test]
    fn full_coverage_leaves_the_score_unchanged() {
        let mut cfg = config(1);
        cfg.coverage_penalty = true;
        cfg.coverage_norm_factor = 0.7;
        let engine = engine(vec![FnPort::with_alignments(4, two_words)], cfg);
        let outcome = engine.score_batch(&[(&[5, 6], &[WORD, WORD])]);
        let hypothesis = outcome.results.into_iter().next().unwrap().unwrap();
        assert_eq!(hypothesis.coverage, vec![1.0, 1.0]);
        assert_eq!(hypothesis.final_score.to_bits(), hypothesis.score.to_bits());
    }

    #[test]
    fn partial_coverage_lowers_the_score() {
        let mut cfg = config(1);
        cfg.coverage_penalty = true;
        cfg.coverage_norm_factor = 0.7;
        let engine = engine(vec![FnPort::with_alignments(4, two_words)], cfg);
        let outcome = engine.score_batch(&[(&[5, 6, 7], &[WORD])]);
        let hypothesis = outcome.results.into_iter().next().unwrap().unwrap();
        assert!(hypothesis.final_score < hypothesis.score);
    }

    #[test]
    fn pos_unk_keeps_alignment_history() {
        let mut cfg = config(1);
        cfg.pos_unk = true;
        let engine = engine(vec![FnPort::with_alignments(4, two_words)], cfg);
        let outcome = engine.decode_batch(&[&[5, 6, 7]]);
        let decoded = outcome.results.into_iter().next().unwrap().unwrap();
        assert_eq!(decoded.best().alignments.len(), decoded.best().len());
    }

    #[test]
    fn construction_rejects_bad_ensembles() {
        let none = BeamSearchEngine::new(
            Vec::new(),
            EnsembleWeights::uniform(1).unwrap(),
            config(1),
            SPECIAL,
        );
        assert!(none.unwrap_err().is_configuration());

        let mismatch = BeamSearchEngine::new(
            vec![FnPort::new(4, two_words), FnPort::new(5, |_: &DecoderQuery<'_>| vec![0.2; 5])],
            EnsembleWeights::uniform(2).unwrap(),
            config(1),
            SPECIAL,
        );
        assert!(mismatch.unwrap_err().is_configuration());

        let weights = BeamSearchEngine::new(
            vec![FnPort::new(4, two_words)],
            EnsembleWeights::uniform(2).unwrap(),
            config(1),
            SPECIAL,
        );
        assert!(weights.unwrap_err().is_configuration());

        let mut cfg = config(1);
        cfg.coverage_penalty = true;
        let alignments = BeamSearchEngine::new(
            vec![FnPort::new(4, two_words)],
            EnsembleWeights::uniform(1).unwrap(),
            cfg,
            SPECIAL,
        );
        assert!(alignments.unwrap_err().is_configuration());
    }
}
