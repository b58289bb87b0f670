//! Model Inference Port.
//!
//! Every ensemble member is reached through [`InferencePort`]. Calls are
//! batched: the engine sends one query per live hypothesis of every active
//! example and expects one row back per query, in order.

use beamscore_common::{Result, ScoreError};

/// Per-example encoder output, produced once by [`InferencePort::encode`]
/// and passed back unchanged with every decoder query.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderState {
    /// Source token ids.
    pub tokens: Vec<u32>,
    /// Opaque model-specific memory. Empty for models that need none.
    pub memory: Vec<f32>,
}

impl EncoderState {
    pub const fn new(tokens: Vec<u32>) -> Self {
        Self { tokens, memory: Vec::new() }
    }

    pub fn source_len(&self) -> usize {
        self.tokens.len()
    }
}

/// One row of a batched next-token request.
#[derive(Debug, Clone, Copy)]
pub struct DecoderQuery<'a> {
    pub encoder: &'a EncoderState,
    /// Tokens emitted so far, without a start marker.
    pub prefix: &'a [u32],
}

impl<'a> DecoderQuery<'a> {
    pub const fn new(encoder: &'a EncoderState, prefix: &'a [u32]) -> Self {
        Self { encoder, prefix }
    }

    /// Decoding step this query asks about (the prefix length).
    pub const fn step(&self) -> usize {
        self.prefix.len()
    }
}

/// Result of one batched call: a probability row per query and, when
/// requested and supported, an alignment row over source positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    pub distributions: Vec<Vec<f32>>,
    pub alignments: Option<Vec<Vec<f32>>>,
}

impl StepOutput {
    /// Reject outputs whose row count or widths disagree with the request.
    pub fn check_shape(&self, queries: &[DecoderQuery<'_>], vocab_size: usize, model: &str) -> Result<()> {
        if self.distributions.len() != queries.len() {
            return Err(ScoreError::decoding(format!(
                "model '{model}' returned {} rows for {} queries",
                self.distributions.len(),
                queries.len()
            )));
        }
        if let Some(row) = self.distributions.iter().position(|r| r.len() != vocab_size) {
            return Err(ScoreError::decoding(format!(
                "model '{model}' returned a row of width {} (expected {vocab_size}) at position {row}",
                self.distributions[row].len()
            )));
        }
        if let Some(alignments) = &self.alignments {
            if alignments.len() != queries.len() {
                return Err(ScoreError::decoding(format!(
                    "model '{model}' returned {} alignment rows for {} queries",
                    alignments.len(),
                    queries.len()
                )));
            }
            for (row, (alignment, query)) in alignments.iter().zip(queries).enumerate() {
                if alignment.len() != query.encoder.source_len() {
                    return Err(ScoreError::decoding(format!(
                        "model '{model}' returned an alignment of width {} for a source of {} tokens at position {row}",
                        alignment.len(),
                        query.encoder.source_len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One trained model, queried one decoding step at a time.
///
/// Implementations must be stateless between calls apart from what they put
/// in the [`EncoderState`]; the engine may interleave queries for unrelated
/// examples in any order.
pub trait InferencePort: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Width of every distribution this model returns.
    fn vocab_size(&self) -> usize;

    /// Whether the model can report alignment weights.
    fn supports_alignments(&self) -> bool {
        false
    }

    /// Encode one source sequence.
    fn encode(&self, source: &[u32]) -> Result<EncoderState> {
        Ok(EncoderState::new(source.to_vec()))
    }

    /// Next-token probabilities for every query, in query order.
    ///
    /// Alignment rows are only expected when `with_alignments` is set and the
    /// model [supports them](Self::supports_alignments).
    fn next_token_distribution(
        &self,
        queries: &[DecoderQuery<'_>],
        with_alignments: bool,
    ) -> Result<StepOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_step_is_prefix_length() {
        let state = EncoderState::new(vec![4, 5, 6]);
        let query = DecoderQuery::new(&state, &[1, 2]);
        assert_eq!(query.step(), 2);
        assert_eq!(query.encoder.source_len(), 3);
    }

    #[test]
    fn shape_check_rejects_missing_rows() {
        let state = EncoderState::new(vec![1]);
        let queries = [DecoderQuery::new(&state, &[]), DecoderQuery::new(&state, &[3])];
        let output = StepOutput { distributions: vec![vec![0.5, 0.5]], alignments: None };
        let err = output.check_shape(&queries, 2, "m").unwrap_err();
        assert!(err.is_decoding());
        assert!(err.to_string().contains("1 rows for 2 queries"), "{err}");
    }

    #[test]
    fn shape_check_rejects_wrong_width() {
        let state = EncoderState::new(vec![1]);
        let queries = [DecoderQuery::new(&state, &[])];
        let output = StepOutput { distributions: vec![vec![1.0]], alignments: None };
        assert!(output.check_shape(&queries, 2, "m").is_err());
    }

    #[test]
    fn shape_check_rejects_misaligned_attention() {
        let state = EncoderState::new(vec![1, 2]);
        let queries = [DecoderQuery::new(&state, &[])];
        let output =
            StepOutput { distributions: vec![vec![0.5, 0.5]], alignments: Some(vec![vec![1.0]]) };
        assert!(output.check_shape(&queries, 2, "m").is_err());
    }

    #[test]
    fn shape_check_accepts_consistent_output() {
        let state = EncoderState::new(vec![1, 2]);
        let queries = [DecoderQuery::new(&state, &[])];
        let output = StepOutput {
            distributions: vec![vec![0.5, 0.5]],
            alignments: Some(vec![vec![0.25, 0.75]]),
        };
        assert!(output.check_shape(&queries, 2, "m").is_ok());
    }
}
