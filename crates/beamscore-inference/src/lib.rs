//! Ensemble beam-search decoding and scoring.
//!
//! The crate is organised leaves first:
//!
//! - [`port`]: the contract every ensemble member implements.
//! - [`ensemble`]: merges per-model next-token distributions.
//! - [`hypothesis`] and [`penalty`]: search state and finalisation rules.
//! - [`engine`]: the lockstep batch beam search and forced decoding.
//! - [`pos_unk`]: post-hoc unknown-token replacement from alignments.
//! - [`driver`]: batches examples and yields results lazily.

pub mod driver;
pub mod engine;
pub mod ensemble;
pub mod hypothesis;
pub mod metrics;
pub mod penalty;
pub mod port;
pub mod pos_unk;

pub use driver::{Example, ExampleOutput, ScoredStream, ScoringDriver};
pub use engine::{BatchOutcome, BeamSearchEngine, Decoded};
pub use ensemble::{CombinationSpace, EnsembleCombiner};
pub use hypothesis::{Beam, Hypothesis};
pub use metrics::SearchMetrics;
pub use penalty::{CoveragePenalty, HypothesisScorer, LengthPenalty};
pub use port::{DecoderQuery, EncoderState, InferencePort, StepOutput};
pub use pos_unk::UnknownResolver;
