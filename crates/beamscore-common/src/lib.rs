//! Common types and contracts for beamscore
//!
//! This crate holds what every other beamscore crate agrees on: the error
//! taxonomy, the immutable prediction configuration, ensemble weights and
//! the vocabulary/tokenizer capability traits consumed by the search engine.

pub mod config;
pub mod error;
pub mod vocab;
pub mod weights;

pub use config::{LengthBounds, LengthNormalization, PredictionConfig};
pub use error::{ErrorKind, Result, ScoreError};
pub use vocab::{SpecialTokens, Tokenizer, Vocabulary};
pub use weights::EnsembleWeights;
