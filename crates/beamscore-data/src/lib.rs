//! Data collaborators of the scoring engine.
//!
//! - [`tokenize`]: the tokenization schemes, chosen once per run.
//! - [`vocab`]: JSON vocabularies with their marker tokens.
//! - [`dataset`]: named splits of source and optional target text.
//! - [`output`]: writing results as text lines or a `.npy` array.

pub mod dataset;
pub mod output;
pub mod tokenize;
pub mod vocab;

pub use dataset::{load_unk_mapping, DataConfig, Dataset, Split};
pub use output::{save_results, split_destination, write_list, write_npy, ResultRecord, SaveMode};
pub use tokenize::{build_tokenizer, CharacterTokenizer, TokenizationMethod, WhitespaceTokenizer};
pub use vocab::JsonVocabulary;
