//! Unknown-token replacement from alignments.
//!
//! A post-hoc rewrite of a finished hypothesis: every unknown-token
//! placeholder is replaced by the source word it attended to most, optionally
//! translated through a word mapping. Scores are not touched.

use crate::hypothesis::Hypothesis;
use beamscore_common::Vocabulary;
use beamscore_logits::argmax;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct UnknownResolver {
    mapping: HashMap<String, String>,
}

impl UnknownResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate aligned source words through `mapping` before copying them.
    pub fn with_mapping(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }

    /// Target pieces of `hypothesis` with placeholders replaced.
    ///
    /// Start and end markers are dropped. A placeholder without an alignment
    /// row, or aligned past the end of `source_words`, is left as the
    /// vocabulary's unknown piece.
    pub fn resolve(
        &self,
        hypothesis: &Hypothesis,
        source_words: &[String],
        vocab: &dyn Vocabulary,
    ) -> Vec<String> {
        let special = vocab.special_tokens();
        hypothesis
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, &id)| id != special.start && id != special.end)
            .map(|(step, &id)| {
                let fallback = || vocab.piece(id).unwrap_or("<unk>").to_string();
                if id != special.unknown {
                    return fallback();
                }
                let Some(row) = hypothesis.alignments.get(step) else {
                    return fallback();
                };
                match source_words.get(argmax(row)) {
                    Some(word) => self.mapping.get(word).unwrap_or(word).clone(),
                    None => fallback(),
                }
            })
            .collect()
    }
}
