//! Tokenization schemes.

use beamscore_common::{Result, ScoreError, Tokenizer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Piece standing for a space in character tokenization.
pub const SPACE_PIECE: &str = "<space>";

/// Tokenization scheme named in the `[data]` configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizationMethod {
    /// Split on runs of whitespace.
    #[default]
    Whitespace,
    /// One piece per character; spaces become [`SPACE_PIECE`].
    Characters,
}

impl std::str::FromStr for TokenizationMethod {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "whitespace" => Ok(Self::Whitespace),
            "characters" | "chars" => Ok(Self::Characters),
            other => Err(ScoreError::config(format!(
                "unknown tokenization method '{other}'. Expected one of: whitespace, characters"
            ))),
        }
    }
}

impl std::fmt::Display for TokenizationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whitespace => write!(f, "whitespace"),
            Self::Characters => write!(f, "characters"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn name(&self) -> &'static str {
        "whitespace"
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn detokenize(&self, pieces: &[String]) -> String {
        pieces.join(" ")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterTokenizer;

impl Tokenizer for CharacterTokenizer {
    fn name(&self) -> &'static str {
        "characters"
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut pieces = Vec::with_capacity(text.len());
        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                pieces.push(SPACE_PIECE.to_string());
            }
            pieces.extend(word.chars().map(String::from));
        }
        pieces
    }

    fn detokenize(&self, pieces: &[String]) -> String {
        pieces.iter().map(|p| if p == SPACE_PIECE { " " } else { p.as_str() }).collect()
    }
}

/// The tokenizer implementing `method`.
pub fn build_tokenizer(method: TokenizationMethod) -> Arc<dyn Tokenizer> {
    match method {
        TokenizationMethod::Whitespace => Arc::new(WhitespaceTokenizer),
        TokenizationMethod::Characters => Arc::new(CharacterTokenizer),
    }
}
