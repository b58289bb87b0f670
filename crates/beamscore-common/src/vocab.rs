//! Vocabulary and tokenizer capability traits.
//!
//! The search engine only ever sees token ids. These traits are the seam
//! through which datasets turn text into ids and back, and through which
//! the engine learns the start, end and unknown markers.

/// Splits raw text into word pieces and joins them back.
///
/// One implementation per tokenization scheme, chosen once when the run is
/// configured.
pub trait Tokenizer: Send + Sync {
    /// Short identifier used in logs and configuration files.
    fn name(&self) -> &'static str;

    fn tokenize(&self, text: &str) -> Vec<String>;

    fn detokenize(&self, pieces: &[String]) -> String;
}

/// Mapping between word pieces and token ids.
pub trait Vocabulary: Send + Sync {
    fn token_id(&self, piece: &str) -> Option<u32>;

    fn piece(&self, id: u32) -> Option<&str>;

    fn vocab_size(&self) -> usize;

    fn special_tokens(&self) -> SpecialTokens;

    /// Map pieces to ids, falling back to the unknown id.
    fn encode(&self, pieces: &[String]) -> Vec<u32> {
        let unk = self.special_tokens().unknown;
        pieces.iter().map(|p| self.token_id(p).unwrap_or(unk)).collect()
    }

    /// Map ids back to pieces, skipping the start and end markers.
    fn decode(&self, ids: &[u32]) -> Vec<String> {
        let special = self.special_tokens();
        ids.iter()
            .filter(|&&id| id != special.start && id != special.end)
            .map(|&id| self.piece(id).unwrap_or("<unk>").to_string())
            .collect()
    }
}

/// Marker token ids the engine needs from the target vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub start: u32,
    pub end: u32,
    pub unknown: u32,
}
