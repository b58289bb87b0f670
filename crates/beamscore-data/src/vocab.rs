//! JSON vocabularies.

use beamscore_common::{Result, ScoreError, SpecialTokens, Vocabulary};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VocabFile {
    tokens: Vec<String>,
    unk: String,
    bos: String,
    eos: String,
    #[serde(default)]
    pad: Option<String>,
}

/// Token list with marker pieces, loaded from
/// `{"tokens": [...], "unk": .., "bos": .., "eos": .., "pad": ..}`.
#[derive(Debug, Clone)]
pub struct JsonVocabulary {
    tokens: Vec<String>,
    index: HashMap<String, u32>,
    special: SpecialTokens,
    pad: Option<u32>,
}

impl JsonVocabulary {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScoreError::io(path, e))?;
        Self::from_json(&text).map_err(|e| match e {
            ScoreError::Configuration(msg) => {
                ScoreError::config(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let file: VocabFile = serde_json::from_str(text)?;
        Self::new(file.tokens, &file.unk, &file.bos, &file.eos, file.pad.as_deref())
    }

    /// Build from a token list; every marker must be one of `tokens`.
    pub fn new(tokens: Vec<String>, unk: &str, bos: &str, eos: &str, pad: Option<&str>) -> Result<Self> {
        let mut index = HashMap::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            let id = u32::try_from(i)
                .map_err(|_| ScoreError::config("vocabulary has more than u32::MAX tokens"))?;
            if index.insert(token.clone(), id).is_some() {
                return Err(ScoreError::config(format!("duplicate vocabulary token '{token}'")));
            }
        }
        let lookup = |role: &str, piece: &str| {
            index.get(piece).copied().ok_or_else(|| {
                ScoreError::config(format!("{role} token '{piece}' is not in the vocabulary"))
            })
        };
        let special = SpecialTokens {
            start: lookup("bos", bos)?,
            end: lookup("eos", eos)?,
            unknown: lookup("unk", unk)?,
        };
        let pad = pad.map(|p| lookup("pad", p)).transpose()?;
        Ok(Self { tokens, index, special, pad })
    }

    pub const fn pad(&self) -> Option<u32> {
        self.pad
    }
}

impl Vocabulary for JsonVocabulary {
    fn token_id(&self, piece: &str) -> Option<u32> {
        self.index.get(piece).copied()
    }

    fn piece(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    fn vocab_size(&self) -> usize {
        self.tokens.len()
    }

    fn special_tokens(&self) -> SpecialTokens {
        self.special
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{"tokens": ["<pad>", "<unk>", "<s>", "</s>", "hola"],
        "unk": "<unk>", "bos": "<s>", "eos": "</s>", "pad": "<pad>"}"#;

    #[test]
    fn markers_resolve_to_ids() {
        let v = JsonVocabulary::from_json(JSON).unwrap();
        assert_eq!(v.special_tokens(), SpecialTokens { start: 2, end: 3, unknown: 1 });
        assert_eq!(v.pad(), Some(0));
        assert_eq!(v.vocab_size(), 5);
        assert_eq!(v.token_id("hola"), Some(4));
        assert_eq!(v.piece(4), Some("hola"));
    }

    #[test]
    fn missing_marker_is_a_configuration_error() {
        let err = JsonVocabulary::new(vec!["a".into()], "<unk>", "a", "a", None).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("unk token"), "{err}");
    }

    #[test]
    fn duplicates_are_rejected() {
        let tokens = vec!["a".to_string(), "a".to_string()];
        assert!(JsonVocabulary::new(tokens, "a", "a", "a", None).is_err());
    }

    #[test]
    fn encode_uses_unknown_for_oov() {
        let v = JsonVocabulary::from_json(JSON).unwrap();
        assert_eq!(v.encode(&["hola".to_string(), "adios".to_string()]), vec![4, 1]);
    }
}
