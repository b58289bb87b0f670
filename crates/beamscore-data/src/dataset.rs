//! Datasets: vocabularies plus named splits of sentence-per-line text.
//!
//! A dataset directory holds `source_vocab.json`, `target_vocab.json` and,
//! per split, `<split>.src` with an optional `<split>.trg`.

use crate::tokenize::TokenizationMethod;
use crate::vocab::JsonVocabulary;
use beamscore_common::{Result, ScoreError, Tokenizer, Vocabulary};
use beamscore_inference::Example;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SOURCE_VOCAB_FILE: &str = "source_vocab.json";
pub const TARGET_VOCAB_FILE: &str = "target_vocab.json";

/// `[data]` section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub tokenization: TokenizationMethod,
    /// JSON object mapping source words to target words for pos_unk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unk_mapping: Option<PathBuf>,
}

/// Raw sentences of one split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    pub source: Vec<String>,
    pub target: Option<Vec<String>>,
}

impl Split {
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub const fn has_targets(&self) -> bool {
        self.target.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub source_vocab: JsonVocabulary,
    pub target_vocab: JsonVocabulary,
    splits: BTreeMap<String, Split>,
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| ScoreError::io(path, e))?;
    Ok(text.lines().map(str::to_string).collect())
}

fn check_aligned(split: &str, source: &[String], target: Option<&Vec<String>>) -> Result<()> {
    match target {
        Some(target) if target.len() != source.len() => Err(ScoreError::config(format!(
            "split '{split}' has {} source lines but {} target lines",
            source.len(),
            target.len()
        ))),
        _ => Ok(()),
    }
}

impl Dataset {
    /// Load the vocabularies and the named splits from `dir`.
    ///
    /// A split without a `.src` file is an `Io` error; a `.trg` file is
    /// optional.
    pub fn open<P: AsRef<Path>>(dir: P, splits: &[String]) -> Result<Self> {
        let dir = dir.as_ref();
        info!("Loading dataset from: {}", dir.display());
        let source_vocab = JsonVocabulary::from_file(dir.join(SOURCE_VOCAB_FILE))?;
        let target_vocab = JsonVocabulary::from_file(dir.join(TARGET_VOCAB_FILE))?;

        let mut loaded = BTreeMap::new();
        for name in splits {
            let source = read_lines(&dir.join(format!("{name}.src")))?;
            let trg_path = dir.join(format!("{name}.trg"));
            let target = if trg_path.is_file() { Some(read_lines(&trg_path)?) } else { None };
            check_aligned(name, &source, target.as_ref())?;
            debug!(split = %name, sentences = source.len(), targets = target.is_some(), "split loaded");
            loaded.insert(name.clone(), Split { source, target });
        }
        Ok(Self { source_vocab, target_vocab, splits: loaded })
    }

    /// Dataset built from in-memory parts.
    pub fn from_parts(
        source_vocab: JsonVocabulary,
        target_vocab: JsonVocabulary,
        splits: BTreeMap<String, Split>,
    ) -> Result<Self> {
        for (name, split) in &splits {
            check_aligned(name, &split.source, split.target.as_ref())?;
        }
        Ok(Self { source_vocab, target_vocab, splits })
    }

    /// Replace the text of every named split with the given files.
    ///
    /// Without a target file the splits keep no targets, so they are
    /// decoded rather than scored.
    pub fn override_from_files(
        &mut self,
        splits: &[String],
        source: &Path,
        target: Option<&Path>,
    ) -> Result<()> {
        let source_lines = read_lines(source)?;
        let target_lines = target.map(read_lines).transpose()?;
        for name in splits {
            check_aligned(name, &source_lines, target_lines.as_ref())?;
            info!(split = %name, source = %source.display(), "overriding split text from file");
            self.splits.insert(
                name.clone(),
                Split { source: source_lines.clone(), target: target_lines.clone() },
            );
        }
        Ok(())
    }

    pub fn split(&self, name: &str) -> Result<&Split> {
        self.splits
            .get(name)
            .ok_or_else(|| ScoreError::config(format!("split '{name}' is not in the dataset")))
    }

    pub fn split_names(&self) -> impl Iterator<Item = &str> {
        self.splits.keys().map(String::as_str)
    }

    /// Tokenized examples of a split, ids assigned by line number.
    ///
    /// Targets carry the end token so the forced path scores termination.
    pub fn examples(&self, name: &str, tokenizer: &dyn Tokenizer) -> Result<Vec<Example>> {
        let split = self.split(name)?;
        let eos = self.target_vocab.special_tokens().end;
        let examples = split
            .source
            .iter()
            .enumerate()
            .map(|(id, line)| {
                let source = self.source_vocab.encode(&tokenizer.tokenize(line));
                match &split.target {
                    Some(targets) => {
                        let line = targets.get(id).map_or("", String::as_str);
                        let mut target = self.target_vocab.encode(&tokenizer.tokenize(line));
                        target.push(eos);
                        Example::score(id, source, target)
                    }
                    None => Example::decode(id, source),
                }
            })
            .collect();
        Ok(examples)
    }

    /// Source words of every sentence of a split, for unknown-word replacement.
    pub fn source_words(&self, name: &str, tokenizer: &dyn Tokenizer) -> Result<Vec<Vec<String>>> {
        Ok(self.split(name)?.source.iter().map(|line| tokenizer.tokenize(line)).collect())
    }
}

/// Read a pos_unk dictionary: a flat JSON object of strings.
pub fn load_unk_mapping<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ScoreError::io(path, e))?;
    let mapping: HashMap<String, String> = serde_json::from_str(&text).map_err(|e| {
        ScoreError::config(format!("{} is not a valid unk mapping: {e}", path.display()))
    })?;
    debug!(entries = mapping.len(), "unk mapping loaded");
    Ok(mapping)
}
