//! Result serialization.

use beamscore_common::{Result, ScoreError};
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// How results are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// One result per line.
    #[default]
    List,
    /// Little-endian `float32` `.npy` array of scores.
    Numpy,
}

impl std::str::FromStr for SaveMode {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "list" => Ok(Self::List),
            "numpy" => Ok(Self::Numpy),
            other => Err(ScoreError::config(format!(
                "the sampling mode '{other}' is not currently supported. Expected one of: list, numpy"
            ))),
        }
    }
}

impl std::fmt::Display for SaveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Numpy => write!(f, "numpy"),
        }
    }
}

/// One line of output.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRecord {
    Score(f32),
    /// Detokenized hypothesis of a free search.
    Text(String),
    /// The example failed to decode.
    Failed,
}

impl ResultRecord {
    fn as_score(&self) -> Result<f32> {
        match self {
            Self::Score(score) => Ok(*score),
            Self::Failed => Ok(f32::NAN),
            Self::Text(_) => Err(ScoreError::config(
                "numpy output holds scores only; decoded hypotheses need the list mode",
            )),
        }
    }
}

impl std::fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Score(score) if score.is_nan() => write!(f, "nan"),
            Self::Score(score) => write!(f, "{score}"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Failed => write!(f, "nan"),
        }
    }
}

/// Destination for `split` when `split_count` splits share one `dest`.
///
/// A single split writes to `dest` itself; otherwise the split name is
/// inserted before the extension (`out.npy` becomes `out.val.npy`).
pub fn split_destination(dest: &Path, split: &str, split_count: usize) -> PathBuf {
    if split_count <= 1 {
        return dest.to_path_buf();
    }
    let stem = dest.file_stem().map_or_else(|| "results".into(), |s| s.to_string_lossy().into_owned());
    let name = match dest.extension() {
        Some(ext) => format!("{stem}.{split}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{split}"),
    };
    dest.with_file_name(name)
}

pub fn write_list<W: Write>(records: &[ResultRecord], mut out: W) -> std::io::Result<()> {
    for record in records {
        writeln!(out, "{record}")?;
    }
    out.flush()
}

/// Write scores as a version 1.0 `.npy` file of shape `(n,)`.
pub fn write_npy<W: Write>(scores: &[f32], mut out: W) -> std::io::Result<()> {
    let mut header =
        format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({},), }}", scores.len());
    // magic (6) + version (2) + header length (2) + header, padded to 64
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');
    let header_len = u16::try_from(header.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "npy header too long"))?;

    out.write_all(b"\x93NUMPY\x01\x00")?;
    out.write_all(&header_len.to_le_bytes())?;
    out.write_all(header.as_bytes())?;
    for score in scores {
        out.write_all(&score.to_le_bytes())?;
    }
    out.flush()
}

/// Write `records` in `mode` to `dest`, or to stdout one per line.
pub fn save_results(records: &[ResultRecord], mode: SaveMode, dest: Option<&Path>) -> Result<()> {
    let Some(dest) = dest else {
        let stdout = std::io::stdout();
        return write_list(records, stdout.lock()).map_err(|e| ScoreError::io("<stdout>", e));
    };
    let file = std::fs::File::create(dest).map_err(|e| ScoreError::io(dest, e))?;
    let out = BufWriter::new(file);
    match mode {
        SaveMode::List => write_list(records, out),
        SaveMode::Numpy => {
            let scores = records.iter().map(ResultRecord::as_score).collect::<Result<Vec<_>>>()?;
            write_npy(&scores, out)
        }
    }
    .map_err(|e| ScoreError::io(dest, e))?;
    info!("Saved {} result(s) to {} ({mode})", records.len(), dest.display());
    Ok(())
}
