//! End-to-end runs of `beamscore score` over small on-disk fixtures.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const VOCAB: &str = r#"{"tokens": ["<pad>", "<unk>", "<s>", "</s>", "a", "b"],
    "unk": "<unk>", "bos": "<s>", "eos": "</s>", "pad": "<pad>"}"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Dataset with a scored `val` split and an unscored `test` split.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("source_vocab.json"), VOCAB).unwrap();
        fs::write(data.join("target_vocab.json"), VOCAB).unwrap();
        fs::write(data.join("val.src"), "a b\nb\na a b\n").unwrap();
        fs::write(data.join("val.trg"), "a b\nb\na b\n").unwrap();
        fs::write(data.join("test.src"), "a\nb a\n").unwrap();
        Self { dir }
    }

    fn data(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn model(&self, name: &str, eos_logit: f32) -> PathBuf {
        let rows: Vec<String> = (0..6)
            .map(|row| {
                let logits: Vec<String> = (0..6)
                    .map(|col| match col {
                        3 => eos_logit.to_string(),
                        4 | 5 if col != row => "1.0".to_string(),
                        _ => "0.0".to_string(),
                    })
                    .collect();
                format!("[{}]", logits.join(", "))
            })
            .collect();
        let json = format!(
            r#"{{"name": "{name}", "vocab_size": 6, "start_token": 2, "transitions": [{}], "source_bias": 0.5}}"#,
            rows.join(", ")
        );
        let path = self.dir.path().join(format!("{name}.json"));
        fs::write(&path, json).unwrap();
        path
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn beamscore() -> Command {
    let mut cmd = Command::cargo_bin("beamscore").unwrap();
    cmd.env_remove("RUST_LOG").arg("--quiet");
    cmd
}

fn read_scores(path: &Path) -> Vec<f32> {
    fs::read_to_string(path).unwrap().lines().map(|l| l.parse().unwrap()).collect()
}

#[test]
fn scores_the_validation_split_as_a_list() {
    let fx = Fixture::new();
    let dest = fx.path("scores.txt");
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .arg("--dest")
        .arg(&dest)
        .assert()
        .success();

    let scores = read_scores(&dest);
    assert_eq!(scores.len(), 3);
    assert!(scores.iter().all(|s| s.is_finite() && *s < 0.0), "{scores:?}");
}

#[test]
fn results_go_to_stdout_without_dest() {
    let fx = Fixture::new();
    let assert = beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert_eq!(stdout.lines().count(), 3);
}

#[test]
fn weighted_ensemble_writes_numpy() {
    let fx = Fixture::new();
    let dest = fx.path("scores.npy");
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .arg(fx.model("m2", 1.5))
        .args(["--weights", "0.7", "0.3", "--save-mode", "numpy", "--dest"])
        .arg(&dest)
        .assert()
        .success();

    let bytes = fs::read(&dest).unwrap();
    assert!(bytes.starts_with(b"\x93NUMPY\x01\x00"));
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    assert_eq!(bytes.len(), 10 + header_len + 3 * 4);
}

#[test]
fn decodes_splits_without_targets() {
    let fx = Fixture::new();
    let dest = fx.path("out.txt");
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .args(["--splits", "val", "test", "--beam-size", "2", "--dest"])
        .arg(&dest)
        .assert()
        .success();

    assert_eq!(read_scores(&fx.path("out.val.txt")).len(), 3);
    let decoded = fs::read_to_string(fx.path("out.test.txt")).unwrap();
    assert_eq!(decoded.lines().count(), 2);
    assert!(decoded.lines().all(|l| l.split_whitespace().all(|w| w == "a" || w == "b")), "{decoded}");
}

#[test]
fn source_override_decodes_new_text() {
    let fx = Fixture::new();
    let source = fx.path("new.src");
    fs::write(&source, "b b\na\nb\na b a\n").unwrap();
    let assert = beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .arg("--source")
        .arg(&source)
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert_eq!(stdout.lines().count(), 4);
}

#[test]
fn weight_count_mismatch_is_a_configuration_failure() {
    let fx = Fixture::new();
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .arg(fx.model("m2", 0.5))
        .args(["--weights", "1.0"])
        .assert()
        .code(2);
}

#[test]
fn target_without_source_is_a_configuration_failure() {
    let fx = Fixture::new();
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .arg("--target")
        .arg(fx.path("whatever.trg"))
        .assert()
        .code(2);
}

#[test]
fn numpy_without_targets_is_a_configuration_failure() {
    let fx = Fixture::new();
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .args(["--splits", "test", "--save-mode", "numpy"])
        .assert()
        .code(2);
}

#[test]
fn unsupported_save_mode_fails_before_loading_anything() {
    let fx = Fixture::new();
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.path("missing-dataset"))
        .arg("--models")
        .arg(fx.path("missing.json"))
        .args(["--save-mode", "pickle"])
        .assert()
        .code(2);
}

#[test]
fn missing_dataset_is_an_io_failure() {
    let fx = Fixture::new();
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.path("missing-dataset"))
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .assert()
        .code(4)
        .stdout(predicate::str::is_empty());
}

#[test]
fn model_vocabulary_must_match_the_dataset() {
    let fx = Fixture::new();
    let small = fx.path("small.json");
    fs::write(&small, r#"{"vocab_size": 1, "start_token": 0, "transitions": [[0.0]]}"#).unwrap();
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(&small)
        .assert()
        .code(2);
}

#[test]
fn every_split_gets_its_own_numpy_file() {
    let fx = Fixture::new();
    fs::write(fx.data().join("dev.src"), "b a\na\n").unwrap();
    fs::write(fx.data().join("dev.trg"), "b\na a\n").unwrap();
    let dest = fx.path("scores.npy");
    beamscore()
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(fx.model("m1", 0.5))
        .args(["--splits", "val", "dev", "--save-mode", "numpy", "--dest"])
        .arg(&dest)
        .assert()
        .success();

    assert!(!dest.exists(), "a shared dest is split per split name");
    for (split, count) in [("val", 3), ("dev", 2)] {
        let bytes = fs::read(fx.path(&format!("scores.{split}.npy"))).unwrap();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.contains(&format!("'shape': ({count},)")), "{header}");
        assert_eq!(bytes.len(), 10 + header_len + count * 4);
    }
}

/// Emits `<unk>` first, then the end token, whatever the source.
fn unk_first_model(fx: &Fixture) -> PathBuf {
    let rows: Vec<String> = (0..6)
        .map(|row| {
            let hot = if row == 2 { 1 } else { 3 };
            let logits: Vec<&str> = (0..6).map(|col| if col == hot { "8.0" } else { "0.0" }).collect();
            format!("[{}]", logits.join(", "))
        })
        .collect();
    let json = format!(
        r#"{{"name": "unk", "vocab_size": 6, "start_token": 2, "transitions": [{}], "attention_sharpness": 4.0}}"#,
        rows.join(", ")
    );
    let path = fx.path("unk.json");
    fs::write(&path, json).unwrap();
    path
}

fn pos_unk_run(fx: &Fixture, mapping: Option<&str>) -> String {
    let source = fx.path("oov.src");
    fs::write(&source, "gato b\n").unwrap();
    let mut toml = String::from("[prediction]\npos_unk = true\nbeam_size = 2\n");
    if let Some(mapping) = mapping {
        let map = fx.path("unk_mapping.json");
        fs::write(&map, mapping).unwrap();
        toml.push_str(&format!("\n[data]\nunk_mapping = {:?}\n", map.to_str().unwrap()));
    }
    let config = fx.path("beamscore.toml");
    fs::write(&config, toml).unwrap();

    let assert = beamscore()
        .arg("--config")
        .arg(&config)
        .arg("score")
        .arg("--dataset")
        .arg(fx.data())
        .arg("--models")
        .arg(unk_first_model(fx))
        .arg("--source")
        .arg(&source)
        .assert()
        .success();
    String::from_utf8(assert.get_output().stdout.clone()).unwrap()
}

#[test]
fn pos_unk_copies_the_aligned_source_word() {
    let fx = Fixture::new();
    assert_eq!(pos_unk_run(&fx, None).trim(), "gato");
}

#[test]
fn pos_unk_translates_through_the_mapping_file() {
    let fx = Fixture::new();
    assert_eq!(pos_unk_run(&fx, Some(r#"{"gato": "cat"}"#)).trim(), "cat");
}
