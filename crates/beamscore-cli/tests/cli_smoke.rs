use assert_cmd::Command;
use predicates::prelude::*;

fn beamscore() -> Command {
    Command::cargo_bin("beamscore").unwrap()
}

#[test]
fn help_works() {
    beamscore().arg("--help").assert().success();
}

#[test]
fn version_works() {
    beamscore().arg("--version").assert().success();
}

#[test]
fn help_mentions_core_subcommands() {
    beamscore()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("score").and(predicate::str::contains("--config")));
}

#[test]
fn score_help_lists_inputs() {
    let assert = beamscore().args(["score", "--help"]).assert().success();
    let out = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    for needle in ["--dataset", "--models", "--splits", "--weights", "--dest", "--source", "--target"] {
        assert!(out.contains(needle), "score help missing `{needle}`");
    }
}

#[test]
fn invalid_command_fails() {
    beamscore().arg("nonexistent-command").assert().failure();
}

#[test]
fn config_example_is_printed() {
    beamscore()
        .args(["config", "example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[prediction]").and(predicate::str::contains("save_mode")));
}

#[test]
fn config_show_reflects_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[prediction]\nbeam_size = 3\n").unwrap();
    beamscore()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("beam_size = 3"));
}

#[test]
fn missing_config_file_is_an_io_failure() {
    beamscore()
        .args(["config", "show", "--config", "/nonexistent/beamscore.toml"])
        .assert()
        .code(4);
}

#[test]
fn invalid_config_file_is_a_configuration_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[output]\nsave_mode = \"pickle\"\n").unwrap();
    beamscore().args(["config", "show", "--config"]).arg(&path).assert().code(2);
}
