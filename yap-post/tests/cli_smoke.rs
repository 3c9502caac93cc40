//! CLI smoke tests for yap-post, isolated from any real user data via
//! YAPCAST_CONFIG pointing at a temp data directory.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn isolated_config(dir: &TempDir) -> std::path::PathBuf {
    let config_path = dir.path().join("config.toml");
    let data_dir = dir.path().join("data");
    std::fs::write(
        &config_path,
        format!("[storage]\ndata_dir = \"{}\"\n", data_dir.display()),
    )
    .unwrap();
    config_path
}

#[test]
fn help_prints_usage() {
    Command::cargo_bin("yap-post")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Post one composition"));
}

#[test]
fn unknown_platform_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("yap-post")
        .unwrap()
        .env("YAPCAST_CONFIG", isolated_config(&dir))
        .args(["--platform", "twitter", "hello"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown platform"));
}

#[test]
fn empty_content_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("yap-post")
        .unwrap()
        .env("YAPCAST_CONFIG", isolated_config(&dir))
        .args(["--platform", "mastodon", ""])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("empty"));
}

#[test]
fn no_connected_platforms_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("yap-post")
        .unwrap()
        .env("YAPCAST_CONFIG", isolated_config(&dir))
        .arg("hello world")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("none connected"));
}

#[test]
fn disconnected_platform_fails_without_network() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("yap-post")
        .unwrap()
        .env("YAPCAST_CONFIG", isolated_config(&dir))
        .args(["--platform", "mastodon", "hello world"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Mastodon account not connected"));
}

#[test]
fn json_format_emits_structured_outcome() {
    let dir = TempDir::new().unwrap();
    let output = Command::cargo_bin("yap-post")
        .unwrap()
        .env("YAPCAST_CONFIG", isolated_config(&dir))
        .args(["--platform", "mastodon", "--format", "json", "hello"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(outcome["results"][0]["platform"], "mastodon");
    assert_eq!(outcome["results"][0]["success"], false);
    assert_eq!(outcome["results"][0]["status"], "failed");
}

#[test]
fn too_many_images_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("yap-post")
        .unwrap()
        .env("YAPCAST_CONFIG", isolated_config(&dir))
        .args([
            "--platform", "mastodon",
            "-i", "a.png", "-i", "b.png", "-i", "c.png", "-i", "d.png", "-i", "e.png",
            "hello",
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("At most 4 images"));
}
