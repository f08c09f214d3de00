//! Startup behavior of the binary: configuration handling, --init, and the
//! commands that run without network access.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

/// Helper: get a Command for the peownerfinder binary.
fn peownerfinder() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("peownerfinder");
    cmd.env_remove("GEMINI_API_KEY").env_remove("RUST_LOG");
    cmd
}

/// Helper: copy the shipped config into a temp dir so the binary finds
/// `./config/peownerfinder.toml` relative to its working directory.
fn setup_config_dir(tmp: &TempDir) {
    let src = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let dst = tmp.path().join("config");
    fs::create_dir_all(&dst).unwrap();
    fs::copy(src.join("peownerfinder.toml"), dst.join("peownerfinder.toml")).unwrap();
}

/// Without a config file and with piped stdin, the binary must exit with
/// guidance instead of waiting on the interactive prompt.
#[test]
fn test_missing_config_exits_fast_with_guidance() {
    let tmp = TempDir::new().expect("create temp dir");

    peownerfinder()
        .current_dir(tmp.path())
        .args(["firms", "list"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found").and(predicate::str::contains("--init")));
}

#[test]
fn test_init_creates_config_file() {
    let tmp = TempDir::new().expect("create temp dir");
    let config_path = tmp.path().join("config").join("peownerfinder.toml");

    peownerfinder()
        .current_dir(tmp.path())
        .arg("--init")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Created default configuration file"));

    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[gemini]"), "config should have [gemini] section");
    assert!(content.contains("[analysis]"), "config should have [analysis] section");
}

#[test]
fn test_help_works_without_config() {
    let tmp = TempDir::new().expect("create temp dir");

    peownerfinder()
        .current_dir(tmp.path())
        .arg("--help")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("peownerfinder").and(predicate::str::contains("analyze")));
}

#[test]
fn test_invalid_config_is_reported() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);
    let path = tmp.path().join("config").join("peownerfinder.toml");
    let content = fs::read_to_string(&path).unwrap().replace("concurrency = 5", "concurrency = 0");
    fs::write(&path, content).unwrap();

    peownerfinder()
        .current_dir(tmp.path())
        .args(["firms", "list"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error").and(predicate::str::contains("analysis.concurrency")));
}

#[test]
fn test_firms_list_seeds_default_registry() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);

    peownerfinder()
        .current_dir(tmp.path())
        .args(["firms", "list"])
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Bain Capital"));

    assert!(tmp.path().join("pe_firms.json").exists());
}

#[test]
fn test_firms_add_skips_known_names() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);

    peownerfinder()
        .current_dir(tmp.path())
        .args(["firms", "add", "Zeta Harbor Partners", "bain capital"])
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Added 1 new firm(s)"));

    peownerfinder()
        .current_dir(tmp.path())
        .args(["firms", "list"])
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Zeta Harbor Partners"));
}

#[test]
fn test_analyze_without_api_key_fails_before_research() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);
    let input = tmp.path().join("companies.csv");
    fs::write(&input, "Company Name\nStripe\n").unwrap();

    peownerfinder()
        .current_dir(tmp.path())
        .args(["analyze", "--input"])
        .arg(&input)
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("API Key is not configured"));

    let history = fs::read_to_string(tmp.path().join("instance").join("history.json")).unwrap_or_default();
    assert!(!history.contains("Pending"));
}

#[test]
fn test_analyze_rejects_sheet_without_company_column() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);
    let input = tmp.path().join("companies.csv");
    fs::write(&input, "Name\nStripe\n").unwrap();

    peownerfinder()
        .current_dir(tmp.path())
        .args(["analyze", "--input"])
        .arg(&input)
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Company Name"));
}
