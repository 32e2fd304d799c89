use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SEPHORA: &str = "SEPHORA\nOrder #12345\nOrder Date: 03/15/2025\nSubtotal: $52.40\nCANADA GST/TPS (5%): $2.62\nPST: $4.70\nTotal: $59.72";

const BARE_DOLLAR: &str = "Coffee Corner\nLatte $4.50\nTotal $4.50";

fn rcpt() -> Command {
    Command::cargo_bin("rcpt").unwrap()
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_parse_json() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "sephora.txt", SEPHORA);

    let output = rcpt().arg("parse").arg(&input).output().unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["vendor"], "Sephora");
    assert_eq!(json["amount"], "59.72");
    assert_eq!(json["tax"], "7.32");
    assert_eq!(json["date"], "2025-03-15");
    assert_eq!(json["currency"], "CAD");
    assert!(json.get("provenance").is_none());
}

#[test]
fn test_parse_stdin() {
    let output = rcpt()
        .args(["parse", "-"])
        .write_stdin(SEPHORA)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["amount"], "59.72");
}

#[test]
fn test_parse_default_currency() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "coffee.txt", BARE_DOLLAR);

    let output = rcpt().arg("parse").arg(&input).output().unwrap();
    let json = stdout_json(&output);
    assert!(json["currency"].is_null());
    assert_eq!(json["currency_evidence"]["source"], "no_strong_evidence");

    let output = rcpt()
        .arg("parse")
        .arg(&input)
        .args(["--default-currency", "usd"])
        .output()
        .unwrap();
    let json = stdout_json(&output);
    assert_eq!(json["currency"], "USD");
    assert_eq!(json["currency_evidence"]["source"], "defaulted");
}

#[test]
fn test_parse_csv_and_text() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "sephora.txt", SEPHORA);

    rcpt()
        .arg("parse")
        .arg(&input)
        .args(["-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("vendor,amount,subtotal,tax"))
        .stdout(predicate::str::contains("Sephora,59.72,52.40,7.32,CAD"));

    rcpt()
        .arg("parse")
        .arg(&input)
        .args(["-f", "text", "--explain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Vendor:   Sephora"))
        .stdout(predicate::str::contains("Provenance:"));
}

#[test]
fn test_parse_explain_includes_provenance() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "sephora.txt", SEPHORA);

    let output = rcpt()
        .arg("parse")
        .arg(&input)
        .arg("--explain")
        .output()
        .unwrap();
    let json = stdout_json(&output);
    assert_eq!(json["provenance"]["tax_lines"].as_array().map(Vec::len), Some(2));
    assert!(json["provenance"]["fields"]["amount"]["pattern"].is_string());
}

#[test]
fn test_parse_output_file() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "sephora.txt", SEPHORA);
    let output_path = dir.path().join("out.json");

    rcpt()
        .arg("parse")
        .arg(&input)
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output_path).unwrap()).unwrap();
    assert_eq!(json["subtotal"], "52.40");
}

#[test]
fn test_parse_missing_file() {
    rcpt()
        .args(["parse", "does-not-exist.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_batch_with_summary() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "sephora.txt", SEPHORA);
    write(dir.path(), "coffee.txt", BARE_DOLLAR);
    write(dir.path(), "ignored.pdf", "not text");
    let out_dir = dir.path().join("out");

    rcpt()
        .arg("batch")
        .arg(format!("{}/*", dir.path().display()))
        .arg("-o")
        .arg(&out_dir)
        .args(["--summary", "-j", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found 2 files"));

    assert!(out_dir.join("sephora.json").exists());
    assert!(out_dir.join("coffee.json").exists());

    let summary = fs::read_to_string(out_dir.join("summary.csv")).unwrap();
    let mut lines = summary.lines();
    assert!(lines.next().unwrap().starts_with("filename,status,vendor,amount"));
    assert_eq!(lines.count(), 2);
    assert!(summary.contains("sephora.txt,success,Sephora,59.72,7.32,CAD"));
}

#[test]
fn test_batch_without_matches() {
    let dir = TempDir::new().unwrap();

    rcpt()
        .arg("batch")
        .arg(format!("{}/*.txt", dir.path().display()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files"));
}

#[test]
fn test_patterns_for_field() {
    rcpt()
        .args(["patterns", "--field", "tax"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tax_labeled"))
        .stdout(predicate::str::contains("total_line_start").not());

    let output = rcpt()
        .args(["patterns", "--field", "vendor", "--json"])
        .output()
        .unwrap();
    let rows = stdout_json(&output);
    let names: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|row| row["name"].as_str())
        .collect();
    assert!(names.contains(&"sender_domain"));
}

#[test]
fn test_patterns_unknown_field() {
    rcpt()
        .args(["patterns", "--field", "tip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown field"));
}

#[test]
fn test_config_init_get_set() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.json");
    let config = config_path.to_str().unwrap();

    rcpt()
        .args(["-c", config, "config", "init"])
        .assert()
        .success();
    assert!(config_path.exists());

    rcpt()
        .args(["-c", config, "config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    rcpt()
        .args(["-c", config, "config", "get", "engine.review_threshold"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0.7"));

    rcpt()
        .args(["-c", config, "config", "set", "output.default_currency", "EUR"])
        .assert()
        .success();

    rcpt()
        .args(["-c", config, "config", "get", "output.default_currency"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"EUR\""));

    rcpt()
        .args(["-c", config, "config", "set", "engine.review_threshold", "1.5"])
        .assert()
        .failure();

    rcpt()
        .args(["-c", config, "config", "get", "engine.no_such_key"])
        .assert()
        .failure();
}

#[test]
fn test_config_applies_to_parse() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, r#"{"output": {"default_currency": "GBP"}}"#).unwrap();
    let input = write(dir.path(), "coffee.txt", BARE_DOLLAR);

    let output = rcpt()
        .arg("-c")
        .arg(&config_path)
        .arg("parse")
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["currency"], "GBP");
}
