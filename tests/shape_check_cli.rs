//! End-to-end runs of the `shape-check` binary
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

fn shape_check(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shape-check"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to run shape-check")
}

const VALID_PAYMENT: &str = r#"{
  "$shape": "payment",
  "amount": "250.50",
  "paymentDate": "2024-03-01",
  "method": "BANK_TRANSFER",
  "status": "COMPLETED",
  "contractId": "contract-1",
  "customerId": "cust-1",
  "notes": ""
}"#;

const INVALID_PAYMENT: &str = r#"{
  "$shape": "payment",
  "amount": 0,
  "method": "BITCOIN",
  "status": "COMPLETED",
  "contractId": "contract-1",
  "customerId": "cust-1"
}"#;

#[test]
fn test_valid_file_prints_normalized_record() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("payment.json"), VALID_PAYMENT).unwrap();

    let output = shape_check(dir.path(), &["payment.json"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("payment.json: ok (payment)"));
    assert!(stdout.contains("250.5"));
    assert!(!stdout.contains("notes"));
}

#[test]
fn test_invalid_file_fails_with_json_report() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("payment.json"), INVALID_PAYMENT).unwrap();

    let output = shape_check(dir.path(), &["--format", "json", "payment.json"]);
    assert_eq!(output.status.code(), Some(1));

    let report: Value = serde_json::from_slice(&output.stdout).expect("JSON report");
    assert_eq!(report["valid"], Value::Bool(false));

    let paths: Vec<&str> = report["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["path"].as_str())
        .collect();
    assert_eq!(paths, vec!["amount", "paymentDate", "method"]);
    assert_eq!(report["errors"][0]["kind"], "constraint_violation");
}

#[test]
fn test_shape_flag_and_custom_shape_dir() {
    let dir = tempfile::tempdir().unwrap();
    let shapes = dir.path().join("shapes");
    std::fs::create_dir(&shapes).unwrap();
    std::fs::write(
        shapes.join("lease.toml"),
        "[shape]\nname = \"lease\"\n\n[[fields]]\nname = \"tenant\"\ntype = \"string\"\nrequired = true\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("lease.json"), "{ \"tenant\": \"سالم\" }").unwrap();

    let output = shape_check(
        dir.path(),
        &["--shape", "lease", "--shape-dir", "shapes", "lease.json"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let listed = shape_check(dir.path(), &["--shape-dir", "shapes", "--list"]);
    let stdout = String::from_utf8_lossy(&listed.stdout);
    assert!(stdout.lines().any(|line| line.starts_with("lease\t")));
    assert!(stdout.lines().any(|line| line.starts_with("invoice\t")));
}

#[test]
fn test_file_without_shape_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("data.json"), "{ \"amount\": 1 }").unwrap();

    let output = shape_check(dir.path(), &["data.json"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("No shape"));
}

#[test]
fn test_root_directive_with_dotted_name() {
    let dir = tempfile::tempdir().unwrap();
    let shapes = dir.path().join("shapes");
    std::fs::create_dir(&shapes).unwrap();
    std::fs::write(
        shapes.join("lease.toml"),
        "[shape]\nname = \"lease.v2\"\n\n[[fields]]\nname = \"tenant\"\ntype = \"string\"\nrequired = true\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("lease.json"),
        r#"{ "tenant": { "$shape": "customer" }, "$shape": "lease.v2" }"#,
    )
    .unwrap();

    let output = shape_check(dir.path(), &["--shape-dir", "shapes", "lease.json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(lease.v2)"), "{}", stdout);
    // The nested `$shape` is plain data of the `tenant` field
    assert!(stdout.contains("tenant [type_mismatch]"), "{}", stdout);
}
