//! End-to-end tests driving the `tgrid` binary.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn tgrid() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tgrid"));
    cmd.env_remove("RUST_LOG")
        .env_remove("TGRID_RATES")
        .env_remove("TGRID_NIF")
        .env_remove("TGRID_NAME")
        .env_remove("TGRID_IOSS_NUMBER");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("failed to run tgrid")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn transform_json_summary() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.xlsx");
    let out = run(tgrid()
        .arg("transform")
        .arg(fixture("marketplace.csv"))
        .arg("-o")
        .arg(&output)
        .arg("--rates")
        .arg(fixture("rates.toml"))
        .arg("--json"));

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    let summary: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(summary["rows_read"], 10);
    assert_eq!(summary["returns_skipped"], 1);
    assert_eq!(summary["periods"][2], "2024-MAR");
    assert_eq!(summary["categories"]["intra_community"], 1);
    assert!(output.exists());
}

#[test]
fn transform_human_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.xlsx");
    let out = run(tgrid()
        .arg("transform")
        .arg(fixture("marketplace.csv"))
        .arg("-o")
        .arg(&output));

    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with("wrote "));
    assert!(text.contains("rows read:        10"));
    // built-in table has no USD rate
    assert!(text.contains("no rate for USD"));
    assert!(stderr(&out).contains("no exchange rate"));
}

#[test]
fn too_many_periods_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.csv");
    fs::write(&input, "ACTIVITY_PERIOD,TRANSACTION_TYPE\n2024-JAN,SALE\n2024-FEB,SALE\n2024-MAR,SALE\n2024-APR,SALE\n").unwrap();
    let output = dir.path().join("report.xlsx");

    let out = run(tgrid().arg("transform").arg(&input).arg("-o").arg(&output));
    assert_eq!(out.status.code(), Some(5));
    assert!(stderr(&out).contains("error: transactions span more than 3"));
    assert!(stderr(&out).contains("hint:"));
    assert!(!output.exists());
}

#[test]
fn missing_column_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.csv");
    fs::write(&input, "TRANSACTION_TYPE,BUYER_NAME\nSALE,Acme\n").unwrap();
    let out = run(tgrid().arg("transform").arg(&input).arg("-o").arg(dir.path().join("r.xlsx")));
    assert_eq!(out.status.code(), Some(6));
}

#[test]
fn empty_file_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.csv");
    fs::write(&input, "ACTIVITY_PERIOD,TRANSACTION_TYPE\n").unwrap();
    let out = run(tgrid().arg("transform").arg(&input).arg("-o").arg(dir.path().join("r.xlsx")));
    assert_eq!(out.status.code(), Some(4));
}

#[test]
fn missing_input_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(tgrid()
        .arg("transform")
        .arg(dir.path().join("nope.csv"))
        .arg("-o")
        .arg(dir.path().join("r.xlsx")));
    assert_eq!(out.status.code(), Some(3));
}

#[test]
fn bad_rates_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let rates = dir.path().join("rates.toml");
    fs::write(&rates, "[exchange_rates]\nPLN = -1.0\n").unwrap();
    let out = run(tgrid().arg("rates").arg("--rates").arg(&rates));
    assert_eq!(out.status.code(), Some(7));
}

#[test]
fn bad_delimiter_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(tgrid()
        .arg("transform")
        .arg(fixture("marketplace.csv"))
        .arg("-o")
        .arg(dir.path().join("r.xlsx"))
        .arg("--delimiter")
        .arg(";;"));
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn periods_command() {
    let out = run(tgrid().arg("periods").arg(fixture("marketplace.csv")).arg("--json"));
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    let analysis: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(analysis["count"], 3);
    assert_eq!(analysis["acceptable"], true);
    assert_eq!(analysis["filing_period"]["year"], 2024);
}

#[test]
fn periods_command_rejects_four() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.csv");
    fs::write(&input, "ACTIVITY_PERIOD\n2024Q1\n2024Q2\n2024Q3\n2024Q4\n").unwrap();
    let out = run(tgrid().arg("periods").arg(&input));
    assert_eq!(out.status.code(), Some(5));
    assert!(stdout(&out).contains("2024Q4"));
}

#[test]
fn form349_command() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("349.csv");
    let out = run(tgrid()
        .arg("form349")
        .arg(fixture("marketplace.csv"))
        .arg("-o")
        .arg(&output)
        .arg("--rates")
        .arg(fixture("rates.toml")));
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    let bytes = fs::read(&output).unwrap();
    assert!(bytes.starts_with(b"FR;31;FOB;11;3;;85182190;ES;"));
}

#[test]
fn form369_command() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("369.txt");
    let out = run(tgrid()
        .arg("form369")
        .arg(fixture("marketplace.csv"))
        .arg("-o")
        .arg(&output)
        .arg("--rates")
        .arg(fixture("rates.toml"))
        .arg("--nif")
        .arg("B12345678")
        .env("TGRID_NAME", "Comercial Norte SL")
        .arg("--period")
        .arg("2024Q1"));
    assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("2 entries, MOSS, 2024 T 1"));
    let bytes = fs::read(&output).unwrap();
    assert!(bytes.starts_with(b"<T36920241T0000>"));
    assert!(bytes.ends_with(b"</T36920241T0000>"));
}

#[test]
fn form369_import_needs_ioss_number() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("369.txt");
    let out = run(tgrid()
        .arg("form369")
        .arg(fixture("marketplace.csv"))
        .arg("-o")
        .arg(&output)
        .arg("--regime")
        .arg("import")
        .arg("--nif")
        .arg("B12345678")
        .arg("--name")
        .arg("Comercial Norte SL"));
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("IOSS number required"));
    assert!(!output.exists());
}

#[test]
fn form369_bad_period_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(tgrid()
        .arg("form369")
        .arg(fixture("marketplace.csv"))
        .arg("-o")
        .arg(dir.path().join("369.txt"))
        .arg("--nif")
        .arg("B12345678")
        .arg("--name")
        .arg("X")
        .arg("--period")
        .arg("2024Q9"));
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn rates_prints_builtin_table() {
    let out = run(tgrid().arg("rates"));
    assert_eq!(out.status.code(), Some(0));
    let text = stdout(&out);
    assert!(text.contains("[exchange_rates]"));
    assert!(text.contains("EUR = 1"));
    assert!(text.contains("[oss_vat_rates]"));
}
