use assert_cmd::Command;
use predicates::prelude::*;
use rusqlite::Connection;
use std::fs;
use tempfile::tempdir;

const CONFIG: &str = r#"
instrument = "TestCam"
collection = "calib/legacy"

[[dataset_type]]
name = "bias"
template = "bias/{calibDate:str}/bias-{ccd:int}.fits"
dimensions = ["instrument", "detector"]
table = "bias"
"#;

#[test]
fn starmig_converts_a_repo_and_writes_the_ledger() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("repo");
    let bias_dir = root.join("bias").join("2020-01-01");
    fs::create_dir_all(&bias_dir).expect("mkdir");
    fs::write(bias_dir.join("bias-1.fits"), b"bias").expect("write bias");

    let db = Connection::open(root.join("calibRegistry.sqlite3")).expect("open db");
    db.execute_batch(
        "CREATE TABLE bias (validStart TEXT, validEnd TEXT, ccd INTEGER, calibDate TEXT);
         INSERT INTO bias VALUES ('2020-01-01', '2020-01-05', 1, '2020-01-01');",
    )
    .expect("seed db");
    drop(db);

    let config_path = tmp.path().join("scan.toml");
    fs::write(&config_path, CONFIG).expect("write config");
    let ledger = tmp.path().join("associations.jsonl");

    Command::cargo_bin("starmig")
        .expect("binary")
        .arg("--root")
        .arg(&root)
        .arg("--config")
        .arg(&config_path)
        .arg("--ledger")
        .arg(&ledger)
        .assert()
        .success()
        .stdout(predicate::str::contains("certified 1 validity intervals"));

    let raw = fs::read_to_string(&ledger).expect("read ledger");
    let lines: Vec<_> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), 1);
    let association: serde_json::Value = serde_json::from_str(lines[0]).expect("parse line");
    assert_eq!(association["collection"], "calib/legacy");
    assert_eq!(association["record"]["dataset_type"], "bias");
    assert_eq!(association["timespan"]["begin"], "2020-01-01T00:00:00");
    assert_eq!(association["timespan"]["end"], "2020-01-06T00:00:00");
}

#[test]
fn starmig_fails_cleanly_without_a_side_database() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("repo");
    let bias_dir = root.join("bias").join("2020-01-01");
    fs::create_dir_all(&bias_dir).expect("mkdir");
    fs::write(bias_dir.join("bias-1.fits"), b"bias").expect("write bias");

    let config_path = tmp.path().join("scan.toml");
    fs::write(&config_path, CONFIG).expect("write config");

    Command::cargo_bin("starmig")
        .expect("binary")
        .arg("--root")
        .arg(&root)
        .arg("--config")
        .arg(&config_path)
        .arg("--ledger")
        .arg(tmp.path().join("associations.jsonl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "calibration registry database not found",
        ));
}
