//! Integration tests for the sat-pg CLI: train on a tiny formula, then check the result.

use std::path::{Path, PathBuf};
use std::process::Command;

const CNF: &str = "c five clauses over four variables
p cnf 4 5
1 -2 0
2 3 0
-1 -3 4 0
-4 2 0
1 4 0
";

fn sat_pg() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sat-pg"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn write_inputs(dir: &Path) -> (PathBuf, PathBuf) {
    let formula = dir.join("small.cnf");
    std::fs::write(&formula, CNF).unwrap();
    let config = dir.join("train.toml");
    std::fs::write(
        &config,
        r#"
[training]
batch_size = 4
log_interval = 1
eval_interval = 1
eval_strategies = [0, 4]

[training.baseline]
kind = "sample_best"
num_rollouts = 2

[policy]
var_emb_size = 8
assignment_emb_size = 4
output_size = 1

[policy.decoder]
kind = "recurrent"
cell = "gru"
hidden_size = 8
num_layers = 1
"#,
    )
    .unwrap();
    (formula, config)
}

fn single_run_dir(output_dir: &Path) -> PathBuf {
    let entries: Vec<PathBuf> = std::fs::read_dir(output_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1, "{entries:?}");
    entries.into_iter().next().unwrap()
}

#[test]
fn test_cli_train_then_check() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (formula, config) = write_inputs(tmp.path());
    let output_dir = tmp.path().join("outputs");

    let status = sat_pg()
        .args(["train", "--formula"])
        .arg(&formula)
        .arg("--config")
        .arg(&config)
        .args(["--num-samples", "12", "--seed", "5", "--run-name", "small"])
        .arg("--output-dir")
        .arg(&output_dir)
        .status()
        .unwrap();
    assert!(status.success());

    let run_dir = single_run_dir(&output_dir);
    let record: serde_json::Value =
        serde_json::from_reader(std::fs::File::open(run_dir.join("solution.json")).unwrap())
            .unwrap();
    assert_eq!(record["total_samples"], 12);
    assert_eq!(record["total_episodes"], 3);
    assert!(record["trainable params"].as_u64().unwrap() > 0);

    let output = sat_pg()
        .args(["check", "--json", "--formula"])
        .arg(&formula)
        .arg("--solution")
        .arg(&run_dir)
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["num_clauses"], 5);
    assert_eq!(report["num_satisfied"], record["num_sat"]);
    assert_eq!(report["recorded_num_sat"], record["num_sat"]);
}

#[test]
fn test_cli_train_rejects_missing_formula() {
    let tmp = tempfile::TempDir::new().unwrap();
    let status = sat_pg()
        .args(["train", "--formula"])
        .arg(tmp.path().join("absent.cnf"))
        .arg("--output-dir")
        .arg(tmp.path().join("outputs"))
        .status()
        .unwrap();
    assert!(!status.success());
    assert!(!tmp.path().join("outputs").exists());
}

#[test]
fn test_cli_check_reports_text() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (formula, _) = write_inputs(tmp.path());
    let solution = tmp.path().join("solution.json");
    std::fs::write(
        &solution,
        serde_json::json!({
            "episode": 1,
            "samples": 4,
            "num_sat": 5,
            "strategy": "greedy",
            "sol": [1, 1, 0, 1],
            "total_episodes": 1,
            "total_samples": 4,
            "trainable params": 10,
        })
        .to_string(),
    )
    .unwrap();

    let output = sat_pg()
        .args(["check", "--formula"])
        .arg(&formula)
        .arg("--solution")
        .arg(&solution)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Satisfied: 5/5"), "{stdout}");
    assert!(stdout.contains("All clauses satisfied"), "{stdout}");
}

#[test]
fn test_cli_train_context_without_embeddings_fails_early() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (formula, _) = write_inputs(tmp.path());
    let config = tmp.path().join("context.toml");
    std::fs::write(&config, "[encoding]\ncontext = true\n").unwrap();
    let output_dir = tmp.path().join("outputs");

    let output = sat_pg()
        .args(["train", "--formula"])
        .arg(&formula)
        .arg("--config")
        .arg(&config)
        .arg("--output-dir")
        .arg(&output_dir)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("requires literal embeddings"), "{stderr}");
    assert!(!output_dir.exists());
}

#[test]
fn test_cli_train_logs_formula_load_once() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (formula, config) = write_inputs(tmp.path());

    let output = sat_pg()
        .env("RUST_LOG", "info")
        .args(["train", "--formula"])
        .arg(&formula)
        .arg("--config")
        .arg(&config)
        .args(["--num-samples", "4", "--seed", "1"])
        .arg("--output-dir")
        .arg(tmp.path().join("outputs"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let logs = String::from_utf8_lossy(&output.stdout);
    assert_eq!(logs.matches("Loaded CNF formula").count(), 1, "{logs}");
    assert!(!logs.contains("Loaded formula"), "{logs}");
}
