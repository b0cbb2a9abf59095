use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn write_kb(root: &Path, name: &str, entries: &[(&str, &str)]) {
    let records: Vec<Value> = entries
        .iter()
        .map(|(id, text)| {
            serde_json::json!({
                "id": id,
                "source_ref": format!("https://docs.test/{id}"),
                "text": text,
            })
        })
        .collect();
    fs::write(root.join(name), serde_json::to_string_pretty(&records).unwrap()).unwrap();
}

/// Runs `embedsync sync kb.json --store store.json --json` plus `extra`,
/// returning the exit code, parsed stdout and raw stderr.
fn run_sync(workdir: &Path, extra: &[&str]) -> (Option<i32>, Value, String) {
    let mut cmd = cargo_bin_cmd!("embedsync");
    cmd.current_dir(workdir)
        .args(["sync", "kb.json", "--store", "store.json", "--json"])
        .args(extra);
    let output = cmd.output().expect("command run");
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let body = serde_json::from_slice(&output.stdout).unwrap_or(Value::Null);
    (output.status.code(), body, stderr)
}

fn run_status(workdir: &Path) -> Value {
    let output = cargo_bin_cmd!("embedsync")
        .current_dir(workdir)
        .args(["status", "--store", "store.json", "--json"])
        .output()
        .expect("command run");
    assert!(output.status.success(), "status must succeed");
    serde_json::from_slice(&output.stdout).expect("valid status json")
}

#[test]
fn sync_creates_store_and_reports_inserts() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write_kb(root, "kb.json", &[("a", "alpha text"), ("b", "beta text")]);

    let (code, report, stderr) = run_sync(root, &["--dimension", "8"]);
    assert_eq!(code, Some(0), "unexpected failure: {stderr}");
    assert_eq!(report["inserted"], 2);
    assert_eq!(report["embedded"], 2);
    assert_eq!(report["failures"].as_array().map(Vec::len), Some(0));

    assert!(root.join("store.json").exists());
    assert!(root.join("store.last_run.json").exists());
}

#[test]
fn identical_rerun_selects_nothing() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write_kb(root, "kb.json", &[("a", "alpha"), ("b", "beta")]);

    let (first, _, _) = run_sync(root, &["--dimension", "8"]);
    assert_eq!(first, Some(0));

    let (second, report, stderr) = run_sync(root, &["--dimension", "8"]);
    assert_eq!(second, Some(0), "unexpected failure: {stderr}");
    assert_eq!(report["embedded"], 0);
    assert_eq!(report["skipped"], 2);
    assert_eq!(report["retained"], 2);
}

#[test]
fn removed_chunks_are_pruned_unless_kept() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write_kb(root, "kb.json", &[("a", "alpha"), ("b", "beta")]);
    let (code, _, _) = run_sync(root, &["--dimension", "8"]);
    assert_eq!(code, Some(0));

    write_kb(root, "kb.json", &[("a", "alpha")]);
    let (code, report, _) = run_sync(root, &["--dimension", "8"]);
    assert_eq!(code, Some(0));
    assert_eq!(report["deleted"], 1);
    assert_eq!(run_status(root)["records"], 1);

    // Bring the chunk back, then remove it again with --keep-missing.
    write_kb(root, "kb.json", &[("a", "alpha"), ("b", "beta")]);
    run_sync(root, &["--dimension", "8"]);
    write_kb(root, "kb.json", &[("a", "alpha")]);
    let (code, report, _) = run_sync(root, &["--dimension", "8", "--keep-missing"]);
    assert_eq!(code, Some(0));
    assert_eq!(report["deleted"], 0);
    assert_eq!(report["retained"], 2);
    assert_eq!(run_status(root)["records"], 2);
}

#[test]
fn empty_kb_needs_explicit_confirmation() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write_kb(root, "kb.json", &[("a", "alpha")]);
    let (code, _, _) = run_sync(root, &["--dimension", "8"]);
    assert_eq!(code, Some(0));

    fs::write(root.join("kb.json"), "[]").unwrap();
    let (code, _, stderr) = run_sync(root, &["--dimension", "8"]);
    assert_eq!(code, Some(1), "empty source must fail without confirmation");
    assert!(
        stderr.contains("allow-empty-source"),
        "stderr must point at the confirmation flag: {stderr}"
    );
    assert_eq!(run_status(root)["records"], 1, "store must be untouched");

    let (code, report, _) = run_sync(root, &["--dimension", "8", "--allow-empty-source"]);
    assert_eq!(code, Some(0));
    assert_eq!(report["deleted"], 1);
    assert_eq!(run_status(root)["records"], 0);
}

#[test]
fn dimension_drift_exits_partial() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write_kb(root, "kb.json", &[("a", "alpha"), ("b", "beta")]);
    let (code, _, _) = run_sync(root, &["--dimension", "8"]);
    assert_eq!(code, Some(0));

    // Re-embedding the edited chunk at a narrower width cannot join a store
    // built at dimension 8; the run commits and flags the skip.
    write_kb(root, "kb.json", &[("a", "alpha rewritten"), ("b", "beta")]);
    let (code, report, _) = run_sync(root, &["--dimension", "4"]);
    assert_eq!(code, Some(2), "partial runs exit 2");
    let failures = report["failures"].as_array().expect("failures array");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["id"], "a");

    // A full rebuild accepts the new width.
    let (code, report, _) = run_sync(root, &["--dimension", "4", "--full"]);
    assert_eq!(code, Some(0));
    assert_eq!(report["inserted"], 2);
    assert_eq!(run_status(root)["dimension"], 4);
}

#[test]
fn status_reports_store_and_last_run() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write_kb(root, "kb.json", &[("a", "alpha"), ("b", "beta")]);
    run_sync(root, &["--dimension", "8"]);

    let status = run_status(root);
    assert_eq!(status["exists"], true);
    assert_eq!(status["records"], 2);
    assert_eq!(status["dimension"], 8);
    assert_eq!(status["last_run"]["inserted"], 2);
    assert_eq!(status["last_run"]["outcome"], "clean");
}

#[test]
fn status_handles_a_missing_store() {
    let temp = tempdir().unwrap();
    let status = run_status(temp.path());
    assert_eq!(status["exists"], false);
    assert_eq!(status["records"], 0);
    assert_eq!(status["dimension"], Value::Null);
}

#[test]
fn docs_map_inputs_compose_positioned_chunks() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::write(
        root.join("kb.json"),
        r#"{
            "https://docs.test/guide": {
                "title": "Guide",
                "headers": ["Install"],
                "paragraphs": ["Run the installer."]
            }
        }"#,
    )
    .unwrap();

    let (code, report, stderr) = run_sync(root, &["--dimension", "8"]);
    assert_eq!(code, Some(0), "unexpected failure: {stderr}");
    assert_eq!(report["inserted"], 1);

    let store: Value =
        serde_json::from_str(&fs::read_to_string(root.join("store.json")).unwrap()).unwrap();
    assert!(
        store["records"]["https://docs.test/guide#0"].is_object(),
        "docs-map chunks use url#position ids"
    );
}

#[test]
fn conflicting_duplicate_ids_abort_the_run() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write_kb(root, "kb.json", &[("a", "alpha")]);
    write_kb(root, "other.json", &[("a", "different text")]);

    Command::new(assert_cmd::cargo::cargo_bin!("embedsync"))
        .current_dir(root)
        .args(["sync", "kb.json", "other.json", "--store", "store.json", "--dimension", "8"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Duplicate chunk id"));
    assert!(!root.join("store.json").exists(), "no commit on a load error");
}

#[test]
fn openai_backend_requires_an_api_key() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    write_kb(root, "kb.json", &[("a", "alpha")]);

    Command::new(assert_cmd::cargo::cargo_bin!("embedsync"))
        .current_dir(root)
        .env_remove("OPENAI_API_KEY")
        .args(["sync", "kb.json", "--store", "store.json", "--embedder", "openai"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("OPENAI_API_KEY"));
}

#[test]
fn missing_input_file_names_the_path() {
    let temp = tempdir().unwrap();

    Command::new(assert_cmd::cargo::cargo_bin!("embedsync"))
        .current_dir(temp.path())
        .args(["sync", "absent.json", "--store", "store.json"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("absent.json"));
}
