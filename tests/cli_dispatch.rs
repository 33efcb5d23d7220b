use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use uuid::Uuid;

fn unique_workspace(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&path).expect("workspace should be creatable");
    path
}

fn run_schemata(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_schemata"))
        .arg("--db")
        .arg(root.join("store.sqlite"))
        .arg("--config")
        .arg(root.join("config.toml"))
        .arg("--user")
        .arg("alice")
        .args(args)
        .env_remove("SCHEMATA_LOG")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .output()
        .expect("schemata should run")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn run_json(root: &Path, args: &[&str]) -> Value {
    let output = run_schemata(root, args);
    assert_success(&output);
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn id_of(value: &Value) -> String {
    value["id"]
        .as_str()
        .expect("value should carry an id")
        .to_string()
}

#[test]
fn related_items_round_trip_through_the_cli() {
    let root = unique_workspace("schemata-cli-items");

    let clients = run_json(
        &root,
        &[
            "schema", "new", "Clients", "-w", "W-1", "-f", "Client Name:string", "-f",
            "Total:decimal", "--json",
        ],
    );
    let clients_id = id_of(&clients);
    let relation = format!("Client={clients_id}");
    let invoices = run_json(
        &root,
        &[
            "schema", "new", "Invoices", "-w", "W-1", "-f", "Paid:boolean", "-r", &relation,
            "--json",
        ],
    );
    let invoices_id = id_of(&invoices);
    assert_eq!(invoices["relationFields"][0]["relatedSchemaName"], "Clients");

    let acme = run_json(
        &root,
        &[
            "item", "new", &clients_id, "Acme", "--set", "Client Name=Acme", "--set",
            "Total=12.50", "--json",
        ],
    );
    let acme_id = id_of(&acme);
    let link = format!("Client={acme_id}");
    let invoice = run_json(
        &root,
        &[
            "item", "new", &invoices_id, "Invoice 1", "--set", "Paid=false", "--link", &link,
            "--json",
        ],
    );
    let invoice_id = id_of(&invoice);

    let acme = run_json(&root, &["item", "show", &clients_id, &acme_id, "--json"]);
    assert_eq!(acme["version"], 2);
    assert_eq!(
        acme["relations"][0]["relatedItems"][0]["relatedItemId"],
        invoice_id.as_str()
    );
    assert_eq!(acme["fieldValues"][1]["value"], 12.5);

    let updated = run_json(
        &root,
        &[
            "item", "update", &invoices_id, &invoice_id, "--set", "Paid=true", "--if-match", "1",
            "--json",
        ],
    );
    assert_eq!(updated["version"], 2);
    assert_eq!(updated["fieldValues"][0]["value"], true);
    assert_eq!(
        updated["relationValues"][0]["edge"]["relatedItems"][0]["relatedItemId"],
        acme_id.as_str()
    );

    let stale = run_schemata(
        &root,
        &["item", "update", &invoices_id, &invoice_id, "--if-match", "1"],
    );
    assert!(!stale.status.success());
    assert!(String::from_utf8_lossy(&stale.stderr).contains("modified concurrently"));

    let removed = run_schemata(&root, &["item", "rm", &clients_id, &acme_id]);
    assert_success(&removed);
    let invoice = run_json(&root, &["item", "show", &invoices_id, &invoice_id, "--json"]);
    assert_eq!(
        invoice["relationValues"][0]["edge"]["relatedItems"]
            .as_array()
            .map(Vec::len),
        Some(0)
    );

    let report = run_json(&root, &["fsck", "--json"]);
    assert_eq!(report["issues"].as_array().map(Vec::len), Some(0));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn seed_populates_a_consistent_workspace() {
    let root = unique_workspace("schemata-cli-seed");

    let summary = run_json(&root, &["seed", "-w", "W-demo", "--json"]);
    assert_eq!(summary["clients"], 29);
    assert_eq!(summary["invoices"], 59);

    let schemas = run_json(&root, &["schema", "ls", "-w", "W-demo", "--json"]);
    assert_eq!(schemas.as_array().map(Vec::len), Some(2));

    let invoices_id = summary["invoices_schema_id"]
        .as_str()
        .expect("summary should name the invoices schema");
    let page = run_json(&root, &["item", "page", invoices_id, "--json"]);
    assert_eq!(page.as_array().map(Vec::len), Some(10));
    let found = run_json(
        &root,
        &["item", "find", invoices_id, "invoice 7 -", "-i", "--json"],
    );
    assert_eq!(found.as_array().map(Vec::len), Some(1));

    let fsck = run_schemata(&root, &["fsck"]);
    assert_success(&fsck);
    assert!(String::from_utf8_lossy(&fsck.stdout).contains("fsck ok"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn tasks_follow_their_workspace() {
    let root = unique_workspace("schemata-cli-tasks");

    let clients = run_json(
        &root,
        &["schema", "new", "Clients", "-w", "W-1", "-f", "Name:string", "--json"],
    );
    let clients_id = id_of(&clients);
    let task = run_json(
        &root,
        &[
            "task", "new", "Call Acme", "-e", "E-1", "-a", "bob", "-w", "W-1", "--app",
            &clients_id, "--json",
        ],
    );
    let task_id = id_of(&task);
    assert_eq!(task["createdBy"], "alice");

    let listed = run_json(&root, &["task", "ls", "--for", "bob", "--json"]);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let done = run_json(&root, &["task", "done", &task_id, "--json"]);
    assert_eq!(done["finished"], true);

    let purged = run_json(&root, &["workspace", "purge", "W-1", "--json"]);
    assert_eq!(purged["schemas"].as_array().map(Vec::len), Some(1));
    let listed = run_json(&root, &["task", "ls", "--for", "bob", "--json"]);
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn failures_exit_nonzero_with_an_error_line() {
    let root = unique_workspace("schemata-cli-errors");

    let missing = run_schemata(&root, &["item", "show", "S-missing", "I-1"]);
    assert!(!missing.status.success());
    let stderr = String::from_utf8_lossy(&missing.stderr);
    assert!(stderr.starts_with("error: schema not found: S-missing"), "{stderr}");

    let chain = run_schemata(&root, &["task", "new", "x", "-e", "E-1", "--item", "I-1"]);
    assert!(!chain.status.success());
    assert!(String::from_utf8_lossy(&chain.stderr).contains("invalid argument"));

    std::fs::write(root.join("config.toml"), "[store]\npage_size = 0\n")
        .expect("config should be writable");
    let bad_config = run_schemata(&root, &["schema", "ls"]);
    assert!(!bad_config.status.success());

    let _ = std::fs::remove_dir_all(root);
}
