//! History store tests

use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};

use deploy_records::{DeploymentHistoryEntry, RunStatus, StepStatus};
use dualdeploy::exec::scripted::{Reply, ScriptedExecutor};
use dualdeploy::filesys::dir::Dir;
use dualdeploy::progress::NullSink;
use dualdeploy::storage::history::{HistoryStore, JsonHistoryStore};
use dualdeploy::storage::settings::Settings;

use crate::support::{engine, spec, FakeAccounts};

#[tokio::test]
async fn test_runs_are_recorded_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(Dir::new(dir.path()), 20);
    let executor = Arc::new(ScriptedExecutor::new());
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());

    let first = engine.deploy(&spec(), &NullSink).await.unwrap();
    store.append("production", &first.history).await.unwrap();

    executor.on("wrangler deploy --name", Reply::fail(1, "Build failed: missing entry point"));
    let second = engine.deploy(&spec(), &NullSink).await.unwrap();
    store.append("production", &second.history).await.unwrap();

    let entries = store.list("production").await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, RunStatus::Succeeded);
    assert_eq!(entries[1].status, RunStatus::Failed);
    assert_eq!(entries[1].errors[0].step, "deploy-worker");
    assert_eq!(entries[1], second.history);
    assert!(entries[0].timestamp <= entries[1].timestamp);

    // Other deployments are kept apart
    assert!(store.list("staging").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_wire_format() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(Dir::new(dir.path()), 5);
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("--cors-file", Reply::fail(1, "permission denied"));
    let engine = engine(executor, FakeAccounts::new(), Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();
    assert_ok!(store.append("production", &result.history).await);

    let raw = std::fs::read_to_string(dir.path().join("production.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let entry = &json[0];

    assert!(entry["timestamp"].is_string());
    assert!(entry["endTime"].is_string());
    assert_eq!(entry["status"], "succeeded");
    assert_eq!(entry["results"]["computeUrl"], "https://shop-api.workers.dev");
    assert_eq!(entry["results"]["staticUrl"], "https://shop.pages.dev");
    assert_eq!(entry["errors"][0]["step"], "configure-bucket-cors");
    assert_eq!(entry["steps"][6]["step"], "configure-bucket-cors");
    assert_eq!(entry["steps"][6]["status"], "warning");
    assert!(entry["steps"][6]["logs"].is_array());

    // Secret values never reach disk
    assert!(!raw.contains("key-123"));
    assert!(!raw.contains("jwt-456"));
}

#[tokio::test]
async fn test_running_entry_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonHistoryStore::new(Dir::new(dir.path()), 5);

    let mut entry = DeploymentHistoryEntry::started_at(chrono::Utc::now());
    entry.steps.push(deploy_records::StepRecord::new(
        "check-prerequisites",
        StepStatus::Running,
        "Checking required CLIs",
    ));
    store.append("production", &entry).await.unwrap();

    let raw = std::fs::read_to_string(dir.path().join("production.json")).unwrap();
    assert!(!raw.contains("endTime"));
    assert!(!raw.contains("errors"));

    let entries = store.list("production").await.unwrap();
    assert_eq!(entries, vec![entry]);
}

#[tokio::test]
async fn test_corrupt_history_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("production.json"), "{not json").unwrap();
    let store = JsonHistoryStore::new(Dir::new(dir.path()), 5);

    assert_err!(store.list("production").await);
    let entry = DeploymentHistoryEntry::started_at(chrono::Utc::now());
    assert_err!(store.append("production", &entry).await);
}
