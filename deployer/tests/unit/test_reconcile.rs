//! Resource reconciliation tests, one step at a time

use std::path::Path;
use std::sync::Arc;

use deploy_records::StepStatus;
use dualdeploy::engine::pipeline::{Criticality, Pipeline, StepDescriptor, StepKey};
use dualdeploy::engine::Engine;
use dualdeploy::exec::scripted::{Reply, ScriptedExecutor};
use dualdeploy::progress::NullSink;
use dualdeploy::reconcile::bucket::EnsureBucket;
use dualdeploy::reconcile::cors::ConfigureBucketCors;
use dualdeploy::reconcile::database::EnsureDatabase;
use dualdeploy::storage::settings::Settings;

use crate::support::{spec, FakeAccounts};

const SCHEMA: &str = "
-- shop schema
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL UNIQUE
);

CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    total INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE sessions (
    token TEXT PRIMARY KEY,
    user_id INTEGER
);

CREATE INDEX idx_orders_user ON orders(user_id);
";

/// Live tables: users complete, orders without `total`, no sessions
const DRIFTED: &str = r#"[{"results": [
    {"table_name": "orders", "column_name": "id"},
    {"table_name": "orders", "column_name": "user_id"},
    {"table_name": "users", "column_name": "email"},
    {"table_name": "users", "column_name": "id"}
], "success": true}]"#;

const UP_TO_DATE: &str = r#"[{"results": [
    {"table_name": "orders", "column_name": "id"},
    {"table_name": "orders", "column_name": "user_id"},
    {"table_name": "orders", "column_name": "total"},
    {"table_name": "sessions", "column_name": "token"},
    {"table_name": "sessions", "column_name": "user_id"},
    {"table_name": "users", "column_name": "email"},
    {"table_name": "users", "column_name": "id"}
], "success": true}]"#;

const COUNT_ORDERS: &str = r#"FROM "orders""#;

fn single_step(executor: Arc<ScriptedExecutor>, settings: Settings, key: StepKey) -> Engine {
    let step = match key {
        StepKey::EnsureDatabase => StepDescriptor::new(key, Criticality::Soft, EnsureDatabase),
        StepKey::ConfigureBucketCors => StepDescriptor::new(key, Criticality::Soft, ConfigureBucketCors),
        _ => StepDescriptor::new(key, Criticality::Soft, EnsureBucket),
    };
    Engine::with_pipeline(
        executor,
        Arc::new(FakeAccounts::new()),
        settings,
        Pipeline::new(vec![step]),
    )
}

fn schema_settings(dir: &Path) -> Settings {
    let path = dir.join("schema.sql");
    std::fs::write(&path, SCHEMA).unwrap();

    let mut settings = Settings::default();
    settings.paths.schema_file = Some(path);
    settings
}

/// Executor for a database that exists, with the given live schema
fn database_executor(live: &str) -> Arc<ScriptedExecutor> {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("d1 list", Reply::ok(r#"[{"name": "shop-db"}]"#));
    executor.on("sqlite_master", Reply::ok(live));
    executor
}

#[tokio::test]
async fn test_populated_table_is_never_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let executor = database_executor(DRIFTED);
    executor.on(COUNT_ORDERS, Reply::ok(r#"[{"results": [{"row_count": 42}]}]"#));
    let engine = single_step(executor.clone(), schema_settings(dir.path()), StepKey::EnsureDatabase);

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert_eq!(executor.count("DROP TABLE"), 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].error.contains("orders has 42 rows"));
    assert!(result.errors[0].error.contains("total"));

    // The missing table is still created, idempotently
    let apply = executor
        .calls()
        .into_iter()
        .find(|c| c.command.contains("--file"))
        .unwrap();
    let (path, sql) = apply.files.first().unwrap();
    assert!(sql.contains("CREATE TABLE IF NOT EXISTS sessions"));
    assert!(sql.contains("CREATE INDEX IF NOT EXISTS idx_orders_user"));
    assert!(!path.exists());

    let record = result.history.step("ensure-database").unwrap();
    assert_eq!(record.status, StepStatus::Warning);
    assert!(record.details.contains("created sessions"));
}

#[tokio::test]
async fn test_empty_table_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let executor = database_executor(DRIFTED);
    executor.on(COUNT_ORDERS, Reply::ok(r#"[{"results": [{"row_count": 0}]}]"#));
    let engine = single_step(executor.clone(), schema_settings(dir.path()), StepKey::EnsureDatabase);

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(executor.count(r#"DROP TABLE IF EXISTS "orders""#), 1);
    assert_eq!(executor.count("--file"), 1);

    // Count, then drop, then apply
    let calls: Vec<String> = executor.calls().into_iter().map(|c| c.command).collect();
    let drop = calls.iter().position(|c| c.contains("DROP TABLE")).unwrap();
    let apply = calls.iter().position(|c| c.contains("--file")).unwrap();
    assert!(drop < apply);

    let record = result.history.step("ensure-database").unwrap();
    assert_eq!(record.status, StepStatus::Completed);
    assert!(record.details.contains("rebuilt orders"));
}

#[tokio::test]
async fn test_unverifiable_row_count_leaves_table_alone() {
    let dir = tempfile::tempdir().unwrap();
    let executor = database_executor(DRIFTED);
    executor.on(COUNT_ORDERS, Reply::fail(1, "D1_ERROR: internal error"));
    let engine = single_step(executor.clone(), schema_settings(dir.path()), StepKey::EnsureDatabase);

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert_eq!(executor.count("DROP TABLE"), 0);
    assert!(result.errors[0].error.contains("could not be checked"));
}

#[tokio::test]
async fn test_up_to_date_schema_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let executor = database_executor(UP_TO_DATE);
    let engine = single_step(executor.clone(), schema_settings(dir.path()), StepKey::EnsureDatabase);

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(executor.count("--file"), 0);
    assert_eq!(executor.count("COUNT(*)"), 0);
    assert_eq!(executor.count("d1 create"), 0);
    let record = result.history.step("ensure-database").unwrap();
    assert!(record.details.contains("schema up to date"));
}

#[tokio::test]
async fn test_database_failure_is_soft() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("d1 list", Reply::fail(1, "Authentication error [code: 10000]"));
    let engine = single_step(executor.clone(), Settings::default(), StepKey::EnsureDatabase);

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert_eq!(result.errors[0].step, "ensure-database");
    assert_eq!(executor.count("d1 create"), 0);
    assert_eq!(
        result.history.step("ensure-database").unwrap().status,
        StepStatus::Warning
    );
}

#[tokio::test]
async fn test_bucket_ensure_is_idempotent() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on_sequence(
        "buckets list",
        vec![Reply::ok(""), Reply::ok("gs://shop-assets/\n")],
    );
    let engine = single_step(executor.clone(), Settings::default(), StepKey::EnsureBucket);

    let first = engine.deploy(&spec(), &NullSink).await.unwrap();
    let second = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert_eq!(executor.count("buckets create gs://shop-assets --project shop-prod"), 1);
    assert!(first.history.step("ensure-bucket").unwrap().details.starts_with("Created"));
    assert!(second
        .history
        .step("ensure-bucket")
        .unwrap()
        .details
        .contains("already exists"));
}

#[tokio::test]
async fn test_bucket_listing_not_found_counts_as_empty() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on(
        "buckets list",
        Reply::fail(1, "ERROR: (gcloud.storage.buckets.list) NOT_FOUND: no buckets in project"),
    );
    let engine = single_step(executor.clone(), Settings::default(), StepKey::EnsureBucket);

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(executor.count("buckets create"), 1);
}

#[tokio::test]
async fn test_bucket_without_project_is_skipped() {
    let executor = Arc::new(ScriptedExecutor::new());
    let engine = single_step(executor.clone(), Settings::default(), StepKey::EnsureBucket);
    let mut spec = spec();
    spec.provider_b_context = None;

    let result = engine.deploy(&spec, &NullSink).await.unwrap();

    assert!(result.success);
    assert!(executor.calls().is_empty());
    assert!(result.errors[0].error.contains("no provider-B project"));
}

#[tokio::test]
async fn test_table_resembling_platform_prefix_is_introspected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.sql");
    std::fs::write(
        &path,
        "CREATE TABLE acf_fields (\n    id INTEGER PRIMARY KEY,\n    label TEXT\n);\n",
    )
    .unwrap();
    let mut settings = Settings::default();
    settings.paths.schema_file = Some(path);

    let executor = database_executor(
        r#"[{"results": [
            {"table_name": "_cf_KV", "column_name": "key"},
            {"table_name": "acf_fields", "column_name": "id"},
            {"table_name": "acf_fields", "column_name": "label"}
        ], "success": true}]"#,
    );
    let engine = single_step(executor.clone(), settings, StepKey::EnsureDatabase);

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(executor.count("ESCAPE"), 1);
    assert_eq!(executor.count("--file"), 0);
    let record = result.history.step("ensure-database").unwrap();
    assert!(record.details.contains("schema up to date"));
}

#[tokio::test]
async fn test_cors_without_project_is_skipped() {
    let executor = Arc::new(ScriptedExecutor::new());
    let engine = single_step(executor.clone(), Settings::default(), StepKey::ConfigureBucketCors);
    let mut spec = spec();
    spec.provider_b_context = None;

    let result = engine.deploy(&spec, &NullSink).await.unwrap();

    assert!(result.success);
    assert!(executor.calls().is_empty());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].error.contains("CORS on shop-assets not set"));
    let record = result.history.step("configure-bucket-cors").unwrap();
    assert_eq!(record.status, StepStatus::Warning);
    assert_eq!(record.details, "Skipped");
}
