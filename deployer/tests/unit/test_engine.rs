//! Engine pipeline tests

use std::sync::atomic::Ordering;
use std::sync::Arc;

use deploy_records::{RunStatus, StepStatus};
use dualdeploy::accounts::Provider;
use dualdeploy::engine::fsm::RunState;
use dualdeploy::errors::DeployError;
use dualdeploy::exec::scripted::{Reply, ScriptedExecutor};
use dualdeploy::progress::{NullSink, RecordingSink};
use dualdeploy::storage::settings::Settings;

use crate::support::{engine, spec, FakeAccounts, GatedExecutor};

const STEPS: [&str; 10] = [
    "check-prerequisites",
    "switch-accounts",
    "check-auth",
    "setup-provider-b",
    "ensure-bucket",
    "ensure-database",
    "configure-bucket-cors",
    "deploy-secrets",
    "deploy-worker",
    "deploy-static-site",
];

#[tokio::test]
async fn test_clean_first_run() {
    let executor = Arc::new(ScriptedExecutor::new());
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());
    let sink = RecordingSink::new();

    let result = engine.deploy(&spec(), &sink).await.unwrap();

    assert!(result.success);
    assert!(result.error.is_none());
    assert!(result.errors.is_empty());
    assert_eq!(result.compute_url, "https://shop-api.workers.dev");
    assert_eq!(result.static_url, "https://shop.pages.dev");

    let steps: Vec<&str> = result.history.steps.iter().map(|s| s.step.as_str()).collect();
    assert_eq!(steps, STEPS);
    assert!(result
        .history
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Completed));
    assert_eq!(result.history.status, RunStatus::Succeeded);
    assert!(result.history.end_time.is_some());

    // Fresh names get created
    assert_eq!(executor.count("buckets create gs://shop-assets"), 1);
    assert_eq!(executor.count("d1 create shop-db"), 1);
    assert_eq!(executor.count("pages project create shop"), 1);

    // Every step reported running before it finished
    for step in STEPS {
        let statuses = sink.statuses(step);
        assert_eq!(statuses.first(), Some(&StepStatus::Running), "{step}");
        assert_eq!(statuses.last(), Some(&StepStatus::Completed), "{step}");
    }

    let json = serde_json::to_value(&result.history).unwrap();
    assert!(json.get("errors").is_none());
    assert_eq!(json["results"]["computeUrl"], "https://shop-api.workers.dev");
    assert_eq!(engine.last_state().await, RunState::Succeeded);
}

#[tokio::test]
async fn test_repeat_run_normalizes_already_exists() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("buckets create", Reply::fail(1, "ERROR: HTTPError 409: The requested bucket name already exists."));
    executor.on("d1 create", Reply::fail(1, "A database with that name already exists"));
    executor.on("pages project create", Reply::fail(1, "A project with this name already exists"));
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());

    for _ in 0..2 {
        let result = engine.deploy(&spec(), &NullSink).await.unwrap();
        assert!(result.success);
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        for step in ["ensure-bucket", "ensure-database", "deploy-static-site"] {
            let record = result.history.step(step).unwrap();
            assert_eq!(record.status, StepStatus::Completed, "{step}");
        }
        let bucket = result.history.step("ensure-bucket").unwrap();
        assert!(bucket.details.contains("already exists"));
    }
}

#[tokio::test]
async fn test_listed_resources_are_not_recreated() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("buckets list", Reply::ok("gs://shop-assets/\n"));
    executor.on("d1 list", Reply::ok(r#"[{"uuid": "9f", "name": "shop-db"}]"#));
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert_eq!(executor.count("buckets create"), 0);
    assert_eq!(executor.count("d1 create"), 0);
}

#[tokio::test]
async fn test_secrets_failure_fails_run() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("secret bulk", Reply::fail(1, "Worker shop-api rejected the request: invalid argument"));
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().starts_with("deploy-secrets failed"));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].step, "deploy-secrets");

    // Partial history is kept, nothing after the failure ran
    assert_eq!(result.history.steps.len(), 8);
    assert_eq!(result.history.step("deploy-secrets").unwrap().status, StepStatus::Failed);
    assert!(result.history.step("deploy-worker").is_none());
    assert_eq!(executor.count("wrangler deploy --name"), 0);
    assert_eq!(result.history.status, RunStatus::Failed);
    assert!(result.compute_url.is_empty());
    assert_eq!(engine.last_state().await, RunState::Failed);
}

#[tokio::test]
async fn test_cors_failure_is_soft() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("--cors-file", Reply::fail(1, "AccessDeniedException: 403 permission denied"));
    let engine = engine(executor, FakeAccounts::new(), Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].step, "configure-bucket-cors");
    assert!(result.errors[0].error.contains("permission denied"));
    assert_eq!(
        result.history.step("configure-bucket-cors").unwrap().status,
        StepStatus::Warning
    );
    assert_eq!(
        result.history.step("deploy-static-site").unwrap().status,
        StepStatus::Completed
    );
    assert_eq!(result.history.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_concurrent_deploy_is_rejected() {
    let executor = Arc::new(GatedExecutor::new("wrangler deploy --name"));
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());
    let first_sink = RecordingSink::new();
    let second_sink = RecordingSink::new();
    let first_spec = spec();
    let second_spec = spec();

    let first = engine.deploy(&first_spec, &first_sink);
    let second = async {
        while !executor.reached.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        assert!(engine.is_running());
        let events_before = first_sink.events().len();

        let rejected = engine.deploy(&second_spec, &second_sink).await;

        assert_eq!(first_sink.events().len(), events_before);
        executor.gate.notify_one();
        rejected
    };

    let (first, second) = tokio::join!(first, second);

    let err = second.unwrap_err();
    assert!(matches!(err, DeployError::AlreadyInProgress));
    assert_eq!(err.to_string(), "deployment already in progress");
    assert!(second_sink.events().is_empty());

    let first = first.unwrap();
    assert!(first.success);
    assert_eq!(first.history.steps.len(), 10);

    // The flag is released, so the next run goes through
    assert!(!engine.is_running());
    executor.gate.notify_one();
    assert!(engine.deploy(&spec(), &NullSink).await.unwrap().success);
}

#[tokio::test]
async fn test_locked_out_identity_aborts() {
    let mut accounts = FakeAccounts::new();
    accounts.locked_out.push(Provider::B);
    let executor = Arc::new(ScriptedExecutor::new());
    let engine = engine(executor.clone(), accounts, Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("Interactive login required"));
    assert_eq!(result.login_required.as_deref(), Some("provider-b session expired"));
    assert_eq!(result.history.steps.len(), 2);
    assert_eq!(result.history.step("switch-accounts").unwrap().status, StepStatus::Failed);
    assert_eq!(executor.count("buckets"), 0);
}

#[tokio::test]
async fn test_unauthenticated_provider_aborts() {
    let mut accounts = FakeAccounts::new();
    accounts.unauthenticated.push(Provider::A);
    let engine = engine(Arc::new(ScriptedExecutor::new()), accounts, Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(!result.success);
    assert!(result.login_required.is_some());
    assert_eq!(result.errors[0].step, "check-auth");
    assert!(result.errors[0].error.contains("provider-a"));
}

#[tokio::test]
async fn test_project_file_mismatch_is_a_warning() {
    let mut accounts = FakeAccounts::new();
    accounts.project_file = "someone-elses-project".to_string();
    let engine = engine(Arc::new(ScriptedExecutor::new()), accounts, Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].step, "switch-accounts");
    assert!(result.errors[0].error.contains("someone-elses-project"));
    assert_eq!(result.history.step("switch-accounts").unwrap().status, StepStatus::Warning);
}

#[tokio::test]
async fn test_missing_prerequisite_aborts_before_provisioning() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("gcloud --version", Reply::fail(127, "sh: 1: gcloud: not found"));
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("gcloud"));
    assert!(result.login_required.is_none());
    assert_eq!(result.history.steps.len(), 1);
    assert_eq!(executor.calls().len(), 2);
}

#[tokio::test]
async fn test_worker_url_falls_back_to_convention() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("wrangler deploy --name", Reply::ok("Uploaded shop-api (1.2 sec)\nDeployed triggers\n"));
    executor.on("deployments list", Reply::fail(1, "Authentication error [code: 10000]"));
    let engine = engine(executor, FakeAccounts::new(), Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert_eq!(result.compute_url, "https://shop-api.workers.dev");
    assert_eq!(result.history.step("deploy-worker").unwrap().status, StepStatus::Completed);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn test_worker_url_from_deploy_output() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on(
        "wrangler deploy --name",
        Reply::ok("Uploaded shop-api (1.2 sec)\nPublished shop-api\n  https://shop-api.acme.workers.dev\n"),
    );
    let engine = engine(executor, FakeAccounts::new(), Settings::default());
    let sink = RecordingSink::new();

    let result = engine.deploy(&spec(), &sink).await.unwrap();

    assert_eq!(result.compute_url, "https://shop-api.acme.workers.dev");

    // Deploy output is streamed into the step log as it arrives
    let worker = result.history.step("deploy-worker").unwrap();
    assert_eq!(worker.logs.len(), 3);
    assert!(sink
        .events()
        .iter()
        .any(|e| e.log_line.as_deref() == Some("Published shop-api")));
}

#[tokio::test]
async fn test_static_site_failure_keeps_derived_url() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("pages deploy", Reply::fail(1, "No such directory: dist"));
    let engine = engine(executor, FakeAccounts::new(), Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();

    assert!(result.success);
    assert_eq!(result.static_url, "https://shop.pages.dev");
    assert_eq!(result.errors[0].step, "deploy-static-site");
    assert_eq!(
        result.history.step("deploy-static-site").unwrap().status,
        StepStatus::Warning
    );
}

#[tokio::test]
async fn test_static_site_disabled() {
    let executor = Arc::new(ScriptedExecutor::new());
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());
    let mut spec = spec();
    spec.deploy_static_site = false;

    let result = engine.deploy(&spec, &NullSink).await.unwrap();

    assert!(result.success);
    assert!(result.static_url.is_empty());
    assert_eq!(executor.count("pages"), 0);
    let record = result.history.step("deploy-static-site").unwrap();
    assert_eq!(record.status, StepStatus::Completed);
    assert!(record.details.contains("skipped"));
}

#[tokio::test]
async fn test_secrets_payload_removed_after_failed_push() {
    let executor = Arc::new(ScriptedExecutor::new());
    executor.on("secret bulk", Reply::fail(1, "upload failed"));
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());

    let result = engine.deploy(&spec(), &NullSink).await.unwrap();
    assert!(!result.success);

    let push = executor
        .calls()
        .into_iter()
        .find(|c| c.command.contains("secret bulk"))
        .unwrap();
    let (path, contents) = push.files.first().unwrap();
    let payload: serde_json::Value = serde_json::from_str(contents).unwrap();
    assert_eq!(payload["API_KEY"], "key-123");
    assert!(!path.exists());

    // Secret values never reach the step log
    let record = result.history.step("deploy-secrets").unwrap();
    assert!(record.logs.iter().all(|l| !l.contains("key-123")));
}

#[tokio::test]
async fn test_provider_a_calls_carry_account() {
    let executor = Arc::new(ScriptedExecutor::new());
    let engine = engine(executor.clone(), FakeAccounts::new(), Settings::default());

    engine.deploy(&spec(), &NullSink).await.unwrap();

    let deploy = executor
        .calls()
        .into_iter()
        .find(|c| c.command.contains("wrangler deploy --name shop-api"))
        .unwrap();
    assert_eq!(deploy.env.get("CLOUDFLARE_ACCOUNT_ID").map(String::as_str), Some("acc-1"));

    let bucket = executor
        .calls()
        .into_iter()
        .find(|c| c.command.contains("buckets create"))
        .unwrap();
    assert!(bucket.env.is_empty());
}
