// tests/resilience.rs
//! Retry, pacing, and failure classification against a scripted workspace.

mod common;

use common::{config_for, FakeWorkspace};
use notion2records::{
    ApiRequest, AppError, ExtractionOrchestrator, FailureKind, RequestGovernor, ResilientClient,
    RetryPolicy, Transport,
};
use std::sync::Arc;
use std::time::Duration;

fn client_over(
    workspace: &Arc<FakeWorkspace>,
    governor: Arc<RequestGovernor>,
    max_retries: u32,
) -> ResilientClient {
    let mut config = config_for(&[]);
    config.max_retries = max_retries;
    let transport: Arc<dyn Transport> = workspace.clone();
    ResilientClient::new(
        transport,
        governor,
        Arc::new(config.credentials.clone()),
        RetryPolicy::from_config(&config),
        Duration::from_secs(30),
    )
}

#[tokio::test(start_paused = true)]
async fn rate_limited_calls_are_retried_through_the_governor() {
    let workspace = Arc::new(FakeWorkspace::new());
    workspace.script("GET users/me", &[429, 429, 429]);
    let governor = Arc::new(RequestGovernor::new(1.0, 1));
    let client = client_over(&workspace, Arc::clone(&governor), 5);

    let me = client.execute(&ApiRequest::get("users/me")).await.unwrap();

    assert_eq!(me["object"], "user");
    assert_eq!(workspace.requests().len(), 4);
    // Every backoff is shorter than one refill interval.
    assert_eq!(governor.stats().throttled, 3);
    assert_eq!(governor.stats().granted, 4);

    let stats = client.stats();
    assert_eq!(stats.calls, 4);
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.successes, 1);
}

#[tokio::test(start_paused = true)]
async fn permanent_failures_are_not_retried() {
    for (status, kind) in [
        (400, FailureKind::Validation),
        (401, FailureKind::Authentication),
        (403, FailureKind::PermissionDenied),
        (404, FailureKind::NotFound),
    ] {
        let workspace = Arc::new(FakeWorkspace::new());
        workspace.script("GET users/me", &[status]);
        let client = client_over(&workspace, Arc::new(RequestGovernor::new(10.0, 10)), 5);

        let err = client.execute(&ApiRequest::get("users/me")).await.unwrap_err();

        assert_eq!(err.kind(), Some(kind), "status {}", status);
        assert_eq!(workspace.requests().len(), 1, "status {}", status);
        assert_eq!(client.stats().retries, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn persistent_server_errors_exhaust_the_retry_budget() {
    let workspace = Arc::new(FakeWorkspace::new());
    workspace.script("GET users/me", &[500, 502, 503, 500]);
    let client = client_over(&workspace, Arc::new(RequestGovernor::new(10.0, 10)), 2);

    let started = tokio::time::Instant::now();
    let err = client.execute(&ApiRequest::get("users/me")).await.unwrap_err();

    match err {
        AppError::RetriesExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.kind(), Some(FailureKind::ServerError));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    assert_eq!(workspace.requests().len(), 3);
    // 0.1s then 0.2s of backoff, each with at most 10% jitter.
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn check_reports_the_workspace_user() {
    let workspace = Arc::new(FakeWorkspace::new());
    let orchestrator = ExtractionOrchestrator::new(config_for(&[]), workspace.clone());

    let status = orchestrator.check().await;

    assert!(status.succeeded);
    assert_eq!(status.message, "Connected to Notion workspace as Extractor");
}

#[tokio::test(start_paused = true)]
async fn check_explains_missing_permissions() {
    let workspace = Arc::new(FakeWorkspace::new());
    workspace.script("GET users/me", &[403]);
    let orchestrator = ExtractionOrchestrator::new(config_for(&[]), workspace.clone());

    let status = orchestrator.check().await;

    assert!(!status.succeeded);
    assert!(status.message.contains("permissions"));
    assert_eq!(workspace.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn check_fails_on_bad_credentials() {
    let workspace = Arc::new(FakeWorkspace::new());
    workspace.script("GET users/me", &[401]);
    let orchestrator = ExtractionOrchestrator::new(config_for(&[]), workspace.clone());

    let status = orchestrator.check().await;

    assert!(!status.succeeded);
    assert_eq!(workspace.requests().len(), 1);
}
