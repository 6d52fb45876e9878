//! Instrument, verify and roll back against in-memory targets.

mod support;

use obsinject::instrument::{ENTRYPOINT_MARKER, RESTART_NOTE};
use obsinject::runtime::{ExecOutput, MockRuntime, MockTarget};
use obsinject::{Framework, InstrumentationOrchestrator, InstrumentationStatus};
use std::sync::Arc;
use std::time::Duration;
use support::{express_target, flask_target, orchestrator, short_deadline_orchestrator, spring_target};

#[tokio::test]
async fn test_flask_full_sequence() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(flask_target("web"));
    let orchestrator = orchestrator(&runtime);

    let result = orchestrator.instrument("web").await;

    assert!(result.is_successful(), "{:?}", result.error);
    assert_eq!(result.framework, Framework::Flask);
    assert_eq!(result.modifications.len(), 5);
    assert_eq!(result.modifications.last().map(String::as_str), Some(RESTART_NOTE));
    assert_eq!(result.endpoints()["traces"], "http://otel-collector:4317");
    assert_eq!(result.endpoints()["metrics"], "http://localhost:9090/metrics");

    let bootstrap = runtime.file("web", "otel_init.py").unwrap();
    assert!(bootstrap.contains(r#""service.name": os.getenv("OTEL_SERVICE_NAME", "obs-stack-web")"#));
    assert!(bootstrap.contains("FlaskInstrumentor().instrument()"));

    let executed = runtime.executed("web");
    assert!(executed.iter().any(|c| c == "pip install --no-cache-dir -r /app/requirements.txt"));

    assert!(orchestrator.verify("web").await);
    assert_eq!(orchestrator.status("web").await, InstrumentationStatus::Instrumented);
}

#[tokio::test]
async fn test_instrument_twice_is_idempotent() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(express_target("shop"));
    let orchestrator = orchestrator(&runtime);

    let first = orchestrator.instrument("shop").await;
    assert!(first.is_successful(), "{:?}", first.error);
    let package_json = runtime.file("shop", "package.json").unwrap();
    let server_js = runtime.file("shop", "server.js").unwrap();

    let second = orchestrator.instrument("shop").await;
    assert!(second.is_successful(), "{:?}", second.error);
    assert_eq!(runtime.file("shop", "package.json").unwrap(), package_json);
    assert_eq!(runtime.file("shop", "server.js").unwrap(), server_js);
    assert_eq!(server_js.matches(ENTRYPOINT_MARKER).count(), 1);
    assert!(second.modifications[0].contains("already lists"));
}

#[tokio::test]
async fn test_rollback_leaves_manifest_in_place() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(flask_target("web"));
    let orchestrator = orchestrator(&runtime);

    assert!(orchestrator.instrument("web").await.is_successful());
    assert!(orchestrator.rollback("web").await);

    assert!(!orchestrator.verify("web").await);
    assert_eq!(orchestrator.status("web").await, InstrumentationStatus::NotInstrumented);
    assert!(runtime.file("web", "otel_init.py").is_none());
    let requirements = runtime.file("web", "requirements.txt").unwrap();
    assert!(requirements.contains("opentelemetry-sdk"));
    // Guarded import keeps the app bootable without the bootstrap.
    let app = runtime.file("web", "app.py").unwrap();
    assert!(app.contains("except ImportError:"));
}

#[tokio::test]
async fn test_unknown_target_fails_without_modifications() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(MockTarget::new("scratch"));

    let result = orchestrator(&runtime).instrument("scratch").await;

    assert_eq!(result.status, InstrumentationStatus::Failed);
    assert_eq!(result.framework, Framework::Unknown);
    assert!(result.modifications.is_empty());
    assert!(result.error.unwrap().contains("Could not detect framework"));
}

#[tokio::test]
async fn test_spring_boot_is_not_supported() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(spring_target("orders"));

    let result = orchestrator(&runtime).instrument("orders").await;

    assert_eq!(result.status, InstrumentationStatus::Failed);
    assert_eq!(result.framework, Framework::SpringBoot);
    assert!(result.modifications.is_empty());
    assert_eq!(
        result.error.as_deref(),
        Some("Instrumentation not supported for Spring Boot")
    );
    assert!(!InstrumentationOrchestrator::supported_frameworks().contains(&Framework::SpringBoot));
}

#[tokio::test]
async fn test_failed_step_reports_partial_log() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(
        flask_target("web").with_command("pip install", ExecOutput::failure(1, "network unreachable")),
    );

    let result = orchestrator(&runtime).instrument("web").await;

    assert_eq!(result.status, InstrumentationStatus::Failed);
    assert_eq!(result.modifications.len(), 3);
    let error = result.error.unwrap();
    assert!(error.starts_with("install dependencies:"), "{}", error);
    assert!(error.contains("network unreachable"));
}

#[tokio::test]
async fn test_missing_target_fails_fast() {
    let runtime = Arc::new(MockRuntime::new());
    let orchestrator = orchestrator(&runtime);

    let result = orchestrator.instrument("ghost").await;
    assert_eq!(result.status, InstrumentationStatus::Failed);
    assert!(result.error.unwrap().contains("not found"));
    assert!(!orchestrator.verify("ghost").await);
    assert!(!orchestrator.rollback("ghost").await);
}

#[tokio::test]
async fn test_batch_isolates_a_panicking_target() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(flask_target("t1"));
    runtime.add_target(express_target("t2"));
    runtime.add_target(flask_target("t3").with_panic_on_write());
    runtime.add_target(MockTarget::new("t4"));
    runtime.add_target(express_target("t5"));
    let ids: Vec<String> = (1..=5).map(|i| format!("t{}", i)).collect();

    let results = orchestrator(&runtime).instrument_many(&ids).await;

    assert_eq!(results.len(), 5);
    assert!(results["t1"].is_successful());
    assert!(results["t2"].is_successful());
    assert_eq!(results["t3"].status, InstrumentationStatus::Failed);
    assert!(results["t3"].error.as_deref().unwrap().contains("panicked"));
    assert_eq!(results["t4"].status, InstrumentationStatus::Failed);
    assert!(results["t5"].is_successful());
}

#[tokio::test]
async fn test_instrument_all_then_rollback_many() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(flask_target("web"));
    runtime.add_target(express_target("shop"));
    let orchestrator = orchestrator(&runtime);

    let results = orchestrator.instrument_all().await.unwrap();
    assert!(results.values().all(|r| r.is_successful()));

    let ids: Vec<String> = results.keys().cloned().collect();
    let verified = orchestrator.verify_many(&ids).await;
    assert!(verified.values().all(|ok| *ok));

    let rolled_back = orchestrator.rollback_many(&ids).await;
    assert!(rolled_back.values().all(|ok| *ok));
    let verified = orchestrator.verify_many(&ids).await;
    assert!(verified.values().all(|ok| !*ok));
}

#[tokio::test]
async fn test_failing_writes_fail_the_bootstrap_step() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(flask_target("web").with_failing_writes());

    let result = orchestrator(&runtime).instrument("web").await;

    assert_eq!(result.status, InstrumentationStatus::Failed);
    assert!(result.error.unwrap().starts_with("update requirements:"));
    assert!(result.modifications.is_empty());
}

#[tokio::test]
async fn test_stalled_install_hits_deadline_with_partial_log() {
    let runtime = Arc::new(MockRuntime::new());
    runtime.add_target(flask_target("web"));
    runtime.add_target(
        flask_target("stuck")
            .with_name("billing")
            .with_command_delay("pip install", Duration::from_secs(30)),
    );
    runtime.add_target(express_target("shop"));
    let ids: Vec<String> = ["web", "stuck", "shop"].iter().map(|s| s.to_string()).collect();

    let results = short_deadline_orchestrator(&runtime).instrument_many(&ids).await;

    assert_eq!(results.len(), 3);
    assert!(results["web"].is_successful());
    assert!(results["shop"].is_successful());

    let stuck = &results["stuck"];
    assert_eq!(stuck.status, InstrumentationStatus::Failed);
    assert_eq!(stuck.error.as_deref(), Some("timed out after 1s"));
    assert_eq!(stuck.framework, Framework::Flask);
    assert_eq!(stuck.target_name, "billing");
    assert_eq!(stuck.modifications.len(), 3);
}
