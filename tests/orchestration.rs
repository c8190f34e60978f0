//! End-to-end flows over in-process backends: submit, confirm, execute,
//! fail over, cancel.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use toolmesh_catalog::ToolCatalog;
use toolmesh_core_types::{
    BackendName, ExecutionMode, SessionId, ToolCall, ToolContent, ToolDescriptor, ToolSpec,
};
use toolmesh_engine::{CallState, EngineConfig, TaskExecutionEngine};
use toolmesh_gateway::{ConfirmationGateway, Resolution};
use toolmesh_planner::ExecutionPlanner;
use toolmesh_registry::{BackendConfig, BackendRegistry, ToolRouter, TransportKind};
use toolmesh_transport::{LocalTransport, TransportError, TransportErrorKind};

fn descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: String::new(),
        input_schema: json!({ "type": "object" }),
    }
}

fn serving_backend(tools: &[&str]) -> Arc<LocalTransport> {
    let transport = LocalTransport::new();
    for tool in tools {
        let name = tool.to_string();
        let spec = descriptor(&name);
        transport.register_fn(spec, move |args| {
            Ok(ToolContent {
                content: json!({ "tool": name, "echo": args }),
                is_error: false,
            })
        });
    }
    Arc::new(transport)
}

fn failing_backend(tools: &[&str]) -> Arc<LocalTransport> {
    let transport = LocalTransport::new();
    for tool in tools {
        transport.register_fn(descriptor(tool), |_| {
            Err(TransportError::new(TransportErrorKind::Io).with_hint("socket reset"))
        });
    }
    Arc::new(transport)
}

fn config(name: &str, priority: u8) -> BackendConfig {
    BackendConfig::new(name, TransportKind::Local, "local://test")
        .with_priority(priority)
        .with_retry_count(0)
}

fn engine_for(
    registry: Arc<BackendRegistry>,
    specs: Vec<ToolSpec>,
) -> TaskExecutionEngine<BackendRegistry> {
    let catalog = ToolCatalog::new();
    for spec in specs {
        catalog.register(spec).unwrap();
    }
    TaskExecutionEngine::new(
        registry,
        ExecutionPlanner::new(Arc::new(catalog)),
        Arc::new(ConfirmationGateway::new()),
        EngineConfig {
            max_retries: 1,
            retry_base_delay_ms: 1,
            confirmation_timeout_ms: Some(5_000),
        },
    )
}

#[tokio::test]
async fn submit_confirm_execute_flow() {
    let registry = Arc::new(BackendRegistry::new());
    registry
        .register(
            config("worker", 5),
            serving_backend(&["fetchPage", "commit", "report"]),
        )
        .await
        .unwrap();

    let engine = engine_for(
        Arc::clone(&registry),
        vec![
            ToolSpec::new("fetchPage", ExecutionMode::Parallel),
            ToolSpec::new("commit", ExecutionMode::Serial)
                .with_confirmation()
                .with_dependencies(["fetchPage"]),
            ToolSpec::new("report", ExecutionMode::Parallel).with_dependencies(["commit"]),
        ],
    );
    let gateway = engine.gateway();
    let mut interactions = gateway.subscribe();

    let session = SessionId::new();
    let plan = engine
        .submit(
            session.clone(),
            vec![
                ToolCall::new("report"),
                ToolCall::new("fetchPage").with_args(json!({ "url": "https://example.com" })),
                ToolCall::new("commit"),
            ],
        )
        .unwrap();
    assert_eq!(plan.phases.len(), 3);

    // The middle phase is gated; approve it when it shows up.
    let interaction = interactions.recv().await.unwrap();
    assert!(engine
        .resolve_confirmation(&session, &interaction.id, Resolution::Confirmed)
        .unwrap());

    let status = engine.wait(&session).await.unwrap();
    assert_eq!(status.progress.completed, 3);
    assert!(status.progress.is_terminal());
    for call in &status.calls {
        assert_eq!(call.state, CallState::Completed);
        assert_eq!(call.backend, Some(BackendName::new("worker")));
    }
    let fetched = status
        .calls
        .iter()
        .find(|call| call.tool == "fetchPage")
        .unwrap();
    let payload = fetched.result.as_ref().unwrap();
    assert_eq!(payload.content["echo"]["url"], "https://example.com");
}

#[tokio::test]
async fn denied_confirmation_stops_the_plan() {
    let registry = Arc::new(BackendRegistry::new());
    registry
        .register(config("worker", 5), serving_backend(&["fetchPage", "commit"]))
        .await
        .unwrap();

    let engine = engine_for(
        Arc::clone(&registry),
        vec![
            ToolSpec::new("fetchPage", ExecutionMode::Parallel),
            ToolSpec::new("commit", ExecutionMode::Interactive).with_dependencies(["fetchPage"]),
        ],
    );
    let gateway = engine.gateway();
    let mut interactions = gateway.subscribe();

    let session = SessionId::new();
    engine
        .submit(
            session.clone(),
            vec![ToolCall::new("fetchPage"), ToolCall::new("commit")],
        )
        .unwrap();

    let interaction = interactions.recv().await.unwrap();
    engine
        .resolve_confirmation(&session, &interaction.id, Resolution::Denied)
        .unwrap();

    let status = engine.wait(&session).await.unwrap();
    assert_eq!(status.progress.completed, 1);
    assert_eq!(status.progress.failed, 1);
    let commit = status.calls.iter().find(|c| c.tool == "commit").unwrap();
    assert_eq!(commit.state, CallState::Failed);
}

#[tokio::test]
async fn failing_primary_backend_fails_over() {
    let registry = Arc::new(BackendRegistry::new());
    registry
        .register(config("flaky", 9), failing_backend(&["capture"]))
        .await
        .unwrap();
    registry
        .register(config("steady", 5), serving_backend(&["capture"]))
        .await
        .unwrap();

    let engine = engine_for(
        Arc::clone(&registry),
        vec![ToolSpec::new("capture", ExecutionMode::Parallel)],
    );

    let session = SessionId::new();
    engine
        .submit(session.clone(), vec![ToolCall::new("capture")])
        .unwrap();
    let status = engine.wait(&session).await.unwrap();

    assert_eq!(status.progress.completed, 1);
    assert_eq!(status.calls[0].backend, Some(BackendName::new("steady")));

    let snapshots = registry.backends().await;
    let flaky = snapshots.iter().find(|s| s.name.0 == "flaky").unwrap();
    assert!(flaky.error_count >= 1);
}

#[tokio::test]
async fn cancelled_session_settles_every_call() {
    let registry = Arc::new(BackendRegistry::new());
    let transport = LocalTransport::new();
    transport.register(
        descriptor("slowScan"),
        Arc::new(|_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok::<_, TransportError>(ToolContent {
                    content: json!({}),
                    is_error: false,
                })
            })
        }),
    );
    registry
        .register(config("worker", 5), Arc::new(transport))
        .await
        .unwrap();

    let engine = engine_for(
        Arc::clone(&registry),
        vec![ToolSpec::new("slowScan", ExecutionMode::Parallel)],
    );

    let session = SessionId::new();
    engine
        .submit(session.clone(), vec![ToolCall::new("slowScan")])
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.cancel(&session).unwrap();

    let status = engine.wait(&session).await.unwrap();
    assert_eq!(status.progress.pending, 0);
    assert_eq!(status.progress.running, 0);
    assert_eq!(status.progress.failed, 1);
    assert_eq!(status.calls[0].state, CallState::Failed);
}
