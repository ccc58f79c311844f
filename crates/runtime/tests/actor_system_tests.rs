//! Integration tests for actor lifecycle, mailbox semantics, and routing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use actor_runtime::{
    handler_fn, ActorDefinition, ActorId, ActorStatus, ActorSystem, HandlerMap, HandlerSpec,
    InMemoryRegistry, RuntimeConfig, RuntimeError, RuntimeTopics,
};

fn system_with(config: RuntimeConfig, registry: InMemoryRegistry) -> Arc<ActorSystem> {
    let _ = actor_runtime::init_logging("actor_runtime=debug");
    let registry = Arc::new(registry);
    Arc::new(ActorSystem::new(
        config,
        registry.clone(),
        registry,
        Vec::new(),
    ))
}

fn calculator_registry() -> InMemoryRegistry {
    let registry = InMemoryRegistry::new();
    registry
        .register_actor(
            ActorDefinition::new("calculator")
                .with_handler(HandlerSpec::new("add"))
                .with_handler(HandlerSpec::new("declared_only")),
        )
        .expect("valid definition");
    registry.register_implementation(
        "calculator",
        HandlerMap::new().with(
            "add",
            handler_fn(|payload: Value| async move {
                let a = payload["a"].as_i64().unwrap_or(0);
                let b = payload["b"].as_i64().unwrap_or(0);
                Ok(json!({ "result": a + b }))
            }),
        ),
    );
    registry
}

#[tokio::test]
async fn ask_returns_handler_output() {
    let system = system_with(RuntimeConfig::default(), calculator_registry());
    let actor = system.create_actor("calculator").expect("spawn");
    let out = actor
        .ask("add", json!({ "a": 2, "b": 3 }))
        .await
        .expect("reply");
    assert_eq!(out, json!({ "result": 5 }));
    system.shutdown().await;
}

#[tokio::test]
async fn unknown_and_unimplemented_handlers_are_rejected() {
    let system = system_with(RuntimeConfig::default(), calculator_registry());
    let actor = system.create_actor("calculator").expect("spawn");

    let err = actor.ask("nope", json!({})).await.expect_err("undeclared");
    assert!(matches!(err, RuntimeError::UnknownHandler { .. }));

    let err = actor
        .ask("declared_only", json!({}))
        .await
        .expect_err("unimplemented");
    assert!(matches!(err, RuntimeError::HandlerNotImplemented { .. }));
    system.shutdown().await;
}

#[tokio::test]
async fn messages_process_in_fifo_order_without_overlap() {
    let registry = InMemoryRegistry::new();
    registry
        .register_actor(
            ActorDefinition::new("recorder")
                .with_handler(HandlerSpec::new("record"))
                .with_handler(HandlerSpec::new("drain")),
        )
        .expect("valid definition");

    let seen: Arc<parking_lot::Mutex<Vec<i64>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let in_flight = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));

    let seen_h = seen.clone();
    let in_flight_h = in_flight.clone();
    let overlapped_h = overlapped.clone();
    let seen_d = seen.clone();
    registry.register_implementation(
        "recorder",
        HandlerMap::new()
            .with(
                "record",
                handler_fn(move |payload: Value| {
                    let seen = seen_h.clone();
                    let in_flight = in_flight_h.clone();
                    let overlapped = overlapped_h.clone();
                    async move {
                        if in_flight.swap(true, Ordering::SeqCst) {
                            overlapped.store(true, Ordering::SeqCst);
                        }
                        tokio::task::yield_now().await;
                        seen.lock().push(payload["n"].as_i64().unwrap_or(-1));
                        in_flight.store(false, Ordering::SeqCst);
                        Ok(json!({}))
                    }
                }),
            )
            .with(
                "drain",
                handler_fn(move |_| {
                    let seen = seen_d.clone();
                    async move { Ok(json!({ "count": seen.lock().len() })) }
                }),
            ),
    );

    let system = system_with(RuntimeConfig::default(), registry);
    let actor = system.create_actor("recorder").expect("spawn");
    for n in 0..20i64 {
        actor.tell("record", json!({ "n": n })).await;
    }
    // FIFO means this reply arrives only after every tell above.
    let out = actor.ask("drain", json!({})).await.expect("drain");
    assert_eq!(out, json!({ "count": 20 }));
    assert_eq!(*seen.lock(), (0..20).collect::<Vec<i64>>());
    assert!(!overlapped.load(Ordering::SeqCst));
    system.shutdown().await;
}

#[tokio::test]
async fn behavior_declared_handlers_are_callable() {
    let registry = InMemoryRegistry::new();
    let heartbeat =
        Arc::new(ActorDefinition::new("heartbeat").with_handler(HandlerSpec::new("ping")));
    registry
        .register_actor(
            ActorDefinition::new("service")
                .with_handler(HandlerSpec::new("serve"))
                .with_behavior(heartbeat),
        )
        .expect("valid definition");
    registry.register_implementation(
        "service",
        HandlerMap::new().with(
            "ping",
            handler_fn(|_| async move { Ok(json!({ "pong": true })) }),
        ),
    );

    let system = system_with(RuntimeConfig::default(), registry);
    let actor = system.create_actor("service").expect("spawn");
    let out = actor.ask("ping", json!({})).await.expect("behavior handler");
    assert_eq!(out, json!({ "pong": true }));
    system.shutdown().await;
}

#[tokio::test]
async fn messages_queued_before_restart_are_rejected_as_lifecycle_errors() {
    let registry = InMemoryRegistry::new();
    registry
        .register_actor(ActorDefinition::new("gate").with_handler(HandlerSpec::new("pass")))
        .expect("valid definition");

    let entered = Arc::new(tokio::sync::Notify::new());
    let release = Arc::new(tokio::sync::Notify::new());
    let entered_h = entered.clone();
    let release_h = release.clone();
    registry.register_implementation(
        "gate",
        HandlerMap::new().with(
            "pass",
            handler_fn(move |_| {
                let entered = entered_h.clone();
                let release = release_h.clone();
                async move {
                    entered.notify_one();
                    release.notified().await;
                    Ok(json!({}))
                }
            }),
        ),
    );

    let system = system_with(RuntimeConfig::default(), registry);
    let actor = system.create_actor("gate").expect("spawn");

    // First ask occupies the worker, second sits queued behind it.
    let first = {
        let actor = actor.clone();
        tokio::spawn(async move { actor.ask("pass", json!({})).await })
    };
    entered.notified().await;
    let second = {
        let actor = actor.clone();
        tokio::spawn(async move { actor.ask("pass", json!({})).await })
    };
    tokio::task::yield_now().await;

    // Restart while the second message is still queued: its epoch is stale.
    actor.stop();
    actor.restart().expect("restart from stopped");
    release.notify_one();

    // The in-flight message finishes normally.
    assert!(first.await.expect("join").is_ok());
    let err = second.await.expect("join").expect_err("stale envelope");
    assert!(matches!(err, RuntimeError::ActorStopped(_)));
    assert!(err.to_string().contains("cannot send to stopped actor"));
    system.shutdown().await;
}

#[tokio::test]
async fn stopped_actor_rejects_sends_and_counts_dead_letters() {
    let system = system_with(RuntimeConfig::default(), calculator_registry());
    let actor = system.create_actor("calculator").expect("spawn");
    let mut dead_letters = system.events().subscribe(RuntimeTopics::DEAD_LETTER).await;

    actor.stop();
    assert_eq!(actor.status(), ActorStatus::Stopped);

    let err = actor
        .ask("add", json!({ "a": 1, "b": 1 }))
        .await
        .expect_err("stopped");
    assert!(err.to_string().contains("cannot send to stopped actor"));
    assert!(dead_letters.recv().await.is_ok());
    assert_eq!(system.metrics().dead_letters, 1);
    system.shutdown().await;
}

#[tokio::test]
async fn restart_returns_actor_to_idle_and_clears_mailbox() {
    let system = system_with(RuntimeConfig::default(), calculator_registry());
    let actor = system.create_actor("calculator").expect("spawn");

    actor.stop();
    let err = actor.restart().err();
    assert!(err.is_none(), "restart from stopped should succeed");
    assert_eq!(actor.status(), ActorStatus::Idle);

    let out = actor
        .ask("add", json!({ "a": 4, "b": 5 }))
        .await
        .expect("works after restart");
    assert_eq!(out, json!({ "result": 9 }));

    // Restarting a live actor is a validation error.
    assert!(matches!(
        actor.restart(),
        Err(RuntimeError::Validation(_))
    ));
    system.shutdown().await;
}

#[tokio::test]
async fn tell_mode_handler_failure_marks_actor_failed() {
    let registry = InMemoryRegistry::new();
    registry
        .register_actor(ActorDefinition::new("flaky").with_handler(HandlerSpec::new("explode")))
        .expect("valid definition");
    registry.register_implementation(
        "flaky",
        HandlerMap::new().with(
            "explode",
            handler_fn(|_| async move { Err(anyhow::anyhow!("boom")) }),
        ),
    );
    let system = system_with(RuntimeConfig::default(), registry);
    let actor = system.create_actor("flaky").expect("spawn");
    let mut dead_letters = system.events().subscribe(RuntimeTopics::DEAD_LETTER).await;

    actor.tell("explode", json!({})).await;
    assert!(dead_letters.recv().await.is_ok());
    assert_eq!(actor.status(), ActorStatus::Failed);
    assert_eq!(actor.failure_count(), 1);

    // Failed actors accept a restart.
    actor.restart().expect("restart from failed");
    assert_eq!(actor.status(), ActorStatus::Idle);
    assert_eq!(actor.failure_count(), 0);
    system.shutdown().await;
}

#[tokio::test]
async fn ask_mode_handler_failure_goes_to_caller_not_status() {
    let registry = InMemoryRegistry::new();
    registry
        .register_actor(ActorDefinition::new("flaky").with_handler(HandlerSpec::new("explode")))
        .expect("valid definition");
    registry.register_implementation(
        "flaky",
        HandlerMap::new().with(
            "explode",
            handler_fn(|_| async move { Err(anyhow::anyhow!("boom")) }),
        ),
    );
    let system = system_with(RuntimeConfig::default(), registry);
    let actor = system.create_actor("flaky").expect("spawn");

    let err = actor.ask("explode", json!({})).await.expect_err("boom");
    assert!(matches!(err, RuntimeError::Handler(_)));
    assert_eq!(actor.status(), ActorStatus::Idle);
    system.shutdown().await;
}

#[tokio::test]
async fn routing_by_id_and_unknown_actor_dead_letter() {
    let system = system_with(RuntimeConfig::default(), calculator_registry());
    let actor = system.create_actor("calculator").expect("spawn");

    let out = system
        .ask(actor.id(), "add", json!({ "a": 10, "b": 20 }))
        .await
        .expect("routed");
    assert_eq!(out, json!({ "result": 30 }));

    let missing = ActorId::new();
    let err = system
        .ask(missing, "add", json!({}))
        .await
        .expect_err("unknown");
    assert!(matches!(err, RuntimeError::UnknownActor(_)));
    assert_eq!(system.metrics().dead_letters, 1);
    system.shutdown().await;
}

#[tokio::test]
async fn capacity_limit_refuses_spawn() {
    let config = RuntimeConfig {
        max_actors: 1,
        ..Default::default()
    };
    let system = system_with(config, calculator_registry());
    system.create_actor("calculator").expect("first spawn");
    let err = system.create_actor("calculator").expect_err("over capacity");
    assert!(matches!(err, RuntimeError::CapacityExceeded(1)));

    let err = system.create_actor("missing").expect_err("unknown definition");
    assert!(matches!(err, RuntimeError::UnknownDefinition(_)));
    system.shutdown().await;
}

#[tokio::test]
async fn metrics_count_processed_messages_and_active_actors() {
    let system = system_with(RuntimeConfig::default(), calculator_registry());
    let a = system.create_actor("calculator").expect("spawn");
    let b = system.create_actor("calculator").expect("spawn");

    a.ask("add", json!({ "a": 1, "b": 1 })).await.expect("ok");
    b.ask("add", json!({ "a": 2, "b": 2 })).await.expect("ok");
    b.ask("add", json!({ "a": 3, "b": 3 })).await.expect("ok");

    let snapshot = system.metrics();
    assert_eq!(snapshot.active_actors, 2);
    assert_eq!(snapshot.messages_processed, 3);
    assert_eq!(snapshot.dead_letters, 0);

    a.stop();
    assert_eq!(system.metrics().active_actors, 1);
    system.shutdown().await;
}

#[tokio::test]
async fn shutdown_terminates_workers() {
    let registry = InMemoryRegistry::new();
    registry
        .register_actor(ActorDefinition::new("slow").with_handler(HandlerSpec::new("work")))
        .expect("valid definition");
    let started = Arc::new(AtomicU64::new(0));
    let started_h = started.clone();
    registry.register_implementation(
        "slow",
        HandlerMap::new().with(
            "work",
            handler_fn(move |_| {
                started_h.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    Ok(json!({}))
                }
            }),
        ),
    );
    let system = system_with(RuntimeConfig::default(), registry);
    let actor = system.create_actor("slow").expect("spawn");
    actor.ask("work", json!({})).await.expect("ok");
    system.shutdown().await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
}
