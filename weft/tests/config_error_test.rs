// Tests for runtime configuration, worker options and error formatting


use std::time::Duration;

use serde_json::{json, Value};
use test_helpers::runtime_with_ceiling;
use weft::{
    CallError, Concurrency, Definitions, MessengerError, MutexError, PoolError, Reference,
    Runtime, RuntimeConfig, SharedMapError, SpawnError, StreamError, Task, ThrownError,
    WorkerData, WorkerOptions,
};

#[test]
fn test_concurrency_ceilings() {
    assert_eq!(Concurrency::Single.ceiling(8), 8);
    assert_eq!(Concurrency::Quarter.ceiling(8), 2);
    assert_eq!(Concurrency::Half.ceiling(8), 4);
    assert_eq!(Concurrency::Double.ceiling(8), 16);
    assert_eq!(Concurrency::Decuple.ceiling(3), 30);
    // Never below one worker.
    assert_eq!(Concurrency::Quarter.ceiling(2), 1);
    assert_eq!(Concurrency::Half.ceiling(1), 1);
}

#[test]
fn test_runtime_config_ceiling() {
    let config = RuntimeConfig {
        max_workers: Some(3),
        concurrency: Concurrency::Decuple,
        ..Default::default()
    };
    assert_eq!(config.ceiling(), 3);

    let config = RuntimeConfig {
        max_workers: Some(0),
        ..Default::default()
    };
    assert_eq!(config.ceiling(), 1);

    let config = RuntimeConfig::default();
    assert_eq!(config.ceiling(), num_cpus::get().max(1));
    assert_eq!(config.shared_map_multiplier, 10);
    assert!(config.launch_timeout.is_none());
}

#[test]
fn test_merge_with_worker_options() {
    let config = RuntimeConfig {
        default_stack_size: Some(256 * 1024),
        ..Default::default()
    };

    let merged = config.merge_with_worker_options(&WorkerOptions::default().priority());
    assert!(merged.priority);
    assert_eq!(merged.limits.stack_size, Some(256 * 1024));
    assert_eq!(merged.reference, Reference::Ref);

    let explicit = WorkerOptions::default()
        .with_stack_size(1024 * 1024)
        .unref()
        .named("indexer")
        .with_argv(["a", "b"]);
    let merged = config.merge_with_worker_options(&explicit);
    assert!(!merged.priority);
    assert_eq!(merged.limits.stack_size, Some(1024 * 1024));
    assert_eq!(merged.reference, Reference::Unref);
    assert_eq!(merged.name.as_deref(), Some("indexer"));
    assert_eq!(merged.argv, vec!["a", "b"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_threads_are_named() {
    let runtime = Runtime::new(RuntimeConfig {
        max_workers: Some(1),
        thread_name_prefix: "test-".to_string(),
        ..Default::default()
    });
    let entry = Definitions::new("names")
        .task("thread", |_, _| {
            Ok(json!(std::thread::current().name().unwrap_or_default()))
        })
        .into_entry();

    let named = Task::run(
        &runtime,
        entry.clone(),
        WorkerData::new("names"),
        "thread",
        vec![],
        WorkerOptions::default().named("indexer"),
    )
    .await
    .unwrap();
    assert_eq!(named, Some(json!("test-indexer")));

    let generated = Task::run(&runtime, entry, WorkerData::new("names"), "thread", vec![], WorkerOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert!(generated.as_str().unwrap().starts_with("test-"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pool_ceiling_can_change() {
    let runtime = runtime_with_ceiling(2);
    assert_eq!(runtime.pool().ceiling(), 2);
    runtime.pool().set_ceiling(0);
    assert_eq!(runtime.pool().ceiling(), 1);
    runtime.pool().set_concurrency(Concurrency::Double);
    assert_eq!(runtime.pool().ceiling(), num_cpus::get() * 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_join_waits_for_reffed_workers() {
    let runtime = runtime_with_ceiling(2);
    let entry = Definitions::new("slow")
        .task("nap", |_, _| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(Value::Null)
        })
        .into_entry();

    Task::run(&runtime, entry, WorkerData::new("slow"), "nap", vec![], WorkerOptions::default())
        .await
        .unwrap();
    runtime.join().await.unwrap();
    assert_eq!(runtime.pool().host().reffed(), 0);
}

#[test]
fn test_error_display() {
    assert_eq!(
        MutexError::NotLocked(0).to_string(),
        "Mutex is not locked (slot value: 0)"
    );
    assert_eq!(
        SharedMapError::KeyMissing("hits".to_string()).to_string(),
        "Key does not exist: hits"
    );
    assert_eq!(
        SharedMapError::InsufficientCapacity { fixed: 3, required: 5 }.to_string(),
        "Fixed size of 3 bytes is smaller than the 5 bytes of initial data"
    );
    assert_eq!(
        PoolError::NotOrchestrator("w-1".to_string()).to_string(),
        "Pool can only be used from the orchestrating thread, not from worker 'w-1'"
    );
    assert_eq!(
        CallError::Pool(PoolError::Spawn(SpawnError::ExitedBeforeInit(2))).to_string(),
        "Worker exited with code 2 before initialization completed"
    );
    assert_eq!(CallError::ExitedEarly(7).to_string(), "Worker exited early with code 7");
    assert_eq!(StreamError::Ended.to_string(), "Stream session has already ended");
    assert_eq!(
        MessengerError::Closed("news".to_string()).to_string(),
        "Messenger 'news' is closed"
    );
}

#[test]
fn test_thrown_errors_map_to_call_errors() {
    assert_eq!(
        CallError::from_thrown(ThrownError::task_not_found("sum")),
        CallError::TaskNotFound("sum".to_string())
    );

    let panicked = ThrownError::panicked("boom");
    assert_eq!(
        CallError::from_thrown(panicked.clone()),
        CallError::Uncaught(panicked)
    );

    let err = anyhow::anyhow!("disk full").context("saving report");
    let thrown = ThrownError::from_anyhow("save", &err);
    assert_eq!(thrown.to_string(), "save: saving report: disk full");
    assert_eq!(CallError::from_thrown(thrown.clone()), CallError::Thrown(thrown));
}
