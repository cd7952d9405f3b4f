// Integration tests for pool admission


use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use test_helpers::{runtime_with_ceiling, wait_until, DEFAULT_WAIT_TIME};
use weft::{
    Definitions, PoolError, PoolItem, Runtime, Service, Task, WorkerData, WorkerEntry,
    WorkerOptions,
};

fn gate() -> Arc<dyn WorkerEntry> {
    Definitions::new("gate").into_entry()
}

fn recorder(order: Arc<Mutex<Vec<String>>>) -> Arc<dyn WorkerEntry> {
    Definitions::new("recorder")
        .task("record", move |scope, _| {
            let label = scope.payload().as_str().unwrap_or_default().to_string();
            order.lock().unwrap().push(label);
            Ok(Value::Null)
        })
        .into_entry()
}

fn spawn_record(
    runtime: &Runtime,
    entry: Arc<dyn WorkerEntry>,
    label: &str,
    options: WorkerOptions,
) -> tokio::task::JoinHandle<()> {
    let runtime = runtime.clone();
    let data = WorkerData::new("recorder").with_payload(json!(label));
    tokio::spawn(async move {
        Task::run(&runtime, entry, data, "record", vec![], options)
            .await
            .unwrap();
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ceiling_queues_excess_requests() {
    let runtime = runtime_with_ceiling(1);
    let pool = runtime.pool();
    assert_eq!(pool.ceiling(), 1);

    let service = Service::launch(&runtime, gate(), WorkerData::new("gate"), WorkerOptions::default())
        .await
        .unwrap();
    assert_eq!(pool.active_count(), 1);

    let order = Arc::new(Mutex::new(Vec::new()));
    let waiting = spawn_record(&runtime, recorder(order.clone()), "queued", WorkerOptions::default());
    assert!(wait_until(DEFAULT_WAIT_TIME, || pool.queued() == 1).await);
    assert_eq!(pool.active_count(), 1);
    assert!(order.lock().unwrap().is_empty());

    service.close();
    waiting.await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["queued"]);
    assert!(wait_until(DEFAULT_WAIT_TIME, || pool.active_count() == 0).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_priority_requests_jump_the_queue() {
    let runtime = runtime_with_ceiling(1);
    let pool = runtime.pool();
    let service = Service::launch(&runtime, gate(), WorkerData::new("gate"), WorkerOptions::default())
        .await
        .unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let entry = recorder(order.clone());
    let mut waiting = Vec::new();
    for (expected, (label, options)) in [
        ("first", WorkerOptions::default()),
        ("second", WorkerOptions::default()),
        ("urgent", WorkerOptions::default().priority()),
    ]
    .into_iter()
    .enumerate()
    {
        waiting.push(spawn_record(&runtime, entry.clone(), label, options));
        assert!(wait_until(DEFAULT_WAIT_TIME, || pool.queued() == expected + 1).await);
    }

    service.close();
    for handle in waiting {
        handle.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec!["urgent", "first", "second"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_threads_cannot_enqueue() {
    let runtime = runtime_with_ceiling(2);
    let inner_runtime = runtime.clone();
    let entry = Definitions::new("nested")
        .task("spawn_inner", move |_, _| {
            let (item, _ticket) = PoolItem::new(
                Definitions::new("never").into_entry(),
                WorkerData::new("never"),
                WorkerOptions::default(),
            );
            let refused = matches!(
                inner_runtime.pool().enqueue(item),
                Err(PoolError::NotOrchestrator(_))
            );
            Ok(json!(refused))
        })
        .into_entry();

    let refused = Task::run(&runtime, entry, WorkerData::new("nested"), "spawn_inner", vec![], WorkerOptions::default())
        .await
        .unwrap();
    assert_eq!(refused, Some(json!(true)));
    assert_eq!(runtime.pool().queued(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_messenger_callbacks_cannot_enqueue() {
    let runtime = runtime_with_ceiling(2);
    let inner_runtime = runtime.clone();
    let (tx, rx) = flume::unbounded();
    let entry = Definitions::new("listener")
        .init(move |scope| {
            let runtime = inner_runtime.clone();
            let tx = tx.clone();
            scope
                .messenger("control")
                .on_message(move |_| {
                    let (item, _ticket) = PoolItem::new(
                        Definitions::new("never").into_entry(),
                        WorkerData::new("never"),
                        WorkerOptions::default(),
                    );
                    let _ = tx.send(runtime.pool().enqueue(item));
                })
                .detach();
            Ok(())
        })
        .into_entry();
    let service = Service::launch(&runtime, entry, WorkerData::new("listener"), WorkerOptions::default())
        .await
        .unwrap();

    let control = runtime.messenger("control");
    control.send(json!("go")).unwrap();
    let outcome = rx.recv_async().await.unwrap();
    assert!(matches!(outcome, Err(PoolError::NotOrchestrator(_))));
    assert_eq!(runtime.pool().queued(), 0);
    service.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_refuses_and_fails_queued() {
    let runtime = runtime_with_ceiling(1);
    let pool = runtime.pool();
    let service = Service::launch(&runtime, gate(), WorkerData::new("gate"), WorkerOptions::default())
        .await
        .unwrap();

    let (item, ticket) = PoolItem::new(gate(), WorkerData::new("gate"), WorkerOptions::default());
    pool.enqueue(item).unwrap();
    assert_eq!(pool.queued(), 1);

    pool.shutdown();
    assert_eq!(ticket.await.unwrap_err(), PoolError::ShutDown);
    assert_eq!(pool.queued(), 0);

    let (item, _ticket) = PoolItem::new(gate(), WorkerData::new("gate"), WorkerOptions::default());
    assert_eq!(pool.enqueue(item).unwrap_err(), PoolError::ShutDown);

    // Running workers are untouched.
    assert!(service.is_running());
    service.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_raising_the_ceiling_admits_waiting_requests() {
    let runtime = runtime_with_ceiling(1);
    let pool = runtime.pool();
    let service = Service::launch(&runtime, gate(), WorkerData::new("gate"), WorkerOptions::default())
        .await
        .unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let waiting = spawn_record(&runtime, recorder(order.clone()), "late", WorkerOptions::default());
    assert!(wait_until(DEFAULT_WAIT_TIME, || pool.queued() == 1).await);

    pool.set_ceiling(2);
    waiting.await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["late"]);
    assert!(service.is_running());
    service.close();
}
