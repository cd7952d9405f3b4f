// Integration tests for service clusters


use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use test_helpers::{runtime_with_ceiling, wait_until, DEFAULT_WAIT_TIME};
use weft::{
    Call, CallError, CallTarget, Definitions, ServiceCluster, WorkerData, WorkerEntry,
    WorkerOptions,
};

#[derive(Call, Serialize, Deserialize)]
#[call(result = "i64")]
struct Double {
    value: i64,
}

fn entry() -> Arc<dyn WorkerEntry> {
    Definitions::new("pool-svc")
        .task("echo", |_, params| Ok(params.first().cloned().unwrap_or(Value::Null)))
        .task("sleep", |_, params| {
            let millis = params.first().and_then(Value::as_u64).unwrap_or(100);
            std::thread::sleep(Duration::from_millis(millis));
            Ok(Value::Null)
        })
        .task("quit", |scope, params| {
            scope.exit(params.first().and_then(Value::as_i64).unwrap_or(0) as i32)
        })
        .typed_task(|_, request: Double| Ok(request.value * 2))
        .into_entry()
}

fn cluster(ceiling: usize) -> (weft::Runtime, ServiceCluster) {
    let runtime = runtime_with_ceiling(ceiling);
    let cluster = ServiceCluster::new(&runtime, entry(), WorkerData::new("pool-svc"), WorkerOptions::default());
    (runtime, cluster)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_launch_stops_at_pool_ceiling() {
    let (runtime, cluster) = cluster(2);
    assert!(cluster.is_empty());

    let launched = cluster.launch(5).await.unwrap();
    assert_eq!(launched, 2);
    assert_eq!(cluster.ids(), vec!["service-0", "service-1"]);
    assert_eq!(runtime.pool().active_count(), 2);

    assert_eq!(cluster.launch(1).await.unwrap(), 0);
    cluster.close_all();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_launches_share_the_ceiling() {
    let (runtime, cluster) = cluster(2);

    let (first, second) = tokio::join!(cluster.launch(2), cluster.launch(2));
    assert_eq!(first.unwrap() + second.unwrap(), 2);
    assert_eq!(cluster.len(), 2);
    assert_eq!(runtime.pool().active_count(), 2);
    assert_eq!(runtime.pool().queued(), 0);

    cluster.close_all();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_calls_go_to_least_busy_member() {
    let (_runtime, cluster) = cluster(2);
    cluster.launch(2).await.unwrap();

    let first = cluster.use_service().unwrap();
    assert_eq!(first.id(), cluster.get("service-0").unwrap().id());

    let busy = {
        let first = first.clone();
        tokio::spawn(async move { first.call("sleep", vec![json!(300)]).await })
    };
    assert!(wait_until(DEFAULT_WAIT_TIME, || first.in_flight() == 1).await);

    let chosen = cluster.use_service().unwrap();
    assert_eq!(chosen.id(), cluster.get("service-1").unwrap().id());
    assert_eq!(cluster.call("echo", vec![json!("x")]).await.unwrap(), json!("x"));

    busy.await.unwrap().unwrap();
    cluster.close_all();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_use_id_falls_back_to_least_busy() {
    let (_runtime, cluster) = cluster(2);
    cluster.launch(2).await.unwrap();

    let named = cluster.use_id("service-1").unwrap();
    assert_eq!(named.id(), cluster.get("service-1").unwrap().id());
    assert!(cluster.get("service-9").is_none());
    assert!(cluster.use_id("service-9").is_some());
    cluster.close_all();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_auto_renew_replaces_crashed_member() {
    let (runtime, cluster) = cluster(2);
    let cluster = cluster.auto_renew(true);
    cluster.launch(1).await.unwrap();
    let original = cluster.get("service-0").unwrap().id();

    let err = cluster.call("quit", vec![json!(5)]).await.unwrap_err();
    assert_eq!(err, CallError::ExitedEarly(5));

    let renewed = wait_until(DEFAULT_WAIT_TIME, || {
        cluster
            .get("service-0")
            .map(|service| service.id() != original)
            .unwrap_or(false)
    })
    .await;
    assert!(renewed);
    assert_eq!(cluster.ids(), vec!["service-0"]);
    assert_eq!(cluster.call("echo", vec![json!(1)]).await.unwrap(), json!(1));
    assert_eq!(runtime.pool().active_count(), 1);
    cluster.close_all();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_clean_exit_is_not_renewed() {
    let (_runtime, cluster) = cluster(2);
    let cluster = cluster.auto_renew(true);
    cluster.launch(1).await.unwrap();

    let err = cluster.call("quit", vec![json!(0)]).await.unwrap_err();
    assert_eq!(err, CallError::Terminated);
    assert!(wait_until(DEFAULT_WAIT_TIME, || cluster.is_empty()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cluster.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crash_without_auto_renew_removes_member() {
    let (_runtime, cluster) = cluster(2);
    cluster.launch(2).await.unwrap();

    let victim = cluster.get("service-0").unwrap();
    assert_eq!(
        victim.call("quit", vec![json!(9)]).await.unwrap_err(),
        CallError::ExitedEarly(9)
    );
    assert!(wait_until(DEFAULT_WAIT_TIME, || cluster.ids() == vec!["service-1"]).await);
    cluster.close_all();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_all_empties_cluster() {
    let (runtime, cluster) = cluster(3);
    let cluster = cluster.auto_renew(true);
    cluster.launch(3).await.unwrap();

    cluster.close_all();
    assert!(cluster.is_empty());
    assert_eq!(cluster.call("echo", vec![]).await.unwrap_err(), CallError::Terminated);
    assert!(wait_until(DEFAULT_WAIT_TIME, || runtime.pool().active_count() == 0).await);
    assert!(cluster.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_typed_calls_through_call_target() {
    let (_runtime, cluster) = cluster(2);
    cluster.launch(2).await.unwrap();

    async fn double_on<T: CallTarget>(target: &T, value: i64) -> Result<i64, CallError> {
        target.call_typed(Double { value }).await
    }

    assert_eq!(double_on(&cluster, 21).await.unwrap(), 42);
    let member = cluster.use_service().unwrap();
    assert_eq!(double_on(&member, 4).await.unwrap(), 8);
    assert_eq!(Double::task_name(), "double");
    cluster.close_all();
}
