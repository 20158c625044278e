//! Worker runs against a live queue server on an ephemeral port, and
//! directly against the store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use sensebatch_core::queue::UnresolvedQuery;
use sensebatch_core::types::{PendingUnit, ShardSpec};
use sensebatch_core::{ExitStatus, RetryPolicy, SenseError};
use sensebatch_server::router::build_router;
use sensebatch_worker::{
    QueueClient, StoreSource, WorkSource, Worker, WorkerOptions, WorkerOutcome,
};

use common::{seed_unit, spawn, test_store, ScriptedEngine};

/// The worker only reads the flag, so the sender may go away.
fn not_interrupted() -> watch::Receiver<bool> {
    watch::channel(false).1
}

fn client(base_url: &str) -> QueueClient {
    QueueClient::new(
        base_url,
        Duration::from_secs(5),
        RetryPolicy::new(Duration::from_secs(2)),
    )
    .expect("client")
}

fn worker(source: Arc<dyn WorkSource>, engine: Arc<ScriptedEngine>, options: WorkerOptions) -> Worker {
    Worker::new(source, engine, RetryPolicy::none(), options)
}

async fn unresolved_ids(base_url: &str) -> Vec<i64> {
    let units: Vec<PendingUnit> = reqwest::Client::new()
        .get(format!("{base_url}/unresolved"))
        .query(&UnresolvedQuery::default())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    units.into_iter().map(|u| u.unit_id).collect()
}

#[tokio::test]
async fn worker_resolves_one_unit_then_it_is_no_longer_offered() {
    let (_dir, store) = test_store().await;
    let story = store.insert_story("fixture", 1).await.unwrap();
    // Single-sense units are settled at ingestion and never offered.
    seed_unit(&store, story, "door", 1).await;
    let ambiguous = seed_unit(&store, story, "bank", 2).await;
    let base_url = spawn(build_router(store.clone())).await;

    assert_eq!(unresolved_ids(&base_url).await, vec![ambiguous]);

    let engine = Arc::new(ScriptedEngine::new());
    let options = WorkerOptions {
        limit: Some(1),
        ..WorkerOptions::default()
    };
    let summary = worker(Arc::new(client(&base_url)), engine.clone(), options)
        .run(not_interrupted())
        .await
        .unwrap();

    assert_eq!(summary.resolved, 1);
    assert_eq!(summary.outcome, WorkerOutcome::LimitReached);
    assert!(unresolved_ids(&base_url).await.is_empty());

    let unit = store.unit(ambiguous).await.unwrap().unwrap();
    assert_eq!(unit.resolved_label.as_deref(), Some("(other)"));
    assert_eq!(unit.resolving_source.as_deref(), Some("scripted"));
    assert!(unit.compute_time.is_some());

    let prompts = engine.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("(bank.n.02) -- bank sense 2"));
}

#[tokio::test]
async fn worker_pages_until_nothing_is_left() {
    let (_dir, store) = test_store().await;
    let story = store.insert_story("fixture", 1).await.unwrap();
    let mut ids = Vec::new();
    for word in ["bank", "bat", "pitch", "club", "bow"] {
        ids.push(seed_unit(&store, story, word, 3).await);
    }
    let base_url = spawn(build_router(store.clone())).await;

    let engine = Arc::new(ScriptedEngine::new().answer("bat", "bat.n.03"));
    let options = WorkerOptions {
        page_size: 2,
        ..WorkerOptions::default()
    };
    let summary = worker(Arc::new(client(&base_url)), engine, options)
        .run(not_interrupted())
        .await
        .unwrap();

    assert_eq!(summary.resolved, 5);
    assert_eq!(summary.outcome, WorkerOutcome::Exhausted);
    assert_eq!(summary.exit_status(), ExitStatus::Success);
    assert_eq!(store.count_unresolved().await.unwrap(), 0);
    let bat = store.unit(ids[1]).await.unwrap().unwrap();
    assert_eq!(bat.resolved_label.as_deref(), Some("bat.n.03"));
}

#[tokio::test]
async fn malformed_answer_leaves_the_unit_eligible() {
    let (_dir, store) = test_store().await;
    let story = store.insert_story("fixture", 1).await.unwrap();
    let bank = seed_unit(&store, story, "bank", 2).await;
    let bat = seed_unit(&store, story, "bat", 2).await;
    let base_url = spawn(build_router(store.clone())).await;

    let engine = Arc::new(ScriptedEngine::new().garble("bank"));
    let options = WorkerOptions {
        page_size: 1,
        ..WorkerOptions::default()
    };
    let summary = worker(Arc::new(client(&base_url)), engine, options)
        .run(not_interrupted())
        .await
        .unwrap();

    assert_eq!(summary.resolved, 1);
    assert_eq!(summary.skipped, vec![bank]);
    assert_eq!(summary.outcome, WorkerOutcome::Exhausted);
    assert_eq!(summary.exit_status(), ExitStatus::WorkRemains);

    assert!(store.unit(bank).await.unwrap().unwrap().resolved_label.is_none());
    assert!(store.unit(bat).await.unwrap().unwrap().resolved_label.is_some());
    assert_eq!(unresolved_ids(&base_url).await, vec![bank]);
}

#[tokio::test]
async fn limit_counts_resolved_units_not_skipped_ones() {
    let (_dir, store) = test_store().await;
    let story = store.insert_story("fixture", 1).await.unwrap();
    let bank = seed_unit(&store, story, "bank", 2).await;
    let bat = seed_unit(&store, story, "bat", 2).await;
    let pitch = seed_unit(&store, story, "pitch", 2).await;

    let engine = Arc::new(ScriptedEngine::new().garble("bank"));
    let options = WorkerOptions {
        page_size: 1,
        limit: Some(1),
        ..WorkerOptions::default()
    };
    let summary = worker(Arc::new(StoreSource::new(store.clone())), engine, options)
        .run(not_interrupted())
        .await
        .unwrap();

    assert_eq!(summary.skipped, vec![bank]);
    assert_eq!(summary.resolved, 1);
    assert_eq!(summary.outcome, WorkerOutcome::LimitReached);
    assert!(store.unit(bat).await.unwrap().unwrap().resolved_label.is_some());
    assert!(store.unit(pitch).await.unwrap().unwrap().resolved_label.is_none());
}

#[tokio::test]
async fn sharded_workers_split_the_queue() {
    let (_dir, store) = test_store().await;
    let odd = store.insert_story("fixture", 1).await.unwrap();
    let even = store.insert_story("fixture", 2).await.unwrap();
    let a = seed_unit(&store, odd, "bank", 2).await;
    let b = seed_unit(&store, even, "bat", 2).await;
    let base_url = spawn(build_router(store.clone())).await;

    let options = WorkerOptions {
        shard: Some(ShardSpec::new(even % 2, 2).unwrap()),
        ..WorkerOptions::default()
    };
    let summary = worker(Arc::new(client(&base_url)), Arc::new(ScriptedEngine::new()), options)
        .run(not_interrupted())
        .await
        .unwrap();

    assert_eq!(summary.resolved, 1);
    assert!(store.unit(b).await.unwrap().unwrap().resolved_label.is_some());
    assert!(store.unit(a).await.unwrap().unwrap().resolved_label.is_none());
}

#[tokio::test]
async fn direct_mode_records_costs() {
    let (_dir, store) = test_store().await;
    let story = store.insert_story("fixture", 1).await.unwrap();
    let bank = seed_unit(&store, story, "bank", 2).await;

    let engine = Arc::new(
        ScriptedEngine::new()
            .answer("bank", "bank.n.01")
            .with_usage(310, 12),
    );
    let source = Arc::new(StoreSource::new(store.clone()));
    let summary = worker(source, engine, WorkerOptions::default())
        .run(not_interrupted())
        .await
        .unwrap();

    assert_eq!(summary.resolved, 1);
    assert_eq!(summary.usage.prompt_tokens, 310);
    let costs = store.costs(bank).await.unwrap();
    assert_eq!(costs.len(), 1);
    assert_eq!(costs[0].completion_tokens, 12);
    assert_eq!(costs[0].source, "scripted");
}

#[tokio::test]
async fn interrupt_stops_before_the_next_unit() {
    let (_dir, store) = test_store().await;
    let story = store.insert_story("fixture", 1).await.unwrap();
    let bank = seed_unit(&store, story, "bank", 2).await;

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let summary = worker(
        Arc::new(StoreSource::new(store.clone())),
        Arc::new(ScriptedEngine::new()),
        WorkerOptions::default(),
    )
    .run(rx)
    .await
    .unwrap();

    assert_eq!(summary.outcome, WorkerOutcome::Interrupted);
    assert_eq!(summary.resolved, 0);
    assert_eq!(summary.exit_status(), ExitStatus::WorkRemains);
    assert!(store.unit(bank).await.unwrap().unwrap().resolved_label.is_none());
}

#[tokio::test]
async fn unreachable_server_gives_up_after_the_retry_cap() {
    // Bind and release a port so nothing is listening on it.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = QueueClient::new(
        &format!("http://{addr}"),
        Duration::from_secs(1),
        RetryPolicy::new(Duration::from_millis(800)),
    )
    .unwrap();
    let err = client.unresolved(None, 10).await.unwrap_err();
    assert!(matches!(err, SenseError::TransientNetwork(_)), "{err}");
}
