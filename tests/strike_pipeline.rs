//! End-to-end pipeline: raw notifications in, signed relay bundles out.

mod common;

use common::{addr, quote, test_chain_config, triangle_records, FakeConnectivity, RecordingRelay};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use arb_mesh::custody::{KeyCustody, LocalKeyCustody};
use arb_mesh::metrics::WorkerStats;
use arb_mesh::network::ExecutionRelay;
use arb_mesh::registry::StaticRegistry;
use arb_mesh::worker::ChainWorker;

use alloy::signers::local::PrivateKeySigner;

async fn wait_for<F: Fn() -> bool>(ready: F) -> bool {
    for _ in 0..250 {
        if ready() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    ready()
}

struct Harness {
    relay: Arc<RecordingRelay>,
    connectivity: Arc<FakeConnectivity>,
    stats: Arc<WorkerStats>,
    events: mpsc::Sender<serde_json::Value>,
    shutdown: tokio_util::sync::CancellationToken,
    handle: tokio::task::JoinHandle<Result<(), arb_mesh::error::MeshError>>,
}

async fn spawn_worker(chain_id: u64, relay: Arc<RecordingRelay>) -> Harness {
    let cfg = test_chain_config(chain_id);
    let connectivity = Arc::new(FakeConnectivity::new(100));
    let custody: Arc<dyn KeyCustody> =
        Arc::new(LocalKeyCustody::new(PrivateKeySigner::random()));
    let registry = Arc::new(StaticRegistry::new(triangle_records(chain_id)));

    let worker = ChainWorker::bootstrap(
        &cfg,
        connectivity.clone(),
        custody,
        Some(relay.clone() as Arc<dyn ExecutionRelay>),
        registry,
        false,
    )
    .await
    .expect("bootstrap");

    let stats = worker.stats();
    let shutdown = worker.shutdown_token();
    let (events, rx) = mpsc::channel(64);
    let handle = tokio::spawn(worker.run(rx));

    Harness {
        relay,
        connectivity,
        stats,
        events,
        shutdown,
        handle,
    }
}

#[tokio::test]
async fn profitable_triangle_is_struck_through_the_relay() {
    let harness = spawn_worker(31337, Arc::new(RecordingRelay::accepting())).await;
    let (a, b, c) = (addr(1), addr(2), addr(3));

    // 2.0 * 2.0 * 0.3 > 1: a negative cycle once the third quote lands.
    harness
        .events
        .send(quote(1, addr(11), a, b, 2.0))
        .await
        .unwrap();
    harness
        .events
        .send(quote(2, addr(12), b, c, 2.0))
        .await
        .unwrap();
    harness
        .events
        .send(quote(3, addr(13), c, a, 0.3))
        .await
        .unwrap();

    assert!(
        wait_for(|| harness.relay.submissions() >= 1).await,
        "relay never saw a bundle"
    );

    {
        let bundles = harness.relay.bundles.lock();
        let bundle = &bundles[0];
        assert_eq!(bundle.target_block, 101, "bundle targets head + 1");
        assert_eq!(bundle.raw_txs.len(), 1);
        assert_eq!(bundle.raw_txs[0][0], 0x02, "signed EIP-1559 payload");
    }
    // Private-relay mode never touches the public transaction pool.
    assert!(harness.connectivity.broadcasts.lock().is_empty());

    harness.shutdown.cancel();
    harness.handle.await.unwrap().unwrap();

    assert!(WorkerStats::get(&harness.stats.signals_profitable) >= 1);
    assert!(WorkerStats::get(&harness.stats.strikes_dispatched) >= 1);
    assert_eq!(WorkerStats::get(&harness.stats.malformed_events), 0);
}

#[tokio::test]
async fn unprofitable_market_never_reaches_the_relay() {
    let harness = spawn_worker(31337, Arc::new(RecordingRelay::accepting())).await;
    let (a, b, c) = (addr(1), addr(2), addr(3));

    // 2.0 * 2.0 * 0.52 < 1: no negative cycle.
    harness
        .events
        .send(quote(1, addr(11), a, b, 2.0))
        .await
        .unwrap();
    harness
        .events
        .send(quote(2, addr(12), b, c, 2.0))
        .await
        .unwrap();
    harness
        .events
        .send(quote(3, addr(13), c, a, 0.52))
        .await
        .unwrap();

    assert!(
        wait_for(|| WorkerStats::get(&harness.stats.passes_run) >= 3).await,
        "detection never ran"
    );

    harness.shutdown.cancel();
    harness.handle.await.unwrap().unwrap();

    assert_eq!(harness.relay.submissions(), 0);
    assert_eq!(WorkerStats::get(&harness.stats.signals_profitable), 0);
}

#[tokio::test]
async fn hop_without_pool_identity_aborts_before_the_dispatcher() {
    let harness = spawn_worker(31337, Arc::new(RecordingRelay::accepting())).await;
    let (a, b, c) = (addr(1), addr(2), addr(3));

    // The closing hop arrives through the zero pool address: the cycle is
    // detectable but carries no usable pool identity, so composition must
    // fail and the dispatcher must never be invoked.
    harness
        .events
        .send(quote(1, addr(11), a, b, 2.0))
        .await
        .unwrap();
    harness
        .events
        .send(quote(2, addr(12), b, c, 2.0))
        .await
        .unwrap();
    harness
        .events
        .send(quote(3, alloy::primitives::Address::ZERO, c, a, 0.3))
        .await
        .unwrap();

    assert!(
        wait_for(|| WorkerStats::get(&harness.stats.encoding_failures) >= 1).await,
        "composer never rejected the strike"
    );

    harness.shutdown.cancel();
    harness.handle.await.unwrap().unwrap();

    assert_eq!(harness.relay.submissions(), 0, "dispatcher was invoked");
    assert_eq!(WorkerStats::get(&harness.stats.strikes_dispatched), 0);
}

#[tokio::test]
async fn relay_rejection_is_a_counted_failure_not_a_stall() {
    let harness = spawn_worker(31337, Arc::new(RecordingRelay::rejecting("simulation reverted"))).await;
    let (a, b, c) = (addr(1), addr(2), addr(3));

    harness
        .events
        .send(quote(1, addr(11), a, b, 2.0))
        .await
        .unwrap();
    harness
        .events
        .send(quote(2, addr(12), b, c, 2.0))
        .await
        .unwrap();
    harness
        .events
        .send(quote(3, addr(13), c, a, 0.3))
        .await
        .unwrap();

    assert!(
        wait_for(|| WorkerStats::get(&harness.stats.dispatch_failures) >= 1).await,
        "rejection never surfaced"
    );

    // The worker keeps ingesting after the failed strike.
    harness
        .events
        .send(quote(9, addr(13), c, a, 0.9))
        .await
        .unwrap();
    assert!(
        wait_for(|| WorkerStats::get(&harness.stats.events_ingested) >= 4).await,
        "ingestion stalled after a dispatch failure"
    );

    harness.shutdown.cancel();
    harness.handle.await.unwrap().unwrap();
    assert_eq!(WorkerStats::get(&harness.stats.strikes_dispatched), 0);
}
