//! One isolated worker per target chain.
//!
//! A worker owns every piece of its state: graph, stats, backlog, clients.
//! Workers share nothing, so a fault or stall in one cannot touch another.
//! Within a worker, ingestion is a single ordered task and detection runs
//! as independent concurrent passes popped off the bounded backlog.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backlog::Backlog;
use crate::config::ChainConfig;
use crate::custody::KeyCustody;
use crate::error::MeshError;
use crate::graph::{CycleDetector, DetectionOutcome, MarketGraph};
use crate::ingest::EventIngestor;
use crate::metrics::WorkerStats;
use crate::network::{ChainConnectivity, ExecutionRelay};
use crate::registry::{seed_graph, PoolRegistry};
use crate::strike::{StrikeComposer, StrikeDispatcher};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

pub struct ChainWorker {
    name: String,
    graph: Arc<MarketGraph>,
    stats: Arc<WorkerStats>,
    backlog: Arc<Backlog>,
    detector: Arc<CycleDetector>,
    composer: StrikeComposer,
    dispatcher: Arc<StrikeDispatcher>,
    ingestor: Arc<EventIngestor>,
    shutdown: CancellationToken,
    detection_parallelism: usize,
}

impl ChainWorker {
    /// Build and seed a worker. Everything it owns is constructed here and
    /// torn down when `run` returns; nothing is process-global.
    pub async fn bootstrap(
        cfg: &ChainConfig,
        connectivity: Arc<dyn ChainConnectivity>,
        custody: Arc<dyn KeyCustody>,
        relay: Option<Arc<dyn ExecutionRelay>>,
        registry: Arc<dyn PoolRegistry>,
        dry_run: bool,
    ) -> Result<Self, MeshError> {
        let graph = Arc::new(MarketGraph::new());
        let records = registry.load(cfg.chain_id).await?;
        let seeded = seed_graph(&graph, &records);
        tracing::info!(
            target: "worker",
            chain = %cfg.name,
            pools = records.len(),
            vertices = graph.vertex_count(),
            edges = seeded,
            relay = cfg.relay_url.is_some(),
            "graph seeded from registry"
        );

        let start_nonce = match connectivity.transaction_count(custody.address()).await {
            Ok(nonce) => nonce,
            Err(e) if dry_run => {
                tracing::warn!(target: "worker", chain = %cfg.name, error = %e, "nonce priming failed, dry-run starts at 0");
                0
            }
            Err(e) => return Err(e),
        };

        let stats = Arc::new(WorkerStats::default());
        let backlog = Arc::new(Backlog::new(cfg.backlog_capacity));
        let detector = Arc::new(CycleDetector::new(graph.clone(), cfg.detection.clone()));
        let composer = StrikeComposer::new(cfg.detection.max_hops, cfg.slippage_bps);
        let dispatcher = Arc::new(StrikeDispatcher::new(
            cfg.chain_id,
            cfg.executor,
            cfg.gas.clone(),
            dry_run,
            connectivity,
            custody,
            relay,
            stats.clone(),
            start_nonce,
        ));
        let ingestor = Arc::new(EventIngestor::new(
            graph.clone(),
            backlog.clone(),
            stats.clone(),
        ));

        Ok(Self {
            name: cfg.name.clone(),
            graph,
            stats,
            backlog,
            detector,
            composer,
            dispatcher,
            ingestor,
            shutdown: CancellationToken::new(),
            detection_parallelism: cfg.detection_parallelism.max(1),
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    pub fn graph(&self) -> Arc<MarketGraph> {
        self.graph.clone()
    }

    /// Run until shutdown. Returns an error only for a worker-fatal fault
    /// (custody); everything event-scoped is contained inside the loops.
    pub async fn run(self, events: mpsc::Receiver<Value>) -> Result<(), MeshError> {
        let fatal = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        tasks.spawn(self.ingestor.clone().run(events, self.shutdown.clone()));

        for lane in 0..self.detection_parallelism {
            tasks.spawn(detection_loop(
                lane,
                self.name.clone(),
                self.backlog.clone(),
                self.detector.clone(),
                self.composer.clone(),
                self.dispatcher.clone(),
                self.stats.clone(),
                self.shutdown.clone(),
                fatal.clone(),
            ));
        }

        {
            let stats = self.stats.clone();
            let name = self.name.clone();
            let shutdown = self.shutdown.clone();
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(STATS_LOG_INTERVAL);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => {
                            tracing::debug!(target: "worker", chain = %name, "\n{}", stats.render());
                        }
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(target: "worker", chain = %self.name, error = %e, "worker task panicked");
                self.shutdown.cancel();
            }
        }

        if fatal.load(Ordering::SeqCst) {
            return Err(MeshError::Custody(format!(
                "worker {} stopped on a signing failure",
                self.name
            )));
        }
        Ok(())
    }
}

/// One detection lane: pop the newest pending job, run the pass, and walk
/// a profitable signal through compose and dispatch. Each signal gets
/// exactly one dispatch attempt and is then discarded.
#[allow(clippy::too_many_arguments)]
async fn detection_loop(
    lane: usize,
    chain: String,
    backlog: Arc<Backlog>,
    detector: Arc<CycleDetector>,
    composer: StrikeComposer,
    dispatcher: Arc<StrikeDispatcher>,
    stats: Arc<WorkerStats>,
    shutdown: CancellationToken,
    fatal: Arc<AtomicBool>,
) {
    while let Some(job) = backlog.pop_latest(&shutdown).await {
        WorkerStats::bump(&stats.passes_run);
        let signal = detector.run_pass(job.event, &job.seeds);
        match signal.outcome {
            DetectionOutcome::NoCycle => {}
            DetectionOutcome::TimedOut => WorkerStats::bump(&stats.passes_timed_out),
            DetectionOutcome::Fault => WorkerStats::bump(&stats.passes_faulted),
            DetectionOutcome::Profitable => {
                WorkerStats::bump(&stats.signals_profitable);
                match composer.compose(&signal) {
                    Ok(payload) => match dispatcher.dispatch(&signal, &payload).await {
                        Ok(outcome) => {
                            tracing::debug!(
                                target: "worker",
                                chain = %chain,
                                lane,
                                seq = signal.event.seq,
                                ?outcome,
                                "strike attempt settled"
                            );
                        }
                        Err(e) => {
                            // Custody is the only error dispatch lets out.
                            tracing::error!(
                                target: "worker",
                                chain = %chain,
                                error = %e,
                                "fatal custody failure, stopping worker"
                            );
                            fatal.store(true, Ordering::SeqCst);
                            shutdown.cancel();
                            return;
                        }
                    },
                    Err(e) => {
                        WorkerStats::bump(&stats.encoding_failures);
                        tracing::warn!(
                            target: "worker",
                            chain = %chain,
                            seq = signal.event.seq,
                            error = %e,
                            "strike aborted before dispatch"
                        );
                    }
                }
            }
        }
    }
}
