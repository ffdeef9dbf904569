//! Event ingestion: the single ordered consumer of market-event
//! notifications for one worker.
//!
//! Each accepted event updates the graph in place and schedules one
//! non-blocking detection pass. Nothing downstream of an event (detection,
//! composition, dispatch) can stall this loop.

use alloy::primitives::Address;
use dashmap::DashSet;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backlog::{Backlog, DetectionJob};
use crate::error::MeshError;
use crate::graph::{EventRef, MarketEvent, MarketGraph};
use crate::metrics::WorkerStats;

/// Bound on the at-most-once dedup ring.
const SEEN_MAX: usize = 50_000;

/// Wire shape of one raw notification.
#[derive(Debug, Deserialize)]
struct RawNotice {
    kind: String,
    seq: u64,
    pool: String,
    #[serde(default)]
    token_in: Option<String>,
    #[serde(default)]
    token_out: Option<String>,
    #[serde(default)]
    rate: Option<f64>,
    #[serde(default)]
    capacity: Option<f64>,
}

pub struct EventIngestor {
    graph: Arc<MarketGraph>,
    backlog: Arc<Backlog>,
    stats: Arc<WorkerStats>,
    seen: DashSet<u64>,
    seen_order: Mutex<VecDeque<u64>>,
}

impl EventIngestor {
    pub fn new(graph: Arc<MarketGraph>, backlog: Arc<Backlog>, stats: Arc<WorkerStats>) -> Self {
        Self {
            graph,
            backlog,
            stats,
            seen: DashSet::new(),
            seen_order: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<Value>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                maybe = events.recv() => {
                    let Some(raw) = maybe else { break };
                    if let Some(job) = self.apply(&raw) {
                        let pushed = self.backlog.push(job).await;
                        if pushed.dropped_oldest {
                            WorkerStats::bump(&self.stats.events_dropped);
                            tracing::debug!(
                                target: "ingest",
                                "backlog full, dropped oldest pending detection"
                            );
                        }
                    }
                }
            }
        }
        tracing::debug!(target: "ingest", "ingestion stopped");
    }

    /// Apply one raw notification. Returns the detection job it warrants,
    /// if any. Every failure is contained here: malformed input and
    /// rejected edges are logged, counted and dropped.
    pub fn apply(&self, raw: &Value) -> Option<DetectionJob> {
        let (seq, event) = match parse_notice(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                WorkerStats::bump(&self.stats.malformed_events);
                tracing::warn!(target: "ingest", error = %e, "dropped malformed notification");
                return None;
            }
        };

        if !self.remember(seq) {
            WorkerStats::bump(&self.stats.events_deduped);
            return None;
        }
        WorkerStats::bump(&self.stats.events_ingested);

        let observed_at = Instant::now();
        let received_unix = chrono::Utc::now().timestamp().max(0) as u64;

        match event {
            MarketEvent::Quote {
                pool,
                token_in,
                token_out,
                rate,
                capacity,
            } => {
                let weight = -rate.ln();
                if let Err(e) = self
                    .graph
                    .upsert_edge(token_in, token_out, weight, capacity, pool)
                {
                    WorkerStats::bump(&self.stats.graph_rejects);
                    tracing::warn!(target: "ingest", error = %e, "edge skipped, store unaffected");
                    return None;
                }
                let seeds = self.graph.affected_vertices(&MarketEvent::Quote {
                    pool,
                    token_in,
                    token_out,
                    rate,
                    capacity,
                });
                Some(DetectionJob {
                    event: EventRef {
                        seq,
                        observed_at,
                        received_unix,
                    },
                    seeds,
                })
            }
            MarketEvent::Delist { pool } => {
                let removed = self.graph.remove_edge(pool);
                tracing::info!(
                    target: "ingest",
                    pool = %pool,
                    removed,
                    "pool delisted"
                );
                // Removing edges can only shrink the cycle space; no pass
                // is scheduled.
                None
            }
        }
    }

    /// At-most-once gate over event sequence numbers, bounded by a ring of
    /// the most recent entries.
    fn remember(&self, seq: u64) -> bool {
        if !self.seen.insert(seq) {
            return false;
        }
        let mut order = self.seen_order.lock();
        order.push_back(seq);
        if order.len() > SEEN_MAX {
            if let Some(evicted) = order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

fn parse_notice(raw: &Value) -> Result<(u64, MarketEvent), MeshError> {
    let notice: RawNotice = serde_json::from_value(raw.clone())
        .map_err(|e| MeshError::MalformedEvent(e.to_string()))?;
    let pool = parse_address(&notice.pool)?;

    match notice.kind.as_str() {
        "quote" => {
            let token_in = parse_address(notice.token_in.as_deref().ok_or_else(|| {
                MeshError::MalformedEvent("quote missing token_in".into())
            })?)?;
            let token_out = parse_address(notice.token_out.as_deref().ok_or_else(|| {
                MeshError::MalformedEvent("quote missing token_out".into())
            })?)?;
            let rate = notice
                .rate
                .ok_or_else(|| MeshError::MalformedEvent("quote missing rate".into()))?;
            let capacity = notice.capacity.unwrap_or(0.0);
            Ok((
                notice.seq,
                MarketEvent::Quote {
                    pool,
                    token_in,
                    token_out,
                    rate,
                    capacity,
                },
            ))
        }
        "delist" => Ok((notice.seq, MarketEvent::Delist { pool })),
        other => Err(MeshError::MalformedEvent(format!(
            "unknown notification kind {other:?}"
        ))),
    }
}

fn parse_address(text: &str) -> Result<Address, MeshError> {
    Address::from_str(text).map_err(|e| MeshError::MalformedEvent(format!("{text}: {e}")))
}
