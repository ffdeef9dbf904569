//! Per-worker counters.
//!
//! One `WorkerStats` block is owned by each chain worker. Workers share no
//! counter state, so a fault in one worker can never show up in another
//! worker's numbers.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub events_ingested: AtomicU64,
    pub events_deduped: AtomicU64,
    pub events_dropped: AtomicU64,
    pub malformed_events: AtomicU64,
    pub graph_rejects: AtomicU64,
    pub passes_run: AtomicU64,
    pub passes_timed_out: AtomicU64,
    pub passes_faulted: AtomicU64,
    pub signals_profitable: AtomicU64,
    pub encoding_failures: AtomicU64,
    pub strikes_dispatched: AtomicU64,
    pub dispatch_failures: AtomicU64,
    pub stale_signals: AtomicU64,
}

impl WorkerStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Plain-text counter dump, one `name value` line per counter.
    pub fn render(&self) -> String {
        let rows = [
            ("events_ingested", &self.events_ingested),
            ("events_deduped", &self.events_deduped),
            ("events_dropped", &self.events_dropped),
            ("malformed_events", &self.malformed_events),
            ("graph_rejects", &self.graph_rejects),
            ("passes_run", &self.passes_run),
            ("passes_timed_out", &self.passes_timed_out),
            ("passes_faulted", &self.passes_faulted),
            ("signals_profitable", &self.signals_profitable),
            ("encoding_failures", &self.encoding_failures),
            ("strikes_dispatched", &self.strikes_dispatched),
            ("dispatch_failures", &self.dispatch_failures),
            ("stale_signals", &self.stale_signals),
        ];
        let mut body = String::new();
        for (name, counter) in rows {
            body.push_str(&format!("{} {}\n", name, Self::get(counter)));
        }
        body
    }
}
