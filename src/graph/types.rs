use alloy::primitives::Address;
use std::time::{Duration, Instant};

/// Directed edge through one liquidity pool.
///
/// `weight` is `-ln(effective rate after fees)`, so a closed walk whose
/// weights sum below zero multiplies out to more than one unit of the start
/// asset. Only finite weights are ever stored.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeQuote {
    pub pool: Address,
    pub from: Address,
    pub to: Address,
    pub weight: f64,
    /// Fillable size bound on the quote side. Edges below the configured
    /// per-hop minimum are invisible to detection.
    pub capacity: f64,
    /// Store-assigned update sequence, bumped on every accepted write.
    pub seq: u64,
}

impl EdgeQuote {
    /// Effective exchange rate implied by the stored weight.
    pub fn rate(&self) -> f64 {
        (-self.weight).exp()
    }

    /// Trade direction flag for the executor contract: true when the input
    /// asset sorts below the output asset.
    pub fn zero_for_one(&self) -> bool {
        self.from < self.to
    }
}

/// Typed market-event notification, parsed from a raw feed message.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Fresh effective rate (after fees) for one direction of a pool.
    Quote {
        pool: Address,
        token_in: Address,
        token_out: Address,
        rate: f64,
        capacity: f64,
    },
    /// Pool delisted; every direction of it leaves the graph.
    Delist { pool: Address },
}

/// Reference to the originating event, carried through the Signal so a
/// strike can be traced and latency-accounted back to its trigger.
#[derive(Debug, Clone, Copy)]
pub struct EventRef {
    pub seq: u64,
    pub observed_at: Instant,
    pub received_unix: u64,
}

/// Why a detection pass produced no dispatchable cycle, or that it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionOutcome {
    Profitable,
    NoCycle,
    /// Wall-clock budget elapsed before the search completed. A defined
    /// outcome, not an error.
    TimedOut,
    /// Internal fault (malformed edge mid-search, depth overflow),
    /// converted to a non-result so the caller is never stalled.
    Fault,
}

/// Best profitable cycle found by one detection pass.
#[derive(Debug, Clone)]
pub struct DetectedCycle {
    /// Hop edges in traversal order; `hops[0].from` is the seed vertex and
    /// the last hop closes back on it.
    pub hops: Vec<EdgeQuote>,
    /// Vertex sequence starting at the seed, one entry per hop.
    pub vertices: Vec<Address>,
    pub total_weight: f64,
}

impl DetectedCycle {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Implied balance multiplier for one unit traded around the cycle.
    pub fn multiplier(&self) -> f64 {
        (-self.total_weight).exp()
    }
}

/// Ephemeral per-event detection result. Lives for exactly one dispatch
/// attempt and is never persisted.
#[derive(Debug, Clone)]
pub struct Signal {
    pub event: EventRef,
    pub outcome: DetectionOutcome,
    pub cycle: Option<DetectedCycle>,
    /// Expiry embedded into the strike payload, fixed when the signal is
    /// created so composition stays a pure function of the signal.
    pub deadline_unix: u64,
    /// Time spent inside the detection pass.
    pub detected_in: Duration,
}

impl Signal {
    pub fn profitable(&self) -> bool {
        self.outcome == DetectionOutcome::Profitable
    }

    pub fn not_profitable(
        event: EventRef,
        outcome: DetectionOutcome,
        detected_in: Duration,
    ) -> Self {
        Self {
            event,
            outcome,
            cycle: None,
            deadline_unix: 0,
            detected_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(marker: u8) -> Address {
        Address::from([marker; 20])
    }

    #[test]
    fn rate_roundtrips_through_weight() {
        let quote = EdgeQuote {
            pool: addr(1),
            from: addr(2),
            to: addr(3),
            weight: -(2.0f64.ln()),
            capacity: 1.0,
            seq: 0,
        };
        assert!((quote.rate() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn direction_follows_asset_ordering() {
        let quote = EdgeQuote {
            pool: addr(1),
            from: addr(2),
            to: addr(3),
            weight: 0.0,
            capacity: 1.0,
            seq: 0,
        };
        assert!(quote.zero_for_one());
        let back = EdgeQuote {
            from: addr(3),
            to: addr(2),
            ..quote
        };
        assert!(!back.zero_for_one());
    }

    #[test]
    fn cycle_multiplier_exceeds_one_for_negative_weight() {
        let cycle = DetectedCycle {
            hops: Vec::new(),
            vertices: Vec::new(),
            total_weight: -0.182,
        };
        assert!(cycle.multiplier() > 1.0);
    }
}
