use alloy::primitives::Address;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::store::MarketGraph;
use super::types::{DetectedCycle, DetectionOutcome, EdgeQuote, EventRef, Signal};

/// How often the deadline is re-checked, in search expansions.
const DEADLINE_CHECK_MASK: u64 = 0x3f;

/// Detection tunables for one chain worker.
#[derive(Debug, Clone)]
pub struct DetectionPolicy {
    /// Maximum cycle length in hops. Cycles of length 2..=max_hops qualify.
    pub max_hops: usize,
    /// A cycle qualifies iff its weight sum is strictly below
    /// `-min_profit_threshold`. Zero means any negative sum.
    pub min_profit_threshold: f64,
    /// Wall-clock budget for one pass. Elapsing is a defined not-profitable
    /// outcome, never an error.
    pub time_budget: Duration,
    /// Edges with less fillable capacity than this are invisible to the
    /// search. Zero disables the gate.
    pub min_hop_capacity: f64,
    /// Lifetime of a produced signal; fixes the strike deadline at
    /// detection time.
    pub signal_ttl: Duration,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            max_hops: 12,
            min_profit_threshold: 0.0,
            time_budget: Duration::from_millis(25),
            min_hop_capacity: 0.0,
            signal_ttl: Duration::from_secs(12),
        }
    }
}

/// Bounded-depth negative-cycle search over the live market graph.
///
/// One pass per market event, seeded at the vertices the event touched.
/// Reads race against ingestion writes by design; every edge read is a
/// consistent snapshot (see `MarketGraph::neighbors`).
pub struct CycleDetector {
    graph: Arc<MarketGraph>,
    policy: DetectionPolicy,
}

enum Halt {
    Budget,
    Fault(&'static str),
}

struct Search<'a> {
    graph: &'a MarketGraph,
    policy: &'a DetectionPolicy,
    deadline: Instant,
    /// Most favorable edge weight in the graph, sampled once per pass.
    min_edge: f64,
    expansions: u64,
    best: Option<DetectedCycle>,
}

impl CycleDetector {
    pub fn new(graph: Arc<MarketGraph>, policy: DetectionPolicy) -> Self {
        Self { graph, policy }
    }

    pub fn policy(&self) -> &DetectionPolicy {
        &self.policy
    }

    /// Run one detection pass for `event`, searching simple cycles through
    /// each seed vertex. Any internal fault is converted to a
    /// not-profitable signal; this never errors and never blocks beyond
    /// the time budget.
    pub fn run_pass(&self, event: EventRef, seeds: &[Address]) -> Signal {
        let started = Instant::now();

        let Some(min_edge) = self.graph.min_edge_weight() else {
            return Signal::not_profitable(event, DetectionOutcome::NoCycle, started.elapsed());
        };

        let mut search = Search {
            graph: &self.graph,
            policy: &self.policy,
            deadline: started + self.policy.time_budget,
            min_edge,
            expansions: 0,
            best: None,
        };

        let mut seen_seeds: Vec<Address> = Vec::new();
        for &seed in seeds {
            if seen_seeds.contains(&seed) {
                continue;
            }
            seen_seeds.push(seed);

            let mut path: Vec<EdgeQuote> = Vec::new();
            let mut vertices = vec![seed];
            let mut visited: HashSet<Address> = HashSet::new();
            match search.explore(seed, seed, &mut path, &mut vertices, &mut visited, 0.0) {
                Ok(()) => {}
                Err(Halt::Budget) => {
                    tracing::debug!(
                        target: "detect",
                        seq = event.seq,
                        expansions = search.expansions,
                        "time budget elapsed, pass abandoned"
                    );
                    return Signal::not_profitable(
                        event,
                        DetectionOutcome::TimedOut,
                        started.elapsed(),
                    );
                }
                Err(Halt::Fault(reason)) => {
                    tracing::warn!(
                        target: "detect",
                        seq = event.seq,
                        reason,
                        "detection fault, treating pass as not profitable"
                    );
                    return Signal::not_profitable(
                        event,
                        DetectionOutcome::Fault,
                        started.elapsed(),
                    );
                }
            }
        }

        match search.best.take() {
            Some(cycle) => {
                tracing::debug!(
                    target: "detect",
                    seq = event.seq,
                    hops = cycle.hop_count(),
                    weight = cycle.total_weight,
                    multiplier = cycle.multiplier(),
                    "profitable cycle selected"
                );
                Signal {
                    event,
                    outcome: DetectionOutcome::Profitable,
                    cycle: Some(cycle),
                    deadline_unix: event.received_unix + self.policy.signal_ttl.as_secs(),
                    detected_in: started.elapsed(),
                }
            }
            None => Signal::not_profitable(event, DetectionOutcome::NoCycle, started.elapsed()),
        }
    }
}

impl Search<'_> {
    fn explore(
        &mut self,
        seed: Address,
        vertex: Address,
        path: &mut Vec<EdgeQuote>,
        vertices: &mut Vec<Address>,
        visited: &mut HashSet<Address>,
        partial: f64,
    ) -> Result<(), Halt> {
        self.expansions += 1;
        if self.expansions & DEADLINE_CHECK_MASK == 0 && Instant::now() >= self.deadline {
            return Err(Halt::Budget);
        }

        let depth = path.len();
        if depth > self.policy.max_hops {
            return Err(Halt::Fault("depth overflow"));
        }

        for edge in self.graph.neighbors(vertex) {
            if self.policy.min_hop_capacity > 0.0 && edge.capacity < self.policy.min_hop_capacity {
                continue;
            }
            let total = partial + edge.weight;
            if !total.is_finite() {
                return Err(Halt::Fault("non-finite weight accumulation"));
            }

            if edge.to == seed {
                if depth + 1 >= 2 && total < -self.policy.min_profit_threshold {
                    self.record(path, vertices, &edge, total);
                }
                // The seed never appears mid-path; only closing edges may
                // touch it.
                continue;
            }

            if depth + 1 >= self.policy.max_hops || visited.contains(&edge.to) {
                continue;
            }
            if self.bound_prunes(total, depth + 1) {
                continue;
            }

            visited.insert(edge.to);
            vertices.push(edge.to);
            path.push(edge.clone());
            let descended = self.explore(seed, edge.to, path, vertices, visited, total);
            path.pop();
            vertices.pop();
            visited.remove(&edge.to);
            descended?;
        }
        Ok(())
    }

    /// Admissible branch-and-bound cut: even taking the most favorable edge
    /// in the graph for every remaining hop, this branch cannot close below
    /// the profit threshold.
    fn bound_prunes(&self, partial: f64, depth: usize) -> bool {
        let remaining = (self.policy.max_hops - depth) as f64;
        let best_case = if self.min_edge < 0.0 {
            remaining * self.min_edge
        } else {
            self.min_edge
        };
        partial + best_case >= -self.policy.min_profit_threshold
    }

    fn record(
        &mut self,
        path: &[EdgeQuote],
        vertices: &[Address],
        closing: &EdgeQuote,
        total: f64,
    ) {
        let candidate = DetectedCycle {
            hops: {
                let mut hops = path.to_vec();
                hops.push(closing.clone());
                hops
            },
            vertices: vertices.to_vec(),
            total_weight: total,
        };
        let better = match &self.best {
            None => true,
            Some(best) => {
                match candidate.total_weight.total_cmp(&best.total_weight) {
                    std::cmp::Ordering::Less => true,
                    std::cmp::Ordering::Greater => false,
                    // Ties: fewer hops first, then the lexicographically
                    // smallest vertex sequence, so a pass is deterministic.
                    std::cmp::Ordering::Equal => match candidate.hop_count().cmp(&best.hop_count())
                    {
                        std::cmp::Ordering::Less => true,
                        std::cmp::Ordering::Greater => false,
                        std::cmp::Ordering::Equal => candidate.vertices < best.vertices,
                    },
                }
            }
        };
        if better {
            self.best = Some(candidate);
        }
    }
}
