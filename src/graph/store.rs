use alloy::primitives::Address;
use parking_lot::RwLock;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::HashMap;

use super::types::{EdgeQuote, MarketEvent};
use crate::error::MeshError;

/// Directed edge key: one pool quotes at most one edge per input asset.
type EdgeKey = (Address, Address);

/// In-memory market graph owned by one chain worker.
///
/// Ingestion is the single writer; detection passes read concurrently.
/// Every read clones complete `EdgeQuote` records under the lock, so a
/// reader can never observe a partially-written edge. Constructed at worker
/// start, torn down at worker stop, never process-global.
pub struct MarketGraph {
    inner: RwLock<GraphInner>,
}

#[derive(Default)]
struct GraphInner {
    graph: StableDiGraph<Address, EdgeQuote>,
    nodes: HashMap<Address, NodeIndex>,
    edges: HashMap<EdgeKey, EdgeIndex>,
    /// Directions currently registered per pool, for whole-pool removal.
    pools: HashMap<Address, Vec<EdgeKey>>,
    seq: u64,
}

impl GraphInner {
    fn node(&mut self, token: Address) -> NodeIndex {
        if let Some(&node) = self.nodes.get(&token) {
            node
        } else {
            let node = self.graph.add_node(token);
            self.nodes.insert(token, node);
            node
        }
    }
}

impl Default for MarketGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketGraph {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
        }
    }

    /// Insert or replace the directed edge quoted by `pool` for input asset
    /// `from`. Replacement is keyed, in-place and idempotent: re-upserting
    /// identical parameters leaves the store byte-for-byte unchanged.
    ///
    /// Non-finite weights are rejected with a `GraphData` error and the
    /// store is left untouched.
    pub fn upsert_edge(
        &self,
        from: Address,
        to: Address,
        weight: f64,
        capacity: f64,
        pool: Address,
    ) -> Result<(), MeshError> {
        if !weight.is_finite() {
            return Err(MeshError::GraphData {
                pool: format!("{pool:#x}"),
                reason: format!("non-finite weight {weight}"),
            });
        }

        let mut inner = self.inner.write();
        let key: EdgeKey = (pool, from);

        if let Some(&idx) = inner.edges.get(&key) {
            let unchanged = inner
                .graph
                .edge_weight(idx)
                .map(|q| q.to == to && q.weight == weight && q.capacity == capacity)
                .unwrap_or(false);
            if unchanged {
                return Ok(());
            }
            // Keyed replacement: the old quote for this (pool, from) leaves
            // the graph entirely, it is never accumulated.
            inner.graph.remove_edge(idx);
            inner.edges.remove(&key);
        }

        inner.seq += 1;
        let quote = EdgeQuote {
            pool,
            from,
            to,
            weight,
            capacity,
            seq: inner.seq,
        };
        let a = inner.node(from);
        let b = inner.node(to);
        let idx = inner.graph.add_edge(a, b, quote);
        inner.edges.insert(key, idx);
        let dirs = inner.pools.entry(pool).or_default();
        if !dirs.contains(&key) {
            dirs.push(key);
        }
        Ok(())
    }

    /// Drop every direction quoted by a delisted pool. Unknown pools are a
    /// no-op. Returns how many directed edges left the graph.
    pub fn remove_edge(&self, pool: Address) -> usize {
        let mut inner = self.inner.write();
        let Some(keys) = inner.pools.remove(&pool) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if let Some(idx) = inner.edges.remove(&key) {
                if inner.graph.remove_edge(idx).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Vertices whose outgoing edges an update touches: exactly the two
    /// endpoints for a quote, every endpoint of the pool for a delisting.
    pub fn affected_vertices(&self, event: &MarketEvent) -> Vec<Address> {
        match event {
            MarketEvent::Quote {
                token_in,
                token_out,
                ..
            } => vec![*token_in, *token_out],
            MarketEvent::Delist { pool } => {
                let inner = self.inner.read();
                let mut vertices: Vec<Address> = Vec::new();
                for &(p, from) in inner.pools.get(pool).into_iter().flatten() {
                    if let Some(&idx) = inner.edges.get(&(p, from)) {
                        if let Some(q) = inner.graph.edge_weight(idx) {
                            for v in [q.from, q.to] {
                                if !vertices.contains(&v) {
                                    vertices.push(v);
                                }
                            }
                        }
                    }
                }
                vertices
            }
        }
    }

    /// Outgoing edges of a vertex, cloned as a consistent snapshot and
    /// ordered by ascending (pool, to) so traversal is deterministic.
    pub fn neighbors(&self, vertex: Address) -> Vec<EdgeQuote> {
        let inner = self.inner.read();
        let Some(&node) = inner.nodes.get(&vertex) else {
            return Vec::new();
        };
        let mut out: Vec<EdgeQuote> = inner
            .graph
            .edges(node)
            .map(|e| e.weight().clone())
            .collect();
        out.sort_by(|a, b| (a.pool, a.to).cmp(&(b.pool, b.to)));
        out
    }

    /// Most favorable edge weight currently in the graph, the admissible
    /// per-hop bound for branch-and-bound pruning.
    pub fn min_edge_weight(&self) -> Option<f64> {
        let inner = self.inner.read();
        inner
            .graph
            .edge_references()
            .map(|e| e.weight().weight)
            .min_by(f64::total_cmp)
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.read().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(marker: u8) -> Address {
        Address::from([marker; 20])
    }

    #[test]
    fn quote_update_affects_exactly_its_endpoints() {
        let graph = MarketGraph::new();
        let event = MarketEvent::Quote {
            pool: addr(9),
            token_in: addr(1),
            token_out: addr(2),
            rate: 2.0,
            capacity: 1.0,
        };
        assert_eq!(graph.affected_vertices(&event), vec![addr(1), addr(2)]);
    }

    #[test]
    fn upsert_replaces_in_place_by_pool() {
        let graph = MarketGraph::new();
        graph
            .upsert_edge(addr(1), addr(2), 0.5, 10.0, addr(9))
            .unwrap();
        graph
            .upsert_edge(addr(1), addr(2), 0.25, 20.0, addr(9))
            .unwrap();

        let out = graph.neighbors(addr(1));
        assert_eq!(out.len(), 1, "replacement must never be additive");
        assert_eq!(out[0].weight, 0.25);
        assert_eq!(out[0].capacity, 20.0);
    }

    #[test]
    fn identical_upsert_is_idempotent() {
        let graph = MarketGraph::new();
        graph
            .upsert_edge(addr(1), addr(2), 0.5, 10.0, addr(9))
            .unwrap();
        let before = graph.neighbors(addr(1));
        graph
            .upsert_edge(addr(1), addr(2), 0.5, 10.0, addr(9))
            .unwrap();
        let after = graph.neighbors(addr(1));
        assert_eq!(before, after);
    }

    #[test]
    fn non_finite_weight_is_rejected_and_store_unaffected() {
        let graph = MarketGraph::new();
        graph
            .upsert_edge(addr(1), addr(2), 0.5, 10.0, addr(9))
            .unwrap();

        let err = graph
            .upsert_edge(addr(1), addr(2), f64::NAN, 10.0, addr(9))
            .unwrap_err();
        assert!(matches!(err, MeshError::GraphData { .. }));
        let err = graph
            .upsert_edge(addr(1), addr(2), f64::INFINITY, 10.0, addr(8))
            .unwrap_err();
        assert!(matches!(err, MeshError::GraphData { .. }));

        let out = graph.neighbors(addr(1));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].weight, 0.5);
    }

    #[test]
    fn parallel_pools_coexist_and_order_is_stable() {
        let graph = MarketGraph::new();
        // Insert out of pool order; neighbors must come back sorted.
        graph
            .upsert_edge(addr(1), addr(2), 0.3, 1.0, addr(7))
            .unwrap();
        graph
            .upsert_edge(addr(1), addr(2), 0.4, 1.0, addr(5))
            .unwrap();
        graph
            .upsert_edge(addr(1), addr(3), 0.5, 1.0, addr(6))
            .unwrap();

        let out = graph.neighbors(addr(1));
        let pools: Vec<Address> = out.iter().map(|q| q.pool).collect();
        assert_eq!(pools, vec![addr(5), addr(6), addr(7)]);
        assert_eq!(graph.neighbors(addr(1)), out);
    }

    #[test]
    fn delist_removes_every_direction() {
        let graph = MarketGraph::new();
        graph
            .upsert_edge(addr(1), addr(2), 0.5, 1.0, addr(9))
            .unwrap();
        graph
            .upsert_edge(addr(2), addr(1), -0.5, 1.0, addr(9))
            .unwrap();
        graph
            .upsert_edge(addr(1), addr(2), 0.1, 1.0, addr(8))
            .unwrap();

        assert_eq!(graph.remove_edge(addr(9)), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.neighbors(addr(2)), Vec::new());
        assert_eq!(graph.remove_edge(addr(9)), 0);
    }

    #[test]
    fn min_edge_weight_tracks_most_favorable_edge() {
        let graph = MarketGraph::new();
        assert_eq!(graph.min_edge_weight(), None);
        graph
            .upsert_edge(addr(1), addr(2), 0.7, 1.0, addr(9))
            .unwrap();
        graph
            .upsert_edge(addr(2), addr(3), -0.9, 1.0, addr(8))
            .unwrap();
        assert_eq!(graph.min_edge_weight(), Some(-0.9));
    }
}
