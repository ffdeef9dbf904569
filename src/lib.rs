//! arb-mesh: cross-DEX negative-cycle arbitrage engine.
//!
//! One isolated worker per chain keeps an in-memory exchange-rate graph,
//! reacts to market events with bounded-depth negative-cycle detection,
//! and turns profitable cycles into single-shot strike transactions over a
//! private relay or the public transaction pool.

pub mod backlog;
pub mod config;
pub mod custody;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod metrics;
pub mod network;
pub mod registry;
pub mod strike;
pub mod worker;
