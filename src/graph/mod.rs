//! Market graph: exchange rates as a weighted directed graph.
//!
//! Edge weights are `-ln(effective rate)`, so a profitable trade loop is a
//! negative-weight cycle. The store is owned by one chain worker; detection
//! passes read it concurrently with ingestion writes.

pub mod detect;
pub mod store;
pub mod types;

pub use detect::{CycleDetector, DetectionPolicy};
pub use store::MarketGraph;
pub use types::{DetectedCycle, DetectionOutcome, EdgeQuote, EventRef, MarketEvent, Signal};
