//! Strike pipeline: turn a profitable signal into exactly one submitted
//! transaction before the opportunity expires.

pub mod composer;
pub mod dispatcher;

pub use composer::{HopRecord, StrikeComposer, StrikePayload};
pub use dispatcher::{DispatchOutcome, GasPolicy, NonceCounter, StrikeDispatcher};
