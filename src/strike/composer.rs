use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::error::MeshError;
use crate::graph::Signal;

sol! {
    /// On-chain cycle executor entrypoint. Hops execute atomically in
    /// order; the whole strike reverts if any hop returns less than its
    /// minimum or the deadline has passed.
    contract CycleExecutor {
        function strike(
            address[] calldata pools,
            bool[] calldata zeroForOne,
            uint256[] calldata minReturn,
            uint256 deadline
        ) external returns (uint256 finalBalance);
    }
}

/// Fixed-point scale for per-hop minimum-return ratios (1e18 = 1.0).
const RATIO_ONE: u128 = 1_000_000_000_000_000_000;

/// Fixed-size hop record fed to the executor contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopRecord {
    pub pool: Address,
    pub zero_for_one: bool,
    /// Minimum acceptable output per unit input, 1e18 fixed point.
    pub min_return: U256,
}

/// A composed, dispatch-ready strike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrikePayload {
    pub calldata: Bytes,
    pub hops: Vec<HopRecord>,
    pub deadline_unix: u64,
}

/// Encodes a profitable signal into executor calldata.
///
/// Composition is a pure function of the signal: the same signal always
/// yields byte-identical calldata, so retrying composition is safe. The
/// composer never talks to the network and never invokes the dispatcher.
#[derive(Debug, Clone)]
pub struct StrikeComposer {
    max_hops: usize,
    /// Haircut applied to each hop's quoted rate when deriving its minimum
    /// acceptable output, in basis points.
    slippage_bps: u32,
}

impl StrikeComposer {
    pub fn new(max_hops: usize, slippage_bps: u32) -> Self {
        Self {
            max_hops,
            slippage_bps,
        }
    }

    pub fn compose(&self, signal: &Signal) -> Result<StrikePayload, MeshError> {
        let cycle = signal
            .cycle
            .as_ref()
            .ok_or_else(|| MeshError::Encoding("signal carries no cycle".into()))?;

        if cycle.hops.len() < 2 || cycle.hops.len() > self.max_hops {
            return Err(MeshError::Encoding(format!(
                "cycle length {} outside 2..={}",
                cycle.hops.len(),
                self.max_hops
            )));
        }

        let mut hops = Vec::with_capacity(cycle.hops.len());
        for (position, edge) in cycle.hops.iter().enumerate() {
            if edge.pool == Address::ZERO {
                return Err(MeshError::Encoding(format!(
                    "hop {position} is missing its pool identifier"
                )));
            }
            hops.push(HopRecord {
                pool: edge.pool,
                zero_for_one: edge.zero_for_one(),
                min_return: self.min_return(edge.weight)?,
            });
        }

        let call = CycleExecutor::strikeCall {
            pools: hops.iter().map(|h| h.pool).collect(),
            zeroForOne: hops.iter().map(|h| h.zero_for_one).collect(),
            minReturn: hops.iter().map(|h| h.min_return).collect(),
            deadline: U256::from(signal.deadline_unix),
        };

        Ok(StrikePayload {
            calldata: call.abi_encode().into(),
            hops,
            deadline_unix: signal.deadline_unix,
        })
    }

    /// Quoted rate for the hop, shaved by the slippage haircut and scaled
    /// to 1e18 fixed point.
    fn min_return(&self, weight: f64) -> Result<U256, MeshError> {
        let rate = (-weight).exp();
        let shaved = rate * (1.0 - self.slippage_bps as f64 / 10_000.0);
        if !shaved.is_finite() || shaved <= 0.0 {
            return Err(MeshError::Encoding(format!(
                "hop rate {rate} cannot be expressed as a minimum return"
            )));
        }
        let scaled = shaved * RATIO_ONE as f64;
        if scaled >= u128::MAX as f64 {
            return Err(MeshError::Encoding(format!(
                "hop rate {rate} overflows the fixed-point ratio"
            )));
        }
        Ok(U256::from(scaled as u128))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DetectedCycle, DetectionOutcome, EdgeQuote, EventRef};
    use std::time::{Duration, Instant};

    fn addr(marker: u8) -> Address {
        Address::from([marker; 20])
    }

    fn edge(pool: Address, from: Address, to: Address, weight: f64) -> EdgeQuote {
        EdgeQuote {
            pool,
            from,
            to,
            weight,
            capacity: 100.0,
            seq: 1,
        }
    }

    fn profitable_signal() -> Signal {
        let (a, b, c) = (addr(1), addr(2), addr(3));
        let hops = vec![
            edge(addr(11), a, b, -0.693),
            edge(addr(12), b, c, -0.693),
            edge(addr(13), c, a, 1.204),
        ];
        Signal {
            event: EventRef {
                seq: 7,
                observed_at: Instant::now(),
                received_unix: 1_700_000_000,
            },
            outcome: DetectionOutcome::Profitable,
            cycle: Some(DetectedCycle {
                vertices: vec![a, b, c],
                total_weight: hops.iter().map(|h| h.weight).sum(),
                hops,
            }),
            deadline_unix: 1_700_000_012,
            detected_in: Duration::from_millis(3),
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let composer = StrikeComposer::new(12, 30);
        let signal = profitable_signal();
        let first = composer.compose(&signal).unwrap();
        let second = composer.compose(&signal).unwrap();
        assert_eq!(first.calldata, second.calldata);
        assert_eq!(first, second);
    }

    #[test]
    fn hop_order_and_deadline_are_preserved() {
        let composer = StrikeComposer::new(12, 30);
        let signal = profitable_signal();
        let payload = composer.compose(&signal).unwrap();

        assert_eq!(payload.hops.len(), 3);
        assert_eq!(
            payload.hops.iter().map(|h| h.pool).collect::<Vec<_>>(),
            vec![addr(11), addr(12), addr(13)]
        );
        assert_eq!(payload.deadline_unix, 1_700_000_012);

        let decoded = CycleExecutor::strikeCall::abi_decode(&payload.calldata).unwrap();
        assert_eq!(decoded.pools, vec![addr(11), addr(12), addr(13)]);
        assert_eq!(decoded.deadline, U256::from(1_700_000_012u64));
        // First two hops quote rate ~2.0; the haircut keeps the minimum
        // strictly below the quote.
        assert!(decoded.minReturn[0] < U256::from(2 * RATIO_ONE));
        assert!(decoded.minReturn[0] > U256::from(19 * RATIO_ONE / 10));
    }

    #[test]
    fn missing_pool_identifier_aborts_the_strike() {
        let composer = StrikeComposer::new(12, 30);
        let mut signal = profitable_signal();
        signal.cycle.as_mut().unwrap().hops[1].pool = Address::ZERO;

        let err = composer.compose(&signal).unwrap_err();
        assert!(matches!(err, MeshError::Encoding(_)));
    }

    #[test]
    fn hop_count_is_bounded_by_max_hops() {
        let composer = StrikeComposer::new(2, 30);
        let err = composer.compose(&profitable_signal()).unwrap_err();
        assert!(matches!(err, MeshError::Encoding(_)));
    }

    #[test]
    fn unprofitable_signal_is_not_encodable() {
        let composer = StrikeComposer::new(12, 30);
        let signal = Signal::not_profitable(
            EventRef {
                seq: 1,
                observed_at: Instant::now(),
                received_unix: 0,
            },
            DetectionOutcome::NoCycle,
            Duration::ZERO,
        );
        assert!(composer.compose(&signal).is_err());
    }
}
