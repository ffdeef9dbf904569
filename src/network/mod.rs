//! Thin network collaborators: the redundant-endpoint RPC mesh and the
//! private execution relay. Transient single-endpoint failures are absorbed
//! here and never reach the core.

pub mod mesh;
pub mod relay;

pub use mesh::{ChainConnectivity, EndpointConfig, RpcMesh};
pub use relay::{ExecutionRelay, HttpRelay, RelayBundle, RelaySubmission};
