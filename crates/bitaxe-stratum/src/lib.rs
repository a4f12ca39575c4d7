//! Stratum client stack: the V1 JSON-RPC client, the V2 Noise-encrypted
//! binary client, the shared work queue the job builder reads from, and the
//! protocol-selection types that let the rest of the firmware stay agnostic
//! of which generation is currently active.

pub mod queue;
pub mod types;
pub mod v1;
pub mod v2;

pub use queue::WorkQueue;
pub use types::{PoolIndex, ProtocolFlag, StratumEvent, StratumProtocol};
