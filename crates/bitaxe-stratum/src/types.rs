//! Types shared between the V1 and V2 clients and the job builder, so the
//! builder can match on one small enum instead of knowing which protocol is
//! currently active (spec §4.6/§4.7.X protocol-flag indirection).

use std::sync::atomic::{AtomicU8, Ordering};

/// One job notification, protocol-tagged. The job builder (C7) matches on
/// this once per iteration and drives V1 or V2 work generation accordingly.
#[derive(Debug, Clone)]
pub enum StratumEvent {
    V1Notify(crate::v1::MiningNotify),
    V2Job(crate::v2::JobAnnouncement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolIndex {
    Primary,
    Fallback,
}

impl PoolIndex {
    pub fn other(self) -> Self {
        match self {
            PoolIndex::Primary => PoolIndex::Fallback,
            PoolIndex::Fallback => PoolIndex::Primary,
        }
    }
}

/// Process-wide protocol selector (spec §4.7 "protocol flag"). Starts on
/// whichever protocol the primary pool is configured for; the V2 task flips
/// it to V1 on sustained connection failure, and downstream tasks observe
/// the new value on their next iteration without restarting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StratumProtocol {
    V1 = 0,
    V2 = 1,
}

pub struct ProtocolFlag(AtomicU8);

impl ProtocolFlag {
    pub fn new(initial: StratumProtocol) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    pub fn get(&self) -> StratumProtocol {
        match self.0.load(Ordering::SeqCst) {
            1 => StratumProtocol::V2,
            _ => StratumProtocol::V1,
        }
    }

    pub fn set(&self, protocol: StratumProtocol) {
        self.0.store(protocol as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_flag_round_trips() {
        let flag = ProtocolFlag::new(StratumProtocol::V2);
        assert_eq!(flag.get(), StratumProtocol::V2);
        flag.set(StratumProtocol::V1);
        assert_eq!(flag.get(), StratumProtocol::V1);
    }

    #[test]
    fn pool_index_flips() {
        assert_eq!(PoolIndex::Primary.other(), PoolIndex::Fallback);
        assert_eq!(PoolIndex::Fallback.other(), PoolIndex::Primary);
    }
}
