//! Rolling hashrate averages (C9), the statistics ring buffer (C11), and
//! share accounting (spec §5 "Share accounting").

pub mod hashrate;
pub mod ring;
pub mod shares;
pub mod windowed;

pub use hashrate::HashrateMonitor;
pub use ring::{Record, StatisticsRing};
pub use shares::ShareStats;
pub use windowed::WindowedTimeMean;
