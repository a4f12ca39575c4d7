//! ASIC driver family: serial framing, the active-jobs arena, per-chip
//! dispatch, and power/thermal control (spec §4.1-4.2, §4.9).

pub mod chip;
pub mod job;
pub mod power;
pub mod serial;

pub use chip::{AsicDriver, AsicError, ChipFamily, TaskResult};
pub use job::{ActiveJobs, BmJob, Generation};
pub use serial::{FrameError, SerialPort};
