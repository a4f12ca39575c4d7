//! Top-level wiring (spec §4.4/§4.5, C7/C8): turns pool notifications into
//! ASIC-ready jobs, turns returned nonces back into share submissions, and
//! the supervisor task that owns both loops plus the power controller.

pub mod config;
pub mod job_builder;
pub mod result_task;
pub mod supervisor;

pub use config::AppConfig;
pub use job_builder::{JobBuilderError, JobBuilderTask};
pub use result_task::{ResultOutcome, ResultTask, SystemClock};
pub use supervisor::Shared;
