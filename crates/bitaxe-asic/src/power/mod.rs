//! Power/thermal control (spec §4.9): pure math (`calc`), the autotune
//! decision function and its state handle (`autotune`), the overheat FSM
//! and recovery sequence (`overheat`), the latest-readings snapshot
//! (`state`), and the tick that wires all of them together (`controller`).

pub mod autotune;
pub mod calc;
pub mod controller;
pub mod overheat;
pub mod state;

pub use autotune::{AutotuneDecision, AutotuneInput, AutotuneLimits, AutotuneState};
pub use controller::{tick, ControllerConfig, ControllerHw, DeviceConfigHandle, SensorReadings, TickOutcome};
pub use overheat::{DeviceConfig, DeviceModel, OverheatCheckInput, OverheatCheckResult, OverheatHw};
pub use state::PowerState;
