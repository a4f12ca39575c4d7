//! Configuration store abstraction and the small set of configuration
//! value types (pool descriptors, autotune presets) the core shares
//! between its Stratum clients and power controller.

pub mod pool;
pub mod preset;
pub mod store;

pub use pool::{PoolDescriptor, Protocol};
pub use preset::{lookup as lookup_preset, DeviceModel, Preset, PresetName};
pub use store::{keys, ConfigError, ConfigStore, MemConfigStore};
