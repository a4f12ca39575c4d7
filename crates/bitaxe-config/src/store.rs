//! Configuration store abstraction, standing in for the out-of-scope NVS
//! key/value layer (spec §6 "Configuration store").

use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config key not found: {0}")]
    NotFound(&'static str),
    #[error("config value for {key} had unexpected type")]
    TypeMismatch { key: &'static str },
}

/// Keyed reads/writes of `u16`/`i32`/`u64`/`String`, exactly the shapes the
/// core needs from NVS at startup and on every controller tick. Concrete
/// key names are supplied by callers (typically the constants in this
/// module); the trait itself is storage-agnostic.
pub trait ConfigStore: Send + Sync {
    fn get_u16(&self, key: &'static str) -> Result<u16, ConfigError>;
    fn set_u16(&self, key: &'static str, value: u16) -> Result<(), ConfigError>;
    fn get_i32(&self, key: &'static str) -> Result<i32, ConfigError>;
    fn set_i32(&self, key: &'static str, value: i32) -> Result<(), ConfigError>;
    fn get_u64(&self, key: &'static str) -> Result<u64, ConfigError>;
    fn set_u64(&self, key: &'static str, value: u64) -> Result<(), ConfigError>;
    fn get_string(&self, key: &'static str) -> Result<String, ConfigError>;
    fn set_string(&self, key: &'static str, value: &str) -> Result<(), ConfigError>;
}

/// NVS key names read/written by the core (spec §6 external interfaces
/// list). Exhaustive over the keys the core itself touches; persistence
/// layout for logs/theme/display strings is out of scope and not listed
/// here.
pub mod keys {
    pub const ASIC_VOLTAGE_MV: &str = "asicvoltage";
    pub const ASIC_FREQUENCY_MHZ: &str = "asicfrequency";
    pub const FAN_SPEED_PERCENT: &str = "fanspeed";
    pub const AUTO_FAN_SPEED: &str = "autofanspeed";
    pub const MIN_FAN_SPEED_PERCENT: &str = "minfanspeed";
    pub const TARGET_TEMP_C: &str = "targettemp";
    pub const AUTOTUNE_ENABLE: &str = "autotune";
    pub const AUTOTUNE_PRESET: &str = "autotunepreset";
    pub const OVERHEAT_MODE: &str = "overheatMode";
    pub const OVERHEAT_COUNT: &str = "overheatCount";
    pub const BEST_DIFFICULTY: &str = "bestdiff";
    pub const STATS_SAMPLE_PERIOD_S: &str = "statsperiod";
    pub const SV2_AUTHORITY_PUBKEY: &str = "sv2authpubkey";
    pub const STRATUM_PROTOCOL: &str = "stratumprotocol";

    pub const PRIMARY_POOL_URL: &str = "poolurl";
    pub const PRIMARY_POOL_PORT: &str = "poolport";
    pub const PRIMARY_POOL_USER: &str = "pooluser";
    pub const PRIMARY_POOL_PASSWORD: &str = "poolpassword";
    pub const PRIMARY_POOL_TLS: &str = "pooltls";
    pub const PRIMARY_POOL_SUGGESTED_DIFFICULTY: &str = "poolsuggesteddiff";
    pub const PRIMARY_POOL_EXTRANONCE_SUBSCRIBE: &str = "poolextranonce";

    pub const FALLBACK_POOL_URL: &str = "fallbackpoolurl";
    pub const FALLBACK_POOL_PORT: &str = "fallbackpoolport";
    pub const FALLBACK_POOL_USER: &str = "fallbackpooluser";
    pub const FALLBACK_POOL_PASSWORD: &str = "fallbackpoolpassword";
    pub const FALLBACK_POOL_TLS: &str = "fallbackpooltls";
    pub const FALLBACK_POOL_SUGGESTED_DIFFICULTY: &str = "fallbackpoolsuggesteddiff";
    pub const FALLBACK_POOL_EXTRANONCE_SUBSCRIBE: &str = "fallbackpoolextranonce";
}

#[derive(Debug, Clone)]
enum Value {
    U16(u16),
    I32(i32),
    U64(u64),
    Str(String),
}

/// In-memory config store for tests and for bring-up before NVS is wired.
#[derive(Default)]
pub struct MemConfigStore {
    values: Mutex<HashMap<&'static str, Value>>,
}

impl MemConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemConfigStore {
    fn get_u16(&self, key: &'static str) -> Result<u16, ConfigError> {
        match self.values.lock().unwrap().get(key) {
            Some(Value::U16(v)) => Ok(*v),
            Some(_) => Err(ConfigError::TypeMismatch { key }),
            None => Err(ConfigError::NotFound(key)),
        }
    }

    fn set_u16(&self, key: &'static str, value: u16) -> Result<(), ConfigError> {
        self.values.lock().unwrap().insert(key, Value::U16(value));
        Ok(())
    }

    fn get_i32(&self, key: &'static str) -> Result<i32, ConfigError> {
        match self.values.lock().unwrap().get(key) {
            Some(Value::I32(v)) => Ok(*v),
            Some(_) => Err(ConfigError::TypeMismatch { key }),
            None => Err(ConfigError::NotFound(key)),
        }
    }

    fn set_i32(&self, key: &'static str, value: i32) -> Result<(), ConfigError> {
        self.values.lock().unwrap().insert(key, Value::I32(value));
        Ok(())
    }

    fn get_u64(&self, key: &'static str) -> Result<u64, ConfigError> {
        match self.values.lock().unwrap().get(key) {
            Some(Value::U64(v)) => Ok(*v),
            Some(_) => Err(ConfigError::TypeMismatch { key }),
            None => Err(ConfigError::NotFound(key)),
        }
    }

    fn set_u64(&self, key: &'static str, value: u64) -> Result<(), ConfigError> {
        self.values.lock().unwrap().insert(key, Value::U64(value));
        Ok(())
    }

    fn get_string(&self, key: &'static str) -> Result<String, ConfigError> {
        match self.values.lock().unwrap().get(key) {
            Some(Value::Str(v)) => Ok(v.clone()),
            Some(_) => Err(ConfigError::TypeMismatch { key }),
            None => Err(ConfigError::NotFound(key)),
        }
    }

    fn set_string(&self, key: &'static str, value: &str) -> Result<(), ConfigError> {
        self.values.lock().unwrap().insert(key, Value::Str(value.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_found() {
        let store = MemConfigStore::new();
        assert!(matches!(store.get_u16(keys::FAN_SPEED_PERCENT), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn roundtrip_set_get() {
        let store = MemConfigStore::new();
        store.set_u16(keys::ASIC_FREQUENCY_MHZ, 500).unwrap();
        assert_eq!(store.get_u16(keys::ASIC_FREQUENCY_MHZ).unwrap(), 500);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let store = MemConfigStore::new();
        store.set_u16(keys::ASIC_FREQUENCY_MHZ, 500).unwrap();
        assert!(matches!(
            store.get_string(keys::ASIC_FREQUENCY_MHZ),
            Err(ConfigError::TypeMismatch { .. })
        ));
    }
}
