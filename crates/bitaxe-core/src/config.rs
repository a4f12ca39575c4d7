//! On-disk configuration (spec §6): a TOML file describing the ASIC family,
//! pool credentials, and power/thermal defaults, with CLI flags layered on
//! top the same way the teacher's binaries layer `--pool`/`--frequency`
//! over a parsed config file.

use bitaxe_asic::power::DeviceModel as AsicDeviceModel;
use bitaxe_config::preset::DeviceModel as PresetDeviceModel;
use bitaxe_config::{Protocol, PoolDescriptor};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/bitaxe/config.toml";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("could not read config file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("pool url {0} is missing a host")]
    MissingPoolHost(String),
}

/// Maps the config crate's device-model enum onto the power/thermal
/// crate's own copy of it. The two stay separate crates (`bitaxe-config`
/// has no reason to depend on `bitaxe-asic`) so this mapping is the single
/// seam between them; see DESIGN.md.
pub fn to_asic_device_model(model: PresetDeviceModel) -> AsicDeviceModel {
    match model {
        PresetDeviceModel::Max => AsicDeviceModel::Max,
        PresetDeviceModel::Ultra => AsicDeviceModel::Ultra,
        PresetDeviceModel::Supra => AsicDeviceModel::Supra,
        PresetDeviceModel::Gamma => AsicDeviceModel::Gamma,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolFileConfig {
    pub url: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub suggested_difficulty: Option<u64>,
    #[serde(default)]
    pub extranonce_subscribe: bool,
    #[serde(default)]
    pub tls: bool,
}

impl PoolFileConfig {
    fn into_descriptor(self) -> Result<PoolDescriptor, ConfigLoadError> {
        let (scheme, rest) = self.url.split_once("://").unwrap_or(("stratum+tcp", self.url.as_str()));
        let protocol = Protocol::parse(scheme).unwrap_or(Protocol::StratumV1);
        let mut parts = rest.splitn(2, ':');
        let host = parts.next().filter(|h| !h.is_empty()).ok_or_else(|| ConfigLoadError::MissingPoolHost(self.url.clone()))?;
        let port = parts.next().and_then(|p| p.parse().ok()).unwrap_or(3333);
        Ok(PoolDescriptor {
            protocol,
            host: host.to_string(),
            port,
            user: self.user,
            password: self.password,
            tls: self.tls,
            suggested_difficulty: self.suggested_difficulty,
            extranonce_subscribe: self.extranonce_subscribe,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PowerFileConfig {
    #[serde(default = "default_target_temp_c")]
    pub target_temp_c: f64,
    #[serde(default = "default_true")]
    pub auto_fan_enabled: bool,
    #[serde(default = "default_fixed_fan_percent")]
    pub fixed_fan_percent: u8,
    #[serde(default = "default_min_fan_speed_percent")]
    pub min_fan_speed_percent: u8,
    #[serde(default)]
    pub autotune_enabled: bool,
    pub voltage_mv: u16,
    pub frequency_mhz: u16,
}

fn default_target_temp_c() -> f64 {
    60.0
}
fn default_true() -> bool {
    true
}
fn default_fixed_fan_percent() -> u8 {
    50
}
fn default_min_fan_speed_percent() -> u8 {
    25
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceModelName {
    Max,
    Ultra,
    Supra,
    Gamma,
}

impl From<DeviceModelName> for PresetDeviceModel {
    fn from(name: DeviceModelName) -> Self {
        match name {
            DeviceModelName::Max => PresetDeviceModel::Max,
            DeviceModelName::Ultra => PresetDeviceModel::Ultra,
            DeviceModelName::Supra => PresetDeviceModel::Supra,
            DeviceModelName::Gamma => PresetDeviceModel::Gamma,
        }
    }
}

/// Top-level configuration file, parsed with `toml` to match
/// `bitaxe-config`'s own on-disk format rather than pulling in a second
/// configuration crate.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    pub device_model: DeviceModelName,
    #[serde(default)]
    pub version_rolling: bool,
    pub primary_pool: PoolFileConfig,
    #[serde(default)]
    pub fallback_pool: Option<PoolFileConfig>,
    pub power: PowerFileConfig,
}

impl Configuration {
    pub fn parse_str(contents: &str) -> Result<Self, ConfigLoadError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read { path: path.display().to_string(), source })?;
        Self::parse_str(&contents)
    }
}

/// Fully-resolved application config: the parsed file with CLI overrides
/// applied, ready to hand to the supervisor.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub device_model: PresetDeviceModel,
    pub version_rolling: bool,
    pub primary_pool: PoolDescriptor,
    pub fallback_pool: Option<PoolDescriptor>,
    pub power: PowerFileConfig,
}

/// CLI overrides a `--pool`/`--user`/`--frequency`/`--voltage` flag can
/// apply on top of a parsed file, mirroring the teacher's
/// `--pool`/`--frequency`/`--voltage` overrides in `bosminer-am1-s9`.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub pool_url: Option<String>,
    pub pool_user: Option<String>,
    pub frequency_mhz: Option<u16>,
    pub voltage_mv: Option<u16>,
    pub disable_version_rolling: bool,
}

impl AppConfig {
    pub fn from_file(config: Configuration, overrides: CliOverrides) -> Result<Self, ConfigLoadError> {
        let mut primary_pool = config.primary_pool.into_descriptor()?;
        if let Some(url) = overrides.pool_url {
            let replacement = PoolFileConfig { url, user: primary_pool.user.clone(), password: primary_pool.password.clone(), suggested_difficulty: primary_pool.suggested_difficulty, extranonce_subscribe: primary_pool.extranonce_subscribe, tls: primary_pool.tls };
            primary_pool = replacement.into_descriptor()?;
        }
        if let Some(user) = overrides.pool_user {
            primary_pool.user = user;
        }

        let fallback_pool = config.fallback_pool.map(|pool| pool.into_descriptor()).transpose()?;

        let mut power = config.power;
        if let Some(freq) = overrides.frequency_mhz {
            power.frequency_mhz = freq;
        }
        if let Some(voltage) = overrides.voltage_mv {
            power.voltage_mv = voltage;
        }

        Ok(AppConfig {
            device_model: config.device_model.into(),
            version_rolling: config.version_rolling && !overrides.disable_version_rolling,
            primary_pool,
            fallback_pool,
            power,
        })
    }
}
