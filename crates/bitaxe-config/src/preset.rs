//! Autotune presets (spec §4.9 "Presets"): three named operating points per
//! device model, statically defined as (voltage, frequency, fan speed).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresetName {
    Quiet,
    Balanced,
    Turbo,
}

impl PresetName {
    /// Parse an NVS-stored preset name, falling back to `None` on any value
    /// that isn't one of the three known presets. Per spec §9's open
    /// question, the source never validates this string against the
    /// current device model; this port makes that validation explicit by
    /// returning `Option` instead of silently defaulting, but callers that
    /// want the source's exact silent-fallback behavior can map `None` to
    /// "leave last-applied values in place" themselves.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "quiet" => Some(PresetName::Quiet),
            "balanced" => Some(PresetName::Balanced),
            "turbo" => Some(PresetName::Turbo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Quiet => "quiet",
            PresetName::Balanced => "balanced",
            PresetName::Turbo => "turbo",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Preset {
    pub voltage_mv: u16,
    pub frequency_mhz: u16,
    pub fan_percent: u8,
}

/// Per-device-model preset tables. Device models mirror the bitaxe board
/// variants named in the firmware (`DEVICE_MODEL_MAX/ULTRA/SUPRA/GAMMA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceModel {
    Max,
    Ultra,
    Supra,
    Gamma,
}

/// Look up the static preset table entry for a device model / preset name
/// pair. Values are representative bitaxe operating points; boards differ
/// mainly in how much voltage headroom "turbo" can safely use.
pub fn lookup(model: DeviceModel, preset: PresetName) -> Preset {
    match (model, preset) {
        (DeviceModel::Max, PresetName::Quiet) => Preset { voltage_mv: 1100, frequency_mhz: 400, fan_percent: 35 },
        (DeviceModel::Max, PresetName::Balanced) => Preset { voltage_mv: 1150, frequency_mhz: 450, fan_percent: 50 },
        (DeviceModel::Max, PresetName::Turbo) => Preset { voltage_mv: 1200, frequency_mhz: 500, fan_percent: 75 },
        (DeviceModel::Ultra, PresetName::Quiet) => Preset { voltage_mv: 1150, frequency_mhz: 450, fan_percent: 35 },
        (DeviceModel::Ultra, PresetName::Balanced) => Preset { voltage_mv: 1200, frequency_mhz: 500, fan_percent: 50 },
        (DeviceModel::Ultra, PresetName::Turbo) => Preset { voltage_mv: 1250, frequency_mhz: 575, fan_percent: 75 },
        (DeviceModel::Supra, PresetName::Quiet) => Preset { voltage_mv: 1150, frequency_mhz: 450, fan_percent: 35 },
        (DeviceModel::Supra, PresetName::Balanced) => Preset { voltage_mv: 1200, frequency_mhz: 525, fan_percent: 50 },
        (DeviceModel::Supra, PresetName::Turbo) => Preset { voltage_mv: 1250, frequency_mhz: 600, fan_percent: 75 },
        (DeviceModel::Gamma, PresetName::Quiet) => Preset { voltage_mv: 1100, frequency_mhz: 490, fan_percent: 35 },
        (DeviceModel::Gamma, PresetName::Balanced) => Preset { voltage_mv: 1150, frequency_mhz: 575, fan_percent: 50 },
        (DeviceModel::Gamma, PresetName::Turbo) => Preset { voltage_mv: 1200, frequency_mhz: 650, fan_percent: 75 },
    }
}
