//! Two-level overheat FSM and recovery sequencing (spec §4.9 points 2-3),
//! ported from `overheat.c`. Hardware access (fan, rail, NVS, restart) is
//! abstracted behind [`OverheatHw`] the same way the source's
//! `overheat_hw_ops_t` vtable lets the original be unit-tested without real
//! hardware.

use super::calc::{calc_overheat_severity, should_trigger_overheat, Severity};
use bitaxe_config::{keys, ConfigStore};
use bitaxe_logging::{Category, Level, LogSink};
use std::time::Duration;

/// Immutable snapshot fed into the overheat check (spec §3 `OverheatEvent`
/// input record).
#[derive(Debug, Clone, Copy)]
pub struct OverheatCheckInput {
    pub chip_temp_c: f64,
    pub vr_temp_c: f64,
    pub frequency_mhz: u16,
    pub voltage_mv: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverheatCheckResult {
    pub should_trigger: bool,
    pub severity: Severity,
}

/// Device model, distinguishing how the ASIC rail is disabled on trigger
/// (spec §2.X supplemented feature).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    Max,
    Ultra,
    Supra,
    Gamma,
}

pub struct DeviceConfig {
    pub model: DeviceModel,
    pub has_power_en: bool,
    pub has_tps546: bool,
    /// TPS546 boards fall in this board-version range for Ultra/Supra.
    pub board_version: u16,
}

pub const SOFT_RECOVERY_COOLDOWN: Duration = Duration::from_secs(300);
pub const RECOVERY_CHECK_INTERVAL: Duration = Duration::from_secs(1);

const SAFE_VOLTAGE_MV: u16 = 1000;
const SAFE_FREQUENCY_MHZ: u16 = 50;
const SAFE_FAN_PERCENT: u8 = 100;

/// Hardware operations the recovery sequence needs, standing in for GPIO,
/// PMIC, NVS and the RTOS restart/task-delete primitives.
pub trait OverheatHw {
    fn set_fan_speed_percent(&self, percent: u8);
    fn set_vcore_mv(&self, millivolts: u16);
    fn set_asic_enable(&self, enabled: bool);
    fn system_restart(&self);
    fn delete_self_task(&self);
    fn delay(&self, duration: Duration);
}

/// Pure overheat decision: compose `should_trigger_overheat` +
/// `check_overheat` + `calc_overheat_severity`.
pub fn check(input: OverheatCheckInput, config: &DeviceConfig, lifetime_overheat_count: u32) -> OverheatCheckResult {
    let should_trigger = should_trigger_overheat(
        input.chip_temp_c,
        input.vr_temp_c,
        input.frequency_mhz,
        input.voltage_mv,
        config.has_tps546,
    );
    let severity = if should_trigger {
        calc_overheat_severity(lifetime_overheat_count)
    } else {
        Severity::None
    };
    OverheatCheckResult { should_trigger, severity }
}

fn disable_asic_power(hw: &dyn OverheatHw, config: &DeviceConfig) {
    match config.model {
        DeviceModel::Max => {
            if config.has_power_en {
                hw.set_asic_enable(false);
            }
        }
        DeviceModel::Ultra | DeviceModel::Supra => {
            if config.has_tps546 && (402..=499).contains(&config.board_version) {
                hw.set_vcore_mv(0);
            } else {
                hw.set_asic_enable(false);
            }
        }
        DeviceModel::Gamma => {
            hw.set_vcore_mv(0);
        }
    }
}

fn apply_safe_values(config_store: &dyn ConfigStore) {
    let _ = config_store.set_u16(keys::ASIC_VOLTAGE_MV, SAFE_VOLTAGE_MV);
    let _ = config_store.set_u16(keys::ASIC_FREQUENCY_MHZ, SAFE_FREQUENCY_MHZ);
    let _ = config_store.set_u16(keys::FAN_SPEED_PERCENT, SAFE_FAN_PERCENT as u16);
    let _ = config_store.set_u16(keys::AUTO_FAN_SPEED, 0);
    let _ = config_store.set_u16(keys::OVERHEAT_MODE, 1);
}

pub fn format_device_info(config: &DeviceConfig) -> String {
    format!(
        "model={:?} board_version={} has_power_en={} has_tps546={}",
        config.model, config.board_version, config.has_power_en, config.has_tps546
    )
}

pub fn format_log_data(input: OverheatCheckInput, lifetime_overheat_count: u32) -> serde_json::Value {
    serde_json::json!({
        "chip_temp_c": input.chip_temp_c,
        "vr_temp_c": input.vr_temp_c,
        "frequency_mhz": input.frequency_mhz,
        "voltage_mv": input.voltage_mv,
        "overheat_count": lifetime_overheat_count,
    })
}

/// Execute the recovery sequence. For `Hard` severity this deletes the
/// calling task and never returns control to the caller in the source; in
/// this port it returns after calling [`OverheatHw::delete_self_task`], and
/// callers must not continue running the controller loop afterward.
pub fn execute_recovery(
    hw: &dyn OverheatHw,
    config_store: &dyn ConfigStore,
    log: &dyn LogSink,
    config: &DeviceConfig,
    input: OverheatCheckInput,
    severity: Severity,
    lifetime_overheat_count: u32,
) {
    let new_count = lifetime_overheat_count + 1;
    let _ = config_store.set_u16(keys::OVERHEAT_COUNT, new_count.min(u16::MAX as u32) as u16);

    hw.set_fan_speed_percent(SAFE_FAN_PERCENT);
    disable_asic_power(hw, config);
    apply_safe_values(config_store);

    let message = match severity {
        Severity::Hard => "Overheat protection triggered - Restart Device Manually",
        _ => "Overheat protection triggered - temperature exceeded threshold",
    };
    log.log_event(
        Category::Power,
        Level::Error,
        message,
        Some(format_log_data(input, new_count)),
    );

    match severity {
        Severity::Hard => {
            hw.delete_self_task();
        }
        Severity::Soft => {
            let mut remaining = SOFT_RECOVERY_COOLDOWN;
            while remaining > Duration::ZERO {
                hw.delay(RECOVERY_CHECK_INTERVAL);
                remaining = remaining.saturating_sub(RECOVERY_CHECK_INTERVAL);
            }
            let _ = config_store.set_u16(keys::OVERHEAT_MODE, 0);
            log.log_event(
                Category::Power,
                Level::Info,
                "Overheat recovery completed - restarting system",
                None,
            );
            hw.system_restart();
        }
        Severity::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitaxe_config::MemConfigStore;
    use bitaxe_logging::StdLogSink;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeHw {
        fan_calls: RefCell<Vec<u8>>,
        vcore_calls: RefCell<Vec<u16>>,
        enable_calls: RefCell<Vec<bool>>,
        restarted: RefCell<bool>,
        deleted: RefCell<bool>,
        delays: RefCell<Vec<Duration>>,
    }

    impl OverheatHw for FakeHw {
        fn set_fan_speed_percent(&self, percent: u8) {
            self.fan_calls.borrow_mut().push(percent);
        }
        fn set_vcore_mv(&self, millivolts: u16) {
            self.vcore_calls.borrow_mut().push(millivolts);
        }
        fn set_asic_enable(&self, enabled: bool) {
            self.enable_calls.borrow_mut().push(enabled);
        }
        fn system_restart(&self) {
            *self.restarted.borrow_mut() = true;
        }
        fn delete_self_task(&self) {
            *self.deleted.borrow_mut() = true;
        }
        fn delay(&self, duration: Duration) {
            self.delays.borrow_mut().push(duration);
        }
    }

    fn gamma_config() -> DeviceConfig {
        DeviceConfig { model: DeviceModel::Gamma, has_power_en: false, has_tps546: false, board_version: 100 }
    }

    #[test]
    fn scenario_s3_soft_recovery_sequence() {
        let hw = FakeHw::default();
        let store = MemConfigStore::new();
        let log = StdLogSink::default();
        let config = gamma_config();
        let input = OverheatCheckInput { chip_temp_c: 80.0, vr_temp_c: 0.0, frequency_mhz: 500, voltage_mv: 1200 };

        let result = check(input, &config, 4);
        assert!(result.should_trigger);
        assert_eq!(result.severity, Severity::Soft);

        execute_recovery(&hw, &store, &log, &config, input, result.severity, 4);

        assert_eq!(*hw.fan_calls.borrow(), vec![100]);
        assert_eq!(*hw.vcore_calls.borrow(), vec![0]);
        assert_eq!(store.get_u16(keys::ASIC_VOLTAGE_MV).unwrap(), 1000);
        assert_eq!(store.get_u16(keys::ASIC_FREQUENCY_MHZ).unwrap(), 50);
        assert_eq!(store.get_u16(keys::OVERHEAT_COUNT).unwrap(), 5);
        // After the cooldown loop, overheat_mode is cleared and the system restarts.
        assert_eq!(store.get_u16(keys::OVERHEAT_MODE).unwrap(), 0);
        assert!(*hw.restarted.borrow());
        assert!(!*hw.deleted.borrow());
        assert_eq!(hw.delays.borrow().len(), 300); // 300 x 1s slices = 5 min
    }

    #[test]
    fn scenario_s4_hard_recovery_deletes_task_without_reboot() {
        let hw = FakeHw::default();
        let store = MemConfigStore::new();
        let log = StdLogSink::default();
        let config = gamma_config();
        let input = OverheatCheckInput { chip_temp_c: 80.0, vr_temp_c: 0.0, frequency_mhz: 500, voltage_mv: 1200 };

        let result = check(input, &config, 5);
        assert_eq!(result.severity, Severity::Hard);

        execute_recovery(&hw, &store, &log, &config, input, result.severity, 5);

        assert_eq!(store.get_u16(keys::OVERHEAT_COUNT).unwrap(), 6);
        assert!(*hw.deleted.borrow());
        assert!(!*hw.restarted.borrow());
        assert!(hw.delays.borrow().is_empty());
    }
}
