//! The power/thermal controller task itself (spec §4.9): one fixed-period
//! tick that reads sensors, checks for overheat, drives the fan, commits
//! voltage/frequency set-points, and runs the autotuner.

use super::autotune::{calc_autotune, AutotuneDecision, AutotuneInput, AutotuneLimits, AutotuneState};
use super::calc::{calc_efficiency, calc_fan_speed_percent, calc_target_hashrate};
use super::overheat::{self, DeviceConfig, OverheatCheckInput, OverheatHw};
use super::state::PowerState;
use bitaxe_config::ConfigStore;
use bitaxe_logging::LogSink;
use std::time::Duration;

/// Controller tick period (spec §4.9).
pub const TICK_PERIOD: Duration = Duration::from_secs(2);
/// Warm-up before autotune is allowed to run at all.
pub const AUTOTUNE_WARMUP: Duration = Duration::from_secs(900);

/// Raw sensor readings for one tick, sourced from INA260/TPS546 and
/// EMC2101/EMC2103 depending on board variant (abstracted away here; the
/// board-specific driver is out of scope for this crate).
#[derive(Debug, Clone, Copy)]
pub struct SensorReadings {
    pub chip_temps_c: [f64; 6],
    pub vr_temp_c: f64,
    pub rail_voltage_mv: u16,
    pub rail_current_ma: i32,
    pub fan_rpm: u16,
    pub hashrate_ghs: f64,
}

/// Everything the PMIC/fan/ASIC-frequency commit step needs, collected
/// behind one trait so the controller can be driven in tests without real
/// hardware.
pub trait ControllerHw: OverheatHw {
    fn set_fan_percent(&self, percent: u8);
    fn set_vcore_mv(&self, millivolts: u16);
    /// Stage a frequency transition through the ASIC driver; returns
    /// whether the family supports stepping (BM1397 does not).
    fn set_frequency_mhz(&self, target_mhz: u16) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub device: DeviceConfigHandle,
    pub target_temp_c: f64,
    pub auto_fan_enabled: bool,
    pub fixed_fan_percent: u8,
    pub min_fan_speed_percent: u8,
    pub autotune_enabled: bool,
    pub small_core_count: u32,
    pub asic_count: u32,
    pub limits: AutotuneLimits,
    pub desired_voltage_mv: u16,
    pub desired_frequency_mhz: u16,
}

/// Plain-data mirror of [`DeviceConfig`] so `ControllerConfig` can derive
/// `Copy` (the trait-object version carries no such constraint).
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfigHandle {
    pub model: super::overheat::DeviceModel,
    pub has_power_en: bool,
    pub has_tps546: bool,
    pub board_version: u16,
}

impl From<DeviceConfigHandle> for DeviceConfig {
    fn from(h: DeviceConfigHandle) -> Self {
        DeviceConfig { model: h.model, has_power_en: h.has_power_en, has_tps546: h.has_tps546, board_version: h.board_version }
    }
}

pub struct TickOutcome {
    pub state: PowerState,
    pub overheat_triggered: bool,
    pub autotune_decision: Option<AutotuneDecision>,
}

/// Run one controller tick. Returns the updated [`PowerState`] and whatever
/// the autotuner decided (if it ran at all this tick).
#[allow(clippy::too_many_arguments)]
pub fn tick(
    hw: &dyn ControllerHw,
    config_store: &dyn ConfigStore,
    log: &dyn LogSink,
    config: &ControllerConfig,
    autotune_state: &AutotuneState,
    readings: SensorReadings,
    last_applied_voltage_mv: &mut u16,
    last_applied_frequency_mhz: &mut u16,
    uptime: Duration,
    now_tick_ms: u64,
    lifetime_overheat_count: u32,
) -> TickOutcome {
    let mut state = PowerState {
        chip_temps_c: readings.chip_temps_c,
        vr_temp_c: readings.vr_temp_c,
        rail_voltage_mv: readings.rail_voltage_mv,
        rail_current_ma: readings.rail_current_ma,
        fan_rpm: readings.fan_rpm,
        commanded_voltage_mv: *last_applied_voltage_mv,
        commanded_frequency_mhz: *last_applied_frequency_mhz,
        ..Default::default()
    };
    state.update_chip_average();
    state.input_power_w = (readings.rail_voltage_mv as f64 / 1000.0) * (readings.rail_current_ma as f64 / 1000.0);
    state.output_power_w = state.input_power_w;
    state.efficiency_j_per_th = calc_efficiency(state.input_power_w, readings.hashrate_ghs);

    let device_config: DeviceConfig = config.device.into();
    let overheat_input = OverheatCheckInput {
        chip_temp_c: state.chip_temp_avg_c,
        vr_temp_c: state.vr_temp_c,
        frequency_mhz: *last_applied_frequency_mhz,
        voltage_mv: *last_applied_voltage_mv,
    };
    let overheat_result = overheat::check(overheat_input, &device_config, lifetime_overheat_count);
    if overheat_result.should_trigger {
        overheat::execute_recovery(
            hw,
            config_store,
            log,
            &device_config,
            overheat_input,
            overheat_result.severity,
            lifetime_overheat_count,
        );
        return TickOutcome { state, overheat_triggered: true, autotune_decision: None };
    }

    let fan_percent = if config.auto_fan_enabled {
        calc_fan_speed_percent(state.chip_temp_avg_c).round() as u8
    } else {
        config.fixed_fan_percent
    };
    hw.set_fan_percent(fan_percent);
    state.fan_percent = fan_percent;

    if config.desired_voltage_mv != *last_applied_voltage_mv {
        hw.set_vcore_mv(config.desired_voltage_mv);
        *last_applied_voltage_mv = config.desired_voltage_mv;
        state.commanded_voltage_mv = config.desired_voltage_mv;
    }
    if config.desired_frequency_mhz != *last_applied_frequency_mhz {
        if hw.set_frequency_mhz(config.desired_frequency_mhz) {
            *last_applied_frequency_mhz = config.desired_frequency_mhz;
            state.commanded_frequency_mhz = config.desired_frequency_mhz;
        }
    }

    let mut autotune_decision = None;
    if config.autotune_enabled && uptime >= AUTOTUNE_WARMUP {
        let target_hashrate = calc_target_hashrate(*last_applied_frequency_mhz, config.small_core_count, config.asic_count);
        let ms_since_last_adjust = autotune_state.ms_since_last_adjust(now_tick_ms);
        let input = AutotuneInput {
            chip_temp_c: state.chip_temp_avg_c,
            hashrate_ghs: readings.hashrate_ghs,
            target_hashrate_ghs: target_hashrate,
            current_frequency_mhz: *last_applied_frequency_mhz,
            current_voltage_mv: *last_applied_voltage_mv,
            current_power_w: state.input_power_w,
            uptime_seconds: uptime.as_secs(),
        };
        let decision = calc_autotune(
            input,
            config.limits,
            config.target_temp_c,
            autotune_state.low_hashrate_count(),
            ms_since_last_adjust,
        );
        if decision.should_adjust {
            hw.set_vcore_mv(decision.new_voltage_mv);
            *last_applied_voltage_mv = decision.new_voltage_mv;
            hw.set_frequency_mhz(decision.new_frequency_mhz);
            *last_applied_frequency_mhz = decision.new_frequency_mhz;
            autotune_state.update_last_adjust_time(now_tick_ms);
        }
        autotune_decision = Some(decision);
    }

    TickOutcome { state, overheat_triggered: false, autotune_decision }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitaxe_config::MemConfigStore;
    use bitaxe_logging::StdLogSink;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeHw {
        fan: RefCell<Option<u8>>,
        vcore: RefCell<Vec<u16>>,
    }

    impl OverheatHw for FakeHw {
        fn set_fan_speed_percent(&self, percent: u8) {
            *self.fan.borrow_mut() = Some(percent);
        }
        fn set_vcore_mv(&self, millivolts: u16) {
            self.vcore.borrow_mut().push(millivolts);
        }
        fn set_asic_enable(&self, _enabled: bool) {}
        fn system_restart(&self) {}
        fn delete_self_task(&self) {}
        fn delay(&self, _duration: Duration) {}
    }

    impl ControllerHw for FakeHw {
        fn set_fan_percent(&self, percent: u8) {
            *self.fan.borrow_mut() = Some(percent);
        }
        fn set_vcore_mv(&self, millivolts: u16) {
            self.vcore.borrow_mut().push(millivolts);
        }
        fn set_frequency_mhz(&self, _target_mhz: u16) -> bool {
            true
        }
    }

    fn base_config() -> ControllerConfig {
        ControllerConfig {
            device: DeviceConfigHandle {
                model: super::super::overheat::DeviceModel::Gamma,
                has_power_en: false,
                has_tps546: false,
                board_version: 100,
            },
            target_temp_c: 60.0,
            auto_fan_enabled: true,
            fixed_fan_percent: 50,
            min_fan_speed_percent: 25,
            autotune_enabled: false,
            small_core_count: 672,
            asic_count: 1,
            limits: AutotuneLimits {
                min_frequency_mhz: 300,
                max_frequency_mhz: 800,
                min_voltage_mv: 1000,
                max_voltage_mv: 1400,
                max_power_w: 25.0,
            },
            desired_voltage_mv: 1200,
            desired_frequency_mhz: 500,
        }
    }

    #[test]
    fn normal_tick_drives_fan_and_commits_setpoints() {
        let hw = FakeHw::default();
        let store = MemConfigStore::new();
        let log = StdLogSink::default();
        let config = base_config();
        let autotune_state = AutotuneState::new();
        let readings = SensorReadings {
            chip_temps_c: [55.0; 6],
            vr_temp_c: 40.0,
            rail_voltage_mv: 1190,
            rail_current_ma: 12000,
            fan_rpm: 3000,
            hashrate_ghs: 480.0,
        };
        let mut last_voltage = 1000;
        let mut last_freq = 400;
        let outcome = tick(
            &hw,
            &store,
            &log,
            &config,
            &autotune_state,
            readings,
            &mut last_voltage,
            &mut last_freq,
            Duration::from_secs(10),
            10_000,
            0,
        );
        assert!(!outcome.overheat_triggered);
        assert_eq!(last_voltage, 1200);
        assert_eq!(last_freq, 500);
        assert!(hw.fan.borrow().is_some());
    }

    #[test]
    fn overheat_tick_skips_fan_curve_and_autotune() {
        let hw = FakeHw::default();
        let store = MemConfigStore::new();
        let log = StdLogSink::default();
        let config = base_config();
        let autotune_state = AutotuneState::new();
        let readings = SensorReadings {
            chip_temps_c: [90.0; 6],
            vr_temp_c: 40.0,
            rail_voltage_mv: 1200,
            rail_current_ma: 12000,
            fan_rpm: 3000,
            hashrate_ghs: 480.0,
        };
        let mut last_voltage = 1200;
        let mut last_freq = 500;
        let outcome = tick(
            &hw,
            &store,
            &log,
            &config,
            &autotune_state,
            readings,
            &mut last_voltage,
            &mut last_freq,
            Duration::from_secs(10),
            10_000,
            0,
        );
        assert!(outcome.overheat_triggered);
        assert!(outcome.autotune_decision.is_none());
    }
}
