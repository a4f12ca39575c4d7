//! Closed-loop autotuner: a mutex-guarded state handle (spec §9 "already
//! refactored... keep that shape") plus the pure decision function ported
//! from `power_management_calc.c`'s `pm_calc_autotune`.

use super::calc::{clamp_f, clamp_u16, is_hashrate_low, PM_AUTOTUNE_WARMUP_SECONDS, PM_MAX_LOW_HASHRATE_ATTEMPTS};
use std::sync::Mutex;

/// Sentinel chip temperature meaning "no valid reading yet".
pub const TEMP_INVALID_SENTINEL: f64 = 255.0;

/// Mutex-protected tick-of-last-adjustment and consecutive-low-hashrate
/// counter. Every accessor takes the mutex internally, matching the
/// source's `autotune_state_t` opaque handle exactly.
pub struct AutotuneState {
    inner: Mutex<Inner>,
}

struct Inner {
    last_adjust_tick_ms: u64,
    consecutive_low_hashrate: u8,
}

impl AutotuneState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { last_adjust_tick_ms: 0, consecutive_low_hashrate: 0 }),
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("autotune state mutex poisoned");
        inner.last_adjust_tick_ms = 0;
        inner.consecutive_low_hashrate = 0;
    }

    /// Relies on wraparound the same way the source's tick subtraction does.
    pub fn ms_since_last_adjust(&self, current_tick_ms: u64) -> u64 {
        let inner = self.inner.lock().expect("autotune state mutex poisoned");
        current_tick_ms.wrapping_sub(inner.last_adjust_tick_ms)
    }

    pub fn update_last_adjust_time(&self, current_tick_ms: u64) {
        let mut inner = self.inner.lock().expect("autotune state mutex poisoned");
        inner.last_adjust_tick_ms = current_tick_ms;
    }

    pub fn low_hashrate_count(&self) -> u8 {
        self.inner.lock().expect("autotune state mutex poisoned").consecutive_low_hashrate
    }

    /// Saturates at 255 rather than wrapping.
    pub fn increment_low_hashrate(&self) {
        let mut inner = self.inner.lock().expect("autotune state mutex poisoned");
        if inner.consecutive_low_hashrate < u8::MAX {
            inner.consecutive_low_hashrate += 1;
        }
    }

    pub fn reset_low_hashrate(&self) {
        self.inner.lock().expect("autotune state mutex poisoned").consecutive_low_hashrate = 0;
    }
}

impl Default for AutotuneState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AutotuneInput {
    pub chip_temp_c: f64,
    pub hashrate_ghs: f64,
    pub target_hashrate_ghs: f64,
    pub current_frequency_mhz: u16,
    pub current_voltage_mv: u16,
    pub current_power_w: f64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct AutotuneLimits {
    pub min_frequency_mhz: u16,
    pub max_frequency_mhz: u16,
    pub min_voltage_mv: u16,
    pub max_voltage_mv: u16,
    pub max_power_w: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AutotuneDecision {
    pub skip_invalid: bool,
    pub skip_warmup: bool,
    pub skip_timing: bool,
    pub should_reset_preset: bool,
    pub should_adjust: bool,
    pub new_frequency_mhz: u16,
    pub new_voltage_mv: u16,
}

impl AutotuneDecision {
    fn skip(flag_setter: impl FnOnce(&mut Self)) -> Self {
        let mut d = Self::default();
        flag_setter(&mut d);
        d
    }
}

const LOW_HASHRATE_THRESHOLD_PERCENT: f64 = 20.0;
const NEAR_TARGET_BAND_C: f64 = 2.0;
const VOLTAGE_NUDGE_MV: u16 = 10;
const FREQUENCY_STEP_FRACTION: f64 = 0.02;
const VOLTAGE_STEP_FRACTION: f64 = 0.002;

/// Pure autotune decision, exactly spec §4.9's "Autotune decision function".
/// The caller applies the output and then calls
/// [`AutotuneState::update_last_adjust_time`]; this function has no side
/// effects of its own.
pub fn calc_autotune(
    input: AutotuneInput,
    limits: AutotuneLimits,
    target_temp_c: f64,
    consecutive_low_hashrate: u8,
    ms_since_last_adjust: u64,
) -> AutotuneDecision {
    if input.chip_temp_c == TEMP_INVALID_SENTINEL || input.hashrate_ghs <= 0.0 {
        return AutotuneDecision::skip(|d| d.skip_invalid = true);
    }

    if input.uptime_seconds < PM_AUTOTUNE_WARMUP_SECONDS && input.chip_temp_c < target_temp_c {
        return AutotuneDecision::skip(|d| d.skip_warmup = true);
    }

    let required_interval = super::calc::autotune_interval_ms(input.chip_temp_c);
    if ms_since_last_adjust < required_interval {
        return AutotuneDecision::skip(|d| d.skip_timing = true);
    }

    if consecutive_low_hashrate >= PM_MAX_LOW_HASHRATE_ATTEMPTS {
        return AutotuneDecision::skip(|d| d.should_reset_preset = true);
    }

    let delta = input.chip_temp_c - target_temp_c;
    let mut decision = AutotuneDecision {
        new_frequency_mhz: input.current_frequency_mhz,
        new_voltage_mv: input.current_voltage_mv,
        ..Default::default()
    };

    if delta.abs() <= NEAR_TARGET_BAND_C
        && is_hashrate_low(input.hashrate_ghs, input.target_hashrate_ghs, LOW_HASHRATE_THRESHOLD_PERCENT)
    {
        decision.new_voltage_mv = clamp_u16(
            input.current_voltage_mv.saturating_add(VOLTAGE_NUDGE_MV),
            limits.min_voltage_mv,
            limits.max_voltage_mv,
        );
        decision.should_adjust = true;
    } else if delta < -NEAR_TARGET_BAND_C {
        // More than 2C below target: ramp up, but only while there's power
        // headroom.
        if input.current_power_w < limits.max_power_w {
            decision.new_frequency_mhz = clamp_u16(
                scale_u16(input.current_frequency_mhz, 1.0 + FREQUENCY_STEP_FRACTION),
                limits.min_frequency_mhz,
                limits.max_frequency_mhz,
            );
            decision.new_voltage_mv = clamp_u16(
                scale_u16(input.current_voltage_mv, 1.0 + VOLTAGE_STEP_FRACTION),
                limits.min_voltage_mv,
                limits.max_voltage_mv,
            );
            decision.should_adjust = true;
        }
    } else if delta > NEAR_TARGET_BAND_C {
        // More than 2C above target: back off unconditionally.
        decision.new_frequency_mhz = clamp_u16(
            scale_u16(input.current_frequency_mhz, 1.0 - FREQUENCY_STEP_FRACTION),
            limits.min_frequency_mhz,
            limits.max_frequency_mhz,
        );
        decision.new_voltage_mv = clamp_u16(
            scale_u16(input.current_voltage_mv, 1.0 - VOLTAGE_STEP_FRACTION),
            limits.min_voltage_mv,
            limits.max_voltage_mv,
        );
        decision.should_adjust = true;
    }

    decision
}

/// Scale a u16 by a floating factor, truncating toward zero (matching the
/// source's plain C integer cast from a float multiplication).
fn scale_u16(value: u16, factor: f64) -> u16 {
    clamp_f(value as f64 * factor, 0.0, u16::MAX as f64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> AutotuneLimits {
        AutotuneLimits {
            min_frequency_mhz: 300,
            max_frequency_mhz: 800,
            min_voltage_mv: 1000,
            max_voltage_mv: 1400,
            max_power_w: 25.0,
        }
    }

    #[test]
    fn invalid_temperature_sets_only_skip_invalid() {
        let input = AutotuneInput {
            chip_temp_c: TEMP_INVALID_SENTINEL,
            hashrate_ghs: 500.0,
            target_hashrate_ghs: 500.0,
            current_frequency_mhz: 500,
            current_voltage_mv: 1200,
            current_power_w: 15.0,
            uptime_seconds: 10_000,
        };
        let decision = calc_autotune(input, limits(), 60.0, 0, 1_000_000);
        assert_eq!(
            decision,
            AutotuneDecision { skip_invalid: true, ..Default::default() }
        );
    }

    #[test]
    fn warmup_skip_when_uptime_short_and_below_target() {
        let input = AutotuneInput {
            chip_temp_c: 40.0,
            hashrate_ghs: 500.0,
            target_hashrate_ghs: 500.0,
            current_frequency_mhz: 500,
            current_voltage_mv: 1200,
            current_power_w: 15.0,
            uptime_seconds: 10,
        };
        let decision = calc_autotune(input, limits(), 60.0, 0, 1_000_000);
        assert!(decision.skip_warmup);
        assert!(!decision.skip_invalid && !decision.skip_timing);
    }

    #[test]
    fn timing_skip_when_interval_not_elapsed() {
        let input = AutotuneInput {
            chip_temp_c: 70.0,
            hashrate_ghs: 500.0,
            target_hashrate_ghs: 500.0,
            current_frequency_mhz: 500,
            current_voltage_mv: 1200,
            current_power_w: 15.0,
            uptime_seconds: 10_000,
        };
        // chip_temp >= 68 => 500ms interval; 10ms since last adjust is too soon.
        let decision = calc_autotune(input, limits(), 60.0, 0, 10);
        assert!(decision.skip_timing);
    }

    #[test]
    fn scenario_s6_below_target() {
        let input = AutotuneInput {
            chip_temp_c: 54.0,
            hashrate_ghs: 500.0,
            target_hashrate_ghs: 500.0,
            current_frequency_mhz: 500,
            current_voltage_mv: 1200,
            current_power_w: 15.0,
            uptime_seconds: 10_000,
        };
        let decision = calc_autotune(input, limits(), 60.0, 0, 400_000);
        assert!(decision.should_adjust);
        assert_eq!(decision.new_frequency_mhz, 510);
        assert_eq!(decision.new_voltage_mv, 1202);
    }

    #[test]
    fn scenario_s6_above_target() {
        let input = AutotuneInput {
            chip_temp_c: 66.0,
            hashrate_ghs: 500.0,
            target_hashrate_ghs: 500.0,
            current_frequency_mhz: 500,
            current_voltage_mv: 1200,
            current_power_w: 15.0,
            uptime_seconds: 10_000,
        };
        let decision = calc_autotune(input, limits(), 60.0, 0, 400_000);
        assert!(decision.should_adjust);
        assert_eq!(decision.new_frequency_mhz, 490);
        assert_eq!(decision.new_voltage_mv, 1197);
    }

    #[test]
    fn low_hashrate_near_target_nudges_voltage_only() {
        let input = AutotuneInput {
            chip_temp_c: 60.5,
            hashrate_ghs: 350.0, // 70% of target, more than 20% low
            target_hashrate_ghs: 500.0,
            current_frequency_mhz: 500,
            current_voltage_mv: 1200,
            current_power_w: 15.0,
            uptime_seconds: 10_000,
        };
        let decision = calc_autotune(input, limits(), 60.0, 0, 400_000);
        assert!(decision.should_adjust);
        assert_eq!(decision.new_frequency_mhz, 500);
        assert_eq!(decision.new_voltage_mv, 1210);
    }

    #[test]
    fn consecutive_low_hashrate_requests_preset_reset() {
        let input = AutotuneInput {
            chip_temp_c: 60.0,
            hashrate_ghs: 500.0,
            target_hashrate_ghs: 500.0,
            current_frequency_mhz: 500,
            current_voltage_mv: 1200,
            current_power_w: 15.0,
            uptime_seconds: 10_000,
        };
        let decision = calc_autotune(input, limits(), 60.0, PM_MAX_LOW_HASHRATE_ATTEMPTS, 400_000);
        assert!(decision.should_reset_preset);
        assert!(!decision.should_adjust);
    }

    #[test]
    fn autotune_state_saturates_low_hashrate_counter() {
        let state = AutotuneState::new();
        for _ in 0..300 {
            state.increment_low_hashrate();
        }
        assert_eq!(state.low_hashrate_count(), u8::MAX);
        state.reset_low_hashrate();
        assert_eq!(state.low_hashrate_count(), 0);
    }
}
