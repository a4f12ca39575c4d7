//! `PowerState` (spec §3): the latest readings and commanded set-points,
//! written by the controller task and read by any consumer (telemetry,
//! the admin API collaborator).

#[derive(Debug, Clone, Copy, Default)]
pub struct PowerState {
    pub fan_percent: u8,
    pub fan_rpm: u16,
    pub chip_temps_c: [f64; 6],
    pub chip_temp_avg_c: f64,
    pub vr_temp_c: f64,
    pub rail_voltage_mv: u16,
    pub rail_current_ma: i32,
    pub input_power_w: f64,
    pub output_power_w: f64,
    pub commanded_voltage_mv: u16,
    pub commanded_frequency_mhz: u16,
    /// Supplemented telemetry field (spec §2.X): J/TH efficiency, not fed
    /// back into the autotune decision.
    pub efficiency_j_per_th: f64,
}

impl PowerState {
    pub fn update_chip_average(&mut self) {
        let sum: f64 = self.chip_temps_c.iter().sum();
        self.chip_temp_avg_c = sum / self.chip_temps_c.len() as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_mean_of_all_six_sensors() {
        let mut state = PowerState { chip_temps_c: [60.0; 6], ..Default::default() };
        state.update_chip_average();
        assert_eq!(state.chip_temp_avg_c, 60.0);
    }
}
