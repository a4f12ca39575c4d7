//! Per-domain hashrate measurement and rolling averages (spec §4.8, C9).

use crate::windowed::WindowedTimeMean;
use std::time::{Duration, Instant};

/// Sanity range for any accepted instantaneous hashrate reading, in GH/s.
/// Readings outside this range are sensor noise and are rejected, retaining
/// the previous value (spec Testable Property 11).
pub const HASHRATE_MIN_GHS: f64 = 0.001;
pub const HASHRATE_MAX_GHS: f64 = 3000.0;

/// Warm-up period before the monitor starts polling, per spec §4.8.
pub const WARMUP: Duration = Duration::from_secs(4);

fn in_sane_range(ghs: f64) -> bool {
    ghs >= HASHRATE_MIN_GHS && ghs <= HASHRATE_MAX_GHS
}

/// Per-ASIC-domain measurement state, tracking both update paths described
/// in spec §4.8: the instantaneous register and the free-running counter.
pub struct DomainMeasurement {
    first_read_done: bool,
    last_counter: u32,
    last_timestamp_us: u64,
    last_hashrate_ghs: f64,
}

impl Default for DomainMeasurement {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainMeasurement {
    pub fn new() -> Self {
        Self {
            first_read_done: false,
            last_counter: 0,
            last_timestamp_us: 0,
            last_hashrate_ghs: 0.0,
        }
    }

    pub fn last_hashrate_ghs(&self) -> f64 {
        self.last_hashrate_ghs
    }

    /// The ASIC exposes a signed-meaning 32-bit field: bit 31 toggles a
    /// "long window" mode (ignored here, same as the source), the low 31
    /// bits times 2^24 give hashes/sec.
    pub fn update_instantaneous(&mut self, raw: u32) -> f64 {
        let hashes_per_sec = (raw & 0x7fff_ffff) as f64 * (1u64 << 24) as f64;
        let ghs = hashes_per_sec / 1e9;
        if in_sane_range(ghs) {
            self.last_hashrate_ghs = ghs;
        }
        self.last_hashrate_ghs
    }

    /// On the first read, just store the counter. On subsequent reads,
    /// compute `delta_counter * 2^32 / delta_us`, treating the 32-bit
    /// counter as wrapping modulo 2^32.
    pub fn update_counter(&mut self, counter: u32, timestamp_us: u64) -> f64 {
        if !self.first_read_done {
            self.first_read_done = true;
            self.last_counter = counter;
            self.last_timestamp_us = timestamp_us;
            return self.last_hashrate_ghs;
        }
        let delta_counter = counter.wrapping_sub(self.last_counter) as u64;
        let delta_us = timestamp_us.saturating_sub(self.last_timestamp_us);
        self.last_counter = counter;
        self.last_timestamp_us = timestamp_us;
        if delta_us == 0 {
            return self.last_hashrate_ghs;
        }
        let hashes_per_sec = delta_counter as f64 * (1u64 << 32) as f64 / delta_us as f64 * 1e6;
        let ghs = hashes_per_sec / 1e9;
        if in_sane_range(ghs) {
            self.last_hashrate_ghs = ghs;
        }
        self.last_hashrate_ghs
    }
}

/// Rolling 1 m / 10 m / 1 h hashrate averages for one ASIC chain, each
/// smoothly blended across its bucket boundary.
pub struct HashrateMonitor {
    domain: DomainMeasurement,
    bucket_1m: WindowedTimeMean,
    bucket_10m: WindowedTimeMean,
    bucket_1h: WindowedTimeMean,
}

impl HashrateMonitor {
    pub fn new() -> Self {
        Self {
            domain: DomainMeasurement::new(),
            bucket_1m: WindowedTimeMean::new(Duration::from_secs(60)),
            bucket_10m: WindowedTimeMean::new(Duration::from_secs(600)),
            bucket_1h: WindowedTimeMean::new(Duration::from_secs(3600)),
        }
    }

    pub fn sample_instantaneous(&mut self, raw: u32, now: Instant) {
        let ghs = self.domain.update_instantaneous(raw);
        self.record(ghs, now);
    }

    pub fn sample_counter(&mut self, counter: u32, timestamp_us: u64, now: Instant) {
        let ghs = self.domain.update_counter(counter, timestamp_us);
        self.record(ghs, now);
    }

    fn record(&mut self, ghs: f64, now: Instant) {
        self.bucket_1m.insert(ghs, now);
        self.bucket_10m.insert(ghs, now);
        self.bucket_1h.insert(ghs, now);
    }

    pub fn hashrate_1m(&self, now: Instant) -> f64 {
        self.bucket_1m.measure(now) * 60.0
    }

    pub fn hashrate_10m(&self, now: Instant) -> f64 {
        self.bucket_10m.measure(now) * 600.0
    }

    pub fn hashrate_1h(&self, now: Instant) -> f64 {
        self.bucket_1h.measure(now) * 3600.0
    }
}

impl Default for HashrateMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_instantaneous_reading_is_rejected() {
        let mut domain = DomainMeasurement::new();
        // 2^31-1 * 2^24 hashes/sec is far above 3000 GH/s.
        let too_high = domain.update_instantaneous(0x7fff_ffff);
        assert_eq!(too_high, 0.0);
    }

    #[test]
    fn counter_first_read_stores_without_computing_rate() {
        let mut domain = DomainMeasurement::new();
        assert_eq!(domain.update_counter(1000, 0), 0.0);
    }

    #[test]
    fn counter_wraparound_is_handled() {
        let mut domain = DomainMeasurement::new();
        domain.update_counter(u32::MAX - 10, 0);
        // Wraps past zero after 1 second; delta_counter should be small and positive.
        let ghs = domain.update_counter(5, 1_000_000);
        assert!(ghs >= 0.0);
    }
}
