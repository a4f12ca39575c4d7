//! Fixed-capacity statistics ring buffer (spec §4.10, C11), consumed by
//! out-of-scope telemetry exporters (InfluxDB/webhook reporters, the
//! admin API). Lazily allocated on first sample, torn down when the
//! sampling period is configured to zero.

use std::sync::Mutex;

/// Ring capacity: ~1 h of samples at the 5 s sampling period.
pub const CAPACITY: usize = 720;

/// One timestamped sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct Record {
    pub timestamp_us: u64,
    pub hashrate_ghs: f64,
    pub chip_temp_c: f64,
    pub vr_temp_c: f64,
    pub power_w: f64,
    pub voltage_mv: u16,
    pub current_ma: i32,
    pub measured_core_voltage_mv: u16,
    pub fan_percent: u8,
    pub fan_rpm: u16,
    pub wifi_rssi_dbm: i16,
    pub free_heap_bytes: u32,
}

/// Opaque cursor into the ring, analogous to the source's `statisticData`
/// node pointer. Walking a cursor concurrently with writes can observe
/// shifted data if the ring has wrapped past it -- the source accepts this
/// trade-off for a lock-free-feeling read path and this port preserves it
/// (spec §9 Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(usize);

struct Inner {
    records: Vec<Record>,
    start: usize,
    end: usize,
    len: usize,
}

impl Inner {
    fn new() -> Self {
        Self {
            records: vec![Record::default(); CAPACITY],
            start: 0,
            end: 0,
            len: 0,
        }
    }

    fn add_sample(&mut self, record: Record) {
        self.records[self.end] = record;
        let next_end = (self.end + 1) % CAPACITY;
        if self.len == CAPACITY {
            // Buffer was full: the write just overwrote the oldest record,
            // so `start` must advance to match.
            self.start = next_end;
        } else {
            self.len += 1;
        }
        self.end = next_end;
    }
}

/// One-writer/many-reader ring, created lazily on the first sample.
pub struct StatisticsRing {
    inner: Mutex<Option<Inner>>,
}

impl StatisticsRing {
    pub fn new() -> Self {
        Self { inner: Mutex::new(None) }
    }

    /// Append a sample, allocating the backing storage on first use.
    pub fn add_sample(&self, record: Record) {
        let mut guard = self.inner.lock().expect("statistics ring mutex poisoned");
        guard.get_or_insert_with(Inner::new).add_sample(record);
    }

    /// Tear down the ring, discarding all buffered samples. Called when the
    /// sampling period is set to zero.
    pub fn destroy(&self) {
        *self.inner.lock().expect("statistics ring mutex poisoned") = None;
    }

    pub fn is_allocated(&self) -> bool {
        self.inner.lock().expect("statistics ring mutex poisoned").is_some()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("statistics ring mutex poisoned")
            .as_ref()
            .map(|i| i.len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The oldest record's cursor, or `None` if the ring hasn't been
    /// allocated yet or holds no samples.
    pub fn start(&self) -> Option<Cursor> {
        let guard = self.inner.lock().expect("statistics ring mutex poisoned");
        let inner = guard.as_ref()?;
        if inner.len == 0 {
            None
        } else {
            Some(Cursor(inner.start))
        }
    }

    /// Copy the record at `cursor` and advance to the next one. Returns
    /// `None` for the next cursor when `cursor` names the most recently
    /// written record (matching the source's `nodeIn == statisticsDataEnd`
    /// => `NULL` behavior, spec §9).
    pub fn read(&self, cursor: Cursor) -> Option<(Record, Option<Cursor>)> {
        let guard = self.inner.lock().expect("statistics ring mutex poisoned");
        let inner = guard.as_ref()?;
        if inner.len == 0 {
            return None;
        }
        let record = inner.records[cursor.0];
        let next = (cursor.0 + 1) % CAPACITY;
        let next_cursor = if next == inner.end { None } else { Some(Cursor(next)) };
        Some((record, next_cursor))
    }
}

impl Default for StatisticsRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64) -> Record {
        Record { timestamp_us: ts, ..Default::default() }
    }

    #[test]
    fn lazily_allocates_on_first_sample() {
        let ring = StatisticsRing::new();
        assert!(!ring.is_allocated());
        ring.add_sample(sample(1));
        assert!(ring.is_allocated());
    }

    #[test]
    fn destroy_clears_everything() {
        let ring = StatisticsRing::new();
        ring.add_sample(sample(1));
        ring.destroy();
        assert!(!ring.is_allocated());
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn wraps_after_capacity_and_keeps_len_bounded() {
        let ring = StatisticsRing::new();
        for i in 0..(CAPACITY + 10) {
            ring.add_sample(sample(i as u64));
        }
        assert_eq!(ring.len(), CAPACITY);
        let start = ring.start().unwrap();
        let (oldest, _) = ring.read(start).unwrap();
        // The first 10 samples should have been evicted.
        assert_eq!(oldest.timestamp_us, 10);
    }

    #[test]
    fn walking_from_start_reaches_none_at_newest_record() {
        let ring = StatisticsRing::new();
        ring.add_sample(sample(1));
        ring.add_sample(sample(2));
        ring.add_sample(sample(3));
        let mut cursor = ring.start();
        let mut seen = Vec::new();
        while let Some(c) = cursor {
            let (record, next) = ring.read(c).unwrap();
            seen.push(record.timestamp_us);
            cursor = next;
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
