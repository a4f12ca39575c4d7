//! Work handed to the ASIC (`BmJob`, spec §3) and the `ActiveJobs` table
//! that correlates returned nonces back to the job that produced them.
//!
//! The source represents `ActiveJobs` as a raw-pointer array plus a
//! parallel `valid_jobs` bitmap (spec §9 Design Notes). This port instead
//! gives every slot a generation counter: each `send_work` bumps the slot's
//! generation, so a stale `(job_id, generation)` pair returning from the
//! ASIC is rejected in O(1) without a separate bitmap, while `is_valid`
//! still gives call sites that only want the old boolean check exactly that.

use bitaxe_bitcoin::Midstate;
use std::sync::{Arc, Mutex};

/// Fixed slot count: the ASIC only ever returns a 7-bit job id.
pub const ACTIVE_JOBS_CAPACITY: usize = 128;

/// Monotonic per-slot generation counter.
pub type Generation = u32;

/// Identifies the pool-assigned job a `BmJob` was built from, carrying
/// exactly what the result task needs to shape a share submission back to
/// that pool: V1 pools key jobs by an opaque string id, V2 pools by a
/// numeric (channel_id, job_id) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOrigin {
    V1 { job_id: String },
    V2 { channel_id: u32, job_id: u32 },
}

/// Work as sent to the ASIC, precomputed from either a V1 `MiningJob` or a
/// V2 `Sv2Job`.
#[derive(Debug, Clone)]
pub struct BmJob {
    pub job_id: u8,
    /// One midstate normally; up to four when version rolling is active.
    pub midstates: Vec<Midstate>,
    /// Full merkle root, internal byte order, kept alongside the tail below
    /// so the result task can rebuild the 80-byte header for difficulty
    /// verification without re-deriving it from the pool notification.
    pub merkle_root: [u8; 32],
    /// Last 4 bytes of the merkle root, byte-reversed (little-endian as the
    /// ASIC expects it).
    pub merkle_root_tail: u32,
    /// Previous block hash, byte-reversed for the ASIC wire format.
    pub prev_hash_be: [u8; 32],
    pub version: u32,
    pub version_mask: u32,
    pub ntime: u32,
    pub nbits: u32,
    pub pool_difficulty: f64,
    /// Empty for V2 jobs (the coinbase, and therefore extranonce_2, is
    /// fixed per job under V2).
    pub extranonce_2: String,
    pub num_midstates: u8,
    pub origin: JobOrigin,
}

impl BmJob {
    pub fn slot(&self) -> usize {
        (self.job_id & 0x7f) as usize
    }
}

struct Slot {
    job: Option<Arc<BmJob>>,
    generation: Generation,
}

impl Slot {
    fn empty() -> Self {
        Self { job: None, generation: 0 }
    }
}

/// Fixed 128-entry table of in-flight jobs, indexed by the low 7 bits of
/// the ASIC-returned job id. Shared between the job builder (writer) and
/// the result task (reader) under a single mutex (spec §5 locking rules).
pub struct ActiveJobs {
    slots: Mutex<Vec<Slot>>,
}

impl ActiveJobs {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(ACTIVE_JOBS_CAPACITY);
        slots.resize_with(ACTIVE_JOBS_CAPACITY, Slot::empty);
        Self { slots: Mutex::new(slots) }
    }

    /// Store `job` in its slot, bumping that slot's generation. Returns the
    /// new generation, to be paired with `job_id` when tagging ASIC-bound
    /// frames if the wire format carries one.
    pub fn insert(&self, job: Arc<BmJob>) -> Generation {
        let mut slots = self.slots.lock().expect("active jobs mutex poisoned");
        let slot = &mut slots[job.slot()];
        slot.generation = slot.generation.wrapping_add(1);
        slot.job = Some(job);
        slot.generation
    }

    /// Look up the job most recently inserted for `job_id`, if the slot is
    /// still valid (holds a job at all). Used by call sites that only
    /// care about the classic boolean "is this job id live" check.
    pub fn is_valid(&self, job_id: u8) -> bool {
        let slots = self.slots.lock().expect("active jobs mutex poisoned");
        slots[(job_id & 0x7f) as usize].job.is_some()
    }

    /// Look up a job by id, requiring the caller's remembered generation to
    /// still match -- rejecting a result frame that raced a newer
    /// `send_work` into the same slot.
    pub fn get(&self, job_id: u8, generation: Generation) -> Option<Arc<BmJob>> {
        let slots = self.slots.lock().expect("active jobs mutex poisoned");
        let slot = &slots[(job_id & 0x7f) as usize];
        if slot.generation == generation {
            slot.job.clone()
        } else {
            None
        }
    }

    /// Look up a job by id regardless of generation (used by the result
    /// task, which only has the job id from the ASIC and no generation of
    /// its own to compare against -- see [`ActiveJobs::get_current`]).
    pub fn get_current(&self, job_id: u8) -> Option<Arc<BmJob>> {
        let slots = self.slots.lock().expect("active jobs mutex poisoned");
        slots[(job_id & 0x7f) as usize].job.clone()
    }

    /// Clear every slot, as required on a `clean_jobs` notification before
    /// any new job may be inserted (spec §5 "Clean-jobs").
    pub fn clear_all(&self) {
        let mut slots = self.slots.lock().expect("active jobs mutex poisoned");
        for slot in slots.iter_mut() {
            slot.job = None;
            slot.generation = slot.generation.wrapping_add(1);
        }
    }
}

impl Default for ActiveJobs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(job_id: u8) -> Arc<BmJob> {
        Arc::new(BmJob {
            job_id,
            midstates: vec![Midstate::from([0u8; 32])],
            merkle_root: [0u8; 32],
            merkle_root_tail: 0,
            prev_hash_be: [0u8; 32],
            version: 0,
            version_mask: 0,
            ntime: 0,
            nbits: 0,
            pool_difficulty: 1.0,
            extranonce_2: String::new(),
            num_midstates: 1,
            origin: JobOrigin::V1 { job_id: "0".to_string() },
        })
    }

    #[test]
    fn fresh_table_has_no_valid_jobs() {
        let jobs = ActiveJobs::new();
        assert!(!jobs.is_valid(3));
    }

    #[test]
    fn insert_then_lookup_by_generation() {
        let jobs = ActiveJobs::new();
        let gen = jobs.insert(job(5));
        assert!(jobs.is_valid(5));
        assert!(jobs.get(5, gen).is_some());
    }

    #[test]
    fn stale_generation_is_rejected_even_though_slot_is_valid() {
        let jobs = ActiveJobs::new();
        let old_gen = jobs.insert(job(5));
        let _new_gen = jobs.insert(job(5 | 0x80)); // same low 7 bits, same slot
        assert!(jobs.is_valid(5)); // slot still holds a job
        assert!(jobs.get(5, old_gen).is_none()); // but the old generation is stale
    }

    #[test]
    fn clear_all_invalidates_every_slot() {
        let jobs = ActiveJobs::new();
        jobs.insert(job(1));
        jobs.insert(job(2));
        jobs.clear_all();
        assert!(!jobs.is_valid(1));
        assert!(!jobs.is_valid(2));
    }

    #[test]
    fn job_id_wraps_into_same_slot_space() {
        let j = job(0x7f);
        assert_eq!(j.slot(), 127);
        let j2 = job(0xff);
        assert_eq!(j2.slot(), 127);
    }
}
