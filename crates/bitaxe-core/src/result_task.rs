//! Result task (spec §4.4, C8): turns a returned [`TaskResult`] back into a
//! difficulty measurement, best-difficulty bookkeeping, block-solution
//! detection, and (rate-limited) host clock correction from share ntime.

use bitaxe_asic::chip::TaskResult;
use bitaxe_asic::job::ActiveJobs;
use bitaxe_bitcoin::header::{BlockHeader, Hash as HeaderHash, HashTrait};
use bitaxe_bitcoin::target::Target;
use bitaxe_bitcoin::hash::DisplayHash;
use bitaxe_config::{keys, ConfigStore};
use bitaxe_logging::{Category, Level, LogSink};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Gate clock-sync attempts to at most once per hour, matching the
/// original firmware's "don't fight NTP" posture.
const SYNC_INTERVAL: Duration = Duration::from_secs(3600);

/// Abstraction over the host's wall clock so tests don't need to touch
/// real system time.
pub trait SystemClock: Send + Sync {
    fn now_unix(&self) -> u64;
    fn set_unix(&self, seconds: u64);
}

/// A [`SystemClock`] that actually reads/writes the OS clock is out of
/// scope here (needs platform-specific privileges); this wraps a plain
/// atomic value so callers can swap in a real implementation at the
/// orchestration layer without changing this module's logic.
pub struct NullClock;

impl SystemClock for NullClock {
    fn now_unix(&self) -> u64 {
        0
    }
    fn set_unix(&self, _seconds: u64) {}
}

/// Rebuild the block header a result nonce was found against, given the
/// job it was a candidate for.
pub fn rebuild_header(job: &bitaxe_asic::job::BmJob, rolled_version: u32, ntime: u32, nonce: u32) -> BlockHeader {
    let previous_hash = DisplayHash(job.prev_hash_be).to_internal().0;
    BlockHeader {
        version: rolled_version,
        previous_hash,
        merkle_root: job.merkle_root,
        time: ntime,
        bits: job.nbits,
        nonce,
    }
}

/// Digest of a rebuilt header, in internal (hashing) byte order.
pub fn header_digest(header: &BlockHeader) -> [u8; 32] {
    let hash: HeaderHash = header.hash();
    hash.into_inner()
}

/// Share difficulty implied by a result's header digest.
pub fn compute_result_difficulty(digest: &[u8; 32]) -> f64 {
    Target::difficulty_of_hash(digest)
}

/// Whether a result's digest actually satisfies the network target encoded
/// by `nbits` (i.e. this is a full block solution, not just a pool share).
pub fn is_block_solution(digest: &[u8; 32], nbits: u32) -> bool {
    Target::from_le_bytes(digest) <= Target::from_compact(nbits)
}

fn persist_best_difficulty(config_store: &dyn ConfigStore, difficulty: f64) {
    let _ = config_store.set_u64(keys::BEST_DIFFICULTY, difficulty.to_bits());
}

fn load_best_difficulty(config_store: &dyn ConfigStore) -> f64 {
    config_store
        .get_u64(keys::BEST_DIFFICULTY)
        .map(f64::from_bits)
        .unwrap_or(0.0)
}

/// Gates how often a share's ntime is allowed to push the host clock
/// forward: at most once an hour, and only if the candidate time is newer
/// than what the clock already reports.
pub struct ClockSyncPolicy {
    last_sync: Mutex<Option<Instant>>,
}

impl ClockSyncPolicy {
    pub fn new() -> Self {
        Self { last_sync: Mutex::new(None) }
    }

    fn maybe_sync(&self, clock: &dyn SystemClock, candidate_unix: u64, now: Instant) {
        if (candidate_unix as u64) <= clock.now_unix() {
            return;
        }
        let mut guard = self.last_sync.lock().expect("clock sync mutex poisoned");
        if let Some(last) = *guard {
            if now.duration_since(last) < SYNC_INTERVAL {
                return;
            }
        }
        clock.set_unix(candidate_unix);
        *guard = Some(now);
    }
}

impl Default for ClockSyncPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of handling a single [`TaskResult`], for the orchestration
/// layer to act on (submit a share, ignore, log a found block).
#[derive(Debug, Clone, PartialEq)]
pub enum ResultOutcome {
    /// The result's job slot was no longer valid (stale or already
    /// overwritten); nothing to do.
    Discarded,
    /// Digest didn't clear the job's pool difficulty; not worth submitting.
    BelowPoolDifficulty { difficulty: f64 },
    /// A submittable share, possibly also a full block solution.
    ShareFound {
        difficulty: f64,
        block_solved: bool,
        origin: bitaxe_asic::job::JobOrigin,
        nonce: u32,
        ntime: u32,
        rolled_version: u32,
        extranonce_2: String,
    },
}

/// Drives result handling (spec §4.4 point 2): looks the job back up by id,
/// rebuilds the header the chip claims to have found a nonce for, scores
/// it, and tracks the best difficulty seen this session and overall.
pub struct ResultTask {
    best_session_difficulty: Mutex<f64>,
    clock_sync: ClockSyncPolicy,
}

impl ResultTask {
    pub fn new() -> Self {
        Self { best_session_difficulty: Mutex::new(0.0), clock_sync: ClockSyncPolicy::new() }
    }

    pub fn best_session_difficulty(&self) -> f64 {
        *self.best_session_difficulty.lock().expect("best difficulty mutex poisoned")
    }

    #[allow(clippy::too_many_arguments)]
    pub fn handle_result(
        &self,
        result: TaskResult,
        active_jobs: &ActiveJobs,
        config_store: &dyn ConfigStore,
        clock: &dyn SystemClock,
        now: Instant,
        log: &dyn LogSink,
    ) -> ResultOutcome {
        let job = match active_jobs.get_current(result.job_id) {
            Some(job) => job,
            None => {
                log.log_message(Category::Mining, Level::Debug, "result for unknown or stale job id");
                return ResultOutcome::Discarded;
            }
        };

        let header = rebuild_header(&job, result.rolled_version, job.ntime, result.nonce);
        let digest = header_digest(&header);
        let difficulty = compute_result_difficulty(&digest);
        let block_solved = is_block_solution(&digest, job.nbits);

        {
            let mut best = self.best_session_difficulty.lock().expect("best difficulty mutex poisoned");
            if difficulty > *best {
                *best = difficulty;
            }
        }
        if difficulty > load_best_difficulty(config_store) {
            persist_best_difficulty(config_store, difficulty);
        }

        if block_solved {
            log.log_message(Category::Mining, Level::Info, "block solution found");
        }

        if difficulty < job.pool_difficulty {
            return ResultOutcome::BelowPoolDifficulty { difficulty };
        }

        self.clock_sync.maybe_sync(clock, job.ntime as u64, now);

        ResultOutcome::ShareFound {
            difficulty,
            block_solved,
            origin: job.origin.clone(),
            nonce: result.nonce,
            ntime: job.ntime,
            rolled_version: result.rolled_version,
            extranonce_2: job.extranonce_2.clone(),
        }
    }
}

impl Default for ResultTask {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitaxe_asic::job::{BmJob, JobOrigin};
    use bitaxe_bitcoin::Midstate;
    use bitaxe_config::MemConfigStore;
    use bitaxe_logging::StdLogSink;
    use std::sync::Arc;

    struct FixedClock {
        value: std::sync::atomic::AtomicU64,
    }

    impl SystemClock for FixedClock {
        fn now_unix(&self) -> u64 {
            self.value.load(std::sync::atomic::Ordering::SeqCst)
        }
        fn set_unix(&self, seconds: u64) {
            self.value.store(seconds, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn sample_job(job_id: u8, nbits: u32, pool_difficulty: f64) -> BmJob {
        BmJob {
            job_id,
            midstates: vec![Midstate::from([0u8; 32])],
            merkle_root: [0u8; 32],
            merkle_root_tail: 0,
            prev_hash_be: [0u8; 32],
            version: 0x2000_0000,
            version_mask: 0,
            ntime: 1_700_000_000,
            nbits,
            pool_difficulty,
            extranonce_2: "00000001".to_string(),
            num_midstates: 1,
            origin: JobOrigin::V1 { job_id: "job1".to_string() },
        }
    }

    #[test]
    fn result_for_unknown_job_is_discarded() {
        let active_jobs = ActiveJobs::new();
        let task = ResultTask::new();
        let config_store = MemConfigStore::new();
        let clock = FixedClock { value: std::sync::atomic::AtomicU64::new(0) };
        let log = StdLogSink::default();
        let result = TaskResult { chip_address: 0, core_id: 0, rolled_version: 0x2000_0000, nonce: 1, job_id: 5 };
        let outcome = task.handle_result(result, &active_jobs, &config_store, &clock, Instant::now(), &log);
        assert_eq!(outcome, ResultOutcome::Discarded);
    }

    #[test]
    fn low_difficulty_result_is_reported_below_pool_difficulty() {
        let active_jobs = ActiveJobs::new();
        let job = sample_job(3, 0x1d00ffff, 1.0e12);
        active_jobs.insert(Arc::new(job));
        let task = ResultTask::new();
        let config_store = MemConfigStore::new();
        let clock = FixedClock { value: std::sync::atomic::AtomicU64::new(0) };
        let log = StdLogSink::default();
        let result = TaskResult { chip_address: 0, core_id: 0, rolled_version: 0x2000_0000, nonce: 0, job_id: 3 };
        let outcome = task.handle_result(result, &active_jobs, &config_store, &clock, Instant::now(), &log);
        match outcome {
            ResultOutcome::BelowPoolDifficulty { difficulty } => assert!(difficulty >= 0.0),
            other => panic!("expected BelowPoolDifficulty, got {other:?}"),
        }
    }

    #[test]
    fn share_clearing_pool_difficulty_is_reported_as_found() {
        let active_jobs = ActiveJobs::new();
        let job = sample_job(4, 0x1d00ffff, 0.0);
        active_jobs.insert(Arc::new(job));
        let task = ResultTask::new();
        let config_store = MemConfigStore::new();
        let clock = FixedClock { value: std::sync::atomic::AtomicU64::new(0) };
        let log = StdLogSink::default();
        let result = TaskResult { chip_address: 0, core_id: 0, rolled_version: 0x2000_0000, nonce: 42, job_id: 4 };
        let outcome = task.handle_result(result, &active_jobs, &config_store, &clock, Instant::now(), &log);
        assert!(matches!(outcome, ResultOutcome::ShareFound { .. }));
    }

    #[test]
    fn clock_sync_only_advances_forward_and_only_once_per_interval() {
        let policy = ClockSyncPolicy::new();
        let clock = FixedClock { value: std::sync::atomic::AtomicU64::new(1_000) };
        let now = Instant::now();
        policy.maybe_sync(&clock, 2_000, now);
        assert_eq!(clock.now_unix(), 2_000);
        policy.maybe_sync(&clock, 3_000, now);
        assert_eq!(clock.now_unix(), 2_000, "second sync within the interval should be suppressed");
        policy.maybe_sync(&clock, 500, now);
        assert_eq!(clock.now_unix(), 2_000, "sync must never move the clock backward");
    }
}
