//! Job builder task (spec §4.4, C7): turns the next queued Stratum
//! notification into one ASIC-ready [`BmJob`], precomputing BIP320 midstates
//! when version rolling is in effect.

use bitaxe_asic::{BmJob, ChipFamily};
use bitaxe_asic::job::JobOrigin;
use bitaxe_bitcoin::header::BlockHeader;
use bitaxe_bitcoin::{roll_versions, Midstate};
use bitaxe_stratum::queue::WorkQueue;
use bitaxe_stratum::types::StratumEvent;
use bitaxe_stratum::v1::{ExtranonceState, MiningNotify};
use bitaxe_stratum::v2::JobAnnouncement;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobBuilderError {
    #[error("malformed hex field in mining.notify: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("no notification received yet")]
    NoNotification,
}

/// Assemble the coinbase, fold the merkle branch, and precompute one
/// midstate per rolled version for a V1 job (spec §4.4 "V1 work
/// generation").
pub fn build_v1_job(
    notify: &MiningNotify,
    extranonce1_hex: &str,
    extranonce2_hex: &str,
    version_mask: u32,
    num_midstates: u8,
    pool_difficulty: f64,
) -> Result<BmJob, JobBuilderError> {
    let coinbase_prefix = hex::decode(&notify.coinbase1_hex)?;
    let coinbase_suffix = hex::decode(&notify.coinbase2_hex)?;
    let extranonce1 = hex::decode(extranonce1_hex)?;
    let extranonce2 = hex::decode(extranonce2_hex)?;
    let mut extranonce = extranonce1;
    extranonce.extend_from_slice(&extranonce2);

    let coinbase_hash = bitaxe_bitcoin::merkle::coinbase_hash(&coinbase_prefix, &extranonce, &coinbase_suffix);

    let mut branch = Vec::with_capacity(notify.merkle_branch_hex.len());
    for step_hex in &notify.merkle_branch_hex {
        let step_bytes = hex::decode(step_hex)?;
        let mut step = [0u8; 32];
        step.copy_from_slice(&step_bytes);
        branch.push(step);
    }
    let merkle_root = bitaxe_bitcoin::merkle::fold_merkle_branch(coinbase_hash, &branch);

    let prev_hash_display = bitaxe_bitcoin::hash::DisplayHash::from_hex(&notify.prev_hash_hex)?;
    let prev_hash_be = prev_hash_display.0;
    let prev_hash_internal = prev_hash_display.to_internal().0;

    let base_version = u32::from_str_radix(&notify.version_hex, 16).unwrap_or(0);
    let nbits = u32::from_str_radix(&notify.nbits_hex, 16).unwrap_or(0);
    let ntime = u32::from_str_radix(&notify.ntime_hex, 16).unwrap_or(0);

    let midstates = precompute_midstates(base_version, version_mask, num_midstates, prev_hash_internal, merkle_root);
    let merkle_root_tail = u32::from_le_bytes(merkle_root[28..32].try_into().expect("4-byte slice"));

    Ok(BmJob {
        job_id: 0,
        midstates,
        merkle_root,
        merkle_root_tail,
        prev_hash_be,
        version: base_version,
        version_mask,
        ntime,
        nbits,
        pool_difficulty,
        extranonce_2: extranonce2_hex.to_string(),
        num_midstates,
        origin: JobOrigin::V1 { job_id: notify.job_id.clone() },
    })
}

/// Build a V2 job from a fully-materialized [`JobAnnouncement`], reusing
/// midstates the caller already computed for this announcement (SV2 fixes
/// the coinbase/merkle root per job, so rolling `ntime` doesn't invalidate
/// them).
pub fn build_v2_job(
    announcement: &JobAnnouncement,
    version_mask: u32,
    num_midstates: u8,
    pool_difficulty: f64,
    ntime_offset: u32,
    midstates: Vec<Midstate>,
) -> BmJob {
    let merkle_root_tail = u32::from_le_bytes(announcement.merkle_root[28..32].try_into().expect("4-byte slice"));
    let prev_hash_be = bitaxe_bitcoin::hash::InternalHash(announcement.prev_hash).to_display().0;

    BmJob {
        job_id: 0,
        midstates,
        merkle_root: announcement.merkle_root,
        merkle_root_tail,
        prev_hash_be,
        version: announcement.version,
        version_mask,
        ntime: announcement.min_ntime.wrapping_add(ntime_offset),
        nbits: announcement.nbits,
        pool_difficulty,
        extranonce_2: String::new(),
        num_midstates,
        origin: JobOrigin::V2 { channel_id: announcement.channel_id, job_id: announcement.job_id },
    }
}

/// Precompute one midstate per BIP320-rolled version (or a single midstate
/// if version rolling isn't in effect for this job). `time`/`bits`/`nonce`
/// don't matter here: the midstate only covers the header's first 64 bytes
/// (version + previous_hash + 28 bytes of merkle root).
pub fn precompute_midstates(
    base_version: u32,
    version_mask: u32,
    num_midstates: u8,
    prev_hash_internal: [u8; 32],
    merkle_root_internal: [u8; 32],
) -> Vec<Midstate> {
    if num_midstates <= 1 {
        let header = BlockHeader { version: base_version, previous_hash: prev_hash_internal, merkle_root: merkle_root_internal, time: 0, bits: 0, nonce: 0 };
        return vec![header.midstate()];
    }
    roll_versions(base_version, version_mask, num_midstates as usize)
        .into_iter()
        .map(|version| {
            let header = BlockHeader { version, previous_hash: prev_hash_internal, merkle_root: merkle_root_internal, time: 0, bits: 0, nonce: 0 };
            header.midstate()
        })
        .collect()
}

/// Held state for whichever notification the builder last received, either
/// protocol. `None` until the first event is dequeued.
enum CurrentNotification {
    None,
    V1 { notify: MiningNotify, extranonce1_hex: String },
    V2 { announcement: JobAnnouncement, midstates: Vec<Midstate> },
}

/// Drives the job-builder loop (spec §4.4 point 1): dequeue the next
/// notification (or re-attempt the held one on timeout), build exactly one
/// [`BmJob`] per call, and hand it to the caller to send to the ASIC.
pub struct JobBuilderTask {
    chip_family: ChipFamily,
    version_rolling_enabled: bool,
    current: Mutex<CurrentNotification>,
    attempt: AtomicU32,
}

impl JobBuilderTask {
    pub fn new(chip_family: ChipFamily, version_rolling_enabled: bool) -> Self {
        Self {
            chip_family,
            version_rolling_enabled,
            current: Mutex::new(CurrentNotification::None),
            attempt: AtomicU32::new(0),
        }
    }

    /// Midstate count for this task's current configuration: 4 when both
    /// the pool negotiated version rolling and the chip family supports it
    /// in hardware, else 1 (spec §4.4 "num_midstates").
    pub fn num_midstates(&self) -> u8 {
        if self.version_rolling_enabled && self.chip_family.supports_version_rolling() {
            4
        } else {
            1
        }
    }

    /// Wait up to this family's job-service interval for a fresh
    /// notification; on timeout, rebuild another attempt from whatever
    /// notification is already held (a new `extranonce_2` for V1, a rolled
    /// `ntime` for V2).
    pub async fn tick(
        &self,
        queue: &WorkQueue<StratumEvent>,
        extranonce: &ExtranonceState,
        version_mask: u32,
        pool_difficulty: f64,
        active_jobs: &bitaxe_asic::ActiveJobs,
    ) -> Result<Option<BmJob>, JobBuilderError> {
        if let Some(event) = queue.dequeue_timeout(self.chip_family.job_service_interval()).await {
            match event {
                StratumEvent::V1Notify(notify) => {
                    if notify.clean_jobs {
                        // Drain the jobs the ASIC is still holding from the previous
                        // template before the new one is accepted, so a late result
                        // for the old work can't land on a slot the new job also uses.
                        active_jobs.clear_all();
                        self.attempt.store(0, Ordering::SeqCst);
                    }
                    let extranonce1_hex = extranonce.extranonce1_hex();
                    *self.current.lock().expect("job builder state mutex poisoned") =
                        CurrentNotification::V1 { notify, extranonce1_hex };
                }
                StratumEvent::V2Job(announcement) => {
                    let num_midstates = self.num_midstates();
                    let prev_hash_internal = announcement.prev_hash;
                    let midstates = precompute_midstates(announcement.version, version_mask, num_midstates, prev_hash_internal, announcement.merkle_root);
                    self.attempt.store(0, Ordering::SeqCst);
                    *self.current.lock().expect("job builder state mutex poisoned") =
                        CurrentNotification::V2 { announcement, midstates };
                }
            }
        }

        let num_midstates = self.num_midstates();
        let guard = self.current.lock().expect("job builder state mutex poisoned");
        match &*guard {
            CurrentNotification::None => Ok(None),
            CurrentNotification::V1 { notify, extranonce1_hex } => {
                let extranonce2_hex = extranonce.next_extranonce2_hex();
                let job = build_v1_job(notify, extranonce1_hex, &extranonce2_hex, version_mask, num_midstates, pool_difficulty)?;
                Ok(Some(job))
            }
            CurrentNotification::V2 { announcement, midstates } => {
                let ntime_offset = self.attempt.fetch_add(1, Ordering::SeqCst);
                let job = build_v2_job(announcement, version_mask, num_midstates, pool_difficulty, ntime_offset, midstates.clone());
                Ok(Some(job))
            }
        }
    }
}

/// Artificial floor so a misconfigured chip family can't starve the builder
/// loop with a zero-length wait.
pub const MIN_SERVICE_INTERVAL: Duration = Duration::from_millis(1);

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_notify() -> MiningNotify {
        MiningNotify {
            job_id: "job1".to_string(),
            prev_hash_hex: "00".repeat(32),
            coinbase1_hex: "01020304".to_string(),
            coinbase2_hex: "05060708".to_string(),
            merkle_branch_hex: vec![],
            version_hex: "20000000".to_string(),
            nbits_hex: "1d00ffff".to_string(),
            ntime_hex: "5f000000".to_string(),
            clean_jobs: false,
            block_height: None,
            miner_tag: None,
        }
    }

    #[test]
    fn build_v1_job_parses_hex_fields() {
        let notify = sample_notify();
        let job = build_v1_job(&notify, "aabbccdd", "00000001", 0x1fff_e000, 1, 1.0).unwrap();
        assert_eq!(job.version, 0x2000_0000);
        assert_eq!(job.nbits, 0x1d00_ffff);
        assert_eq!(job.ntime, 0x5f00_0000);
        assert_eq!(job.midstates.len(), 1);
        assert!(matches!(job.origin, JobOrigin::V1 { .. }));
    }

    #[test]
    fn build_v1_job_with_no_merkle_branch_hashes_just_the_coinbase() {
        let notify = sample_notify();
        let job = build_v1_job(&notify, "aabbccdd", "00000001", 0, 1, 1.0).unwrap();
        let coinbase_prefix = hex::decode(&notify.coinbase1_hex).unwrap();
        let coinbase_suffix = hex::decode(&notify.coinbase2_hex).unwrap();
        let mut extranonce = hex::decode("aabbccdd").unwrap();
        extranonce.extend_from_slice(&hex::decode("00000001").unwrap());
        let expected = bitaxe_bitcoin::merkle::coinbase_hash(&coinbase_prefix, &extranonce, &coinbase_suffix);
        assert_eq!(job.merkle_root, expected);
    }

    #[test]
    fn precompute_midstates_rolls_exactly_requested_count() {
        let midstates = precompute_midstates(0x2000_0000, 0x1fff_e000, 4, [0u8; 32], [0u8; 32]);
        assert_eq!(midstates.len(), 4);
    }

    #[test]
    fn precompute_midstates_single_when_not_rolling() {
        let midstates = precompute_midstates(0x2000_0000, 0, 1, [0u8; 32], [0u8; 32]);
        assert_eq!(midstates.len(), 1);
    }

    #[test]
    fn build_v2_job_reuses_supplied_midstates_and_rolls_ntime() {
        let announcement = JobAnnouncement {
            channel_id: 1,
            job_id: 7,
            version: 0x2000_0000,
            merkle_root: [0xabu8; 32],
            prev_hash: [0x11u8; 32],
            min_ntime: 100,
            nbits: 0x1d00ffff,
        };
        let midstates = vec![Midstate::from([0u8; 32])];
        let job = build_v2_job(&announcement, 0, 1, 1.0, 5, midstates.clone());
        assert_eq!(job.ntime, 105);
        assert_eq!(job.midstates.len(), 1);
        assert!(matches!(job.origin, JobOrigin::V2 { channel_id: 1, job_id: 7 }));
    }

    #[tokio::test]
    async fn tick_returns_none_before_any_notification_arrives() {
        let queue: WorkQueue<StratumEvent> = WorkQueue::new();
        let task = JobBuilderTask::new(ChipFamily::Bm1370, true);
        let extranonce = ExtranonceState::new("aabbccdd".to_string(), 4);
        let active_jobs = bitaxe_asic::ActiveJobs::new();
        let job = task.tick(&queue, &extranonce, 0x1fff_e000, 1.0, &active_jobs).await.unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn tick_builds_a_job_once_a_notify_is_queued() {
        let queue: WorkQueue<StratumEvent> = WorkQueue::new();
        let task = JobBuilderTask::new(ChipFamily::Bm1370, true);
        let extranonce = ExtranonceState::new("aabbccdd".to_string(), 4);
        let active_jobs = bitaxe_asic::ActiveJobs::new();
        queue.enqueue(StratumEvent::V1Notify(sample_notify())).await;
        let job = task.tick(&queue, &extranonce, 0x1fff_e000, 1.0, &active_jobs).await.unwrap();
        assert!(job.is_some());
    }

    #[tokio::test]
    async fn clean_jobs_notify_clears_active_jobs_table() {
        let queue: WorkQueue<StratumEvent> = WorkQueue::new();
        let task = JobBuilderTask::new(ChipFamily::Bm1370, true);
        let extranonce = ExtranonceState::new("aabbccdd".to_string(), 4);
        let active_jobs = bitaxe_asic::ActiveJobs::new();
        active_jobs.insert(std::sync::Arc::new(sample_job_for_slot(3)));
        assert!(active_jobs.is_valid(3));

        let mut clean = sample_notify();
        clean.clean_jobs = true;
        queue.enqueue(StratumEvent::V1Notify(clean)).await;
        task.tick(&queue, &extranonce, 0x1fff_e000, 1.0, &active_jobs).await.unwrap();

        assert!(!active_jobs.is_valid(3));
    }

    fn sample_job_for_slot(job_id: u8) -> BmJob {
        BmJob {
            job_id,
            midstates: vec![],
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
            origin: JobOrigin::V1 { job_id: "x".to_string() },
        }
    }
}
