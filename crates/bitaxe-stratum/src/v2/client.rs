//! Stratum V2 client (spec §4.7): Noise_NX-encrypted TCP session, per-channel
//! job state machine with an 8-slot pending-future ring, and fallback to V1
//! after three consecutive connection failures.

use super::authority::decode_authority_pubkey;
use super::framing::{encode_frame_header, parse_frame_header, FrameHeader, FramingError, HEADER_SIZE};
use super::messages::{
    self, msg_type, NewMiningJob, OpenStandardMiningChannel, OpenStandardMiningChannelSuccess, SetNewPrevHash, SetTarget,
    SetupConnection, SetupConnectionSuccess, SubmitSharesError, SubmitSharesStandard, SubmitSharesSuccess,
};
use super::noise::{Initiator, NoiseError, TransportKeys};
use crate::queue::WorkQueue;
use crate::types::{ProtocolFlag, StratumEvent, StratumProtocol};
use bitaxe_bitcoin::target::Target;
use bitaxe_config::PoolDescriptor;
use bitaxe_logging::{Category, Level, LogSink};
use bitaxe_stats::ShareStats;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use secp256k1::PublicKey;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const V2_FAILOVER_THRESHOLD: u32 = 3;
const PENDING_RING_SIZE: usize = 8;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum V2Error {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("noise handshake failed: {0}")]
    Noise(#[from] NoiseError),
    #[error("frame error: {0}")]
    Framing(#[from] FramingError),
    #[error("message decode error: {0}")]
    Message(#[from] messages::MessageError),
    #[error("setup connection rejected by server")]
    SetupRejected,
    #[error("channel open rejected by server")]
    ChannelOpenRejected,
}

/// A fully materialized mining job: the merge of a `NewMiningJob` with the
/// `SetNewPrevHash` that completes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobAnnouncement {
    pub channel_id: u32,
    pub job_id: u32,
    pub version: u32,
    pub merkle_root: [u8; 32],
    pub prev_hash: [u8; 32],
    pub min_ntime: u32,
    pub nbits: u32,
}

/// Tracks in-flight `NewMiningJob`s awaiting a matching `SetNewPrevHash`, in
/// an 8-slot ring indexed by `job_id & 7` (spec §4.7 "pending future jobs").
/// A collision simply overwrites the older job: once a newer job claims a
/// slot the older one can no longer become mineable.
pub struct JobTracker {
    pending: Mutex<[Option<NewMiningJob>; PENDING_RING_SIZE]>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self { pending: Mutex::new(std::array::from_fn(|_| None)) }
    }

    fn slot(job_id: u32) -> usize {
        (job_id as usize) & (PENDING_RING_SIZE - 1)
    }

    /// Returns `Some` immediately if the job already carries `min_ntime`
    /// (an immediate job); otherwise stashes it in the ring and returns
    /// `None` until the matching `SetNewPrevHash` arrives.
    pub fn on_new_job(&self, job: NewMiningJob, fallback_prev_hash: [u8; 32], fallback_nbits: u32) -> Option<JobAnnouncement> {
        if let Some(min_ntime) = job.min_ntime {
            return Some(JobAnnouncement {
                channel_id: job.channel_id,
                job_id: job.job_id,
                version: job.version,
                merkle_root: job.merkle_root,
                prev_hash: fallback_prev_hash,
                min_ntime,
                nbits: fallback_nbits,
            });
        }
        let mut pending = self.pending.lock().expect("job tracker mutex poisoned");
        pending[Self::slot(job.job_id)] = Some(job);
        None
    }

    /// Completes a pending future job when its `SetNewPrevHash` arrives.
    /// Returns `None` if the slot holds a different (newer) job id — the
    /// original job was displaced and is no longer mineable.
    pub fn on_set_new_prev_hash(&self, msg: SetNewPrevHash) -> Option<JobAnnouncement> {
        let mut pending = self.pending.lock().expect("job tracker mutex poisoned");
        let slot = &mut pending[Self::slot(msg.job_id)];
        match slot {
            Some(job) if job.job_id == msg.job_id => {
                let announcement = JobAnnouncement {
                    channel_id: job.channel_id,
                    job_id: job.job_id,
                    version: job.version,
                    merkle_root: job.merkle_root,
                    prev_hash: msg.prev_hash,
                    min_ntime: msg.min_ntime,
                    nbits: msg.nbits,
                };
                *slot = None;
                Some(announcement)
            }
            _ => None,
        }
    }
}

/// Counts consecutive V2 session failures and flips the process-wide
/// protocol flag to V1 once the threshold is reached (spec §4.7 "fall back
/// to Stratum V1 after three consecutive connection failures").
pub struct V2FailoverTracker {
    consecutive_failures: AtomicU32,
}

impl V2FailoverTracker {
    pub fn new() -> Self {
        Self { consecutive_failures: AtomicU32::new(0) }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Returns `true` if this failure tripped the fallback to V1.
    pub fn record_failure(&self, protocol_flag: &ProtocolFlag) -> bool {
        let count = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= V2_FAILOVER_THRESHOLD {
            protocol_flag.set(StratumProtocol::V1);
            self.consecutive_failures.store(0, Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

pub struct StratumV2Client {
    pub pool: PoolDescriptor,
    pub authority_pubkey_base58: Option<String>,
    pub jobs: JobTracker,
    pub failover: V2FailoverTracker,
    pub share_sequence: AtomicU32,
    pub share_stats: ShareStats,
    /// Current pool difficulty, as last set by `SetTarget` (spec §4.7),
    /// stored as `f64::to_bits` so it can be read/written without a mutex.
    target_difficulty_bits: AtomicU64,
}

impl StratumV2Client {
    pub fn new(pool: PoolDescriptor, authority_pubkey_base58: Option<String>) -> Self {
        Self {
            pool,
            authority_pubkey_base58,
            jobs: JobTracker::new(),
            failover: V2FailoverTracker::new(),
            share_sequence: AtomicU32::new(0),
            share_stats: ShareStats::new(),
            target_difficulty_bits: AtomicU64::new(Target::difficulty_1().difficulty().to_bits()),
        }
    }

    /// Pool difficulty last negotiated via `SetTarget`, `difficulty_1`
    /// (pdiff 1) until the pool sends one.
    pub fn target_difficulty(&self) -> f64 {
        f64::from_bits(self.target_difficulty_bits.load(Ordering::Relaxed))
    }

    fn authority_pubkey(&self) -> Result<Option<PublicKey>, V2Error> {
        match &self.authority_pubkey_base58 {
            None => Ok(None),
            Some(encoded) => {
                let xonly_bytes = decode_authority_pubkey(encoded).map_err(|_| V2Error::SetupRejected)?;
                let mut uncompressed_hint = [0u8; 33];
                uncompressed_hint[0] = 0x02;
                uncompressed_hint[1..].copy_from_slice(&xonly_bytes);
                PublicKey::from_slice(&uncompressed_hint).map(Some).map_err(|_| V2Error::SetupRejected)
            }
        }
    }

    /// Runs one V2 session: TCP connect, Noise handshake, SetupConnection,
    /// OpenStandardMiningChannel, then a read loop dispatching job/prevhash
    /// messages onto `queue` until the socket closes or errors.
    pub async fn run_session(
        &self,
        queue: &WorkQueue<StratumEvent>,
        log: &dyn LogSink,
        ephemeral_secret_bytes: [u8; 32],
        device_id: &str,
    ) -> Result<(), V2Error> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((self.pool.host.as_str(), self.pool.port)))
            .await
            .map_err(|_| V2Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))??;
        let (mut read_half, mut write_half) = stream.into_split();

        let (initiator, act1_bytes) = Initiator::start(ephemeral_secret_bytes)?;
        write_half.write_all(&act1_bytes).await?;

        let mut act2 = [0u8; super::noise::ACT2_LEN];
        read_half.read_exact(&mut act2).await?;
        let authority_pubkey = self.authority_pubkey()?;
        let (keys, _certificate) = initiator.process_act2(&act2, authority_pubkey.as_ref())?;

        let mut session = EncryptedSession::new(keys, write_half, read_half);

        let setup = SetupConnection {
            protocol: messages::MINING_PROTOCOL,
            min_version: messages::MIN_VERSION,
            max_version: messages::MAX_VERSION,
            flags: messages::FLAG_REQUIRES_STANDARD_JOBS,
            endpoint_host: self.pool.host.clone(),
            endpoint_port: self.pool.port,
            vendor: "bitaxe".to_string(),
            hardware_version: "1.0".to_string(),
            firmware: env!("CARGO_PKG_VERSION").to_string(),
            device_id: device_id.to_string(),
        };
        session.send(msg_type::SETUP_CONNECTION, &setup.encode()).await?;
        let (setup_type, setup_payload) = session.recv().await?;
        if setup_type != msg_type::SETUP_CONNECTION_SUCCESS {
            return Err(V2Error::SetupRejected);
        }
        let _success = SetupConnectionSuccess::decode(&setup_payload)?;

        let open = OpenStandardMiningChannel {
            request_id: 0,
            user_identity: self.pool.user.clone(),
            nominal_hashrate: 0,
            max_target: OpenStandardMiningChannel::max_target_unbounded(),
        };
        session.send(msg_type::OPEN_STANDARD_MINING_CHANNEL, &open.encode()).await?;
        let (open_type, open_payload) = session.recv().await?;
        if open_type != msg_type::OPEN_STANDARD_MINING_CHANNEL_SUCCESS {
            return Err(V2Error::ChannelOpenRejected);
        }
        let opened = OpenStandardMiningChannelSuccess::decode(&open_payload)?;
        log.log_message(Category::Network, Level::Info, &format!("sv2 channel {} opened", opened.channel_id));

        let mut latest_prev_hash = [0u8; 32];
        let mut latest_nbits = 0u32;
        loop {
            let (msg_type, payload) = session.recv().await?;
            match msg_type {
                msg_type::NEW_MINING_JOB => {
                    let job = NewMiningJob::decode(&payload)?;
                    if let Some(announcement) = self.jobs.on_new_job(job, latest_prev_hash, latest_nbits) {
                        queue.enqueue(StratumEvent::V2Job(announcement)).await;
                    }
                }
                msg_type::SET_NEW_PREV_HASH => {
                    let set_hash = SetNewPrevHash::decode(&payload)?;
                    latest_prev_hash = set_hash.prev_hash;
                    latest_nbits = set_hash.nbits;
                    if let Some(announcement) = self.jobs.on_set_new_prev_hash(set_hash) {
                        queue.enqueue(StratumEvent::V2Job(announcement)).await;
                    }
                }
                msg_type::SET_TARGET => {
                    let set_target = SetTarget::decode(&payload)?;
                    let difficulty = self.apply_set_target(set_target);
                    log.log_message(
                        Category::Network,
                        Level::Info,
                        &format!("sv2 channel {} target updated, pdiff {difficulty:.2}", set_target.channel_id),
                    );
                }
                msg_type::SUBMIT_SHARES_SUCCESS => {
                    let success = SubmitSharesSuccess::decode(&payload)?;
                    self.apply_submit_shares_success(&success);
                }
                msg_type::SUBMIT_SHARES_ERROR => {
                    let error = SubmitSharesError::decode(&payload)?;
                    self.apply_submit_shares_error(&error);
                }
                _ => {}
            }
        }
    }

    /// Records a `SetTarget` update and returns the new pdiff.
    fn apply_set_target(&self, set_target: SetTarget) -> f64 {
        let difficulty = Target::from_le_bytes(&set_target.max_target).difficulty();
        self.target_difficulty_bits.store(difficulty.to_bits(), Ordering::Relaxed);
        difficulty
    }

    fn apply_submit_shares_success(&self, success: &SubmitSharesSuccess) {
        self.share_stats.record_accepted(success.new_submits_accepted_count as u64);
    }

    fn apply_submit_shares_error(&self, error: &SubmitSharesError) {
        self.share_stats.record_rejected(&error.error_code);
    }

    pub fn build_submit_shares(&self, channel_id: u32, job_id: u32, nonce: u32, ntime: u32, version: u32) -> SubmitSharesStandard {
        SubmitSharesStandard {
            channel_id,
            sequence_number: self.share_sequence.fetch_add(1, Ordering::SeqCst),
            job_id,
            nonce,
            ntime,
            version,
        }
    }
}

fn transport_nonce(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..12].copy_from_slice(&counter.to_le_bytes());
    Nonce::clone_from_slice(&bytes)
}

/// A connected Noise transport: encrypts/decrypts SV2 frames with
/// monotonically increasing nonce counters per direction, one cipher keyed
/// off each of the two keys the handshake derived.
struct EncryptedSession {
    keys: TransportKeys,
    send_counter: u64,
    receive_counter: u64,
    write_half: tokio::net::tcp::OwnedWriteHalf,
    read_half: tokio::net::tcp::OwnedReadHalf,
}

impl EncryptedSession {
    fn new(keys: TransportKeys, write_half: tokio::net::tcp::OwnedWriteHalf, read_half: tokio::net::tcp::OwnedReadHalf) -> Self {
        Self { keys, send_counter: 0, receive_counter: 0, write_half, read_half }
    }

    /// Header and payload are sealed as two separate AEAD calls with fresh
    /// nonces, mirroring the order the responder expects them in: 22 bytes
    /// of encrypted header first, then `msg_length + 16` bytes of encrypted
    /// payload.
    async fn send(&mut self, msg_type: u8, payload: &[u8]) -> Result<(), V2Error> {
        let header = encode_frame_header(FrameHeader { extension_type: 0, msg_type, msg_length: payload.len() as u32 })?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.keys.send_key));
        let header_ciphertext = cipher
            .encrypt(&transport_nonce(self.send_counter), Payload { msg: &header, aad: &[] })
            .expect("chacha20poly1305 encryption does not fail");
        self.send_counter += 1;
        let payload_ciphertext = cipher
            .encrypt(&transport_nonce(self.send_counter), Payload { msg: payload, aad: &[] })
            .expect("chacha20poly1305 encryption does not fail");
        self.send_counter += 1;

        self.write_half.write_all(&header_ciphertext).await?;
        self.write_half.write_all(&payload_ciphertext).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<(u8, Vec<u8>), V2Error> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.keys.receive_key));

        let mut header_ciphertext = [0u8; HEADER_SIZE + TAG_LEN];
        self.read_half.read_exact(&mut header_ciphertext).await?;
        let header_plaintext = cipher
            .decrypt(&transport_nonce(self.receive_counter), Payload { msg: &header_ciphertext, aad: &[] })
            .map_err(|_| V2Error::Noise(NoiseError::Aead))?;
        self.receive_counter += 1;
        let header = parse_frame_header(&header_plaintext)?;

        let mut payload_ciphertext = vec![0u8; header.msg_length as usize + TAG_LEN];
        self.read_half.read_exact(&mut payload_ciphertext).await?;
        let payload = cipher
            .decrypt(&transport_nonce(self.receive_counter), Payload { msg: &payload_ciphertext, aad: &[] })
            .map_err(|_| V2Error::Noise(NoiseError::Aead))?;
        self.receive_counter += 1;

        Ok((header.msg_type, payload))
    }
}
