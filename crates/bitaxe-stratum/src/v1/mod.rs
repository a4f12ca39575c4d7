//! Stratum V1 client (spec §4.6): JSON-RPC over a newline-delimited TCP
//! socket, with primary/fallback pool failover and a heartbeat task that
//! watches for the primary coming back.

pub mod scriptsig;

use crate::queue::WorkQueue;
use crate::types::{PoolIndex, StratumEvent};
use bitaxe_config::PoolDescriptor;
use bitaxe_logging::{Category, Level, LogSink};
use bitaxe_stats::ShareStats;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Notify;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const READ_TIMEOUT: Duration = Duration::from_secs(600);
pub const RETRY_POOL_SWITCH_THRESHOLD: u32 = 3;
pub const RETRY_REBOOT_THRESHOLD: u32 = 5;
pub const PRIMARY_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum V1Error {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON-RPC line: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("server requested reconnect")]
    ReconnectRequested,
}

/// One `mining.notify` decoded into the fields the job builder needs.
#[derive(Debug, Clone)]
pub struct MiningNotify {
    pub job_id: String,
    pub prev_hash_hex: String,
    pub coinbase1_hex: String,
    pub coinbase2_hex: String,
    pub merkle_branch_hex: Vec<String>,
    pub version_hex: String,
    pub nbits_hex: String,
    pub ntime_hex: String,
    pub clean_jobs: bool,
    /// BIP34 block height decoded from the coinbase scriptSig, when present.
    pub block_height: Option<u64>,
    /// Longest printable-ASCII run found in the coinbase scriptSig.
    pub miner_tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingLine {
    id: Option<Value>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Value>,
    error: Option<Value>,
}

/// A JSON-RPC `error` field is `null` or `[code, message, traceback]`; this
/// extracts the message for the rejection histogram.
fn extract_error_message(error: &Value) -> Option<String> {
    match error {
        Value::Array(items) => items.get(1).and_then(Value::as_str).map(String::from),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct OutgoingRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

/// Monotonic JSON-RPC request id.
#[derive(Default)]
pub struct RequestIds(AtomicU64);

impl RequestIds {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// extranonce_1 / extranonce_2 state, updated by `mining.subscribe` and
/// `mining.set_extranonce`.
pub struct ExtranonceState {
    inner: Mutex<ExtranonceInner>,
}

struct ExtranonceInner {
    extranonce1_hex: String,
    extranonce2_size: usize,
    counter: u64,
}

impl ExtranonceState {
    pub fn new(extranonce1_hex: String, extranonce2_size: usize) -> Self {
        Self { inner: Mutex::new(ExtranonceInner { extranonce1_hex, extranonce2_size, counter: 0 }) }
    }

    pub fn set_extranonce(&self, extranonce1_hex: String, extranonce2_size: usize) {
        let mut inner = self.inner.lock().expect("extranonce mutex poisoned");
        inner.extranonce1_hex = extranonce1_hex;
        inner.extranonce2_size = extranonce2_size;
        inner.counter = 0;
    }

    pub fn extranonce1_hex(&self) -> String {
        self.inner.lock().expect("extranonce mutex poisoned").extranonce1_hex.clone()
    }

    /// Advances the counter and formats it as hex, zero-padded/truncated to
    /// `extranonce2_size` bytes. Per spec §9 open question, a counter that
    /// no longer fits in `extranonce2_size` bytes has its high bits silently
    /// dropped by the modular formatting below; this is ported as-is from
    /// the original firmware, not a bug we're fixing here.
    pub fn next_extranonce2_hex(&self) -> String {
        let mut inner = self.inner.lock().expect("extranonce mutex poisoned");
        let value = inner.counter;
        inner.counter = inner.counter.wrapping_add(1);
        let hex_digits = inner.extranonce2_size * 2;
        let full = format!("{:0width$x}", value, width = hex_digits.max(1));
        if full.len() > hex_digits {
            full[full.len() - hex_digits..].to_string()
        } else {
            full
        }
    }
}

/// Parses one newline-delimited JSON-RPC line into a `StratumEvent` plus any
/// side-channel update (new diff, new extranonce, reconnect request). Kept
/// free of socket I/O so it can be exercised directly in tests.
pub enum LineOutcome {
    Notify(MiningNotify),
    SetDifficulty(f64),
    SetExtranonce { extranonce1_hex: String, extranonce2_size: usize },
    Reconnect,
    /// `mining.set_version_mask`, sent unsolicited by some pools after a
    /// renegotiation.
    SetVersionMask(u32),
    /// Covers `mining.configure`, `mining.authorize`, and `mining.submit`
    /// replies, which all share the same `{result, id}` shape; the caller
    /// disambiguates by comparing `request_id` against the id it sent, and
    /// reads `result`/`error` for whichever of those it expects.
    Result { request_id: u64, accepted: bool, result: Option<Value>, error_message: Option<String> },
    Ignored,
}

pub fn handle_line(line: &str) -> Result<LineOutcome, V1Error> {
    let parsed: IncomingLine = serde_json::from_str(line)?;

    if let Some(method) = parsed.method.as_deref() {
        let params = parsed.params.unwrap_or(Value::Null);
        return Ok(match method {
            "mining.notify" => LineOutcome::Notify(decode_notify(&params)?),
            "mining.set_difficulty" => {
                let diff = params.get(0).and_then(Value::as_f64).unwrap_or(1.0);
                LineOutcome::SetDifficulty(diff)
            }
            "mining.set_extranonce" => {
                let extranonce1_hex = params.get(0).and_then(Value::as_str).unwrap_or_default().to_string();
                let extranonce2_size = params.get(1).and_then(Value::as_u64).unwrap_or(4) as usize;
                LineOutcome::SetExtranonce { extranonce1_hex, extranonce2_size }
            }
            "mining.set_version_mask" => {
                let mask_hex = params.get(0).and_then(Value::as_str).unwrap_or("0");
                let mask = u32::from_str_radix(mask_hex, 16).unwrap_or(0);
                LineOutcome::SetVersionMask(mask)
            }
            "client.reconnect" => LineOutcome::Reconnect,
            _ => LineOutcome::Ignored,
        });
    }

    if let Some(id_value) = parsed.id.as_ref().and_then(Value::as_u64) {
        let accepted = parsed.result.as_ref().map(|v| v.as_bool().unwrap_or(false)).unwrap_or(false);
        let error_message = parsed.error.as_ref().and_then(extract_error_message);
        return Ok(LineOutcome::Result { request_id: id_value, accepted, result: parsed.result, error_message });
    }

    Ok(LineOutcome::Ignored)
}

fn decode_notify(params: &Value) -> Result<MiningNotify, V1Error> {
    use serde::de::Error as _;
    let arr = params.as_array().ok_or_else(|| serde_json::Error::custom("mining.notify params not an array"))?;
    let get_str = |i: usize| arr.get(i).and_then(Value::as_str).unwrap_or_default().to_string();
    let merkle_branch_hex = arr
        .get(4)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();
    let coinbase1_hex = get_str(2);
    let coinbase2_hex = get_str(3);

    let coinbase1 = hex::decode(&coinbase1_hex).unwrap_or_default();
    let mut scriptsig_bytes = coinbase1.clone();
    scriptsig_bytes.extend(hex::decode(&coinbase2_hex).unwrap_or_default());
    let block_height = scriptsig::parse_block_height(&coinbase1);
    let miner_tag = scriptsig::extract_miner_tag(&scriptsig_bytes);

    Ok(MiningNotify {
        job_id: get_str(0),
        prev_hash_hex: get_str(1),
        coinbase1_hex,
        coinbase2_hex,
        merkle_branch_hex,
        version_hex: get_str(5),
        nbits_hex: get_str(6),
        ntime_hex: get_str(7),
        clean_jobs: arr.get(8).and_then(Value::as_bool).unwrap_or(false),
        block_height,
        miner_tag,
    })
}

pub fn build_configure_request(id: u64) -> String {
    let req = OutgoingRequest {
        id,
        method: "mining.configure",
        params: serde_json::json!([["version-rolling"], {"version-rolling.mask": "1fffe000"}]),
    };
    serde_json::to_string(&req).expect("serialize configure request")
}

pub fn build_subscribe_request(id: u64, asic_family_name: &str) -> String {
    let req = OutgoingRequest { id, method: "mining.subscribe", params: serde_json::json!([asic_family_name]) };
    serde_json::to_string(&req).expect("serialize subscribe request")
}

pub fn build_authorize_request(id: u64, user: &str, password: &str) -> String {
    let req = OutgoingRequest { id, method: "mining.authorize", params: serde_json::json!([user, password]) };
    serde_json::to_string(&req).expect("serialize authorize request")
}

pub fn build_suggest_difficulty_request(id: u64, difficulty: u64) -> String {
    let req = OutgoingRequest { id, method: "mining.suggest_difficulty", params: serde_json::json!([difficulty]) };
    serde_json::to_string(&req).expect("serialize suggest_difficulty request")
}

pub fn build_extranonce_subscribe_request(id: u64) -> String {
    let req = OutgoingRequest { id, method: "mining.extranonce.subscribe", params: serde_json::json!([]) };
    serde_json::to_string(&req).expect("serialize extranonce.subscribe request")
}

/// Builds the exact share-submission request shape from spec §8 Scenario S1.
pub fn build_submit_request(
    id: u64,
    worker: &str,
    job_id: &str,
    extranonce2_hex: &str,
    ntime_hex: &str,
    nonce_hex: &str,
    version_hex: &str,
) -> String {
    let req = OutgoingRequest {
        id,
        method: "mining.submit",
        params: serde_json::json!([worker, job_id, extranonce2_hex, ntime_hex, nonce_hex, version_hex]),
    };
    serde_json::to_string(&req).expect("serialize submit request")
}

/// Runtime state for one V1 client: two pools, active index, retry
/// counters, and the shared queue/extranonce/version-mask/share-stats
/// handles the job builder and telemetry read from.
pub struct StratumV1Client {
    pub primary: PoolDescriptor,
    pub fallback: Option<PoolDescriptor>,
    pub active: Mutex<PoolIndex>,
    pub request_ids: RequestIds,
    pub version_mask: AtomicU32,
    pub retry_count: AtomicU32,
    pub critical_failure_count: AtomicU32,
    pub extranonce: ExtranonceState,
    pub share_stats: ShareStats,
    /// Signaled by [`StratumV1Client::run_heartbeat`] when it lands back on
    /// the primary, so a `run_session` currently parked on the fallback
    /// socket's read can drop it and reconnect.
    force_reconnect: Notify,
}

impl StratumV1Client {
    pub fn new(primary: PoolDescriptor, fallback: Option<PoolDescriptor>) -> Self {
        Self {
            primary,
            fallback,
            active: Mutex::new(PoolIndex::Primary),
            request_ids: RequestIds::default(),
            version_mask: AtomicU32::new(0),
            retry_count: AtomicU32::new(0),
            critical_failure_count: AtomicU32::new(0),
            extranonce: ExtranonceState::new(String::new(), 4),
            share_stats: ShareStats::new(),
            force_reconnect: Notify::new(),
        }
    }

    fn active_descriptor(&self) -> &PoolDescriptor {
        match *self.active.lock().expect("active pool mutex poisoned") {
            PoolIndex::Primary => &self.primary,
            PoolIndex::Fallback => self.fallback.as_ref().unwrap_or(&self.primary),
        }
    }

    fn switch_pool(&self) {
        let mut active = self.active.lock().expect("active pool mutex poisoned");
        *active = active.other();
    }

    /// Connects, authenticates, and services one pool session until a
    /// disconnect or `client.reconnect`. Returns so the caller's outer loop
    /// can apply the retry/pool-switch/reboot escalation from spec §4.6
    /// point 7.
    pub async fn run_session(
        &self,
        queue: &WorkQueue<StratumEvent>,
        log: &dyn LogSink,
        asic_family_name: &str,
    ) -> Result<(), V1Error> {
        let descriptor = self.active_descriptor().clone();
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((descriptor.host.as_str(), descriptor.port)))
            .await
            .map_err(|_| V1Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))??;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let configure_id = self.request_ids.next();
        write_half.write_all(build_configure_request(configure_id).as_bytes()).await?;
        write_half.write_all(b"\n").await?;

        let subscribe_id = self.request_ids.next();
        write_half.write_all(build_subscribe_request(subscribe_id, asic_family_name).as_bytes()).await?;
        write_half.write_all(b"\n").await?;

        let authorize_id = self.request_ids.next();
        write_half
            .write_all(build_authorize_request(authorize_id, &descriptor.user, &descriptor.password).as_bytes())
            .await?;
        write_half.write_all(b"\n").await?;

        let mut suggest_difficulty_id: Option<u64> = None;
        let mut extranonce_subscribe_id: Option<u64> = None;

        let mut line = String::new();
        loop {
            line.clear();
            let read = tokio::select! {
                result = tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line)) => {
                    result.map_err(|_| V1Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out")))??
                }
                _ = self.force_reconnect.notified() => return Err(V1Error::ReconnectRequested),
            };
            if read == 0 {
                return Err(V1Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "pool closed connection")));
            }
            match handle_line(line.trim_end())? {
                LineOutcome::Notify(notify) => {
                    if notify.clean_jobs {
                        queue.clear(|_| {}).await;
                    }
                    queue.enqueue(StratumEvent::V1Notify(notify)).await;
                }
                LineOutcome::SetDifficulty(diff) => {
                    log.log_message(Category::Network, Level::Info, &format!("pool set difficulty {diff}"));
                }
                LineOutcome::SetExtranonce { extranonce1_hex, extranonce2_size } => {
                    self.extranonce.set_extranonce(extranonce1_hex, extranonce2_size);
                }
                LineOutcome::SetVersionMask(mask) => {
                    self.version_mask.store(mask, Ordering::SeqCst);
                }
                LineOutcome::Reconnect => return Err(V1Error::ReconnectRequested),
                LineOutcome::Result { request_id, result, .. } if request_id == configure_id => {
                    if let Some(mask_hex) = result.as_ref().and_then(|v| v.get("version-rolling.mask")).and_then(Value::as_str) {
                        if let Ok(mask) = u32::from_str_radix(mask_hex, 16) {
                            self.version_mask.store(mask, Ordering::SeqCst);
                        }
                    }
                }
                LineOutcome::Result { request_id, accepted, .. } if request_id == authorize_id => {
                    if accepted {
                        if let Some(difficulty) = descriptor.suggested_difficulty {
                            let id = self.request_ids.next();
                            suggest_difficulty_id = Some(id);
                            write_half.write_all(build_suggest_difficulty_request(id, difficulty).as_bytes()).await?;
                            write_half.write_all(b"\n").await?;
                        }
                        if descriptor.extranonce_subscribe {
                            let id = self.request_ids.next();
                            extranonce_subscribe_id = Some(id);
                            write_half.write_all(build_extranonce_subscribe_request(id).as_bytes()).await?;
                            write_half.write_all(b"\n").await?;
                        }
                    } else {
                        log.log_message(Category::Network, Level::Warn, "pool rejected authorization");
                    }
                }
                LineOutcome::Result { request_id, .. } if request_id == subscribe_id => {}
                LineOutcome::Result { request_id, .. } if Some(request_id) == suggest_difficulty_id || Some(request_id) == extranonce_subscribe_id => {}
                LineOutcome::Result { accepted, error_message, .. } => {
                    // Any other id we generated is a `mining.submit` reply
                    // (spec §5 "Share accounting").
                    if accepted {
                        self.share_stats.record_accepted(1);
                    } else {
                        self.share_stats.record_rejected(error_message.as_deref().unwrap_or("rejected"));
                    }
                }
                LineOutcome::Ignored => {}
            }
        }
    }

    /// Primary-pool heartbeat (spec §4.6 "Primary-pool heartbeat"): while
    /// parked on the fallback, probes the primary every
    /// [`PRIMARY_HEARTBEAT_INTERVAL`] over its own ephemeral socket and, on
    /// a successful authorize, flips `active` back to primary and wakes any
    /// `run_session` blocked reading the fallback so it reconnects. Runs
    /// forever; meant to be spawned alongside the main session loop.
    pub async fn run_heartbeat(&self, log: &dyn LogSink, asic_family_name: &str) {
        loop {
            tokio::time::sleep(PRIMARY_HEARTBEAT_INTERVAL).await;
            if *self.active.lock().expect("active pool mutex poisoned") != PoolIndex::Fallback {
                continue;
            }
            match self.probe_primary(asic_family_name).await {
                Ok(true) => {
                    *self.active.lock().expect("active pool mutex poisoned") = PoolIndex::Primary;
                    self.force_reconnect.notify_waiters();
                    log.log_message(Category::Network, Level::Info, "primary pool heartbeat succeeded, reconnecting");
                }
                Ok(false) => {
                    log.log_message(Category::Network, Level::Debug, "primary pool heartbeat rejected authorization");
                }
                Err(_) => {
                    log.log_message(Category::Network, Level::Debug, "primary pool heartbeat probe failed");
                }
            }
        }
    }

    /// A fresh subscribe+authorize against the primary, over its own
    /// socket, independent of whatever session is currently active on the
    /// fallback (spec §5 "the heartbeat task uses its own ephemeral
    /// socket").
    async fn probe_primary(&self, asic_family_name: &str) -> Result<bool, V1Error> {
        let stream =
            tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((self.primary.host.as_str(), self.primary.port)))
                .await
                .map_err(|_| V1Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "heartbeat connect timed out")))??;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let subscribe_id = self.request_ids.next();
        write_half.write_all(build_subscribe_request(subscribe_id, asic_family_name).as_bytes()).await?;
        write_half.write_all(b"\n").await?;

        let authorize_id = self.request_ids.next();
        write_half
            .write_all(build_authorize_request(authorize_id, &self.primary.user, &self.primary.password).as_bytes())
            .await?;
        write_half.write_all(b"\n").await?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = tokio::time::timeout(CONNECT_TIMEOUT, reader.read_line(&mut line))
                .await
                .map_err(|_| V1Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "heartbeat read timed out")))??;
            if read == 0 {
                return Err(V1Error::Io(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "heartbeat socket closed")));
            }
            if let LineOutcome::Result { request_id, accepted, .. } = handle_line(line.trim_end())? {
                if request_id == authorize_id {
                    return Ok(accepted);
                }
            }
        }
    }

    /// Applies spec §4.6 point 7's escalation after a failed session.
    pub fn record_failure(&self, critical: bool) -> bool {
        let retries = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
        if retries >= RETRY_POOL_SWITCH_THRESHOLD {
            self.switch_pool();
            self.retry_count.store(0, Ordering::SeqCst);
        }
        if critical {
            let criticals = self.critical_failure_count.fetch_add(1, Ordering::SeqCst) + 1;
            if criticals >= RETRY_REBOOT_THRESHOLD {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mining_notify() {
        let line = r#"{"id":null,"method":"mining.notify","params":["job1","prevhash","cb1","cb2",["branch1"],"20000000","1d00ffff","5f000000",true]}"#;
        match handle_line(line).unwrap() {
            LineOutcome::Notify(notify) => {
                assert_eq!(notify.job_id, "job1");
                assert_eq!(notify.merkle_branch_hex, vec!["branch1".to_string()]);
                assert!(notify.clean_jobs);
            }
            _ => panic!("expected notify"),
        }
    }

    #[test]
    fn decodes_set_difficulty() {
        let line = r#"{"id":null,"method":"mining.set_difficulty","params":[256]}"#;
        match handle_line(line).unwrap() {
            LineOutcome::SetDifficulty(diff) => assert_eq!(diff, 256.0),
            _ => panic!("expected set_difficulty"),
        }
    }

    #[test]
    fn decodes_reconnect() {
        let line = r#"{"id":null,"method":"client.reconnect","params":[]}"#;
        assert!(matches!(handle_line(line).unwrap(), LineOutcome::Reconnect));
    }

    #[test]
    fn builds_exact_submit_request_shape() {
        let request = build_submit_request(7, "worker", "jobid", "00000001", "5f000000", "12345678", "20000000");
        let value: Value = serde_json::from_str(&request).unwrap();
        assert_eq!(value["method"], "mining.submit");
        assert_eq!(
            value["params"],
            serde_json::json!(["worker", "jobid", "00000001", "5f000000", "12345678", "20000000"])
        );
    }

    #[test]
    fn extranonce2_formatting_truncates_high_bits_when_counter_overflows_width() {
        let state = ExtranonceState::new("abcd0102".to_string(), 2);
        // 2-byte width => 4 hex digits. Drive the counter past 0xffff.
        for _ in 0..0x1_0001 {
            state.next_extranonce2_hex();
        }
        assert_eq!(state.next_extranonce2_hex(), "0002");
    }

    #[test]
    fn extranonce2_formatting_zero_pads_small_counters() {
        let state = ExtranonceState::new("abcd0102".to_string(), 4);
        assert_eq!(state.next_extranonce2_hex(), "00000000");
        assert_eq!(state.next_extranonce2_hex(), "00000001");
    }

    #[test]
    fn pool_switch_happens_after_three_failures() {
        let client = StratumV1Client::new(
            PoolDescriptor {
                protocol: bitaxe_config::Protocol::StratumV1,
                host: "primary".into(),
                port: 3333,
                user: "u".into(),
                password: "p".into(),
                tls: false,
                suggested_difficulty: None,
                extranonce_subscribe: false,
            },
            Some(PoolDescriptor {
                protocol: bitaxe_config::Protocol::StratumV1,
                host: "fallback".into(),
                port: 3333,
                user: "u".into(),
                password: "p".into(),
                tls: false,
                suggested_difficulty: None,
                extranonce_subscribe: false,
            }),
        );
        assert_eq!(*client.active.lock().unwrap(), PoolIndex::Primary);
        client.record_failure(false);
        client.record_failure(false);
        assert_eq!(*client.active.lock().unwrap(), PoolIndex::Primary);
        client.record_failure(false);
        assert_eq!(*client.active.lock().unwrap(), PoolIndex::Fallback);
    }

    #[test]
    fn reboot_is_requested_after_five_critical_failures() {
        let client = StratumV1Client::new(
            PoolDescriptor {
                protocol: bitaxe_config::Protocol::StratumV1,
                host: "primary".into(),
                port: 3333,
                user: "u".into(),
                password: "p".into(),
                tls: false,
                suggested_difficulty: None,
                extranonce_subscribe: false,
            },
            None,
        );
        let mut should_reboot = false;
        for _ in 0..5 {
            should_reboot = client.record_failure(true);
        }
        assert!(should_reboot);
    }

    #[test]
    fn decodes_set_version_mask() {
        let line = r#"{"id":null,"method":"mining.set_version_mask","params":["1fffe000"]}"#;
        match handle_line(line).unwrap() {
            LineOutcome::SetVersionMask(mask) => assert_eq!(mask, 0x1fff_e000),
            _ => panic!("expected set_version_mask"),
        }
    }

    #[test]
    fn configure_reply_carries_the_negotiated_mask_in_result() {
        let line = r#"{"id":1,"result":{"version-rolling":true,"version-rolling.mask":"1fffe000"},"error":null}"#;
        match handle_line(line).unwrap() {
            LineOutcome::Result { request_id, result, .. } => {
                assert_eq!(request_id, 1);
                assert_eq!(result.unwrap()["version-rolling.mask"], "1fffe000");
            }
            _ => panic!("expected result"),
        }
    }

    #[test]
    fn submit_rejection_error_message_is_extracted() {
        let line = r#"{"id":9,"result":false,"error":[23,"Job not found",null]}"#;
        match handle_line(line).unwrap() {
            LineOutcome::Result { accepted, error_message, .. } => {
                assert!(!accepted);
                assert_eq!(error_message.as_deref(), Some("Job not found"));
            }
            _ => panic!("expected result"),
        }
    }

    #[test]
    fn mining_notify_exposes_block_height_and_miner_tag() {
        let mut coinbase1 = vec![0x03u8, 0x60, 0xae, 0x0a];
        coinbase1.extend_from_slice(b"/slushpool/");
        let coinbase1_hex = hex::encode(&coinbase1);
        let line = format!(
            r#"{{"id":null,"method":"mining.notify","params":["job1","prevhash","{coinbase1_hex}","",[],"20000000","1d00ffff","5f000000",false]}}"#
        );
        match handle_line(&line).unwrap() {
            LineOutcome::Notify(notify) => {
                assert_eq!(notify.block_height, Some(700_000));
                assert_eq!(notify.miner_tag.as_deref(), Some("/slushpool/"));
            }
            _ => panic!("expected notify"),
        }
    }
}
