//! SV2 mining-protocol message payloads (spec §4.7 "SV2 protocol messages
//! handled"). All integers little-endian; `Str0_255` is a 1-byte length
//! prefix followed by that many bytes; `U256` is 32 raw bytes, little-endian.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("payload too short: need at least {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },
    #[error("string field length {0} exceeds remaining payload")]
    StringOverrun(usize),
}

fn require(buf: &[u8], needed: usize) -> Result<(), MessageError> {
    if buf.len() < needed {
        return Err(MessageError::TooShort { needed, got: buf.len() });
    }
    Ok(())
}

fn read_str0_255(buf: &[u8], offset: usize) -> Result<(String, usize), MessageError> {
    require(buf, offset + 1)?;
    let len = buf[offset] as usize;
    require(buf, offset + 1 + len)?;
    let bytes = &buf[offset + 1..offset + 1 + len];
    Ok((String::from_utf8_lossy(bytes).into_owned(), offset + 1 + len))
}

fn write_str0_255(out: &mut Vec<u8>, s: &str) {
    let bytes = &s.as_bytes()[..s.len().min(255)];
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

pub mod msg_type {
    pub const SETUP_CONNECTION: u8 = 0x00;
    pub const SETUP_CONNECTION_SUCCESS: u8 = 0x01;
    pub const SETUP_CONNECTION_ERROR: u8 = 0x02;
    pub const OPEN_STANDARD_MINING_CHANNEL: u8 = 0x10;
    pub const OPEN_STANDARD_MINING_CHANNEL_SUCCESS: u8 = 0x11;
    pub const OPEN_MINING_CHANNEL_ERROR: u8 = 0x12;
    pub const NEW_MINING_JOB: u8 = 0x15;
    pub const SET_NEW_PREV_HASH: u8 = 0x20;
    pub const SET_TARGET: u8 = 0x21;
    pub const SUBMIT_SHARES_STANDARD: u8 = 0x1a;
    pub const SUBMIT_SHARES_SUCCESS: u8 = 0x1c;
    pub const SUBMIT_SHARES_ERROR: u8 = 0x1d;
}

pub const MINING_PROTOCOL: u8 = 0;
pub const MIN_VERSION: u16 = 2;
pub const MAX_VERSION: u16 = 2;
pub const FLAG_REQUIRES_STANDARD_JOBS: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupConnection {
    pub protocol: u8,
    pub min_version: u16,
    pub max_version: u16,
    pub flags: u32,
    pub endpoint_host: String,
    pub endpoint_port: u16,
    pub vendor: String,
    pub hardware_version: String,
    pub firmware: String,
    pub device_id: String,
}

impl SetupConnection {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.protocol);
        out.extend_from_slice(&self.min_version.to_le_bytes());
        out.extend_from_slice(&self.max_version.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        write_str0_255(&mut out, &self.endpoint_host);
        out.extend_from_slice(&self.endpoint_port.to_le_bytes());
        write_str0_255(&mut out, &self.vendor);
        write_str0_255(&mut out, &self.hardware_version);
        write_str0_255(&mut out, &self.firmware);
        write_str0_255(&mut out, &self.device_id);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupConnectionSuccess {
    pub used_version: u16,
    pub flags: u32,
}

impl SetupConnectionSuccess {
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        require(buf, 6)?;
        Ok(Self {
            used_version: u16::from_le_bytes([buf[0], buf[1]]),
            flags: u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenStandardMiningChannel {
    pub request_id: u32,
    pub user_identity: String,
    pub nominal_hashrate: u32,
    pub max_target: [u8; 32],
}

impl OpenStandardMiningChannel {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.request_id.to_le_bytes());
        write_str0_255(&mut out, &self.user_identity);
        out.extend_from_slice(&self.nominal_hashrate.to_le_bytes());
        out.extend_from_slice(&self.max_target);
        out
    }

    /// Always 0xFF-filled per spec §4.7 ("max_target is all-0xFF").
    pub fn max_target_unbounded() -> [u8; 32] {
        [0xffu8; 32]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenStandardMiningChannelSuccess {
    pub request_id: u32,
    pub channel_id: u32,
    pub target: [u8; 32],
    pub extranonce_prefix: Vec<u8>,
    pub group_channel_id: u32,
}

impl OpenStandardMiningChannelSuccess {
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        require(buf, 4 + 4 + 32 + 1)?;
        let request_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let channel_id = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let target: [u8; 32] = buf[8..40].try_into().unwrap();
        let prefix_len = buf[40] as usize;
        require(buf, 41 + prefix_len + 4)?;
        let extranonce_prefix = buf[41..41 + prefix_len].to_vec();
        let group_offset = 41 + prefix_len;
        let group_channel_id = u32::from_le_bytes(buf[group_offset..group_offset + 4].try_into().unwrap());
        Ok(Self { request_id, channel_id, target, extranonce_prefix, group_channel_id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMiningJob {
    pub channel_id: u32,
    pub job_id: u32,
    pub min_ntime: Option<u32>,
    pub version: u32,
    pub merkle_root: [u8; 32],
}

impl NewMiningJob {
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        require(buf, 4 + 4 + 1)?;
        let channel_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let job_id = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let has_min_ntime = buf[8] != 0;
        let mut offset = 9;
        let min_ntime = if has_min_ntime {
            require(buf, offset + 4)?;
            let value = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
            offset += 4;
            Some(value)
        } else {
            None
        };
        require(buf, offset + 4 + 32)?;
        let version = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let merkle_root: [u8; 32] = buf[offset..offset + 32].try_into().unwrap();
        Ok(Self { channel_id, job_id, min_ntime, version, merkle_root })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetNewPrevHash {
    pub channel_id: u32,
    pub job_id: u32,
    pub prev_hash: [u8; 32],
    pub min_ntime: u32,
    pub nbits: u32,
}

impl SetNewPrevHash {
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        require(buf, 4 + 4 + 32 + 4 + 4)?;
        Ok(Self {
            channel_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            job_id: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            prev_hash: buf[8..40].try_into().unwrap(),
            min_ntime: u32::from_le_bytes(buf[40..44].try_into().unwrap()),
            nbits: u32::from_le_bytes(buf[44..48].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetTarget {
    pub channel_id: u32,
    pub max_target: [u8; 32],
}

impl SetTarget {
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        require(buf, 4 + 32)?;
        Ok(Self { channel_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()), max_target: buf[4..36].try_into().unwrap() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSharesStandard {
    pub channel_id: u32,
    pub sequence_number: u32,
    pub job_id: u32,
    pub nonce: u32,
    pub ntime: u32,
    pub version: u32,
}

impl SubmitSharesStandard {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24);
        out.extend_from_slice(&self.channel_id.to_le_bytes());
        out.extend_from_slice(&self.sequence_number.to_le_bytes());
        out.extend_from_slice(&self.job_id.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&self.ntime.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        require(buf, 24)?;
        Ok(Self {
            channel_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            sequence_number: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            job_id: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            nonce: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            ntime: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            version: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitSharesSuccess {
    pub channel_id: u32,
    pub last_sequence_number: u32,
    pub new_submits_accepted_count: u32,
    pub new_shares_sum: u32,
}

impl SubmitSharesSuccess {
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        require(buf, 16)?;
        Ok(Self {
            channel_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            last_sequence_number: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            new_submits_accepted_count: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            new_shares_sum: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitSharesError {
    pub channel_id: u32,
    pub sequence_number: u32,
    pub error_code: String,
}

impl SubmitSharesError {
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        require(buf, 8)?;
        let channel_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let sequence_number = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let (error_code, _) = read_str0_255(buf, 8)?;
        Ok(Self { channel_id, sequence_number, error_code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_connection_encodes_fields_in_order() {
        let message = SetupConnection {
            protocol: MINING_PROTOCOL,
            min_version: MIN_VERSION,
            max_version: MAX_VERSION,
            flags: FLAG_REQUIRES_STANDARD_JOBS,
            endpoint_host: "pool.example".to_string(),
            endpoint_port: 3336,
            vendor: "bitaxe".to_string(),
            hardware_version: "1.0".to_string(),
            firmware: "esp-miner".to_string(),
            device_id: "abc123".to_string(),
        };
        let encoded = message.encode();
        assert_eq!(encoded[0], MINING_PROTOCOL);
        assert_eq!(u16::from_le_bytes([encoded[1], encoded[2]]), MIN_VERSION);
        assert_eq!(u32::from_le_bytes([encoded[5], encoded[6], encoded[7], encoded[8]]), FLAG_REQUIRES_STANDARD_JOBS);
    }

    #[test]
    fn new_mining_job_without_min_ntime_is_future() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u32.to_le_bytes());
        buf.extend_from_slice(&42u32.to_le_bytes());
        buf.push(0);
        buf.extend_from_slice(&0x2000_0000u32.to_le_bytes());
        buf.extend_from_slice(&[0xab; 32]);
        let job = NewMiningJob::decode(&buf).unwrap();
        assert_eq!(job.job_id, 42);
        assert!(job.min_ntime.is_none());
    }

    #[test]
    fn submit_shares_standard_round_trips() {
        let message = SubmitSharesStandard {
            channel_id: 1,
            sequence_number: 2,
            job_id: 3,
            nonce: 0x1234_5678,
            ntime: 0x5f00_0000,
            version: 0x2000_0000,
        };
        let encoded = message.encode();
        assert_eq!(SubmitSharesStandard::decode(&encoded).unwrap(), message);
    }

    #[test]
    fn submit_shares_error_reads_trailing_string() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&2u32.to_le_bytes());
        write_str0_255(&mut buf, "stale-share");
        let error = SubmitSharesError::decode(&buf).unwrap();
        assert_eq!(error.error_code, "stale-share");
    }
}
