//! Half-duplex UART framing to the ASIC chain: preamble alignment, CRC5 /
//! CRC16 framing, and chip enumeration (spec §4.1, C1). Ported from
//! `components/asic/common.c`'s `receive_work`/`serial_alignment` algorithm.

use std::time::Duration;
use thiserror::Error;

/// Big-endian frame preamble every BM13xx response starts with.
pub const PREAMBLE: u16 = 0xAA55;

/// Timeout budget for a short alignment-recovery read (spec §4.1 point 2).
const ALIGNMENT_TIMEOUT: Duration = Duration::from_millis(10);
/// Timeout for a full-length frame receive.
const RECEIVE_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Timeout used while enumerating chips: a zero-byte read signals "no more
/// chips to enumerate".
const ENUMERATION_TIMEOUT: Duration = Duration::from_millis(1_000);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("short read: expected {expected}, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("preamble not found in buffer")]
    PreambleNotFound,
    #[error("alignment recovery read came up short")]
    AlignmentShortRead,
    #[error("CRC check failed")]
    CrcMismatch,
}

/// Abstraction over the physical half-duplex UART, so the framing and chip
/// driver logic can run against an in-memory fake in tests.
pub trait SerialPort: Send {
    /// Blocking write of the full buffer.
    fn send(&mut self, data: &[u8]) -> std::io::Result<()>;
    /// Blocking read of up to `len` bytes within `timeout`; returns however
    /// many bytes arrived (possibly short, possibly zero on timeout).
    fn recv(&mut self, len: usize, timeout: Duration) -> std::io::Result<Vec<u8>>;
    /// Discard any buffered RX bytes.
    fn flush_rx(&mut self);
    fn set_baud(&mut self, baud: u32) -> std::io::Result<()>;
}

/// BM13xx CRC5, the standard bit-serial LFSR used by every chip in this
/// family for short command/response frames.
pub fn crc5(data: &[u8]) -> u8 {
    let mut crc_in = [true, true, true, true, true];
    for byte in data {
        for bit in (0..8).rev() {
            let din = (byte >> bit) & 1 != 0;
            let crc_out = [
                crc_in[4] ^ din,
                crc_in[0],
                crc_in[1] ^ crc_in[4] ^ din,
                crc_in[2],
                crc_in[3],
            ];
            crc_in = crc_out;
        }
    }
    let mut crc = 0u8;
    for (i, bit) in crc_in.iter().enumerate() {
        if *bit {
            crc |= 1 << i;
        }
    }
    crc
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF), used by BM1370's longer
/// result frames.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

fn shift_buffer_left(buffer: &mut Vec<u8>, amount: usize) {
    buffer.drain(0..amount);
}

/// Locate the big-endian preamble in `buffer`; `None` if absent.
pub fn find_preamble_offset(buffer: &[u8]) -> Option<usize> {
    if buffer.len() < 2 {
        return None;
    }
    buffer
        .windows(2)
        .position(|w| u16::from_be_bytes([w[0], w[1]]) == PREAMBLE)
}

/// Shift `buffer` left by `offset` bytes, reading `offset` fresh bytes from
/// the port to refill the tail ("alignment recovery", spec §4.1 point 2).
fn serial_alignment(port: &mut dyn SerialPort, buffer: &mut Vec<u8>, offset: usize) -> Result<(), FrameError> {
    let fresh = port
        .recv(offset, ALIGNMENT_TIMEOUT)
        .map_err(|_| FrameError::AlignmentShortRead)?;
    if fresh.len() != offset {
        return Err(FrameError::AlignmentShortRead);
    }
    shift_buffer_left(buffer, offset);
    buffer.extend_from_slice(&fresh);
    Ok(())
}

/// Receive exactly one CRC5-framed response of `buffer_size` bytes,
/// performing preamble alignment recovery and CRC verification. On any
/// failure the RX buffer is flushed, matching the source's "fail fast and
/// clear" behavior.
pub fn receive_work(port: &mut dyn SerialPort, buffer_size: usize) -> Result<Vec<u8>, FrameError> {
    let mut buffer = port
        .recv(buffer_size, RECEIVE_TIMEOUT)
        .map_err(|_| {
            port.flush_rx();
            FrameError::ShortRead { expected: buffer_size, got: 0 }
        })?;
    if buffer.len() != buffer_size {
        port.flush_rx();
        return Err(FrameError::ShortRead { expected: buffer_size, got: buffer.len() });
    }

    let offset = match find_preamble_offset(&buffer) {
        Some(o) => o,
        None => {
            port.flush_rx();
            return Err(FrameError::PreambleNotFound);
        }
    };

    if offset > 0 {
        if let Err(e) = serial_alignment(port, &mut buffer, offset) {
            port.flush_rx();
            return Err(e);
        }
    }

    if crc5(&buffer[2..]) != 0 {
        port.flush_rx();
        return Err(FrameError::CrcMismatch);
    }

    Ok(buffer)
}

/// Enumerate chips by repeatedly reading fixed-length CHIP_ID responses
/// until a read returns zero bytes. Preamble/id/CRC mismatches are logged
/// as warnings by the caller, not treated as fatal -- only the final count
/// matters (spec §4.1 "Chip enumeration").
pub fn count_chips(port: &mut dyn SerialPort, chip_id_response_len: usize) -> usize {
    let mut count = 0;
    loop {
        let buffer = match port.recv(chip_id_response_len, ENUMERATION_TIMEOUT) {
            Ok(b) => b,
            Err(_) => break,
        };
        if buffer.is_empty() {
            break;
        }
        if buffer.len() == chip_id_response_len
            && find_preamble_offset(&buffer) == Some(0)
            && crc5(&buffer[2..]) == 0
        {
            count += 1;
        }
        // Mismatches fall through silently (a warning is the caller's job);
        // enumeration continues until the port stops producing bytes.
    }
    count
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory fake UART, feeding pre-scripted RX frames and recording TX.
    #[derive(Default)]
    pub struct FakePort {
        pub rx_queue: VecDeque<Vec<u8>>,
        pub tx_log: Vec<Vec<u8>>,
        pub baud: u32,
    }

    impl SerialPort for FakePort {
        fn send(&mut self, data: &[u8]) -> std::io::Result<()> {
            self.tx_log.push(data.to_vec());
            Ok(())
        }

        fn recv(&mut self, len: usize, _timeout: Duration) -> std::io::Result<Vec<u8>> {
            match self.rx_queue.pop_front() {
                Some(mut buf) => {
                    buf.truncate(len.max(buf.len()).min(buf.len()));
                    Ok(buf)
                }
                None => Ok(Vec::new()),
            }
        }

        fn flush_rx(&mut self) {
            self.rx_queue.clear();
        }

        fn set_baud(&mut self, baud: u32) -> std::io::Result<()> {
            self.baud = baud;
            Ok(())
        }
    }

    /// Build a well-formed CRC5 frame: preamble + payload + trailing CRC5 byte.
    pub fn make_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&PREAMBLE.to_be_bytes());
        frame.extend_from_slice(payload);
        let crc = crc5(&frame[2..]);
        frame.push(crc);
        frame
    }
}
