//! SV2 frame header encode/decode (spec §4.7 "Transport framing"):
//! 2-byte LE extension_type, 1-byte msg_type, 3-byte LE msg_length.

pub const HEADER_SIZE: usize = 6;
pub const MAX_MSG_LENGTH: u32 = (1 << 24) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub extension_type: u16,
    pub msg_type: u8,
    pub msg_length: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("msg_length {0} exceeds the 24-bit frame length field")]
    LengthTooLarge(u32),
    #[error("frame header must be exactly {HEADER_SIZE} bytes, got {0}")]
    ShortHeader(usize),
}

pub fn encode_frame_header(header: FrameHeader) -> Result<[u8; HEADER_SIZE], FramingError> {
    if header.msg_length > MAX_MSG_LENGTH {
        return Err(FramingError::LengthTooLarge(header.msg_length));
    }
    let mut bytes = [0u8; HEADER_SIZE];
    bytes[0..2].copy_from_slice(&header.extension_type.to_le_bytes());
    bytes[2] = header.msg_type;
    let len_bytes = header.msg_length.to_le_bytes();
    bytes[3..6].copy_from_slice(&len_bytes[0..3]);
    Ok(bytes)
}

pub fn parse_frame_header(bytes: &[u8]) -> Result<FrameHeader, FramingError> {
    if bytes.len() != HEADER_SIZE {
        return Err(FramingError::ShortHeader(bytes.len()));
    }
    let extension_type = u16::from_le_bytes([bytes[0], bytes[1]]);
    let msg_type = bytes[2];
    let msg_length = u32::from_le_bytes([bytes[3], bytes[4], bytes[5], 0]);
    Ok(FrameHeader { extension_type, msg_type, msg_length })
}
