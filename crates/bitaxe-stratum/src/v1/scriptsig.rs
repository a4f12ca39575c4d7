//! Coinbase scriptSig parsing: block height (BIP34) and miner tag, exposed
//! as telemetry per spec §4.6.

/// Decodes a BIP34 height push at the start of a coinbase scriptSig: one
/// length byte followed by that many little-endian bytes, minimally
/// encoded (no superfluous leading zero byte, except to avoid the high bit
/// being read as a sign).
pub fn parse_block_height(scriptsig: &[u8]) -> Option<u64> {
    let len = *scriptsig.first()? as usize;
    if len == 0 || len > 8 {
        return None;
    }
    let bytes = scriptsig.get(1..1 + len)?;
    let mut value: u64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= (*b as u64) << (8 * i);
    }
    Some(value)
}

/// Miner tags are conventionally embedded later in the scriptSig as
/// printable ASCII; this extracts the longest printable-ASCII run, which is
/// good enough for telemetry purposes (not a strict parser of any specific
/// pool's tag format).
pub fn extract_miner_tag(scriptsig: &[u8]) -> Option<String> {
    let mut best: Option<&[u8]> = None;
    let mut start = 0usize;
    let mut i = 0usize;
    let is_printable = |b: u8| (0x20..=0x7e).contains(&b);
    while i <= scriptsig.len() {
        let at_end = i == scriptsig.len();
        if at_end || !is_printable(scriptsig[i]) {
            let run = &scriptsig[start..i];
            if run.len() >= 4 && best.map_or(true, |b| run.len() > b.len()) {
                best = Some(run);
            }
            start = i + 1;
        }
        i += 1;
    }
    best.map(|b| String::from_utf8_lossy(b).into_owned())
}
