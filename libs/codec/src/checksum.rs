//! CRC-32C Checksum Validation
//!
//! The checksum travels as its own line: 32 ASCII `0`/`1` characters, most
//! significant bit first. Verification recomputes the CRC over the payload,
//! XORs it with the received value and accepts only an all-zero result.

use crate::constants::CHECKSUM_BITS;
use crate::error::{ProtocolError, ProtocolResult};

/// Calculate the CRC-32C (Castagnoli) checksum of a payload
pub fn compute_checksum(payload: &[u8]) -> u32 {
    crc32c::crc32c(payload)
}

/// Render a checksum as its fixed-width bit string
pub fn encode_checksum_field(checksum: u32) -> String {
    format!("{:0width$b}", checksum, width = CHECKSUM_BITS)
}

/// Parse a received checksum field
///
/// NUL bytes left over from fixed-size sender buffers, a trailing `\r` and
/// surrounding whitespace are ignored. Anything else that is not exactly 32
/// binary digits is rejected.
pub fn parse_checksum_field(field: &str) -> ProtocolResult<u32> {
    let cleaned = field.trim_matches(|c: char| c == '\0' || c.is_whitespace());

    if cleaned.len() != CHECKSUM_BITS {
        return Err(ProtocolError::malformed_checksum(
            cleaned,
            format!("expected {} bits, got {} characters", CHECKSUM_BITS, cleaned.len()),
        ));
    }

    if let Some(bad) = cleaned.chars().find(|c| *c != '0' && *c != '1') {
        return Err(ProtocolError::malformed_checksum(
            cleaned,
            format!("non-binary character {:?}", bad),
        ));
    }

    u32::from_str_radix(cleaned, 2)
        .map_err(|e| ProtocolError::malformed_checksum(cleaned, e.to_string()))
}

/// Verify a payload against a received checksum field
///
/// Returns the verified checksum value. Malformed fields and mismatches are
/// distinct errors so callers can log them apart.
pub fn check(payload: &[u8], field: &str) -> ProtocolResult<u32> {
    let received = parse_checksum_field(field)?;
    let calculated = compute_checksum(payload);

    if calculated ^ received != 0 {
        return Err(ProtocolError::checksum_mismatch(
            received,
            calculated,
            payload.len(),
        ));
    }

    Ok(received)
}

/// Verify a payload against a received checksum field, failing closed
pub fn verify(payload: &[u8], field: &str) -> bool {
    check(payload, field).is_ok()
}
