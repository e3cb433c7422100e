//! CRC-32 integrity suffix.
//!
//! Every framed message ends with a 4-byte big-endian CRC-32 computed over
//! the init header and the payload up to (but not including) the checksum
//! itself. A mismatch drops the frame without any further state change.

/// Length of the checksum suffix on every framed message.
pub const CHECKSUM_LEN: usize = 4;

/// Compute the checksum of a contiguous byte string.
pub fn compute(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    crc32fast::hash(data).to_be_bytes()
}

/// Compute the checksum over several parts without concatenating them.
/// Used for `header ∥ payload` where the two live in separate buffers.
pub fn compute_parts(parts: &[&[u8]]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = crc32fast::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_be_bytes()
}

/// Constant-pattern check used on receive. `expected` is the 4-byte suffix
/// taken from the wire; `data` is everything it covers.
pub fn is_valid(expected: &[u8], data: &[u8]) -> bool {
    expected == compute(data)
}
