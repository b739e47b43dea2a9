//! Payload masking (RFC 6455 Section 5.3).

use crate::error::Result;

/// Generate a fresh masking key from the operating system's CSPRNG.
///
/// # Errors
///
/// Returns [`Error::Random`](crate::Error::Random) if the random source is
/// unavailable.
pub fn generate_mask() -> Result<[u8; 4]> {
    let mut key = [0u8; 4];
    getrandom::getrandom(&mut key)?;
    Ok(key)
}

/// Scalar byte-by-byte XOR masking.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time XOR masking.
///
/// Produces the same output as [`apply_mask`]; processes 8 bytes per step
/// and finishes the tail bytewise.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let wide = u64::from_ne_bytes([
        mask[0], mask[1], mask[2], mask[3], mask[0], mask[1], mask[2], mask[3],
    ]);

    let mut chunks = data.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        let masked = (u64::from_ne_bytes(word) ^ wide).to_ne_bytes();
        chunk.copy_from_slice(&masked);
    }

    // Each full chunk is a multiple of 4 bytes, so the tail starts at key index 0.
    apply_mask(chunks.into_remainder(), mask);
}
