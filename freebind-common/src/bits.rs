//! Bit-level helpers over network-order byte buffers.
//!
//! Bits are numbered most-significant-bit first, so bit 0 is the top bit of `buffer[0]`
//! and bit 8 is the top bit of `buffer[1]`, matching how prefix lengths count address bits.

/// The part of byte `index` which lies within the first `prefix_bits` bits of a buffer.
pub fn prefix_mask(index: usize, prefix_bits: usize) -> u8 {
    let start = index * 8;
    if prefix_bits >= start + 8 {
        0xFF
    } else if prefix_bits <= start {
        0
    } else {
        0xFF << (8 - (prefix_bits - start))
    }
}

/// Zero `count` bits of `buffer` starting at `start_bit`.
///
/// Bits past the end of the buffer are ignored.
pub fn clear_bits(buffer: &mut [u8], start_bit: usize, count: usize) {
    let end = start_bit.saturating_add(count).min(buffer.len() * 8);

    for bit in start_bit..end {
        buffer[bit / 8] &= !(0x80 >> (bit % 8));
    }
}

/// Overwrite the first `prefix_bits` bits of `dest` with those of `prefix`, keeping the rest of `dest`.
///
/// A direct bit-select, so it holds regardless of what `dest` contains in the prefix region.
/// Only the common length of both buffers is touched.
pub fn masked_merge(dest: &mut [u8], prefix: &[u8], prefix_bits: usize) {
    debug_assert_eq!(dest.len(), prefix.len());

    for (i, (out, network)) in dest.iter_mut().zip(prefix).enumerate() {
        let mask = prefix_mask(i, prefix_bits);
        *out = (network & mask) | (*out & !mask);
    }
}
