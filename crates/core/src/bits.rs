// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Mask with the low `width` bits set. Widths of 64 and above saturate.
pub fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Mask covering the low `bytes` bytes.
pub fn byte_mask(bytes: u32) -> u64 {
    mask(bytes * 8)
}

/// Returns `(first_set_bit, bit_count)` when `bits` is a single run of set bits.
pub fn contiguous_run(bits: u64) -> Option<(u32, u32)> {
    if bits == 0 {
        return None;
    }
    let start = bits.trailing_zeros();
    let count = bits.count_ones();
    if (bits >> start) == mask(count) {
        Some((start, count))
    } else {
        None
    }
}
