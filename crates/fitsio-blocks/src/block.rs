//! FITS logical record framing.
//!
//! Every header and data unit in a FITS file occupies a whole number of
//! 2880-byte records. Header records are padded with ASCII spaces, data
//! records with zeros.

use std::io::Write;

/// FITS block size in bytes (each logical record is one block).
pub const BLOCK_SIZE: usize = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards that fit in a single block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Padding byte used for header blocks (ASCII space).
pub const HEADER_PAD_BYTE: u8 = 0x20;

/// Padding byte used for data blocks (zero).
pub const DATA_PAD_BYTE: u8 = 0x00;

/// Returns the number of FITS blocks required to hold `num_bytes` bytes.
///
/// 0 bytes requires 0 blocks, 1 byte requires 1 block, 2880 bytes requires
/// 1 block, 2881 bytes requires 2 blocks.
pub const fn blocks_needed(num_bytes: u64) -> u64 {
    num_bytes.div_ceil(BLOCK_SIZE as u64)
}

/// Returns the total byte length (in whole blocks) required to hold `num_bytes`.
pub const fn padded_byte_len(num_bytes: u64) -> u64 {
    blocks_needed(num_bytes) * BLOCK_SIZE as u64
}

/// Like [`padded_byte_len`], but `None` when the padded length overflows.
pub const fn checked_padded_byte_len(num_bytes: u64) -> Option<u64> {
    blocks_needed(num_bytes).checked_mul(BLOCK_SIZE as u64)
}

/// Number of padding bytes that follow `num_bytes` of content to reach the
/// next block boundary.
pub const fn padding_len(num_bytes: u64) -> u64 {
    padded_byte_len(num_bytes) - num_bytes
}

/// Writes the padding that completes the final block after `num_bytes` of
/// content have been written to `dest`.
pub fn write_padding<W: Write + ?Sized>(
    dest: &mut W,
    num_bytes: u64,
    pad_byte: u8,
) -> std::io::Result<()> {
    let pad = padding_len(num_bytes) as usize;
    if pad > 0 {
        dest.write_all(&[pad_byte; BLOCK_SIZE][..pad])?;
    }
    Ok(())
}
