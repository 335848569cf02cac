//! Satellite payload compression
//!
//! Each payload carries a one-byte header:
//! ```text
//! 0x00 | raw bytes
//! 0x4C | original length (u16 LE) | LZ4 block
//! ```
//! Compression is skipped below [`MIN_SIZE`] and when the LZ4 output is not
//! at least 10% smaller than the input.

use crate::config::compression::{MAX_INPUT, MIN_SIZE, RATIO_GATE};
use heapless::Vec;

pub const HEADER_RAW: u8 = 0x00;
pub const HEADER_LZ4: u8 = 0x4C;

/// Header length of a compressed payload
const LZ4_HEADER_LEN: usize = 3;

/// Scratch space for the worst-case LZ4 output of [`MAX_INPUT`] bytes
const SCRATCH_LEN: usize = MAX_INPUT + MAX_INPUT / 8 + 32;

/// Errors from payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressError {
    /// Input exceeds the compressor's limit
    InputTooLarge,
    /// Encoded payload does not fit the output buffer
    BufferTooSmall,
    /// Unknown header byte
    InvalidHeader,
    /// LZ4 block failed to decode or length mismatch
    Corrupt,
}

/// Compression counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressStats {
    pub compressed: u32,
    pub skipped_threshold: u32,
    pub skipped_ratio: u32,
    pub bytes_in: u32,
    pub bytes_out: u32,
}

/// Payload compressor with running statistics
#[derive(Debug, Default)]
pub struct Compressor {
    stats: CompressStats,
}

impl Compressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &CompressStats {
        &self.stats
    }

    /// Encode `input` with a header, compressing when it pays off
    pub fn encode<const N: usize>(&mut self, input: &[u8]) -> Result<Vec<u8, N>, CompressError> {
        if input.len() > MAX_INPUT {
            return Err(CompressError::InputTooLarge);
        }

        if input.len() < MIN_SIZE {
            self.stats.skipped_threshold += 1;
            return raw(input);
        }

        let mut scratch = [0u8; SCRATCH_LEN];
        let compressed_len = if lz4_flex::block::get_maximum_output_size(input.len()) <= SCRATCH_LEN
        {
            lz4_flex::block::compress_into(input, &mut scratch).ok()
        } else {
            None
        };

        let Some(compressed_len) = compressed_len else {
            self.stats.skipped_ratio += 1;
            return raw(input);
        };

        let encoded_len = compressed_len + LZ4_HEADER_LEN;
        if encoded_len as f32 > input.len() as f32 * RATIO_GATE {
            self.stats.skipped_ratio += 1;
            return raw(input);
        }

        let mut out = Vec::new();
        out.push(HEADER_LZ4)
            .map_err(|_| CompressError::BufferTooSmall)?;
        out.extend_from_slice(&(input.len() as u16).to_le_bytes())
            .map_err(|_| CompressError::BufferTooSmall)?;
        out.extend_from_slice(&scratch[..compressed_len])
            .map_err(|_| CompressError::BufferTooSmall)?;

        self.stats.compressed += 1;
        self.stats.bytes_in += input.len() as u32;
        self.stats.bytes_out += out.len() as u32;
        log::debug!(
            "compress: {} -> {} bytes",
            input.len(),
            out.len()
        );
        Ok(out)
    }
}

fn raw<const N: usize>(input: &[u8]) -> Result<Vec<u8, N>, CompressError> {
    let mut out = Vec::new();
    out.push(HEADER_RAW)
        .map_err(|_| CompressError::BufferTooSmall)?;
    out.extend_from_slice(input)
        .map_err(|_| CompressError::BufferTooSmall)?;
    Ok(out)
}

/// Decode a headered payload
pub fn decode<const N: usize>(encoded: &[u8]) -> Result<Vec<u8, N>, CompressError> {
    let (&header, body) = encoded.split_first().ok_or(CompressError::InvalidHeader)?;

    match header {
        HEADER_RAW => Vec::from_slice(body).map_err(|_| CompressError::BufferTooSmall),
        HEADER_LZ4 => {
            if body.len() < 2 {
                return Err(CompressError::Corrupt);
            }
            let original_len = u16::from_le_bytes([body[0], body[1]]) as usize;
            if original_len > N {
                return Err(CompressError::BufferTooSmall);
            }

            let mut out: Vec<u8, N> = Vec::new();
            out.resize_default(original_len)
                .map_err(|_| CompressError::BufferTooSmall)?;
            let written = lz4_flex::block::decompress_into(&body[2..], &mut out)
                .map_err(|_| CompressError::Corrupt)?;
            if written != original_len {
                return Err(CompressError::Corrupt);
            }
            Ok(out)
        }
        _ => Err(CompressError::InvalidHeader),
    }
}
