//! LZ4 block compression for chunks, with raw fallback.

use crate::error::{Error, Result};

/// Attempt to compress a chunk.
///
/// Returns `(compressed, true)` when LZ4 shrank the block, or the original
/// chunk and `false` when it was incompressible.
pub fn compress_chunk(chunk: Vec<u8>) -> (Vec<u8>, bool) {
    let compressed = lz4_flex::block::compress(&chunk);
    if compressed.is_empty() || compressed.len() >= chunk.len() {
        (chunk, false)
    } else {
        (compressed, true)
    }
}

/// Decompress a chunk, refusing outputs larger than `max_size`.
///
/// An oversize or corrupt block is a protocol violation; the caller must
/// abort the transfer rather than crash.
pub fn decompress_chunk(chunk: &[u8], max_size: usize) -> Result<Vec<u8>> {
    let mut output = vec![0u8; max_size];
    let written = lz4_flex::block::decompress_into(chunk, &mut output)
        .map_err(|e| Error::protocol(format!("chunk decompression failed: {e}")))?;
    output.truncate(written);
    Ok(output)
}
