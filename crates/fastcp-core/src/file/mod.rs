//! Chunked file I/O for fastcp.
//!
//! This module provides:
//! - LZ4 chunk compression with raw fallback
//! - CRC32/SHA-256 whole-file and incremental checksums
//! - Bounded chunk reader/writer tasks over tokio files
//! - The `IoFactory` capability set for test substitution

pub mod checksum;
pub mod compress;
pub mod reader;
pub mod writer;

pub use checksum::{ChecksumKind, RunningChecksum, checksum_file, file_crc32, file_sha256};
pub use compress::{compress_chunk, decompress_chunk};
pub use reader::ChunkReader;
pub use writer::ChunkWriter;

use std::future::Future;
use std::path::Path;

use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

/// Capability set over file I/O, retained so pipelines can run against
/// in-memory substitutes in tests.
pub trait IoFactory: Send + Sync {
    /// Open `path` and return a bounded stream of chunks of at most
    /// `chunk_size` bytes; the last chunk may be short.
    fn open_reader(
        &self,
        path: &Path,
        chunk_size: usize,
        queue_depth: usize,
    ) -> impl Future<Output = Result<mpsc::Receiver<Vec<u8>>>> + Send;

    /// Create `path` and return a bounded sink of chunks plus a single-shot
    /// receiver that yields the final checksum once the sink closes.
    fn open_writer(
        &self,
        path: &Path,
        buffer_size: usize,
        queue_depth: usize,
        use_sha: bool,
    ) -> impl Future<Output = Result<(mpsc::Sender<Vec<u8>>, oneshot::Receiver<Vec<u8>>)>> + Send;
}

/// Default factory over buffered tokio files.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferedIo;

impl IoFactory for BufferedIo {
    async fn open_reader(
        &self,
        path: &Path,
        chunk_size: usize,
        queue_depth: usize,
    ) -> Result<mpsc::Receiver<Vec<u8>>> {
        let reader = ChunkReader::open(path, chunk_size, queue_depth).await?;
        Ok(reader.start())
    }

    async fn open_writer(
        &self,
        path: &Path,
        buffer_size: usize,
        queue_depth: usize,
        use_sha: bool,
    ) -> Result<(mpsc::Sender<Vec<u8>>, oneshot::Receiver<Vec<u8>>)> {
        let writer = ChunkWriter::create(path, buffer_size, queue_depth, use_sha).await?;
        Ok(writer.start())
    }
}
