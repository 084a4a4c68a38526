//! Bounded chunk reader: turns a file into a stream of fixed-size buffers.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;

/// Produces a bounded stream of byte chunks from a file.
///
/// Each chunk is at most `chunk_size` bytes; only the last may be short.
/// Backpressure comes from the bounded queue of depth `queue_depth`.
pub struct ChunkReader {
    file: File,
    chunk_size: usize,
    queue_depth: usize,
}

impl ChunkReader {
    /// Open `path` for chunked reading.
    pub async fn open(path: &Path, chunk_size: usize, queue_depth: usize) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            file,
            chunk_size,
            queue_depth,
        })
    }

    /// Start the reading task and return the chunk stream.
    ///
    /// Read errors terminate the stream silently; the receiver detects a
    /// short transfer through the checksum mismatch.
    pub fn start(self) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(self.queue_depth.max(1));
        let chunk_size = self.chunk_size;
        let mut file = self.file;

        tokio::spawn(async move {
            loop {
                let mut buf = vec![0u8; chunk_size];
                let mut filled = 0;
                let mut eof = false;

                // Fill the whole chunk so chunk boundaries are deterministic.
                while filled < chunk_size {
                    match file.read(&mut buf[filled..]).await {
                        Ok(0) => {
                            eof = true;
                            break;
                        }
                        Ok(n) => filled += n,
                        Err(e) => {
                            debug!(error = %e, "file read failed, ending chunk stream");
                            eof = true;
                            break;
                        }
                    }
                }

                if filled > 0 {
                    buf.truncate(filled);
                    if tx.send(buf).await.is_err() {
                        return;
                    }
                }
                if eof {
                    return;
                }
            }
        });

        rx
    }
}
