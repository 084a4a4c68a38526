//! Bounded chunk writer: consumes ordered buffers, writes them to disk, and
//! maintains the running checksum.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tracing::error;

use crate::error::Result;
use crate::file::checksum::RunningChecksum;

/// Consumes byte chunks in arrival order and writes them to a file.
///
/// The writer task is the sole owner of the file handle. Closing the input
/// sink flushes, closes the file, and emits the final checksum on the
/// completion channel.
pub struct ChunkWriter {
    file: BufWriter<File>,
    queue_depth: usize,
    checksum: RunningChecksum,
}

impl ChunkWriter {
    /// Create `path` for chunked writing.
    pub async fn create(
        path: &Path,
        buffer_size: usize,
        queue_depth: usize,
        use_sha: bool,
    ) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self {
            file: BufWriter::with_capacity(buffer_size.max(1), file),
            queue_depth,
            checksum: RunningChecksum::new(use_sha),
        })
    }

    /// Start the writer task. Returns the bounded input sink and the
    /// completion channel carrying the final checksum bytes.
    pub fn start(self) -> (mpsc::Sender<Vec<u8>>, oneshot::Receiver<Vec<u8>>) {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(self.queue_depth.max(1));
        let (done_tx, done_rx) = oneshot::channel();

        let mut file = self.file;
        let mut checksum = self.checksum;

        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if let Err(e) = file.write_all(&chunk).await {
                    // Keep consuming so upstream does not wedge; the final
                    // checksum will expose the failure.
                    error!(error = %e, "file write failed");
                    break;
                }
                checksum.update(&chunk);
            }

            if let Err(e) = file.flush().await {
                error!(error = %e, "file flush failed");
            }

            let _ = done_tx.send(checksum.finalize());
        });

        (tx, done_rx)
    }
}
