//! Server-side writer pipeline: round-robin dispatch to decrypt/decompress
//! workers, reassembly muxer, and the file writer behind it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::error;

use fastcp_core::constants::{MAX_OOC, WORKER_INPUT_DEPTH};
use fastcp_core::crypto::Cipher;
use fastcp_core::error::{Error, Result};
use fastcp_core::file::decompress_chunk;

use crate::muxer::{self, DecodedChunk};

/// A chunk as received off the wire: possibly compressed, possibly
/// encrypted.
#[derive(Debug)]
pub struct UnprocessedChunk {
    pub seq: u32,
    pub compressed: bool,
    pub data: Vec<u8>,
}

/// The per-transfer pipeline: `W` decoder workers feeding the muxer, which
/// feeds the file writer. Lives from an accepted BEGIN until END or a fatal
/// chunk error.
pub struct WriterPipeline {
    inputs: Vec<mpsc::Sender<UnprocessedChunk>>,
    next: usize,
    completion: oneshot::Receiver<Vec<u8>>,
    failed: Arc<AtomicBool>,
}

impl WriterPipeline {
    /// Wire up the muxer and start `workers` decoder tasks in front of the
    /// writer `sink`.
    pub fn start(
        sink: mpsc::Sender<Vec<u8>>,
        completion: oneshot::Receiver<Vec<u8>>,
        workers: usize,
        cipher: Arc<Cipher>,
        max_chunk_bytes: usize,
    ) -> Self {
        let workers = workers.max(1);
        let failed = Arc::new(AtomicBool::new(false));
        let muxer_inputs = muxer::start(MAX_OOC, sink, workers);

        let mut inputs = Vec::with_capacity(workers);
        for muxer_tx in muxer_inputs {
            let (tx, rx) = mpsc::channel(WORKER_INPUT_DEPTH);
            inputs.push(tx);
            tokio::spawn(decode_worker(
                rx,
                muxer_tx,
                Arc::clone(&cipher),
                max_chunk_bytes,
                Arc::clone(&failed),
            ));
        }

        Self {
            inputs,
            next: 0,
            completion,
            failed,
        }
    }

    /// Hand a chunk to the next worker, round-robin by arrival.
    ///
    /// Blocks when the worker is saturated, which eventually stalls the TCP
    /// reader — the required backpressure.
    pub async fn dispatch(&mut self, chunk: UnprocessedChunk) -> Result<()> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(Error::protocol("chunk decoding failed"));
        }
        self.inputs[self.next]
            .send(chunk)
            .await
            .map_err(|_| Error::protocol("decoder worker is gone"))?;
        self.next = (self.next + 1) % self.inputs.len();
        Ok(())
    }

    /// Close all worker inputs and wait for the writer to flush; returns the
    /// final checksum bytes.
    pub async fn finish(self) -> Result<Vec<u8>> {
        drop(self.inputs);
        self.completion
            .await
            .map_err(|_| Error::protocol("writer ended without a checksum"))
    }
}

/// One decoder worker: decrypt, then decompress if flagged, then deliver to
/// the designated muxer input.
async fn decode_worker(
    mut rx: mpsc::Receiver<UnprocessedChunk>,
    out: mpsc::Sender<DecodedChunk>,
    cipher: Arc<Cipher>,
    max_chunk_bytes: usize,
    failed: Arc<AtomicBool>,
) {
    while let Some(chunk) = rx.recv().await {
        let data = cipher.decrypt(chunk.data);

        let raw = if chunk.compressed {
            match decompress_chunk(&data, max_chunk_bytes) {
                Ok(raw) => raw,
                Err(e) => {
                    error!(seq = chunk.seq, error = %e, "chunk decode failed, aborting transfer");
                    failed.store(true, Ordering::SeqCst);
                    break;
                }
            }
        } else {
            data
        };

        if out
            .send(DecodedChunk {
                seq: chunk.seq,
                data: raw,
            })
            .await
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastcp_core::file::compress_chunk;

    fn pipeline_with_sink(
        workers: usize,
        cipher: Cipher,
    ) -> (WriterPipeline, mpsc::Receiver<Vec<u8>>) {
        let (sink_tx, sink_rx) = mpsc::channel(64);
        let (done_tx, done_rx) = oneshot::channel();

        // Stand-in writer: forward chunks, emit an empty checksum at close.
        let (fwd_tx, mut fwd_rx) = mpsc::channel::<Vec<u8>>(64);
        tokio::spawn(async move {
            while let Some(chunk) = fwd_rx.recv().await {
                if sink_tx.send(chunk).await.is_err() {
                    return;
                }
            }
            let _ = done_tx.send(Vec::new());
        });

        let pipeline = WriterPipeline::start(
            fwd_tx,
            done_rx,
            workers,
            Arc::new(cipher),
            8 * 1024 * 1024,
        );
        (pipeline, sink_rx)
    }

    #[tokio::test]
    async fn decodes_and_reorders_chunks() {
        let (mut pipeline, mut sink) = pipeline_with_sink(2, Cipher::plaintext());

        for seq in 1..=6u32 {
            let (body, compressed) = compress_chunk(vec![seq as u8; 4096]);
            pipeline
                .dispatch(UnprocessedChunk {
                    seq,
                    compressed,
                    data: body,
                })
                .await
                .unwrap();
        }
        pipeline.finish().await.unwrap();

        let mut written = Vec::new();
        while let Some(chunk) = sink.recv().await {
            written.push(chunk);
        }

        assert_eq!(written.len(), 6);
        for (i, chunk) in written.iter().enumerate() {
            assert_eq!(chunk, &vec![(i + 1) as u8; 4096]);
        }
    }

    #[tokio::test]
    async fn encrypted_chunks_roundtrip() {
        let cipher = Cipher::with_key(b"0123456789abcdef", &[5u8; 16]);
        let (mut pipeline, mut sink) = pipeline_with_sink(2, cipher.clone());

        let (body, compressed) = compress_chunk(vec![0x42u8; 64 * 1024]);
        let wire_body = cipher.encrypt(body);
        pipeline
            .dispatch(UnprocessedChunk {
                seq: 1,
                compressed,
                data: wire_body,
            })
            .await
            .unwrap();
        pipeline.finish().await.unwrap();

        let written = sink.recv().await.unwrap();
        assert_eq!(written, vec![0x42u8; 64 * 1024]);
    }

    #[tokio::test]
    async fn corrupt_compressed_chunk_flags_failure() {
        let (mut pipeline, _sink) = pipeline_with_sink(1, Cipher::plaintext());

        pipeline
            .dispatch(UnprocessedChunk {
                seq: 1,
                compressed: true,
                data: vec![0xF7, 0xFF, 0xFF, 0x01],
            })
            .await
            .unwrap();

        // The worker fails asynchronously; dispatch rejects soon after.
        let mut refused = false;
        for seq in 2..50u32 {
            tokio::task::yield_now().await;
            let result = pipeline
                .dispatch(UnprocessedChunk {
                    seq,
                    compressed: false,
                    data: vec![0u8; 16],
                })
                .await;
            if result.is_err() {
                refused = true;
                break;
            }
        }
        assert!(refused, "pipeline never refused after decode failure");
    }
}
