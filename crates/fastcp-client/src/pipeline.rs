//! Client-side chunk pipeline: one producer tagging sequence numbers, `W`
//! compress/encrypt workers pulling competitively, per-worker framed output
//! channels for the single sender.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};

use fastcp_core::constants::WORKER_OUTPUT_DEPTH;
use fastcp_core::crypto::Cipher;
use fastcp_core::file::compress_chunk;
use fastcp_core::protocol::{DataStreamChunk, Opcode, Packet, encode_packet};

/// A raw chunk tagged with its sequence number by the producer.
struct TaggedChunk {
    seq: u32,
    data: Vec<u8>,
}

/// Transfer statistics, updated by workers off the data path.
#[derive(Debug, Default)]
pub struct ChunkStats {
    chunks_total: AtomicU32,
    chunks_compressed: AtomicU32,
    bytes_raw: AtomicU64,
    bytes_processed: AtomicU64,
}

/// Point-in-time copy of [`ChunkStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub chunks_total: u32,
    pub chunks_compressed: u32,
    pub bytes_raw: u64,
    pub bytes_processed: u64,
}

impl ChunkStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_total: self.chunks_total.load(Ordering::Relaxed),
            chunks_compressed: self.chunks_compressed.load(Ordering::Relaxed),
            bytes_raw: self.bytes_raw.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Size summary for the end-of-transfer log line.
    pub fn summary(&self) -> String {
        format!(
            "original size: {}, processed size: {}",
            format_size(self.bytes_raw),
            format_size(self.bytes_processed)
        )
    }
}

/// Human-readable size.
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1 << 10;
    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;

    if size > GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size > MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size > KB {
        format!("{:.2} kB", size as f64 / KB as f64)
    } else {
        format!("{size} B")
    }
}

/// The producer/worker half of the upload pipeline.
///
/// `start` wires: file chunks -> producer (sequence tagging) -> shared work
/// queue -> `W` workers (compress, encrypt, frame) -> per-worker output
/// channels. The caller drains the outputs with the single sender.
pub struct SendPipeline {
    stats: Arc<ChunkStats>,
}

impl SendPipeline {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(ChunkStats::default()),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawn the producer and `workers` worker tasks over the chunk stream.
    ///
    /// Returns one framed-output receiver per worker. Sequence numbers start
    /// at 1 and are assigned in producer order; the wire order across workers
    /// is unconstrained.
    pub fn start(
        &self,
        mut chunks: mpsc::Receiver<Vec<u8>>,
        workers: usize,
        cipher: Arc<Cipher>,
    ) -> Vec<mpsc::Receiver<Vec<u8>>> {
        let workers = workers.max(1);
        let (work_tx, work_rx) = mpsc::channel::<TaggedChunk>(workers);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let mut outputs = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(WORKER_OUTPUT_DEPTH);
            outputs.push(out_rx);

            let work_rx = Arc::clone(&work_rx);
            let cipher = Arc::clone(&cipher);
            let stats = Arc::clone(&self.stats);

            tokio::spawn(async move {
                loop {
                    let chunk = {
                        let mut rx = work_rx.lock().await;
                        rx.recv().await
                    };
                    let Some(chunk) = chunk else { break };

                    let framed = process_chunk(chunk, &cipher, &stats);
                    if out_tx.send(framed).await.is_err() {
                        break;
                    }
                }
            });
        }

        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let mut seq: u32 = 1;
            while let Some(data) = chunks.recv().await {
                stats.chunks_total.fetch_add(1, Ordering::Relaxed);
                if work_tx.send(TaggedChunk { seq, data }).await.is_err() {
                    break;
                }
                seq += 1;
            }
        });

        outputs
    }
}

impl Default for SendPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Compress, encrypt, and frame one chunk: NEXTCHUNK frame with the
/// encrypted 10-byte chunk header as payload, body appended raw.
fn process_chunk(chunk: TaggedChunk, cipher: &Cipher, stats: &ChunkStats) -> Vec<u8> {
    stats
        .bytes_raw
        .fetch_add(chunk.data.len() as u64, Ordering::Relaxed);

    let (processed, compressed) = compress_chunk(chunk.data);
    stats
        .bytes_processed
        .fetch_add(processed.len() as u64, Ordering::Relaxed);
    if compressed {
        stats.chunks_compressed.fetch_add(1, Ordering::Relaxed);
    }

    let body = cipher.encrypt(processed);

    let header = DataStreamChunk {
        sequence: chunk.seq,
        compression: compressed as u16,
        data_length: body.len() as u32,
    };
    let payload = cipher.encrypt(header.encode());
    let packet = Packet::with_payload(Opcode::NextChunk, 0, payload);

    // Frame encoding only fails above MAX_PAYLOAD; the 10-byte chunk header
    // is nowhere near it.
    let mut framed = encode_packet(&packet)
        .expect("chunk header exceeds frame limit")
        .to_vec();
    framed.extend_from_slice(&body);
    framed
}

#[cfg(test)]
mod tests {
    use super::*;
    use fastcp_core::file::decompress_chunk;
    use fastcp_core::protocol::read_packet;

    async fn feed(chunks: Vec<Vec<u8>>) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for c in chunks {
            tx.send(c).await.unwrap();
        }
        rx
    }

    async fn drain_all(mut outputs: Vec<mpsc::Receiver<Vec<u8>>>) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for rx in outputs.iter_mut() {
            while let Some(frame) = rx.recv().await {
                frames.push(frame);
            }
        }
        frames
    }

    async fn decode_frame(frame: &[u8], cipher: &Cipher) -> (DataStreamChunk, Vec<u8>) {
        let mut reader = frame;
        let packet = read_packet(&mut reader).await.unwrap();
        assert_eq!(packet.opcode, Opcode::NextChunk as u8);

        let header = DataStreamChunk::decode(&cipher.decrypt(packet.payload)).unwrap();
        assert_eq!(reader.len(), header.data_length as usize);
        (header, cipher.decrypt(reader.to_vec()))
    }

    #[tokio::test]
    async fn sequences_start_at_one_and_cover_all_chunks() {
        let pipeline = SendPipeline::new();
        let chunks: Vec<Vec<u8>> = (0..8).map(|i| vec![i as u8; 1024]).collect();
        let rx = feed(chunks).await;

        let outputs = pipeline.start(rx, 4, Arc::new(Cipher::plaintext()));
        let frames = drain_all(outputs).await;
        assert_eq!(frames.len(), 8);

        let cipher = Cipher::plaintext();
        let mut seqs = Vec::new();
        for frame in &frames {
            let (header, _) = decode_frame(frame, &cipher).await;
            seqs.push(header.sequence);
        }
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=8).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn compressible_chunks_are_flagged_and_roundtrip() {
        let pipeline = SendPipeline::new();
        let rx = feed(vec![vec![0x42u8; 64 * 1024]]).await;

        let outputs = pipeline.start(rx, 1, Arc::new(Cipher::plaintext()));
        let frames = drain_all(outputs).await;
        assert_eq!(frames.len(), 1);

        let cipher = Cipher::plaintext();
        let (header, body) = decode_frame(&frames[0], &cipher).await;
        assert_eq!(header.compression, 1);
        assert!(body.len() < 64 * 1024);

        let restored = decompress_chunk(&body, 8 * 1024 * 1024).unwrap();
        assert_eq!(restored, vec![0x42u8; 64 * 1024]);

        let stats = pipeline.stats();
        assert_eq!(stats.chunks_total, 1);
        assert_eq!(stats.chunks_compressed, 1);
        assert_eq!(stats.bytes_raw, 64 * 1024);
        assert!(stats.bytes_processed < stats.bytes_raw);
    }

    #[tokio::test]
    async fn encrypted_bodies_decrypt_with_same_cipher() {
        let cipher = Arc::new(Cipher::with_key(b"0123456789abcdef", &[3u8; 16]));
        let pipeline = SendPipeline::new();
        let rx = feed(vec![vec![0x11u8; 2048]]).await;

        let outputs = pipeline.start(rx, 2, Arc::clone(&cipher));
        let frames = drain_all(outputs).await;
        assert_eq!(frames.len(), 1);

        let (header, body) = decode_frame(&frames[0], &cipher).await;
        assert_eq!(header.sequence, 1);
        if header.compression == 1 {
            let restored = decompress_chunk(&body, 8 * 1024 * 1024).unwrap();
            assert_eq!(restored, vec![0x11u8; 2048]);
        } else {
            assert_eq!(body, vec![0x11u8; 2048]);
        }
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 kB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.00 GB");
    }
}
