//! Single-file transfer flow: checksum, BEGIN, chunk stream, END.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use fastcp_core::crypto::Cipher;
use fastcp_core::error::{Error, Result};
use fastcp_core::file::{ChecksumKind, IoFactory, checksum_file};

use crate::connection::{BeginResponse, Connection};
use crate::pipeline::{SendPipeline, StatsSnapshot};

/// How a single file transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All chunks were streamed and acknowledged.
    Sent(StatsSnapshot),
    /// The server already holds an identical file.
    Skipped,
}

/// Send one file over an authenticated connection.
///
/// The session stays usable afterwards; recursive transfers call this once
/// per file.
pub async fn transfer_file<F: IoFactory>(
    conn: &mut Connection,
    factory: &F,
    cipher: Arc<Cipher>,
    path: &Path,
    name: &str,
    chunk_size: usize,
    workers: usize,
    kind: ChecksumKind,
) -> Result<TransferOutcome> {
    let chunks = factory.open_reader(path, chunk_size, workers).await?;
    let hash = checksum_file(path, kind)?;

    info!(
        file = %path.display(),
        checksum = %hex::encode(&hash),
        "requesting transfer"
    );

    match conn.begin_transfer(name, &hash, kind).await? {
        BeginResponse::Accepted => {}
        BeginResponse::AlreadyPresent => {
            info!(file = %path.display(), "identical file already on server, skipping");
            return Ok(TransferOutcome::Skipped);
        }
        BeginResponse::Busy => return Err(Error::TransferBusy),
        BeginResponse::Rejected(flags) => {
            return Err(Error::protocol(format!(
                "server refused transfer (flags={flags})"
            )));
        }
    }

    let begin = Instant::now();
    let pipeline = SendPipeline::new();
    let outputs = pipeline.start(chunks, workers, cipher);
    conn.stream_chunks(outputs).await?;

    let stats = pipeline.stats();
    info!(
        elapsed_ms = begin.elapsed().as_millis() as u64,
        compressed = stats.chunks_compressed,
        total = stats.chunks_total,
        sizes = %stats.summary(),
        "sent all chunks, waiting for server to confirm"
    );

    let ack = conn.end_transfer(&hash, kind).await?;
    if ack {
        info!(file = %path.display(), "server confirmed file is in sync");
    } else if kind.is_enabled() {
        return Err(Error::ChecksumMismatch);
    } else {
        warn!("checksum verification omitted; file integrity unknown");
    }

    Ok(TransferOutcome::Sent(stats))
}
