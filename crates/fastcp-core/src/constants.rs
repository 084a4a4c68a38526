//! Protocol and configuration constants for fastcp.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// Length of the fixed frame header (opcode, flags, len).
pub const HEADER_LEN: usize = 4;

/// Maximum payload bytes in a single frame (`len` is u16 and counts the
/// 4-byte header).
pub const MAX_PAYLOAD: usize = 65_527;

/// Session nonce length in bytes (one AES block).
pub const NONCE_LEN: usize = 16;

/// Checksum field length on the wire. CRC32 occupies the first 4 bytes
/// big-endian; SHA-256 uses all 32.
pub const CHECKSUM_LEN: usize = 32;

/// PAX extended attribute carrying the hex-encoded whole-file checksum.
pub const PAX_CHECKSUM_KEY: &str = "chkSum";

/// Maximum buffered out-of-order chunks at the server muxer.
pub const MAX_OOC: usize = 256;

// =============================================================================
// Chunk Sizing
// =============================================================================

/// Default file I/O chunk size in KiB.
pub const DEFAULT_CHUNK_SIZE_KIB: usize = 256;

/// Minimum client chunk size in KiB.
pub const MIN_CHUNK_SIZE_KIB: usize = 64;

/// Maximum client chunk size in KiB. Also bounds the decompressed size a
/// receiver will accept.
pub const MAX_CHUNK_SIZE_KIB: usize = 8192;

/// Read buffer size for whole-file checksum computation.
pub const CHECKSUM_READ_BUF: usize = 64 * 1024;

// =============================================================================
// Pipeline Constants
// =============================================================================

/// Default number of compression/decompression workers.
pub const DEFAULT_NUM_WORKERS: usize = 2;

/// Default server write-queue depth (chunks buffered before file writes
/// block).
pub const DEFAULT_WRITE_QUEUE: usize = 10;

/// Depth of each client worker's framed-output channel.
pub const WORKER_OUTPUT_DEPTH: usize = 3;

/// Depth of each server decoder worker's input channel.
pub const WORKER_INPUT_DEPTH: usize = 2;

/// Depth of each muxer input channel.
pub const MUXER_INPUT_DEPTH: usize = 3;

/// How long the client sender idles before sleeping, and how long it sleeps.
pub const SENDER_IDLE: Duration = Duration::from_millis(10);

// =============================================================================
// Networking Defaults
// =============================================================================

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 6969;

/// Default DSCP value for high-throughput QoS.
pub const DEFAULT_DSCP: u32 = 0x0A;

/// Deadline for reading the trailing authentication block.
pub const AUTH_BLOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Accepted pre-shared key lengths (AES-128 / AES-256).
pub const KEY_LENGTHS: [usize; 2] = [16, 32];
