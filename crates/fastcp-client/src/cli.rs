//! Client CLI implementation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use fastcp_core::constants::{
    DEFAULT_CHUNK_SIZE_KIB, DEFAULT_DSCP, DEFAULT_NUM_WORKERS, DEFAULT_PORT, KEY_LENGTHS,
    MAX_CHUNK_SIZE_KIB, MIN_CHUNK_SIZE_KIB,
};
use fastcp_core::error::{Error, Result};
use fastcp_core::file::ChecksumKind;
use tracing::warn;

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for fastcp_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => fastcp_core::LogFormat::Text,
            CliLogFormat::Json => fastcp_core::LogFormat::Json,
        }
    }
}

/// fastcp client - parallel chunked file uploads over TCP.
#[derive(Debug, Parser)]
#[command(name = "fastcp", version, about = "fastcp - parallel file transfer client")]
pub struct Cli {
    /// Target host address
    #[arg(short = 'a', long = "address")]
    pub address: String,

    /// Target port
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// File to send
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Recursively send all files under the given path
    #[arg(short = 'r', long = "recursive", conflicts_with = "file")]
    pub recursive: Option<PathBuf>,

    /// File I/O chunk size in KiB (64-8192)
    #[arg(short = 'c', long = "chunksize", default_value_t = DEFAULT_CHUNK_SIZE_KIB)]
    pub chunk_size: usize,

    /// Encryption key (16 or 32 characters). Enables AES-128 or AES-256
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,

    /// Omit checksum calculation
    #[arg(short = 'o', long = "omit")]
    pub omit: bool,

    /// Use SHA-256 checksum instead of CRC32
    #[arg(short = 's', long = "sha")]
    pub sha: bool,

    /// Number of compression (and encryption) worker tasks
    #[arg(short = 't', long = "threads", default_value_t = DEFAULT_NUM_WORKERS * 2)]
    pub workers: usize,

    /// DSCP field for QoS
    #[arg(short = 'd', long = "dscp", default_value_t = DEFAULT_DSCP)]
    pub dscp: u32,

    /// Enable Multipath TCP
    #[arg(short = 'm', long = "mptcp")]
    pub mptcp: bool,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Reject configurations the protocol cannot serve, before connecting.
    pub fn validate(&self) -> Result<()> {
        if let Some(key) = &self.key {
            if !KEY_LENGTHS.contains(&key.len()) {
                return Err(Error::config("key length must be 16 or 32 bytes"));
            }
        }
        if self.file.is_none() && self.recursive.is_none() {
            return Err(Error::config(
                "nothing to do: use -f or -r to provide a file or folder",
            ));
        }
        if self.workers == 0 {
            return Err(Error::config("worker count must be at least 1"));
        }
        Ok(())
    }

    /// Chunk size in bytes, clamped into the protocol's 64-8192 KiB range.
    pub fn effective_chunk_size(&self) -> usize {
        let kib = if self.chunk_size > MAX_CHUNK_SIZE_KIB {
            warn!(
                requested = self.chunk_size,
                "chunk size above maximum, using {MAX_CHUNK_SIZE_KIB} KiB"
            );
            MAX_CHUNK_SIZE_KIB
        } else if self.chunk_size < MIN_CHUNK_SIZE_KIB {
            warn!(
                requested = self.chunk_size,
                "chunk size below minimum, using {MIN_CHUNK_SIZE_KIB} KiB"
            );
            MIN_CHUNK_SIZE_KIB
        } else {
            self.chunk_size
        };
        kib * 1024
    }

    /// Which checksum the transfer uses.
    pub fn checksum_kind(&self) -> ChecksumKind {
        if self.omit {
            ChecksumKind::None
        } else if self.sha {
            ChecksumKind::Sha256
        } else {
            ChecksumKind::Crc32
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
