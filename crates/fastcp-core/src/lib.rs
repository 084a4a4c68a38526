//! fastcp-core: shared library for the fastcp parallel file-transfer
//! protocol.
//!
//! This crate provides:
//! - Wire protocol definitions and frame codec
//! - AES-CTR session cipher
//! - LZ4 chunk compression and CRC32/SHA-256 checksums
//! - Bounded chunk reader/writer over tokio files
//! - Logging setup shared by both binaries

pub mod constants;
pub mod crypto;
pub mod error;
pub mod file;
pub mod logging;
pub mod protocol;

pub use error::{Error, Result};
pub use logging::{LogFormat, init_logging};
