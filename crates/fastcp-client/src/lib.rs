//! fastcp-client: client library for fastcp uploads.
//!
//! Provides:
//! - CLI argument parsing
//! - Connection and session handling (EHLO, handshake, begin/end)
//! - The parallel compress/encrypt pipeline and single-sender chunk stream
//! - Recursive file-tree enumeration

pub mod cli;
pub mod connection;
pub mod pipeline;
pub mod transfer;
pub mod walk;

pub use cli::Cli;
pub use connection::{BeginResponse, Connection};
pub use pipeline::{ChunkStats, SendPipeline, StatsSnapshot, format_size};
pub use transfer::{TransferOutcome, transfer_file};
pub use walk::collect_files;
