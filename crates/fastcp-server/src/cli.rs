//! Server CLI implementation.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use fastcp_core::constants::{
    DEFAULT_CHUNK_SIZE_KIB, DEFAULT_NUM_WORKERS, DEFAULT_PORT, DEFAULT_WRITE_QUEUE, KEY_LENGTHS,
};
use fastcp_core::error::{Error, Result};

use crate::session::SessionConfig;

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

/// fastcp server - receives parallel chunked file uploads.
#[derive(Debug, Parser)]
#[command(
    name = "fastcp-server",
    version,
    about = "fastcp server - receives parallel chunked file uploads"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(short = 'l', long = "listen", default_value = "0.0.0.0")]
    pub listen: IpAddr,

    /// Listening port
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Root path for storing received files
    #[arg(short = 'r', long = "root")]
    pub root: PathBuf,

    /// File write chunk size in KiB
    #[arg(short = 'c', long = "chunksize", default_value_t = DEFAULT_CHUNK_SIZE_KIB)]
    pub chunk_size: usize,

    /// Write queue length in chunks
    #[arg(short = 'q', long = "queue", default_value_t = DEFAULT_WRITE_QUEUE)]
    pub queue: usize,

    /// Number of decompression (and decryption) worker tasks
    #[arg(short = 't', long = "threads", default_value_t = DEFAULT_NUM_WORKERS)]
    pub workers: usize,

    /// Encryption key (16 or 32 characters). Enables AES-128 or AES-256
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,

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
    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if let Some(key) = &self.key {
            if !KEY_LENGTHS.contains(&key.len()) {
                return Err(Error::config("key length must be 16 or 32 bytes"));
            }
        }
        if self.workers == 0 {
            return Err(Error::config("worker count must be at least 1"));
        }
        if self.queue == 0 {
            return Err(Error::config("write queue length must be at least 1"));
        }
        Ok(())
    }

    /// The socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.port)
    }

    /// Session configuration derived from the CLI.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            root: self.root.clone(),
            key: self.key.clone(),
            chunk_size: self.chunk_size * 1024,
            workers: self.workers,
            write_queue: self.queue,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_values() {
        let cli = Cli::try_parse_from(["fastcp-server", "-r", "/tmp"]).unwrap();
        assert_eq!(cli.listen, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(cli.chunk_size, DEFAULT_CHUNK_SIZE_KIB);
        assert_eq!(cli.queue, DEFAULT_WRITE_QUEUE);
        assert_eq!(cli.workers, DEFAULT_NUM_WORKERS);
        assert!(cli.key.is_none());
        assert!(!cli.mptcp);
    }

    #[test]
    fn root_is_required() {
        assert!(Cli::try_parse_from(["fastcp-server"]).is_err());
    }

    #[test]
    fn key_lengths_validated() {
        for len in [15usize, 17, 31, 33] {
            let key = "k".repeat(len);
            let cli =
                Cli::try_parse_from(["fastcp-server", "-r", "/tmp", "-k", &key]).unwrap();
            assert!(cli.validate().is_err(), "key length {len} must be rejected");
        }
        let cli = Cli::try_parse_from(["fastcp-server", "-r", "/tmp", "-k", &"k".repeat(32)])
            .unwrap();
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn session_config_converts_chunk_size_to_bytes() {
        let cli =
            Cli::try_parse_from(["fastcp-server", "-r", "/srv/in", "-c", "128"]).unwrap();
        let config = cli.session_config();
        assert_eq!(config.chunk_size, 128 * 1024);
        assert_eq!(config.root, PathBuf::from("/srv/in"));
    }

    #[test]
    fn socket_addr_combines_listen_and_port() {
        let cli = Cli::try_parse_from([
            "fastcp-server",
            "-r",
            "/tmp",
            "-l",
            "127.0.0.1",
            "-p",
            "7000",
        ])
        .unwrap();
        assert_eq!(
            cli.socket_addr(),
            "127.0.0.1:7000".parse::<SocketAddr>().unwrap()
        );
    }
}
