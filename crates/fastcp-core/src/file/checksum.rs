//! Whole-file and incremental checksums: CRC32 (IEEE) and SHA-256.
//!
//! The final CRC32 is emitted as 4 big-endian bytes; SHA-256 as 32 bytes.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::constants::CHECKSUM_READ_BUF;
use crate::error::Result;

/// Which checksum a transfer uses. The value doubles as the BEGIN/END flags
/// byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ChecksumKind {
    /// Verification omitted.
    None = 0,
    /// CRC32, IEEE polynomial.
    #[default]
    Crc32 = 1,
    /// SHA-256.
    Sha256 = 2,
}

impl ChecksumKind {
    /// Decode the flags byte of a BEGIN/END frame.
    pub fn from_flags(flags: u8) -> Self {
        match flags {
            1 => ChecksumKind::Crc32,
            2 => ChecksumKind::Sha256,
            _ => ChecksumKind::None,
        }
    }

    /// True when any verification was requested.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ChecksumKind::None)
    }
}

/// CRC32 checksum of a whole file, 4 big-endian bytes.
pub fn file_crc32(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; CHECKSUM_READ_BUF];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_be_bytes().to_vec())
}

/// SHA-256 checksum of a whole file, 32 bytes.
pub fn file_sha256(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHECKSUM_READ_BUF];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

/// Whole-file checksum for the requested kind. `None` yields an empty hash.
pub fn checksum_file(path: &Path, kind: ChecksumKind) -> Result<Vec<u8>> {
    match kind {
        ChecksumKind::None => Ok(Vec::new()),
        ChecksumKind::Crc32 => file_crc32(path),
        ChecksumKind::Sha256 => file_sha256(path),
    }
}

/// Incremental checksum state, fed one chunk at a time by the file writer.
pub enum RunningChecksum {
    Crc32(crc32fast::Hasher),
    Sha256(Box<Sha256>),
}

impl RunningChecksum {
    /// SHA-256 when `use_sha`, CRC32 otherwise.
    pub fn new(use_sha: bool) -> Self {
        if use_sha {
            RunningChecksum::Sha256(Box::new(Sha256::new()))
        } else {
            RunningChecksum::Crc32(crc32fast::Hasher::new())
        }
    }

    /// Fold another chunk into the running state.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            RunningChecksum::Crc32(hasher) => hasher.update(data),
            RunningChecksum::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finish and emit the checksum bytes.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            RunningChecksum::Crc32(hasher) => hasher.finalize().to_be_bytes().to_vec(),
            RunningChecksum::Sha256(hasher) => hasher.finalize().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn kind_from_flags() {
        assert_eq!(ChecksumKind::from_flags(0), ChecksumKind::None);
        assert_eq!(ChecksumKind::from_flags(1), ChecksumKind::Crc32);
        assert_eq!(ChecksumKind::from_flags(2), ChecksumKind::Sha256);
        assert_eq!(ChecksumKind::from_flags(9), ChecksumKind::None);
    }

    #[test]
    fn crc32_of_megabyte_of_0x42() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0x42u8; 1024 * 1024]).unwrap();

        let crc = file_crc32(file.path()).unwrap();
        assert_eq!(crc, vec![0x45, 0xD5, 0xDE, 0x8D]);
    }

    #[test]
    fn sha256_matches_known_vector() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();

        let sha = file_sha256(file.path()).unwrap();
        assert_eq!(
            hex::encode(sha),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn incremental_crc32_matches_whole_file() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        let whole = file_crc32(file.path()).unwrap();

        let mut running = RunningChecksum::new(false);
        for chunk in data.chunks(7919) {
            running.update(chunk);
        }
        assert_eq!(running.finalize(), whole);
    }

    #[test]
    fn incremental_sha256_matches_whole_file() {
        let data = vec![0xA5u8; 300_000];

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        let whole = file_sha256(file.path()).unwrap();

        let mut running = RunningChecksum::new(true);
        for chunk in data.chunks(64 * 1024) {
            running.update(chunk);
        }
        assert_eq!(running.finalize(), whole);
    }

    #[test]
    fn empty_file_checksums() {
        let file = tempfile::NamedTempFile::new().unwrap();

        // CRC32 of nothing is zero.
        assert_eq!(file_crc32(file.path()).unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(file_sha256(file.path()).unwrap().len(), 32);
    }

    #[test]
    fn none_kind_yields_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(checksum_file(file.path(), ChecksumKind::None)
            .unwrap()
            .is_empty());
    }
}
