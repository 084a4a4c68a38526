//! Wire protocol for fastcp.
//!
//! Every frame is a fixed 4-byte little-endian header `{opcode, flags, len}`
//! followed by `len - 4` payload bytes. Payloads are fixed little-endian
//! layouts; when the session cipher is enabled, payloads (and chunk bodies)
//! travel encrypted.

pub mod codec;
pub mod transfer;

mod proptests;

pub use codec::{decode_header, encode_packet, read_exact_buf, read_packet, write_packet};
pub use transfer::TransferHeader;

use bytes::{Buf, BufMut};

use crate::constants::{CHECKSUM_LEN, NONCE_LEN};
use crate::error::{Error, Result};

// =============================================================================
// Opcodes
// =============================================================================

/// Protocol opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Server greeting with session nonce.
    Ehlo = 0,
    /// Authentication handshake.
    Handshake = 1,
    /// Request a file transfer.
    Begin = 2,
    /// One chunk of file data.
    NextChunk = 3,
    /// End of file transfer with checksum.
    End = 4,
}

impl Opcode {
    /// Decode a raw opcode byte; unknown values are dispatch errors, not
    /// connection-fatal.
    pub fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(Opcode::Ehlo),
            1 => Some(Opcode::Handshake),
            2 => Some(Opcode::Begin),
            3 => Some(Opcode::NextChunk),
            4 => Some(Opcode::End),
            _ => None,
        }
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: u8,
    pub flags: u8,
    /// Total frame length including this header.
    pub len: u16,
}

/// A full frame: header fields plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: u8,
    pub flags: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a payload-less packet.
    pub fn new(opcode: Opcode, flags: u8) -> Self {
        Self {
            opcode: opcode as u8,
            flags,
            payload: Vec::new(),
        }
    }

    /// Build a packet carrying `payload`.
    pub fn with_payload(opcode: Opcode, flags: u8, payload: Vec<u8>) -> Self {
        Self {
            opcode: opcode as u8,
            flags,
            payload,
        }
    }
}

// =============================================================================
// Fixed Payload Layouts
// =============================================================================

/// EHLO payload: the 16-byte session nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EhloPayload {
    pub nonce: [u8; NONCE_LEN],
}

impl EhloPayload {
    pub fn encode(&self) -> Vec<u8> {
        self.nonce.to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < NONCE_LEN {
            return Err(Error::protocol("EHLO payload too short"));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&buf[..NONCE_LEN]);
        Ok(Self { nonce })
    }
}

/// HANDSHAKE payload: length of the trailing encrypted key block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthBlock {
    pub block_len: u16,
}

impl AuthBlock {
    pub const LEN: usize = 2;

    pub fn encode(&self) -> Vec<u8> {
        self.block_len.to_le_bytes().to_vec()
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::protocol("auth block payload too short"));
        }
        Ok(Self {
            block_len: buf.get_u16_le(),
        })
    }
}

/// NEXTCHUNK payload: chunk metadata. The `data_length` body bytes follow the
/// frame on the wire, raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataStreamChunk {
    /// Sequence number, assigned starting at 1. Zero is reserved.
    pub sequence: u32,
    /// Non-zero when the body is LZ4-compressed.
    pub compression: u16,
    /// Exact number of trailing body bytes.
    pub data_length: u32,
}

impl DataStreamChunk {
    pub const LEN: usize = 10;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::LEN);
        buf.put_u32_le(self.sequence);
        buf.put_u16_le(self.compression);
        buf.put_u32_le(self.data_length);
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::LEN {
            return Err(Error::protocol("chunk payload too short"));
        }
        Ok(Self {
            sequence: buf.get_u32_le(),
            compression: buf.get_u16_le(),
            data_length: buf.get_u32_le(),
        })
    }
}

/// END payload: the whole-file checksum. CRC32 occupies the first 4 bytes
/// big-endian; SHA-256 fills all 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndFileTransfer {
    pub checksum: [u8; CHECKSUM_LEN],
}

impl EndFileTransfer {
    /// Left-align `hash` into the fixed 32-byte field.
    pub fn from_hash(hash: &[u8]) -> Self {
        let mut checksum = [0u8; CHECKSUM_LEN];
        let n = hash.len().min(CHECKSUM_LEN);
        checksum[..n].copy_from_slice(&hash[..n]);
        Self { checksum }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.checksum.to_vec()
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < CHECKSUM_LEN {
            return Err(Error::protocol("end-of-transfer payload too short"));
        }
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&buf[..CHECKSUM_LEN]);
        Ok(Self { checksum })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_roundtrip() {
        for op in [
            Opcode::Ehlo,
            Opcode::Handshake,
            Opcode::Begin,
            Opcode::NextChunk,
            Opcode::End,
        ] {
            assert_eq!(Opcode::from_u8(op as u8), Some(op));
        }
        assert_eq!(Opcode::from_u8(5), None);
        assert_eq!(Opcode::from_u8(255), None);
    }

    #[test]
    fn ehlo_roundtrip() {
        let payload = EhloPayload { nonce: [9u8; 16] };
        let decoded = EhloPayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn ehlo_short_rejected() {
        assert!(EhloPayload::decode(&[0u8; 15]).is_err());
    }

    #[test]
    fn auth_block_little_endian() {
        let block = AuthBlock { block_len: 0x1234 };
        assert_eq!(block.encode(), vec![0x34, 0x12]);
        assert_eq!(AuthBlock::decode(&[0x34, 0x12]).unwrap(), block);
    }

    #[test]
    fn chunk_header_layout() {
        let chunk = DataStreamChunk {
            sequence: 7,
            compression: 1,
            data_length: 0x0001_0000,
        };
        let bytes = chunk.encode();
        assert_eq!(bytes.len(), DataStreamChunk::LEN);
        assert_eq!(&bytes[..4], &[7, 0, 0, 0]);
        assert_eq!(&bytes[4..6], &[1, 0]);
        assert_eq!(&bytes[6..], &[0, 0, 1, 0]);
        assert_eq!(DataStreamChunk::decode(&bytes).unwrap(), chunk);
    }

    #[test]
    fn chunk_header_tolerates_trailing_bytes() {
        let chunk = DataStreamChunk {
            sequence: 1,
            compression: 0,
            data_length: 42,
        };
        let mut bytes = chunk.encode();
        bytes.extend_from_slice(&[0xAA; 6]);
        assert_eq!(DataStreamChunk::decode(&bytes).unwrap(), chunk);
    }

    #[test]
    fn end_transfer_pads_short_hash() {
        let end = EndFileTransfer::from_hash(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&end.checksum[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&end.checksum[4..], &[0u8; 28]);

        let decoded = EndFileTransfer::decode(&end.encode()).unwrap();
        assert_eq!(decoded, end);
    }
}
