//! Frame codec: 4-byte header encode/decode and whole-frame stream I/O.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::{HEADER_LEN, MAX_PAYLOAD};
use crate::error::{Error, Result};
use crate::protocol::{Header, Packet};

/// Encode a packet to wire bytes: header followed by payload.
///
/// Refuses payloads larger than [`MAX_PAYLOAD`] since `len` is a u16 that
/// counts the header too.
pub fn encode_packet(packet: &Packet) -> Result<Bytes> {
    if packet.payload.len() > MAX_PAYLOAD {
        return Err(Error::protocol(format!(
            "payload size {} exceeds maximum {}",
            packet.payload.len(),
            MAX_PAYLOAD
        )));
    }

    let len = (packet.payload.len() + HEADER_LEN) as u16;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + packet.payload.len());
    buf.put_u8(packet.opcode);
    buf.put_u8(packet.flags);
    buf.put_u16_le(len);
    buf.put_slice(&packet.payload);

    Ok(buf.freeze())
}

/// Decode exactly 4 bytes into a frame header.
pub fn decode_header(buf: &[u8]) -> Result<Header> {
    if buf.len() != HEADER_LEN {
        return Err(Error::protocol("header length should always be 4 bytes"));
    }
    let mut buf = buf;
    let opcode = buf.get_u8();
    let flags = buf.get_u8();
    let len = buf.get_u16_le();

    if (len as usize) < HEADER_LEN {
        return Err(Error::protocol(format!("frame length {len} below header size")));
    }

    Ok(Header { opcode, flags, len })
}

/// Read one full frame from the stream: 4 header bytes, then `len - 4`
/// payload bytes. Short reads are fatal for the connection.
pub async fn read_packet<R>(stream: &mut R) -> Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    stream
        .read_exact(&mut header_buf)
        .await
        .map_err(|_| Error::ConnectionLost)?;

    let header = decode_header(&header_buf)?;

    let payload_len = header.len as usize - HEADER_LEN;
    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        stream
            .read_exact(&mut payload)
            .await
            .map_err(|_| Error::ConnectionLost)?;
    }

    Ok(Packet {
        opcode: header.opcode,
        flags: header.flags,
        payload,
    })
}

/// Encode and write one frame to the stream.
pub async fn write_packet<W>(stream: &mut W, packet: &Packet) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_packet(packet)?;
    stream
        .write_all(&bytes)
        .await
        .map_err(|_| Error::ConnectionLost)?;
    Ok(())
}

/// Read exactly `len` raw bytes that trail a frame (auth blocks, chunk
/// bodies).
pub async fn read_exact_buf<R>(stream: &mut R, len: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|_| Error::ConnectionLost)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Opcode;

    #[test]
    fn encode_prepends_header() {
        let packet = Packet::with_payload(Opcode::Begin, 1, vec![0xAB; 10]);
        let bytes = encode_packet(&packet).unwrap();

        assert_eq!(bytes.len(), 14);
        assert_eq!(bytes[0], Opcode::Begin as u8);
        assert_eq!(bytes[1], 1);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 14);
        assert_eq!(&bytes[4..], &[0xAB; 10][..]);
    }

    #[test]
    fn encode_empty_payload() {
        let packet = Packet::new(Opcode::Handshake, 0);
        let bytes = encode_packet(&packet).unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 4);
    }

    #[test]
    fn encode_max_payload_boundary() {
        let packet = Packet::with_payload(Opcode::NextChunk, 0, vec![0u8; MAX_PAYLOAD]);
        assert!(encode_packet(&packet).is_ok());

        let packet = Packet::with_payload(Opcode::NextChunk, 0, vec![0u8; MAX_PAYLOAD + 1]);
        assert!(encode_packet(&packet).is_err());
    }

    #[test]
    fn decode_header_roundtrip() {
        let packet = Packet::with_payload(Opcode::End, 2, vec![1, 2, 3]);
        let bytes = encode_packet(&packet).unwrap();

        let header = decode_header(&bytes[..4]).unwrap();
        assert_eq!(header.opcode, Opcode::End as u8);
        assert_eq!(header.flags, 2);
        assert_eq!(header.len, 7);
    }

    #[test]
    fn decode_header_rejects_wrong_size() {
        assert!(decode_header(&[0u8; 3]).is_err());
        assert!(decode_header(&[0u8; 5]).is_err());
        assert!(decode_header(&[]).is_err());
    }

    #[test]
    fn decode_header_rejects_undersized_len() {
        // len=2 claims a frame smaller than its own header.
        assert!(decode_header(&[0, 0, 2, 0]).is_err());
    }

    #[tokio::test]
    async fn read_packet_roundtrip() {
        let packet = Packet::with_payload(Opcode::NextChunk, 0, vec![0x42; 100]);
        let bytes = encode_packet(&packet).unwrap();

        let mut reader = &bytes[..];
        let decoded = read_packet(&mut reader).await.unwrap();
        assert_eq!(decoded, packet);
    }

    #[tokio::test]
    async fn read_packet_short_stream_is_connection_lost() {
        let packet = Packet::with_payload(Opcode::NextChunk, 0, vec![0x42; 100]);
        let bytes = encode_packet(&packet).unwrap();

        let mut reader = &bytes[..50];
        let err = read_packet(&mut reader).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost));
    }

    #[tokio::test]
    async fn write_then_read_multiple_frames() {
        let packets = vec![
            Packet::new(Opcode::Ehlo, 1),
            Packet::with_payload(Opcode::Begin, 1, vec![5; 32]),
            Packet::with_payload(Opcode::End, 1, vec![9; 32]),
        ];

        let mut wire = Vec::new();
        for p in &packets {
            write_packet(&mut wire, p).await.unwrap();
        }

        let mut reader = &wire[..];
        for p in &packets {
            assert_eq!(&read_packet(&mut reader).await.unwrap(), p);
        }
    }
}
