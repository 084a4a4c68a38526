//! Client connection: TCP setup, EHLO/handshake, transfer control frames,
//! and the single-sender chunk stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, warn};

use fastcp_core::constants::{NONCE_LEN, SENDER_IDLE};
use fastcp_core::crypto::Cipher;
use fastcp_core::error::{Error, Result};
use fastcp_core::file::ChecksumKind;
use fastcp_core::protocol::{
    AuthBlock, EhloPayload, EndFileTransfer, Opcode, Packet, TransferHeader, encode_packet,
    read_packet, write_packet,
};

/// Server reaction to a BEGIN request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginResponse {
    /// Server is ready for NEXTCHUNK frames.
    Accepted,
    /// A transfer is already active on this session.
    Busy,
    /// An identical file already exists at the destination.
    AlreadyPresent,
    /// Server refused (invalid path or other), with the raw flags byte.
    Rejected(u8),
}

/// A connected client session. The socket has exactly one reader and one
/// writer at any time: control phases run sequentially, and the chunk stream
/// is written by a single sender loop.
pub struct Connection {
    stream: TcpStream,
    cipher: Cipher,
}

impl Connection {
    /// Open a TCP connection with TCP_NODELAY, the requested DSCP value, and
    /// optionally MPTCP (Linux only).
    pub async fn connect(addr: SocketAddr, dscp: u32, mptcp: bool) -> Result<Self> {
        let socket = new_stream_socket(Domain::for_address(addr), mptcp)?;

        socket.set_nodelay(true)?;
        if addr.is_ipv4() {
            // Windows ignores the TOS byte by default.
            if let Err(e) = socket.set_tos(dscp) {
                warn!(error = %e, "could not set DSCP value");
            }
        }

        socket.connect(&addr.into())?;
        let std_stream: std::net::TcpStream = socket.into();
        std_stream.set_nonblocking(true)?;
        let stream = TcpStream::from_std(std_stream)?;

        Ok(Self {
            stream,
            cipher: Cipher::plaintext(),
        })
    }

    /// The session cipher, shared with pipeline workers.
    pub fn cipher(&self) -> Cipher {
        self.cipher.clone()
    }

    /// Read the server greeting and return its session nonce.
    pub async fn read_greeting(&mut self) -> Result<[u8; NONCE_LEN]> {
        let ehlo = self.read_response(Opcode::Ehlo).await?;
        let payload = EhloPayload::decode(&self.cipher.decrypt(ehlo.payload))?;
        Ok(payload.nonce)
    }

    /// Perform the handshake. With a key, installs the session cipher and
    /// proves knowledge of the pre-shared key via the trailing auth block.
    pub async fn authenticate(&mut self, key: Option<&str>, nonce: &[u8; NONCE_LEN]) -> Result<()> {
        match key {
            Some(key) if !key.is_empty() => {
                self.cipher = Cipher::with_key(key.as_bytes(), nonce);

                let secret = self.cipher.encrypt(key.as_bytes().to_vec());
                let auth = AuthBlock {
                    block_len: secret.len() as u16,
                };
                let payload = self.cipher.encrypt(auth.encode());
                let packet = Packet::with_payload(Opcode::Handshake, 1, payload);

                // The auth block trails the frame as raw bytes.
                let mut wire = encode_packet(&packet)?.to_vec();
                wire.extend_from_slice(&secret);
                self.stream
                    .write_all(&wire)
                    .await
                    .map_err(|_| Error::ConnectionLost)?;
            }
            _ => {
                write_packet(&mut self.stream, &Packet::new(Opcode::Handshake, 0)).await?;
            }
        }

        let reply = self.read_response(Opcode::Handshake).await?;
        if reply.flags != 1 {
            return Err(Error::AuthenticationFailed);
        }
        debug!("handshake accepted");
        Ok(())
    }

    /// Ask the server to accept a file of `name` with the expected checksum.
    pub async fn begin_transfer(
        &mut self,
        name: &str,
        hash: &[u8],
        kind: ChecksumKind,
    ) -> Result<BeginResponse> {
        let header = TransferHeader::new(name, hex::encode(hash));
        let payload = self.cipher.encrypt(header.encode()?);
        let packet = Packet::with_payload(Opcode::Begin, kind as u8, payload);
        write_packet(&mut self.stream, &packet).await?;

        let reply = self.read_response(Opcode::Begin).await?;
        Ok(match reply.flags {
            1 => BeginResponse::Accepted,
            2 => BeginResponse::AlreadyPresent,
            0 => BeginResponse::Busy,
            other => BeginResponse::Rejected(other),
        })
    }

    /// Drain framed chunks from all worker outputs onto the socket.
    ///
    /// Non-blocking round-robin over the worker channels; terminates when
    /// every channel has closed. After 10 ms without work the loop sleeps
    /// 10 ms to avoid busy spinning.
    pub async fn stream_chunks(&mut self, mut outputs: Vec<mpsc::Receiver<Vec<u8>>>) -> Result<()> {
        let mut last_work = Instant::now();
        loop {
            let mut closed = 0;
            let mut did_work = false;

            for rx in outputs.iter_mut() {
                match rx.try_recv() {
                    Ok(frame) => {
                        self.stream
                            .write_all(&frame)
                            .await
                            .map_err(|_| Error::ConnectionLost)?;
                        did_work = true;
                    }
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => closed += 1,
                }
            }

            if closed == outputs.len() {
                break;
            }
            if did_work {
                last_work = Instant::now();
            } else if last_work.elapsed() >= SENDER_IDLE {
                tokio::time::sleep(SENDER_IDLE).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
        Ok(())
    }

    /// Finish the transfer: send END with the whole-file checksum, await the
    /// ack, and return whether the server's checksum matches ours.
    pub async fn end_transfer(&mut self, hash: &[u8], kind: ChecksumKind) -> Result<bool> {
        let end = EndFileTransfer::from_hash(hash);
        let payload = self.cipher.encrypt(end.encode());
        let packet = Packet::with_payload(Opcode::End, kind as u8, payload);
        write_packet(&mut self.stream, &packet).await?;

        let reply = self.read_response(Opcode::End).await?;
        if reply.flags == 0 {
            return Ok(false);
        }

        let ack = EndFileTransfer::decode(&self.cipher.decrypt(reply.payload))?;
        Ok(ack.checksum == end.checksum)
    }

    /// Close the connection.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "socket shutdown failed");
        }
        info!("disconnected");
    }

    /// Read one frame and require the expected opcode.
    async fn read_response(&mut self, expect: Opcode) -> Result<Packet> {
        let packet = read_packet(&mut self.stream).await?;
        if packet.opcode != expect as u8 {
            return Err(Error::protocol(format!(
                "expected opcode {}, got {}",
                expect as u8, packet.opcode
            )));
        }
        Ok(packet)
    }
}

#[cfg(target_os = "linux")]
fn new_stream_socket(domain: Domain, mptcp: bool) -> std::io::Result<Socket> {
    if mptcp {
        match Socket::new(domain, Type::STREAM, Some(Protocol::MPTCP)) {
            Ok(socket) => return Ok(socket),
            Err(e) => warn!(error = %e, "MPTCP unavailable, falling back to TCP"),
        }
    }
    Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
}

#[cfg(not(target_os = "linux"))]
fn new_stream_socket(domain: Domain, mptcp: bool) -> std::io::Result<Socket> {
    if mptcp {
        warn!("MPTCP requested but not supported on this platform");
    }
    Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
}

/// Convenience wrapper: connect, read the greeting, and authenticate.
pub async fn establish(
    addr: SocketAddr,
    dscp: u32,
    mptcp: bool,
    key: Option<&str>,
) -> Result<(Connection, Arc<Cipher>)> {
    let mut conn = Connection::connect(addr, dscp, mptcp).await?;
    info!(%addr, "connected");

    let nonce = conn.read_greeting().await?;
    conn.authenticate(key, &nonce).await?;
    info!("handshake ok");

    let cipher = Arc::new(conn.cipher());
    Ok((conn, cipher))
}
