//! Per-connection session: greeting, authentication, and opcode dispatch.
//!
//! The session owns the socket and is the only reader on it; acks and the
//! EHLO greeting are the only writes. State lives in the struct, owned by
//! the accept loop's task.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use fastcp_core::constants::{AUTH_BLOCK_TIMEOUT, KEY_LENGTHS, MAX_CHUNK_SIZE_KIB};
use fastcp_core::crypto::{Cipher, generate_nonce};
use fastcp_core::error::{Error, Result};
use fastcp_core::file::{ChecksumKind, IoFactory, checksum_file};
use fastcp_core::protocol::{
    AuthBlock, DataStreamChunk, EhloPayload, EndFileTransfer, Opcode, Packet, TransferHeader,
    read_exact_buf, read_packet, write_packet,
};

use crate::pipeline::{UnprocessedChunk, WriterPipeline};

/// Per-session configuration, shared by every connection.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root directory received files land under.
    pub root: PathBuf,
    /// Pre-shared key; `None` means plaintext and no authentication.
    pub key: Option<String>,
    /// File write buffer size in bytes.
    pub chunk_size: usize,
    /// Decoder worker count per transfer.
    pub workers: usize,
    /// Writer queue depth in chunks.
    pub write_queue: usize,
}

/// Whether the session loop keeps going after a frame.
enum Flow {
    Continue,
    Close,
}

/// One client connection's state machine.
pub struct Session<F: IoFactory> {
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<SessionConfig>,
    factory: F,
    cipher: Cipher,
    authenticated: bool,
    transfer: Option<WriterPipeline>,
}

impl<F: IoFactory> Session<F> {
    pub fn new(stream: TcpStream, peer: SocketAddr, config: Arc<SessionConfig>, factory: F) -> Self {
        Self {
            stream,
            peer,
            config,
            factory,
            cipher: Cipher::plaintext(),
            authenticated: false,
            transfer: None,
        }
    }

    /// Run the session to completion: send EHLO, then dispatch frames until
    /// the peer disconnects or a fatal error closes the connection.
    pub async fn run(mut self) -> Result<()> {
        let nonce = generate_nonce();

        // The greeting itself travels plaintext; the cipher starts with the
        // session key only afterwards.
        let ehlo = Packet::with_payload(
            Opcode::Ehlo,
            1,
            self.cipher.encrypt(EhloPayload { nonce }.encode()),
        );
        write_packet(&mut self.stream, &ehlo).await?;

        self.cipher = match &self.config.key {
            Some(key) => Cipher::with_key(key.as_bytes(), &nonce),
            None => Cipher::plaintext(),
        };

        let result = self.dispatch_loop().await;

        // Tear down any in-flight transfer on the way out.
        if let Some(pipeline) = self.transfer.take() {
            warn!(peer = %self.peer, "connection ended mid-transfer");
            let _ = pipeline.finish().await;
        }

        result
    }

    async fn dispatch_loop(&mut self) -> Result<()> {
        loop {
            let packet = match read_packet(&mut self.stream).await {
                Ok(packet) => packet,
                Err(Error::ConnectionLost) => return Ok(()),
                Err(e) => return Err(e),
            };

            let flow = match Opcode::from_u8(packet.opcode) {
                Some(Opcode::Handshake) => self.handle_handshake(packet).await?,
                Some(_) if !self.authenticated => {
                    warn!(peer = %self.peer, "dropping unauthorized connection");
                    Flow::Close
                }
                Some(Opcode::Begin) => self.handle_begin(packet).await?,
                Some(Opcode::NextChunk) => self.handle_next_chunk(packet).await?,
                Some(Opcode::End) => self.handle_end(packet).await?,
                Some(Opcode::Ehlo) => {
                    warn!(peer = %self.peer, "unexpected EHLO from client");
                    Flow::Continue
                }
                None => {
                    warn!(peer = %self.peer, opcode = packet.opcode, "unknown opcode");
                    Flow::Continue
                }
            };

            if matches!(flow, Flow::Close) {
                return Ok(());
            }
        }
    }

    /// HANDSHAKE: verify the pre-shared key (or its absence) and reply.
    ///
    /// An encrypted handshake that fails verification is answered with
    /// flags=0 and the connection closes. A plaintext handshake against a
    /// keyed server is also refused, but the session stays open and the next
    /// non-handshake frame closes it.
    async fn handle_handshake(&mut self, packet: Packet) -> Result<Flow> {
        if packet.flags == 1 {
            let auth = AuthBlock::decode(&self.cipher.decrypt(packet.payload))?;

            // A mismatched key garbles the decrypted length, so only valid
            // key sizes are worth reading; anything else can never match.
            let mut accepted = false;
            if KEY_LENGTHS.contains(&(auth.block_len as usize)) {
                match timeout(
                    AUTH_BLOCK_TIMEOUT,
                    read_exact_buf(&mut self.stream, auth.block_len as usize),
                )
                .await
                {
                    Ok(block) => {
                        let block = block?;
                        accepted = self.cipher.match_secret(&self.cipher.decrypt(block));
                    }
                    Err(_) => {
                        warn!(peer = %self.peer, "auth block read deadline missed");
                    }
                }
            }

            let reply_flags = if accepted { 1 } else { 0 };
            write_packet(&mut self.stream, &Packet::new(Opcode::Handshake, reply_flags)).await?;

            self.authenticated = accepted;
            if accepted {
                return Ok(Flow::Continue);
            }
            warn!(peer = %self.peer, "authentication failed");
            return Ok(Flow::Close);
        }

        let reply_flags = if self.config.key.is_some() { 0 } else { 1 };
        write_packet(&mut self.stream, &Packet::new(Opcode::Handshake, reply_flags)).await?;

        self.authenticated = reply_flags > 0;
        if !self.authenticated {
            warn!(peer = %self.peer, "authentication failed");
        }
        Ok(Flow::Continue)
    }

    /// BEGIN: validate the destination and stand up the writer pipeline, or
    /// report busy/skip/invalid.
    async fn handle_begin(&mut self, packet: Packet) -> Result<Flow> {
        if self.transfer.is_some() {
            write_packet(&mut self.stream, &Packet::new(Opcode::Begin, 0)).await?;
            return Ok(Flow::Continue);
        }

        let header = match TransferHeader::decode(&self.cipher.decrypt(packet.payload)) {
            Ok(header) => header,
            Err(e) => {
                error!(peer = %self.peer, error = %e, "malformed transfer header");
                return Ok(Flow::Close);
            }
        };

        let dest = match resolve_destination(&self.config.root, &header.name) {
            Ok(dest) => dest,
            Err(_) => {
                warn!(peer = %self.peer, name = %header.name, "invalid path requested");
                write_packet(&mut self.stream, &Packet::new(Opcode::Begin, 3)).await?;
                return Ok(Flow::Close);
            }
        };

        info!(peer = %self.peer, dest = %dest.display(), "client requested transfer");

        let kind = ChecksumKind::from_flags(packet.flags);

        // An identical file at the destination makes the transfer a no-op.
        if kind.is_enabled() && dest.is_file() {
            if let Ok(existing) = checksum_file(&dest, kind) {
                if hex::encode(existing) == header.checksum_hex {
                    info!(peer = %self.peer, "identical file already exists, omitting transfer");
                    write_packet(&mut self.stream, &Packet::new(Opcode::Begin, 2)).await?;
                    return Ok(Flow::Continue);
                }
            }
        }

        if let Some(parent) = dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!(peer = %self.peer, error = %e, "cannot create destination directory");
                write_packet(&mut self.stream, &Packet::new(Opcode::Begin, 3)).await?;
                return Ok(Flow::Close);
            }
        }

        let writer = self
            .factory
            .open_writer(
                &dest,
                self.config.chunk_size,
                self.config.write_queue,
                kind == ChecksumKind::Sha256,
            )
            .await;

        let (sink, completion) = match writer {
            Ok(writer) => writer,
            Err(e) => {
                error!(peer = %self.peer, error = %e, "cannot create destination file");
                write_packet(&mut self.stream, &Packet::new(Opcode::Begin, 3)).await?;
                return Ok(Flow::Close);
            }
        };

        self.transfer = Some(WriterPipeline::start(
            sink,
            completion,
            self.config.workers,
            Arc::new(self.cipher.clone()),
            MAX_CHUNK_SIZE_KIB * 1024,
        ));

        write_packet(&mut self.stream, &Packet::new(Opcode::Begin, 1)).await?;
        Ok(Flow::Continue)
    }

    /// NEXTCHUNK: read the trailing body and dispatch it round-robin.
    async fn handle_next_chunk(&mut self, packet: Packet) -> Result<Flow> {
        if self.transfer.is_none() {
            return Err(Error::protocol("chunk received outside a transfer"));
        }

        let chunk = DataStreamChunk::decode(&self.cipher.decrypt(packet.payload))
            .map_err(|_| Error::protocol("malformed chunk header"))?;

        if chunk.data_length as usize > MAX_CHUNK_SIZE_KIB * 1024 {
            return Err(Error::protocol(format!(
                "chunk body of {} bytes exceeds limit",
                chunk.data_length
            )));
        }

        let body = read_exact_buf(&mut self.stream, chunk.data_length as usize).await?;

        // Sequence zero is reserved; the body was consumed to keep the
        // stream in sync.
        if chunk.sequence == 0 {
            debug!(peer = %self.peer, "ignoring reserved sequence zero");
            return Ok(Flow::Continue);
        }

        let pipeline = self.transfer.as_mut().expect("transfer checked above");
        pipeline
            .dispatch(UnprocessedChunk {
                seq: chunk.sequence,
                compressed: chunk.compression > 0,
                data: body,
            })
            .await?;

        Ok(Flow::Continue)
    }

    /// END: drain the pipeline, compare checksums, and acknowledge.
    async fn handle_end(&mut self, packet: Packet) -> Result<Flow> {
        let Some(pipeline) = self.transfer.take() else {
            return Err(Error::protocol("end-of-transfer outside a transfer"));
        };

        let client_end = EndFileTransfer::decode(&self.cipher.decrypt(packet.payload));

        // Wait for all chunks to hit the disk before judging the result.
        let computed = pipeline.finish().await?;
        let ack = EndFileTransfer::from_hash(&computed);

        let client_end = match client_end {
            Ok(end) => end,
            Err(_) => {
                warn!(peer = %self.peer, "malformed teardown message, ending transfer without checksum");
                return Ok(Flow::Close);
            }
        };

        let mut flags = 1u8;
        if packet.flags > 0 {
            if client_end.checksum != ack.checksum {
                warn!(peer = %self.peer, "checksum mismatch");
                flags = 0;
            } else {
                info!(peer = %self.peer, "checksum match, file transfer completed");
            }
        } else {
            info!(peer = %self.peer, "no checksum verification requested, file transfer completed");
        }

        let reply =
            Packet::with_payload(Opcode::End, flags, self.cipher.encrypt(ack.encode()));
        write_packet(&mut self.stream, &reply).await?;
        Ok(Flow::Continue)
    }
}

/// Resolve a wire name to a destination under `root`.
///
/// Backslashes are normalized to the local separator; absolute paths, drive
/// prefixes, and any `..` component are refused.
pub fn resolve_destination(root: &Path, name: &str) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut clean = PathBuf::new();

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::PathInvalid {
                    path: name.to_owned(),
                });
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(Error::PathInvalid {
            path: name.to_owned(),
        });
    }

    Ok(root.join(clean))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_joins_under_root() {
        let root = Path::new("/srv/files");
        assert_eq!(
            resolve_destination(root, "backup.tar").unwrap(),
            root.join("backup.tar")
        );
        assert_eq!(
            resolve_destination(root, "photos/2026/img.raw").unwrap(),
            root.join("photos/2026/img.raw")
        );
    }

    #[test]
    fn traversal_is_refused() {
        let root = Path::new("/srv/files");
        assert!(resolve_destination(root, "../../etc/passwd").is_err());
        assert!(resolve_destination(root, "a/../../b").is_err());
        assert!(resolve_destination(root, "/etc/passwd").is_err());
    }

    #[test]
    fn backslash_separators_are_normalized() {
        let root = Path::new("/srv/files");
        assert_eq!(
            resolve_destination(root, "dir\\sub\\file.bin").unwrap(),
            root.join("dir/sub/file.bin")
        );
        assert!(resolve_destination(root, "..\\..\\etc\\passwd").is_err());
    }

    #[test]
    fn empty_and_dot_names_are_refused() {
        let root = Path::new("/srv/files");
        assert!(resolve_destination(root, "").is_err());
        assert!(resolve_destination(root, ".").is_err());
        assert!(resolve_destination(root, "./").is_err());
    }
}
