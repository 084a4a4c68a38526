//! TCP accept loop: one spawned session per connection.

use std::net::SocketAddr;
use std::sync::Arc;

#[cfg(target_os = "linux")]
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use fastcp_core::error::{Error, Result};
use fastcp_core::file::BufferedIo;

use crate::session::{Session, SessionConfig};

/// Bound listener plus the configuration every session shares.
pub struct Listener {
    listener: TcpListener,
    config: Arc<SessionConfig>,
}

impl Listener {
    /// Validate the root directory and bind the listening socket,
    /// optionally as MPTCP (Linux only).
    pub async fn bind(addr: SocketAddr, mptcp: bool, config: SessionConfig) -> Result<Self> {
        let metadata = std::fs::metadata(&config.root)
            .map_err(|e| Error::config(format!("invalid root folder: {e}")))?;
        if !metadata.is_dir() {
            return Err(Error::config(format!(
                "root path {} is not a directory",
                config.root.display()
            )));
        }

        let listener = bind_listener(addr, mptcp).await?;

        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, spawning one session task each.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "listening");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    debug!(error = %e, "accept failed");
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "could not set TCP_NODELAY");
            }
            info!(%peer, "new connection");

            let config = Arc::clone(&self.config);
            tokio::spawn(async move {
                let session = Session::new(stream, peer, config, BufferedIo);
                if let Err(e) = session.run().await {
                    warn!(%peer, error = %e, "session ended with error");
                }
                info!(%peer, "client disconnected");
            });
        }
    }
}

#[cfg(target_os = "linux")]
async fn bind_listener(addr: SocketAddr, mptcp: bool) -> Result<TcpListener> {
    if mptcp {
        match bind_mptcp(addr) {
            Ok(listener) => return Ok(listener),
            Err(e) => warn!(error = %e, "MPTCP unavailable, falling back to TCP"),
        }
    }
    Ok(TcpListener::bind(addr).await?)
}

#[cfg(not(target_os = "linux"))]
async fn bind_listener(addr: SocketAddr, mptcp: bool) -> Result<TcpListener> {
    if mptcp {
        warn!("MPTCP requested but not supported on this platform");
    }
    Ok(TcpListener::bind(addr).await?)
}

#[cfg(target_os = "linux")]
fn bind_mptcp(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::MPTCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}
