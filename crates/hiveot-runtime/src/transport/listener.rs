//! Plain TCP and Unix-domain socket listeners.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hiveot_kernel::HubResult;
use hiveot_rpc::FrameTransport;
use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, info};

use super::{handle_accept_error, Incoming, StreamListener};

/// Listener on a Unix-domain socket. The socket file is removed on drop.
pub struct UdsListener {
    listener: UnixListener,
    path: PathBuf,
}

/// Bind a Unix-domain socket, replacing a stale socket file at `path`.
pub async fn listen_uds(path: &Path) -> HubResult<UdsListener> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("removed stale socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let listener = UnixListener::bind(path)?;
    info!("listening on unix://{}", path.display());
    Ok(UdsListener {
        listener,
        path: path.to_path_buf(),
    })
}

impl UdsListener {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UdsListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[async_trait]
impl StreamListener for UdsListener {
    async fn accept(&mut self) -> io::Result<Incoming> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    return Ok(Incoming {
                        transport: FrameTransport::from_io(stream),
                        peer: None,
                        remote_addr: format!("unix://{}", self.path.display()),
                    });
                }
                Err(e) => handle_accept_error(e).await,
            }
        }
    }

    fn local_addr(&self) -> String {
        format!("unix://{}", self.path.display())
    }
}

/// Listener on a plain TCP socket. Peers carry no identity.
pub struct TcpStreamListener {
    listener: TcpListener,
}

pub async fn listen_tcp(addr: &str) -> HubResult<TcpStreamListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("listening on tcp://{}", listener.local_addr()?);
    Ok(TcpStreamListener { listener })
}

impl TcpStreamListener {
    pub fn into_inner(self) -> TcpListener {
        self.listener
    }

    pub fn socket_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

#[async_trait]
impl StreamListener for TcpStreamListener {
    async fn accept(&mut self) -> io::Result<Incoming> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    return Ok(Incoming {
                        transport: FrameTransport::from_io(stream),
                        peer: None,
                        remote_addr: addr.to_string(),
                    });
                }
                Err(e) => handle_accept_error(e).await,
            }
        }
    }

    fn local_addr(&self) -> String {
        self.listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default()
    }
}
