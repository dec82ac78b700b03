//! WebSocket transports.
//!
//! Server side: each accepted TCP (or TLS) connection is served by a small axum
//! router on hyper's HTTP/1 connection driver. A successful upgrade on the
//! configured path becomes an [`Incoming`] whose frames are binary messages.
//! Client side uses tokio-tungstenite over the dialed stream.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::{future, SinkExt, StreamExt};
use hiveot_kernel::{HubError, HubResult};
use hiveot_rpc::FrameTransport;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::Message as TungMessage;
use tracing::{debug, info};

use super::listener::TcpStreamListener;
use super::peer::PeerIdentity;
use super::tls::{handshake, ACCEPT_BACKLOG};
use super::{handle_accept_error, listener_closed, Incoming, StreamListener, TaskGuard};

/// Path the gateway serves WebSocket connections on.
pub const DEFAULT_WS_PATH: &str = "/ws";

#[derive(Clone)]
struct WsState {
    tx: mpsc::Sender<Incoming>,
    peer: Option<PeerIdentity>,
    remote_addr: String,
}

/// WebSocket listener, optionally over TLS.
pub struct WsListener {
    rx: mpsc::Receiver<Incoming>,
    local_addr: SocketAddr,
    path: String,
    secure: bool,
    _task: TaskGuard,
}

/// Serve WebSocket upgrades on `path`. With a TLS config this is `wss`.
pub fn wrap_wss(
    listener: TcpStreamListener,
    path: &str,
    tls: Option<Arc<ServerConfig>>,
) -> HubResult<WsListener> {
    if !path.starts_with('/') {
        return Err(HubError::invalid_input(format!("WebSocket path '{path}' must start with '/'")));
    }
    let listener = listener.into_inner();
    let local_addr = listener.local_addr()?;
    let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
    let secure = tls.is_some();
    let task = tokio::spawn(accept_loop(
        listener,
        tls.map(TlsAcceptor::from),
        path.to_string(),
        tx,
    ));
    let scheme = if secure { "wss" } else { "ws" };
    info!("listening on {scheme}://{local_addr}{path}");
    Ok(WsListener {
        rx,
        local_addr,
        path: path.to_string(),
        secure,
        _task: TaskGuard(task),
    })
}

impl WsListener {
    pub fn socket_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Dialable URL of this listener.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}{}", self.local_addr, self.path)
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    path: String,
    tx: mpsc::Sender<Incoming>,
) {
    loop {
        let (tcp, addr) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                handle_accept_error(e).await;
                continue;
            }
        };
        if tx.is_closed() {
            return;
        }
        let acceptor = acceptor.clone();
        let tx = tx.clone();
        let path = path.clone();
        tokio::spawn(async move {
            match acceptor {
                Some(acceptor) => {
                    let Some((tls, peer)) = handshake(&acceptor, tcp, addr).await else {
                        return;
                    };
                    serve_http(tls, &path, tx, peer, addr).await;
                }
                None => serve_http(tcp, &path, tx, None, addr).await,
            }
        });
    }
}

async fn serve_http<I>(
    io: I,
    path: &str,
    tx: mpsc::Sender<Incoming>,
    peer: Option<PeerIdentity>,
    addr: SocketAddr,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let state = WsState {
        tx,
        peer,
        remote_addr: addr.to_string(),
    };
    let router = Router::new().route(path, get(upgrade)).with_state(state);
    let result = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(router))
        .with_upgrades()
        .await;
    if let Err(err) = result {
        debug!(remote_addr = %addr, error = %err, "http connection ended");
    }
}

async fn upgrade(State(state): State<WsState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let incoming = Incoming {
            transport: server_ws_transport(socket),
            peer: state.peer,
            remote_addr: state.remote_addr,
        };
        let _ = state.tx.send(incoming).await;
    })
}

fn server_ws_transport(socket: WebSocket) -> FrameTransport {
    let (sink, stream) = socket.split();
    let sink = sink
        .sink_map_err(|e| HubError::transport(format!("websocket send: {e}")))
        .with(|frame: Bytes| future::ready(Ok::<_, HubError>(WsMessage::Binary(frame))));
    let stream = stream.filter_map(|msg| {
        future::ready(match msg {
            Ok(WsMessage::Binary(data)) => Some(Ok(data)),
            Ok(WsMessage::Text(_)) => Some(Err(HubError::invalid_input("text frames are not supported"))),
            Ok(_) => None,
            Err(e) => Some(Err(HubError::transport(format!("websocket receive: {e}")))),
        })
    });
    FrameTransport::new(sink, stream)
}

/// Run the client handshake for `url` over an established stream.
pub(crate) async fn client_ws_transport<S>(url: &str, stream: S) -> HubResult<FrameTransport>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (socket, _response) = tokio_tungstenite::client_async(url, stream)
        .await
        .map_err(|e| HubError::transport(format!("websocket handshake with {url}: {e}")))?;
    let (sink, stream) = socket.split();
    let sink = sink
        .sink_map_err(|e| HubError::transport(format!("websocket send: {e}")))
        .with(|frame: Bytes| future::ready(Ok::<_, HubError>(TungMessage::Binary(frame.to_vec()))));
    let stream = stream.filter_map(|msg| {
        future::ready(match msg {
            Ok(TungMessage::Binary(data)) => Some(Ok(Bytes::from(data))),
            Ok(TungMessage::Text(_)) => Some(Err(HubError::invalid_input("text frames are not supported"))),
            Ok(_) => None,
            Err(e) => Some(Err(HubError::transport(format!("websocket receive: {e}")))),
        })
    });
    Ok(FrameTransport::new(sink, stream))
}

#[async_trait]
impl StreamListener for WsListener {
    async fn accept(&mut self) -> io::Result<Incoming> {
        self.rx.recv().await.ok_or_else(listener_closed)
    }

    fn local_addr(&self) -> String {
        self.local_addr.to_string()
    }
}
