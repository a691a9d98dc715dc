use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use tether_fabric::channel::Channel;
use tether_fabric::codec::JsonCodec;
use tether_fabric::transport::{TcpTransportListener, TransportListener, UnixTransportListener};
use tether_fabric::Error as FabricError;

use crate::error::{kind, Error, Fault, RemoteError, Result};
use crate::registry::Registry;
use crate::wire::{self, ShapeViolation};

/// Where a server ended up listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownMode {
    Run,
    /// Stop accepting, let attached clients finish on their own.
    Drain,
    /// Stop accepting and abandon attached clients.
    Abort,
}

/// Accepts connections, dispatches requests against a [`Registry`], and
/// writes back correlated responses.
///
/// Lifecycle: idle until [`Server::start`], listening until
/// [`Server::stop`], then idle again and restartable. Both transitions
/// are idempotent.
pub struct Server {
    registry: Arc<Registry>,
    state: Mutex<State>,
}

enum State {
    Idle,
    Listening(Listening),
}

struct Listening {
    bound: BoundAddr,
    shutdown: watch::Sender<ShutdownMode>,
    task: JoinHandle<()>,
}

impl Server {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            state: Mutex::new(State::Idle),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Start listening on a TCP address. A server that is already
    /// listening keeps its existing listener and returns its bound
    /// address.
    pub async fn start(&self, host: &str, port: u16) -> Result<BoundAddr> {
        let mut state = self.state.lock().await;
        if let State::Listening(listening) = &*state {
            return Ok(listening.bound.clone());
        }
        let addr = resolve(host, port).await?;
        let listener = TcpTransportListener::bind(addr).await?;
        let bound = BoundAddr::Tcp(listener.local_addr()?);
        *state = State::Listening(self.spawn_accept_loop(listener, bound.clone()));
        Ok(bound)
    }

    /// Start listening on a Unix socket path.
    pub async fn start_unix(&self, path: impl AsRef<Path>) -> Result<BoundAddr> {
        let mut state = self.state.lock().await;
        if let State::Listening(listening) = &*state {
            return Ok(listening.bound.clone());
        }
        let listener = UnixTransportListener::bind(path).await?;
        let bound = BoundAddr::Unix(listener.path().to_path_buf());
        *state = State::Listening(self.spawn_accept_loop(listener, bound.clone()));
        Ok(bound)
    }

    fn spawn_accept_loop<L>(&self, listener: L, bound: BoundAddr) -> Listening
    where
        L: TransportListener + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(ShutdownMode::Run);
        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(accept_loop(listener, registry, shutdown_rx));
        Listening {
            bound,
            shutdown,
            task,
        }
    }

    /// Stop listening. Graceful stop (`force = false`) waits for attached
    /// clients to disconnect; forced stop abandons them. Blocks until the
    /// listener task has fully exited, then the server is idle again.
    /// No-op when not listening.
    pub async fn stop(&self, force: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let State::Listening(listening) = std::mem::replace(&mut *state, State::Idle) else {
            return Ok(());
        };
        let mode = if force {
            ShutdownMode::Abort
        } else {
            ShutdownMode::Drain
        };
        // A send failure means the accept loop already exited.
        let _ = listening.shutdown.send(mode);
        if let Err(err) = listening.task.await {
            warn!("accept loop ended abnormally: {err}");
        }
        Ok(())
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::InvalidAddress(format!("{host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("{host}:{port}: no addresses")))
}

async fn accept_loop<L>(
    mut listener: L,
    registry: Arc<Registry>,
    mut shutdown: watch::Receiver<ShutdownMode>,
) where
    L: TransportListener + 'static,
{
    let mut connections = JoinSet::new();
    let mode = loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(transport) => {
                    let channel = Channel::new(transport, JsonCodec);
                    connections.spawn(serve_connection(channel, Arc::clone(&registry)));
                }
                Err(err) => warn!("accept failed: {err}"),
            },
            changed = shutdown.changed() => {
                break if changed.is_ok() {
                    *shutdown.borrow()
                } else {
                    ShutdownMode::Abort
                };
            }
        }
    };
    if let Err(err) = listener.close().await {
        debug!("listener close failed: {err}");
    }
    if mode == ShutdownMode::Abort {
        connections.abort_all();
    }
    // Drain mode: each task ends when its transport closes.
    while connections.join_next().await.is_some() {}
}

/// Read-dispatch loop for one connection. Only transport closure ends it;
/// malformed frames and failed handlers are answered, never fatal.
async fn serve_connection(mut channel: Channel<JsonCodec>, registry: Arc<Registry>) {
    loop {
        let frame: Value = match channel.receive().await {
            Ok(frame) => frame,
            Err(FabricError::Codec(err)) => {
                // Not JSON at all: answer with the sentinel id, keep serving.
                let reply =
                    malformed_reply(ShapeViolation(format!("frame is not valid JSON: {err}")));
                if channel.send(&reply).await.is_err() {
                    break;
                }
                continue;
            }
            Err(FabricError::ConnectionClosed) => {
                debug!("peer closed connection");
                break;
            }
            Err(err) => {
                warn!("read failed: {err}");
                break;
            }
        };
        let reply = dispatch(frame, &registry).await;
        if let Err(err) = channel.send(&reply).await {
            warn!("write failed: {err}");
            break;
        }
    }
}

/// Turn one decoded frame into the response frame carrying the same
/// correlation id.
async fn dispatch(frame: Value, registry: &Registry) -> Value {
    let request = match wire::decode_request(frame) {
        Ok(request) => request,
        Err(violation) => return malformed_reply(violation),
    };
    let Some(handler) = registry.lookup(&request.key) else {
        debug!(key = %request.key, "request for unregistered function");
        return wire::encode_error(
            request.id,
            &RemoteError::wrap(
                format!("remote call `{}` failed", request.key),
                Fault::new(
                    kind::NOT_REGISTERED,
                    format!("no function registered under `{}`", request.key),
                ),
            ),
        );
    };
    match (*handler)(request.args).await {
        Ok(value) => wire::encode_result(request.id, value),
        Err(fault) => wire::encode_error(
            request.id,
            &RemoteError::wrap(format!("remote call `{}` failed", request.key), fault),
        ),
    }
}

fn malformed_reply(violation: ShapeViolation) -> Value {
    wire::encode_error(
        wire::UNKNOWN_ID,
        &RemoteError::wrap(
            "could not decode request frame",
            Fault::new(kind::MALFORMED_FRAME, violation.to_string()),
        ),
    )
}
