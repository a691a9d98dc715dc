use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use tether_fabric::channel::{ChannelSink, ChannelSource};
use tether_fabric::codec::JsonCodec;
use tether_fabric::dial::dial;
use tether_fabric::Error as FabricError;

use crate::error::{kind, Error, Fault, RemoteError, Result};
use crate::key::FunctionKey;
use crate::stub::RemoteFn;
use crate::wire::{self, Payload, Request};

/// Item on the outbound queue. `Shutdown` is the sentinel that ends the
/// sender task.
enum Outbound {
    Frame(Value),
    Shutdown,
}

/// State shared between callers and the connection task.
struct Shared {
    connected: AtomicBool,
    next_id: AtomicU64,
    waiters: Mutex<HashMap<u64, oneshot::Sender<Payload>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    dial_error: Mutex<Option<String>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            // id 0 is the server's "unknown id" sentinel
            next_id: AtomicU64::new(1),
            waiters: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            dial_error: Mutex::new(None),
        }
    }

    fn take_waiter(&self, id: u64) -> Option<oneshot::Sender<Payload>> {
        self.waiters.lock().expect("waiter lock poisoned").remove(&id)
    }
}

#[derive(Debug, Clone, Copy)]
struct Config {
    connect_timeout: Duration,
    poll_interval: Duration,
    call_timeout: Option<Duration>,
}

/// Configures a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    config: Config,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: Config {
                connect_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(10),
                call_timeout: None,
            },
        }
    }

    /// How long [`Client::connect`] waits for the connection to come up.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// How often [`Client::connect`] re-checks the connectivity flag.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Bound the wait for each call's response. Off by default: a call
    /// waits until its response arrives or the connection goes away.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Client {
        Client {
            shared: Arc::new(Shared::new()),
            conn_task: Arc::new(tokio::sync::Mutex::new(None)),
            config: self.config,
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One logical RPC connection.
///
/// Cloning is cheap and every clone shares the same connection; any number
/// of tasks may issue [`Client::call`]s concurrently. Internally one
/// sender task serializes all outbound requests onto the wire and one
/// receiver task routes each response to the call that issued it, matched
/// by correlation id.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    conn_task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
    config: Config,
}

impl Client {
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Bind a forwarding stub for `key` on this connection.
    pub fn bind(&self, key: FunctionKey) -> RemoteFn {
        RemoteFn::new(self.clone(), key)
    }

    /// Open the connection. No-op when already connected.
    ///
    /// Spawns the background connection task and then waits, re-checking
    /// at the configured poll interval, until the connection is up. Fails
    /// with [`Error::ConnectFailed`] as soon as dialing fails, or with
    /// [`Error::ConnectTimeout`] when the timeout elapses first.
    pub async fn connect(&self, url: &str) -> Result<()> {
        let mut task_slot = self.conn_task.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        *self.shared.dial_error.lock().expect("dial lock poisoned") = None;
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock().expect("queue lock poisoned") = Some(tx);
        let handle = tokio::spawn(run_connection(
            Arc::clone(&self.shared),
            url.to_string(),
            rx,
        ));

        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            if self.is_connected() {
                *task_slot = Some(handle);
                return Ok(());
            }
            if let Some(reason) = self
                .shared
                .dial_error
                .lock()
                .expect("dial lock poisoned")
                .take()
            {
                *self.shared.outbound.lock().expect("queue lock poisoned") = None;
                return Err(Error::ConnectFailed {
                    url: url.to_string(),
                    reason,
                });
            }
            if Instant::now() >= deadline {
                // A dial finishing exactly now still wins.
                if self.is_connected() {
                    *task_slot = Some(handle);
                    return Ok(());
                }
                handle.abort();
                self.shared.connected.store(false, Ordering::SeqCst);
                *self.shared.outbound.lock().expect("queue lock poisoned") = None;
                return Err(Error::ConnectTimeout {
                    url: url.to_string(),
                    waited: self.config.connect_timeout,
                });
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Close the connection. No-op when not connected.
    ///
    /// Pushes the shutdown sentinel onto the outbound queue, waits for the
    /// connection task to finish, and fails any still-pending calls with
    /// [`Error::ConnectionLost`].
    pub async fn disconnect(&self) -> Result<()> {
        let mut task_slot = self.conn_task.lock().await;
        if !self.is_connected() {
            return Ok(());
        }
        if let Some(tx) = self.shared.outbound.lock().expect("queue lock poisoned").take() {
            let _ = tx.send(Outbound::Shutdown);
        }
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Some(handle) = task_slot.take() {
            if let Err(err) = handle.await {
                debug!("connection task ended abnormally: {err}");
            }
        }
        Ok(())
    }

    /// Call the remote function registered under `key`.
    ///
    /// Safe to issue from many tasks at once: each call owns a fresh
    /// correlation id and a single-slot waiter, so responses cannot be
    /// cross-delivered no matter how they interleave.
    pub async fn call(&self, key: &FunctionKey, args: Vec<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.shared
            .waiters
            .lock()
            .expect("waiter lock poisoned")
            .insert(id, waiter_tx);

        let frame = wire::encode_request(&Request {
            id,
            key: key.clone(),
            args,
        });
        let enqueued = match &*self.shared.outbound.lock().expect("queue lock poisoned") {
            Some(tx) => tx.send(Outbound::Frame(frame)).is_ok(),
            None => false,
        };
        if !enqueued {
            self.shared.take_waiter(id);
            return Err(Error::ConnectionLost);
        }

        let outcome = match self.config.call_timeout {
            Some(limit) => match timeout(limit, waiter_rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.shared.take_waiter(id);
                    return Err(Error::CallTimeout(limit));
                }
            },
            None => waiter_rx.await,
        };
        // The receiver removes the waiter on delivery; make sure it is
        // gone on the failure paths too.
        self.shared.take_waiter(id);

        let payload = outcome.map_err(|_| Error::ConnectionLost)?;
        match payload {
            Payload::Result(value) => Ok(value),
            Payload::Error(remote) => Err(Error::Remote(remote)),
            Payload::LegacyError(message) => Err(Error::Remote(RemoteError::wrap(
                format!("remote call `{key}` failed"),
                Fault::new(kind::LEGACY_ERROR, message),
            ))),
            Payload::Bare(value) => Ok(value),
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task owning the connection: dials, then drives the sender
/// and receiver loops until either finishes, then tears everything down.
async fn run_connection(
    shared: Arc<Shared>,
    url: String,
    outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let (sink, source) = match dial(&url).await {
        Ok(halves) => halves,
        Err(err) => {
            *shared.dial_error.lock().expect("dial lock poisoned") = Some(err.to_string());
            return;
        }
    };
    let sink = ChannelSink::new(sink, JsonCodec);
    let source = ChannelSource::new(source, JsonCodec);
    shared.connected.store(true, Ordering::SeqCst);

    let send = sender_loop(sink, outbound);
    let recv = receiver_loop(source, Arc::clone(&shared));
    tokio::pin!(send, recv);
    tokio::select! {
        _ = &mut send => {}
        _ = &mut recv => debug!("connection closed by peer"),
    }

    shared.connected.store(false, Ordering::SeqCst);
    *shared.outbound.lock().expect("queue lock poisoned") = None;
    // Dropping the senders wakes every pending call with ConnectionLost.
    shared
        .waiters
        .lock()
        .expect("waiter lock poisoned")
        .clear();
}

/// Drains the outbound queue in FIFO order onto the wire. Ends on the
/// shutdown sentinel, on queue closure, or on a write failure.
async fn sender_loop(
    mut sink: ChannelSink<JsonCodec>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if let Err(err) = sink.send(&frame).await {
                    warn!("send failed: {err}");
                    break;
                }
            }
            Outbound::Shutdown => break,
        }
    }
    if let Err(err) = sink.close().await {
        debug!("close failed: {err}");
    }
}

/// Reads response frames and hands each payload to the waiter registered
/// under its correlation id. Responses without a live waiter are dropped:
/// the caller already gave up, or the id is the server's `0` sentinel for
/// a request whose id could not be parsed.
async fn receiver_loop(mut source: ChannelSource<JsonCodec>, shared: Arc<Shared>) {
    loop {
        let frame: Value = match source.receive().await {
            Ok(frame) => frame,
            Err(FabricError::ConnectionClosed) => break,
            Err(err) => {
                warn!("receive failed: {err}");
                break;
            }
        };
        let (id, payload) = match wire::decode_response(frame) {
            Ok(decoded) => decoded,
            Err(violation) => {
                warn!("dropping malformed response: {violation}");
                continue;
            }
        };
        match shared.take_waiter(id) {
            // A closed waiter means the caller stopped waiting; drop.
            Some(waiter) => {
                let _ = waiter.send(payload);
            }
            None => debug!(id, "no waiter registered for response id"),
        }
    }
}
