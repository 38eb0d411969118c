// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A single connection to one coordinator: TCP (optionally TLS) transport,
//! the STARTUP/authentication exchange, stream-id multiplexing of concurrent
//! requests, keepalive heartbeats and defunct handling.

pub mod auth;
pub mod tls;

pub use auth::{
    AuthProvider,
    Credentials,
    NoAuthProvider,
    PlainTextAuthProvider,
};
pub use tls::{
    SslOptions,
    TlsVersion,
};

use crate::{
    app::error::DriverError,
    cql::frame::{
        header::HEADER_LEN,
        requests::{
            assign_stream,
            startup,
            OptionsFrame,
            QueryFrameBuilder,
            RegisterFrame,
            RequestFrame,
            StartupFrame,
        },
        responses::{
            error::ErrorCode,
            EventFrame,
            ResponseBody,
            ResponseFrame,
            ResultBodyKind,
        },
        Consistency,
    },
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    convert::TryInto,
    net::SocketAddr,
    sync::{
        atomic::{
            AtomicBool,
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::{
    io::{
        split,
        AsyncRead,
        AsyncReadExt,
        AsyncWrite,
        AsyncWriteExt,
    },
    net::TcpStream,
    sync::{
        mpsc,
        oneshot,
        watch,
    },
    time::{
        interval,
        timeout,
        Instant,
    },
};

/// The stream id the server uses for pushed EVENT frames.
const EVENT_STREAM: u16 = u16::MAX;

/// Per-connection tunables, extracted from the session configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// TCP connect timeout. Default 5 s.
    pub connect_timeout: Duration,
    /// Per-request wait for the coordinator's response; `None` disables.
    /// Default 12 s.
    pub read_timeout: Option<Duration>,
    /// Enable TCP keepalive probes after this idle delay.
    pub keep_alive: Option<Duration>,
    /// Disable Nagle's algorithm. Default true.
    pub tcp_nodelay: bool,
    /// Idle interval after which an OPTIONS heartbeat is sent. Default 30 s.
    pub heartbeat_interval: Duration,
    /// Simultaneous read timeouts beyond which the connection is defunct.
    /// Default 64.
    pub defunct_read_timeout_threshold: usize,
    /// Concurrent in-flight request cap (the stream-id space). Default 2048.
    pub max_in_flight: usize,
    /// Bytes the writer batches before flushing. Default 64 KiB.
    pub coalescing_threshold: usize,
    /// TLS options; a handshake is performed before STARTUP when present.
    pub ssl: Option<SslOptions>,
    /// Authentication provider answering AUTHENTICATE.
    pub auth: Arc<dyn AuthProvider>,
    /// Extra STARTUP options (driver and application identity).
    pub startup_identity: Vec<(String, String)>,
    /// Keyspace to USE after the handshake.
    pub keyspace: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5_000),
            read_timeout: Some(Duration::from_millis(12_000)),
            keep_alive: Some(Duration::from_secs(0)),
            tcp_nodelay: true,
            heartbeat_interval: Duration::from_millis(30_000),
            defunct_read_timeout_threshold: 64,
            max_in_flight: 2048,
            coalescing_threshold: 65_536,
            ssl: None,
            auth: Arc::new(NoAuthProvider),
            startup_identity: Vec::new(),
            keyspace: None,
        }
    }
}

struct StreamTable {
    free: Vec<u16>,
    pending: HashMap<u16, oneshot::Sender<Result<ResponseFrame, DriverError>>>,
    /// Stream ids whose waiter gave up; reclaimed when the late response
    /// arrives so the id is never handed out twice.
    orphaned: HashSet<u16>,
}

struct Shared {
    address: SocketAddr,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    streams: Mutex<StreamTable>,
    defunct: AtomicBool,
    closed_tx: watch::Sender<bool>,
    /// Milliseconds since `epoch` of the last outgoing frame.
    last_write: AtomicU64,
    epoch: Instant,
    simultaneous_timeouts: AtomicUsize,
    read_timeout: Option<Duration>,
    defunct_read_timeout_threshold: usize,
    event_tx: Mutex<Option<mpsc::UnboundedSender<EventFrame>>>,
}

impl Shared {
    fn mark_write(&self) {
        self.last_write
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// Fail all pending requests and close the connection.
    fn defunct(&self, reason: &str) {
        if self.defunct.swap(true, Ordering::SeqCst) {
            return;
        }
        log::warn!("Connection to {} is defunct: {}", self.address, reason);
        let mut streams = self.streams.lock().unwrap();
        for (_, waiter) in streams.pending.drain() {
            let _ = waiter.send(Err(DriverError::Broken(reason.to_owned())));
        }
        streams.orphaned.clear();
        let _ = self.closed_tx.send(true);
    }
}

/// A live connection handle. Cloning shares the underlying transport.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Open a transport to `address` and run the protocol handshake:
    /// OPTIONS/SUPPORTED, STARTUP, the authentication exchange, and the
    /// optional keyspace USE.
    pub async fn open(address: SocketAddr, config: &ConnectionConfig) -> Result<Self, DriverError> {
        let tcp = timeout(config.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                DriverError::Broken(format!(
                    "Connect to {} timed out after {:?}",
                    address, config.connect_timeout
                ))
            })?
            .map_err(|e| DriverError::Broken(format!("Connect to {} failed: {}", address, e)))?;
        if config.tcp_nodelay {
            let _ = tcp.set_nodelay(true);
        }
        if let Some(delay) = config.keep_alive {
            let sock = socket2::SockRef::from(&tcp);
            let mut keepalive = socket2::TcpKeepalive::new();
            if delay > Duration::ZERO {
                keepalive = keepalive.with_time(delay);
            }
            let _ = sock.set_tcp_keepalive(&keepalive);
        }

        match &config.ssl {
            Some(ssl) => {
                let connector = ssl.connector()?;
                let name = ssl.server_name(&address.ip().to_string())?;
                let stream = connector
                    .connect(name, tcp)
                    .await
                    .map_err(|e| DriverError::Broken(format!("TLS handshake with {} failed: {}", address, e)))?;
                Self::handshake(address, stream, config).await
            }
            None => Self::handshake(address, tcp, config).await,
        }
    }

    async fn handshake<S>(address: SocketAddr, mut stream: S, config: &ConnectionConfig) -> Result<Self, DriverError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        // OPTIONS first: pick the CQL version the server advertises
        let response = exchange(&mut stream, RequestFrame::from(OptionsFrame)).await?;
        let cql_version = match response.into_body() {
            ResponseBody::Supported(supported) => supported
                .cql_versions()
                .and_then(|versions| versions.first().cloned())
                .unwrap_or_else(|| startup::DEFAULT_CQL_VERSION.to_owned()),
            ResponseBody::Error(e) => return Err(map_handshake_error(e)),
            body => {
                return Err(DriverError::Internal(format!(
                    "Expected SUPPORTED during handshake, got {:?}",
                    body.opcode()
                )))
            }
        };

        let mut options = HashMap::new();
        options.insert(startup::CQL_VERSION.to_owned(), cql_version);
        for (key, value) in &config.startup_identity {
            options.insert(key.clone(), value.clone());
        }
        let response = exchange(&mut stream, RequestFrame::from(StartupFrame::new(options))).await?;
        match response.into_body() {
            ResponseBody::Ready(_) => (),
            ResponseBody::Authenticate(authenticate) => {
                let token = config.auth.initial_response(authenticate.authenticator()).await?;
                let response = exchange(
                    &mut stream,
                    RequestFrame::from(crate::cql::frame::requests::AuthResponseFrame::new(token)),
                )
                .await?;
                match response.into_body() {
                    ResponseBody::AuthSuccess(_) => (),
                    ResponseBody::AuthChallenge(challenge) => {
                        // single round-trip mechanisms only; providers may override
                        config.auth.evaluate_challenge(challenge.token()).await?;
                        return Err(DriverError::Authentication(
                            "Multi-round authentication is not supported".to_owned(),
                        ));
                    }
                    ResponseBody::Error(e) => return Err(map_handshake_error(e)),
                    body => {
                        return Err(DriverError::Internal(format!(
                            "Unexpected frame during authentication: {:?}",
                            body.opcode()
                        )))
                    }
                }
            }
            ResponseBody::Error(e) => return Err(map_handshake_error(e)),
            body => {
                return Err(DriverError::Internal(format!(
                    "Unexpected frame during handshake: {:?}",
                    body.opcode()
                )))
            }
        }

        let connection = Self::spawn(address, stream, config);
        if let Some(keyspace) = &config.keyspace {
            connection.use_keyspace(keyspace).await?;
        }
        Ok(connection)
    }

    /// Wire the handshaken stream into reader/writer/heartbeat tasks.
    fn spawn<S>(address: SocketAddr, stream: S, config: &ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read_half, mut write_half) = split(stream);
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (closed_tx, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            address,
            write_tx,
            streams: Mutex::new(StreamTable {
                // the highest id is reserved for server events
                free: (0..config.max_in_flight.min(EVENT_STREAM as usize) as u16).rev().collect(),
                pending: HashMap::new(),
                orphaned: HashSet::new(),
            }),
            defunct: AtomicBool::new(false),
            closed_tx,
            last_write: AtomicU64::new(0),
            epoch: Instant::now(),
            simultaneous_timeouts: AtomicUsize::new(0),
            read_timeout: config.read_timeout.filter(|t| !t.is_zero()),
            defunct_read_timeout_threshold: config.defunct_read_timeout_threshold,
            event_tx: Mutex::new(None),
        });

        let writer = shared.clone();
        let coalescing_threshold = config.coalescing_threshold.max(1);
        tokio::spawn(async move {
            while let Some(payload) = write_rx.recv().await {
                // coalesce whatever is already queued, up to the threshold
                let mut batch = payload;
                while batch.len() < coalescing_threshold {
                    match write_rx.try_recv() {
                        Ok(next) => batch.extend(next),
                        Err(_) => break,
                    }
                }
                if let Err(e) = write_half.write_all(&batch).await {
                    writer.defunct(&format!("Write failed: {}", e));
                    return;
                }
                if let Err(e) = write_half.flush().await {
                    writer.defunct(&format!("Flush failed: {}", e));
                    return;
                }
            }
        });

        let reader = shared.clone();
        tokio::spawn(async move {
            if let Err(reason) = read_loop(read_half, &reader).await {
                reader.defunct(&reason);
            }
        });

        let heartbeat = shared.clone();
        let heartbeat_interval = config.heartbeat_interval;
        let connection = Self { shared };
        let probe = connection.clone();
        tokio::spawn(async move {
            let mut ticker = interval(heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if heartbeat.defunct.load(Ordering::SeqCst) {
                    return;
                }
                let idle = (heartbeat.epoch.elapsed().as_millis() as u64)
                    .saturating_sub(heartbeat.last_write.load(Ordering::Relaxed));
                if idle < heartbeat_interval.as_millis() as u64 {
                    continue;
                }
                log::trace!("Sending heartbeat to {}", heartbeat.address);
                if let Err(e) = probe.send_request(RequestFrame::from(OptionsFrame).build_payload()).await {
                    heartbeat.defunct(&format!("Heartbeat failed: {}", e));
                    return;
                }
            }
        });

        connection
    }

    pub fn address(&self) -> SocketAddr {
        self.shared.address
    }

    /// Whether the connection has been torn down.
    pub fn is_defunct(&self) -> bool {
        self.shared.defunct.load(Ordering::SeqCst)
    }

    /// Tear the connection down, failing all pending requests.
    pub fn close(&self) {
        self.shared.defunct("Connection closed");
    }

    /// The number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        let streams = self.shared.streams.lock().unwrap();
        streams.pending.len() + streams.orphaned.len()
    }

    /// Route server EVENT frames to `tx` (used by the control connection).
    pub fn set_event_sink(&self, tx: mpsc::UnboundedSender<EventFrame>) {
        *self.shared.event_tx.lock().unwrap() = Some(tx);
    }

    /// Resolves when the connection dies.
    pub async fn wait_until_closed(&self) {
        let mut rx = self.shared.closed_tx.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Send one encoded request frame and await its response, multiplexed by
    /// stream id. Fails with `BusyConnection` when the stream-id space is
    /// exhausted and `OperationTimedOut` when the per-request read timeout
    /// expires.
    pub async fn send_request(&self, mut payload: Vec<u8>) -> Result<ResponseFrame, DriverError> {
        if self.is_defunct() {
            return Err(DriverError::Broken("Connection is defunct".to_owned()));
        }
        let (stream, rx) = {
            let mut streams = self.shared.streams.lock().unwrap();
            let stream = match streams.free.pop() {
                Some(stream) => stream,
                None => return Err(DriverError::BusyConnection(self.shared.address)),
            };
            let (tx, rx) = oneshot::channel();
            streams.pending.insert(stream, tx);
            (stream, rx)
        };
        assign_stream(stream, &mut payload);
        self.shared.mark_write();
        if self.shared.write_tx.send(payload).is_err() {
            let mut streams = self.shared.streams.lock().unwrap();
            streams.pending.remove(&stream);
            streams.free.push(stream);
            return Err(DriverError::Broken("Connection writer is gone".to_owned()));
        }

        match self.shared.read_timeout {
            Some(read_timeout) => match timeout(read_timeout, rx).await {
                Ok(result) => {
                    self.shared.simultaneous_timeouts.store(0, Ordering::Relaxed);
                    result.unwrap_or_else(|_| Err(DriverError::Broken("Connection closed".to_owned())))
                }
                Err(_) => {
                    {
                        let mut streams = self.shared.streams.lock().unwrap();
                        streams.pending.remove(&stream);
                        streams.orphaned.insert(stream);
                    }
                    let timeouts = self.shared.simultaneous_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                    if timeouts > self.shared.defunct_read_timeout_threshold {
                        self.shared
                            .defunct(&format!("{} simultaneous read timeouts", timeouts));
                    }
                    Err(DriverError::OperationTimedOut(read_timeout.as_millis() as u64))
                }
            },
            None => rx
                .await
                .unwrap_or_else(|_| Err(DriverError::Broken("Connection closed".to_owned()))),
        }
    }

    /// Switch the connection to a keyspace.
    pub async fn use_keyspace(&self, keyspace: &str) -> Result<(), DriverError> {
        let frame = QueryFrameBuilder::default()
            .statement(format!("USE \"{}\"", keyspace))
            .build()
            .map_err(|e| DriverError::Internal(e.to_string()))?;
        let response = self.send_request(RequestFrame::from(frame).build_payload()).await?;
        match response.into_body() {
            ResponseBody::Result(result) => match result.into_kind() {
                ResultBodyKind::SetKeyspace(_) => Ok(()),
                kind => Err(DriverError::Internal(format!(
                    "Unexpected result for USE: {:?}",
                    kind
                ))),
            },
            ResponseBody::Error(e) => Err(DriverError::Response(e)),
            body => Err(DriverError::Internal(format!(
                "Unexpected frame for USE: {:?}",
                body.opcode()
            ))),
        }
    }

    /// Register for server push events.
    pub async fn register(&self, event_types: Vec<String>) -> Result<(), DriverError> {
        let response = self
            .send_request(RequestFrame::from(RegisterFrame::new(event_types)).build_payload())
            .await?;
        match response.into_body() {
            ResponseBody::Ready(_) => Ok(()),
            ResponseBody::Error(e) => Err(DriverError::Response(e)),
            body => Err(DriverError::Internal(format!(
                "Unexpected frame for REGISTER: {:?}",
                body.opcode()
            ))),
        }
    }

    /// A plain QUERY round-trip on this connection, used by discovery and
    /// re-preparation.
    pub async fn query(&self, statement: impl Into<String>) -> Result<ResponseFrame, DriverError> {
        let frame = QueryFrameBuilder::default()
            .statement(statement.into())
            .build()
            .map_err(|e| DriverError::Internal(e.to_string()))?;
        let mut frame = RequestFrame::from(frame);
        if let crate::cql::frame::RequestBody::Query(q) = &mut frame.body {
            q.parameters.consistency = Consistency::One;
        }
        self.send_request(frame.build_payload()).await
    }
}

/// Read frames off the socket and deliver them to their waiters.
async fn read_loop<R>(mut read_half: R, shared: &Shared) -> Result<(), String>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut header = [0u8; HEADER_LEN];
        read_half
            .read_exact(&mut header)
            .await
            .map_err(|e| format!("Read failed: {}", e))?;
        let body_len = i32::from_be_bytes(header[5..9].try_into().unwrap());
        if body_len < 0 {
            return Err(format!("Invalid frame body length: {}", body_len));
        }
        let mut frame = vec![0u8; HEADER_LEN + body_len as usize];
        frame[..HEADER_LEN].copy_from_slice(&header);
        read_half
            .read_exact(&mut frame[HEADER_LEN..])
            .await
            .map_err(|e| format!("Read failed: {}", e))?;
        let frame = ResponseFrame::decode(&frame).map_err(|e| format!("Frame decode failed: {}", e))?;
        let stream = frame.header().stream();

        if stream == EVENT_STREAM {
            if let ResponseBody::Event(event) = frame.into_body() {
                if let Some(tx) = shared.event_tx.lock().unwrap().as_ref() {
                    let _ = tx.send(event);
                }
            }
            continue;
        }

        let waiter = {
            let mut streams = shared.streams.lock().unwrap();
            match streams.pending.remove(&stream) {
                Some(waiter) => {
                    streams.free.push(stream);
                    Some(waiter)
                }
                None => {
                    // a waiter that timed out; reclaim the id quietly
                    if streams.orphaned.remove(&stream) {
                        streams.free.push(stream);
                        shared
                            .simultaneous_timeouts
                            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |t| Some(t.saturating_sub(1)))
                            .ok();
                    } else {
                        log::error!("Response for unknown stream {} from {}", stream, shared.address);
                    }
                    None
                }
            }
        };
        if let Some(waiter) = waiter {
            let _ = waiter.send(Ok(frame));
        }
    }
}

/// One blocking request/response exchange during the handshake, before the
/// multiplexing tasks exist.
async fn exchange<S>(stream: &mut S, frame: RequestFrame) -> Result<ResponseFrame, DriverError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&frame.build_payload())
        .await
        .map_err(|e| DriverError::Broken(format!("Handshake write failed: {}", e)))?;
    let mut header = [0u8; HEADER_LEN];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| DriverError::Broken(format!("Handshake read failed: {}", e)))?;
    let body_len = i32::from_be_bytes(header[5..9].try_into().unwrap());
    if body_len < 0 {
        return Err(DriverError::Broken(format!("Invalid frame body length: {}", body_len)));
    }
    let mut payload = vec![0u8; HEADER_LEN + body_len as usize];
    payload[..HEADER_LEN].copy_from_slice(&header);
    stream
        .read_exact(&mut payload[HEADER_LEN..])
        .await
        .map_err(|e| DriverError::Broken(format!("Handshake read failed: {}", e)))?;
    ResponseFrame::decode(&payload).map_err(|e| DriverError::Broken(format!("Handshake decode failed: {}", e)))
}

fn map_handshake_error(e: crate::cql::frame::responses::error::ErrorFrame) -> DriverError {
    if e.code() == ErrorCode::AuthenticationError {
        DriverError::Authentication(e.message().to_owned())
    } else {
        DriverError::Response(e)
    }
}
