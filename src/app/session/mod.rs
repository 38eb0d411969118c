// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The session: the public driver surface. It owns the cluster topology,
//! the per-host connection pools and the prepared-statement cache, and runs
//! the execution engine that drives simple, prepared, paged and batch
//! statements through planning, retry and paging.

mod cache;
pub mod concurrent;
pub mod config;
pub mod paging;
mod pool;
pub mod statement;

pub use concurrent::{
    ExecuteConcurrentOptions,
    ExecuteConcurrentResult,
};
pub use config::{
    EncodingOptions,
    Policies,
    PoolingOptions,
    ProtocolOptions,
    QueryOptions,
    SessionConfig,
    SessionConfigBuilder,
    SocketOptions,
};
pub use paging::RowStream;
pub use statement::{
    Batch,
    BatchStatement,
    BatchType,
    PreparedStatement,
    Statement,
};

use self::{
    cache::PreparedCache,
    pool::Pools,
};
use crate::{
    app::{
        cluster::{
            Cluster,
            ControlConnection,
        },
        connection::{
            Connection,
            ConnectionConfig,
            NoAuthProvider,
            PlainTextAuthProvider,
        },
        error::DriverError,
        policy::timestamp::MonotonicTimestampGenerator,
    },
    cql::{
        frame::{
            requests::{
                startup,
                BatchFrame,
                BatchQuery,
                ExecuteFrame,
                PrepareFrame,
                QueryFrame,
                QueryParameters,
                RequestFrame,
            },
            responses::{
                ResponseBody,
                ResultBodyKind,
            },
            rows::RowSet,
            Consistency,
            Values,
        },
        types::{
            codec::{
                encode_value,
                ArgumentError,
            },
            guess,
            CqlType,
            ParamValue,
        },
    },
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::watch;
use uuid::Uuid;

/// The session lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Connecting,
    Connected,
    ShuttingDown,
    Shutdown,
}

struct SessionInner {
    config: SessionConfig,
    cluster: Arc<Cluster>,
    pools: Pools,
    prepared: PreparedCache,
    timestamps: MonotonicTimestampGenerator,
    state: watch::Sender<SessionState>,
    control: Mutex<Option<Arc<ControlConnection>>>,
    id: Uuid,
}

/// The driver entry point. Cheap to clone; all clones share the same
/// topology, pools and prepared cache.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Build a session from its configuration. No connection is made until
    /// [`Session::connect`] or the first request.
    pub fn new(config: SessionConfig) -> Self {
        let cluster = Arc::new(Cluster::default());
        let id = config.id.unwrap_or_else(Uuid::new_v4);
        let connection_config = connection_config(&config, id);
        let pools = Pools::new(
            connection_config,
            config.pooling.core_connections_per_host,
            config.pooling.max_requests_per_connection,
            cluster.clone(),
            config.policies.reconnection.clone(),
        );
        let (state, _) = watch::channel(SessionState::Created);
        Self {
            inner: Arc::new(SessionInner {
                prepared: PreparedCache::new(config.max_prepared),
                pools,
                cluster,
                timestamps: MonotonicTimestampGenerator::new(),
                state,
                control: Mutex::new(None),
                id,
                config,
            }),
        }
    }

    /// The session id sent to the server in STARTUP.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.subscribe().borrow()
    }

    /// A snapshot handle of the cluster topology.
    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.inner.cluster
    }

    /// Establish the session: resolve contact points, open the control
    /// connection and discover the topology. Idempotent; concurrent callers
    /// wait for the one in-flight attempt. A failed attempt returns the
    /// session to `Created` so it can be retried.
    pub async fn connect(&self) -> Result<(), DriverError> {
        loop {
            let mut rx = self.inner.state.subscribe();
            let current = *rx.borrow();
            match current {
                SessionState::Connected => return Ok(()),
                SessionState::ShuttingDown | SessionState::Shutdown => return Err(DriverError::Shutdown),
                SessionState::Connecting => {
                    let _ = rx.changed().await;
                }
                SessionState::Created => {
                    let claimed = self.inner.state.send_if_modified(|state| {
                        if *state == SessionState::Created {
                            *state = SessionState::Connecting;
                            true
                        } else {
                            false
                        }
                    });
                    if !claimed {
                        continue;
                    }
                    match self.establish().await {
                        Ok(()) => {
                            self.inner.state.send_replace(SessionState::Connected);
                            return Ok(());
                        }
                        Err(e) => {
                            self.inner.state.send_replace(SessionState::Created);
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn establish(&self) -> Result<(), DriverError> {
        let config = &self.inner.config;
        if config.contact_points.is_empty() {
            return Err(ArgumentError("contact_points must not be empty".to_owned()).into());
        }
        let contact_points = resolve_contact_points(&config.contact_points, config.protocol_options.port).await?;
        self.inner.cluster.seed(&contact_points);
        let control = ControlConnection::start(
            self.inner.cluster.clone(),
            &contact_points,
            connection_config(config, self.inner.id),
            config.policies.reconnection.clone(),
        )
        .await?;
        *self.inner.control.lock().unwrap() = Some(control);

        // drop the pool of any host that leaves the ring
        let mut events = self.inner.cluster.subscribe();
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let crate::app::cluster::ClusterEvent::HostRemove(address) = event {
                    match inner.upgrade() {
                        Some(inner) => inner.pools.forget(&address),
                        None => return,
                    }
                }
            }
        });

        log::info!(
            "Session {} connected; {} hosts known",
            self.inner.id,
            self.inner.cluster.hosts().len()
        );
        Ok(())
    }

    /// Close the session: cancel pending requests, drop all pools and stop
    /// the control connection. Further calls fail with `Shutdown`.
    pub async fn shutdown(&self) {
        self.inner.state.send_replace(SessionState::ShuttingDown);
        if let Some(control) = self.inner.control.lock().unwrap().take() {
            control.shutdown();
        }
        self.inner.pools.close_all();
        self.inner.state.send_replace(SessionState::Shutdown);
    }

    fn ensure_running(&self) -> Result<(), DriverError> {
        match self.state() {
            SessionState::ShuttingDown | SessionState::Shutdown => Err(DriverError::Shutdown),
            _ => Ok(()),
        }
    }

    /// Prepare a statement through the session cache. Concurrent calls for
    /// the same text collapse onto one server round-trip; entries are
    /// evicted least-recently-used beyond `max_prepared`.
    pub async fn prepare(&self, statement: &str) -> Result<Arc<PreparedStatement>, DriverError> {
        self.ensure_running()?;
        self.connect().await?;
        let slot = self.inner.prepared.slot(statement);
        let result = slot
            .get_or_try_init(|| self.prepare_round_trip(statement))
            .await
            .map(|prepared| prepared.clone());
        if result.is_err() {
            self.inner.prepared.invalidate(statement);
        }
        result
    }

    async fn prepare_round_trip(&self, statement: &str) -> Result<Arc<PreparedStatement>, DriverError> {
        let plan = self
            .inner
            .config
            .policies
            .load_balancing
            .new_plan(None, None, &self.inner.cluster);
        let mut errors = HashMap::new();
        for host in plan {
            let address = host.address();
            let connection = match self.inner.pools.acquire(address).await {
                Ok(connection) => connection,
                Err(e) => {
                    errors.insert(address, e);
                    continue;
                }
            };
            host.request_sent();
            let response = connection
                .send_request(RequestFrame::from(PrepareFrame::new(statement.to_owned())).build_payload())
                .await;
            host.request_done();
            match response {
                Ok(frame) => match frame.into_body() {
                    ResponseBody::Result(result) => match result.into_kind() {
                        ResultBodyKind::Prepared(prepared) => {
                            return Ok(Arc::new(PreparedStatement::from_result(
                                statement.to_owned(),
                                prepared,
                            )))
                        }
                        kind => {
                            return Err(DriverError::Internal(format!(
                                "Unexpected result for PREPARE: {:?}",
                                kind
                            )))
                        }
                    },
                    ResponseBody::Error(e) => return Err(DriverError::Response(e)),
                    body => {
                        return Err(DriverError::Internal(format!(
                            "Unexpected frame for PREPARE: {:?}",
                            body.opcode()
                        )))
                    }
                },
                Err(e) => {
                    errors.insert(address, e);
                }
            }
        }
        Err(DriverError::NoHostAvailable { errors })
    }

    /// Execute a statement and return the resulting rows. With the default
    /// options this is a single page whose continuation, if any, is exposed
    /// on the returned row set; `auto_page` collects every page first, and
    /// `paged = false` asks the server for the whole result in one
    /// round-trip.
    pub async fn execute(
        &self,
        statement: impl Into<Statement>,
        params: &[ParamValue],
        options: &QueryOptions,
    ) -> Result<RowSet, DriverError> {
        let statement = statement.into();
        if options.auto_page && options.paged {
            let mut set = self
                .execute_page(&statement, params, options, options.page_state.clone())
                .await?;
            while let Some(state) = set.paging_state().map(|b| b.to_vec()) {
                let next = self.execute_page(&statement, params, options, Some(state)).await?;
                set.append_page(next);
            }
            return Ok(set);
        }
        self.execute_page(&statement, params, options, options.page_state.clone())
            .await
    }

    /// Fetch exactly one page, resuming from `page_state`. The returned row
    /// set carries the next continuation if more rows exist.
    pub async fn query_single_page(
        &self,
        statement: impl Into<Statement>,
        params: &[ParamValue],
        options: &QueryOptions,
        page_state: Option<Vec<u8>>,
    ) -> Result<RowSet, DriverError> {
        let statement = statement.into();
        let mut options = options.clone();
        options.paged = true;
        self.execute_page(&statement, params, &options, page_state).await
    }

    /// Execute with auto-paging as a lazy asynchronous row sequence. Pages
    /// are fetched serially; pausing the consumer delays the next fetch, and
    /// dropping the stream abandons it after the in-flight page completes.
    pub fn execute_iter(
        &self,
        statement: impl Into<Statement>,
        params: &[ParamValue],
        options: &QueryOptions,
    ) -> RowStream {
        let mut options = options.clone();
        options.paged = true;
        options.auto_page = false;
        RowStream::spawn(self.clone(), statement.into(), params.to_vec(), options)
    }

    /// Run many statements with bounded concurrency and aggregate the
    /// outcomes.
    pub async fn execute_concurrent(
        &self,
        statements: impl IntoIterator<Item = (Statement, Vec<ParamValue>)>,
        options: ExecuteConcurrentOptions,
    ) -> ExecuteConcurrentResult {
        concurrent::execute_concurrent(self, statements, options).await
    }

    /// Execute a batch atomically on one coordinator, chosen by the planner
    /// using the first sub-statement's routing key when available.
    pub async fn batch(&self, batch: &Batch, options: &QueryOptions) -> Result<RowSet, DriverError> {
        self.ensure_running()?;
        self.validate_options(options)?;
        self.connect().await?;
        if batch.is_empty() {
            return Err(ArgumentError("Cannot execute an empty batch".to_owned()).into());
        }

        let mut queries = Vec::with_capacity(batch.statements().len());
        let mut routing_key = options.routing_key.clone();
        for (statement, params) in batch.statements() {
            let statement = match statement {
                BatchStatement::Simple(text) if options.prepare => {
                    BatchStatement::Prepared(self.prepare(text).await?)
                }
                other => other.clone(),
            };
            match statement {
                BatchStatement::Prepared(prepared) => {
                    let cells = encode_against_specs(params, &prepared)?;
                    if routing_key.is_none() {
                        routing_key = routing_key_of(&cells, prepared.pk_indexes());
                    }
                    queries.push(BatchQuery::Prepared {
                        id: prepared.id().to_vec(),
                        values: cells_to_values(cells),
                    });
                }
                BatchStatement::Simple(text) => {
                    let cells = encode_guessing(params, &[])?;
                    queries.push(BatchQuery::Query {
                        statement: text,
                        values: cells_to_values(cells),
                    });
                }
            }
        }

        let consistency = self.consistency_of(options);
        let timestamp = options.timestamp.unwrap_or_else(|| self.inner.timestamps.next());
        let keyspace = options.keyspace.clone().or_else(|| self.inner.config.keyspace.clone());
        let plan = self.inner.config.policies.load_balancing.new_plan(
            keyspace.as_deref(),
            routing_key.as_deref(),
            &self.inner.cluster,
        );

        let mut errors = HashMap::new();
        let mut retry_count = 0;
        let mut consistency = consistency;
        for host in plan {
            let address = host.address();
            let connection = match self.inner.pools.acquire(address).await {
                Ok(connection) => connection,
                Err(e) => {
                    errors.insert(address, e);
                    continue;
                }
            };
            loop {
                let frame = BatchFrame {
                    batch_type: batch.kind(),
                    queries: queries.clone(),
                    consistency,
                    serial_consistency: options.serial_consistency,
                    timestamp: Some(timestamp),
                };
                host.request_sent();
                let response = connection
                    .send_request(RequestFrame::from(frame).build_payload())
                    .await;
                host.request_done();
                let error = match response {
                    Ok(frame) => match frame.into_body() {
                        ResponseBody::Result(result) => return self.rows_of(result, None),
                        ResponseBody::Error(e) => DriverError::Response(e),
                        body => DriverError::Internal(format!("Unexpected frame: {:?}", body.opcode())),
                    },
                    Err(e) => e,
                };
                match self.consult_retry_policy(&error, options, retry_count, &mut consistency) {
                    Verdict::SameHost => {
                        retry_count += 1;
                        continue;
                    }
                    Verdict::NextHost => {
                        retry_count += 1;
                        errors.insert(address, error);
                        break;
                    }
                    Verdict::Ignore => return Ok(RowSet::empty()),
                    Verdict::Surface => return Err(error),
                }
            }
        }
        Err(DriverError::NoHostAvailable { errors })
    }

    /// One paged request through the full pipeline: prepared resolution,
    /// parameter encoding, planning, the per-host send loop with UNPREPARED
    /// re-preparation and retry-policy consultation.
    pub(crate) async fn execute_page(
        &self,
        statement: &Statement,
        params: &[ParamValue],
        options: &QueryOptions,
        page_state: Option<Vec<u8>>,
    ) -> Result<RowSet, DriverError> {
        self.ensure_running()?;
        self.validate_options(options)?;
        self.connect().await?;

        let statement = match statement {
            Statement::Simple(text) if options.prepare => Statement::Prepared(self.prepare(text).await?),
            other => other.clone(),
        };

        let (cells, routing_key) = match &statement {
            Statement::Prepared(prepared) => {
                let cells = encode_against_specs(params, prepared)?;
                let routing_key = options
                    .routing_key
                    .clone()
                    .or_else(|| routing_key_of(&cells, prepared.pk_indexes()));
                (cells, routing_key)
            }
            Statement::Simple(_) => (encode_guessing(params, &options.hints)?, options.routing_key.clone()),
        };
        let values = cells_to_values(cells);

        let mut consistency = self.consistency_of(options);
        let timestamp = options.timestamp.unwrap_or_else(|| self.inner.timestamps.next());
        let keyspace = options.keyspace.clone().or_else(|| self.inner.config.keyspace.clone());
        let plan = self.inner.config.policies.load_balancing.new_plan(
            keyspace.as_deref(),
            routing_key.as_deref(),
            &self.inner.cluster,
        );

        let mut errors = HashMap::new();
        let mut retry_count = 0;
        for host in plan {
            let address = host.address();
            let connection = match self.inner.pools.acquire(address).await {
                Ok(connection) => connection,
                Err(e) => {
                    errors.insert(address, e);
                    continue;
                }
            };
            let mut reprepared_id: Option<Vec<u8>> = None;
            loop {
                let payload = build_payload(
                    &statement,
                    reprepared_id.as_deref(),
                    values.clone(),
                    options,
                    consistency,
                    page_state.clone(),
                    timestamp,
                );
                host.request_sent();
                let response = connection.send_request(payload).await;
                host.request_done();
                let error = match response {
                    Ok(frame) => match frame.into_body() {
                        ResponseBody::Result(result) => {
                            let fallback = match &statement {
                                Statement::Prepared(prepared) if !prepared.result_columns().is_empty() => {
                                    Some(prepared.result_columns().clone())
                                }
                                _ => None,
                            };
                            let mut set = self.rows_of(result, fallback)?;
                            if !options.paged {
                                set.clear_paging_state();
                            }
                            return Ok(set);
                        }
                        ResponseBody::Error(e) if e.is_unprepared() && reprepared_id.is_none() => {
                            if let Statement::Prepared(prepared) = &statement {
                                // transparently re-prepare on this host and
                                // retry the execute once
                                log::debug!(
                                    "Re-preparing {:?} on {} after UNPREPARED",
                                    prepared.statement(),
                                    address
                                );
                                match reprepare(&connection, prepared).await {
                                    Ok(id) => {
                                        reprepared_id = Some(id);
                                        continue;
                                    }
                                    Err(err) => err,
                                }
                            } else {
                                DriverError::Response(e)
                            }
                        }
                        ResponseBody::Error(e) => DriverError::Response(e),
                        body => DriverError::Internal(format!("Unexpected frame: {:?}", body.opcode())),
                    },
                    Err(e) => e,
                };
                match self.consult_retry_policy(&error, options, retry_count, &mut consistency) {
                    Verdict::SameHost => {
                        retry_count += 1;
                        continue;
                    }
                    Verdict::NextHost => {
                        retry_count += 1;
                        errors.insert(address, error);
                        break;
                    }
                    Verdict::Ignore => return Ok(RowSet::empty()),
                    Verdict::Surface => return Err(error),
                }
            }
        }
        Err(DriverError::NoHostAvailable { errors })
    }

    /// Bind an optional value per the session's encoding options: `None`
    /// becomes the unset sentinel when `use_undefined_as_unset` is enabled,
    /// null otherwise.
    pub fn param<T: Into<crate::cql::types::CqlValue>>(&self, value: Option<T>) -> ParamValue {
        ParamValue::from_option(value, self.inner.config.encoding.use_undefined_as_unset)
    }

    fn consistency_of(&self, options: &QueryOptions) -> Consistency {
        options
            .consistency
            .or(self.inner.config.query_options.consistency)
            .unwrap_or_default()
    }

    fn validate_options(&self, options: &QueryOptions) -> Result<(), DriverError> {
        if let Some(serial) = options.serial_consistency {
            if !serial.is_serial() {
                return Err(ArgumentError(format!(
                    "Serial consistency must be SERIAL or LOCAL_SERIAL, got {}",
                    serial
                ))
                .into());
            }
        }
        Ok(())
    }

    fn consult_retry_policy(
        &self,
        error: &DriverError,
        options: &QueryOptions,
        retry_count: usize,
        consistency: &mut Consistency,
    ) -> Verdict {
        use crate::app::policy::retry::{
            RetryContext,
            RetryDecision,
        };
        let decision = self.inner.config.policies.retry.decide(&RetryContext {
            error,
            is_idempotent: options.idempotent,
            retry_count,
            consistency: *consistency,
        });
        match decision {
            RetryDecision::Retry { consistency: new } => {
                if let Some(new) = new {
                    *consistency = new;
                }
                Verdict::SameHost
            }
            RetryDecision::RetryNextHost => Verdict::NextHost,
            RetryDecision::Ignore => Verdict::Ignore,
            RetryDecision::Rethrow => Verdict::Surface,
        }
    }

    fn rows_of(
        &self,
        result: crate::cql::frame::responses::ResultFrame,
        fallback_columns: Option<Arc<Vec<crate::cql::frame::responses::result::ColumnSpec>>>,
    ) -> Result<RowSet, DriverError> {
        Ok(match result.into_kind() {
            ResultBodyKind::Rows(rows) => {
                RowSet::new(rows, fallback_columns, self.inner.config.encoding.copy_buffer)?
            }
            ResultBodyKind::Void
            | ResultBodyKind::SetKeyspace(_)
            | ResultBodyKind::SchemaChange
            | ResultBodyKind::Prepared(_) => RowSet::empty(),
        })
    }
}

enum Verdict {
    SameHost,
    NextHost,
    Ignore,
    Surface,
}

/// An encoded parameter cell.
enum Cell {
    Value(Vec<u8>),
    Null,
    Unset,
}

fn encode_param(param: &ParamValue, hint: Option<&CqlType>) -> Result<Cell, DriverError> {
    Ok(match param {
        ParamValue::Unset => Cell::Unset,
        ParamValue::Null => Cell::Null,
        ParamValue::Value(value) => {
            let cql_type = match hint {
                Some(hint) => hint.clone(),
                None => guess(value).ok_or_else(|| {
                    ArgumentError(format!(
                        "Cannot guess the CQL type of {:?}; supply a type hint",
                        value
                    ))
                })?,
            };
            let mut buffer = Vec::new();
            encode_value(value, &cql_type, &mut buffer)?;
            Cell::Value(buffer)
        }
    })
}

/// Encode against the server-issued parameter specs of a prepared
/// statement; the server types always win.
fn encode_against_specs(params: &[ParamValue], prepared: &PreparedStatement) -> Result<Vec<Cell>, DriverError> {
    let specs = prepared.params();
    if params.len() != specs.len() {
        return Err(ArgumentError(format!(
            "Expected {} parameters for {:?}, got {}",
            specs.len(),
            prepared.statement(),
            params.len()
        ))
        .into());
    }
    params
        .iter()
        .zip(specs.iter())
        .map(|(param, spec)| encode_param(param, Some(&spec.cql_type)))
        .collect()
}

/// Encode a simple statement's parameters: positional user hints first,
/// type guessing as the fallback.
fn encode_guessing(params: &[ParamValue], hints: &[Option<CqlType>]) -> Result<Vec<Cell>, DriverError> {
    params
        .iter()
        .enumerate()
        .map(|(i, param)| encode_param(param, hints.get(i).and_then(|h| h.as_ref())))
        .collect()
}

fn cells_to_values(cells: Vec<Cell>) -> Values {
    let mut values = Values::default();
    for cell in cells {
        match cell {
            Cell::Value(bytes) => values.push(&bytes),
            Cell::Null => values.push_null(),
            Cell::Unset => values.push_unset(),
        }
    }
    values
}

/// Derive the serialized routing key from the bound partition-key cells:
/// the single component raw, or each component length-framed with a
/// trailing zero byte for composite keys.
fn routing_key_of(cells: &[Cell], pk_indexes: &[u16]) -> Option<Vec<u8>> {
    match pk_indexes {
        [] => None,
        [single] => match cells.get(*single as usize)? {
            Cell::Value(bytes) => Some(bytes.clone()),
            _ => None,
        },
        composite => {
            let mut key = Vec::new();
            for index in composite {
                match cells.get(*index as usize)? {
                    Cell::Value(bytes) => {
                        key.extend((bytes.len() as u16).to_be_bytes());
                        key.extend(bytes);
                        key.push(0);
                    }
                    _ => return None,
                }
            }
            Some(key)
        }
    }
}

fn build_payload(
    statement: &Statement,
    reprepared_id: Option<&[u8]>,
    values: Values,
    options: &QueryOptions,
    consistency: Consistency,
    page_state: Option<Vec<u8>>,
    timestamp: i64,
) -> Vec<u8> {
    let parameters = QueryParameters {
        consistency,
        values,
        skip_metadata: false,
        // unpaged requests still bound the response; they just ignore the
        // continuation afterwards
        page_size: Some(options.fetch_size),
        paging_state: page_state,
        serial_consistency: options.serial_consistency,
        timestamp: Some(timestamp),
        keyspace: None,
    };
    let mut frame = match statement {
        Statement::Prepared(prepared) => RequestFrame::from(ExecuteFrame {
            id: reprepared_id.map(|id| id.to_vec()).unwrap_or_else(|| prepared.id().to_vec()),
            parameters,
        }),
        Statement::Simple(text) => RequestFrame::from(QueryFrame {
            statement: text.clone(),
            parameters,
        }),
    };
    if options.trace_query {
        frame.header.flags_mut().set_tracing(true);
    }
    frame.build_payload()
}

/// Re-prepare a statement on the given connection, returning the fresh id.
async fn reprepare(connection: &Connection, prepared: &PreparedStatement) -> Result<Vec<u8>, DriverError> {
    let response = connection
        .send_request(RequestFrame::from(PrepareFrame::new(prepared.statement().to_owned())).build_payload())
        .await?;
    match response.into_body() {
        ResponseBody::Result(result) => match result.into_kind() {
            ResultBodyKind::Prepared(fresh) => Ok(fresh.id().to_vec()),
            kind => Err(DriverError::Internal(format!(
                "Unexpected result for re-prepare: {:?}",
                kind
            ))),
        },
        ResponseBody::Error(e) => Err(DriverError::Response(e)),
        body => Err(DriverError::Internal(format!(
            "Unexpected frame for re-prepare: {:?}",
            body.opcode()
        ))),
    }
}

/// Resolve contact points given as `ip`, `ip:port` or `host[:port]`.
async fn resolve_contact_points(contact_points: &[String], default_port: u16) -> Result<Vec<SocketAddr>, DriverError> {
    let mut resolved = Vec::new();
    for point in contact_points {
        if let Ok(address) = point.parse::<SocketAddr>() {
            resolved.push(address);
            continue;
        }
        if let Ok(ip) = point.parse::<std::net::IpAddr>() {
            resolved.push(SocketAddr::new(ip, default_port));
            continue;
        }
        let lookup: Vec<SocketAddr> = if point.contains(':') {
            tokio::net::lookup_host(point.as_str()).await.ok().into_iter().flatten().collect()
        } else {
            tokio::net::lookup_host((point.as_str(), default_port))
                .await
                .ok()
                .into_iter()
                .flatten()
                .collect()
        };
        if lookup.is_empty() {
            log::warn!("Contact point {:?} did not resolve", point);
        }
        resolved.extend(lookup);
    }
    if resolved.is_empty() {
        return Err(ArgumentError("No contact point could be resolved".to_owned()).into());
    }
    Ok(resolved)
}

/// Lower the session configuration into per-connection settings.
fn connection_config(config: &SessionConfig, id: Uuid) -> ConnectionConfig {
    let mut startup_identity = vec![
        (startup::DRIVER_NAME.to_owned(), env!("CARGO_PKG_NAME").to_owned()),
        (startup::DRIVER_VERSION.to_owned(), env!("CARGO_PKG_VERSION").to_owned()),
        (startup::CLIENT_ID.to_owned(), id.to_string()),
    ];
    if let Some(name) = &config.application_name {
        startup_identity.push((startup::APPLICATION_NAME.to_owned(), name.clone()));
    }
    if let Some(version) = &config.application_version {
        startup_identity.push((startup::APPLICATION_VERSION.to_owned(), version.clone()));
    }
    if config.protocol_options.no_compact {
        startup_identity.push((startup::NO_COMPACT.to_owned(), "true".to_owned()));
    }
    ConnectionConfig {
        connect_timeout: config.socket_options.connect_timeout,
        read_timeout: Some(config.socket_options.read_timeout).filter(|t| !t.is_zero()),
        keep_alive: config
            .socket_options
            .keep_alive
            .then_some(config.socket_options.keep_alive_delay),
        tcp_nodelay: config.socket_options.tcp_no_delay,
        heartbeat_interval: config.pooling.heart_beat_interval,
        defunct_read_timeout_threshold: config.socket_options.defunct_read_timeout_threshold,
        max_in_flight: config.pooling.max_requests_per_connection,
        coalescing_threshold: config.socket_options.coalescing_threshold,
        ssl: config.ssl_options.clone(),
        auth: match &config.credentials {
            Some(credentials) => Arc::new(PlainTextAuthProvider::new(credentials.clone())),
            None => Arc::new(NoAuthProvider),
        },
        startup_identity,
        keyspace: config.keyspace.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::{
        frame::responses::result::ColumnSpec,
        types::CqlValue,
    };

    #[test]
    fn simple_params_guess_when_unhinted() {
        let cells = encode_guessing(
            &[ParamValue::from(42i32), ParamValue::from("x"), ParamValue::Null],
            &[],
        )
        .unwrap();
        assert!(matches!(&cells[0], Cell::Value(b) if b == &42i32.to_be_bytes().to_vec()));
        assert!(matches!(&cells[1], Cell::Value(b) if b == b"x"));
        assert!(matches!(&cells[2], Cell::Null));
    }

    #[test]
    fn hints_override_guessing() {
        let cells = encode_guessing(&[ParamValue::from(42i32)], &[Some(CqlType::SmallInt)]).unwrap();
        assert!(matches!(&cells[0], Cell::Value(b) if b == &42i16.to_be_bytes().to_vec()));
    }

    #[test]
    fn unhintable_values_error() {
        let result = encode_guessing(&[ParamValue::Value(CqlValue::Map(vec![]))], &[]);
        assert!(matches!(result, Err(DriverError::Argument(_))));
    }

    #[test]
    fn routing_keys_follow_the_composite_format() {
        let cells = vec![
            Cell::Value(vec![1, 2]),
            Cell::Value(vec![3]),
            Cell::Value(vec![4, 5, 6]),
        ];
        assert_eq!(routing_key_of(&cells, &[0]), Some(vec![1, 2]));
        assert_eq!(
            routing_key_of(&cells, &[0, 2]),
            Some(vec![0, 2, 1, 2, 0, 0, 3, 4, 5, 6, 0])
        );
        assert_eq!(routing_key_of(&cells, &[]), None);
        assert_eq!(routing_key_of(&[Cell::Null], &[0]), None);
    }

    #[test]
    fn optional_params_follow_encoding_options() {
        let config = SessionConfigBuilder::default()
            .contact_points(vec!["127.0.0.1".to_owned()])
            .build()
            .unwrap();
        let session = Session::new(config.clone());
        assert_eq!(session.param::<i32>(None), ParamValue::Unset);
        assert_eq!(session.param(Some(5i32)), ParamValue::Value(CqlValue::Int(5)));

        let mut config = config;
        config.encoding.use_undefined_as_unset = false;
        let session = Session::new(config);
        assert_eq!(session.param::<i32>(None), ParamValue::Null);
    }

    #[test]
    fn prepared_arity_is_checked() {
        let prepared = PreparedStatement::from_result(
            "INSERT INTO t (id, v) VALUES (?, ?)".to_owned(),
            crate::cql::frame::responses::result::PreparedResult::new(
                vec![1],
                vec![0],
                vec![
                    ColumnSpec::new("id", CqlType::Uuid),
                    ColumnSpec::new("v", CqlType::Int),
                ],
                None,
            ),
        );
        let result = encode_against_specs(&[ParamValue::from(1i32)], &prepared);
        assert!(matches!(result, Err(DriverError::Argument(_))));
    }
}
