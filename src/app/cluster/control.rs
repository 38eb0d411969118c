// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The control connection: discovers peers through the system tables,
//! registers for server events and keeps the registry current, reconnecting
//! with backoff when its node goes away.

use super::{
    Cluster,
    Host,
};
use crate::{
    app::{
        connection::{
            Connection,
            ConnectionConfig,
        },
        error::DriverError,
        policy::reconnection::ReconnectionPolicy,
    },
    cql::frame::{
        requests::register,
        responses::{
            EventFrame,
            ResponseBody,
            ResultBodyKind,
            RowsResult,
            StatusChange,
            TopologyChange,
        },
        rows::RowSet,
    },
    cql::types::CqlValue,
};
use std::{
    net::SocketAddr,
    sync::Arc,
};
use tokio::sync::mpsc;

const LOCAL_QUERY: &str = "SELECT data_center, rack, tokens FROM system.local";
const PEERS_QUERY: &str = "SELECT peer, data_center, rack, tokens FROM system.peers";

/// Owns the event-registered connection feeding the registry.
pub struct ControlConnection {
    cluster: Arc<Cluster>,
    config: ConnectionConfig,
    reconnection: Arc<dyn ReconnectionPolicy>,
    stopped: std::sync::atomic::AtomicBool,
    current: std::sync::Mutex<Option<Connection>>,
}

impl ControlConnection {
    /// Connect to the first reachable host, run discovery, and spawn the
    /// event/reconnect loop. Fails only if every contact point is
    /// unreachable, collecting per-host reasons.
    pub async fn start(
        cluster: Arc<Cluster>,
        contact_points: &[SocketAddr],
        config: ConnectionConfig,
        reconnection: Arc<dyn ReconnectionPolicy>,
    ) -> Result<Arc<Self>, DriverError> {
        let control = Arc::new(Self {
            cluster,
            config,
            reconnection,
            stopped: std::sync::atomic::AtomicBool::new(false),
            current: std::sync::Mutex::new(None),
        });
        let mut errors = std::collections::HashMap::new();
        for address in contact_points {
            match control.connect_and_discover(*address).await {
                Ok(connection) => {
                    control.clone().spawn_monitor(connection);
                    return Ok(control);
                }
                Err(e) => {
                    log::warn!("Control connection to contact point {} failed: {}", address, e);
                    errors.insert(*address, e);
                }
            }
        }
        Err(DriverError::NoHostAvailable { errors })
    }

    async fn connect_and_discover(&self, address: SocketAddr) -> Result<Connection, DriverError> {
        let connection = Connection::open(address, &self.config).await?;
        self.discover(&connection).await?;
        connection
            .register(vec![
                register::TOPOLOGY_CHANGE.to_owned(),
                register::STATUS_CHANGE.to_owned(),
            ])
            .await?;
        self.cluster.mark_up(&address);
        Ok(connection)
    }

    /// Query the system tables and merge the answers into the registry.
    async fn discover(&self, connection: &Connection) -> Result<(), DriverError> {
        let port = connection.address().port();

        let local = fetch_rows(connection, LOCAL_QUERY).await?;
        for row in RowSet::new(local, None, true)?.into_rows()? {
            self.cluster.upsert(Host::new(
                connection.address(),
                text_column(row.get("data_center")),
                text_column(row.get("rack")),
                token_column(row.get("tokens")),
            ));
        }

        let peers = fetch_rows(connection, PEERS_QUERY).await?;
        for row in RowSet::new(peers, None, true)?.into_rows()? {
            let peer = match row.get("peer") {
                Some(CqlValue::Inet(ip)) => SocketAddr::new(*ip, port),
                _ => continue,
            };
            self.cluster.upsert(Host::new(
                peer,
                text_column(row.get("data_center")),
                text_column(row.get("rack")),
                token_column(row.get("tokens")),
            ));
        }

        self.cluster.rebuild_ring();
        Ok(())
    }

    /// Stop the monitor loop and close the live connection.
    pub fn shutdown(&self) {
        self.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
        if let Some(connection) = self.current.lock().unwrap().take() {
            connection.close();
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Consume events from the live connection; when it dies, reconnect to
    /// any known host following the backoff schedule.
    fn spawn_monitor(self: Arc<Self>, connection: Connection) {
        *self.current.lock().unwrap() = Some(connection.clone());
        tokio::spawn(async move {
            let mut connection = connection;
            loop {
                let (event_tx, mut event_rx) = mpsc::unbounded_channel();
                connection.set_event_sink(event_tx);
                loop {
                    tokio::select! {
                        event = event_rx.recv() => match event {
                            Some(event) => self.handle_event(&connection, event).await,
                            None => break,
                        },
                        _ = connection.wait_until_closed() => break,
                    }
                }
                if self.is_stopped() {
                    return;
                }
                self.cluster.mark_down(&connection.address());

                let mut attempt = 0;
                connection = loop {
                    let delay = self.reconnection.next_delay(attempt);
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    if self.is_stopped() {
                        return;
                    }
                    let hosts = self.cluster.hosts();
                    let mut reconnected = None;
                    for host in hosts {
                        match self.connect_and_discover(host.address()).await {
                            Ok(connection) => {
                                reconnected = Some(connection);
                                break;
                            }
                            Err(e) => {
                                log::debug!("Control reconnect to {} failed: {}", host.address(), e);
                            }
                        }
                    }
                    match reconnected {
                        Some(connection) => break connection,
                        None => {
                            log::warn!("Control connection could not reach any host (attempt {})", attempt)
                        }
                    }
                };
                *self.current.lock().unwrap() = Some(connection.clone());
            }
        });
    }

    async fn handle_event(&self, connection: &Connection, event: EventFrame) {
        match event {
            EventFrame::TopologyChange(TopologyChange::NewNode(_)) => {
                // re-read the system tables to learn the node's dc and tokens
                if let Err(e) = self.discover(connection).await {
                    log::warn!("Discovery after topology change failed: {}", e);
                }
            }
            EventFrame::TopologyChange(TopologyChange::RemovedNode(address)) => {
                self.cluster.remove(&address);
            }
            EventFrame::StatusChange(StatusChange::Up(address)) => {
                self.cluster.mark_up(&address);
            }
            EventFrame::StatusChange(StatusChange::Down(address)) => {
                self.cluster.mark_down(&address);
            }
            EventFrame::SchemaChange => (),
        }
    }
}

async fn fetch_rows(connection: &Connection, query: &str) -> Result<RowsResult, DriverError> {
    let response = connection.query(query).await?;
    match response.into_body() {
        ResponseBody::Result(result) => match result.into_kind() {
            ResultBodyKind::Rows(rows) => Ok(rows),
            kind => Err(DriverError::Internal(format!(
                "Expected rows from {:?}, got {:?}",
                query, kind
            ))),
        },
        ResponseBody::Error(e) => Err(DriverError::Response(e)),
        body => Err(DriverError::Internal(format!(
            "Unexpected frame for discovery: {:?}",
            body.opcode()
        ))),
    }
}

fn text_column(value: Option<&CqlValue>) -> Option<String> {
    value.and_then(|v| v.as_text()).map(str::to_owned)
}

/// Token lists arrive as `set<text>` of decimal numbers.
fn token_column(value: Option<&CqlValue>) -> Vec<i64> {
    match value {
        Some(CqlValue::Set(tokens)) | Some(CqlValue::List(tokens)) => tokens
            .iter()
            .filter_map(|t| t.as_text())
            .filter_map(|t| t.parse().ok())
            .collect(),
        _ => Vec::new(),
    }
}
