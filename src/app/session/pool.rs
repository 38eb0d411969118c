// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Per-host connection pools. Pools are created lazily at first use, keep
//! `core_connections_per_host` links open, and probe downed hosts on the
//! reconnection schedule.

use crate::{
    app::{
        cluster::Cluster,
        connection::{
            Connection,
            ConnectionConfig,
        },
        error::DriverError,
        policy::reconnection::ReconnectionPolicy,
    },
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
        RwLock,
    },
};

pub(crate) struct Pools {
    pools: RwLock<HashMap<SocketAddr, Arc<HostPool>>>,
    config: ConnectionConfig,
    core: usize,
    max_requests: usize,
    cluster: Arc<Cluster>,
    reconnection: Arc<dyn ReconnectionPolicy>,
}

impl Pools {
    pub fn new(
        config: ConnectionConfig,
        core: usize,
        max_requests: usize,
        cluster: Arc<Cluster>,
        reconnection: Arc<dyn ReconnectionPolicy>,
    ) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            config,
            core: core.max(1),
            max_requests,
            cluster,
            reconnection,
        }
    }

    fn pool_of(&self, address: SocketAddr) -> Arc<HostPool> {
        if let Some(pool) = self.pools.read().unwrap().get(&address) {
            return pool.clone();
        }
        self.pools
            .write()
            .unwrap()
            .entry(address)
            .or_insert_with(|| {
                Arc::new(HostPool {
                    address,
                    connections: Mutex::new(Vec::new()),
                    next: AtomicUsize::new(0),
                    opening: tokio::sync::Mutex::new(()),
                    probing: AtomicBool::new(false),
                })
            })
            .clone()
    }

    /// Pick a connection to `address`, opening one when the pool is below
    /// its core size. Fails with `BusyConnection` when every open link is
    /// at its in-flight cap.
    pub async fn acquire(&self, address: SocketAddr) -> Result<Connection, DriverError> {
        let pool = self.pool_of(address);
        match pool.acquire(&self.config, self.core, self.max_requests).await {
            Ok(connection) => Ok(connection),
            Err(e) => {
                // an unreachable host is probed in the background until it
                // answers again
                if matches!(e, DriverError::Broken(_)) {
                    self.cluster.mark_down(&address);
                    self.spawn_probe(pool);
                }
                Err(e)
            }
        }
    }

    /// Forget the pool of a removed host.
    pub fn forget(&self, address: &SocketAddr) {
        self.pools.write().unwrap().remove(address);
    }

    /// Close every connection of every pool, failing their pending
    /// requests. Used on session shutdown.
    pub fn close_all(&self) {
        let pools = std::mem::take(&mut *self.pools.write().unwrap());
        for pool in pools.values() {
            for connection in pool.connections.lock().unwrap().drain(..) {
                connection.close();
            }
        }
    }

    fn spawn_probe(&self, pool: Arc<HostPool>) {
        if pool.probing.swap(true, Ordering::SeqCst) {
            return;
        }
        let cluster = self.cluster.clone();
        let config = self.config.clone();
        let reconnection = self.reconnection.clone();
        tokio::spawn(async move {
            let mut attempt = 0;
            loop {
                tokio::time::sleep(reconnection.next_delay(attempt)).await;
                attempt += 1;
                match Connection::open(pool.address, &config).await {
                    Ok(connection) => {
                        pool.connections.lock().unwrap().push(connection);
                        pool.probing.store(false, Ordering::SeqCst);
                        cluster.mark_up(&pool.address);
                        return;
                    }
                    Err(e) => {
                        log::debug!("Probe of {} failed (attempt {}): {}", pool.address, attempt, e);
                    }
                }
            }
        });
    }
}

pub(crate) struct HostPool {
    address: SocketAddr,
    connections: Mutex<Vec<Connection>>,
    next: AtomicUsize,
    opening: tokio::sync::Mutex<()>,
    /// Set while a background reconnect probe runs for this host.
    probing: AtomicBool,
}

impl HostPool {
    async fn acquire(
        &self,
        config: &ConnectionConfig,
        core: usize,
        max_requests: usize,
    ) -> Result<Connection, DriverError> {
        loop {
            let (candidate, open_count) = {
                let mut connections = self.connections.lock().unwrap();
                connections.retain(|c| !c.is_defunct());
                let len = connections.len();
                let candidate = (!connections.is_empty()).then(|| {
                    let start = self.next.fetch_add(1, Ordering::Relaxed);
                    (0..len)
                        .map(|i| connections[(start + i) % len].clone())
                        .find(|c| c.in_flight() < max_requests)
                });
                (candidate, len)
            };
            match candidate {
                Some(Some(connection)) => return Ok(connection),
                Some(None) if open_count >= core => return Err(DriverError::BusyConnection(self.address)),
                _ => (),
            }

            // below core size: open a new link, one opener at a time
            let _guard = self.opening.lock().await;
            {
                let connections = self.connections.lock().unwrap();
                if connections.len() > open_count {
                    // another opener got there first; retry the fast path
                    continue;
                }
            }
            let connection = Connection::open(self.address, config).await?;
            self.connections.lock().unwrap().push(connection.clone());
            return Ok(connection);
        }
    }
}
