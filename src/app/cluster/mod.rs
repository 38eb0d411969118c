// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Cluster topology: the host registry, per-host health counters, the token
//! ring and the control connection that keeps them current.

pub mod control;
pub mod ring;

pub use control::ControlConnection;
pub use ring::TokenRing;

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{
            AtomicBool,
            AtomicI64,
            AtomicU64,
            AtomicUsize,
            Ordering,
        },
        Arc,
        RwLock,
    },
};
use tokio::sync::broadcast;

/// One cluster node. Identity fields are immutable; status and health
/// counters mutate under atomics. The registry replaces the whole record
/// when discovery learns new identity data.
#[derive(Debug)]
pub struct Host {
    address: SocketAddr,
    datacenter: Option<String>,
    rack: Option<String>,
    tokens: Vec<i64>,
    up: AtomicBool,
    /// Milliseconds since the epoch of the last down→up transition; 0 while
    /// the host has never come up.
    up_since: AtomicI64,
    in_flight: AtomicUsize,
    responses: AtomicU64,
}

impl Host {
    pub fn new(address: SocketAddr, datacenter: Option<String>, rack: Option<String>, tokens: Vec<i64>) -> Self {
        Self {
            address,
            datacenter,
            rack,
            tokens,
            up: AtomicBool::new(true),
            up_since: AtomicI64::new(chrono::Utc::now().timestamp_millis()),
            in_flight: AtomicUsize::new(0),
            responses: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn datacenter(&self) -> Option<&str> {
        self.datacenter.as_deref()
    }

    pub fn rack(&self) -> Option<&str> {
        self.rack.as_deref()
    }

    pub fn tokens(&self) -> &[i64] {
        &self.tokens
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    /// The instant the host last came up, or `None` while down.
    pub fn up_since(&self) -> Option<i64> {
        let ms = self.up_since.load(Ordering::Relaxed);
        (self.is_up() && ms != 0).then_some(ms)
    }

    pub(crate) fn set_up(&self) -> bool {
        let was_down = !self.up.swap(true, Ordering::Relaxed);
        if was_down {
            self.up_since
                .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
        }
        was_down
    }

    pub(crate) fn set_down(&self) -> bool {
        self.up.swap(false, Ordering::Relaxed)
    }

    /// Requests currently executing against this host.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Responses received from this host over its lifetime.
    pub fn responses(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    pub(crate) fn request_sent(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn request_done(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.responses.fetch_add(1, Ordering::Relaxed);
    }
}

/// Topology change notifications, mirrored from server events and local
/// connection health.
#[derive(Clone, Debug)]
pub enum ClusterEvent {
    HostAdd(Arc<Host>),
    HostRemove(SocketAddr),
    HostUp(Arc<Host>),
    HostDown(Arc<Host>),
}

/// The host registry and token ring. Reads dominate; mutation happens only
/// on topology events and (re)discovery.
pub struct Cluster {
    hosts: RwLock<HashMap<SocketAddr, Arc<Host>>>,
    ring: RwLock<TokenRing>,
    events: broadcast::Sender<ClusterEvent>,
}

impl Default for Cluster {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            hosts: RwLock::new(HashMap::new()),
            ring: RwLock::new(TokenRing::default()),
            events,
        }
    }
}

impl Cluster {
    /// Seed the registry with the configured contact points, before any
    /// datacenter or token information is known.
    pub fn seed(&self, contact_points: &[SocketAddr]) {
        let mut hosts = self.hosts.write().unwrap();
        for address in contact_points {
            hosts
                .entry(*address)
                .or_insert_with(|| Arc::new(Host::new(*address, None, None, Vec::new())));
        }
    }

    /// Subscribe to host lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, address: &SocketAddr) -> Option<Arc<Host>> {
        self.hosts.read().unwrap().get(address).cloned()
    }

    /// A snapshot of all known hosts.
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        self.hosts.read().unwrap().values().cloned().collect()
    }

    /// A snapshot of all hosts currently marked up.
    pub fn up_hosts(&self) -> Vec<Arc<Host>> {
        self.hosts
            .read()
            .unwrap()
            .values()
            .filter(|h| h.is_up())
            .cloned()
            .collect()
    }

    /// Replace or insert a host record learned from discovery, rebuilding
    /// the ring afterwards via [`Cluster::rebuild_ring`].
    pub fn upsert(&self, host: Host) -> Arc<Host> {
        let address = host.address();
        let host = Arc::new(host);
        let previous = self.hosts.write().unwrap().insert(address, host.clone());
        match previous {
            Some(old) => {
                // carry the mutable status over to the new record
                if !old.is_up() {
                    host.up.store(false, Ordering::Relaxed);
                }
                host.up_since.store(old.up_since.load(Ordering::Relaxed), Ordering::Relaxed);
            }
            None => {
                let _ = self.events.send(ClusterEvent::HostAdd(host.clone()));
            }
        }
        host
    }

    /// Drop a host that left the ring.
    pub fn remove(&self, address: &SocketAddr) {
        if self.hosts.write().unwrap().remove(address).is_some() {
            let _ = self.events.send(ClusterEvent::HostRemove(*address));
            self.rebuild_ring();
        }
    }

    pub fn mark_up(&self, address: &SocketAddr) {
        if let Some(host) = self.get(address) {
            if host.set_up() {
                log::info!("Host {} is up", address);
                let _ = self.events.send(ClusterEvent::HostUp(host));
            }
        }
    }

    pub fn mark_down(&self, address: &SocketAddr) {
        if let Some(host) = self.get(address) {
            if host.set_down() {
                log::warn!("Host {} is down", address);
                let _ = self.events.send(ClusterEvent::HostDown(host));
            }
        }
    }

    /// Rebuild the token ring from the current host records.
    pub fn rebuild_ring(&self) {
        let hosts = self.hosts.read().unwrap();
        let ring = TokenRing::build(hosts.values());
        *self.ring.write().unwrap() = ring;
    }

    /// The hosts holding replicas for a token, primary owner first.
    pub fn replicas(&self, token: i64, replication_factor: usize) -> Vec<Arc<Host>> {
        let ring = self.ring.read().unwrap();
        let hosts = self.hosts.read().unwrap();
        ring.replicas(token, replication_factor)
            .filter_map(|address| hosts.get(&address).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> SocketAddr {
        format!("10.0.0.{}:9042", n).parse().unwrap()
    }

    #[test]
    fn seeding_is_idempotent() {
        let cluster = Cluster::default();
        cluster.seed(&[addr(1), addr(2)]);
        cluster.seed(&[addr(2), addr(3)]);
        assert_eq!(cluster.hosts().len(), 3);
    }

    #[test]
    fn upsert_preserves_status() {
        let cluster = Cluster::default();
        cluster.upsert(Host::new(addr(1), Some("dc1".into()), None, vec![1]));
        cluster.mark_down(&addr(1));
        let host = cluster.upsert(Host::new(addr(1), Some("dc1".into()), Some("r1".into()), vec![1, 2]));
        assert!(!host.is_up());
        assert_eq!(host.rack(), Some("r1"));
    }

    #[test]
    fn up_down_events_fire_once() {
        let cluster = Cluster::default();
        cluster.upsert(Host::new(addr(1), None, None, vec![]));
        let mut events = cluster.subscribe();
        cluster.mark_down(&addr(1));
        cluster.mark_down(&addr(1));
        cluster.mark_up(&addr(1));
        assert!(matches!(events.try_recv().unwrap(), ClusterEvent::HostDown(_)));
        assert!(matches!(events.try_recv().unwrap(), ClusterEvent::HostUp(_)));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn counters_track_requests() {
        let host = Host::new(addr(1), None, None, vec![]);
        host.request_sent();
        host.request_sent();
        assert_eq!(host.in_flight(), 2);
        host.request_done();
        assert_eq!(host.in_flight(), 1);
        assert_eq!(host.responses(), 1);
    }

    #[test]
    fn replicas_walk_the_ring() {
        let cluster = Cluster::default();
        cluster.upsert(Host::new(addr(1), None, None, vec![0]));
        cluster.upsert(Host::new(addr(2), None, None, vec![100]));
        cluster.upsert(Host::new(addr(3), None, None, vec![200]));
        cluster.rebuild_ring();
        let replicas = cluster.replicas(150, 2);
        assert_eq!(replicas.len(), 2);
        assert_eq!(replicas[0].address(), addr(3));
        assert_eq!(replicas[1].address(), addr(1));
    }
}
