// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The token ring: a sorted map from token to owning host, with the ring
//! walk that derives replica sets.

use super::Host;
use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::Arc,
};

/// A snapshot of the Murmur3 token ring. Each host owns the ranges ending
/// at its tokens; replicas for a token are found by walking the ring
/// clockwise from the token, collecting distinct hosts.
#[derive(Clone, Debug, Default)]
pub struct TokenRing {
    ring: BTreeMap<i64, SocketAddr>,
}

impl TokenRing {
    /// Build the ring from the token assignments of all hosts.
    pub fn build<'a>(hosts: impl Iterator<Item = &'a Arc<Host>>) -> Self {
        let mut ring = BTreeMap::new();
        for host in hosts {
            for token in host.tokens() {
                ring.insert(*token, host.address());
            }
        }
        Self { ring }
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// The addresses of the hosts replicating `token`, primary owner first.
    /// The walk starts at the first ring token at or after `token`, wraps
    /// around, and keeps the first occurrence of each host.
    pub fn replicas(&self, token: i64, replication_factor: usize) -> impl Iterator<Item = SocketAddr> + '_ {
        let mut seen = Vec::with_capacity(replication_factor);
        self.ring
            .range(token..)
            .chain(self.ring.iter())
            .map(|(_, address)| *address)
            .filter(move |address| {
                if seen.contains(address) {
                    false
                } else {
                    seen.push(*address);
                    true
                }
            })
            .take(replication_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(n: u8, tokens: Vec<i64>) -> Arc<Host> {
        Arc::new(Host::new(
            format!("10.0.0.{}:9042", n).parse().unwrap(),
            None,
            None,
            tokens,
        ))
    }

    fn addr(n: u8) -> SocketAddr {
        format!("10.0.0.{}:9042", n).parse().unwrap()
    }

    #[test]
    fn primary_owner_is_next_token() {
        let hosts = vec![host(1, vec![-100, 100]), host(2, vec![0, 200])];
        let ring = TokenRing::build(hosts.iter());
        assert_eq!(ring.replicas(-50, 1).collect::<Vec<_>>(), [addr(2)]);
        assert_eq!(ring.replicas(50, 1).collect::<Vec<_>>(), [addr(1)]);
        assert_eq!(ring.replicas(100, 1).collect::<Vec<_>>(), [addr(1)]);
    }

    #[test]
    fn walk_wraps_around() {
        let hosts = vec![host(1, vec![0]), host(2, vec![100])];
        let ring = TokenRing::build(hosts.iter());
        assert_eq!(ring.replicas(150, 2).collect::<Vec<_>>(), [addr(1), addr(2)]);
    }

    #[test]
    fn replicas_are_distinct_hosts() {
        let hosts = vec![host(1, vec![0, 10, 20]), host(2, vec![100])];
        let ring = TokenRing::build(hosts.iter());
        let replicas: Vec<_> = ring.replicas(-5, 3).collect();
        assert_eq!(replicas, [addr(1), addr(2)]);
    }

    #[test]
    fn empty_ring_yields_nothing() {
        let ring = TokenRing::default();
        assert_eq!(ring.replicas(0, 3).count(), 0);
    }
}
