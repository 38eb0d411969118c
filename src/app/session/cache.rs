// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The prepared-statement cache: bounded, least-recently-used, with
//! concurrent preparations of the same text collapsed onto one in-flight
//! round-trip.

use super::statement::PreparedStatement;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::OnceCell;

/// The once-initialized slot shared by every caller preparing the same text.
pub(crate) type PreparedSlot = Arc<OnceCell<Arc<PreparedStatement>>>;

struct CacheEntry {
    slot: PreparedSlot,
    last_used: u64,
}

pub(crate) struct PreparedCache {
    max: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    map: HashMap<String, CacheEntry>,
    tick: u64,
}

impl PreparedCache {
    pub fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// Fetch or create the slot for a query text, refreshing its recency.
    /// Inserting over capacity evicts the least recently used other entry.
    pub fn slot(&self, text: &str) -> PreparedSlot {
        let mut inner = self.inner.lock().unwrap();
        inner.tick += 1;
        let tick = inner.tick;
        if let Some(entry) = inner.map.get_mut(text) {
            entry.last_used = tick;
            return entry.slot.clone();
        }
        if inner.map.len() >= self.max {
            if let Some(evict) = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(text, _)| text.clone())
            {
                inner.map.remove(&evict);
            }
        }
        let slot: PreparedSlot = Arc::new(OnceCell::new());
        inner.map.insert(
            text.to_owned(),
            CacheEntry {
                slot: slot.clone(),
                last_used: tick,
            },
        );
        slot
    }

    /// Drop a slot whose preparation failed so that the next caller starts
    /// fresh.
    pub fn invalidate(&self, text: &str) {
        self.inner.lock().unwrap().map.remove(text);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::frame::responses::result::PreparedResult;

    fn prepared(text: &str) -> Arc<PreparedStatement> {
        Arc::new(PreparedStatement::from_result(
            text.to_owned(),
            PreparedResult::new(vec![1], vec![], vec![], None),
        ))
    }

    #[test]
    fn same_text_shares_one_slot() {
        let cache = PreparedCache::new(4);
        let a = cache.slot("SELECT 1");
        let b = cache.slot("SELECT 1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_is_bounded_lru() {
        let cache = PreparedCache::new(2);
        let first = cache.slot("q1");
        cache.slot("q2");
        // refresh q1 so q2 is the eviction candidate
        cache.slot("q1");
        cache.slot("q3");
        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(&first, &cache.slot("q1")));
        // q2 was evicted: a new slot is created for it
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_prepares_collapse() {
        let cache = Arc::new(PreparedCache::new(4));
        let slot = cache.slot("INSERT");
        let round_trips = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let slot = slot.clone();
            let round_trips = round_trips.clone();
            handles.push(tokio::spawn(async move {
                slot.get_or_try_init(|| async {
                    round_trips.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(prepared("INSERT"))
                })
                .await
                .unwrap()
                .clone()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(round_trips.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
