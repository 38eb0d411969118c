// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Client-side timestamp generation.

use std::sync::atomic::{
    AtomicI64,
    Ordering,
};

/// Produces the default write timestamps: microseconds since the epoch,
/// strictly monotonic within a session. If the wall clock regresses, the
/// generator keeps counting up from the last returned value.
#[derive(Debug, Default)]
pub struct MonotonicTimestampGenerator {
    last: AtomicI64,
}

impl MonotonicTimestampGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next timestamp, in microseconds since the epoch.
    pub fn next(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_micros();
        self.last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(if now > last { now } else { last + 1 })
            })
            .unwrap()
    }
}
