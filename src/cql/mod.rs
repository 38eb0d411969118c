// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The CQL protocol layer: wire frames, the type system and the partitioner.

pub mod frame;
pub mod murmur3;
pub mod types;

pub use murmur3::murmur3_cassandra_x64_128;
