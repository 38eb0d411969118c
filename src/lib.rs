// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! An asynchronous driver for Cassandra-compatible wide-column databases,
//! speaking CQL native protocol v4 over TCP.
//!
//! The crate is split in two layers:
//! - [`cql`]: the wire protocol (frame codec, request/response frames) and
//!   the CQL type system (type descriptors, dynamic values, the value codec
//!   and the Murmur3 partitioner).
//! - [`app`]: the driver runtime (session, execution engine, connections,
//!   cluster topology and the pluggable policies).

pub mod app;
pub mod cql;

pub mod prelude {
    pub use super::{
        app::{
            cluster::{
                ClusterEvent,
                Host,
            },
            error::DriverError,
            policy::{
                load_balancing::*,
                retry::*,
                timestamp::MonotonicTimestampGenerator,
            },
            session::{
                Batch,
                BatchStatement,
                BatchType,
                ExecuteConcurrentOptions,
                PreparedStatement,
                QueryOptions,
                RowStream,
                Session,
                SessionConfig,
                SessionConfigBuilder,
                Statement,
            },
        },
        cql::{
            frame::{
                consistency::Consistency,
                rows::{
                    Row,
                    RowSet,
                },
            },
            types::{
                duration::CqlDuration,
                numeric::{
                    CqlDecimal,
                    CqlVarint,
                },
                value::{
                    CqlValue,
                    ParamValue,
                },
                Blob,
                CqlDate,
                CqlTime,
                CqlType,
            },
        },
    };
}
