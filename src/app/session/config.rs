// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The session configuration surface and its defaults.

use crate::{
    app::{
        connection::{
            Credentials,
            SslOptions,
        },
        policy::{
            load_balancing::{
                DefaultPolicy,
                LoadBalancingPolicy,
            },
            reconnection::{
                ExponentialReconnectionPolicy,
                ReconnectionPolicy,
            },
            retry::{
                DefaultRetryPolicy,
                RetryPolicy,
            },
        },
    },
    cql::{
        frame::Consistency,
        types::CqlType,
    },
};
use derive_builder::Builder;
use std::{
    sync::Arc,
    time::Duration,
};
use uuid::Uuid;

/// Options shaping how values cross the codec boundary.
#[derive(Clone, Debug)]
pub struct EncodingOptions {
    /// Copy each result cell out of the page buffer. When disabled, blob
    /// values alias the page, tying their lifetime to it. Default true.
    pub copy_buffer: bool,
    /// Bind absent optional parameters as the `unset` sentinel instead of
    /// null. Default true.
    pub use_undefined_as_unset: bool,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            copy_buffer: true,
            use_undefined_as_unset: true,
        }
    }
}

/// Connection-pool sizing.
#[derive(Clone, Debug)]
pub struct PoolingOptions {
    /// Idle interval before an OPTIONS heartbeat. Default 30 s.
    pub heart_beat_interval: Duration,
    /// Connections opened per host. Default 1.
    pub core_connections_per_host: usize,
    /// In-flight request cap per connection. Default 2048.
    pub max_requests_per_connection: usize,
}

impl Default for PoolingOptions {
    fn default() -> Self {
        Self {
            heart_beat_interval: Duration::from_millis(30_000),
            core_connections_per_host: 1,
            max_requests_per_connection: 2048,
        }
    }
}

/// Native-protocol level options.
#[derive(Clone, Debug)]
pub struct ProtocolOptions {
    /// The port used for contact points given without one. Default 9042.
    pub port: u16,
    /// Send the NO_COMPACT startup option.
    pub no_compact: bool,
}

impl Default for ProtocolOptions {
    fn default() -> Self {
        Self {
            port: 9042,
            no_compact: false,
        }
    }
}

/// Socket-level options.
#[derive(Clone, Debug)]
pub struct SocketOptions {
    /// TCP connect timeout. Default 5 s.
    pub connect_timeout: Duration,
    /// Per-request response wait; zero disables. Default 12 s.
    pub read_timeout: Duration,
    /// Enable TCP keepalive probes.
    pub keep_alive: bool,
    /// Idle time before keepalive probes start.
    pub keep_alive_delay: Duration,
    /// Disable Nagle's algorithm. Default true.
    pub tcp_no_delay: bool,
    /// Simultaneous read timeouts that defunct a connection. Default 64.
    pub defunct_read_timeout_threshold: usize,
    /// Bytes buffered before the writer flushes. Default 64 KiB.
    pub coalescing_threshold: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5_000),
            read_timeout: Duration::from_millis(12_000),
            keep_alive: true,
            keep_alive_delay: Duration::ZERO,
            tcp_no_delay: true,
            defunct_read_timeout_threshold: 64,
            coalescing_threshold: 65_536,
        }
    }
}

/// The pluggable policy set.
#[derive(Clone)]
pub struct Policies {
    pub load_balancing: Arc<dyn LoadBalancingPolicy>,
    pub retry: Arc<dyn RetryPolicy>,
    pub reconnection: Arc<dyn ReconnectionPolicy>,
}

impl Default for Policies {
    fn default() -> Self {
        Self {
            load_balancing: Arc::new(DefaultPolicy::new()),
            retry: Arc::new(DefaultRetryPolicy),
            reconnection: Arc::new(ExponentialReconnectionPolicy::default()),
        }
    }
}

/// Per-request options, with session-wide defaults under
/// `SessionConfig::query`.
#[derive(Clone, Debug)]
pub struct QueryOptions {
    /// Rows per page. Default 5000.
    pub fetch_size: i32,
    /// Prepare simple statements through the session cache before
    /// executing. Default false.
    pub prepare: bool,
    /// Request paged results. When false the whole result set arrives in
    /// one round-trip and any continuation is ignored. Default true.
    pub paged: bool,
    /// Fetch every page and concatenate the rows before returning. The
    /// streaming surface is `Session::execute_iter`. Default false.
    pub auto_page: bool,
    /// Consistency level; the session default applies when absent.
    pub consistency: Option<Consistency>,
    /// Serial consistency for conditional statements.
    pub serial_consistency: Option<Consistency>,
    /// Explicit write timestamp in microseconds; generated monotonically
    /// when absent.
    pub timestamp: Option<i64>,
    /// Per-position type hints for simple statements.
    pub hints: Vec<Option<CqlType>>,
    /// Continuation from a previous page.
    pub page_state: Option<Vec<u8>>,
    /// Whether the statement can safely execute twice; gates retries after
    /// transport failures. Default false.
    pub idempotent: bool,
    /// The serialized partition key, enabling token-aware routing for
    /// simple statements.
    pub routing_key: Option<Vec<u8>>,
    /// The keyspace the planner should assume.
    pub keyspace: Option<String>,
    /// Ask the server to trace the query.
    pub trace_query: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            fetch_size: 5_000,
            prepare: false,
            paged: true,
            auto_page: false,
            consistency: None,
            serial_consistency: None,
            timestamp: None,
            hints: Vec::new(),
            page_state: None,
            idempotent: false,
            routing_key: None,
            keyspace: None,
            trace_query: false,
        }
    }
}

/// The session configuration. `contact_points` is the only required field.
#[derive(Clone, Builder)]
#[builder(pattern = "owned", setter(into, strip_option))]
pub struct SessionConfig {
    /// Initial hosts, as `ip`, `ip:port` or `host:port`.
    pub contact_points: Vec<String>,
    /// Keyspace to USE on every connection.
    #[builder(default)]
    pub keyspace: Option<String>,
    /// Plain-text credentials; mutually exclusive with `auth_provider`
    /// configured elsewhere.
    #[builder(default)]
    pub credentials: Option<Credentials>,
    /// Application identity, sent in STARTUP.
    #[builder(default)]
    pub application_name: Option<String>,
    #[builder(default)]
    pub application_version: Option<String>,
    /// Session id sent in STARTUP; generated when absent.
    #[builder(default)]
    pub id: Option<Uuid>,
    /// TLS options.
    #[builder(default)]
    pub ssl_options: Option<SslOptions>,
    #[builder(default)]
    pub encoding: EncodingOptions,
    #[builder(default)]
    pub pooling: PoolingOptions,
    #[builder(default)]
    pub protocol_options: ProtocolOptions,
    #[builder(default)]
    pub socket_options: SocketOptions,
    /// Session-wide query option defaults.
    #[builder(default)]
    pub query_options: QueryOptions,
    #[builder(default)]
    pub policies: Policies,
    /// Prepared-statement cache capacity. Default 512.
    #[builder(default = "512")]
    pub max_prepared: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let config = SessionConfigBuilder::default()
            .contact_points(vec!["127.0.0.1".to_owned()])
            .build()
            .unwrap();
        assert_eq!(config.max_prepared, 512);
        assert_eq!(config.query_options.fetch_size, 5_000);
        assert!(config.query_options.paged);
        assert!(!config.query_options.prepare);
        assert_eq!(config.pooling.max_requests_per_connection, 2048);
        assert_eq!(config.pooling.heart_beat_interval, Duration::from_millis(30_000));
        assert_eq!(config.socket_options.read_timeout, Duration::from_millis(12_000));
        assert_eq!(config.socket_options.connect_timeout, Duration::from_millis(5_000));
        assert_eq!(config.socket_options.defunct_read_timeout_threshold, 64);
        assert_eq!(config.socket_options.coalescing_threshold, 65_536);
        assert_eq!(config.protocol_options.port, 9042);
        assert!(config.encoding.copy_buffer);
        assert!(config.encoding.use_undefined_as_unset);
    }

    #[test]
    fn builder_requires_contact_points() {
        assert!(SessionConfigBuilder::default().build().is_err());
    }
}
