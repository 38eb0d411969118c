// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the EVENT frame.

use super::*;
use std::net::SocketAddr;

/// A server push event, delivered on stream id -1 to connections that have
/// REGISTERed for it.
#[derive(Clone, Debug)]
pub enum EventFrame {
    /// A node joined or left the ring.
    TopologyChange(TopologyChange),
    /// A node went up or down.
    StatusChange(StatusChange),
    /// A schema object changed; carried for completeness, the driver does
    /// not synchronize schema metadata.
    SchemaChange,
}

#[derive(Clone, Debug)]
pub enum TopologyChange {
    NewNode(SocketAddr),
    RemovedNode(SocketAddr),
}

#[derive(Clone, Debug)]
pub enum StatusChange {
    Up(SocketAddr),
    Down(SocketAddr),
}

impl FromPayload for EventFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(match read_str(start, payload)? {
            "TOPOLOGY_CHANGE" => EventFrame::TopologyChange(match read_str(start, payload)? {
                "NEW_NODE" => TopologyChange::NewNode(read_inet(start, payload)?),
                "REMOVED_NODE" => TopologyChange::RemovedNode(read_inet(start, payload)?),
                // MOVED_NODE carries an address too; topology is re-read on demand
                _ => {
                    let addr = read_inet(start, payload)?;
                    TopologyChange::NewNode(addr)
                }
            }),
            "STATUS_CHANGE" => EventFrame::StatusChange(match read_str(start, payload)? {
                "UP" => StatusChange::Up(read_inet(start, payload)?),
                "DOWN" => StatusChange::Down(read_inet(start, payload)?),
                c => anyhow::bail!("Unknown status change: {}", c),
            }),
            "SCHEMA_CHANGE" => EventFrame::SchemaChange,
            t => anyhow::bail!("Unknown event type: {}", t),
        })
    }
}

impl ToPayload for EventFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        match self {
            EventFrame::TopologyChange(change) => {
                write_string("TOPOLOGY_CHANGE", payload);
                match change {
                    TopologyChange::NewNode(addr) => {
                        write_string("NEW_NODE", payload);
                        write_inet(addr, payload);
                    }
                    TopologyChange::RemovedNode(addr) => {
                        write_string("REMOVED_NODE", payload);
                        write_inet(addr, payload);
                    }
                }
            }
            EventFrame::StatusChange(change) => {
                write_string("STATUS_CHANGE", payload);
                match change {
                    StatusChange::Up(addr) => {
                        write_string("UP", payload);
                        write_inet(addr, payload);
                    }
                    StatusChange::Down(addr) => {
                        write_string("DOWN", payload);
                        write_inet(addr, payload);
                    }
                }
            }
            EventFrame::SchemaChange => {
                write_string("SCHEMA_CHANGE", payload);
            }
        }
    }
}
