// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the REGISTER frame.

use super::*;

/// The topology change event name.
pub const TOPOLOGY_CHANGE: &str = "TOPOLOGY_CHANGE";
/// The status change event name.
pub const STATUS_CHANGE: &str = "STATUS_CHANGE";
/// The schema change event name.
pub const SCHEMA_CHANGE: &str = "SCHEMA_CHANGE";

/// Registers this connection to receive server EVENT frames. The body is a
/// `[string list]` of event type names.
#[derive(Clone, Debug)]
pub struct RegisterFrame {
    pub(crate) event_types: Vec<String>,
}

impl RegisterFrame {
    pub fn new(event_types: Vec<String>) -> Self {
        Self { event_types }
    }

    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }
}

impl FromPayload for RegisterFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            event_types: read_string_list(start, payload)?,
        })
    }
}

impl ToPayload for RegisterFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_string_list(&self.event_types, payload);
    }
}
