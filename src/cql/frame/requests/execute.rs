// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the EXECUTE frame.

use super::*;
use derive_builder::Builder;

/// Executes a prepared statement. The body is the `[short bytes]` prepared id
/// followed by the same `<query_parameters>` as QUERY.
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned", setter(strip_option))]
pub struct ExecuteFrame {
    /// The opaque server-issued prepared statement id.
    pub(crate) id: Vec<u8>,
    /// The query parameters.
    #[builder(default)]
    pub(crate) parameters: QueryParameters,
}

impl ExecuteFrame {
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn parameters(&self) -> &QueryParameters {
        &self.parameters
    }
}

impl FromPayload for ExecuteFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            id: read_short_bytes(start, payload)?.to_vec(),
            parameters: QueryParameters::from_payload(start, payload)?,
        })
    }
}

impl ToPayload for ExecuteFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short_bytes(&self.id, payload);
        self.parameters.to_payload(payload);
    }
}
