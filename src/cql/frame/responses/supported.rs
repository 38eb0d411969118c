// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the SUPPORTED frame.

use super::*;
use std::collections::HashMap;

/// Answers an OPTIONS request. The body is a `[string multimap]` of the
/// STARTUP options the server accepts.
#[derive(Clone, Debug, Default)]
pub struct SupportedFrame {
    pub(crate) options: HashMap<String, Vec<String>>,
}

impl SupportedFrame {
    pub fn new(options: HashMap<String, Vec<String>>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &HashMap<String, Vec<String>> {
        &self.options
    }

    /// The CQL versions the server advertises.
    pub fn cql_versions(&self) -> Option<&[String]> {
        self.options.get("CQL_VERSION").map(|v| v.as_slice())
    }
}

impl FromPayload for SupportedFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            options: read_string_multimap(start, payload)?,
        })
    }
}

impl ToPayload for SupportedFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_string_multimap(&self.options, payload);
    }
}
