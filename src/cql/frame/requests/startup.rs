// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the STARTUP frame.

use super::*;
use std::collections::HashMap;

/// Well-known STARTUP option keys.
pub const CQL_VERSION: &str = "CQL_VERSION";
pub const NO_COMPACT: &str = "NO_COMPACT";
pub const DRIVER_NAME: &str = "DRIVER_NAME";
pub const DRIVER_VERSION: &str = "DRIVER_VERSION";
pub const APPLICATION_NAME: &str = "APPLICATION_NAME";
pub const APPLICATION_VERSION: &str = "APPLICATION_VERSION";
pub const CLIENT_ID: &str = "CLIENT_ID";

/// The CQL version this driver requests when the server does not advertise one.
pub const DEFAULT_CQL_VERSION: &str = "3.0.0";

/// Initializes the connection. The body is a `[string map]` of options, of
/// which `CQL_VERSION` is mandatory. The server answers with READY or
/// AUTHENTICATE.
#[derive(Clone, Debug)]
pub struct StartupFrame {
    pub(crate) options: HashMap<String, String>,
}

impl StartupFrame {
    pub fn new(options: HashMap<String, String>) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &HashMap<String, String> {
        &self.options
    }
}

impl FromPayload for StartupFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            options: read_string_map(start, payload)?,
        })
    }
}

impl ToPayload for StartupFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_string_map(&self.options, payload);
    }
}
