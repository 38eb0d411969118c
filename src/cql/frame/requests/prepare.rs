// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the PREPARE frame.

use super::*;

/// Prepares a query for later execution through EXECUTE. The body is a
/// `[long string]` statement; the server answers with a RESULT of kind
/// `prepared`.
#[derive(Clone, Debug)]
pub struct PrepareFrame {
    pub(crate) statement: String,
}

impl PrepareFrame {
    pub fn new(statement: String) -> Self {
        Self { statement }
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }
}

impl FromPayload for PrepareFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            statement: read_long_string(start, payload)?,
        })
    }
}

impl ToPayload for PrepareFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_long_string(&self.statement, payload);
    }
}
