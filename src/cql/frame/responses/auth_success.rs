// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the AUTH_SUCCESS frame.

use super::*;

/// Indicates successful authentication. The body is a single `[bytes]` token
/// with final SASL data, which the plain-text mechanism leaves empty.
#[derive(Clone, Debug, Default)]
pub struct AuthSuccessFrame {
    pub(crate) token: Vec<u8>,
}

impl AuthSuccessFrame {
    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

impl FromPayload for AuthSuccessFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            token: read_bytes(start, payload)?.unwrap_or_default().to_vec(),
        })
    }
}

impl ToPayload for AuthSuccessFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_bytes(&self.token, payload);
    }
}
