// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the AUTH_CHALLENGE frame.

use super::*;

/// A further SASL challenge from the server. The body is a single `[bytes]`
/// token.
#[derive(Clone, Debug)]
pub struct AuthChallengeFrame {
    pub(crate) token: Vec<u8>,
}

impl AuthChallengeFrame {
    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

impl FromPayload for AuthChallengeFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            token: read_bytes(start, payload)?.unwrap_or_default().to_vec(),
        })
    }
}

impl ToPayload for AuthChallengeFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_bytes(&self.token, payload);
    }
}
