// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the AUTH_RESPONSE frame.

use super::*;

/// Answers a server authentication challenge. The body is a single `[bytes]`
/// token whose content depends on the negotiated authenticator.
#[derive(Clone, Debug)]
pub struct AuthResponseFrame {
    pub(crate) token: Vec<u8>,
}

impl AuthResponseFrame {
    pub fn new(token: Vec<u8>) -> Self {
        Self { token }
    }

    /// Build the SASL PLAIN initial response: `\0username\0password`.
    pub fn plain_text(username: &str, password: &str) -> Self {
        let mut token = Vec::with_capacity(username.len() + password.len() + 2);
        token.push(0);
        token.extend(username.as_bytes());
        token.push(0);
        token.extend(password.as_bytes());
        Self { token }
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

impl FromPayload for AuthResponseFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            token: read_bytes(start, payload)?.unwrap_or_default().to_vec(),
        })
    }
}

impl ToPayload for AuthResponseFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_bytes(&self.token, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_token_layout() {
        let frame = AuthResponseFrame::plain_text("cassandra", "secret");
        assert_eq!(frame.token(), b"\0cassandra\0secret");
    }
}
