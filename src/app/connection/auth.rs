// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Authentication providers for the connection STARTUP exchange.

use crate::{
    app::error::DriverError,
    cql::frame::requests::auth_response::AuthResponseFrame,
};
use async_trait::async_trait;

/// Plain-text credentials, carried to the server as a SASL PLAIN initial
/// response.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Answers the server's AUTHENTICATE exchange. The provider sees the
/// server-side authenticator class name and produces response tokens.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Produce the initial AUTH_RESPONSE token.
    async fn initial_response(&self, authenticator: &str) -> Result<Vec<u8>, DriverError>;

    /// Answer an AUTH_CHALLENGE token. The built-in providers speak
    /// single-round mechanisms only.
    async fn evaluate_challenge(&self, _token: &[u8]) -> Result<Vec<u8>, DriverError> {
        Err(DriverError::Authentication(
            "The configured auth provider does not support challenges".to_owned(),
        ))
    }
}

/// The provider used when no credentials are configured: any AUTHENTICATE
/// response from the server is fatal.
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn initial_response(&self, authenticator: &str) -> Result<Vec<u8>, DriverError> {
        Err(DriverError::Authentication(format!(
            "Host requires authentication ({}) but no credentials or auth provider were configured",
            authenticator
        )))
    }
}

/// SASL PLAIN over the native protocol.
pub struct PlainTextAuthProvider {
    credentials: Credentials,
}

impl PlainTextAuthProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl AuthProvider for PlainTextAuthProvider {
    async fn initial_response(&self, _authenticator: &str) -> Result<Vec<u8>, DriverError> {
        Ok(
            AuthResponseFrame::plain_text(&self.credentials.username, &self.credentials.password)
                .token()
                .to_vec(),
        )
    }
}
