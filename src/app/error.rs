// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The driver error taxonomy. Exactly one of these reaches the caller per
//! request: either directly, or wrapped per-host in [`DriverError::NoHostAvailable`].

use crate::cql::{
    frame::responses::error::ErrorFrame,
    types::codec::{
        ArgumentError,
        DecodingError,
    },
};
use std::{
    collections::HashMap,
    net::SocketAddr,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    /// Caller-visible invalid input: missing hint, wrong arity, bad option.
    #[error("Argument error: {0}")]
    Argument(#[from] ArgumentError),

    /// Authentication was required and failed, or no provider was configured.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Every host of the query plan was tried and failed; the per-host
    /// reasons are collected by address.
    #[error("No host available to execute the request ({} tried)", errors.len())]
    NoHostAvailable {
        errors: HashMap<SocketAddr, DriverError>,
    },

    /// All connections to the chosen host are at their in-flight cap.
    #[error("All connections to {0} are busy")]
    BusyConnection(SocketAddr),

    /// The per-host read timeout expired before the coordinator answered.
    #[error("Request timed out after {0} ms")]
    OperationTimedOut(u64),

    /// The server answered with an ERROR frame.
    #[error("Server error: {0}")]
    Response(#[from] ErrorFrame),

    /// The server sent bytes this driver cannot make sense of.
    #[error("Decoding error: {0}")]
    Decoding(#[from] DecodingError),

    /// The connection died while the request was in flight.
    #[error("Connection broken: {0}")]
    Broken(String),

    /// The session is shutting down or closed.
    #[error("Session is shut down")]
    Shutdown,

    /// An internal invariant was violated.
    #[error("Internal driver error: {0}")]
    Internal(String),
}

impl Clone for DriverError {
    fn clone(&self) -> Self {
        match self {
            DriverError::Argument(e) => DriverError::Argument(e.clone()),
            DriverError::Authentication(e) => DriverError::Authentication(e.clone()),
            DriverError::NoHostAvailable { errors } => DriverError::NoHostAvailable {
                errors: errors.clone(),
            },
            DriverError::BusyConnection(addr) => DriverError::BusyConnection(*addr),
            DriverError::OperationTimedOut(ms) => DriverError::OperationTimedOut(*ms),
            DriverError::Response(e) => DriverError::Response(e.clone()),
            DriverError::Decoding(e) => DriverError::Decoding(e.clone()),
            DriverError::Broken(e) => DriverError::Broken(e.clone()),
            DriverError::Shutdown => DriverError::Shutdown,
            DriverError::Internal(e) => DriverError::Internal(e.clone()),
        }
    }
}
