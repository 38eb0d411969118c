// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the ERROR frame.

use super::*;
use std::fmt::Display;
use thiserror::Error;

/// A server-reported error: an `[int]` code, a `[string]` message and a
/// code-specific additional payload.
#[derive(Error, Debug, Clone)]
pub struct ErrorFrame {
    pub(crate) code: ErrorCode,
    pub(crate) message: String,
    pub(crate) additional: Option<Additional>,
}

impl Display for ErrorFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.additional {
            Some(additional) => write!(f, "{} ({})", self.message, additional),
            None => write!(f, "{}", self.message),
        }
    }
}

impl ErrorFrame {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            additional: None,
        }
    }

    pub fn with_additional(mut self, additional: Additional) -> Self {
        self.additional = Some(additional);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn additional(&self) -> Option<&Additional> {
        self.additional.as_ref()
    }

    pub fn is_unprepared(&self) -> bool {
        self.code == ErrorCode::Unprepared
    }

    /// The unprepared statement id, when this is an UNPREPARED error.
    pub fn unprepared_id(&self) -> Option<&[u8]> {
        match &self.additional {
            Some(Additional::Unprepared(u)) => Some(&u.id),
            _ => None,
        }
    }
}

impl FromPayload for ErrorFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let code = ErrorCode::try_from(read_int(start, payload)?)?;
        let message = read_string(start, payload)?;
        let additional = match code {
            ErrorCode::Unavailable => Some(Additional::Unavailable(Unavailable::from_payload(start, payload)?)),
            ErrorCode::WriteTimeout => Some(Additional::WriteTimeout(WriteTimeout::from_payload(start, payload)?)),
            ErrorCode::ReadTimeout => Some(Additional::ReadTimeout(ReadTimeout::from_payload(start, payload)?)),
            ErrorCode::ReadFailure => Some(Additional::ReadFailure(ReadFailure::from_payload(start, payload)?)),
            ErrorCode::FunctionFailure => Some(Additional::FunctionFailure(FunctionFailure::from_payload(
                start, payload,
            )?)),
            ErrorCode::WriteFailure => Some(Additional::WriteFailure(WriteFailure::from_payload(start, payload)?)),
            ErrorCode::AlreadyExists => Some(Additional::AlreadyExists(AlreadyExists::from_payload(start, payload)?)),
            ErrorCode::Unprepared => Some(Additional::Unprepared(Unprepared::from_payload(start, payload)?)),
            _ => None,
        };
        Ok(Self {
            code,
            message,
            additional,
        })
    }
}

impl ToPayload for ErrorFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_int(self.code as i32, payload);
        write_string(&self.message, payload);
        if let Some(additional) = self.additional {
            additional.to_payload(payload);
        }
    }
}

/// The server error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    ServerError = 0x0000,
    ProtocolError = 0x000A,
    AuthenticationError = 0x0100,
    Unavailable = 0x1000,
    Overloaded = 0x1001,
    IsBootstrapping = 0x1002,
    TruncateError = 0x1003,
    WriteTimeout = 0x1100,
    ReadTimeout = 0x1200,
    ReadFailure = 0x1300,
    FunctionFailure = 0x1400,
    WriteFailure = 0x1500,
    SyntaxError = 0x2000,
    Unauthorized = 0x2100,
    Invalid = 0x2200,
    ConfigError = 0x2300,
    AlreadyExists = 0x2400,
    Unprepared = 0x2500,
}

impl TryFrom<i32> for ErrorCode {
    type Error = anyhow::Error;

    fn try_from(value: i32) -> Result<Self, anyhow::Error> {
        Ok(match value {
            0x0000 => Self::ServerError,
            0x000A => Self::ProtocolError,
            0x0100 => Self::AuthenticationError,
            0x1000 => Self::Unavailable,
            0x1001 => Self::Overloaded,
            0x1002 => Self::IsBootstrapping,
            0x1003 => Self::TruncateError,
            0x1100 => Self::WriteTimeout,
            0x1200 => Self::ReadTimeout,
            0x1300 => Self::ReadFailure,
            0x1400 => Self::FunctionFailure,
            0x1500 => Self::WriteFailure,
            0x2000 => Self::SyntaxError,
            0x2100 => Self::Unauthorized,
            0x2200 => Self::Invalid,
            0x2300 => Self::ConfigError,
            0x2400 => Self::AlreadyExists,
            0x2500 => Self::Unprepared,
            c => anyhow::bail!("Unknown error code: {:#06x}", c),
        })
    }
}

/// The code-specific additional error payload.
#[derive(Clone, Error, Debug)]
#[error(transparent)]
#[allow(missing_docs)]
pub enum Additional {
    Unavailable(Unavailable),
    WriteTimeout(WriteTimeout),
    ReadTimeout(ReadTimeout),
    ReadFailure(ReadFailure),
    FunctionFailure(FunctionFailure),
    WriteFailure(WriteFailure),
    AlreadyExists(AlreadyExists),
    Unprepared(Unprepared),
}

impl ToPayload for Additional {
    fn to_payload(self, payload: &mut Vec<u8>) {
        match self {
            Self::Unavailable(a) => a.to_payload(payload),
            Self::WriteTimeout(a) => a.to_payload(payload),
            Self::ReadTimeout(a) => a.to_payload(payload),
            Self::ReadFailure(a) => a.to_payload(payload),
            Self::FunctionFailure(a) => a.to_payload(payload),
            Self::WriteFailure(a) => a.to_payload(payload),
            Self::AlreadyExists(a) => a.to_payload(payload),
            Self::Unprepared(a) => a.to_payload(payload),
        }
    }
}

/// Not enough replicas were alive to satisfy the consistency level.
#[derive(Clone, Error, Debug)]
#[error("Unavailable: consistency: {cl}, required: {required}, alive: {alive}")]
pub struct Unavailable {
    /// The consistency level of the query.
    pub cl: Consistency,
    /// The number of nodes required to be alive.
    pub required: i32,
    /// The number of replicas known alive when the request was processed.
    pub alive: i32,
}

impl FromPayload for Unavailable {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            cl: Consistency::try_from(read_short(start, payload)?)?,
            required: read_int(start, payload)?,
            alive: read_int(start, payload)?,
        })
    }
}

impl ToPayload for Unavailable {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short(self.cl as u16, payload);
        write_int(self.required, payload);
        write_int(self.alive, payload);
    }
}

/// A write request timed out coordinator-side.
#[derive(Clone, Error, Debug)]
#[error("WriteTimeout: consistency: {cl}, received: {received}, block for: {block_for}, write type: {write_type}")]
pub struct WriteTimeout {
    /// The consistency level of the query.
    pub cl: Consistency,
    /// The number of replica acknowledgements received.
    pub received: i32,
    /// The number of acknowledgements required to achieve `cl`.
    pub block_for: i32,
    /// The kind of write that timed out.
    pub write_type: WriteType,
}

impl FromPayload for WriteTimeout {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            cl: Consistency::try_from(read_short(start, payload)?)?,
            received: read_int(start, payload)?,
            block_for: read_int(start, payload)?,
            write_type: WriteType::from_payload(start, payload)?,
        })
    }
}

impl ToPayload for WriteTimeout {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short(self.cl as u16, payload);
        write_int(self.received, payload);
        write_int(self.block_for, payload);
        write_string(&self.write_type.to_string(), payload);
    }
}

/// A read request timed out coordinator-side.
#[derive(Clone, Error, Debug)]
#[error("ReadTimeout: consistency: {cl}, received: {received}, block for: {block_for}, data present: {data_present}")]
pub struct ReadTimeout {
    /// The consistency level of the query.
    pub cl: Consistency,
    /// The number of replica answers received.
    pub received: i32,
    /// The number of answers required to achieve `cl`.
    pub block_for: i32,
    /// Whether the replica asked for data responded.
    pub data_present: bool,
}

impl FromPayload for ReadTimeout {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            cl: Consistency::try_from(read_short(start, payload)?)?,
            received: read_int(start, payload)?,
            block_for: read_int(start, payload)?,
            data_present: read_byte(start, payload)? != 0,
        })
    }
}

impl ToPayload for ReadTimeout {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short(self.cl as u16, payload);
        write_int(self.received, payload);
        write_int(self.block_for, payload);
        write_byte(self.data_present as u8, payload);
    }
}

/// A replica-side failure during a read.
#[derive(Clone, Error, Debug)]
#[error("ReadFailure: consistency: {cl}, received: {received}, block for: {block_for}, failures: {num_failures}")]
pub struct ReadFailure {
    pub cl: Consistency,
    pub received: i32,
    pub block_for: i32,
    /// The number of nodes that failed executing the request.
    pub num_failures: i32,
    pub data_present: bool,
}

impl FromPayload for ReadFailure {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            cl: Consistency::try_from(read_short(start, payload)?)?,
            received: read_int(start, payload)?,
            block_for: read_int(start, payload)?,
            num_failures: read_int(start, payload)?,
            data_present: read_byte(start, payload)? != 0,
        })
    }
}

impl ToPayload for ReadFailure {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short(self.cl as u16, payload);
        write_int(self.received, payload);
        write_int(self.block_for, payload);
        write_int(self.num_failures, payload);
        write_byte(self.data_present as u8, payload);
    }
}

/// A user function failed during execution.
#[derive(Clone, Error, Debug)]
#[error("FunctionFailure: keyspace: {keyspace}, function: {function}")]
pub struct FunctionFailure {
    pub keyspace: String,
    pub function: String,
    /// The CQL types of the function arguments, in text form.
    pub arg_types: Vec<String>,
}

impl FromPayload for FunctionFailure {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            keyspace: read_string(start, payload)?,
            function: read_string(start, payload)?,
            arg_types: read_string_list(start, payload)?,
        })
    }
}

impl ToPayload for FunctionFailure {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_string(&self.keyspace, payload);
        write_string(&self.function, payload);
        write_string_list(&self.arg_types, payload);
    }
}

/// A replica-side failure during a write.
#[derive(Clone, Error, Debug)]
#[error("WriteFailure: consistency: {cl}, received: {received}, block for: {block_for}, failures: {num_failures}, write type: {write_type}")]
pub struct WriteFailure {
    pub cl: Consistency,
    pub received: i32,
    pub block_for: i32,
    pub num_failures: i32,
    pub write_type: WriteType,
}

impl FromPayload for WriteFailure {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            cl: Consistency::try_from(read_short(start, payload)?)?,
            received: read_int(start, payload)?,
            block_for: read_int(start, payload)?,
            num_failures: read_int(start, payload)?,
            write_type: WriteType::from_payload(start, payload)?,
        })
    }
}

impl ToPayload for WriteFailure {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short(self.cl as u16, payload);
        write_int(self.received, payload);
        write_int(self.block_for, payload);
        write_int(self.num_failures, payload);
        write_string(&self.write_type.to_string(), payload);
    }
}

/// The keyspace or table being created already exists.
#[derive(Clone, Error, Debug)]
#[error("AlreadyExists: keyspace: {keyspace}, table: {table}")]
pub struct AlreadyExists {
    pub keyspace: String,
    /// Empty when the conflict is on the keyspace itself.
    pub table: String,
}

impl FromPayload for AlreadyExists {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            keyspace: read_string(start, payload)?,
            table: read_string(start, payload)?,
        })
    }
}

impl ToPayload for AlreadyExists {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_string(&self.keyspace, payload);
        write_string(&self.table, payload);
    }
}

/// The coordinator does not know the prepared statement id; the client must
/// re-prepare and retry.
#[derive(Clone, Error, Debug)]
#[error("Unprepared: id: {id:?}")]
pub struct Unprepared {
    /// The unknown prepared id.
    pub id: Vec<u8>,
}

impl FromPayload for Unprepared {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            id: read_short_bytes(start, payload)?.to_vec(),
        })
    }
}

impl ToPayload for Unprepared {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short_bytes(&self.id, payload);
    }
}

/// The kind of write reported by write timeout/failure errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteType {
    Simple,
    Batch,
    UnloggedBatch,
    Counter,
    BatchLog,
    Cas,
    View,
    Cdc,
}

impl Display for WriteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WriteType::Simple => "SIMPLE",
            WriteType::Batch => "BATCH",
            WriteType::UnloggedBatch => "UNLOGGED_BATCH",
            WriteType::Counter => "COUNTER",
            WriteType::BatchLog => "BATCH_LOG",
            WriteType::Cas => "CAS",
            WriteType::View => "VIEW",
            WriteType::Cdc => "CDC",
        })
    }
}

impl FromPayload for WriteType {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(match read_str(start, payload)? {
            "SIMPLE" => WriteType::Simple,
            "BATCH" => WriteType::Batch,
            "UNLOGGED_BATCH" => WriteType::UnloggedBatch,
            "COUNTER" => WriteType::Counter,
            "BATCH_LOG" => WriteType::BatchLog,
            "CAS" => WriteType::Cas,
            "VIEW" => WriteType::View,
            "CDC" => WriteType::Cdc,
            t => anyhow::bail!("Unexpected write type: {}", t),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_frame_round_trip() {
        let frame = ErrorFrame::new(ErrorCode::ReadTimeout, "Operation timed out").with_additional(
            Additional::ReadTimeout(ReadTimeout {
                cl: Consistency::Quorum,
                received: 2,
                block_for: 3,
                data_present: false,
            }),
        );
        let payload = ResponseFrame::from(frame).build_payload();
        let decoded: ErrorFrame = ResponseFrame::decode(&payload).unwrap().into_body().try_into().unwrap();
        assert_eq!(decoded.code(), ErrorCode::ReadTimeout);
        assert_eq!(decoded.message(), "Operation timed out");
        match decoded.additional() {
            Some(Additional::ReadTimeout(rt)) => {
                assert_eq!(rt.received, 2);
                assert_eq!(rt.block_for, 3);
                assert!(!rt.data_present);
            }
            a => panic!("unexpected additional: {:?}", a),
        }
    }

    #[test]
    fn unprepared_id_is_exposed() {
        let frame = ErrorFrame::new(ErrorCode::Unprepared, "Unknown prepared id")
            .with_additional(Additional::Unprepared(Unprepared { id: vec![1, 2, 3, 4] }));
        assert!(frame.is_unprepared());
        assert_eq!(frame.unprepared_id(), Some(&[1u8, 2, 3, 4][..]));
    }
}
