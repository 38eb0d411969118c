// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the version 4 request frames.
//! See `https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec` for more details.

pub mod auth_response;
pub mod batch;
pub mod batch_flags;
pub mod execute;
pub mod options;
pub mod prepare;
pub mod query;
pub mod query_flags;
pub mod register;
pub mod startup;

pub use auth_response::AuthResponseFrame;
pub use batch::{
    BatchFrame,
    BatchFrameBuilder,
    BatchQuery,
    BatchType,
};
pub use batch_flags::BatchFlags;
pub use execute::ExecuteFrame;
pub use options::OptionsFrame;
pub use prepare::PrepareFrame;
pub use query::{
    QueryFrame,
    QueryFrameBuilder,
    QueryParameters,
};
pub use query_flags::QueryFlags;
pub use register::RegisterFrame;
pub use startup::StartupFrame;

use super::{
    header::HEADER_LEN,
    opcode::OpCode,
    *,
};
use derive_more::{
    From,
    TryInto,
};

/// Possible request frame bodies.
#[derive(Clone, Debug, From, TryInto)]
pub enum RequestBody {
    Startup(StartupFrame),
    Options(OptionsFrame),
    Query(QueryFrame),
    Prepare(PrepareFrame),
    Execute(ExecuteFrame),
    Batch(BatchFrame),
    Register(RegisterFrame),
    AuthResponse(AuthResponseFrame),
}

impl RequestBody {
    /// Get the frame type's opcode.
    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Startup(_) => OpCode::Startup,
            Self::Options(_) => OpCode::Options,
            Self::Query(_) => OpCode::Query,
            Self::Prepare(_) => OpCode::Prepare,
            Self::Execute(_) => OpCode::Execute,
            Self::Batch(_) => OpCode::Batch,
            Self::Register(_) => OpCode::Register,
            Self::AuthResponse(_) => OpCode::AuthResponse,
        }
    }
}

impl ToPayload for RequestBody {
    fn to_payload(self, payload: &mut Vec<u8>) {
        match self {
            Self::Startup(frame) => frame.to_payload(payload),
            Self::Options(_) => (),
            Self::Query(frame) => frame.to_payload(payload),
            Self::Prepare(frame) => frame.to_payload(payload),
            Self::Execute(frame) => frame.to_payload(payload),
            Self::Batch(frame) => frame.to_payload(payload),
            Self::Register(frame) => frame.to_payload(payload),
            Self::AuthResponse(frame) => frame.to_payload(payload),
        }
    }
}

/// A request frame: a [`Header`] plus a [`RequestBody`].
#[derive(Clone, Debug)]
pub struct RequestFrame {
    pub(crate) header: Header,
    pub(crate) body: RequestBody,
}

impl<T: Into<RequestBody>> From<T> for RequestFrame {
    fn from(body: T) -> Self {
        let body = body.into();
        Self {
            header: Header::from_opcode(body.opcode() as u8),
            body,
        }
    }
}

impl RequestFrame {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn into_body(self) -> RequestBody {
        self.body
    }

    /// Encode the frame, leaving the stream id zeroed. The connection layer
    /// assigns a stream id per attempt with [`assign_stream`].
    pub fn build_payload(self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.to_payload(&mut payload);
        payload
    }
}

/// Patch the stream id into an already encoded request payload.
pub fn assign_stream(stream: u16, payload: &mut [u8]) {
    payload[2..4].copy_from_slice(&stream.to_be_bytes());
}

impl FromPayload for RequestFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let header = Header::from_payload(start, payload)?;
        let body = match OpCode::try_from(header.opcode())? {
            OpCode::Startup => StartupFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::Options => OptionsFrame.into(),
            OpCode::Query => QueryFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::Prepare => PrepareFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::Execute => ExecuteFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::Batch => BatchFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::Register => RegisterFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::AuthResponse => AuthResponseFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            c => anyhow::bail!("Not a request opcode: {:?}", c),
        };
        Ok(Self { header, body })
    }
}

impl ToPayload for RequestFrame {
    fn to_payload(mut self, payload: &mut Vec<u8>) {
        let mut body = Vec::new();
        self.body.to_payload(&mut body);
        self.header.set_body_len(body.len() as u32);
        self.header.to_payload(payload);
        payload.extend(body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_assignment_patches_header() {
        let frame = RequestFrame::from(OptionsFrame);
        let mut payload = frame.build_payload();
        assert_eq!(payload.len(), HEADER_LEN);
        assign_stream(0xbeef, &mut payload);
        assert_eq!(&payload[2..4], &[0xbe, 0xef]);
        let decoded = RequestFrame::from_payload(&mut 0, &payload).unwrap();
        assert_eq!(decoded.header().stream(), 0xbeef);
        assert_eq!(decoded.header().opcode(), OpCode::Options as u8);
    }
}
