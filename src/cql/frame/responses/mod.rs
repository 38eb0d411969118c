// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the version 4 response frames.
//! See `https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec` for more details.

pub mod auth_challenge;
pub mod auth_success;
pub mod authenticate;
pub mod error;
pub mod event;
pub mod ready;
pub mod result;
pub mod supported;

pub use auth_challenge::AuthChallengeFrame;
pub use auth_success::AuthSuccessFrame;
pub use authenticate::AuthenticateFrame;
pub use error::{
    ErrorCode,
    ErrorFrame,
};
pub use event::{
    EventFrame,
    StatusChange,
    TopologyChange,
};
pub use ready::ReadyFrame;
pub use result::{
    PreparedResult,
    ResultBodyKind,
    ResultFrame,
    RowsResult,
};
pub use supported::SupportedFrame;

use super::{
    opcode::OpCode,
    *,
};
use derive_more::{
    From,
    TryInto,
};

/// Possible response frame bodies.
#[derive(Clone, Debug, From, TryInto)]
#[allow(missing_docs)]
pub enum ResponseBody {
    Error(ErrorFrame),
    Ready(ReadyFrame),
    Authenticate(AuthenticateFrame),
    Supported(SupportedFrame),
    Result(ResultFrame),
    Event(EventFrame),
    AuthChallenge(AuthChallengeFrame),
    AuthSuccess(AuthSuccessFrame),
}

impl ResponseBody {
    /// Get the frame type's opcode.
    pub fn opcode(&self) -> OpCode {
        match self {
            Self::Error(_) => OpCode::Error,
            Self::Ready(_) => OpCode::Ready,
            Self::Authenticate(_) => OpCode::Authenticate,
            Self::Supported(_) => OpCode::Supported,
            Self::Result(_) => OpCode::Result,
            Self::Event(_) => OpCode::Event,
            Self::AuthChallenge(_) => OpCode::AuthChallenge,
            Self::AuthSuccess(_) => OpCode::AuthSuccess,
        }
    }
}

/// A response frame: a [`Header`] plus a [`ResponseBody`].
#[derive(Clone, Debug)]
pub struct ResponseFrame {
    pub(crate) header: Header,
    pub(crate) body: ResponseBody,
}

impl<T: Into<ResponseBody>> From<T> for ResponseFrame {
    fn from(body: T) -> Self {
        let body = body.into();
        let mut header = Header::from_opcode(body.opcode() as u8);
        *header.version_mut() = header::Version(header::PROTOCOL_VERSION | 0x80);
        Self { header, body }
    }
}

impl ResponseFrame {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Decode a full frame (header plus body) from a contiguous buffer.
    pub fn decode(payload: &[u8]) -> Result<Self, FrameError> {
        Self::from_payload(&mut 0, payload).map_err(FrameError::InvalidFrame)
    }

    /// Encode the frame (used by test harnesses acting as the server).
    pub fn build_payload(self) -> Vec<u8> {
        let mut payload = Vec::new();
        self.to_payload(&mut payload);
        payload
    }
}

impl FromPayload for ResponseFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let header = Header::from_payload(start, payload)?;
        let body = match OpCode::try_from(header.opcode())? {
            OpCode::Error => ErrorFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::Ready => ReadyFrame.into(),
            OpCode::Authenticate => AuthenticateFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::Supported => SupportedFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::Result => ResultFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::Event => EventFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::AuthChallenge => AuthChallengeFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            OpCode::AuthSuccess => AuthSuccessFrame::from_payload(start, payload)
                .map_err(FrameError::InvalidBody)?
                .into(),
            c => anyhow::bail!("Not a response opcode: {:?}", c),
        };
        Ok(Self { header, body })
    }
}

impl ToPayload for ResponseFrame {
    fn to_payload(mut self, payload: &mut Vec<u8>) {
        let mut body = Vec::new();
        self.body.to_payload(&mut body);
        self.header.set_body_len(body.len() as u32);
        self.header.to_payload(payload);
        payload.extend(body);
    }
}

impl ToPayload for ResponseBody {
    fn to_payload(self, payload: &mut Vec<u8>) {
        match self {
            Self::Error(frame) => frame.to_payload(payload),
            Self::Ready(_) => (),
            Self::Authenticate(frame) => frame.to_payload(payload),
            Self::Supported(frame) => frame.to_payload(payload),
            Self::Result(frame) => frame.to_payload(payload),
            Self::Event(frame) => frame.to_payload(payload),
            Self::AuthChallenge(frame) => frame.to_payload(payload),
            Self::AuthSuccess(frame) => frame.to_payload(payload),
        }
    }
}
