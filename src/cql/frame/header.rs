// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the 9-byte frame header.

use super::{
    FromPayload,
    ToPayload,
};
use std::convert::TryInto;

/// The compression flag.
pub const COMPRESSION: u8 = 0x01;
/// The tracing flag.
pub const TRACING: u8 = 0x02;
/// The custom payload flag.
pub const CUSTOM_PAYLOAD: u8 = 0x04;
/// The warning flag.
pub const WARNING: u8 = 0x08;

/// The protocol version spoken by this driver.
pub const PROTOCOL_VERSION: u8 = 0x04;

/// The frame direction, stored in the high bit of the version byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Request = 0,
    Response = 1,
}

/// The version byte: protocol version in the low 7 bits, direction in the high bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Version(pub u8);

impl Default for Version {
    fn default() -> Self {
        Self(PROTOCOL_VERSION)
    }
}

impl Version {
    pub fn direction(&self) -> Direction {
        if self.0 & 0x80 == 0 {
            Direction::Request
        } else {
            Direction::Response
        }
    }

    pub fn version(&self) -> u8 {
        self.0 & 0x7f
    }
}

/// The frame flags byte.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Flags(pub u8);

impl Flags {
    pub fn compression(&self) -> bool {
        self.0 & COMPRESSION != 0
    }

    pub fn tracing(&self) -> bool {
        self.0 & TRACING != 0
    }

    pub fn set_tracing(&mut self, value: bool) {
        if value {
            self.0 |= TRACING;
        } else {
            self.0 &= !TRACING;
        }
    }

    pub fn custom_payload(&self) -> bool {
        self.0 & CUSTOM_PAYLOAD != 0
    }

    pub fn warning(&self) -> bool {
        self.0 & WARNING != 0
    }
}

/// The frame header: `[version][flags][stream (i16)][opcode][length (i32)]`.
#[derive(Copy, Clone, Debug)]
pub struct Header {
    version: Version,
    flags: Flags,
    stream: u16,
    opcode: u8,
    body_len: u32,
}

/// The fixed byte length of a header.
pub const HEADER_LEN: usize = 9;

impl Header {
    pub fn from_opcode(opcode: u8) -> Self {
        Self {
            version: Version::default(),
            flags: Flags::default(),
            stream: 0,
            opcode,
            body_len: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.version.direction()
    }

    pub fn version(&self) -> u8 {
        self.version.version()
    }

    pub fn version_mut(&mut self) -> &mut Version {
        &mut self.version
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    pub fn stream(&self) -> u16 {
        self.stream
    }

    pub fn set_stream(&mut self, stream: u16) {
        self.stream = stream;
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn body_len(&self) -> u32 {
        self.body_len
    }

    pub fn set_body_len(&mut self, body_len: u32) {
        self.body_len = body_len;
    }
}

impl TryFrom<&[u8]> for Header {
    type Error = anyhow::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        anyhow::ensure!(bytes.len() == HEADER_LEN, "Invalid header length: {}", bytes.len());
        Ok(Header {
            version: Version(bytes[0]),
            flags: Flags(bytes[1]),
            stream: u16::from_be_bytes(bytes[2..4].try_into()?),
            opcode: bytes[4],
            body_len: u32::from_be_bytes(bytes[5..9].try_into()?),
        })
    }
}

impl From<Header> for [u8; HEADER_LEN] {
    fn from(header: Header) -> Self {
        let stream = header.stream.to_be_bytes();
        let len = header.body_len.to_be_bytes();
        [
            header.version.0,
            header.flags.0,
            stream[0],
            stream[1],
            header.opcode,
            len[0],
            len[1],
            len[2],
            len[3],
        ]
    }
}

impl FromPayload for Header {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        anyhow::ensure!(payload.len() >= *start + HEADER_LEN, "Payload is too small for a header");
        let header = payload[*start..][..HEADER_LEN].try_into()?;
        *start += HEADER_LEN;
        Ok(header)
    }
}

impl ToPayload for Header {
    fn to_payload(self, payload: &mut Vec<u8>) {
        payload.reserve(HEADER_LEN + self.body_len as usize);
        payload.extend(<[u8; HEADER_LEN]>::from(self));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut header = Header::from_opcode(0x07);
        header.set_stream(0x1234);
        header.set_body_len(17);
        let bytes: [u8; HEADER_LEN] = header.into();
        assert_eq!(bytes, [0x04, 0x00, 0x12, 0x34, 0x07, 0x00, 0x00, 0x00, 0x11]);
        let decoded = Header::try_from(&bytes[..]).unwrap();
        assert_eq!(decoded.version(), PROTOCOL_VERSION);
        assert_eq!(decoded.direction(), Direction::Request);
        assert_eq!(decoded.stream(), 0x1234);
        assert_eq!(decoded.opcode(), 0x07);
        assert_eq!(decoded.body_len(), 17);
    }
}
