// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the version 4 CQL frame protocol.
//! See `https://github.com/apache/cassandra/blob/trunk/doc/native_protocol_v4.spec` for more details.

pub mod consistency;
pub mod header;
pub mod opcode;
pub mod requests;
pub mod responses;
pub mod rows;

pub use consistency::Consistency;
pub use header::Header;
pub use opcode::OpCode;
pub use requests::{
    RequestBody,
    RequestFrame,
};
pub use responses::{
    ResponseBody,
    ResponseFrame,
};

use std::{
    collections::HashMap,
    convert::TryInto,
    net::{
        IpAddr,
        Ipv4Addr,
        Ipv6Addr,
        SocketAddr,
    },
};
use thiserror::Error;
use uuid::Uuid;

/// Worst case byte length of an encoded vint (8 payload bytes plus the lead byte).
pub const MAX_VINT_LEN: usize = 9;

#[derive(Error, Debug)]
pub enum FrameError {
    /// A read consumed more bytes than the payload holds.
    #[error("Payload out of range: needed {needed} bytes, {remaining} remaining")]
    OutOfRange {
        /// The requested length.
        needed: usize,
        /// The bytes left in the payload.
        remaining: usize,
    },
    #[error("Invalid frame opcode: {0:#04x}")]
    InvalidOpcode(u8),
    #[error("Invalid frame header: {0}")]
    InvalidHeader(anyhow::Error),
    #[error("Invalid frame body: {0}")]
    InvalidBody(anyhow::Error),
    #[error("Invalid frame: {0}")]
    InvalidFrame(anyhow::Error),
}

/// Check that `payload` still holds `needed` bytes past the cursor.
fn ensure_remaining(start: usize, payload: &[u8], needed: usize) -> Result<(), FrameError> {
    if payload.len() < start + needed {
        Err(FrameError::OutOfRange {
            needed,
            remaining: payload.len().saturating_sub(start),
        })
    } else {
        Ok(())
    }
}

/// Read a CQL `[byte]`, a 1 byte unsigned integer.
pub fn read_byte(start: &mut usize, payload: &[u8]) -> Result<u8, FrameError> {
    ensure_remaining(*start, payload, 1)?;
    let res = payload[*start];
    *start += 1;
    Ok(res)
}

/// Write a CQL `[byte]`.
pub fn write_byte(b: u8, payload: &mut Vec<u8>) {
    payload.push(b);
}

/// Read a CQL `[short]`, a 2 bytes unsigned integer.
pub fn read_short(start: &mut usize, payload: &[u8]) -> Result<u16, FrameError> {
    ensure_remaining(*start, payload, 2)?;
    let res = u16::from_be_bytes(payload[*start..][..2].try_into().unwrap());
    *start += 2;
    Ok(res)
}

/// Write a CQL `[short]`.
pub fn write_short(v: u16, payload: &mut Vec<u8>) {
    payload.extend(v.to_be_bytes());
}

/// Read a CQL `[int]`, a 4 bytes signed integer.
pub fn read_int(start: &mut usize, payload: &[u8]) -> Result<i32, FrameError> {
    ensure_remaining(*start, payload, 4)?;
    let res = i32::from_be_bytes(payload[*start..][..4].try_into().unwrap());
    *start += 4;
    Ok(res)
}

/// Write a CQL `[int]`.
pub fn write_int(v: i32, payload: &mut Vec<u8>) {
    payload.extend(v.to_be_bytes());
}

/// Read a CQL `[long]`, an 8 bytes signed integer.
pub fn read_long(start: &mut usize, payload: &[u8]) -> Result<i64, FrameError> {
    ensure_remaining(*start, payload, 8)?;
    let res = i64::from_be_bytes(payload[*start..][..8].try_into().unwrap());
    *start += 8;
    Ok(res)
}

/// Write a CQL `[long]`.
pub fn write_long(v: i64, payload: &mut Vec<u8>) {
    payload.extend(v.to_be_bytes());
}

/// Read a CQL `[string]`: a `[short]` n followed by n bytes of UTF-8.
pub fn read_string(start: &mut usize, payload: &[u8]) -> anyhow::Result<String> {
    Ok(read_str(start, payload)?.to_owned())
}

/// Read a CQL `[string]` as a borrowed str.
pub fn read_str<'a>(start: &mut usize, payload: &'a [u8]) -> anyhow::Result<&'a str> {
    let length = read_short(start, payload)? as usize;
    ensure_remaining(*start, payload, length)?;
    let res = std::str::from_utf8(&payload[*start..][..length])?;
    *start += length;
    Ok(res)
}

/// Write a CQL `[string]`.
pub fn write_string(s: &str, payload: &mut Vec<u8>) {
    payload.extend((s.len() as u16).to_be_bytes());
    payload.extend(s.as_bytes());
}

/// Read a CQL `[long string]`: an `[int]` n followed by n bytes of UTF-8.
pub fn read_long_string(start: &mut usize, payload: &[u8]) -> anyhow::Result<String> {
    let length = read_int(start, payload)? as usize;
    ensure_remaining(*start, payload, length)?;
    let res = std::str::from_utf8(&payload[*start..][..length])?.to_owned();
    *start += length;
    Ok(res)
}

/// Write a CQL `[long string]`.
pub fn write_long_string(s: &str, payload: &mut Vec<u8>) {
    payload.extend((s.len() as i32).to_be_bytes());
    payload.extend(s.as_bytes());
}

/// Read a CQL `[bytes]`: an `[int]` n followed by n bytes if `n >= 0`,
/// otherwise the value is `null` and `None` is returned.
pub fn read_bytes<'a>(start: &mut usize, payload: &'a [u8]) -> Result<Option<&'a [u8]>, FrameError> {
    let length = read_int(start, payload)?;
    if length < 0 {
        return Ok(None);
    }
    let length = length as usize;
    ensure_remaining(*start, payload, length)?;
    let res = &payload[*start..][..length];
    *start += length;
    Ok(Some(res))
}

/// Write a CQL `[bytes]`.
pub fn write_bytes(b: &[u8], payload: &mut Vec<u8>) {
    payload.extend((b.len() as i32).to_be_bytes());
    payload.extend(b);
}

/// Read a CQL `[short bytes]`: a `[short]` n followed by n bytes.
pub fn read_short_bytes<'a>(start: &mut usize, payload: &'a [u8]) -> Result<&'a [u8], FrameError> {
    let length = read_short(start, payload)? as usize;
    ensure_remaining(*start, payload, length)?;
    let res = &payload[*start..][..length];
    *start += length;
    Ok(res)
}

/// Write a CQL `[short bytes]`.
pub fn write_short_bytes(b: &[u8], payload: &mut Vec<u8>) {
    payload.extend((b.len() as u16).to_be_bytes());
    payload.extend(b);
}

/// Read a CQL `[uuid]`, 16 raw bytes in network order.
pub fn read_uuid(start: &mut usize, payload: &[u8]) -> Result<Uuid, FrameError> {
    ensure_remaining(*start, payload, 16)?;
    let res = Uuid::from_bytes(payload[*start..][..16].try_into().unwrap());
    *start += 16;
    Ok(res)
}

/// Write a CQL `[uuid]`.
pub fn write_uuid(uuid: &Uuid, payload: &mut Vec<u8>) {
    payload.extend(uuid.as_bytes());
}

/// Read a CQL `[inet]`: one `[byte]` address size (4 or 16), the address
/// bytes, then an `[int]` port.
pub fn read_inet(start: &mut usize, payload: &[u8]) -> anyhow::Result<SocketAddr> {
    let size = read_byte(start, payload)? as usize;
    ensure_remaining(*start, payload, size)?;
    let ip: IpAddr = match size {
        4 => Ipv4Addr::from(u32::from_be_bytes(payload[*start..][..4].try_into().unwrap())).into(),
        16 => Ipv6Addr::from(u128::from_be_bytes(payload[*start..][..16].try_into().unwrap())).into(),
        s => anyhow::bail!("Invalid inet address size: {}", s),
    };
    *start += size;
    let port = read_int(start, payload)?;
    Ok(SocketAddr::new(ip, port as u16))
}

/// Write a CQL `[inet]`.
pub fn write_inet(addr: SocketAddr, payload: &mut Vec<u8>) {
    match addr.ip() {
        IpAddr::V4(ip) => {
            payload.push(4);
            payload.extend(ip.octets());
        }
        IpAddr::V6(ip) => {
            payload.push(16);
            payload.extend(ip.octets());
        }
    }
    write_int(addr.port() as i32, payload);
}

/// Read a CQL `[string list]`: a `[short]` n followed by n `[string]`.
pub fn read_string_list(start: &mut usize, payload: &[u8]) -> anyhow::Result<Vec<String>> {
    let len = read_short(start, payload)? as usize;
    let mut list = Vec::with_capacity(len);
    for _ in 0..len {
        list.push(read_string(start, payload)?);
    }
    Ok(list)
}

/// Write a CQL `[string list]`.
pub fn write_string_list(l: &[String], payload: &mut Vec<u8>) {
    payload.extend((l.len() as u16).to_be_bytes());
    for s in l {
        write_string(s, payload);
    }
}

/// Read a CQL `[string map]`: a `[short]` n followed by n `<k><v>` string pairs.
pub fn read_string_map(start: &mut usize, payload: &[u8]) -> anyhow::Result<HashMap<String, String>> {
    let len = read_short(start, payload)? as usize;
    let mut map = HashMap::with_capacity(len);
    for _ in 0..len {
        map.insert(read_string(start, payload)?, read_string(start, payload)?);
    }
    Ok(map)
}

/// Write a CQL `[string map]`.
pub fn write_string_map(m: &HashMap<String, String>, payload: &mut Vec<u8>) {
    payload.extend((m.len() as u16).to_be_bytes());
    for (k, v) in m {
        write_string(k, payload);
        write_string(v, payload);
    }
}

/// Read a CQL `[string multimap]`: a `[short]` n followed by n pairs of
/// `[string]` key and `[string list]` value.
pub fn read_string_multimap(start: &mut usize, payload: &[u8]) -> anyhow::Result<HashMap<String, Vec<String>>> {
    let len = read_short(start, payload)? as usize;
    let mut map = HashMap::with_capacity(len);
    for _ in 0..len {
        map.insert(read_string(start, payload)?, read_string_list(start, payload)?);
    }
    Ok(map)
}

/// Write a CQL `[string multimap]`.
pub fn write_string_multimap(m: &HashMap<String, Vec<String>>, payload: &mut Vec<u8>) {
    payload.extend((m.len() as u16).to_be_bytes());
    for (k, v) in m {
        write_string(k, payload);
        write_string_list(v, payload);
    }
}

/// Read an unsigned vint. The number of leading 1-bits of the first byte is
/// the count of extra payload bytes; the remaining bits of the first byte
/// and all extra bytes form the big-endian value.
pub fn read_unsigned_vint(start: &mut usize, payload: &[u8]) -> Result<u64, FrameError> {
    let first = read_byte(start, payload)?;
    let extra = first.leading_ones() as usize;
    ensure_remaining(*start, payload, extra)?;
    let mut value = (first as u64) & (0xffu64 >> extra);
    for _ in 0..extra {
        value = (value << 8) | payload[*start] as u64;
        *start += 1;
    }
    Ok(value)
}

/// Write an unsigned vint. A value of `bits` significant bits takes
/// `1 + (bits - 1) / 7` bytes: each extra byte buys 7 bits, since the lead
/// byte spends one bit per extra byte on the length tag.
pub fn write_unsigned_vint(value: u64, payload: &mut Vec<u8>) {
    let bits = (64 - (value | 1).leading_zeros()) as usize;
    let extra = ((bits - 1) / 7).min(8);
    if extra == 8 {
        payload.push(0xff);
        payload.extend(value.to_be_bytes());
        return;
    }
    let mask = if extra == 0 { 0 } else { !(0xffu8 >> extra) };
    payload.push(mask | (value >> (8 * extra)) as u8);
    payload.extend(&value.to_be_bytes()[8 - extra..]);
}

/// Read a signed vint: the zig-zag mapping over the unsigned form.
pub fn read_vint(start: &mut usize, payload: &[u8]) -> Result<i64, FrameError> {
    let unsigned = read_unsigned_vint(start, payload)?;
    Ok((unsigned >> 1) as i64 ^ -((unsigned & 1) as i64))
}

/// Write a signed vint.
pub fn write_vint(value: i64, payload: &mut Vec<u8>) {
    write_unsigned_vint(((value << 1) ^ (value >> 63)) as u64, payload);
}

/// The bound-parameter list of a QUERY, EXECUTE or BATCH sub-statement:
/// `[bytes]`-framed cells stored back-to-back, with the null (-1) and
/// unset (-2) sentinels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Values {
    buffer: Vec<u8>,
    count: u16,
}

impl Values {
    /// Append a bound value.
    pub fn push(&mut self, value: &[u8]) {
        write_bytes(value, &mut self.buffer);
        self.count += 1;
    }

    /// Append the null sentinel.
    pub fn push_null(&mut self) {
        write_int(-1, &mut self.buffer);
        self.count += 1;
    }

    /// Append the unset sentinel, leaving the bound column untouched.
    pub fn push_unset(&mut self) {
        write_int(-2, &mut self.buffer);
        self.count += 1;
    }

    /// Number of bound values.
    pub fn len(&self) -> u16 {
        self.count
    }

    /// Whether no values are bound.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The encoded cells, without the leading count.
    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }
}

impl FromPayload for Values {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let count = read_short(start, payload)?;
        let from = *start;
        for _ in 0..count {
            read_bytes(start, payload)?;
        }
        Ok(Self {
            buffer: payload[from..*start].to_vec(),
            count,
        })
    }
}

impl ToPayload for Values {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short(self.count, payload);
        payload.extend(self.buffer);
    }
}

/// Defines a type that can be read from a frame payload at a cursor.
pub trait FromPayload: Sized {
    /// Read this value beginning at `start`, advancing the cursor by the
    /// number of bytes consumed.
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self>;
}

/// Defines a type that can be written to a frame payload.
pub trait ToPayload {
    /// Append this value to the payload.
    fn to_payload(self, payload: &mut Vec<u8>);
}

impl FromPayload for String {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        read_string(start, payload)
    }
}

impl FromPayload for SocketAddr {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        read_inet(start, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_primitives_round_trip() {
        let mut payload = Vec::new();
        write_byte(0xab, &mut payload);
        write_short(0x0102, &mut payload);
        write_int(-42, &mut payload);
        write_long(i64::MIN, &mut payload);
        write_string("hello", &mut payload);
        write_long_string("world", &mut payload);
        write_bytes(&[1, 2, 3], &mut payload);
        write_short_bytes(&[4, 5], &mut payload);

        let mut start = 0;
        assert_eq!(read_byte(&mut start, &payload).unwrap(), 0xab);
        assert_eq!(read_short(&mut start, &payload).unwrap(), 0x0102);
        assert_eq!(read_int(&mut start, &payload).unwrap(), -42);
        assert_eq!(read_long(&mut start, &payload).unwrap(), i64::MIN);
        assert_eq!(read_string(&mut start, &payload).unwrap(), "hello");
        assert_eq!(read_long_string(&mut start, &payload).unwrap(), "world");
        assert_eq!(read_bytes(&mut start, &payload).unwrap(), Some(&[1u8, 2, 3][..]));
        assert_eq!(read_short_bytes(&mut start, &payload).unwrap(), &[4, 5]);
        assert_eq!(start, payload.len());
    }

    #[test]
    fn null_bytes() {
        let mut payload = Vec::new();
        write_int(-1, &mut payload);
        assert_eq!(read_bytes(&mut 0, &payload).unwrap(), None);
    }

    #[test]
    fn out_of_range_carries_requested_length() {
        let payload = [0u8; 3];
        match read_int(&mut 0, &payload) {
            Err(FrameError::OutOfRange { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 3);
            }
            other => panic!("expected OutOfRange, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn uuid_round_trip() {
        let uuid = Uuid::parse_str("f47ac10b-58cc-4372-a567-0e02b2c3d479").unwrap();
        let mut payload = Vec::new();
        write_uuid(&uuid, &mut payload);
        assert_eq!(payload.len(), 16);
        assert_eq!(read_uuid(&mut 0, &payload).unwrap(), uuid);
    }

    #[test]
    fn inet_round_trip() {
        for addr in ["127.0.0.1:9042", "[2001:db8::1]:19042"] {
            let addr: SocketAddr = addr.parse().unwrap();
            let mut payload = Vec::new();
            write_inet(addr, &mut payload);
            assert_eq!(read_inet(&mut 0, &payload).unwrap(), addr);
        }
    }

    #[test]
    fn unsigned_vint_round_trip() {
        for value in [
            0u64,
            1,
            127,
            128,
            255,
            256,
            0x3fff,
            0x4000,
            0x1f_ffff,
            0xffff_ffff,
            1 << 55,
            u64::MAX,
        ] {
            let mut payload = Vec::new();
            write_unsigned_vint(value, &mut payload);
            assert!(payload.len() <= MAX_VINT_LEN);
            let mut start = 0;
            assert_eq!(read_unsigned_vint(&mut start, &payload).unwrap(), value, "{:#x}", value);
            assert_eq!(start, payload.len());
        }
    }

    #[test]
    fn unsigned_vint_known_encodings() {
        let mut payload = Vec::new();
        write_unsigned_vint(0, &mut payload);
        assert_eq!(payload, [0x00]);
        payload.clear();
        write_unsigned_vint(127, &mut payload);
        assert_eq!(payload, [0x7f]);
        payload.clear();
        write_unsigned_vint(128, &mut payload);
        assert_eq!(payload, [0x80, 0x80]);
        payload.clear();
        write_unsigned_vint(u64::MAX, &mut payload);
        assert_eq!(payload.len(), MAX_VINT_LEN);
        assert_eq!(payload[0], 0xff);
    }

    #[test]
    fn signed_vint_round_trip() {
        for value in [0i64, 1, -1, 63, -64, 64, -65, 1 << 20, -(1 << 20), i64::MAX, i64::MIN] {
            let mut payload = Vec::new();
            write_vint(value, &mut payload);
            let mut start = 0;
            assert_eq!(read_vint(&mut start, &payload).unwrap(), value);
            assert_eq!(start, payload.len());
        }
    }

    #[test]
    fn values_framing() {
        let mut values = Values::default();
        values.push(&[0, 0, 0, 42]);
        values.push_null();
        values.push_unset();
        assert_eq!(values.len(), 3);
        let mut payload = Vec::new();
        values.clone().to_payload(&mut payload);
        let decoded = Values::from_payload(&mut 0, &payload).unwrap();
        assert_eq!(decoded, values);
    }
}
