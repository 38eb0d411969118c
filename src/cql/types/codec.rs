// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The value codec: serializing dynamic values against a type descriptor
//! and deserializing result cells back.

use super::{
    duration::CqlDuration,
    numeric::{
        CqlDecimal,
        CqlVarint,
    },
    value::CqlValue,
    Blob,
    CqlDate,
    CqlTime,
    CqlType,
    NANOS_IN_DAY,
};
use crate::cql::frame::{
    read_int,
    read_unsigned_vint,
    read_vint,
    write_int,
    write_unsigned_vint,
    write_vint,
};
use bytes::Bytes;
use std::{
    convert::TryInto,
    net::IpAddr,
};
use thiserror::Error;
use uuid::Uuid;

/// A caller-visible invalid input: mismatched or out-of-range parameter,
/// missing type hint, wrong arity.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct ArgumentError(pub String);

macro_rules! argument_error {
    ($($arg:tt)*) => {
        ArgumentError(format!($($arg)*))
    };
}

/// Malformed or truncated server bytes.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct DecodingError(pub String);

macro_rules! decoding_error {
    ($($arg:tt)*) => {
        DecodingError(format!($($arg)*))
    };
}

/// Serialize `value` against the hinted type, appending the bare value bytes
/// (without the `[bytes]` length prefix) to `buffer`.
pub fn encode_value(value: &CqlValue, hint: &CqlType, buffer: &mut Vec<u8>) -> Result<(), ArgumentError> {
    // raw passthrough: a blob binds against any hint as pre-serialized bytes
    if let CqlValue::Blob(blob) = value {
        buffer.extend(blob.iter());
        return Ok(());
    }
    match hint {
        CqlType::Ascii => {
            let s = value
                .as_text()
                .ok_or_else(|| mismatch(value, hint))?;
            if !s.is_ascii() {
                return Err(argument_error!("Ascii value contains non 7-bit characters: {:?}", s));
            }
            buffer.extend(s.as_bytes());
        }
        CqlType::Text => {
            buffer.extend(value.as_text().ok_or_else(|| mismatch(value, hint))?.as_bytes());
        }
        CqlType::Blob | CqlType::Custom(_) => return Err(mismatch(value, hint)),
        CqlType::Boolean => match value {
            CqlValue::Boolean(b) => buffer.push(*b as u8),
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::TinyInt => {
            let v = integer_in_range(value, hint, i8::MIN as i64, i8::MAX as i64)?;
            buffer.extend((v as i8).to_be_bytes());
        }
        CqlType::SmallInt => {
            let v = integer_in_range(value, hint, i16::MIN as i64, i16::MAX as i64)?;
            buffer.extend((v as i16).to_be_bytes());
        }
        CqlType::Int => {
            let v = integer_in_range(value, hint, i32::MIN as i64, i32::MAX as i64)?;
            buffer.extend((v as i32).to_be_bytes());
        }
        CqlType::BigInt | CqlType::Counter => {
            let v = as_integer(value).ok_or_else(|| mismatch(value, hint))?;
            buffer.extend(v.to_be_bytes());
        }
        CqlType::Float => match value {
            CqlValue::Float(v) => buffer.extend(v.to_be_bytes()),
            CqlValue::Double(v) => buffer.extend((*v as f32).to_be_bytes()),
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Double => match value {
            CqlValue::Double(v) => buffer.extend(v.to_be_bytes()),
            CqlValue::Float(v) => buffer.extend((*v as f64).to_be_bytes()),
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Decimal => match value {
            CqlValue::Decimal(d) => {
                buffer.extend(d.scale().to_be_bytes());
                buffer.extend(d.unscaled().as_signed_bytes_be());
            }
            v => {
                let v = as_integer(v).ok_or_else(|| mismatch(value, hint))?;
                buffer.extend(0i32.to_be_bytes());
                buffer.extend(CqlVarint::from(v).as_signed_bytes_be());
            }
        },
        CqlType::Varint => match value {
            CqlValue::Varint(v) => buffer.extend(v.as_signed_bytes_be()),
            v => {
                let v = as_integer(v).ok_or_else(|| mismatch(value, hint))?;
                buffer.extend(CqlVarint::from(v).as_signed_bytes_be());
            }
        },
        CqlType::Timestamp => match value {
            CqlValue::Timestamp(ms) | CqlValue::BigInt(ms) => buffer.extend(ms.to_be_bytes()),
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Date => match value {
            CqlValue::Date(date) => buffer.extend(date.0.to_be_bytes()),
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Time => match value {
            CqlValue::Time(time) => {
                if !time.is_valid() {
                    return Err(argument_error!(
                        "Time value out of range [0, {}): {}",
                        NANOS_IN_DAY,
                        time.0
                    ));
                }
                buffer.extend(time.0.to_be_bytes());
            }
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Duration => match value {
            CqlValue::Duration(d) => {
                write_vint(d.months as i64, buffer);
                write_vint(d.days as i64, buffer);
                write_vint(d.nanoseconds, buffer);
            }
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Uuid | CqlType::TimeUuid => match value {
            CqlValue::Uuid(uuid) | CqlValue::TimeUuid(uuid) => buffer.extend(uuid.as_bytes()),
            CqlValue::Text(s) => {
                let uuid =
                    Uuid::parse_str(s).map_err(|e| argument_error!("Invalid uuid string {:?}: {}", s, e))?;
                buffer.extend(uuid.as_bytes());
            }
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Inet => match value {
            CqlValue::Inet(IpAddr::V4(ip)) => buffer.extend(ip.octets()),
            CqlValue::Inet(IpAddr::V6(ip)) => buffer.extend(ip.octets()),
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::List(elem) | CqlType::Set(elem) => match value {
            CqlValue::List(elems) | CqlValue::Set(elems) | CqlValue::Vector(elems) => {
                write_int(elems.len() as i32, buffer);
                for e in elems {
                    encode_cell(e, elem, buffer)?;
                }
            }
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Map(key, val) => match value {
            CqlValue::Map(pairs) => {
                write_int(pairs.len() as i32, buffer);
                for (k, v) in pairs {
                    encode_cell(k, key, buffer)?;
                    encode_cell(v, val, buffer)?;
                }
            }
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Tuple(types) => match value {
            CqlValue::Tuple(elems) => {
                if elems.len() != types.len() {
                    return Err(argument_error!(
                        "Tuple arity mismatch: {} values for {} types",
                        elems.len(),
                        types.len()
                    ));
                }
                for (e, t) in elems.iter().zip(types) {
                    encode_cell(e, t, buffer)?;
                }
            }
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Udt { fields, name, .. } => match value {
            CqlValue::Udt(values) => {
                // fields are written in declaration order; absent ones are null
                for (field, field_type) in fields {
                    match values.iter().find(|(name, _)| name == field) {
                        Some((_, v)) => encode_cell(v, field_type, buffer)?,
                        None => write_int(-1, buffer),
                    }
                }
                if let Some((unknown, _)) = values.iter().find(|(n, _)| !fields.iter().any(|(f, _)| f == n)) {
                    return Err(argument_error!("Unknown field {:?} for UDT {}", unknown, name));
                }
            }
            _ => return Err(mismatch(value, hint)),
        },
        CqlType::Vector(elem, dim) => match value {
            CqlValue::Vector(elems) | CqlValue::List(elems) => {
                if elems.len() != *dim {
                    return Err(argument_error!(
                        "Vector dimension mismatch: {} values for dimension {}",
                        elems.len(),
                        dim
                    ));
                }
                let fixed = elem.fixed_width().is_some();
                for e in elems {
                    if fixed {
                        encode_value(e, elem, buffer)?;
                    } else {
                        let mut cell = Vec::new();
                        encode_value(e, elem, &mut cell)?;
                        write_unsigned_vint(cell.len() as u64, buffer);
                        buffer.extend(cell);
                    }
                }
            }
            _ => return Err(mismatch(value, hint)),
        },
    }
    Ok(())
}

/// Serialize a collection element or field as a `[bytes]` cell, with -1 for
/// null.
fn encode_cell(value: &CqlValue, cql_type: &CqlType, buffer: &mut Vec<u8>) -> Result<(), ArgumentError> {
    if value.is_null() {
        write_int(-1, buffer);
        return Ok(());
    }
    let len_at = buffer.len();
    write_int(0, buffer);
    encode_value(value, cql_type, buffer)?;
    let len = (buffer.len() - len_at - 4) as i32;
    buffer[len_at..len_at + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

fn mismatch(value: &CqlValue, hint: &CqlType) -> ArgumentError {
    argument_error!("Cannot encode {:?} as {}", value, hint)
}

fn as_integer(value: &CqlValue) -> Option<i64> {
    Some(match value {
        CqlValue::TinyInt(v) => *v as i64,
        CqlValue::SmallInt(v) => *v as i64,
        CqlValue::Int(v) => *v as i64,
        CqlValue::BigInt(v) | CqlValue::Counter(v) => *v,
        _ => return None,
    })
}

fn integer_in_range(value: &CqlValue, hint: &CqlType, min: i64, max: i64) -> Result<i64, ArgumentError> {
    let v = as_integer(value).ok_or_else(|| mismatch(value, hint))?;
    if v < min || v > max {
        return Err(argument_error!("Value {} out of range for {}: [{}, {}]", v, hint, min, max));
    }
    Ok(v)
}

/// Deserialize one non-null cell against its type. `copy_buffer` selects
/// whether blob-shaped values copy the cell or alias the shared page buffer.
pub fn decode_value(cell: &Bytes, cql_type: &CqlType, copy_buffer: bool) -> Result<CqlValue, DecodingError> {
    Ok(match cql_type {
        CqlType::Ascii => CqlValue::Ascii(decode_utf8(cell, cql_type)?),
        CqlType::Text => CqlValue::Text(decode_utf8(cell, cql_type)?),
        CqlType::Blob => CqlValue::Blob(if copy_buffer {
            Blob::from(cell.to_vec())
        } else {
            Blob(cell.clone())
        }),
        CqlType::Custom(_) => CqlValue::Blob(if copy_buffer {
            Blob::from(cell.to_vec())
        } else {
            Blob(cell.clone())
        }),
        CqlType::Boolean => match exact::<1>(cell, cql_type)? {
            [0] => CqlValue::Boolean(false),
            _ => CqlValue::Boolean(true),
        },
        CqlType::TinyInt => CqlValue::TinyInt(i8::from_be_bytes(exact(cell, cql_type)?)),
        CqlType::SmallInt => CqlValue::SmallInt(i16::from_be_bytes(exact(cell, cql_type)?)),
        CqlType::Int => CqlValue::Int(i32::from_be_bytes(exact(cell, cql_type)?)),
        CqlType::BigInt => CqlValue::BigInt(i64::from_be_bytes(exact(cell, cql_type)?)),
        CqlType::Counter => CqlValue::Counter(i64::from_be_bytes(exact(cell, cql_type)?)),
        CqlType::Float => CqlValue::Float(f32::from_be_bytes(exact(cell, cql_type)?)),
        CqlType::Double => CqlValue::Double(f64::from_be_bytes(exact(cell, cql_type)?)),
        CqlType::Decimal => {
            if cell.len() < 4 {
                return Err(truncated(cell, cql_type));
            }
            let scale = i32::from_be_bytes(cell[..4].try_into().unwrap());
            CqlValue::Decimal(CqlDecimal::new(
                scale,
                CqlVarint::from_signed_bytes_be(cell[4..].to_vec()),
            ))
        }
        CqlType::Varint => {
            if cell.is_empty() {
                return Err(truncated(cell, cql_type));
            }
            CqlValue::Varint(CqlVarint::from_signed_bytes_be(cell.to_vec()))
        }
        CqlType::Timestamp => CqlValue::Timestamp(i64::from_be_bytes(exact(cell, cql_type)?)),
        CqlType::Date => CqlValue::Date(CqlDate(u32::from_be_bytes(exact(cell, cql_type)?))),
        CqlType::Time => {
            let time = CqlTime(i64::from_be_bytes(exact(cell, cql_type)?));
            if !time.is_valid() {
                return Err(decoding_error!("Time value out of range: {}", time.0));
            }
            CqlValue::Time(time)
        }
        CqlType::Duration => {
            let mut start = 0;
            let months = read_vint(&mut start, cell.as_ref()).map_err(|e| decoding_error!("Bad duration: {}", e))?;
            let days = read_vint(&mut start, cell.as_ref()).map_err(|e| decoding_error!("Bad duration: {}", e))?;
            let nanoseconds = read_vint(&mut start, cell.as_ref()).map_err(|e| decoding_error!("Bad duration: {}", e))?;
            if start != cell.len() {
                return Err(decoding_error!("Trailing bytes after duration"));
            }
            CqlValue::Duration(CqlDuration {
                months: months
                    .try_into()
                    .map_err(|_| decoding_error!("Duration months out of range: {}", months))?,
                days: days
                    .try_into()
                    .map_err(|_| decoding_error!("Duration days out of range: {}", days))?,
                nanoseconds,
            })
        }
        CqlType::Uuid => CqlValue::Uuid(Uuid::from_bytes(exact(cell, cql_type)?)),
        CqlType::TimeUuid => CqlValue::TimeUuid(Uuid::from_bytes(exact(cell, cql_type)?)),
        CqlType::Inet => match cell.len() {
            4 => CqlValue::Inet(IpAddr::from(<[u8; 4]>::try_from(&cell[..]).unwrap())),
            16 => CqlValue::Inet(IpAddr::from(<[u8; 16]>::try_from(&cell[..]).unwrap())),
            n => return Err(decoding_error!("Invalid inet length: {}", n)),
        },
        CqlType::List(elem) => CqlValue::List(decode_elements(cell, elem, copy_buffer)?),
        CqlType::Set(elem) => CqlValue::Set(decode_elements(cell, elem, copy_buffer)?),
        CqlType::Map(key, val) => {
            let mut start = 0;
            let count = read_count(&mut start, cell, cql_type)?;
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let k = decode_subcell(&mut start, cell, key, copy_buffer)?;
                let v = decode_subcell(&mut start, cell, val, copy_buffer)?;
                pairs.push((k, v));
            }
            CqlValue::Map(pairs)
        }
        CqlType::Tuple(types) => {
            let mut start = 0;
            let mut elems = Vec::with_capacity(types.len());
            for t in types {
                // trailing elements may be absent entirely
                if start >= cell.len() {
                    elems.push(CqlValue::Null);
                } else {
                    elems.push(decode_subcell(&mut start, cell, t, copy_buffer)?);
                }
            }
            CqlValue::Tuple(elems)
        }
        CqlType::Udt { fields, .. } => {
            let mut start = 0;
            let mut values = Vec::with_capacity(fields.len());
            for (field, field_type) in fields {
                if start >= cell.len() {
                    values.push((field.clone(), CqlValue::Null));
                } else {
                    values.push((field.clone(), decode_subcell(&mut start, cell, field_type, copy_buffer)?));
                }
            }
            CqlValue::Udt(values)
        }
        CqlType::Vector(elem, dim) => {
            let mut start = 0;
            let mut elems = Vec::with_capacity(*dim);
            match elem.fixed_width() {
                Some(width) => {
                    for _ in 0..*dim {
                        if start + width > cell.len() {
                            return Err(truncated(cell, cql_type));
                        }
                        elems.push(decode_value(&cell.slice(start..start + width), elem, copy_buffer)?);
                        start += width;
                    }
                }
                None => {
                    for _ in 0..*dim {
                        let len = read_unsigned_vint(&mut start, cell.as_ref())
                            .map_err(|e| decoding_error!("Bad vector element length: {}", e))?
                            as usize;
                        if start + len > cell.len() {
                            return Err(truncated(cell, cql_type));
                        }
                        elems.push(decode_value(&cell.slice(start..start + len), elem, copy_buffer)?);
                        start += len;
                    }
                }
            }
            if start != cell.len() {
                return Err(decoding_error!("Trailing bytes after vector"));
            }
            CqlValue::Vector(elems)
        }
    })
}

fn decode_utf8(cell: &Bytes, cql_type: &CqlType) -> Result<String, DecodingError> {
    String::from_utf8(cell.to_vec()).map_err(|e| decoding_error!("Invalid utf-8 for {}: {}", cql_type, e))
}

fn exact<const N: usize>(cell: &Bytes, cql_type: &CqlType) -> Result<[u8; N], DecodingError> {
    cell.as_ref().try_into().map_err(|_| truncated(cell, cql_type))
}

fn truncated(cell: &Bytes, cql_type: &CqlType) -> DecodingError {
    decoding_error!("Malformed cell for {}: {} bytes", cql_type, cell.len())
}

fn read_count(start: &mut usize, cell: &Bytes, cql_type: &CqlType) -> Result<usize, DecodingError> {
    let count = read_int(start, cell.as_ref()).map_err(|_| truncated(cell, cql_type))?;
    if count < 0 {
        return Err(decoding_error!("Negative element count for {}: {}", cql_type, count));
    }
    Ok(count as usize)
}

/// Read one `[bytes]`-framed sub-cell and decode it; a negative length is a
/// null element.
fn decode_subcell(
    start: &mut usize,
    cell: &Bytes,
    cql_type: &CqlType,
    copy_buffer: bool,
) -> Result<CqlValue, DecodingError> {
    let len = read_int(start, cell.as_ref()).map_err(|_| truncated(cell, cql_type))?;
    if len < 0 {
        return Ok(CqlValue::Null);
    }
    let len = len as usize;
    if *start + len > cell.len() {
        return Err(truncated(cell, cql_type));
    }
    let sub = cell.slice(*start..*start + len);
    *start += len;
    decode_value(&sub, cql_type, copy_buffer)
}

fn decode_elements(cell: &Bytes, elem: &CqlType, copy_buffer: bool) -> Result<Vec<CqlValue>, DecodingError> {
    let mut start = 0;
    let count = read_count(&mut start, cell, elem)?;
    let mut elems = Vec::with_capacity(count);
    for _ in 0..count {
        elems.push(decode_subcell(&mut start, cell, elem, copy_buffer)?);
    }
    Ok(elems)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: CqlValue, cql_type: CqlType) {
        let mut buffer = Vec::new();
        encode_value(&value, &cql_type, &mut buffer).unwrap();
        let decoded = decode_value(&Bytes::from(buffer), &cql_type, true).unwrap();
        assert_eq!(decoded, value, "{}", cql_type);
    }

    #[test]
    fn scalar_round_trips() {
        round_trip(CqlValue::Ascii("ok".into()), CqlType::Ascii);
        round_trip(CqlValue::Text("héllo".into()), CqlType::Text);
        round_trip(CqlValue::Boolean(true), CqlType::Boolean);
        round_trip(CqlValue::TinyInt(-5), CqlType::TinyInt);
        round_trip(CqlValue::SmallInt(-300), CqlType::SmallInt);
        round_trip(CqlValue::Int(i32::MIN), CqlType::Int);
        round_trip(CqlValue::BigInt(i64::MAX), CqlType::BigInt);
        round_trip(CqlValue::Counter(9), CqlType::Counter);
        round_trip(CqlValue::Float(1.5), CqlType::Float);
        round_trip(CqlValue::Double(-0.25), CqlType::Double);
        round_trip(CqlValue::Timestamp(1_700_000_000_000), CqlType::Timestamp);
        round_trip(CqlValue::Date(CqlDate::from_days_since_epoch(10)), CqlType::Date);
        round_trip(CqlValue::Time(CqlTime(NANOS_IN_DAY - 1)), CqlType::Time);
        round_trip(
            CqlValue::Duration(CqlDuration::new(1, 2, 3_000_000_000)),
            CqlType::Duration,
        );
        round_trip(
            CqlValue::Uuid(Uuid::parse_str("f47ac10b-58cc-4372-a567-0e02b2c3d479").unwrap()),
            CqlType::Uuid,
        );
        round_trip(CqlValue::Inet("10.1.2.3".parse().unwrap()), CqlType::Inet);
        round_trip(CqlValue::Inet("2001:db8::1".parse().unwrap()), CqlType::Inet);
        round_trip(CqlValue::Decimal(CqlDecimal::from_i64(-12345, 3)), CqlType::Decimal);
        round_trip(CqlValue::Varint(CqlVarint::from(i64::MIN)), CqlType::Varint);
    }

    #[test]
    fn collection_round_trips() {
        round_trip(
            CqlValue::List(vec![CqlValue::Int(1), CqlValue::Null, CqlValue::Int(3)]),
            CqlType::List(Box::new(CqlType::Int)),
        );
        round_trip(
            CqlValue::Set(vec![CqlValue::Text("a".into()), CqlValue::Text("b".into())]),
            CqlType::Set(Box::new(CqlType::Text)),
        );
        round_trip(
            CqlValue::Map(vec![
                (CqlValue::Text("k".into()), CqlValue::BigInt(1)),
                (CqlValue::Text("q".into()), CqlValue::Null),
            ]),
            CqlType::Map(Box::new(CqlType::Text), Box::new(CqlType::BigInt)),
        );
        round_trip(
            CqlValue::Tuple(vec![CqlValue::Int(5), CqlValue::Null, CqlValue::Text("t".into())]),
            CqlType::Tuple(vec![CqlType::Int, CqlType::Double, CqlType::Text]),
        );
        round_trip(
            CqlValue::Udt(vec![
                ("street".to_owned(), CqlValue::Text("main".into())),
                ("zip".to_owned(), CqlValue::Int(12345)),
            ]),
            CqlType::Udt {
                keyspace: "ks".into(),
                name: "addr".into(),
                fields: vec![("street".into(), CqlType::Text), ("zip".into(), CqlType::Int)],
            },
        );
        round_trip(
            CqlValue::List(vec![CqlValue::List(vec![CqlValue::Int(1)]), CqlValue::List(vec![])]),
            CqlType::List(Box::new(CqlType::List(Box::new(CqlType::Int)))),
        );
    }

    #[test]
    fn vector_fixed_elements_have_no_prefix() {
        let value = CqlValue::Vector(vec![CqlValue::Float(1.0), CqlValue::Float(2.0), CqlValue::Float(3.0)]);
        let cql_type = CqlType::Vector(Box::new(CqlType::Float), 3);
        let mut buffer = Vec::new();
        encode_value(&value, &cql_type, &mut buffer).unwrap();
        assert_eq!(buffer.len(), 12);
        assert_eq!(decode_value(&Bytes::from(buffer), &cql_type, true).unwrap(), value);
    }

    #[test]
    fn vector_variable_elements_are_vint_prefixed() {
        let value = CqlValue::Vector(vec![CqlValue::Text("ab".into()), CqlValue::Text("c".into())]);
        let cql_type = CqlType::Vector(Box::new(CqlType::Text), 2);
        let mut buffer = Vec::new();
        encode_value(&value, &cql_type, &mut buffer).unwrap();
        assert_eq!(buffer, [0x02, b'a', b'b', 0x01, b'c']);
        assert_eq!(decode_value(&Bytes::from(buffer), &cql_type, true).unwrap(), value);
    }

    #[test]
    fn out_of_range_integers_are_rejected() {
        let mut buffer = Vec::new();
        assert!(encode_value(&CqlValue::Int(128), &CqlType::TinyInt, &mut buffer).is_err());
        assert!(encode_value(&CqlValue::Int(40_000), &CqlType::SmallInt, &mut buffer).is_err());
        assert!(encode_value(&CqlValue::BigInt(1 << 40), &CqlType::Int, &mut buffer).is_err());
        assert!(encode_value(&CqlValue::Int(127), &CqlType::TinyInt, &mut buffer).is_ok());
    }

    #[test]
    fn time_bounds_are_enforced() {
        let mut buffer = Vec::new();
        assert!(encode_value(&CqlValue::Time(CqlTime(-1)), &CqlType::Time, &mut buffer).is_err());
        assert!(encode_value(&CqlValue::Time(CqlTime(NANOS_IN_DAY)), &CqlType::Time, &mut buffer).is_err());
        let bad = Bytes::from(NANOS_IN_DAY.to_be_bytes().to_vec());
        assert!(decode_value(&bad, &CqlType::Time, true).is_err());
    }

    #[test]
    fn ascii_rejects_eight_bit() {
        let mut buffer = Vec::new();
        assert!(encode_value(&CqlValue::Text("héllo".into()), &CqlType::Ascii, &mut buffer).is_err());
    }

    #[test]
    fn blob_passthrough_binds_against_any_hint() {
        let mut buffer = Vec::new();
        encode_value(&CqlValue::Blob(vec![0, 0, 0, 7].into()), &CqlType::Int, &mut buffer).unwrap();
        assert_eq!(buffer, [0, 0, 0, 7]);
    }

    #[test]
    fn uuid_strings_bind_as_uuid() {
        let mut buffer = Vec::new();
        encode_value(
            &CqlValue::Text("f47ac10b-58cc-4372-a567-0e02b2c3d479".into()),
            &CqlType::Uuid,
            &mut buffer,
        )
        .unwrap();
        assert_eq!(buffer.len(), 16);
    }

    #[test]
    fn truncated_cells_fail_decoding() {
        assert!(decode_value(&Bytes::from_static(&[0, 0]), &CqlType::Int, true).is_err());
        assert!(decode_value(&Bytes::from_static(&[1, 2, 3]), &CqlType::Uuid, true).is_err());
        assert!(decode_value(&Bytes::from_static(&[0, 0, 0, 2, 0, 0, 0, 1]), &CqlType::List(Box::new(CqlType::Int)), true).is_err());
    }

    #[test]
    fn zero_copy_blobs_alias_the_cell() {
        let cell = Bytes::from_static(b"shared page");
        let decoded = decode_value(&cell, &CqlType::Blob, false).unwrap();
        match decoded {
            CqlValue::Blob(blob) => {
                assert_eq!(blob.as_ref() as *const [u8], cell.as_ref() as *const [u8]);
            }
            v => panic!("expected blob, got {:?}", v),
        }
    }

    #[test]
    fn decimal_wire_layout() {
        let mut buffer = Vec::new();
        encode_value(
            &CqlValue::Decimal(CqlDecimal::from_i64(1234, 2)),
            &CqlType::Decimal,
            &mut buffer,
        )
        .unwrap();
        assert_eq!(&buffer[..4], &[0, 0, 0, 2]);
        assert_eq!(&buffer[4..], &[0x04, 0xd2]);
    }

    #[test]
    fn udt_missing_fields_encode_as_null() {
        let cql_type = CqlType::Udt {
            keyspace: "ks".into(),
            name: "pair".into(),
            fields: vec![("a".into(), CqlType::Int), ("b".into(), CqlType::Int)],
        };
        let mut buffer = Vec::new();
        encode_value(
            &CqlValue::Udt(vec![("a".to_owned(), CqlValue::Int(1))]),
            &cql_type,
            &mut buffer,
        )
        .unwrap();
        let decoded = decode_value(&Bytes::from(buffer), &cql_type, true).unwrap();
        assert_eq!(
            decoded,
            CqlValue::Udt(vec![
                ("a".to_owned(), CqlValue::Int(1)),
                ("b".to_owned(), CqlValue::Null)
            ])
        );
    }
}
