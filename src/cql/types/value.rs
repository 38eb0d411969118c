// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Dynamic CQL values: the application-side representation of every wire
//! type, the bound-parameter wrapper and type guessing for unhinted
//! parameters of simple statements.

use super::{
    duration::CqlDuration,
    numeric::{
        CqlDecimal,
        CqlVarint,
    },
    Blob,
    CqlDate,
    CqlTime,
    CqlType,
};
use chrono::{
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
};
use std::net::IpAddr;
use uuid::Uuid;

/// A decoded CQL value. Collections are kept as ordered vectors so that
/// arbitrary key types stay usable and server order is preserved.
#[derive(Clone, Debug, PartialEq)]
pub enum CqlValue {
    /// A null cell.
    Null,
    Ascii(String),
    Text(String),
    Blob(Blob),
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Counter(i64),
    Float(f32),
    Double(f64),
    Decimal(CqlDecimal),
    Varint(CqlVarint),
    /// Milliseconds since the epoch.
    Timestamp(i64),
    Date(CqlDate),
    Time(CqlTime),
    Duration(CqlDuration),
    Uuid(Uuid),
    TimeUuid(Uuid),
    Inet(IpAddr),
    List(Vec<CqlValue>),
    Set(Vec<CqlValue>),
    Map(Vec<(CqlValue, CqlValue)>),
    Tuple(Vec<CqlValue>),
    Udt(Vec<(String, CqlValue)>),
    Vector(Vec<CqlValue>),
}

impl CqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CqlValue::Ascii(s) | CqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            CqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            CqlValue::BigInt(v) | CqlValue::Counter(v) | CqlValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            CqlValue::Uuid(u) | CqlValue::TimeUuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            CqlValue::Blob(b) => Some(b),
            _ => None,
        }
    }
}

/// A bound statement parameter: a value, an explicit null, or the unset
/// sentinel that leaves the column untouched.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Null,
    Unset,
    Value(CqlValue),
}

impl ParamValue {
    /// Map an optional value, binding `None` per the session's encoding
    /// options: unset when `use_unset_for_none` is enabled, null otherwise.
    pub fn from_option<T: Into<CqlValue>>(value: Option<T>, use_unset_for_none: bool) -> Self {
        match value {
            Some(v) => ParamValue::Value(v.into()),
            None if use_unset_for_none => ParamValue::Unset,
            None => ParamValue::Null,
        }
    }
}

macro_rules! impl_param_from {
    ($($t:ty),* $(,)?) => {$(
        impl From<$t> for ParamValue {
            fn from(value: $t) -> Self {
                ParamValue::Value(value.into())
            }
        }
    )*};
}

impl_param_from!(
    bool,
    i8,
    i16,
    i32,
    i64,
    f32,
    f64,
    &str,
    String,
    Blob,
    Vec<u8>,
    Uuid,
    IpAddr,
    CqlDuration,
    CqlDecimal,
    CqlVarint,
    CqlDate,
    CqlTime,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    CqlValue,
);

impl From<bool> for CqlValue {
    fn from(v: bool) -> Self {
        CqlValue::Boolean(v)
    }
}

impl From<i8> for CqlValue {
    fn from(v: i8) -> Self {
        CqlValue::TinyInt(v)
    }
}

impl From<i16> for CqlValue {
    fn from(v: i16) -> Self {
        CqlValue::SmallInt(v)
    }
}

impl From<i32> for CqlValue {
    fn from(v: i32) -> Self {
        CqlValue::Int(v)
    }
}

impl From<i64> for CqlValue {
    fn from(v: i64) -> Self {
        CqlValue::BigInt(v)
    }
}

impl From<f32> for CqlValue {
    fn from(v: f32) -> Self {
        CqlValue::Float(v)
    }
}

impl From<f64> for CqlValue {
    fn from(v: f64) -> Self {
        CqlValue::Double(v)
    }
}

impl From<&str> for CqlValue {
    fn from(v: &str) -> Self {
        CqlValue::Text(v.to_owned())
    }
}

impl From<String> for CqlValue {
    fn from(v: String) -> Self {
        CqlValue::Text(v)
    }
}

impl From<Blob> for CqlValue {
    fn from(v: Blob) -> Self {
        CqlValue::Blob(v)
    }
}

impl From<Vec<u8>> for CqlValue {
    fn from(v: Vec<u8>) -> Self {
        CqlValue::Blob(v.into())
    }
}

impl From<Uuid> for CqlValue {
    fn from(v: Uuid) -> Self {
        CqlValue::Uuid(v)
    }
}

impl From<IpAddr> for CqlValue {
    fn from(v: IpAddr) -> Self {
        CqlValue::Inet(v)
    }
}

impl From<CqlDuration> for CqlValue {
    fn from(v: CqlDuration) -> Self {
        CqlValue::Duration(v)
    }
}

impl From<CqlDecimal> for CqlValue {
    fn from(v: CqlDecimal) -> Self {
        CqlValue::Decimal(v)
    }
}

impl From<CqlVarint> for CqlValue {
    fn from(v: CqlVarint) -> Self {
        CqlValue::Varint(v)
    }
}

impl From<CqlDate> for CqlValue {
    fn from(v: CqlDate) -> Self {
        CqlValue::Date(v)
    }
}

impl From<CqlTime> for CqlValue {
    fn from(v: CqlTime) -> Self {
        CqlValue::Time(v)
    }
}

impl From<NaiveDate> for CqlValue {
    fn from(v: NaiveDate) -> Self {
        CqlValue::Date(v.into())
    }
}

impl From<NaiveTime> for CqlValue {
    fn from(v: NaiveTime) -> Self {
        CqlValue::Time(v.into())
    }
}

impl From<NaiveDateTime> for CqlValue {
    fn from(v: NaiveDateTime) -> Self {
        CqlValue::Timestamp(v.timestamp_millis())
    }
}

/// Infer the CQL type of an unhinted simple-statement parameter. Returns
/// `None` for shapes the server cannot disambiguate (maps, UDTs, custom
/// payloads, empty collections); those require an explicit hint.
pub fn guess(value: &CqlValue) -> Option<CqlType> {
    Some(match value {
        CqlValue::Null => return None,
        CqlValue::Ascii(_) => CqlType::Ascii,
        // uuid-shaped strings bind as uuid, like the text form of a key
        CqlValue::Text(s) => {
            if Uuid::parse_str(s).is_ok() {
                CqlType::Uuid
            } else {
                CqlType::Text
            }
        }
        CqlValue::Blob(_) => CqlType::Blob,
        CqlValue::Boolean(_) => CqlType::Boolean,
        CqlValue::TinyInt(_) => CqlType::TinyInt,
        CqlValue::SmallInt(_) => CqlType::SmallInt,
        CqlValue::Int(_) => CqlType::Int,
        CqlValue::BigInt(_) => CqlType::BigInt,
        CqlValue::Counter(_) => CqlType::Counter,
        CqlValue::Float(_) => CqlType::Float,
        CqlValue::Double(_) => CqlType::Double,
        CqlValue::Decimal(_) => CqlType::Decimal,
        CqlValue::Varint(_) => CqlType::Varint,
        CqlValue::Timestamp(_) => CqlType::Timestamp,
        CqlValue::Date(_) => CqlType::Date,
        CqlValue::Time(_) => CqlType::Time,
        CqlValue::Duration(_) => CqlType::Duration,
        CqlValue::Uuid(_) => CqlType::Uuid,
        CqlValue::TimeUuid(_) => CqlType::TimeUuid,
        CqlValue::Inet(_) => CqlType::Inet,
        CqlValue::List(elems) | CqlValue::Set(elems) => {
            let elem = elems.iter().find(|e| !e.is_null())?;
            let elem_type = guess(elem)?;
            if matches!(value, CqlValue::Set(_)) {
                CqlType::Set(Box::new(elem_type))
            } else {
                CqlType::List(Box::new(elem_type))
            }
        }
        CqlValue::Tuple(elems) => CqlType::Tuple(elems.iter().map(guess).collect::<Option<_>>()?),
        CqlValue::Vector(elems) => {
            let elem = elems.iter().find(|e| !e.is_null())?;
            CqlType::Vector(Box::new(guess(elem)?), elems.len())
        }
        CqlValue::Map(_) | CqlValue::Udt(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guessing_table() {
        assert_eq!(
            guess(&CqlValue::Text("f47ac10b-58cc-4372-a567-0e02b2c3d479".into())),
            Some(CqlType::Uuid)
        );
        assert_eq!(guess(&CqlValue::Text("plain".into())), Some(CqlType::Text));
        assert_eq!(guess(&CqlValue::Boolean(true)), Some(CqlType::Boolean));
        assert_eq!(guess(&CqlValue::BigInt(1)), Some(CqlType::BigInt));
        assert_eq!(guess(&CqlValue::Double(0.5)), Some(CqlType::Double));
        assert_eq!(guess(&CqlValue::Decimal(CqlDecimal::from_i64(1, 0))), Some(CqlType::Decimal));
        assert_eq!(guess(&CqlValue::Varint(2.into())), Some(CqlType::Varint));
        assert_eq!(guess(&CqlValue::Timestamp(0)), Some(CqlType::Timestamp));
        assert_eq!(guess(&CqlValue::Date(CqlDate(0))), Some(CqlType::Date));
        assert_eq!(guess(&CqlValue::Time(CqlTime(0))), Some(CqlType::Time));
        assert_eq!(
            guess(&CqlValue::Duration(CqlDuration::new(1, 0, 0))),
            Some(CqlType::Duration)
        );
        assert_eq!(
            guess(&CqlValue::Inet("127.0.0.1".parse().unwrap())),
            Some(CqlType::Inet)
        );
        assert_eq!(guess(&CqlValue::Blob(vec![1].into())), Some(CqlType::Blob));
    }

    #[test]
    fn list_element_from_first_non_null() {
        let list = CqlValue::List(vec![CqlValue::Null, CqlValue::Int(1)]);
        assert_eq!(guess(&list), Some(CqlType::List(Box::new(CqlType::Int))));
        let empty = CqlValue::List(vec![]);
        assert_eq!(guess(&empty), None);
    }

    #[test]
    fn tuples_guess_per_element() {
        let tuple = CqlValue::Tuple(vec![CqlValue::Int(1), CqlValue::Text("x".into())]);
        assert_eq!(
            guess(&tuple),
            Some(CqlType::Tuple(vec![CqlType::Int, CqlType::Text]))
        );
    }

    #[test]
    fn maps_and_udts_are_not_guessable() {
        assert_eq!(guess(&CqlValue::Map(vec![])), None);
        assert_eq!(guess(&CqlValue::Udt(vec![])), None);
    }

    #[test]
    fn option_binding_honors_unset_flag() {
        assert_eq!(ParamValue::from_option::<i32>(None, true), ParamValue::Unset);
        assert_eq!(ParamValue::from_option::<i32>(None, false), ParamValue::Null);
        assert_eq!(
            ParamValue::from_option(Some(5i32), true),
            ParamValue::Value(CqlValue::Int(5))
        );
    }
}
