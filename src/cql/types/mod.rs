// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The CQL type system: tagged type descriptors, dynamic values and the
//! codec between them and the binary wire form.

pub mod codec;
pub mod duration;
pub mod numeric;
pub mod value;

pub use codec::{
    decode_value,
    encode_value,
};
pub use duration::CqlDuration;
pub use numeric::{
    CqlDecimal,
    CqlVarint,
};
pub use value::{
    guess,
    CqlValue,
    ParamValue,
};

use crate::cql::frame::{
    read_short,
    read_string,
    write_short,
    write_string,
};
use bytes::Bytes;
use chrono::{
    NaiveDate,
    NaiveTime,
    Timelike,
};
use std::{
    fmt::Display,
    ops::Deref,
};

/// The Java marshal class prefix used by custom type names.
const MARSHAL_PREFIX: &str = "org.apache.cassandra.db.marshal.";

/// A tagged CQL type descriptor, as found in result metadata, user hints
/// and the text form (`list<int>`, `map<text, uuid>`, ...).
#[derive(Clone, Debug, PartialEq)]
pub enum CqlType {
    Ascii,
    Text,
    Blob,
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Counter,
    Float,
    Double,
    Decimal,
    Varint,
    Timestamp,
    Date,
    Time,
    Duration,
    Uuid,
    TimeUuid,
    Inet,
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),
    Tuple(Vec<CqlType>),
    Udt {
        keyspace: String,
        name: String,
        fields: Vec<(String, CqlType)>,
    },
    Vector(Box<CqlType>, usize),
    Custom(String),
}

impl CqlType {
    /// The serialized byte width of values of this type, when fixed. Vector
    /// elements of fixed-width types are stored without a length prefix.
    pub fn fixed_width(&self) -> Option<usize> {
        Some(match self {
            CqlType::Boolean | CqlType::TinyInt => 1,
            CqlType::SmallInt => 2,
            CqlType::Int | CqlType::Float | CqlType::Date => 4,
            CqlType::BigInt
            | CqlType::Counter
            | CqlType::Double
            | CqlType::Timestamp
            | CqlType::Time => 8,
            CqlType::Uuid | CqlType::TimeUuid => 16,
            CqlType::Vector(elem, dim) => elem.fixed_width()? * dim,
            _ => return None,
        })
    }

    /// Parse the text form of a type, e.g. `list<frozen<map<text, int>>>`.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        let (name, args) = match s.find('<') {
            Some(open) => {
                anyhow::ensure!(s.ends_with('>'), "Unbalanced angle brackets in type: {}", s);
                (s[..open].trim(), Some(&s[open + 1..s.len() - 1]))
            }
            None => (s, None),
        };
        let expect_args = |n: usize| -> anyhow::Result<Vec<&str>> {
            let args = args.ok_or_else(|| anyhow::anyhow!("Type {} requires arguments", name))?;
            let split = split_top_level(args);
            anyhow::ensure!(split.len() == n, "Type {} requires {} arguments", name, n);
            Ok(split)
        };
        Ok(match name.to_ascii_lowercase().as_str() {
            "ascii" => CqlType::Ascii,
            "text" | "varchar" => CqlType::Text,
            "blob" => CqlType::Blob,
            "boolean" => CqlType::Boolean,
            "tinyint" => CqlType::TinyInt,
            "smallint" => CqlType::SmallInt,
            "int" => CqlType::Int,
            "bigint" => CqlType::BigInt,
            "counter" => CqlType::Counter,
            "float" => CqlType::Float,
            "double" => CqlType::Double,
            "decimal" => CqlType::Decimal,
            "varint" => CqlType::Varint,
            "timestamp" => CqlType::Timestamp,
            "date" => CqlType::Date,
            "time" => CqlType::Time,
            "duration" => CqlType::Duration,
            "uuid" => CqlType::Uuid,
            "timeuuid" => CqlType::TimeUuid,
            "inet" => CqlType::Inet,
            "frozen" => Self::parse(expect_args(1)?[0])?,
            "list" => CqlType::List(Box::new(Self::parse(expect_args(1)?[0])?)),
            "set" => CqlType::Set(Box::new(Self::parse(expect_args(1)?[0])?)),
            "map" => {
                let args = expect_args(2)?;
                CqlType::Map(Box::new(Self::parse(args[0])?), Box::new(Self::parse(args[1])?))
            }
            "tuple" => {
                let args = args.ok_or_else(|| anyhow::anyhow!("Type tuple requires arguments"))?;
                CqlType::Tuple(
                    split_top_level(args)
                        .into_iter()
                        .map(Self::parse)
                        .collect::<anyhow::Result<_>>()?,
                )
            }
            "vector" => {
                let args = expect_args(2)?;
                CqlType::Vector(Box::new(Self::parse(args[0])?), args[1].trim().parse()?)
            }
            _ => anyhow::bail!("Unknown CQL type: {}", s),
        })
    }
}

/// Split a type argument list on top-level commas.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut last = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' | '(' => depth += 1,
            '>' | ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[last..i].trim());
                last = i + 1;
            }
            _ => (),
        }
    }
    parts.push(s[last..].trim());
    parts
}

impl Display for CqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CqlType::Ascii => write!(f, "ascii"),
            CqlType::Text => write!(f, "text"),
            CqlType::Blob => write!(f, "blob"),
            CqlType::Boolean => write!(f, "boolean"),
            CqlType::TinyInt => write!(f, "tinyint"),
            CqlType::SmallInt => write!(f, "smallint"),
            CqlType::Int => write!(f, "int"),
            CqlType::BigInt => write!(f, "bigint"),
            CqlType::Counter => write!(f, "counter"),
            CqlType::Float => write!(f, "float"),
            CqlType::Double => write!(f, "double"),
            CqlType::Decimal => write!(f, "decimal"),
            CqlType::Varint => write!(f, "varint"),
            CqlType::Timestamp => write!(f, "timestamp"),
            CqlType::Date => write!(f, "date"),
            CqlType::Time => write!(f, "time"),
            CqlType::Duration => write!(f, "duration"),
            CqlType::Uuid => write!(f, "uuid"),
            CqlType::TimeUuid => write!(f, "timeuuid"),
            CqlType::Inet => write!(f, "inet"),
            CqlType::List(e) => write!(f, "list<{}>", e),
            CqlType::Set(e) => write!(f, "set<{}>", e),
            CqlType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            CqlType::Tuple(types) => {
                write!(f, "tuple<")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ">")
            }
            CqlType::Udt { name, .. } => write!(f, "{}", name),
            CqlType::Vector(e, dim) => write!(f, "vector<{}, {}>", e, dim),
            CqlType::Custom(name) => write!(f, "'{}'", name),
        }
    }
}

/// Read a type descriptor from result metadata: a `[short]` option id
/// followed by id-specific content.
pub fn read_cql_type(start: &mut usize, payload: &[u8]) -> anyhow::Result<CqlType> {
    Ok(match read_short(start, payload)? {
        0x0000 => parse_custom(&read_string(start, payload)?)?,
        0x0001 => CqlType::Ascii,
        0x0002 => CqlType::BigInt,
        0x0003 => CqlType::Blob,
        0x0004 => CqlType::Boolean,
        0x0005 => CqlType::Counter,
        0x0006 => CqlType::Decimal,
        0x0007 => CqlType::Double,
        0x0008 => CqlType::Float,
        0x0009 => CqlType::Int,
        0x000B => CqlType::Timestamp,
        0x000C => CqlType::Uuid,
        0x000D => CqlType::Text,
        0x000E => CqlType::Varint,
        0x000F => CqlType::TimeUuid,
        0x0010 => CqlType::Inet,
        0x0011 => CqlType::Date,
        0x0012 => CqlType::Time,
        0x0013 => CqlType::SmallInt,
        0x0014 => CqlType::TinyInt,
        0x0015 => CqlType::Duration,
        0x0020 => CqlType::List(Box::new(read_cql_type(start, payload)?)),
        0x0021 => CqlType::Map(
            Box::new(read_cql_type(start, payload)?),
            Box::new(read_cql_type(start, payload)?),
        ),
        0x0022 => CqlType::Set(Box::new(read_cql_type(start, payload)?)),
        0x0030 => {
            let keyspace = read_string(start, payload)?;
            let name = read_string(start, payload)?;
            let count = read_short(start, payload)? as usize;
            let mut fields = Vec::with_capacity(count);
            for _ in 0..count {
                fields.push((read_string(start, payload)?, read_cql_type(start, payload)?));
            }
            CqlType::Udt {
                keyspace,
                name,
                fields,
            }
        }
        0x0031 => {
            let count = read_short(start, payload)? as usize;
            let mut types = Vec::with_capacity(count);
            for _ in 0..count {
                types.push(read_cql_type(start, payload)?);
            }
            CqlType::Tuple(types)
        }
        k => anyhow::bail!("Unknown type option id: {:#06x}", k),
    })
}

/// Write a type descriptor to result metadata.
pub fn write_cql_type(cql_type: &CqlType, payload: &mut Vec<u8>) {
    match cql_type {
        CqlType::Custom(name) => {
            write_short(0x0000, payload);
            write_string(name, payload);
        }
        CqlType::Ascii => write_short(0x0001, payload),
        CqlType::BigInt => write_short(0x0002, payload),
        CqlType::Blob => write_short(0x0003, payload),
        CqlType::Boolean => write_short(0x0004, payload),
        CqlType::Counter => write_short(0x0005, payload),
        CqlType::Decimal => write_short(0x0006, payload),
        CqlType::Double => write_short(0x0007, payload),
        CqlType::Float => write_short(0x0008, payload),
        CqlType::Int => write_short(0x0009, payload),
        CqlType::Timestamp => write_short(0x000B, payload),
        CqlType::Uuid => write_short(0x000C, payload),
        CqlType::Text => write_short(0x000D, payload),
        CqlType::Varint => write_short(0x000E, payload),
        CqlType::TimeUuid => write_short(0x000F, payload),
        CqlType::Inet => write_short(0x0010, payload),
        CqlType::Date => write_short(0x0011, payload),
        CqlType::Time => write_short(0x0012, payload),
        CqlType::SmallInt => write_short(0x0013, payload),
        CqlType::TinyInt => write_short(0x0014, payload),
        CqlType::Duration => write_short(0x0015, payload),
        CqlType::List(e) => {
            write_short(0x0020, payload);
            write_cql_type(e, payload);
        }
        CqlType::Map(k, v) => {
            write_short(0x0021, payload);
            write_cql_type(k, payload);
            write_cql_type(v, payload);
        }
        CqlType::Set(e) => {
            write_short(0x0022, payload);
            write_cql_type(e, payload);
        }
        CqlType::Udt {
            keyspace,
            name,
            fields,
        } => {
            write_short(0x0030, payload);
            write_string(keyspace, payload);
            write_string(name, payload);
            write_short(fields.len() as u16, payload);
            for (field, field_type) in fields {
                write_string(field, payload);
                write_cql_type(field_type, payload);
            }
        }
        CqlType::Tuple(types) => {
            write_short(0x0031, payload);
            write_short(types.len() as u16, payload);
            for t in types {
                write_cql_type(t, payload);
            }
        }
        CqlType::Vector(elem, dim) => {
            write_short(0x0000, payload);
            write_string(
                &format!("{}VectorType({}, {})", MARSHAL_PREFIX, marshal_name(elem), dim),
                payload,
            );
        }
    }
}

/// Resolve a custom type class name, recognizing the vector marshal class.
fn parse_custom(name: &str) -> anyhow::Result<CqlType> {
    if let Some(inner) = name
        .strip_prefix(MARSHAL_PREFIX)
        .and_then(|n| n.strip_prefix("VectorType("))
        .and_then(|n| n.strip_suffix(')'))
    {
        let args = split_top_level(inner);
        anyhow::ensure!(args.len() == 2, "Malformed vector type: {}", name);
        let elem = parse_marshal(args[0]).ok_or_else(|| anyhow::anyhow!("Unknown vector element type: {}", args[0]))?;
        return Ok(CqlType::Vector(Box::new(elem), args[1].trim().parse()?));
    }
    Ok(CqlType::Custom(name.to_owned()))
}

/// Map a marshal class name to its native type.
fn parse_marshal(name: &str) -> Option<CqlType> {
    Some(match name.trim().strip_prefix(MARSHAL_PREFIX)? {
        "AsciiType" => CqlType::Ascii,
        "UTF8Type" => CqlType::Text,
        "BytesType" => CqlType::Blob,
        "BooleanType" => CqlType::Boolean,
        "ByteType" => CqlType::TinyInt,
        "ShortType" => CqlType::SmallInt,
        "Int32Type" => CqlType::Int,
        "LongType" => CqlType::BigInt,
        "CounterColumnType" => CqlType::Counter,
        "FloatType" => CqlType::Float,
        "DoubleType" => CqlType::Double,
        "DecimalType" => CqlType::Decimal,
        "IntegerType" => CqlType::Varint,
        "TimestampType" => CqlType::Timestamp,
        "SimpleDateType" => CqlType::Date,
        "TimeType" => CqlType::Time,
        "DurationType" => CqlType::Duration,
        "UUIDType" => CqlType::Uuid,
        "TimeUUIDType" => CqlType::TimeUuid,
        "InetAddressType" => CqlType::Inet,
        _ => return None,
    })
}

/// Render the marshal class name of a native type.
fn marshal_name(cql_type: &CqlType) -> String {
    let class = match cql_type {
        CqlType::Ascii => "AsciiType",
        CqlType::Text => "UTF8Type",
        CqlType::Blob => "BytesType",
        CqlType::Boolean => "BooleanType",
        CqlType::TinyInt => "ByteType",
        CqlType::SmallInt => "ShortType",
        CqlType::Int => "Int32Type",
        CqlType::BigInt => "LongType",
        CqlType::Counter => "CounterColumnType",
        CqlType::Float => "FloatType",
        CqlType::Double => "DoubleType",
        CqlType::Decimal => "DecimalType",
        CqlType::Varint => "IntegerType",
        CqlType::Timestamp => "TimestampType",
        CqlType::Date => "SimpleDateType",
        CqlType::Time => "TimeType",
        CqlType::Duration => "DurationType",
        CqlType::Uuid => "UUIDType",
        CqlType::TimeUuid => "TimeUUIDType",
        CqlType::Inet => "InetAddressType",
        t => return t.to_string(),
    };
    format!("{}{}", MARSHAL_PREFIX, class)
}

/// A value of the CQL `blob` type, backed by a shared buffer so that the
/// zero-copy decode mode can alias the row page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blob(pub Bytes);

impl Blob {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Blob(data.into())
    }

    pub fn into_inner(self) -> Bytes {
        self.0
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for Blob {
    fn from(data: Vec<u8>) -> Self {
        Blob(data.into())
    }
}

impl From<&[u8]> for Blob {
    fn from(data: &[u8]) -> Self {
        Blob(Bytes::copy_from_slice(data))
    }
}

/// The `date` wire bias: day 2^31 is 1970-01-01.
pub const DATE_EPOCH_BIAS: u32 = 1 << 31;

/// Nanoseconds in a day, the exclusive upper bound of `time` values.
pub const NANOS_IN_DAY: i64 = 86_400_000_000_000;

/// A value of the CQL `date` type: an unsigned day count with 1970-01-01 at
/// the center of the range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CqlDate(pub u32);

impl CqlDate {
    /// The biased day count of a signed offset from the epoch.
    pub fn from_days_since_epoch(days: i32) -> Self {
        CqlDate((days as i64 + DATE_EPOCH_BIAS as i64) as u32)
    }

    /// Days relative to 1970-01-01.
    pub fn days_since_epoch(&self) -> i32 {
        (self.0 as i64 - DATE_EPOCH_BIAS as i64) as i32
    }
}

impl From<NaiveDate> for CqlDate {
    fn from(date: NaiveDate) -> Self {
        let days = date
            .signed_duration_since(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
            .num_days();
        Self::from_days_since_epoch(days as i32)
    }
}

impl TryFrom<CqlDate> for NaiveDate {
    type Error = anyhow::Error;

    fn try_from(date: CqlDate) -> anyhow::Result<Self> {
        NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .checked_add_signed(chrono::Duration::days(date.days_since_epoch() as i64))
            .ok_or_else(|| anyhow::anyhow!("Date overflows the chrono range: {}", date.0))
    }
}

/// A value of the CQL `time` type: nanoseconds since midnight, in
/// `[0, NANOS_IN_DAY)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CqlTime(pub i64);

impl CqlTime {
    /// Whether the value is within the valid day range.
    pub fn is_valid(&self) -> bool {
        (0..NANOS_IN_DAY).contains(&self.0)
    }
}

impl From<NaiveTime> for CqlTime {
    fn from(time: NaiveTime) -> Self {
        let nanos = time.hour() as i64 * 3_600_000_000_000
            + time.minute() as i64 * 60_000_000_000
            + time.second() as i64 * 1_000_000_000
            + time.nanosecond() as i64;
        CqlTime(nanos)
    }
}

impl TryFrom<CqlTime> for NaiveTime {
    type Error = anyhow::Error;

    fn try_from(time: CqlTime) -> anyhow::Result<Self> {
        anyhow::ensure!(time.is_valid(), "Time out of range: {}", time.0);
        let secs = (time.0 / 1_000_000_000) as u32;
        let nanos = (time.0 % 1_000_000_000) as u32;
        NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
            .ok_or_else(|| anyhow::anyhow!("Time out of range: {}", time.0))
    }
}
