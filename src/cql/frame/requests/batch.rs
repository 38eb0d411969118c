// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the BATCH frame.

use super::*;
use derive_builder::Builder;

/// The batch kind byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BatchType {
    /// The batch is written to the batch log for atomicity.
    Logged = 0,
    /// The batch skips the batch log.
    Unlogged = 1,
    /// The batch groups counter updates.
    Counter = 2,
}

impl Default for BatchType {
    fn default() -> Self {
        BatchType::Logged
    }
}

impl TryFrom<u8> for BatchType {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Logged),
            1 => Ok(Self::Unlogged),
            2 => Ok(Self::Counter),
            k => Err(anyhow::anyhow!("Invalid batch type: {}", k)),
        }
    }
}

/// One sub-statement of a batch: either a raw query string or a prepared id,
/// plus its bound values.
#[derive(Clone, Debug)]
pub enum BatchQuery {
    Query { statement: String, values: Values },
    Prepared { id: Vec<u8>, values: Values },
}

/// Groups statements into a single atomic server round-trip. The body is:
///
/// `<type><n><query_1>...<query_n><consistency><flags>[<serial_consistency>][<timestamp>]`
///
/// where each `<query_i>` is a kind byte (0 raw, 1 prepared), the statement
/// or prepared id, and its values.
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned", setter(strip_option))]
pub struct BatchFrame {
    #[builder(default)]
    pub(crate) batch_type: BatchType,
    #[builder(default)]
    pub(crate) queries: Vec<BatchQuery>,
    #[builder(default)]
    pub(crate) consistency: Consistency,
    #[builder(default)]
    pub(crate) serial_consistency: Option<Consistency>,
    #[builder(default)]
    pub(crate) timestamp: Option<i64>,
}

impl BatchFrame {
    pub fn batch_type(&self) -> BatchType {
        self.batch_type
    }

    pub fn queries(&self) -> &[BatchQuery] {
        &self.queries
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    fn flags(&self) -> BatchFlags {
        let mut flags = BatchFlags::default();
        flags.set_serial_consistency(self.serial_consistency.is_some());
        flags.set_default_timestamp(self.timestamp.is_some());
        flags
    }
}

impl FromPayload for BatchFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let batch_type = read_byte(start, payload)?.try_into()?;
        let count = read_short(start, payload)? as usize;
        let mut queries = Vec::with_capacity(count);
        for _ in 0..count {
            queries.push(match read_byte(start, payload)? {
                0 => BatchQuery::Query {
                    statement: read_long_string(start, payload)?,
                    values: Values::from_payload(start, payload)?,
                },
                1 => BatchQuery::Prepared {
                    id: read_short_bytes(start, payload)?.to_vec(),
                    values: Values::from_payload(start, payload)?,
                },
                k => anyhow::bail!("Invalid batch query kind: {}", k),
            });
        }
        let consistency = Consistency::try_from(read_short(start, payload)?)?;
        let flags = BatchFlags(read_byte(start, payload)?);
        anyhow::ensure!(!flags.named_values(), "Named values are not supported");
        let serial_consistency = if flags.serial_consistency() {
            Some(Consistency::try_from(read_short(start, payload)?)?)
        } else {
            None
        };
        let timestamp = flags.default_timestamp().then(|| read_long(start, payload)).transpose()?;
        Ok(Self {
            batch_type,
            queries,
            consistency,
            serial_consistency,
            timestamp,
        })
    }
}

impl ToPayload for BatchFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        let flags = self.flags();
        write_byte(self.batch_type as u8, payload);
        write_short(self.queries.len() as u16, payload);
        for query in self.queries {
            match query {
                BatchQuery::Query { statement, values } => {
                    write_byte(0, payload);
                    write_long_string(&statement, payload);
                    values.to_payload(payload);
                }
                BatchQuery::Prepared { id, values } => {
                    write_byte(1, payload);
                    write_short_bytes(&id, payload);
                    values.to_payload(payload);
                }
            }
        }
        write_short(self.consistency as u16, payload);
        write_byte(flags.0, payload);
        if let Some(serial_consistency) = self.serial_consistency {
            write_short(serial_consistency as u16, payload);
        }
        if let Some(timestamp) = self.timestamp {
            write_long(timestamp, payload);
        }
    }
}
