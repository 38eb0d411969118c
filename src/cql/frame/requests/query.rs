// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the QUERY frame.

use super::*;
use derive_builder::Builder;

/**
    Performs a CQL query. The body of the message is:

    `<query><query_parameters>`

    where `<query>` is a `[long string]` and `<query_parameters>` is

    `<consistency><flags>[<n><value_1>...<value_n>][<result_page_size>][<paging_state>][<serial_consistency>][<timestamp>][<keyspace>]`

    The `<flags>` byte announces which optional fields follow; it is derived
    from the populated fields at encode time rather than set by hand.

    The server responds with a RESULT message whose kind depends on the query.
*/
#[derive(Clone, Debug, Builder)]
#[builder(derive(Clone, Debug))]
#[builder(pattern = "owned", setter(strip_option))]
pub struct QueryFrame {
    /// The query statement.
    pub(crate) statement: String,
    /// The query parameters.
    #[builder(default)]
    pub(crate) parameters: QueryParameters,
}

impl QueryFrame {
    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn parameters(&self) -> &QueryParameters {
        &self.parameters
    }
}

impl FromPayload for QueryFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            statement: read_long_string(start, payload)?,
            parameters: QueryParameters::from_payload(start, payload)?,
        })
    }
}

impl ToPayload for QueryFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        payload.reserve(self.statement.len() + self.parameters.values.payload().len() + 23);
        write_long_string(&self.statement, payload);
        self.parameters.to_payload(payload);
    }
}

/// The `<query_parameters>` shared by the QUERY and EXECUTE frames.
#[derive(Clone, Debug, Default)]
pub struct QueryParameters {
    /// The consistency level.
    pub consistency: Consistency,
    /// The bound values list.
    pub values: Values,
    /// Ask the server to omit the result metadata.
    pub skip_metadata: bool,
    /// The page size.
    pub page_size: Option<i32>,
    /// The paging state resuming a previous page.
    pub paging_state: Option<Vec<u8>>,
    /// The serial consistency level for conditional updates.
    pub serial_consistency: Option<Consistency>,
    /// The default timestamp in microseconds.
    pub timestamp: Option<i64>,
    /// The keyspace override.
    pub keyspace: Option<String>,
}

impl QueryParameters {
    /// Compute the flags byte announced by the populated fields.
    pub fn flags(&self) -> QueryFlags {
        let mut flags = QueryFlags::default();
        flags.set_values(!self.values.is_empty());
        flags.set_skip_metadata(self.skip_metadata);
        flags.set_page_size(self.page_size.is_some());
        flags.set_paging_state(self.paging_state.is_some());
        flags.set_serial_consistency(self.serial_consistency.is_some());
        flags.set_default_timestamp(self.timestamp.is_some());
        flags.set_keyspace(self.keyspace.is_some());
        flags
    }
}

impl FromPayload for QueryParameters {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let consistency = Consistency::try_from(read_short(start, payload)?)?;
        let flags = QueryFlags(read_byte(start, payload)?);
        anyhow::ensure!(!flags.named_values(), "Named values are not supported");
        let values = if flags.values() {
            Values::from_payload(start, payload)?
        } else {
            Values::default()
        };
        let page_size = flags.page_size().then(|| read_int(start, payload)).transpose()?;
        let paging_state = if flags.paging_state() {
            read_bytes(start, payload)?.map(|b| b.to_vec())
        } else {
            None
        };
        let serial_consistency = if flags.serial_consistency() {
            Some(Consistency::try_from(read_short(start, payload)?)?)
        } else {
            None
        };
        let timestamp = flags.default_timestamp().then(|| read_long(start, payload)).transpose()?;
        let keyspace = if flags.keyspace() {
            Some(read_string(start, payload)?)
        } else {
            None
        };
        Ok(Self {
            consistency,
            values,
            skip_metadata: flags.skip_metadata(),
            page_size,
            paging_state,
            serial_consistency,
            timestamp,
            keyspace,
        })
    }
}

impl ToPayload for QueryParameters {
    fn to_payload(self, payload: &mut Vec<u8>) {
        let flags = self.flags();
        write_short(self.consistency as u16, payload);
        write_byte(flags.0, payload);
        if flags.values() {
            self.values.to_payload(payload);
        }
        if let Some(page_size) = self.page_size {
            write_int(page_size, payload);
        }
        if let Some(paging_state) = self.paging_state {
            write_bytes(&paging_state, payload);
        }
        if let Some(serial_consistency) = self.serial_consistency {
            write_short(serial_consistency as u16, payload);
        }
        if let Some(timestamp) = self.timestamp {
            write_long(timestamp, payload);
        }
        if let Some(keyspace) = self.keyspace {
            write_string(&keyspace, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_frame_round_trip() {
        let mut values = Values::default();
        values.push(&42i32.to_be_bytes());
        values.push_unset();
        let frame = QueryFrameBuilder::default()
            .statement("INSERT INTO t (id, v) VALUES (?, ?)".to_owned())
            .parameters(QueryParameters {
                consistency: Consistency::Quorum,
                values,
                page_size: Some(5000),
                timestamp: Some(1234567890),
                ..Default::default()
            })
            .build()
            .unwrap();
        let payload = RequestFrame::from(frame.clone()).build_payload();
        let decoded = RequestFrame::from_payload(&mut 0, &payload).unwrap();
        let decoded: QueryFrame = decoded.into_body().try_into().unwrap();
        assert_eq!(decoded.statement(), frame.statement());
        assert_eq!(decoded.parameters().consistency, Consistency::Quorum);
        assert_eq!(decoded.parameters().values.len(), 2);
        assert_eq!(decoded.parameters().page_size, Some(5000));
        assert_eq!(decoded.parameters().paging_state, None);
        assert_eq!(decoded.parameters().timestamp, Some(1234567890));
    }

    #[test]
    fn flags_follow_fields() {
        let params = QueryParameters {
            paging_state: Some(vec![1, 2, 3]),
            serial_consistency: Some(Consistency::LocalSerial),
            ..Default::default()
        };
        let flags = params.flags();
        assert!(!flags.values());
        assert!(!flags.page_size());
        assert!(flags.paging_state());
        assert!(flags.serial_consistency());
        assert!(!flags.default_timestamp());
        assert!(!flags.keyspace());
    }
}
