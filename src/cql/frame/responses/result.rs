// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the RESULT frame.

use super::*;
use crate::cql::types::{
    read_cql_type,
    write_cql_type,
    CqlType,
};
use bytes::Bytes;

/// The RESULT kind codes.
pub const VOID: i32 = 0x0001;
pub const ROWS: i32 = 0x0002;
pub const SET_KEYSPACE: i32 = 0x0003;
pub const PREPARED: i32 = 0x0004;
pub const SCHEMA_CHANGE: i32 = 0x0005;

/// The result of a QUERY, PREPARE, EXECUTE or BATCH request. The body is an
/// `[int]` kind followed by kind-specific content.
#[derive(Clone, Debug)]
pub struct ResultFrame {
    pub(crate) kind: ResultBodyKind,
}

impl ResultFrame {
    pub fn kind(&self) -> &ResultBodyKind {
        &self.kind
    }

    pub fn into_kind(self) -> ResultBodyKind {
        self.kind
    }
}

impl From<ResultBodyKind> for ResultFrame {
    fn from(kind: ResultBodyKind) -> Self {
        Self { kind }
    }
}

#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum ResultBodyKind {
    Void,
    Rows(RowsResult),
    SetKeyspace(String),
    Prepared(PreparedResult),
    SchemaChange,
}

impl FromPayload for ResultFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let kind = match read_int(start, payload)? {
            VOID => ResultBodyKind::Void,
            ROWS => ResultBodyKind::Rows(RowsResult::from_payload(start, payload)?),
            SET_KEYSPACE => ResultBodyKind::SetKeyspace(read_string(start, payload)?),
            PREPARED => ResultBodyKind::Prepared(PreparedResult::from_payload(start, payload)?),
            SCHEMA_CHANGE => ResultBodyKind::SchemaChange,
            k => anyhow::bail!("Unknown result kind: {:#x}", k),
        };
        Ok(Self { kind })
    }
}

impl ToPayload for ResultFrame {
    fn to_payload(self, payload: &mut Vec<u8>) {
        match self.kind {
            ResultBodyKind::Void => write_int(VOID, payload),
            ResultBodyKind::Rows(rows) => {
                write_int(ROWS, payload);
                rows.to_payload(payload);
            }
            ResultBodyKind::SetKeyspace(keyspace) => {
                write_int(SET_KEYSPACE, payload);
                write_string(&keyspace, payload);
            }
            ResultBodyKind::Prepared(prepared) => {
                write_int(PREPARED, payload);
                prepared.to_payload(payload);
            }
            ResultBodyKind::SchemaChange => write_int(SCHEMA_CHANGE, payload),
        }
    }
}

/// The rows metadata flags.
#[derive(Copy, Clone, Debug, Default)]
pub struct ResultFlags(pub i32);

impl ResultFlags {
    pub fn global_tables_spec(&self) -> bool {
        self.0 & 0x0001 != 0
    }

    pub fn has_more_pages(&self) -> bool {
        self.0 & 0x0002 != 0
    }

    pub fn no_metadata(&self) -> bool {
        self.0 & 0x0004 != 0
    }
}

/// One result column: originating keyspace and table, name and CQL type.
/// Keyspace and table are absent when the metadata carries a global table
/// spec instead.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub keyspace: Option<String>,
    pub table: Option<String>,
    pub name: String,
    pub cql_type: CqlType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, cql_type: CqlType) -> Self {
        Self {
            keyspace: None,
            table: None,
            name: name.into(),
            cql_type,
        }
    }
}

fn read_column_specs(
    start: &mut usize,
    payload: &[u8],
    count: usize,
    global_spec: bool,
) -> anyhow::Result<Vec<ColumnSpec>> {
    let mut specs = Vec::with_capacity(count);
    for _ in 0..count {
        let (keyspace, table) = if global_spec {
            (None, None)
        } else {
            (Some(read_string(start, payload)?), Some(read_string(start, payload)?))
        };
        specs.push(ColumnSpec {
            keyspace,
            table,
            name: read_string(start, payload)?,
            cql_type: read_cql_type(start, payload)?,
        });
    }
    Ok(specs)
}

fn write_column_specs(specs: &[ColumnSpec], global_spec: bool, payload: &mut Vec<u8>) {
    for spec in specs {
        if !global_spec {
            write_string(spec.keyspace.as_deref().unwrap_or_default(), payload);
            write_string(spec.table.as_deref().unwrap_or_default(), payload);
        }
        write_string(&spec.name, payload);
        write_cql_type(&spec.cql_type, payload);
    }
}

/// The metadata prefix of a rows result.
#[derive(Clone, Debug, Default)]
pub struct RowsMetadata {
    pub(crate) paging_state: Option<Vec<u8>>,
    pub(crate) global_table_spec: Option<(String, String)>,
    pub(crate) columns: Vec<ColumnSpec>,
    pub(crate) no_metadata: bool,
    pub(crate) columns_count: i32,
}

impl RowsMetadata {
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn columns_count(&self) -> usize {
        self.columns_count as usize
    }

    pub fn paging_state(&self) -> Option<&[u8]> {
        self.paging_state.as_deref()
    }

    fn flags(&self) -> i32 {
        let mut flags = 0;
        if self.global_table_spec.is_some() {
            flags |= 0x0001;
        }
        if self.paging_state.is_some() {
            flags |= 0x0002;
        }
        if self.no_metadata {
            flags |= 0x0004;
        }
        flags
    }
}

impl FromPayload for RowsMetadata {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let flags = ResultFlags(read_int(start, payload)?);
        let columns_count = read_int(start, payload)?;
        let paging_state = if flags.has_more_pages() {
            read_bytes(start, payload)?.map(|b| b.to_vec())
        } else {
            None
        };
        let global_table_spec = if flags.global_tables_spec() && !flags.no_metadata() {
            Some((read_string(start, payload)?, read_string(start, payload)?))
        } else {
            None
        };
        let columns = if flags.no_metadata() {
            Vec::new()
        } else {
            read_column_specs(start, payload, columns_count as usize, flags.global_tables_spec())?
        };
        Ok(Self {
            paging_state,
            global_table_spec,
            columns,
            no_metadata: flags.no_metadata(),
            columns_count,
        })
    }
}

impl ToPayload for RowsMetadata {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_int(self.flags(), payload);
        write_int(self.columns_count, payload);
        if let Some(paging_state) = &self.paging_state {
            write_bytes(paging_state, payload);
        }
        if self.no_metadata {
            return;
        }
        let global_spec = self.global_table_spec.is_some();
        if let Some((keyspace, table)) = &self.global_table_spec {
            write_string(keyspace, payload);
            write_string(table, payload);
        }
        write_column_specs(&self.columns, global_spec, payload);
    }
}

/// A rows result: metadata, row count and the raw row cells. Cells are
/// decoded lazily by the row layer.
#[derive(Clone, Debug)]
pub struct RowsResult {
    pub(crate) metadata: RowsMetadata,
    pub(crate) rows_count: i32,
    pub(crate) rows: Bytes,
}

impl RowsResult {
    /// Assemble a rows result from column specs and encoded cells. Each row
    /// must hold one `Option<Vec<u8>>` cell per column, `None` meaning null.
    pub fn new(columns: Vec<ColumnSpec>, paging_state: Option<Vec<u8>>, rows: Vec<Vec<Option<Vec<u8>>>>) -> Self {
        let mut buffer = Vec::new();
        let rows_count = rows.len() as i32;
        for row in rows {
            for cell in row {
                match cell {
                    Some(value) => write_bytes(&value, &mut buffer),
                    None => write_int(-1, &mut buffer),
                }
            }
        }
        Self {
            metadata: RowsMetadata {
                paging_state,
                global_table_spec: None,
                columns_count: columns.len() as i32,
                columns,
                no_metadata: false,
            },
            rows_count,
            rows: buffer.into(),
        }
    }

    pub fn metadata(&self) -> &RowsMetadata {
        &self.metadata
    }

    pub fn rows_count(&self) -> usize {
        self.rows_count as usize
    }

    /// The raw row cells, shared with any zero-copy decoded values.
    pub fn rows(&self) -> &Bytes {
        &self.rows
    }
}

impl FromPayload for RowsResult {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let metadata = RowsMetadata::from_payload(start, payload)?;
        let rows_count = read_int(start, payload)?;
        let rows = Bytes::copy_from_slice(&payload[*start..]);
        *start = payload.len();
        Ok(Self {
            metadata,
            rows_count,
            rows,
        })
    }
}

impl ToPayload for RowsResult {
    fn to_payload(self, payload: &mut Vec<u8>) {
        self.metadata.to_payload(payload);
        write_int(self.rows_count, payload);
        payload.extend(self.rows.as_ref());
    }
}

/// The result of a PREPARE request: the opaque id, the bound parameter
/// specs with partition key indexes, and the metadata of future result sets.
#[derive(Clone, Debug)]
pub struct PreparedResult {
    pub(crate) id: Vec<u8>,
    pub(crate) pk_indexes: Vec<u16>,
    pub(crate) params: Vec<ColumnSpec>,
    pub(crate) global_table_spec: Option<(String, String)>,
    pub(crate) result_metadata: Option<RowsMetadata>,
}

impl PreparedResult {
    pub fn new(
        id: Vec<u8>,
        pk_indexes: Vec<u16>,
        params: Vec<ColumnSpec>,
        result_metadata: Option<RowsMetadata>,
    ) -> Self {
        Self {
            id,
            pk_indexes,
            params,
            global_table_spec: None,
            result_metadata,
        }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn pk_indexes(&self) -> &[u16] {
        &self.pk_indexes
    }

    pub fn params(&self) -> &[ColumnSpec] {
        &self.params
    }

    pub fn result_metadata(&self) -> Option<&RowsMetadata> {
        self.result_metadata.as_ref()
    }
}

impl FromPayload for PreparedResult {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let id = read_short_bytes(start, payload)?.to_vec();
        let flags = ResultFlags(read_int(start, payload)?);
        let columns_count = read_int(start, payload)?;
        let pk_count = read_int(start, payload)?;
        let mut pk_indexes = Vec::with_capacity(pk_count as usize);
        for _ in 0..pk_count {
            pk_indexes.push(read_short(start, payload)?);
        }
        let global_table_spec = if flags.global_tables_spec() {
            Some((read_string(start, payload)?, read_string(start, payload)?))
        } else {
            None
        };
        let params = read_column_specs(start, payload, columns_count as usize, flags.global_tables_spec())?;
        let result_metadata = if *start < payload.len() {
            Some(RowsMetadata::from_payload(start, payload)?)
        } else {
            None
        };
        Ok(Self {
            id,
            pk_indexes,
            params,
            global_table_spec,
            result_metadata,
        })
    }
}

impl ToPayload for PreparedResult {
    fn to_payload(self, payload: &mut Vec<u8>) {
        write_short_bytes(&self.id, payload);
        let global_spec = self.global_table_spec.is_some();
        write_int(if global_spec { 0x0001 } else { 0 }, payload);
        write_int(self.params.len() as i32, payload);
        write_int(self.pk_indexes.len() as i32, payload);
        for pk in &self.pk_indexes {
            write_short(*pk, payload);
        }
        if let Some((keyspace, table)) = &self.global_table_spec {
            write_string(keyspace, payload);
            write_string(table, payload);
        }
        write_column_specs(&self.params, global_spec, payload);
        if let Some(metadata) = self.result_metadata {
            metadata.to_payload(payload);
        }
    }
}
