// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Decoding of row pages: a [`RowSet`] wraps the raw cell buffer of a rows
//! result and decodes [`Row`]s lazily, preserving column order.

use super::responses::result::{
    ColumnSpec,
    RowsResult,
};
use crate::cql::types::{
    codec::{
        decode_value,
        DecodingError,
    },
    CqlValue,
};
use bytes::Bytes;
use std::{
    convert::TryInto,
    sync::Arc,
};

/// A page of decoded or decodable rows: column metadata, row count and the
/// raw cell buffer shared by all rows of the page.
#[derive(Clone, Debug)]
pub struct RowSet {
    columns: Arc<Vec<ColumnSpec>>,
    rows_count: usize,
    page: Bytes,
    paging_state: Option<Bytes>,
    copy_buffer: bool,
}

impl RowSet {
    /// Wrap a rows result. Server-sent metadata wins; `fallback_columns`
    /// covers results produced with skip-metadata (prepared statements carry
    /// the column specs from preparation time).
    pub fn new(
        result: RowsResult,
        fallback_columns: Option<Arc<Vec<ColumnSpec>>>,
        copy_buffer: bool,
    ) -> Result<Self, DecodingError> {
        let paging_state = result.metadata().paging_state().map(Bytes::copy_from_slice);
        let columns = if !result.metadata().columns.is_empty() || result.metadata().columns_count() == 0 {
            Arc::new(result.metadata.columns)
        } else {
            fallback_columns.ok_or_else(|| {
                DecodingError("Rows result carries no column metadata and none was supplied".to_owned())
            })?
        };
        Ok(Self {
            columns,
            rows_count: result.rows_count as usize,
            page: result.rows,
            paging_state,
            copy_buffer,
        })
    }

    /// Append the rows of a follow-up page, taking over its continuation.
    /// Both pages must share the column metadata.
    pub fn append_page(&mut self, next: RowSet) {
        let mut merged = Vec::with_capacity(self.page.len() + next.page.len());
        merged.extend_from_slice(&self.page);
        merged.extend_from_slice(&next.page);
        self.page = merged.into();
        self.rows_count += next.rows_count;
        self.paging_state = next.paging_state;
    }

    /// An empty row set, the shape of a VOID result.
    pub fn empty() -> Self {
        Self {
            columns: Arc::new(Vec::new()),
            rows_count: 0,
            page: Bytes::new(),
            paging_state: None,
            copy_buffer: true,
        }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn shared_columns(&self) -> &Arc<Vec<ColumnSpec>> {
        &self.columns
    }

    /// The number of rows in this page.
    pub fn row_count(&self) -> usize {
        self.rows_count
    }

    pub fn is_empty(&self) -> bool {
        self.rows_count == 0
    }

    /// The continuation cursor; present exactly when more rows exist.
    pub fn paging_state(&self) -> Option<&Bytes> {
        self.paging_state.as_ref()
    }

    /// Drop the continuation, for unpaged requests that ignore it.
    pub(crate) fn clear_paging_state(&mut self) {
        self.paging_state = None;
    }

    /// Iterate the rows, decoding each on demand.
    pub fn iter(&self) -> RowIter<'_> {
        RowIter {
            set: self,
            offset: 0,
            remaining: self.rows_count,
        }
    }

    /// Decode every row of the page.
    pub fn into_rows(self) -> Result<Vec<Row>, DecodingError> {
        self.iter().collect()
    }

    fn decode_row_at(&self, offset: &mut usize) -> Result<Row, DecodingError> {
        let mut values = Vec::with_capacity(self.columns.len());
        for spec in self.columns.iter() {
            let cell = self.read_cell(offset, spec)?;
            values.push(match cell {
                Some(cell) => decode_value(&cell, &spec.cql_type, self.copy_buffer)?,
                None => CqlValue::Null,
            });
        }
        Ok(Row {
            columns: self.columns.clone(),
            values,
        })
    }

    fn read_cell(&self, offset: &mut usize, spec: &ColumnSpec) -> Result<Option<Bytes>, DecodingError> {
        let page = self.page.as_ref();
        if page.len() < *offset + 4 {
            return Err(DecodingError(format!(
                "Row page too small for length of column {:?}",
                spec.name
            )));
        }
        let len = i32::from_be_bytes(page[*offset..][..4].try_into().unwrap());
        *offset += 4;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        if page.len() < *offset + len {
            return Err(DecodingError(format!(
                "Row page too small for value of column {:?}",
                spec.name
            )));
        }
        let cell = self.page.slice(*offset..*offset + len);
        *offset += len;
        Ok(Some(cell))
    }
}

/// A lazy iterator over the rows of a page.
pub struct RowIter<'a> {
    set: &'a RowSet,
    offset: usize,
    remaining: usize,
}

impl<'a> Iterator for RowIter<'a> {
    type Item = Result<Row, DecodingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let row = self.set.decode_row_at(&mut self.offset);
        if row.is_err() {
            // a malformed row poisons the rest of the page
            self.remaining = 0;
        }
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// One decoded row. Values align 1:1 with the column metadata; a null cell
/// decodes to [`CqlValue::Null`].
#[derive(Clone, Debug)]
pub struct Row {
    columns: Arc<Vec<ColumnSpec>>,
    values: Vec<CqlValue>,
}

impl Row {
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn values(&self) -> &[CqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<CqlValue> {
        self.values
    }

    /// Look up a value by column name.
    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        self.columns
            .iter()
            .position(|spec| spec.name == name)
            .map(|i| &self.values[i])
    }

    /// Look up a value by column position.
    pub fn column(&self, index: usize) -> Option<&CqlValue> {
        self.values.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::types::CqlType;

    fn sample() -> RowsResult {
        RowsResult::new(
            vec![
                ColumnSpec::new("key", CqlType::Text),
                ColumnSpec::new("v", CqlType::Int),
            ],
            None,
            vec![
                vec![Some(b"local".to_vec()), Some(42i32.to_be_bytes().to_vec())],
                vec![Some(b"peer".to_vec()), None],
            ],
        )
    }

    #[test]
    fn rows_decode_in_order() {
        let set = RowSet::new(sample(), None, true).unwrap();
        assert_eq!(set.row_count(), 2);
        let rows = set.into_rows().unwrap();
        assert_eq!(rows[0].get("key").unwrap().as_text(), Some("local"));
        assert_eq!(rows[0].get("v").unwrap().as_int(), Some(42));
        assert_eq!(rows[1].get("key").unwrap().as_text(), Some("peer"));
        assert!(rows[1].get("v").unwrap().is_null());
    }

    #[test]
    fn columns_preserve_order() {
        let set = RowSet::new(sample(), None, true).unwrap();
        let names: Vec<_> = set.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["key", "v"]);
        let row = set.iter().next().unwrap().unwrap();
        assert_eq!(row.column(0).unwrap().as_text(), Some("local"));
    }

    #[test]
    fn missing_metadata_requires_override() {
        let mut result = sample();
        result.metadata.columns.clear();
        assert!(RowSet::new(result.clone(), None, true).is_err());
        let columns = Arc::new(vec![
            ColumnSpec::new("key", CqlType::Text),
            ColumnSpec::new("v", CqlType::Int),
        ]);
        let set = RowSet::new(result, Some(columns), true).unwrap();
        assert_eq!(set.into_rows().unwrap().len(), 2);
    }

    #[test]
    fn truncated_page_fails() {
        let mut result = sample();
        result.rows = result.rows.slice(..result.rows.len() - 2);
        let set = RowSet::new(result, None, true).unwrap();
        let rows: Vec<_> = set.iter().collect();
        assert!(rows.last().unwrap().is_err());
    }
}
