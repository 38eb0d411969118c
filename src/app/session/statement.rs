// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Statement shapes accepted by the execution engine.

use crate::cql::frame::responses::result::{
    ColumnSpec,
    PreparedResult,
};
use std::sync::Arc;

/// A server-side compiled statement: the opaque id, the bound parameter
/// specs and the result metadata captured at preparation time. Entries are
/// shared between concurrent callers and never mutated.
#[derive(Clone, Debug)]
pub struct PreparedStatement {
    id: Vec<u8>,
    statement: String,
    params: Arc<Vec<ColumnSpec>>,
    pk_indexes: Vec<u16>,
    result_columns: Arc<Vec<ColumnSpec>>,
}

impl PreparedStatement {
    pub(crate) fn from_result(statement: String, result: PreparedResult) -> Self {
        let result_columns = result
            .result_metadata()
            .map(|m| m.columns().to_vec())
            .unwrap_or_default();
        Self {
            id: result.id().to_vec(),
            statement,
            pk_indexes: result.pk_indexes().to_vec(),
            params: Arc::new(result.params().to_vec()),
            result_columns: Arc::new(result_columns),
        }
    }

    /// The opaque server-issued id.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// The statement text this entry was prepared from.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// The server-issued bound parameter specs, in marker order.
    pub fn params(&self) -> &Arc<Vec<ColumnSpec>> {
        &self.params
    }

    /// Positions of the partition-key columns among the bound parameters.
    pub fn pk_indexes(&self) -> &[u16] {
        &self.pk_indexes
    }

    /// The result column metadata captured at preparation time.
    pub fn result_columns(&self) -> &Arc<Vec<ColumnSpec>> {
        &self.result_columns
    }
}

/// A statement handed to the engine: raw query text or a prepared handle.
#[derive(Clone, Debug)]
pub enum Statement {
    Simple(String),
    Prepared(Arc<PreparedStatement>),
}

impl Statement {
    pub fn query_text(&self) -> &str {
        match self {
            Statement::Simple(text) => text,
            Statement::Prepared(prepared) => prepared.statement(),
        }
    }
}

impl From<&str> for Statement {
    fn from(text: &str) -> Self {
        Statement::Simple(text.to_owned())
    }
}

impl From<String> for Statement {
    fn from(text: String) -> Self {
        Statement::Simple(text)
    }
}

impl From<Arc<PreparedStatement>> for Statement {
    fn from(prepared: Arc<PreparedStatement>) -> Self {
        Statement::Prepared(prepared)
    }
}

/// The kind byte of a batch.
pub use crate::cql::frame::requests::BatchType;

/// One sub-statement of a batch.
#[derive(Clone, Debug)]
pub enum BatchStatement {
    Simple(String),
    Prepared(Arc<PreparedStatement>),
}

impl From<&str> for BatchStatement {
    fn from(text: &str) -> Self {
        BatchStatement::Simple(text.to_owned())
    }
}

impl From<Arc<PreparedStatement>> for BatchStatement {
    fn from(prepared: Arc<PreparedStatement>) -> Self {
        BatchStatement::Prepared(prepared)
    }
}

/// An ordered group of statements executed atomically by one coordinator.
#[derive(Clone, Debug)]
pub struct Batch {
    kind: BatchType,
    statements: Vec<(BatchStatement, Vec<crate::cql::types::ParamValue>)>,
}

impl Batch {
    pub fn logged() -> Self {
        Self::new(BatchType::Logged)
    }

    pub fn unlogged() -> Self {
        Self::new(BatchType::Unlogged)
    }

    pub fn counter() -> Self {
        Self::new(BatchType::Counter)
    }

    pub fn new(kind: BatchType) -> Self {
        Self {
            kind,
            statements: Vec::new(),
        }
    }

    /// Append a sub-statement with its bound values.
    pub fn add(
        mut self,
        statement: impl Into<BatchStatement>,
        values: Vec<crate::cql::types::ParamValue>,
    ) -> Self {
        self.statements.push((statement.into(), values));
        self
    }

    pub fn kind(&self) -> BatchType {
        self.kind
    }

    pub fn statements(&self) -> &[(BatchStatement, Vec<crate::cql::types::ParamValue>)] {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
