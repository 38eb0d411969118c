// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Concurrent fan-out: schedule many statements with a bounded number in
//! flight and aggregate the outcomes.

use super::{
    config::QueryOptions,
    statement::Statement,
    Session,
};
use crate::{
    app::error::DriverError,
    cql::{
        frame::rows::RowSet,
        types::ParamValue,
    },
};
use futures::{
    stream::FuturesUnordered,
    StreamExt,
};

/// Fan-out tunables.
#[derive(Clone, Debug)]
pub struct ExecuteConcurrentOptions {
    /// Requests kept in flight at once. Default 32.
    pub concurrency: usize,
    /// Keep each request's result (in input order) in the aggregate.
    /// Default false.
    pub collect_results: bool,
    /// Per-request options.
    pub query_options: QueryOptions,
}

impl Default for ExecuteConcurrentOptions {
    fn default() -> Self {
        Self {
            concurrency: 32,
            collect_results: false,
            query_options: QueryOptions::default(),
        }
    }
}

/// Aggregate outcome of a fan-out.
#[derive(Debug, Default)]
pub struct ExecuteConcurrentResult {
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Per-request results in input order, when collection was requested.
    pub results: Option<Vec<Result<RowSet, DriverError>>>,
    /// The first error encountered, for quick failure checks.
    pub first_error: Option<DriverError>,
}

pub(crate) async fn execute_concurrent(
    session: &Session,
    statements: impl IntoIterator<Item = (Statement, Vec<ParamValue>)>,
    options: ExecuteConcurrentOptions,
) -> ExecuteConcurrentResult {
    let concurrency = options.concurrency.max(1);
    let mut pending = statements.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut outcome = ExecuteConcurrentResult::default();
    let mut collected: Vec<Option<Result<RowSet, DriverError>>> = Vec::new();

    let run = |index: usize, statement: Statement, params: Vec<ParamValue>| {
        let session = session.clone();
        let query_options = options.query_options.clone();
        async move {
            let result = session.execute(statement, &params, &query_options).await;
            (index, result)
        }
    };

    for (index, (statement, params)) in pending.by_ref().take(concurrency) {
        in_flight.push(run(index, statement, params));
    }

    while let Some((index, result)) = in_flight.next().await {
        outcome.total += 1;
        match &result {
            Ok(_) => outcome.success_count += 1,
            Err(e) => {
                outcome.error_count += 1;
                if outcome.first_error.is_none() {
                    outcome.first_error = Some(e.clone());
                }
            }
        }
        if options.collect_results {
            if collected.len() <= index {
                collected.resize_with(index + 1, || None);
            }
            collected[index] = Some(result);
        }
        if let Some((index, (statement, params))) = pending.next() {
            in_flight.push(run(index, statement, params));
        }
    }

    if options.collect_results {
        outcome.results = Some(
            collected
                .into_iter()
                .map(|r| r.unwrap_or_else(|| Err(DriverError::Internal("Missing fan-out result".to_owned()))))
                .collect(),
        );
    }
    outcome
}
