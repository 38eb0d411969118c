// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Auto-paged row streaming. A background worker fetches pages serially and
//! hands them over a capacity-1 channel: a paused consumer therefore delays
//! the next page fetch, and dropping the stream stops the worker after the
//! in-flight page completes.

use super::{
    config::QueryOptions,
    statement::Statement,
    Session,
};
use crate::{
    app::error::DriverError,
    cql::{
        frame::rows::Row,
        types::ParamValue,
    },
};
use futures::Stream;
use std::{
    collections::VecDeque,
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};
use tokio::sync::mpsc;

/// An asynchronous sequence of rows spanning page boundaries in server
/// order.
pub struct RowStream {
    rows: VecDeque<Row>,
    pages: mpsc::Receiver<Result<crate::cql::frame::rows::RowSet, DriverError>>,
    done: bool,
    fetched_rows: usize,
}

impl RowStream {
    pub(crate) fn spawn(
        session: Session,
        statement: Statement,
        params: Vec<ParamValue>,
        options: QueryOptions,
    ) -> Self {
        let (tx, pages) = mpsc::channel(1);
        tokio::spawn(async move {
            let mut page_state = options.page_state.clone();
            loop {
                let result = session
                    .execute_page(&statement, &params, &options, page_state.clone())
                    .await;
                match result {
                    Ok(set) => {
                        page_state = set.paging_state().map(|b| b.to_vec());
                        let last = page_state.is_none();
                        // blocks while the consumer is paused
                        if tx.send(Ok(set)).await.is_err() {
                            return;
                        }
                        if last {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });
        Self {
            rows: VecDeque::new(),
            pages,
            done: false,
            fetched_rows: 0,
        }
    }

    /// The next row, or `None` at end of stream.
    pub async fn next_row(&mut self) -> Option<Result<Row, DriverError>> {
        futures::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    /// Rows seen so far, across all fetched pages.
    pub fn fetched_rows(&self) -> usize {
        self.fetched_rows
    }
}

impl Stream for RowStream {
    type Item = Result<Row, DriverError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(row) = self.rows.pop_front() {
                self.fetched_rows += 1;
                return Poll::Ready(Some(Ok(row)));
            }
            if self.done {
                return Poll::Ready(None);
            }
            match self.pages.poll_recv(cx) {
                Poll::Ready(Some(Ok(set))) => match set.into_rows() {
                    Ok(rows) => {
                        self.rows.extend(rows);
                    }
                    Err(e) => {
                        self.done = true;
                        return Poll::Ready(Some(Err(e.into())));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
