// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests of the execution engine against an in-process node
//! speaking protocol v4 over a real TCP socket.

use cassandra_rs::{
    cql::{
        frame::{
            requests::RequestBody,
            responses::{
                error::{
                    Additional,
                    ErrorCode,
                    ErrorFrame,
                    Unprepared,
                },
                result::{
                    ColumnSpec,
                    PreparedResult,
                    ResultBodyKind,
                    ResultFrame,
                    RowsResult,
                },
                ResponseBody,
            },
        },
        types::{
            codec::encode_value,
            CqlType,
            CqlValue,
        },
    },
    prelude::*,
};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
    },
};

mod mock {
    use super::*;
    use cassandra_rs::cql::frame::{
        header::HEADER_LEN,
        requests::RequestFrame,
        responses::{
            AuthSuccessFrame,
            AuthenticateFrame,
            ReadyFrame,
            ResponseFrame,
            SupportedFrame,
        },
        FromPayload,
    };
    use maplit::hashmap;
    use std::convert::TryInto;
    use tokio::{
        io::{
            AsyncReadExt,
            AsyncWriteExt,
        },
        net::{
            TcpListener,
            TcpStream,
        },
        task::JoinHandle,
    };

    /// Serves non-protocol frames (QUERY, PREPARE, EXECUTE, BATCH).
    pub type Handler = Arc<dyn Fn(RequestBody) -> ResponseBody + Send + Sync>;

    pub struct MockNode {
        pub address: SocketAddr,
        accept_task: JoinHandle<()>,
    }

    impl MockNode {
        pub async fn start(handler: Handler) -> Self {
            Self::start_with_auth(handler, None).await
        }

        pub async fn start_with_auth(handler: Handler, auth: Option<(String, String)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap();
            let accept_task = tokio::spawn(async move {
                loop {
                    let (stream, _) = match listener.accept().await {
                        Ok(accepted) => accepted,
                        Err(_) => return,
                    };
                    let handler = handler.clone();
                    let auth = auth.clone();
                    tokio::spawn(serve(stream, handler, auth));
                }
            });
            Self {
                address,
                accept_task,
            }
        }

        /// Refuse any further connection, keeping the established ones.
        pub fn stop_accepting(&self) {
            self.accept_task.abort();
        }
    }

    async fn serve(mut stream: TcpStream, handler: Handler, auth: Option<(String, String)>) {
        loop {
            let mut header = [0u8; HEADER_LEN];
            if stream.read_exact(&mut header).await.is_err() {
                return;
            }
            let body_len = i32::from_be_bytes(header[5..9].try_into().unwrap()) as usize;
            let mut frame = vec![0u8; HEADER_LEN + body_len];
            frame[..HEADER_LEN].copy_from_slice(&header);
            if stream.read_exact(&mut frame[HEADER_LEN..]).await.is_err() {
                return;
            }
            let frame = match RequestFrame::from_payload(&mut 0, &frame) {
                Ok(frame) => frame,
                Err(_) => return,
            };
            let stream_id = frame.header().stream();
            let response = respond(frame.into_body(), &handler, &auth);
            let mut response = ResponseFrame::from(response);
            response.header_mut().set_stream(stream_id);
            if stream.write_all(&response.build_payload()).await.is_err() {
                return;
            }
        }
    }

    fn respond(body: RequestBody, handler: &Handler, auth: &Option<(String, String)>) -> ResponseBody {
        match body {
            RequestBody::Options(_) => SupportedFrame::new(hashmap! {
                "CQL_VERSION".to_owned() => vec!["3.4.5".to_owned()],
            })
            .into(),
            RequestBody::Startup(_) => match auth {
                Some(_) => {
                    AuthenticateFrame::new("org.apache.cassandra.auth.PasswordAuthenticator".to_owned()).into()
                }
                None => ReadyFrame.into(),
            },
            RequestBody::AuthResponse(response) => {
                let expected = auth.as_ref().expect("unexpected auth response");
                let mut token = vec![0u8];
                token.extend(expected.0.as_bytes());
                token.push(0);
                token.extend(expected.1.as_bytes());
                if response.token() == token {
                    AuthSuccessFrame::default().into()
                } else {
                    ErrorFrame::new(ErrorCode::AuthenticationError, "Provided username or password is incorrect")
                        .into()
                }
            }
            RequestBody::Register(_) => ReadyFrame.into(),
            other => handler(other),
        }
    }

    /// Serve the control connection's discovery queries for a single-dc,
    /// single-rack topology with one token.
    pub fn discovery(statement: &str) -> Option<ResponseBody> {
        if statement.contains("FROM system.local") {
            let columns = vec![
                ColumnSpec::new("data_center", CqlType::Text),
                ColumnSpec::new("rack", CqlType::Text),
                ColumnSpec::new("tokens", CqlType::Set(Box::new(CqlType::Text))),
            ];
            let tokens = CqlValue::Set(vec![CqlValue::Text("0".to_owned())]);
            let row = vec![
                text_cell("dc1"),
                text_cell("r1"),
                cell(&tokens, &CqlType::Set(Box::new(CqlType::Text))),
            ];
            return Some(rows_response(columns, vec![row], None));
        }
        if statement.contains("FROM system.peers") {
            let columns = vec![
                ColumnSpec::new("peer", CqlType::Inet),
                ColumnSpec::new("data_center", CqlType::Text),
                ColumnSpec::new("rack", CqlType::Text),
                ColumnSpec::new("tokens", CqlType::Set(Box::new(CqlType::Text))),
            ];
            return Some(rows_response(columns, vec![], None));
        }
        None
    }

    pub fn cell(value: &CqlValue, cql_type: &CqlType) -> Option<Vec<u8>> {
        let mut buffer = Vec::new();
        encode_value(value, cql_type, &mut buffer).unwrap();
        Some(buffer)
    }

    pub fn text_cell(text: &str) -> Option<Vec<u8>> {
        cell(&CqlValue::Text(text.to_owned()), &CqlType::Text)
    }

    pub fn int_cell(value: i32) -> Option<Vec<u8>> {
        cell(&CqlValue::Int(value), &CqlType::Int)
    }

    pub fn rows_response(
        columns: Vec<ColumnSpec>,
        rows: Vec<Vec<Option<Vec<u8>>>>,
        paging_state: Option<Vec<u8>>,
    ) -> ResponseBody {
        ResultFrame::from(ResultBodyKind::Rows(RowsResult::new(columns, paging_state, rows))).into()
    }

    pub fn void_response() -> ResponseBody {
        ResultFrame::from(ResultBodyKind::Void).into()
    }
}

use mock::MockNode;

fn session_for(nodes: &[&MockNode]) -> Session {
    let config = SessionConfigBuilder::default()
        .contact_points(
            nodes
                .iter()
                .map(|n| n.address.to_string())
                .collect::<Vec<_>>(),
        )
        .build()
        .unwrap();
    Session::new(config)
}

/// Scenario: a simple unparameterized select returns one decoded row.
#[tokio::test]
async fn simple_execute_decodes_rows() {
    let node = MockNode::start(Arc::new(|body| match body {
        RequestBody::Query(query) => {
            if let Some(response) = mock::discovery(query.statement()) {
                return response;
            }
            assert_eq!(query.statement(), "SELECT key FROM system.local");
            assert_eq!(query.parameters().consistency, Consistency::LocalOne);
            mock::rows_response(
                vec![ColumnSpec::new("key", CqlType::Text)],
                vec![vec![mock::text_cell("local")]],
                None,
            )
        }
        body => panic!("unexpected frame: {:?}", body),
    }))
    .await;

    let session = session_for(&[&node]);
    let rows = session
        .execute("SELECT key FROM system.local", &[], &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(rows.row_count(), 1);
    let row = rows.iter().next().unwrap().unwrap();
    assert_eq!(row.get("key").unwrap().as_text(), Some("local"));
}

/// Scenario: a prepared insert binds server-typed values; when the
/// coordinator answers UNPREPARED the driver re-prepares on the same host
/// and the second attempt succeeds.
#[tokio::test]
async fn prepared_insert_replays_after_unprepared() {
    const INSERT: &str = "INSERT INTO t (id, v) VALUES (?, ?)";
    let prepare_count = Arc::new(AtomicUsize::new(0));
    let execute_count = Arc::new(AtomicUsize::new(0));
    let prepares = prepare_count.clone();
    let executes = execute_count.clone();

    let node = MockNode::start(Arc::new(move |body| match body {
        RequestBody::Query(query) => mock::discovery(query.statement()).expect("unexpected query"),
        RequestBody::Prepare(prepare) => {
            assert_eq!(prepare.statement(), INSERT);
            prepares.fetch_add(1, Ordering::SeqCst);
            ResultFrame::from(ResultBodyKind::Prepared(PreparedResult::new(
                vec![0xAA, 0xBB],
                vec![0],
                vec![
                    ColumnSpec::new("id", CqlType::Uuid),
                    ColumnSpec::new("v", CqlType::Int),
                ],
                None,
            )))
            .into()
        }
        RequestBody::Execute(execute) => {
            assert_eq!(execute.id(), &[0xAA, 0xBB]);
            assert_eq!(execute.parameters().values.len(), 2);
            if executes.fetch_add(1, Ordering::SeqCst) == 0 {
                ErrorFrame::new(ErrorCode::Unprepared, "Prepared query not found")
                    .with_additional(Additional::Unprepared(Unprepared {
                        id: vec![0xAA, 0xBB],
                    }))
                    .into()
            } else {
                mock::void_response()
            }
        }
        body => panic!("unexpected frame: {:?}", body),
    }))
    .await;

    let session = session_for(&[&node]);
    let options = QueryOptions {
        prepare: true,
        ..Default::default()
    };
    let rows = session
        .execute(
            INSERT,
            &[
                ParamValue::from("f47ac10b-58cc-4372-a567-0e02b2c3d479"),
                ParamValue::from(42i32),
            ],
            &options,
        )
        .await
        .unwrap();
    assert_eq!(rows.row_count(), 0);
    // one cache prepare plus the transparent re-prepare, two executes
    assert_eq!(prepare_count.load(Ordering::SeqCst), 2);
    assert_eq!(execute_count.load(Ordering::SeqCst), 2);
}

/// Scenario: auto-paging walks a 100-row result in pages of 10, in order.
#[tokio::test]
async fn auto_paged_select_yields_every_row() {
    let node = MockNode::start(Arc::new(|body| match body {
        RequestBody::Query(query) => {
            if let Some(response) = mock::discovery(query.statement()) {
                return response;
            }
            assert_eq!(query.statement(), "SELECT v FROM t");
            let page_size = query.parameters().page_size.unwrap() as usize;
            assert_eq!(page_size, 10);
            let offset = query
                .parameters()
                .paging_state
                .as_ref()
                .map(|state| usize::from_be_bytes(state.as_slice().try_into().unwrap()))
                .unwrap_or(0);
            let end = (offset + page_size).min(100);
            let rows = (offset..end).map(|v| vec![mock::int_cell(v as i32)]).collect();
            let paging_state = (end < 100).then(|| end.to_be_bytes().to_vec());
            mock::rows_response(vec![ColumnSpec::new("v", CqlType::Int)], rows, paging_state)
        }
        body => panic!("unexpected frame: {:?}", body),
    }))
    .await;

    let session = session_for(&[&node]);
    let options = QueryOptions {
        fetch_size: 10,
        ..Default::default()
    };
    let mut stream = session.execute_iter("SELECT v FROM t", &[], &options);
    let mut seen = Vec::new();
    while let Some(row) = stream.next_row().await {
        let row = row.unwrap();
        seen.push(row.get("v").unwrap().as_int().unwrap());
    }
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
    assert_eq!(stream.fetched_rows(), 100);
}

/// Scenario: three prepared inserts grouped as one logged batch reach the
/// coordinator in a single round-trip; a following select sees the rows.
#[tokio::test]
async fn logged_batch_is_one_round_trip() {
    let batch_count = Arc::new(AtomicUsize::new(0));
    let store: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    let batches = batch_count.clone();
    let data = store.clone();

    let node = MockNode::start(Arc::new(move |body| match body {
        RequestBody::Query(query) => {
            if let Some(response) = mock::discovery(query.statement()) {
                return response;
            }
            assert_eq!(query.statement(), "SELECT v FROM t");
            let rows = data
                .lock()
                .unwrap()
                .iter()
                .map(|v| vec![mock::int_cell(*v)])
                .collect();
            mock::rows_response(vec![ColumnSpec::new("v", CqlType::Int)], rows, None)
        }
        RequestBody::Prepare(prepare) => {
            assert!(prepare.statement().starts_with("INSERT INTO t"));
            ResultFrame::from(ResultBodyKind::Prepared(PreparedResult::new(
                prepare.statement().as_bytes()[..8].to_vec(),
                vec![0],
                vec![ColumnSpec::new("v", CqlType::Int)],
                None,
            )))
            .into()
        }
        RequestBody::Batch(batch) => {
            batches.fetch_add(1, Ordering::SeqCst);
            assert_eq!(batch.batch_type(), cassandra_rs::prelude::BatchType::Logged);
            assert_eq!(batch.queries().len(), 3);
            data.lock().unwrap().extend([1, 2, 3]);
            mock::void_response()
        }
        body => panic!("unexpected frame: {:?}", body),
    }))
    .await;

    let session = session_for(&[&node]);
    let options = QueryOptions {
        prepare: true,
        ..Default::default()
    };
    let batch = Batch::logged()
        .add("INSERT INTO t (v) VALUES (?) -- a", vec![ParamValue::from(1i32)])
        .add("INSERT INTO t (v) VALUES (?) -- b", vec![ParamValue::from(2i32)])
        .add("INSERT INTO t (v) VALUES (?) -- c", vec![ParamValue::from(3i32)]);
    session.batch(&batch, &options).await.unwrap();
    assert_eq!(batch_count.load(Ordering::SeqCst), 1);

    let rows = session
        .execute("SELECT v FROM t", &[], &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(rows.row_count(), 3);
}

/// Scenario: when the first planned host stops answering connections, the
/// request completes on the second host.
#[tokio::test]
async fn transport_failure_retries_on_next_host() {
    let handler = |served: Arc<AtomicUsize>| -> mock::Handler {
        Arc::new(move |body| match body {
            RequestBody::Query(query) => {
                if let Some(response) = mock::discovery(query.statement()) {
                    return response;
                }
                served.fetch_add(1, Ordering::SeqCst);
                mock::rows_response(
                    vec![ColumnSpec::new("key", CqlType::Text)],
                    vec![vec![mock::text_cell("local")]],
                    None,
                )
            }
            body => panic!("unexpected frame: {:?}", body),
        })
    };
    let first_served = Arc::new(AtomicUsize::new(0));
    let second_served = Arc::new(AtomicUsize::new(0));
    let first = MockNode::start(handler(first_served.clone())).await;
    let second = MockNode::start(handler(second_served.clone())).await;
    // plans are ordered by address; make sure `first` really is first
    let (first, second, first_served, second_served) = if first.address < second.address {
        (first, second, first_served, second_served)
    } else {
        (second, first, second_served, first_served)
    };

    let session = session_for(&[&first, &second]);
    session.connect().await.unwrap();

    // the first host no longer accepts connections; its pool cannot open one
    first.stop_accepting();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let options = QueryOptions {
        idempotent: true,
        ..Default::default()
    };
    let rows = session
        .execute("SELECT key FROM system.local", &[], &options)
        .await
        .unwrap();
    assert_eq!(rows.row_count(), 1);
    assert_eq!(first_served.load(Ordering::SeqCst), 0);
    assert_eq!(second_served.load(Ordering::SeqCst), 1);
}

/// Scenario: bad credentials surface as per-host authentication errors
/// wrapped in NoHostAvailable.
#[tokio::test]
async fn bad_credentials_surface_as_no_host_available() {
    let node = MockNode::start_with_auth(
        Arc::new(|body| panic!("unexpected frame: {:?}", body)),
        Some(("cassandra".to_owned(), "cassandra".to_owned())),
    )
    .await;

    let config = SessionConfigBuilder::default()
        .contact_points(vec![node.address.to_string()])
        .credentials(cassandra_rs::app::connection::Credentials::new("bad", "bad"))
        .build()
        .unwrap();
    let session = Session::new(config);
    match session.connect().await {
        Err(DriverError::NoHostAvailable { errors }) => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(
                errors.values().next().unwrap(),
                DriverError::Authentication(_)
            ));
        }
        other => panic!("expected NoHostAvailable, got {:?}", other.map(|_| ())),
    }
}

/// The session survives a failed connect attempt and succeeds once a node
/// is reachable.
#[tokio::test]
async fn failed_connect_leaves_the_session_retryable() {
    let config = SessionConfigBuilder::default()
        .contact_points(vec!["127.0.0.1:1".to_owned()])
        .build()
        .unwrap();
    let session = Session::new(config);
    assert!(session.connect().await.is_err());

    let node = MockNode::start(Arc::new(|body| match body {
        RequestBody::Query(query) => mock::discovery(query.statement()).expect("unexpected query"),
        body => panic!("unexpected frame: {:?}", body),
    }))
    .await;
    let config = SessionConfigBuilder::default()
        .contact_points(vec![node.address.to_string()])
        .build()
        .unwrap();
    let session = Session::new(config);
    session.connect().await.unwrap();
    session.connect().await.unwrap();
}

/// Shutdown is terminal: subsequent requests fail fast.
#[tokio::test]
async fn shutdown_rejects_further_requests() {
    let node = MockNode::start(Arc::new(|body| match body {
        RequestBody::Query(query) => mock::discovery(query.statement()).expect("unexpected query"),
        body => panic!("unexpected frame: {:?}", body),
    }))
    .await;
    let session = session_for(&[&node]);
    session.connect().await.unwrap();
    session.shutdown().await;
    let result = session
        .execute("SELECT key FROM system.local", &[], &QueryOptions::default())
        .await;
    assert!(matches!(result, Err(DriverError::Shutdown)));
}

/// Concurrent fan-out aggregates successes and failures.
#[tokio::test]
async fn concurrent_fan_out_aggregates_results() {
    let node = MockNode::start(Arc::new(|body| match body {
        RequestBody::Query(query) => {
            if let Some(response) = mock::discovery(query.statement()) {
                return response;
            }
            if query.statement().contains("boom") {
                return ErrorFrame::new(ErrorCode::Invalid, "Unknown table boom").into();
            }
            mock::rows_response(
                vec![ColumnSpec::new("v", CqlType::Int)],
                vec![vec![mock::int_cell(7)]],
                None,
            )
        }
        body => panic!("unexpected frame: {:?}", body),
    }))
    .await;

    let session = session_for(&[&node]);
    let statements: Vec<(Statement, Vec<ParamValue>)> = (0..20)
        .map(|i| {
            let text = if i % 5 == 0 {
                "SELECT v FROM boom".to_owned()
            } else {
                "SELECT v FROM t".to_owned()
            };
            (Statement::from(text), Vec::new())
        })
        .collect();
    let outcome = session
        .execute_concurrent(
            statements,
            ExecuteConcurrentOptions {
                concurrency: 4,
                collect_results: true,
                ..Default::default()
            },
        )
        .await;
    assert_eq!(outcome.total, 20);
    assert_eq!(outcome.error_count, 4);
    assert_eq!(outcome.success_count, 16);
    let results = outcome.results.unwrap();
    assert_eq!(results.len(), 20);
    assert!(results[0].is_err());
    assert!(results[1].is_ok());
}
