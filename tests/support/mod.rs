#![allow(unused)]

use std::future::poll_fn;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::task::Poll;

use futures::FutureExt as _;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable as _, BinDecoder, BinEncoder};
use hickory_proto::xfer::Protocol;
use hickory_server::{
    authority::{MessageRequest, MessageResponse, MessageResponseBuilder},
    server::{Request, RequestHandler, ResponseHandler, ResponseInfo},
};
use sqldns::database::row::BoxError;
use sqldns::database::{RecordMapper, RecordStore, SqlRow, StoreError};
use sqldns::template::{Placeholder, Statement};
use tokio::sync::Notify;

/// Registers a global default tracing subscriber when called for the first time. This is intended
/// for use in tests.
pub fn subscribe() {
    static INSTALL_TRACING_SUBSCRIBER: Once = Once::new();
    INSTALL_TRACING_SUBSCRIBER.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).unwrap();
    });
}

#[derive(Clone, Default)]
pub struct TestResponseHandler {
    message_ready: Arc<AtomicBool>,
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        let buf = Arc::new(Mutex::new(Vec::with_capacity(512)));
        let message_ready = Arc::new(AtomicBool::new(false));
        TestResponseHandler { message_ready, buf }
    }

    pub fn is_ready(&self) -> bool {
        self.message_ready.load(Ordering::Acquire)
    }

    fn into_inner(self) -> impl Future<Output = Vec<u8>> {
        poll_fn(move |_| {
            if self
                .message_ready
                .compare_exchange(true, false, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                let bytes: Vec<u8> = std::mem::take(&mut self.buf.lock().unwrap());
                Poll::Ready(bytes)
            } else {
                Poll::Pending
            }
        })
    }

    pub fn into_message(self) -> impl Future<Output = Message> {
        let bytes = self.into_inner();
        bytes.map(|b| {
            let mut decoder = BinDecoder::new(&b);
            Message::read(&mut decoder).expect("could not decode message")
        })
    }
}

#[async_trait::async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let buf = &mut self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(buf);
        let info = response
            .destructive_emit(&mut encoder)
            .expect("could not encode");
        self.message_ready.store(true, Ordering::Release);
        Ok(info)
    }
}

/// Build a standard query request. The name keeps the case it is given.
pub fn request(
    name: &str,
    record_type: RecordType,
    protocol: Protocol,
    edns: Option<u16>,
) -> Request {
    request_for(Name::from_ascii(name).unwrap(), record_type, protocol, edns)
}

pub fn request_for(
    name: Name,
    record_type: RecordType,
    protocol: Protocol,
    edns: Option<u16>,
) -> Request {
    let mut message = Message::new();
    message
        .set_id(0x5151)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, record_type));
    if let Some(payload) = edns {
        let mut edns = Edns::new();
        edns.set_max_payload(payload);
        message.set_edns(edns);
    }
    into_request(&message, protocol)
}

/// A UDP query without EDNS.
pub fn query(name: &str, record_type: RecordType) -> Request {
    request(name, record_type, Protocol::Udp, None)
}

pub fn into_request(message: &Message, protocol: Protocol) -> Request {
    let bytes = message.to_vec().unwrap();
    let request = MessageRequest::from_bytes(&bytes).unwrap();
    Request::new(request, ([127, 0, 0, 1], 5553).into(), protocol)
}

#[derive(Debug, Clone)]
pub enum MockValue {
    Text(String),
    Int(i64),
}

#[derive(Debug, Clone)]
pub struct MockRow(pub Vec<MockValue>);

impl MockRow {
    pub fn a(name: &str, ttl: i64, address: &str) -> Self {
        MockRow(vec![
            MockValue::Text(name.into()),
            MockValue::Int(ttl),
            MockValue::Text(address.into()),
        ])
    }

    pub fn cname(name: &str, ttl: i64, target: &str) -> Self {
        MockRow(vec![
            MockValue::Text(name.into()),
            MockValue::Int(ttl),
            MockValue::Text(target.into()),
        ])
    }
}

impl SqlRow for MockRow {
    fn columns(&self) -> usize {
        self.0.len()
    }

    fn decode_text(&self, index: usize) -> Result<String, BoxError> {
        match self.0.get(index) {
            Some(MockValue::Text(text)) => Ok(text.clone()),
            Some(MockValue::Int(_)) => Err("column is an integer".into()),
            None => Err(format!("no column {index}").into()),
        }
    }

    fn decode_integer(&self, index: usize) -> Result<i64, BoxError> {
        match self.0.get(index) {
            Some(MockValue::Int(value)) => Ok(*value),
            Some(MockValue::Text(_)) => Err("column is text".into()),
            None => Err(format!("no column {index}").into()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer with these rows.
    Rows(Vec<MockRow>),

    /// Fail as if the database refused the connection.
    Refused,

    /// Never answer.
    Hang,
}

/// A scripted record store which records every statement it is asked to run.
#[derive(Debug)]
pub struct MockStore {
    behavior: Behavior,
    placeholder: Placeholder,
    calls: AtomicUsize,
    statements: Mutex<Vec<Statement>>,
    started: Notify,
    cancelled: Arc<AtomicBool>,
}

impl MockStore {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            placeholder: Placeholder::Dollar,
            calls: AtomicUsize::new(0),
            statements: Mutex::new(Vec::new()),
            started: Notify::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn rows(rows: Vec<MockRow>) -> Arc<Self> {
        Self::new(Behavior::Rows(rows))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    /// Resolves once a call has reached the store.
    pub async fn started(&self) {
        self.started.notified().await
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct CancelGuard(Arc<AtomicBool>);

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl RecordStore for MockStore {
    fn placeholder(&self) -> Placeholder {
        self.placeholder
    }

    async fn execute(
        &self,
        statement: &Statement,
        mapper: RecordMapper,
    ) -> Result<Vec<sqldns::rr::Record>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.statements.lock().unwrap().push(statement.clone());
        self.started.notify_one();

        match &self.behavior {
            Behavior::Rows(rows) => rows
                .iter()
                .enumerate()
                .map(|(row, values)| {
                    mapper
                        .map_row(values)
                        .map_err(|source| StoreError::RowDecode { row, source })
                })
                .collect(),
            Behavior::Refused => Err(StoreError::Database(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))),
            Behavior::Hang => {
                let _guard = CancelGuard(self.cancelled.clone());
                std::future::pending().await
            }
        }
    }
}

/// A next handler which records what it was given and answers NXDOMAIN.
#[derive(Debug, Clone, Default)]
pub struct RecordingNext {
    seen: Arc<Mutex<Vec<(u16, Vec<Query>)>>>,
}

impl RecordingNext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request ids and queries of every delegated request.
    pub fn seen(&self) -> Vec<(u16, Vec<Query>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RequestHandler for RecordingNext {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let queries = request
            .queries()
            .iter()
            .map(|q| q.original().clone())
            .collect();
        self.seen.lock().unwrap().push((request.id(), queries));

        let response = MessageResponseBuilder::from_message_request(request);
        response_handle
            .send_response(response.error_msg(request.header(), ResponseCode::NXDomain))
            .await
            .expect("send response")
    }
}
