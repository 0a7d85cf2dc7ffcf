//! The request handler answering queries from a record store.

use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{LowerQuery, MessageType, OpCode, ResponseCode};
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use crate::database::{RecordMappers, RecordStore, StoreError};
use crate::error::ResolveError;
use crate::response::{ResponseEnvelope, send_envelope, send_error};
use crate::rr::Record;
use crate::template::{QueryMode, QueryTemplate, QueryTemplates};
use crate::zone::ZoneMatcher;

/// Name of this handler in logs.
pub const NAME: &str = "sql";

/// Deadline for a single store call unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Answers queries for its zones from a relational database, passing everything
/// else to `next`.
///
/// A query is delegated when its name is outside every configured zone or when
/// there is no query template for its type. Queries that are ours but cannot be
/// answered get SERVFAIL.
#[derive(Debug)]
pub struct Resolver<N> {
    zones: Arc<ZoneMatcher>,
    templates: Arc<QueryTemplates>,
    mappers: Arc<RecordMappers>,
    store: Arc<dyn RecordStore>,
    mode: QueryMode,
    timeout: Duration,
    next: N,
}

impl<N> Resolver<N> {
    pub fn new(
        zones: ZoneMatcher,
        templates: QueryTemplates,
        store: Arc<dyn RecordStore>,
        next: N,
    ) -> Self {
        Self {
            zones: Arc::new(zones),
            templates: Arc::new(templates),
            mappers: Arc::new(RecordMappers::default()),
            store,
            mode: QueryMode::default(),
            timeout: DEFAULT_TIMEOUT,
            next,
        }
    }

    pub fn with_mappers(mut self, mappers: RecordMappers) -> Self {
        self.mappers = Arc::new(mappers);
        self
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &'static str {
        NAME
    }

    pub fn zones(&self) -> &ZoneMatcher {
        &self.zones
    }

    pub fn next(&self) -> &N {
        &self.next
    }

    /// Resolve a single query.
    ///
    /// Returns `None` when the query is not ours to answer.
    #[tracing::instrument(
        skip_all,
        fields(name = %query.name(), ty = %query.query_type()),
        level = "debug"
    )]
    pub async fn lookup(&self, query: &LowerQuery) -> Option<Result<Vec<Record>, ResolveError>> {
        let Some(zone) = self.zones.matches(query.name()) else {
            tracing::debug!("no matching zone");
            return None;
        };

        let record_type = query.query_type();
        let Some(template) = self.templates.get(record_type) else {
            tracing::debug!("no query for {record_type} in {zone}");
            return None;
        };

        tracing::trace!("zone {zone}");
        Some(self.execute(query, template).await)
    }

    async fn execute(
        &self,
        query: &LowerQuery,
        template: &QueryTemplate,
    ) -> Result<Vec<Record>, ResolveError> {
        let record_type = query.query_type();
        let name = query.original().name().to_ascii();
        let statement = template
            .render(&name, record_type, self.mode, self.store.placeholder())
            .map_err(|source| ResolveError::Render {
                record_type,
                source,
            })?;

        let mapper = self
            .mappers
            .get(record_type)
            .ok_or(ResolveError::UnsupportedType(record_type))?;

        tracing::trace!("execute {statement}");
        let records = tokio::time::timeout(self.timeout, self.store.execute(&statement, mapper))
            .await
            .map_err(|_| StoreError::TimedOut(self.timeout))??;

        tracing::trace!("{} records", records.len());
        Ok(records)
    }
}

#[async_trait::async_trait]
impl<N> RequestHandler for Resolver<N>
where
    N: RequestHandler,
{
    #[tracing::instrument(skip_all, fields(handler = NAME, id = request.id()), level = "debug")]
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        if request.message_type() != MessageType::Query || request.op_code() != OpCode::Query {
            tracing::debug!(
                "{} {} is not a query, delegating",
                request.message_type(),
                request.op_code()
            );
            return self.next.handle_request(request, response_handle).await;
        }

        let Ok(request_info) = request.request_info() else {
            tracing::debug!("request has no query, delegating");
            return self.next.handle_request(request, response_handle).await;
        };

        let records = match self.lookup(request_info.query).await {
            None => return self.next.handle_request(request, response_handle).await,
            Some(Ok(records)) => records,
            Some(Err(error)) => {
                tracing::error!(
                    "{NAME}: {} {}: {error}",
                    request_info.query.name(),
                    request_info.query.query_type()
                );
                return send_error(&mut response_handle, request, ResponseCode::ServFail).await;
            }
        };

        match ResponseEnvelope::assemble(request, &records) {
            Ok(envelope) => send_envelope(&mut response_handle, request, &envelope).await,
            Err(error) => {
                let error = ResolveError::from(error);
                tracing::error!("{NAME}: {error}");
                send_error(&mut response_handle, request, ResponseCode::ServFail).await
            }
        }
    }
}

/// The last link in a handler chain: answers every request with a fixed code.
#[derive(Debug, Clone, Copy)]
pub struct Unhandled {
    code: ResponseCode,
}

impl Unhandled {
    pub fn new(code: ResponseCode) -> Self {
        Self { code }
    }

    /// SERVFAIL, for a chain with nothing after it.
    pub fn server_failure() -> Self {
        Self::new(ResponseCode::ServFail)
    }

    pub fn refused() -> Self {
        Self::new(ResponseCode::Refused)
    }

    pub fn code(&self) -> ResponseCode {
        self.code
    }
}

impl Default for Unhandled {
    fn default() -> Self {
        Self::server_failure()
    }
}

#[async_trait::async_trait]
impl RequestHandler for Unhandled {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        tracing::debug!("end of handler chain");
        send_error(&mut response_handle, request, self.code).await
    }
}
