//! Relational record stores.
//!
//! A [`RecordStore`] executes one rendered [`Statement`] and maps every returned
//! row into a [`Record`] with a [`RecordMapper`]. Drivers are chosen by the scheme
//! of the connection URL.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use url::Url;

use crate::error::ConfigError;
use crate::rr::Record;
use crate::template::{Placeholder, Statement};

pub mod mapper;
pub mod mysql;
mod pool;
pub mod postgres;
pub mod row;
pub mod sqlite;
pub mod tls;

pub use self::mapper::{RecordMapper, RecordMappers};
pub use self::mysql::{MySqlStore, MySqlTls};
pub use self::postgres::PostgresStore;
pub use self::row::{RowDecodeError, SqlRow};
pub use self::sqlite::SqliteStore;
pub use self::tls::TlsArgs;

/// Errors raised while executing a statement.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("timed out waiting for a database connection")]
    PoolTimedOut,

    #[error("query did not complete within {0:?}")]
    TimedOut(Duration),

    #[error("row {row}: {source}")]
    RowDecode {
        row: usize,
        #[source]
        source: RowDecodeError,
    },

    #[error("database task failed: {0}")]
    Panic(#[from] JoinError),
}

impl From<bb8::RunError<rusqlite::Error>> for StoreError {
    fn from(error: bb8::RunError<rusqlite::Error>) -> Self {
        match error {
            bb8::RunError::User(error) => StoreError::Sqlite(error),
            bb8::RunError::TimedOut => StoreError::PoolTimedOut,
        }
    }
}

/// A relational backend that answers rendered statements with records.
#[async_trait::async_trait]
pub trait RecordStore: fmt::Debug + Send + Sync {
    /// The positional marker style this backend expects in bound statements.
    fn placeholder(&self) -> Placeholder;

    /// Execute `statement`, mapping each row in the order the database returns them.
    ///
    /// Zero rows is an empty result. Any row that fails to map fails the whole call.
    async fn execute(
        &self,
        statement: &Statement,
        mapper: RecordMapper,
    ) -> Result<Vec<Record>, StoreError>;
}

/// Database drivers, keyed by URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    MySql,
    Sqlite,
}

impl Backend {
    pub fn from_url(url: &Url) -> Result<Self, ConfigError> {
        match url.scheme() {
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            "mysql" => Ok(Backend::MySql),
            "sqlite" => Ok(Backend::Sqlite),
            other => Err(ConfigError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Pool settings shared by all drivers.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Build the store for a connection URL.
///
/// TLS files are checked before any network driver is built. Network drivers
/// connect lazily, so this performs no network I/O, but it must be called from
/// within a Tokio runtime.
pub fn connect(
    url: &Url,
    tls: &TlsArgs,
    options: &ConnectOptions,
) -> Result<Arc<dyn RecordStore>, ConfigError> {
    let backend = Backend::from_url(url)?;
    if backend != Backend::Sqlite {
        tls.validate()?;
    }

    tracing::debug!(?backend, host = url.host_str(), "connecting record store");
    let store: Arc<dyn RecordStore> = match backend {
        Backend::Postgres => Arc::new(PostgresStore::connect_lazy(url, tls, options)?),
        Backend::MySql => Arc::new(MySqlStore::connect_lazy(url, tls, options)?),
        Backend::Sqlite => Arc::new(SqliteStore::open_url(url, tls, options)?),
    };
    Ok(store)
}
