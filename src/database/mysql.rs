use std::str::FromStr as _;

use camino::{Utf8Path, Utf8PathBuf};
use futures::TryStreamExt as _;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use url::Url;

use super::{ConnectOptions, RecordMapper, RecordStore, StoreError, TlsArgs};
use crate::error::ConfigError;
use crate::rr::Record;
use crate::template::{Placeholder, Statement};

/// TLS settings for one MySQL store.
///
/// Given any TLS arguments the server certificate and hostname are verified,
/// unless the URL already chooses an `ssl-mode`.
#[derive(Debug, Clone, Default)]
pub struct MySqlTls {
    mode: Option<MySqlSslMode>,
    ca: Option<Utf8PathBuf>,
    cert: Option<Utf8PathBuf>,
    key: Option<Utf8PathBuf>,
}

impl MySqlTls {
    pub fn from_args(url: &Url, tls: &TlsArgs) -> Self {
        if tls.is_none() {
            return Self::default();
        }

        let has_mode = url
            .query_pairs()
            .any(|(key, _)| key == "ssl-mode" || key == "sslmode");
        let (cert, key) = match tls.client() {
            Some((cert, key)) => (Some(cert.to_owned()), Some(key.to_owned())),
            None => (None, None),
        };

        Self {
            mode: (!has_mode).then_some(MySqlSslMode::VerifyIdentity),
            ca: tls.ca().map(ToOwned::to_owned),
            cert,
            key,
        }
    }

    pub fn mode(&self) -> Option<MySqlSslMode> {
        self.mode
    }

    pub fn ca(&self) -> Option<&Utf8Path> {
        self.ca.as_deref()
    }

    pub fn client(&self) -> Option<(&Utf8Path, &Utf8Path)> {
        self.cert.as_deref().zip(self.key.as_deref())
    }

    pub fn apply(&self, mut options: MySqlConnectOptions) -> MySqlConnectOptions {
        if let Some(mode) = self.mode {
            options = options.ssl_mode(mode);
        }
        if let Some(ca) = &self.ca {
            options = options.ssl_ca(ca);
        }
        if let Some((cert, key)) = self.client() {
            options = options.ssl_client_cert(cert).ssl_client_key(key);
        }
        options
    }
}

/// Record store on a MySQL connection pool.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Build the pool without connecting. Must be called within a Tokio runtime.
    pub fn connect_lazy(
        url: &Url,
        tls: &TlsArgs,
        options: &ConnectOptions,
    ) -> Result<Self, ConfigError> {
        let connect = MySqlConnectOptions::from_str(url.as_str())?;
        let connect = MySqlTls::from_args(url, tls).apply(connect);
        let pool = MySqlPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_lazy_with(connect);
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl RecordStore for MySqlStore {
    fn placeholder(&self) -> Placeholder {
        Placeholder::Question
    }

    #[tracing::instrument(skip_all, fields(sql = %statement), level = "debug")]
    async fn execute(
        &self,
        statement: &Statement,
        mapper: RecordMapper,
    ) -> Result<Vec<Record>, StoreError> {
        let mut query = sqlx::query(statement.sql()).persistent(statement.is_parameterized());
        for value in statement.binds() {
            query = query.bind(value.as_str());
        }

        let mut rows = query.fetch(&self.pool);
        let mut records = Vec::new();
        while let Some(row) = rows.try_next().await? {
            let record = mapper
                .map_row(&row)
                .map_err(|source| StoreError::RowDecode {
                    row: records.len(),
                    source,
                })?;
            records.push(record);
        }

        tracing::trace!("{} rows", records.len());
        Ok(records)
    }
}
