use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{Connection, InterruptHandle};
use url::Url;

use super::pool::{Pool, RusqliteConnectionManager, pool};
use super::{ConnectOptions, RecordMapper, RecordStore, StoreError, TlsArgs};
use crate::error::ConfigError;
use crate::rr::Record;
use crate::template::{Placeholder, Statement};

/// Record store on an SQLite database file, opened read-only.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    /// Open the database at `path`. Must be called within a Tokio runtime.
    pub fn open(path: impl AsRef<Path>, options: &ConnectOptions) -> Result<Self, ConfigError> {
        let mut manager = RusqliteConnectionManager::new(path);
        manager.set_timeout(options.acquire_timeout);
        manager.open()?;

        Ok(Self {
            pool: pool(manager, options.max_connections, options.acquire_timeout),
        })
    }

    /// Open the database named by a `sqlite:///path/to.db` URL.
    pub fn open_url(
        url: &Url,
        tls: &TlsArgs,
        options: &ConnectOptions,
    ) -> Result<Self, ConfigError> {
        if !tls.is_none() {
            return Err(ConfigError::SqliteTls);
        }

        let path_error = || ConfigError::SqlitePath(url.to_string());
        match url.host_str() {
            None | Some("") | Some("localhost") => {}
            Some(_) => return Err(path_error()),
        }
        let file = Url::parse(&format!("file://{}", url.path())).map_err(|_| path_error())?;
        let path = file.to_file_path().map_err(|()| path_error())?;

        Self::open(path, options)
    }
}

type SharedHandle = Arc<Mutex<Option<InterruptHandle>>>;

/// Interrupts the statement running on a connection when dropped, until the
/// blocking task holding the connection releases it.
struct InterruptGuard {
    handle: SharedHandle,
}

impl InterruptGuard {
    fn new(handle: InterruptHandle) -> Self {
        Self {
            handle: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Must be released before the connection goes back to the pool.
    fn release_handle(&self) -> InterruptRelease {
        InterruptRelease(self.handle.clone())
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        lock(&self.handle).is_some()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.handle).take() {
            tracing::debug!("interrupting sqlite query");
            handle.interrupt();
        }
    }
}

/// Disarms the guard when dropped.
struct InterruptRelease(SharedHandle);

impl Drop for InterruptRelease {
    fn drop(&mut self) {
        lock(&self.0).take();
    }
}

fn lock(handle: &SharedHandle) -> std::sync::MutexGuard<'_, Option<InterruptHandle>> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

fn query(
    conn: &Connection,
    sql: &str,
    binds: &[String],
    mapper: RecordMapper,
) -> Result<Vec<Record>, StoreError> {
    let mut statement = conn.prepare_cached(sql)?;
    let mut rows = statement.query(rusqlite::params_from_iter(binds))?;

    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let record = mapper
            .map_row(row)
            .map_err(|source| StoreError::RowDecode {
                row: records.len(),
                source,
            })?;
        records.push(record);
    }
    Ok(records)
}

#[async_trait::async_trait]
impl RecordStore for SqliteStore {
    fn placeholder(&self) -> Placeholder {
        Placeholder::Question
    }

    #[tracing::instrument(skip_all, fields(sql = %statement), level = "debug")]
    async fn execute(
        &self,
        statement: &Statement,
        mapper: RecordMapper,
    ) -> Result<Vec<Record>, StoreError> {
        let conn = self.pool.get_owned().await?;
        let guard = InterruptGuard::new(conn.get_interrupt_handle());
        let release = guard.release_handle();

        let sql = statement.sql().to_owned();
        let binds = statement.binds().to_vec();
        let records = tokio::task::spawn_blocking(move || {
            // Dropped before the captured connection, even on panic.
            let _release = release;
            query(&conn, &sql, &binds, mapper)
        })
        .await??;
        drop(guard);

        tracing::trace!("{} rows", records.len());
        Ok(records)
    }
}
