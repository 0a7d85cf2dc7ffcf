use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

pub(crate) type Pool = bb8::Pool<RusqliteConnectionManager>;

/// Create a new SQLite connection pool
///
/// Connections are opened lazily, the first time a query needs one.
pub(crate) fn pool(manager: RusqliteConnectionManager, max_size: u32, timeout: Duration) -> Pool {
    bb8::Pool::builder()
        .max_size(max_size)
        .connection_timeout(timeout)
        .test_on_check_out(false)
        .build_unchecked(manager)
}

/// Connection manager for SQLite databases
///
/// This manager handles the creation and lifecycle of SQLite database connections
/// for use with the bb8 connection pool. Record databases are only ever read, so
/// connections are opened read-only unless other flags are given.
#[derive(Debug, Clone)]
pub struct RusqliteConnectionManager {
    connection_options: Arc<ConnectionOptions>,
}

impl RusqliteConnectionManager {
    /// Set the busy timeout for database connections
    ///
    /// Configures how long database operations will wait when the database
    /// is locked before timing out.
    pub fn set_timeout(&mut self, timeout: Duration) {
        let config = Arc::make_mut(&mut self.connection_options);
        config.busy_timeout = timeout;
    }

    /// Create a new read-only connection manager for the specified database path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::new_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )
    }

    /// Create a new connection manager with custom SQLite flags
    pub fn new_with_flags(path: impl AsRef<Path>, flags: rusqlite::OpenFlags) -> Self {
        Self {
            connection_options: Arc::new(ConnectionOptions {
                path: path.as_ref().to_path_buf(),
                flags,
                busy_timeout: Duration::from_millis(500),
            }),
        }
    }

    /// Open a connection outside of the pool.
    pub(crate) fn open(&self) -> rusqlite::Result<rusqlite::Connection> {
        let conn = self.connection_options.open()?;
        conn.busy_timeout(self.connection_options.busy_timeout)?;
        Ok(conn)
    }
}

#[derive(Debug, Clone)]
struct ConnectionOptions {
    path: PathBuf,
    flags: rusqlite::OpenFlags,
    busy_timeout: Duration,
}

impl ConnectionOptions {
    fn open(&self) -> rusqlite::Result<rusqlite::Connection> {
        rusqlite::Connection::open_with_flags(&self.path, self.flags)
    }
}

#[async_trait::async_trait]
impl bb8::ManageConnection for RusqliteConnectionManager {
    type Connection = rusqlite::Connection;
    type Error = rusqlite::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.open()
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.query_row("SELECT 1", [], |_| Ok(()))
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
