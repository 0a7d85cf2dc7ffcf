use std::io;

use camino::Utf8PathBuf;
use hickory_proto::ProtoError;
use hickory_proto::rr::RecordType;

use crate::database::StoreError;
use crate::template::RenderError;

/// Errors raised while setting up a resolver. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("a database url is required")]
    MissingUrl,

    #[error("invalid database url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported database scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("at least one zone is required")]
    NoZones,

    #[error("invalid zone {zone:?}: {source}")]
    InvalidZone {
        zone: String,
        #[source]
        source: ProtoError,
    },

    #[error("unsupported query type {0:?}, expected one of a, aaaa, cname")]
    UnsupportedType(String),

    #[error("invalid {record_type} query template: {source}")]
    Template {
        record_type: RecordType,
        #[source]
        source: RenderError,
    },

    #[error("timeout must be at least one second")]
    ZeroTimeout,

    #[error("expected at most 3 tls arguments, got {0}")]
    TlsArguments(usize),

    #[error("reading tls file {path}: {source}")]
    TlsFile {
        path: Utf8PathBuf,
        #[source]
        source: rustls_pki_types::pem::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(Utf8PathBuf),

    #[error("tls arguments are not supported for sqlite databases")]
    SqliteTls,

    #[error("sqlite url does not name a file: {0}")]
    SqlitePath(String),

    #[error("database options: {0}")]
    Database(#[from] sqlx::Error),

    #[error("opening sqlite database: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("reading {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Why a query that belongs to this resolver could not be answered.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("rendering {record_type} query: {source}")]
    Render {
        record_type: RecordType,
        #[source]
        source: RenderError,
    },

    #[error("no row mapper for record type {0}")]
    UnsupportedType(RecordType),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("encoding response: {0}")]
    Response(#[from] ProtoError),
}
