//! A DNS request handler that answers queries from a relational database.
//!
//! The [`Resolver`] sits in a `hickory-server` handler chain. For query names inside
//! its zones it renders a per record type SQL query, runs it against PostgreSQL,
//! MySQL or SQLite and turns the returned rows into records. Anything else is
//! passed to the next handler.

pub mod config;
pub mod database;
pub mod error;
pub mod resolver;
pub mod response;
pub mod rr;
pub mod template;
pub mod zone;

pub use self::config::ResolverConfig;
pub use self::database::{RecordStore, StoreError};
pub use self::error::{ConfigError, ResolveError};
pub use self::resolver::{Resolver, Unhandled};
pub use self::template::{QueryMode, QueryTemplate, QueryTemplates};
pub use self::zone::ZoneMatcher;
