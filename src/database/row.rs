use std::net::{AddrParseError, Ipv6Addr};

use hickory_proto::ProtoError;

use crate::rr::{Name, TimeToLive};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A row could not be turned into a record.
#[derive(Debug, thiserror::Error)]
pub enum RowDecodeError {
    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("column {index}: {source}")]
    Column {
        index: usize,
        #[source]
        source: BoxError,
    },

    #[error("column {index}: ttl {value} is out of range")]
    TtlOutOfRange { index: usize, value: i64 },

    #[error("column {index}: invalid address {value:?}: {source}")]
    InvalidAddress {
        index: usize,
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("column {index}: {value} is not an IPv4 address")]
    NotIpv4 { index: usize, value: Ipv6Addr },

    #[error("column {index}: empty name")]
    EmptyName { index: usize },

    #[error("column {index}: invalid name {value:?}: {source}")]
    InvalidName {
        index: usize,
        value: String,
        #[source]
        source: ProtoError,
    },
}

/// Positional access to a result row, independent of the database driver.
///
/// Drivers implement the raw decoders; record mappers use the typed helpers.
pub trait SqlRow {
    fn columns(&self) -> usize;

    fn decode_text(&self, index: usize) -> Result<String, BoxError>;

    fn decode_integer(&self, index: usize) -> Result<i64, BoxError>;

    fn expect_columns(&self, expected: usize) -> Result<(), RowDecodeError> {
        let found = self.columns();
        if found == expected {
            Ok(())
        } else {
            Err(RowDecodeError::ColumnCount { expected, found })
        }
    }

    fn text(&self, index: usize) -> Result<String, RowDecodeError> {
        self.decode_text(index)
            .map_err(|source| RowDecodeError::Column { index, source })
    }

    /// A domain name column. Names without a trailing dot are made fully qualified.
    fn name(&self, index: usize) -> Result<Name, RowDecodeError> {
        let mut value = self.text(index)?;
        if value.is_empty() {
            return Err(RowDecodeError::EmptyName { index });
        }
        if !value.ends_with('.') {
            value.push('.');
        }
        Name::from_utf8(&value).map_err(|source| RowDecodeError::InvalidName {
            index,
            value,
            source,
        })
    }

    fn ttl(&self, index: usize) -> Result<TimeToLive, RowDecodeError> {
        let value = self
            .decode_integer(index)
            .map_err(|source| RowDecodeError::Column { index, source })?;
        TimeToLive::try_from(value).map_err(|_| RowDecodeError::TtlOutOfRange { index, value })
    }
}

mod pg {
    use sqlx::postgres::PgRow;
    use sqlx::types::ipnetwork::IpNetwork;
    use sqlx::{Column as _, Row as _, TypeInfo as _};

    use super::{BoxError, SqlRow};

    /// Text of an `inet` value, which must name a single host.
    pub(super) fn host_address(network: IpNetwork) -> Result<String, BoxError> {
        let host = if network.is_ipv4() { 32 } else { 128 };
        if network.prefix() != host {
            return Err(format!("{network} is a network, not a host address").into());
        }
        Ok(network.ip().to_string())
    }

    impl SqlRow for PgRow {
        fn columns(&self) -> usize {
            self.len()
        }

        fn decode_text(&self, index: usize) -> Result<String, BoxError> {
            let column = self.try_column(index)?;
            match column.type_info().name() {
                "INET" | "CIDR" => host_address(self.try_get::<IpNetwork, _>(index)?),
                _ => Ok(self.try_get::<String, _>(index)?),
            }
        }

        fn decode_integer(&self, index: usize) -> Result<i64, BoxError> {
            let column = self.try_column(index)?;
            let value = match column.type_info().name() {
                "INT2" => self.try_get::<i16, _>(index)?.into(),
                "INT4" => self.try_get::<i32, _>(index)?.into(),
                _ => self.try_get::<i64, _>(index)?,
            };
            Ok(value)
        }
    }
}

mod mysql {
    use sqlx::mysql::MySqlRow;
    use sqlx::{Column as _, Row as _, TypeInfo as _};

    use super::{BoxError, SqlRow};

    impl SqlRow for MySqlRow {
        fn columns(&self) -> usize {
            self.len()
        }

        fn decode_text(&self, index: usize) -> Result<String, BoxError> {
            match self.try_get::<String, _>(index) {
                Ok(value) => Ok(value),
                // Binary collations come back as VARBINARY.
                Err(sqlx::Error::ColumnDecode { .. }) => {
                    let bytes = self.try_get::<Vec<u8>, _>(index)?;
                    Ok(String::from_utf8(bytes)?)
                }
                Err(error) => Err(error.into()),
            }
        }

        fn decode_integer(&self, index: usize) -> Result<i64, BoxError> {
            let column = self.try_column(index)?;
            if column.type_info().name().ends_with("UNSIGNED") {
                let value = self.try_get::<u64, _>(index)?;
                Ok(i64::try_from(value)?)
            } else {
                Ok(self.try_get::<i64, _>(index)?)
            }
        }
    }
}

mod sqlite {
    use super::{BoxError, SqlRow};

    impl SqlRow for rusqlite::Row<'_> {
        fn columns(&self) -> usize {
            self.as_ref().column_count()
        }

        fn decode_text(&self, index: usize) -> Result<String, BoxError> {
            Ok(self.get::<_, String>(index)?)
        }

        fn decode_integer(&self, index: usize) -> Result<i64, BoxError> {
            Ok(self.get::<_, i64>(index)?)
        }
    }
}
