use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use hickory_proto::rr::RecordType;

use super::row::{RowDecodeError, SqlRow};
use crate::rr::Record;

/// Converts one result row into one record of a fixed type.
#[derive(Clone, Copy)]
pub struct RecordMapper {
    record_type: RecordType,
    map: fn(&dyn SqlRow) -> Result<Record, RowDecodeError>,
}

impl RecordMapper {
    pub const fn new(
        record_type: RecordType,
        map: fn(&dyn SqlRow) -> Result<Record, RowDecodeError>,
    ) -> Self {
        Self { record_type, map }
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn map_row(&self, row: &dyn SqlRow) -> Result<Record, RowDecodeError> {
        (self.map)(row)
    }
}

impl fmt::Debug for RecordMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordMapper")
            .field("record_type", &self.record_type)
            .finish_non_exhaustive()
    }
}

/// `name, ttl, addr`
pub const A: RecordMapper = RecordMapper::new(RecordType::A, map_a);

/// `name, ttl, target`
pub const CNAME: RecordMapper = RecordMapper::new(RecordType::CNAME, map_cname);

fn map_a(row: &dyn SqlRow) -> Result<Record, RowDecodeError> {
    row.expect_columns(3)?;
    let name = row.name(0)?;
    let ttl = row.ttl(1)?;

    let value = row.text(2)?;
    let address = match value.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(address)) => address,
        Ok(IpAddr::V6(address)) => address
            .to_ipv4_mapped()
            .ok_or(RowDecodeError::NotIpv4 {
                index: 2,
                value: address,
            })?,
        Err(source) => {
            return Err(RowDecodeError::InvalidAddress {
                index: 2,
                value,
                source,
            });
        }
    };

    Ok(Record::a(name, ttl, address))
}

fn map_cname(row: &dyn SqlRow) -> Result<Record, RowDecodeError> {
    row.expect_columns(3)?;
    Ok(Record::cname(row.name(0)?, row.ttl(1)?, row.name(2)?))
}

/// Row mappers by record type.
///
/// The default table covers A and CNAME. AAAA has a default query but no mapper,
/// so AAAA lookups fail as unsupported.
#[derive(Debug, Clone)]
pub struct RecordMappers {
    mappers: BTreeMap<RecordType, RecordMapper>,
}

impl RecordMappers {
    pub fn empty() -> Self {
        Self {
            mappers: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, mapper: RecordMapper) -> Option<RecordMapper> {
        self.mappers.insert(mapper.record_type(), mapper)
    }

    pub fn get(&self, record_type: RecordType) -> Option<RecordMapper> {
        self.mappers.get(&record_type).copied()
    }
}

impl Default for RecordMappers {
    fn default() -> Self {
        let mut mappers = Self::empty();
        mappers.insert(A);
        mappers.insert(CNAME);
        mappers
    }
}
