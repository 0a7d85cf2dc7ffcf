use std::fmt;
use std::net::Ipv4Addr;

use hickory_proto::rr::{RData, RecordType, rdata};

use super::{AsHickory, Name, TimeToLive};

/// A DNS resource record built from a single database row.
///
/// Only the record types which have a row mapper are represented. Every variant
/// carries the owner name and TTL alongside its payload, so a record is always
/// complete once it exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Record {
    /// An IPv4 host address.
    A {
        name: Name,
        ttl: TimeToLive,
        address: Ipv4Addr,
    },

    /// A canonical name alias.
    Cname {
        name: Name,
        ttl: TimeToLive,
        target: Name,
    },
}

impl Record {
    pub fn a(name: Name, ttl: impl Into<TimeToLive>, address: Ipv4Addr) -> Self {
        Record::A {
            name,
            ttl: ttl.into(),
            address,
        }
    }

    pub fn cname(name: Name, ttl: impl Into<TimeToLive>, target: Name) -> Self {
        Record::Cname {
            name,
            ttl: ttl.into(),
            target,
        }
    }

    /// Owner name of the record.
    pub fn name(&self) -> &Name {
        match self {
            Record::A { name, .. } | Record::Cname { name, .. } => name,
        }
    }

    pub fn ttl(&self) -> TimeToLive {
        match self {
            Record::A { ttl, .. } | Record::Cname { ttl, .. } => *ttl,
        }
    }

    /// Lower the TTL to `ttl` if it is shorter than the current one.
    pub fn clamp_ttl(&mut self, ttl: TimeToLive) {
        match self {
            Record::A { ttl: current, .. } | Record::Cname { ttl: current, .. } => {
                *current = (*current).min(ttl);
            }
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            Record::A { .. } => RecordType::A,
            Record::Cname { .. } => RecordType::CNAME,
        }
    }

    /// The type specific payload as hickory record data.
    pub fn rdata(&self) -> RData {
        match self {
            Record::A { address, .. } => RData::A(rdata::A(*address)),
            Record::Cname { target, .. } => RData::CNAME(rdata::CNAME(target.clone())),
        }
    }

    /// Two records are duplicates when owner, type and payload agree. The TTL is ignored.
    ///
    /// Name comparison is case-insensitive.
    pub fn is_duplicate_of(&self, other: &Record) -> bool {
        match (self, other) {
            (
                Record::A { name, address, .. },
                Record::A {
                    name: other_name,
                    address: other_address,
                    ..
                },
            ) => name == other_name && address == other_address,
            (
                Record::Cname { name, target, .. },
                Record::Cname {
                    name: other_name,
                    target: other_target,
                    ..
                },
            ) => name == other_name && target == other_target,
            _ => false,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{name} {ttl} IN {ty} {rdata}",
            name = self.name(),
            ttl = self.ttl(),
            ty = self.record_type(),
            rdata = self.rdata()
        )
    }
}

impl AsHickory for Record {
    type Hickory = hickory_proto::rr::Record;

    fn as_hickory(&self) -> Self::Hickory {
        hickory_proto::rr::Record::from_rdata(self.name().clone(), self.ttl().into(), self.rdata())
    }
}
