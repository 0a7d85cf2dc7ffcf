//! Resource Record Definitions for DNS

mod record;
mod ttl;

pub use self::record::Record;
pub use self::ttl::TimeToLive;

/// DNS Name with case preserved.
///
pub use hickory_proto::rr::Name;

/// DNS Name converted to the canonical lowercase form.
///
pub use hickory_proto::rr::LowerName;

pub use hickory_proto::rr::RecordType;

/// Trait for converting sqldns types to their hickory-dns equivalents
///
/// This trait provides a consistent interface for converting internal types
/// to their hickory-dns counterparts, so that records read from the database
/// can be handed to the hickory response machinery.
pub trait AsHickory {
    /// The corresponding hickory-dns type
    type Hickory;

    /// Convert this type to its hickory-dns equivalent
    fn as_hickory(&self) -> Self::Hickory;
}
