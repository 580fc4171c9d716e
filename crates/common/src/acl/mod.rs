//! Principal and resource registries
//!
//! This module defines the authorization model:
//!
//! - **[`PrincipalRecord`]**: a named identity with an authentication
//!   algorithm tag and an opaque credential
//! - **[`ResourceRecord`]**: a named, typed, addressable data object carrying
//!   four ordered access lists (readers, writers, deleters, owners)
//! - **[`PrincipalTable`] / [`ResourceTable`]**: bounded, name-keyed
//!   registries with list-form and file persistence
//! - **[`Store`]**: the process-wide value owning both tables behind their
//!   own mutexes, threaded into each connection's guard
//! - **[`AuditLog`]**: bounded log of guard decisions
//!
//! # Persistence
//!
//! Tables serialize through an intermediate list form ([`PrincipalList`],
//! [`ResourceList`]) which serializes to a single binary blob. Loading a
//! list resets the table and re-inserts every record. The list form carries
//! a format version so the layout can evolve.

mod audit;
mod principal;
mod resource;
mod store;

pub use audit::{AuditLog, AuditRecord};
pub use principal::{PrincipalList, PrincipalRecord, PrincipalTable};
pub use resource::{Action, ResourceList, ResourceRecord, ResourceTable, Right};
pub use store::Store;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Default capacity of the principal and resource tables
pub const DEFAULT_TABLE_CAPACITY: usize = 250;

/// Version tag written into persisted list blobs
pub const LIST_FORMAT_VERSION: u32 = 1;

/// Errors from table operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("entry already present: {0}")]
    Duplicate(String),

    #[error("table full at capacity {0}")]
    Capacity(usize),

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Errors from persisting tables to disk
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("unsupported list format version {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl From<bincode::Error> for PersistError {
    fn from(e: bincode::Error) -> Self {
        PersistError::Codec(e.to_string())
    }
}

/// Current time as an RFC 3339 string, the format used for resource
/// timestamps.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("rfc3339 formatting of the current time")
}
