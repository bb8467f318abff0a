use thiserror::Error;

use crate::types::RecordType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("zone not found: {0}")]
    ZoneNotFound(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("duplicate zone: {0}")]
    DuplicateZone(String),

    /// A decoder rejected a stored `value` column. `name` is attached by the
    /// caller once the owning record is known; decoders themselves only see
    /// the raw value and type.
    #[error("invalid {rtype} record{}: {cause}", name.as_deref().map(|n| format!(" for {n}")).unwrap_or_default())]
    InvalidRecord {
        name: Option<String>,
        rtype: RecordType,
        value: String,
        cause: String,
    },

    /// A specialization of [`Error::InvalidRecord`] whose cause is specifically
    /// an arity mismatch in the tab-separated value grammar.
    #[error("{rtype} record expects {expected} fields, got {actual}")]
    InvalidSegmentCount {
        rtype: RecordType,
        expected: usize,
        actual: usize,
    },

    #[error("record is locked: {0}")]
    RecordLocked(i64),

    #[error("cannot convert store handle to a transaction: {0}")]
    CannotConvertToTx(String),

    #[error("geoip lookup is not configured")]
    GeoipDisabled,

    #[error("client address {0} could not be located")]
    IpNotLocated(std::net::IpAddr),

    #[error("no anchors registered for service {0}")]
    NoAnchorsForService(String),

    #[error("malformed anchor value: {0}")]
    MalformedAnchor(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Attach the owning record's name to an [`Error::InvalidRecord`], for
    /// callers that decode a record they already looked up by name. A no-op
    /// on any other variant.
    pub fn with_record_name(mut self, record_name: &str) -> Self {
        if let Error::InvalidRecord { name, .. } = &mut self {
            *name = Some(record_name.to_string());
        }
        self
    }
}

// Blanket From impls for redb error types
impl From<redb::Error> for Error {
    fn from(e: redb::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<redb::StorageError> for Error {
    fn from(e: redb::StorageError) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<redb::TableError> for Error {
    fn from(e: redb::TableError) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<redb::TransactionError> for Error {
    fn from(e: redb::TransactionError) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<redb::CommitError> for Error {
    fn from(e: redb::CommitError) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(e: redb::DatabaseError) -> Self {
        Error::Database(e.to_string())
    }
}
