pub mod config;
pub mod db;
pub mod error;
pub mod names;
pub mod types;

pub use config::Config;
pub use db::{RecordStore, RedbStore};
pub use error::{Error, Result};
pub use types::{Anchor, Record, RecordData, RecordType, Service, SoaFields, Zone};
