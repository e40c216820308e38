//! Generic record abstraction every persisted entity implements.
//!
//! Kept deliberately small: the table name and row id are the only facts
//! every entity shares, since each entity's invariants (status adjacency,
//! cycle checks, must-have completion) differ enough that a one-size
//! query/filter abstraction would hide more than it shares.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A type persisted as a row in one of the store's tables.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// SQL table name this record lives in.
    fn table() -> &'static str;

    /// Primary key value for this instance.
    fn id(&self) -> &str;
}
