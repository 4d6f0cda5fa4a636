//! Typed key-value store abstraction consumed by the depot core.
//!
//! The depot never talks to a concrete storage engine directly; every
//! persistent read/write goes through the [`KvStore`] trait. This keeps the
//! backing engine (an embedded KV database in production, an in-memory map
//! in tests) an external collaborator behind a narrow interface.

pub mod memory;

use crate::errors::Result;

/// The named column families the depot core persists records under.
///
/// Secondary indices live under a reserved key inside the owning family
/// (e.g. `__history__index__`) rather than a separate family, so that the
/// index and the primary record it covers are always written in the same
/// atomic batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    Users,
    Tokens,
    Artifacts,
    Versions,
    Changes,
    SavePoints,
    Histories,
    HistoryVersions,
    Projects,
    Workspaces,
}

impl ColumnFamily {
    pub const ALL: [ColumnFamily; 10] = [
        ColumnFamily::Users,
        ColumnFamily::Tokens,
        ColumnFamily::Artifacts,
        ColumnFamily::Versions,
        ColumnFamily::Changes,
        ColumnFamily::SavePoints,
        ColumnFamily::Histories,
        ColumnFamily::HistoryVersions,
        ColumnFamily::Projects,
        ColumnFamily::Workspaces,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            ColumnFamily::Users => "users",
            ColumnFamily::Tokens => "tokens",
            ColumnFamily::Artifacts => "artifacts",
            ColumnFamily::Versions => "versions",
            ColumnFamily::Changes => "changes",
            ColumnFamily::SavePoints => "savePoints",
            ColumnFamily::Histories => "histories",
            ColumnFamily::HistoryVersions => "historyVersions",
            ColumnFamily::Projects => "projects",
            ColumnFamily::Workspaces => "workspaces",
        }
    }
}

/// A single write within an atomic [`WriteBatch`].
pub enum WriteOp {
    Put { cf: ColumnFamily, key: String, value: Vec<u8> },
    Delete { cf: ColumnFamily, key: String },
}

/// A set of writes that must be applied atomically: either every op lands,
/// or none does. Built incrementally with [`WriteBatch::put`]/[`WriteBatch::delete`]
/// and submitted via [`KvStore::write_batch`].
#[derive(Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_json<T: serde::Serialize>(&mut self, cf: ColumnFamily, key: impl Into<String>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.ops.push(WriteOp::Put { cf, key: key.into(), value: bytes });
        Ok(())
    }

    pub fn put_bytes(&mut self, cf: ColumnFamily, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put { cf, key: key.into(), value });
    }

    pub fn delete(&mut self, cf: ColumnFamily, key: impl Into<String>) {
        self.ops.push(WriteOp::Delete { cf, key: key.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

/// Narrow contract the depot core requires of its backing store.
///
/// Implementations must make `write_batch` atomic: on failure, none of the
/// batch's operations are visible to subsequent reads.
pub trait KvStore: Send + Sync {
    fn get(&self, cf: ColumnFamily, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, cf: ColumnFamily, key: &str, value: Vec<u8>) -> Result<()>;
    fn delete(&self, cf: ColumnFamily, key: &str) -> Result<()>;
    fn iterate(&self, cf: ColumnFamily) -> Result<Vec<(String, Vec<u8>)>>;
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// Convenience: fetch and JSON-decode a record.
    fn get_json<T: serde::de::DeserializeOwned>(&self, cf: ColumnFamily, key: &str) -> Result<Option<T>>
    where
        Self: Sized,
    {
        match self.get(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Convenience: JSON-encode and store a record outside of a batch.
    fn put_json<T: serde::Serialize>(&self, cf: ColumnFamily, key: &str, value: &T) -> Result<()>
    where
        Self: Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.put(cf, key, bytes)
    }
}

/// Free-function equivalents of [`KvStore::get_json`]/[`put_json`] that work
/// through a trait object (`&dyn KvStore`), since generic default methods
/// are not part of the object-safe vtable.
pub fn get_json<T: serde::de::DeserializeOwned>(store: &dyn KvStore, cf: ColumnFamily, key: &str) -> Result<Option<T>> {
    match store.get(cf, key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub fn put_json<T: serde::Serialize>(store: &dyn KvStore, cf: ColumnFamily, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.put(cf, key, bytes)
}
