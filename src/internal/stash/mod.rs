//! Named collections (projects, histories, changes, save points), each
//! backed by a primary KV map plus a secondary name index written in the
//! same atomic batch as the record it indexes.

pub mod change;
pub mod history;
pub mod project;
pub mod savepoint;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::Result;
use crate::id::Id;
use crate::kv::{self, ColumnFamily, KvStore, WriteBatch};

/// Join index key parts with a separator that cannot appear in an ID or a
/// validated entity name, so composite keys never collide across parts.
pub(crate) fn composite_key(parts: &[&str]) -> String {
    parts.join("::")
}

/// Load a stash's name -> ID secondary index, defaulting to empty when the
/// reserved index key has never been written.
pub(crate) fn load_index(store: &dyn KvStore, cf: ColumnFamily, index_key: &str) -> Result<BTreeMap<String, Id>> {
    Ok(kv::get_json(store, cf, index_key)?.unwrap_or_default())
}

/// Stage a primary record and its freshly updated index into the same batch.
pub(crate) fn stage_record_and_index<T: Serialize>(batch: &mut WriteBatch, cf: ColumnFamily, record_key: &str, record: &T, index_key: &str, index: &BTreeMap<String, Id>) -> Result<()> {
    batch.put_json(cf, record_key, record)?;
    batch.put_json(cf, index_key, index)?;
    Ok(())
}

pub(crate) fn retrieve<T: DeserializeOwned>(store: &dyn KvStore, cf: ColumnFamily, key: &str, not_found: impl FnOnce() -> String) -> Result<T> {
    kv::get_json(store, cf, key)?.ok_or_else(|| crate::errors::DepotError::not_found(not_found()))
}
