//! Save point stash: immutable intermediate states of a [`super::change::Change`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::id::{Id, Kind};
use crate::kv::{ColumnFamily, KvStore};

use super::retrieve;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePoint {
    pub id: Id,
    pub change: Id,
    pub creator: Id,
    pub description: String,
    pub basis: String,
    pub new_baseline_version_id: Id,
    pub modified_artifact_ids: Vec<Id>,
    pub created_at: DateTime<Utc>,
}

pub struct SavePointStash {
    store: Arc<dyn KvStore>,
}

impl SavePointStash {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        SavePointStash { store }
    }

    pub fn retrieve(&self, save_point_id: &Id) -> Result<SavePoint> {
        retrieve(self.store.as_ref(), ColumnFamily::SavePoints, save_point_id.as_str(), || format!("save point `{save_point_id}` not found"))
    }

    pub fn create(&self, change: &Id, creator: &Id, description: &str, basis: String, new_baseline_version_id: &Id, modified_artifact_ids: Vec<Id>) -> Result<SavePoint> {
        let save_point = SavePoint {
            id: Id::new(Kind::SavePoint),
            change: change.clone(),
            creator: creator.clone(),
            description: description.to_string(),
            basis,
            new_baseline_version_id: new_baseline_version_id.clone(),
            modified_artifact_ids,
            created_at: Utc::now(),
        };
        self.store.put(ColumnFamily::SavePoints, save_point.id.as_str(), serde_json::to_vec(&save_point)?)?;
        Ok(save_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;

    #[test]
    fn create_then_retrieve_round_trips() {
        let stash = SavePointStash::new(Arc::new(MemoryKv::new()));
        let sp = stash
            .create(&Id::new(Kind::Change), &Id::new(Kind::User), "first save", "history(p@main@0)".into(), &Id::new(Kind::Version), vec![Id::new(Kind::Artifact)])
            .unwrap();
        let fetched = stash.retrieve(&sp.id).unwrap();
        assert_eq!(fetched.id, sp.id);
        assert_eq!(fetched.modified_artifact_ids.len(), 1);
    }
}
