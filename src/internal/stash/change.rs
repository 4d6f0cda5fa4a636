//! Change stash: in-flight groups of edits against a history, composed of
//! save points.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DepotError, Result};
use crate::id::{Id, Kind};
use crate::kv::{ColumnFamily, KvStore, WriteBatch};

use super::{composite_key, load_index, retrieve, stage_record_and_index};

const INDEX_KEY: &str = "__change__index__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeStatus {
    Open,
    Closed,
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: Id,
    pub project: Id,
    pub history: Id,
    pub name: String,
    pub basis: String,
    pub description: String,
    pub baseline_artifact_id: Id,
    pub save_point_ids: Vec<Id>,
    pub status: ChangeStatus,
    pub created_at: DateTime<Utc>,
}

pub struct ChangeStash {
    store: Arc<dyn KvStore>,
}

impl ChangeStash {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        ChangeStash { store }
    }

    pub fn retrieve(&self, change_id: &Id) -> Result<Change> {
        retrieve(self.store.as_ref(), ColumnFamily::Changes, change_id.as_str(), || format!("change `{change_id}` not found"))
    }

    pub fn retrieve_by_name(&self, project: &Id, history: &Id, name: &str) -> Result<Change> {
        let index = load_index(self.store.as_ref(), ColumnFamily::Changes, INDEX_KEY)?;
        let id = index
            .get(&composite_key(&[project.as_str(), history.as_str(), name]))
            .ok_or_else(|| DepotError::not_found(format!("change `{name}` not found")))?;
        self.retrieve(id)
    }

    pub fn list(&self, project: &Id, history: &Id) -> Result<Vec<Change>> {
        let index = load_index(self.store.as_ref(), ColumnFamily::Changes, INDEX_KEY)?;
        let prefix = composite_key(&[project.as_str(), history.as_str(), ""]);
        index.iter().filter(|(key, _)| key.starts_with(&prefix)).map(|(_, id)| self.retrieve(id)).collect()
    }

    pub fn create(&self, project: &Id, history: &Id, name: &str, basis: String, description: &str, baseline_artifact_id: &Id) -> Result<Change> {
        let mut index = load_index(self.store.as_ref(), ColumnFamily::Changes, INDEX_KEY)?;
        let key = composite_key(&[project.as_str(), history.as_str(), name]);
        if index.contains_key(&key) {
            return Err(DepotError::Conflict(format!("change `{name}` already exists")));
        }

        let change = Change {
            id: Id::new(Kind::Change),
            project: project.clone(),
            history: history.clone(),
            name: name.to_string(),
            basis,
            description: description.to_string(),
            baseline_artifact_id: baseline_artifact_id.clone(),
            save_point_ids: Vec::new(),
            status: ChangeStatus::Open,
            created_at: Utc::now(),
        };
        index.insert(key, change.id.clone());

        let mut batch = WriteBatch::new();
        stage_record_and_index(&mut batch, ColumnFamily::Changes, change.id.as_str(), &change, INDEX_KEY, &index)?;
        self.store.write_batch(batch)?;

        Ok(change)
    }

    pub fn append_save_point(&self, change_id: &Id, save_point_id: &Id) -> Result<Change> {
        let mut change = self.retrieve(change_id)?;
        if change.status != ChangeStatus::Open {
            return Err(DepotError::constraint(format!("change `{change_id}` is not Open")));
        }
        change.save_point_ids.push(save_point_id.clone());
        self.store.put(ColumnFamily::Changes, change.id.as_str(), serde_json::to_vec(&change)?)?;
        Ok(change)
    }

    /// Transition a change's status. `Open -> Closed` (deliver) and
    /// `Open -> Aborted` (user abort) are the only legal moves; both targets
    /// are terminal.
    pub fn update_status(&self, change_id: &Id, status: ChangeStatus) -> Result<Change> {
        let mut change = self.retrieve(change_id)?;
        if change.status != ChangeStatus::Open {
            return Err(DepotError::constraint(format!("change `{change_id}` is already terminal")));
        }
        change.status = status;
        self.store.put(ColumnFamily::Changes, change.id.as_str(), serde_json::to_vec(&change)?)?;
        Ok(change)
    }
}
