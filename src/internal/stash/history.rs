//! History stash: named, append-only sequences of [`HistoryStep`]s within a
//! project, plus the branch operation that starts a new history from an
//! existing step.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{DepotError, Result};
use crate::id::{Id, Kind};
use crate::internal::artifact::store::ArtifactStore;
use crate::kv::{ColumnFamily, KvStore, WriteBatch};

use super::{composite_key, load_index, retrieve, stage_record_and_index};

const INDEX_KEY: &str = "__history__index__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub id: Id,
    pub project: Id,
    pub name: String,
    pub description: String,
    pub basis: String,
    pub step_ids: Vec<Id>,
}

/// One immutable baseline snapshot of a history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryStep {
    pub id: Id,
    pub project: Id,
    pub history_name: String,
    pub index: u64,
    pub baseline_artifact_id: Id,
    pub baseline_version_id: Id,
    pub originating_change: Option<Id>,
    pub description: String,
}

pub struct HistoryStash {
    store: Arc<dyn KvStore>,
    #[allow(dead_code)]
    artifacts: Arc<ArtifactStore>,
}

impl HistoryStash {
    pub fn new(store: Arc<dyn KvStore>, artifacts: Arc<ArtifactStore>) -> Self {
        HistoryStash { store, artifacts }
    }

    pub fn retrieve(&self, history_id: &Id) -> Result<History> {
        retrieve(self.store.as_ref(), ColumnFamily::Histories, history_id.as_str(), || format!("history `{history_id}` not found"))
    }

    pub fn retrieve_step(&self, step_id: &Id) -> Result<HistoryStep> {
        retrieve(self.store.as_ref(), ColumnFamily::HistoryVersions, step_id.as_str(), || format!("history step `{step_id}` not found"))
    }

    pub fn retrieve_by_name(&self, project: &Id, name: &str) -> Result<History> {
        let index = load_index(self.store.as_ref(), ColumnFamily::Histories, INDEX_KEY)?;
        let id = index.get(&composite_key(&[project.as_str(), name])).ok_or_else(|| DepotError::not_found(format!("history `{name}` not found")))?;
        self.retrieve(id)
    }

    pub fn list(&self, project: &Id) -> Result<Vec<History>> {
        let index = load_index(self.store.as_ref(), ColumnFamily::Histories, INDEX_KEY)?;
        let prefix = format!("{}::", project.as_str());
        index
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, id)| self.retrieve(id))
            .collect()
    }

    /// The tip (most recently appended) step of a history.
    pub fn tip(&self, history: &History) -> Result<HistoryStep> {
        let step_id = history.step_ids.last().ok_or_else(|| DepotError::internal(format!("history `{}` has no steps", history.id)))?;
        self.retrieve_step(step_id)
    }

    /// Bootstrap a project's first history (`main`), with step 0 pointing at
    /// the project's freshly created baseline version.
    pub fn create_initial(&self, project: &Id, name: &str, baseline_artifact_id: &Id, baseline_version_id: &Id) -> Result<History> {
        let mut index = load_index(self.store.as_ref(), ColumnFamily::Histories, INDEX_KEY)?;
        let key = composite_key(&[project.as_str(), name]);
        if index.contains_key(&key) {
            return Err(DepotError::Conflict(format!("history `{name}` already exists")));
        }

        let history_id = Id::new(Kind::History);
        let step = HistoryStep {
            id: Id::new(Kind::HistoryStep),
            project: project.clone(),
            history_name: name.to_string(),
            index: 0,
            baseline_artifact_id: baseline_artifact_id.clone(),
            baseline_version_id: baseline_version_id.clone(),
            originating_change: None,
            description: "initial".to_string(),
        };
        let history = History {
            id: history_id.clone(),
            project: project.clone(),
            name: name.to_string(),
            description: String::new(),
            basis: format!("baseline({}@{}@{})", project, name, baseline_version_id),
            step_ids: vec![step.id.clone()],
        };
        index.insert(key, history_id);

        let mut batch = WriteBatch::new();
        batch.put_json(ColumnFamily::HistoryVersions, step.id.as_str(), &step)?;
        stage_record_and_index(&mut batch, ColumnFamily::Histories, history.id.as_str(), &history, INDEX_KEY, &index)?;
        self.store.write_batch(batch)?;

        Ok(history)
    }

    /// Branch a new history at `branch_point`: the new history's first step
    /// clones the branch point's baseline IDs and carries the fixed branch
    /// marker description.
    pub fn branch(&self, project: &Id, name: &str, basis: String, branch_point: &HistoryStep) -> Result<History> {
        let mut index = load_index(self.store.as_ref(), ColumnFamily::Histories, INDEX_KEY)?;
        let key = composite_key(&[project.as_str(), name]);
        if index.contains_key(&key) {
            return Err(DepotError::Conflict(format!("history `{name}` already exists")));
        }

        let history_id = Id::new(Kind::History);
        let step = HistoryStep {
            id: Id::new(Kind::HistoryStep),
            project: project.clone(),
            history_name: name.to_string(),
            index: 0,
            baseline_artifact_id: branch_point.baseline_artifact_id.clone(),
            baseline_version_id: branch_point.baseline_version_id.clone(),
            originating_change: None,
            description: "branch into new history".to_string(),
        };
        let history = History {
            id: history_id.clone(),
            project: project.clone(),
            name: name.to_string(),
            description: String::new(),
            basis,
            step_ids: vec![step.id.clone()],
        };
        index.insert(key, history_id);

        let mut batch = WriteBatch::new();
        batch.put_json(ColumnFamily::HistoryVersions, step.id.as_str(), &step)?;
        stage_record_and_index(&mut batch, ColumnFamily::Histories, history.id.as_str(), &history, INDEX_KEY, &index)?;
        self.store.write_batch(batch)?;

        Ok(history)
    }

    /// Append a step to `history`. Requires the caller to have already
    /// checked the change-closed and up-to-date preconditions; this method
    /// only assigns the monotonic index and persists.
    pub fn append_step(&self, history: &History, baseline_artifact_id: &Id, baseline_version_id: &Id, originating_change: Option<Id>, description: &str) -> Result<(History, HistoryStep)> {
        let mut history = history.clone();
        let step = HistoryStep {
            id: Id::new(Kind::HistoryStep),
            project: history.project.clone(),
            history_name: history.name.clone(),
            index: history.step_ids.len() as u64,
            baseline_artifact_id: baseline_artifact_id.clone(),
            baseline_version_id: baseline_version_id.clone(),
            originating_change,
            description: description.to_string(),
        };
        history.step_ids.push(step.id.clone());

        let mut batch = WriteBatch::new();
        batch.put_json(ColumnFamily::HistoryVersions, step.id.as_str(), &step)?;
        batch.put_json(ColumnFamily::Histories, history.id.as_str(), &history)?;
        self.store.write_batch(batch)?;

        Ok((history, step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;

    fn setup() -> HistoryStash {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let artifacts = Arc::new(ArtifactStore::new(store.clone()));
        HistoryStash::new(store, artifacts)
    }

    #[test]
    fn s4_branch_copies_baseline_ids_with_branch_marker() {
        let stash = setup();
        let project = Id::new(Kind::Project);
        let baseline_artifact = Id::new(Kind::Artifact);
        let baseline_version = Id::new(Kind::Version);

        let main = stash.create_initial(&project, "main", &baseline_artifact, &baseline_version).unwrap();
        let step0 = stash.tip(&main).unwrap();

        let basis = format!("history({}@main@0)", project);
        let alt = stash.branch(&project, "alt", basis.clone(), &step0).unwrap();

        assert_eq!(alt.step_ids.len(), 1);
        assert_eq!(alt.basis, basis);
        let alt_step0 = stash.retrieve_step(&alt.step_ids[0]).unwrap();
        assert_eq!(alt_step0.baseline_version_id, step0.baseline_version_id);
        assert_eq!(alt_step0.description, "branch into new history");
    }

    #[test]
    fn append_step_assigns_monotonic_index() {
        let stash = setup();
        let project = Id::new(Kind::Project);
        let history = stash.create_initial(&project, "main", &Id::new(Kind::Artifact), &Id::new(Kind::Version)).unwrap();
        let (history, step1) = stash.append_step(&history, &Id::new(Kind::Artifact), &Id::new(Kind::Version), None, "second").unwrap();
        assert_eq!(step1.index, 1);
        assert_eq!(history.step_ids.len(), 2);
    }
}
