//! Project stash: the top-level named collection. Creating a project also
//! bootstraps its root directory artifact, baseline artifact, and initial
//! `main` history.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DepotError, Result};
use crate::id::{Id, Kind};
use crate::internal::agents::AgentRegistry;
use crate::internal::artifact::store::ArtifactStore;
use crate::internal::content::{Baseline, Directory, BASELINE_TYPE, DIRECTORY_TYPE};
use crate::internal::stash::history::HistoryStash;
use crate::kv::{ColumnFamily, KvStore, WriteBatch};

use super::{load_index, retrieve, stage_record_and_index};

const INDEX_KEY: &str = "__project__index__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub name: String,
    pub creator: Id,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub root_directory: Id,
    pub baseline: Id,
    pub histories: Vec<Id>,
}

pub struct ProjectStash {
    store: Arc<dyn KvStore>,
    artifacts: Arc<ArtifactStore>,
    histories: HistoryStash,
}

impl ProjectStash {
    pub fn new(store: Arc<dyn KvStore>, artifacts: Arc<ArtifactStore>) -> Self {
        ProjectStash { store: store.clone(), artifacts: artifacts.clone(), histories: HistoryStash::new(store, artifacts) }
    }

    pub fn retrieve(&self, project_id: &Id) -> Result<Project> {
        retrieve(self.store.as_ref(), ColumnFamily::Projects, project_id.as_str(), || format!("project `{project_id}` not found"))
    }

    pub fn retrieve_by_name(&self, name: &str) -> Result<Project> {
        let index = load_index(self.store.as_ref(), ColumnFamily::Projects, INDEX_KEY)?;
        let id = index.get(name).ok_or_else(|| DepotError::not_found(format!("project `{name}` not found")))?;
        self.retrieve(id)
    }

    pub fn list(&self) -> Result<Vec<Project>> {
        let index = load_index(self.store.as_ref(), ColumnFamily::Projects, INDEX_KEY)?;
        index.values().map(|id| self.retrieve(id)).collect()
    }

    /// Create a new project: empty root directory, a baseline mapping it,
    /// and the initial `main` history with one step. `agents` supplies the
    /// codecs needed to seed the root directory and baseline content.
    pub fn create(&self, name: &str, creator: &Id, description: &str, agents: &AgentRegistry) -> Result<Project> {
        let mut index = load_index(self.store.as_ref(), ColumnFamily::Projects, INDEX_KEY)?;
        if index.contains_key(name) {
            return Err(DepotError::Conflict(format!("project `{name}` already exists")));
        }

        let project_id = Id::new(Kind::Project);
        let _ = agents.get(DIRECTORY_TYPE)?; // fail fast if the registry is missing a builtin agent
        let (root_artifact, root_version) = self.artifacts.create_artifact(&project_id, DIRECTORY_TYPE, Directory::new().encode()?, BTreeMap::new())?;

        let mut baseline = Baseline::new(root_artifact.id.clone());
        baseline.versions.insert(root_artifact.id.clone(), root_version.id.clone());
        let (baseline_artifact, baseline_version) = self.artifacts.create_artifact(&project_id, BASELINE_TYPE, baseline.encode()?, BTreeMap::new())?;

        let main_history = self.histories.create_initial(&project_id, "main", &baseline_artifact.id, &baseline_version.id)?;

        let project = Project {
            id: project_id.clone(),
            name: name.to_string(),
            creator: creator.clone(),
            description: description.to_string(),
            created_at: Utc::now(),
            root_directory: root_artifact.id,
            baseline: baseline_artifact.id,
            histories: vec![main_history.id],
        };
        index.insert(name.to_string(), project_id);

        let mut batch = WriteBatch::new();
        stage_record_and_index(&mut batch, ColumnFamily::Projects, project.id.as_str(), &project, INDEX_KEY, &index)?;
        self.store.write_batch(batch)?;

        Ok(project)
    }

    /// Append a newly created history to the project's history list.
    pub fn record_history(&self, project_id: &Id, history_id: &Id) -> Result<Project> {
        let mut project = self.retrieve(project_id)?;
        project.histories.push(history_id.clone());
        self.store.put(ColumnFamily::Projects, project.id.as_str(), serde_json::to_vec(&project)?)?;
        Ok(project)
    }
}
