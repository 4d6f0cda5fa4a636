//! Workspace engine: the user's view onto a basis PVS plus zero or more
//! Working versions, and the operations that drive edits, saves,
//! deliveries, updates, and integrations against it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DepotError, Result};
use crate::id::{Id, Kind};
use crate::internal::agents::{AgentRegistry, MergeConflict};
use crate::internal::artifact::store::ArtifactStore;
use crate::internal::content::{Baseline, Directory, BASELINE_TYPE, DIRECTORY_TYPE};
use crate::internal::stash::change::{ChangeStash, ChangeStatus};
use crate::internal::stash::history::HistoryStash;
use crate::internal::stash::project::ProjectStash;
use crate::internal::stash::savepoint::SavePointStash;
use crate::kv::{self, ColumnFamily, KvStore, WriteBatch};
use crate::pvs::{Pvs, PvsResolver};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Id,
    pub project: Id,
    pub name: String,
    pub creator: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub description: String,
    pub basis: String,
    pub baseline_artifact_id: Id,
    pub baseline_version_id: Id,
    pub history_name: String,
    pub change_name: Option<String>,
    pub working_versions: BTreeMap<Id, Id>,
    pub modified_artifacts: BTreeSet<Id>,
    pub conflicts: Vec<MergeConflict>,
}

pub struct WorkspaceEngine {
    store: Arc<dyn KvStore>,
    artifacts: Arc<ArtifactStore>,
    agents: Arc<AgentRegistry>,
    projects: Arc<ProjectStash>,
    histories: Arc<HistoryStash>,
    changes: Arc<ChangeStash>,
    save_points: Arc<SavePointStash>,
    pvs: PvsResolver,
}

impl WorkspaceEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn KvStore>,
        artifacts: Arc<ArtifactStore>,
        agents: Arc<AgentRegistry>,
        projects: Arc<ProjectStash>,
        histories: Arc<HistoryStash>,
        changes: Arc<ChangeStash>,
        save_points: Arc<SavePointStash>,
    ) -> Self {
        let pvs = PvsResolver::new(histories.clone(), changes.clone(), save_points.clone());
        WorkspaceEngine { store, artifacts, agents, projects, histories, changes, save_points, pvs }
    }

    pub fn retrieve(&self, workspace_id: &Id) -> Result<Workspace> {
        kv::get_json(self.store.as_ref(), ColumnFamily::Workspaces, workspace_id.as_str())?
            .ok_or_else(|| DepotError::not_found(format!("workspace `{workspace_id}` not found")))
    }

    fn persist(&self, workspace: &Workspace) -> Result<()> {
        kv::put_json(self.store.as_ref(), ColumnFamily::Workspaces, workspace.id.as_str(), workspace)
    }

    /// Create a workspace pointed at the tip of `history_name` in `project`.
    pub fn create(&self, project_id: &Id, name: &str, creator: &Id, description: &str, history_name: &str) -> Result<Workspace> {
        let project = self.projects.retrieve(project_id)?;
        let history = self.histories.retrieve_by_name(project_id, history_name)?;
        let tip = self.histories.tip(&history)?;
        let basis = Pvs::History { project: project_id.clone(), history: history_name.to_string(), step: Some(tip.index) }.to_string();

        let now = Utc::now();
        let workspace = Workspace {
            id: Id::new(Kind::Workspace),
            project: project_id.clone(),
            name: name.to_string(),
            creator: creator.clone(),
            created_at: now,
            updated_at: now,
            description: description.to_string(),
            basis,
            baseline_artifact_id: project.baseline,
            baseline_version_id: tip.baseline_version_id,
            history_name: history_name.to_string(),
            change_name: None,
            working_versions: BTreeMap::new(),
            modified_artifacts: BTreeSet::new(),
            conflicts: Vec::new(),
        };
        self.persist(&workspace)?;
        Ok(workspace)
    }

    /// Bind the workspace to an existing Open change, required before any
    /// content-modifying operation.
    pub fn begin_change(&self, workspace_id: &Id, change_name: &str) -> Result<Workspace> {
        let mut workspace = self.retrieve(workspace_id)?;
        let history = self.histories.retrieve_by_name(&workspace.project, &workspace.history_name)?;
        let change = self.changes.retrieve_by_name(&workspace.project, &history.id, change_name)?;
        if change.status != ChangeStatus::Open {
            return Err(DepotError::constraint(format!("change `{change_name}` is not Open")));
        }
        workspace.change_name = Some(change_name.to_string());
        workspace.updated_at = Utc::now();
        self.persist(&workspace)?;
        Ok(workspace)
    }

    fn require_open_change<'a>(&self, workspace: &'a Workspace) -> Result<&'a str> {
        workspace.change_name.as_deref().ok_or_else(|| DepotError::constraint("workspace has no open change"))
    }

    fn current_change(&self, workspace: &Workspace) -> Result<crate::internal::stash::change::Change> {
        let change_name = self.require_open_change(workspace)?;
        let history = self.histories.retrieve_by_name(&workspace.project, &workspace.history_name)?;
        self.changes.retrieve_by_name(&workspace.project, &history.id, change_name)
    }

    fn baseline_content(&self, workspace: &Workspace, version_id: &Id) -> Result<String> {
        Ok(self.artifacts.retrieve_version(&workspace.baseline_artifact_id, version_id)?.content)
    }

    fn baseline_map(&self, workspace: &Workspace) -> Result<Baseline> {
        Baseline::decode(&self.baseline_content(workspace, &workspace.baseline_version_id)?)
    }

    fn resolve_version_id(&self, workspace: &Workspace, artifact_id: &Id) -> Result<Id> {
        if let Some(v) = workspace.working_versions.get(artifact_id) {
            return Ok(v.clone());
        }
        self.baseline_map(workspace)?
            .versions
            .get(artifact_id)
            .cloned()
            .ok_or_else(|| DepotError::not_found(format!("artifact `{artifact_id}` not bound in workspace baseline")))
    }

    fn resolve_content(&self, workspace: &Workspace, artifact_id: &Id) -> Result<String> {
        let version_id = self.resolve_version_id(workspace, artifact_id)?;
        Ok(self.artifacts.retrieve_version(artifact_id, &version_id)?.content)
    }

    /// Walk `path` (directory names from the project root) to the artifact ID
    /// it names.
    pub fn resolve_path(&self, workspace: &Workspace, path: &[String]) -> Result<Id> {
        let mut current = self.baseline_map(workspace)?.root_directory;
        for name in path {
            let dir = Directory::decode(&self.resolve_content(workspace, &current)?)?;
            current = dir.get(name).cloned().ok_or_else(|| DepotError::not_found(format!("`{name}` not found")))?;
        }
        Ok(current)
    }

    fn ensure_working(&self, workspace: &mut Workspace, artifact_id: &Id) -> Result<Id> {
        if let Some(v) = workspace.working_versions.get(artifact_id) {
            return Ok(v.clone());
        }
        let base_version = self.resolve_version_id(workspace, artifact_id)?;
        let working = self.artifacts.create_working_version(artifact_id, &base_version)?;
        workspace.working_versions.insert(artifact_id.clone(), working.id.clone());
        if artifact_id != &workspace.baseline_artifact_id {
            workspace.modified_artifacts.insert(artifact_id.clone());
        }
        Ok(working.id)
    }

    fn ensure_working_baseline(&self, workspace: &mut Workspace) -> Result<Id> {
        let baseline_artifact_id = workspace.baseline_artifact_id.clone();
        let working = self.ensure_working(workspace, &baseline_artifact_id)?;
        workspace.baseline_version_id = working.clone();
        Ok(working)
    }

    fn rebind_baseline_entry(&self, workspace: &mut Workspace, artifact_id: &Id, version_id: &Id) -> Result<()> {
        let baseline_version = self.ensure_working_baseline(workspace)?;
        let mut baseline = Baseline::decode(&self.artifacts.retrieve_version(&workspace.baseline_artifact_id, &baseline_version)?.content)?;
        baseline.versions.insert(artifact_id.clone(), version_id.clone());
        self.artifacts.update_working_version(&workspace.baseline_artifact_id, &baseline_version, Some(baseline.encode()?), None, None)?;
        Ok(())
    }

    /// Create a new artifact under `parent_path` bound as `name`.
    pub fn add(&self, workspace_id: &Id, parent_path: &[String], name: &str, artifact_type: &str, content: String) -> Result<(Workspace, Id)> {
        let mut workspace = self.retrieve(workspace_id)?;
        self.require_open_change(&workspace)?;

        let parent_dir_id = self.resolve_path(&workspace, parent_path)?;
        let existing = Directory::decode(&self.resolve_content(&workspace, &parent_dir_id)?)?;
        if existing.contains(name) {
            return Err(DepotError::Conflict(format!("`{name}` already exists")));
        }

        let parent_working = self.ensure_working(&mut workspace, &parent_dir_id)?;
        let (artifact, version) = self.artifacts.create_artifact(&workspace.project, artifact_type, content, BTreeMap::new())?;

        let mut parent_dir = Directory::decode(&self.artifacts.retrieve_version(&parent_dir_id, &parent_working)?.content)?;
        parent_dir.set(name, artifact.id.clone());
        self.artifacts.update_working_version(&parent_dir_id, &parent_working, Some(parent_dir.encode()?), None, None)?;

        self.rebind_baseline_entry(&mut workspace, &artifact.id, &version.id)?;
        workspace.updated_at = Utc::now();
        self.persist(&workspace)?;
        Ok((workspace, artifact.id))
    }

    /// Move the entry named `name` under `from_path` to `to_name` under `to_path`.
    pub fn move_entry(&self, workspace_id: &Id, from_path: &[String], name: &str, to_path: &[String], to_name: &str) -> Result<Workspace> {
        let mut workspace = self.retrieve(workspace_id)?;
        self.require_open_change(&workspace)?;

        let from_dir_id = self.resolve_path(&workspace, from_path)?;
        let to_dir_id = self.resolve_path(&workspace, to_path)?;

        let to_dir_existing = Directory::decode(&self.resolve_content(&workspace, &to_dir_id)?)?;
        if to_dir_existing.contains(to_name) {
            return Err(DepotError::Conflict(format!("`{to_name}` already exists at the destination")));
        }

        let from_working = self.ensure_working(&mut workspace, &from_dir_id)?;
        let mut from_dir = Directory::decode(&self.artifacts.retrieve_version(&from_dir_id, &from_working)?.content)?;
        let moved_artifact = from_dir.remove(name).ok_or_else(|| DepotError::not_found(format!("`{name}` not found")))?;
        self.artifacts.update_working_version(&from_dir_id, &from_working, Some(from_dir.encode()?), None, None)?;

        let to_working = self.ensure_working(&mut workspace, &to_dir_id)?;
        let mut to_dir = Directory::decode(&self.artifacts.retrieve_version(&to_dir_id, &to_working)?.content)?;
        to_dir.set(to_name, moved_artifact);
        self.artifacts.update_working_version(&to_dir_id, &to_working, Some(to_dir.encode()?), None, None)?;

        workspace.updated_at = Utc::now();
        self.persist(&workspace)?;
        Ok(workspace)
    }

    /// Delete the entry named `name` under `parent_path`. If it is a
    /// directory, every artifact transitively reachable from it is unbound
    /// from the working baseline (never from the depot). Returns the set of
    /// unbound artifact IDs (including the deleted entry itself).
    pub fn delete(&self, workspace_id: &Id, parent_path: &[String], name: &str) -> Result<(Workspace, BTreeSet<Id>)> {
        let mut workspace = self.retrieve(workspace_id)?;
        self.require_open_change(&workspace)?;

        let parent_dir_id = self.resolve_path(&workspace, parent_path)?;
        let root_directory = self.baseline_map(&workspace)?.root_directory;
        let target = Directory::decode(&self.resolve_content(&workspace, &parent_dir_id)?)?
            .get(name)
            .cloned()
            .ok_or_else(|| DepotError::not_found(format!("`{name}` not found")))?;
        if target == root_directory {
            return Err(DepotError::constraint("the root directory cannot be deleted"));
        }

        let parent_working = self.ensure_working(&mut workspace, &parent_dir_id)?;
        let mut parent_dir = Directory::decode(&self.artifacts.retrieve_version(&parent_dir_id, &parent_working)?.content)?;
        parent_dir.remove(name);
        self.artifacts.update_working_version(&parent_dir_id, &parent_working, Some(parent_dir.encode()?), None, None)?;

        let mut removed = BTreeSet::new();
        self.collect_reachable(&workspace, &target, &mut removed)?;

        let baseline_version = self.ensure_working_baseline(&mut workspace)?;
        let mut baseline = Baseline::decode(&self.artifacts.retrieve_version(&workspace.baseline_artifact_id, &baseline_version)?.content)?;
        for artifact_id in &removed {
            baseline.versions.remove(artifact_id);
        }
        self.artifacts.update_working_version(&workspace.baseline_artifact_id, &baseline_version, Some(baseline.encode()?), None, None)?;

        workspace.updated_at = Utc::now();
        self.persist(&workspace)?;
        Ok((workspace, removed))
    }

    fn collect_reachable(&self, workspace: &Workspace, artifact_id: &Id, out: &mut BTreeSet<Id>) -> Result<()> {
        if !out.insert(artifact_id.clone()) {
            return Ok(());
        }
        let artifact = self.artifacts.retrieve_artifact(artifact_id)?;
        if artifact.artifact_type == DIRECTORY_TYPE {
            let dir = Directory::decode(&self.resolve_content(workspace, artifact_id)?)?;
            for entry in dir.entries {
                self.collect_reachable(workspace, &entry.artifact_id, out)?;
            }
        }
        Ok(())
    }

    /// Commit every Working version in one atomic batch, record a
    /// SavePoint, advance the change, and rebase the workspace basis onto
    /// it. `resolved` lists conflict IDs the caller has addressed; any
    /// conflict not listed remains on the workspace afterward.
    pub fn save(&self, workspace_id: &Id, creator: &Id, description: &str, resolved: &[Id]) -> Result<Workspace> {
        let mut workspace = self.retrieve(workspace_id)?;
        let change = self.current_change(&workspace)?;

        let mut batch = WriteBatch::new();
        for (artifact_id, version_id) in &workspace.working_versions {
            let mut version = self.artifacts.retrieve_version(artifact_id, version_id)?;
            if !version.is_working() {
                return Err(DepotError::constraint(format!("version `{version_id}` is not Working")));
            }
            version.status = crate::internal::artifact::VersionStatus::Committed;
            batch.put_json(ColumnFamily::Versions, version.id.as_str(), &version)?;
        }

        let modified_ids: Vec<Id> = workspace.modified_artifacts.iter().cloned().collect();
        let save_point_id = Id::new(Kind::SavePoint);
        let save_point = crate::internal::stash::savepoint::SavePoint {
            id: save_point_id.clone(),
            change: change.id.clone(),
            creator: creator.clone(),
            description: description.to_string(),
            basis: workspace.basis.clone(),
            new_baseline_version_id: workspace.baseline_version_id.clone(),
            modified_artifact_ids: modified_ids,
            created_at: Utc::now(),
        };
        batch.put_json(ColumnFamily::SavePoints, save_point.id.as_str(), &save_point)?;

        let mut change = change;
        change.save_point_ids.push(save_point.id.clone());
        batch.put_json(ColumnFamily::Changes, change.id.as_str(), &change)?;

        workspace.basis = Pvs::SavePoint { project: workspace.project.clone(), history: workspace.history_name.clone(), save_id: save_point.id.clone() }.to_string();
        workspace.working_versions.clear();
        workspace.modified_artifacts.clear();
        workspace.conflicts.retain(|c| !resolved.contains(&c.id));
        workspace.updated_at = Utc::now();
        batch.put_json(ColumnFamily::Workspaces, workspace.id.as_str(), &workspace)?;

        self.store.write_batch(batch)?;
        Ok(workspace)
    }

    pub fn is_up_to_date(&self, workspace: &Workspace) -> Result<bool> {
        let history = self.histories.retrieve_by_name(&workspace.project, &workspace.history_name)?;
        let tip = self.histories.tip(&history)?;
        self.artifacts.version_is_ancestor(&workspace.baseline_artifact_id, &tip.baseline_version_id, &workspace.baseline_version_id)
    }

    /// Abort every Working version a workspace owns (including its working
    /// baseline, if materialized), in the given batch. Shared by
    /// `delete_workspace` (which also removes the workspace record) and
    /// `abort_change` (which keeps the workspace but clears its change).
    fn stage_abort_working_versions(&self, workspace: &Workspace, batch: &mut WriteBatch) -> Result<()> {
        for (artifact_id, version_id) in &workspace.working_versions {
            let mut version = self.artifacts.retrieve_version(artifact_id, version_id)?;
            if !version.is_working() {
                return Err(DepotError::constraint(format!("version `{version_id}` is not Working")));
            }
            version.content.clear();
            version.status = crate::internal::artifact::VersionStatus::Aborted;
            batch.put_json(ColumnFamily::Versions, version.id.as_str(), &version)?;
        }
        Ok(())
    }

    /// Delete a workspace entirely: every Working version it owns is marked
    /// Aborted and the workspace record is removed, in one atomic batch.
    /// Committed versions and artifacts reachable from any history are
    /// never touched.
    pub fn delete_workspace(&self, workspace_id: &Id) -> Result<()> {
        let workspace = self.retrieve(workspace_id)?;
        let mut batch = WriteBatch::new();
        self.stage_abort_working_versions(&workspace, &mut batch)?;
        batch.delete(ColumnFamily::Workspaces, workspace.id.as_str());
        self.store.write_batch(batch)
    }

    /// Abort the workspace's open change: every Working version it owns is
    /// marked Aborted and the change transitions to Aborted, in one atomic
    /// batch. Already-Committed versions and save points are untouched and
    /// remain reachable for audit. The workspace's baseline rolls back to
    /// what its basis resolves to (the state before the change opened); the
    /// workspace itself must re-open or switch to another change before
    /// further modifying operations succeed.
    pub fn abort_change(&self, workspace_id: &Id) -> Result<Workspace> {
        let mut workspace = self.retrieve(workspace_id)?;
        let mut change = self.current_change(&workspace)?;

        let mut batch = WriteBatch::new();
        self.stage_abort_working_versions(&workspace, &mut batch)?;

        change.status = ChangeStatus::Aborted;
        batch.put_json(ColumnFamily::Changes, change.id.as_str(), &change)?;

        workspace.baseline_version_id = self.pvs.resolve(&workspace.basis.parse()?)?;
        workspace.working_versions.clear();
        workspace.modified_artifacts.clear();
        workspace.change_name = None;
        workspace.updated_at = Utc::now();
        batch.put_json(ColumnFamily::Workspaces, workspace.id.as_str(), &workspace)?;

        self.store.write_batch(batch)?;
        Ok(workspace)
    }

    /// Close the open change and append a HistoryStep. Fails with
    /// `UserError` if the workspace is dirty, has unresolved conflicts, or
    /// is not up-to-date with the history tip.
    pub fn deliver(&self, workspace_id: &Id) -> Result<Workspace> {
        let mut workspace = self.retrieve(workspace_id)?;
        self.require_open_change(&workspace)?;

        if !workspace.modified_artifacts.is_empty() {
            return Err(DepotError::UserError("workspace has unsaved modifications".into()));
        }
        if !workspace.conflicts.is_empty() {
            return Err(DepotError::UserError("workspace has unresolved conflicts".into()));
        }
        if !self.is_up_to_date(&workspace)? {
            return Err(DepotError::UserError("workspace basis is not up-to-date".into()));
        }

        let change = self.current_change(&workspace)?;
        self.changes.update_status(&change.id, ChangeStatus::Closed)?;

        let history = self.histories.retrieve_by_name(&workspace.project, &workspace.history_name)?;
        let (history, step) = self.histories.append_step(&history, &workspace.baseline_artifact_id, &workspace.baseline_version_id, Some(change.id.clone()), &change.description)?;

        workspace.change_name = None;
        workspace.basis = Pvs::History { project: workspace.project.clone(), history: history.name.clone(), step: Some(step.index) }.to_string();
        workspace.updated_at = Utc::now();
        self.persist(&workspace)?;
        Ok(workspace)
    }

    /// Merge the history tip into the workspace baseline. A no-op if the
    /// workspace already descends from the tip.
    pub fn update(&self, workspace_id: &Id) -> Result<Workspace> {
        let mut workspace = self.retrieve(workspace_id)?;
        if self.is_up_to_date(&workspace)? {
            return Ok(workspace);
        }

        let history = self.histories.retrieve_by_name(&workspace.project, &workspace.history_name)?;
        let tip = self.histories.tip(&history)?;
        self.merge_into_workspace(&mut workspace, &tip.baseline_version_id)?;

        workspace.updated_at = Utc::now();
        self.persist(&workspace)?;
        Ok(workspace)
    }

    /// Merge the content introduced between `from` and `to` into the
    /// workspace baseline. The nearest common ancestor of `from` and `to` is
    /// used as the merge base, so behavior matches `update` symmetrically
    /// even when `from` is not a literal ancestor of `to`.
    pub fn integrate(&self, workspace_id: &Id, from: &Pvs, to: &Pvs) -> Result<Workspace> {
        let mut workspace = self.retrieve(workspace_id)?;
        let from_version = self.pvs.resolve(from)?;
        let to_version = self.pvs.resolve(to)?;
        let ancestor = self.artifacts.nca(&workspace.baseline_artifact_id, &from_version, &to_version)?;
        self.merge_into_workspace_from(&mut workspace, &ancestor, &to_version)?;

        workspace.updated_at = Utc::now();
        self.persist(&workspace)?;
        Ok(workspace)
    }

    fn merge_into_workspace(&self, workspace: &mut Workspace, source_version: &Id) -> Result<()> {
        let ancestor = self.artifacts.nca(&workspace.baseline_artifact_id, &workspace.baseline_version_id, source_version)?;
        self.merge_into_workspace_from(workspace, &ancestor, source_version)
    }

    fn merge_into_workspace_from(&self, workspace: &mut Workspace, ancestor_version: &Id, source_version: &Id) -> Result<()> {
        let target_version = workspace.baseline_version_id.clone();
        let ancestor_content = self.baseline_content(workspace, ancestor_version)?;
        let source_content = self.baseline_content(workspace, source_version)?;
        let target_content = self.baseline_content(workspace, &target_version)?;

        let ancestor_baseline = Baseline::decode(&ancestor_content)?;
        let source_baseline = Baseline::decode(&source_content)?;
        let target_baseline = Baseline::decode(&target_content)?;

        let baseline_agent = self.agents.get(BASELINE_TYPE)?;
        let outcome = baseline_agent.merge(&workspace.baseline_artifact_id, &ancestor_content, source_version, &source_content, &target_version, &target_content)?;
        let mut final_baseline = Baseline::decode(&outcome.proposed_content)?;

        for conflict in outcome.conflicts {
            self.apply_baseline_conflict(workspace, &ancestor_baseline, &source_baseline, &target_baseline, &mut final_baseline, conflict)?;
        }

        let merged_version = self.artifacts.create_version(&workspace.baseline_artifact_id, final_baseline.encode()?, vec![source_version.clone(), target_version.clone()], BTreeMap::new())?;
        workspace.baseline_version_id = merged_version.id;
        workspace.working_versions.remove(&workspace.baseline_artifact_id.clone());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_baseline_conflict(&self, workspace: &mut Workspace, ancestor_baseline: &Baseline, source_baseline: &Baseline, target_baseline: &Baseline, final_baseline: &mut Baseline, conflict: MergeConflict) -> Result<()> {
        let details: serde_json::Value = serde_json::from_str(&conflict.details)?;
        let kind = details.get("kind").and_then(|v| v.as_str()).unwrap_or("");
        if kind != "ModMod" {
            let mut conflict = conflict;
            if let Ok(artifact) = self.artifacts.retrieve_artifact(&conflict.artifact_id) {
                conflict.artifact_type = artifact.artifact_type;
            }
            workspace.conflicts.push(conflict);
            return Ok(());
        }

        let entry_artifact_id: Option<Id> = details.get("entry_artifact_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok());
        let entry_artifact_id = match entry_artifact_id {
            Some(id) => id,
            None => {
                workspace.conflicts.push(conflict);
                return Ok(());
            }
        };

        let (ancestor_version, source_version, target_version) = (
            ancestor_baseline.versions.get(&entry_artifact_id),
            source_baseline.versions.get(&entry_artifact_id),
            target_baseline.versions.get(&entry_artifact_id),
        );
        let (Some(ancestor_version), Some(source_version), Some(target_version)) = (ancestor_version, source_version, target_version) else {
            workspace.conflicts.push(conflict);
            return Ok(());
        };

        let artifact = self.artifacts.retrieve_artifact(&entry_artifact_id)?;
        let agent = self.agents.get(&artifact.artifact_type)?;
        let ancestor_content = self.artifacts.retrieve_version(&entry_artifact_id, ancestor_version)?.content;
        let source_content = self.artifacts.retrieve_version(&entry_artifact_id, source_version)?.content;
        let target_content = self.artifacts.retrieve_version(&entry_artifact_id, target_version)?.content;

        let outcome = agent.merge(&entry_artifact_id, &ancestor_content, source_version, &source_content, target_version, &target_content)?;
        let merged = self.artifacts.create_version(&entry_artifact_id, outcome.proposed_content, vec![source_version.clone(), target_version.clone()], BTreeMap::new())?;

        final_baseline.versions.insert(entry_artifact_id.clone(), merged.id);
        for nested in outcome.conflicts {
            workspace.conflicts.push(nested);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::stash::change::ChangeStash;
    use crate::internal::stash::history::HistoryStash;
    use crate::internal::stash::project::ProjectStash;
    use crate::internal::stash::savepoint::SavePointStash;
    use crate::kv::memory::MemoryKv;

    struct Fixture {
        engine: WorkspaceEngine,
        projects: Arc<ProjectStash>,
        histories: Arc<HistoryStash>,
        changes: Arc<ChangeStash>,
        artifacts: Arc<ArtifactStore>,
        agents: Arc<AgentRegistry>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let artifacts = Arc::new(ArtifactStore::new(store.clone()));
        let agents = Arc::new(AgentRegistry::with_builtin_agents());
        let projects = Arc::new(ProjectStash::new(store.clone(), artifacts.clone()));
        let histories = Arc::new(HistoryStash::new(store.clone(), artifacts.clone()));
        let changes = Arc::new(ChangeStash::new(store.clone()));
        let save_points = Arc::new(SavePointStash::new(store.clone()));
        let engine = WorkspaceEngine::new(store, artifacts.clone(), agents.clone(), projects.clone(), histories.clone(), changes.clone(), save_points);
        Fixture { engine, projects, histories, changes, artifacts, agents }
    }

    fn open_change(fx: &Fixture, project: &Id, workspace_id: &Id, basis: String, baseline_artifact_id: &Id) -> Workspace {
        let history = fx.histories.retrieve_by_name(project, "main").unwrap();
        let change = fx.changes.create(project, &history.id, "work", basis, "", baseline_artifact_id).unwrap();
        fx.engine.begin_change(workspace_id, &change.name).unwrap()
    }

    #[test]
    fn add_move_delete_round_trip() {
        let fx = fixture();
        let creator = Id::new(Kind::User);
        let project = fx.projects.create("p", &creator, "", &fx.agents).unwrap();
        let workspace = fx.engine.create(&project.id, "ws", &creator, "", "main").unwrap();
        open_change(&fx, &project.id, &workspace.id, workspace.basis.clone(), &project.baseline);

        let (workspace, file_id) = fx.engine.add(&workspace.id, &[], "a.txt", crate::internal::content::TEXT_TYPE, "one\n".to_string()).unwrap();
        assert!(workspace.modified_artifacts.contains(&project.root_directory));

        let workspace = fx.engine.move_entry(&workspace.id, &[], "a.txt", &[], "b.txt").unwrap();
        let root = Directory::decode(&fx.artifacts.retrieve_version(&project.root_directory, workspace.working_versions.get(&project.root_directory).unwrap()).unwrap().content).unwrap();
        assert_eq!(root.get("b.txt"), Some(&file_id));
        assert!(!root.contains("a.txt"));

        let (workspace, removed) = fx.engine.delete(&workspace.id, &[], "b.txt").unwrap();
        assert!(removed.contains(&file_id));
        let root = Directory::decode(&fx.artifacts.retrieve_version(&project.root_directory, workspace.working_versions.get(&project.root_directory).unwrap()).unwrap().content).unwrap();
        assert!(!root.contains("b.txt"));
    }

    #[test]
    fn moving_onto_an_existing_name_is_rejected() {
        let fx = fixture();
        let creator = Id::new(Kind::User);
        let project = fx.projects.create("p", &creator, "", &fx.agents).unwrap();
        let workspace = fx.engine.create(&project.id, "ws", &creator, "", "main").unwrap();
        open_change(&fx, &project.id, &workspace.id, workspace.basis.clone(), &project.baseline);

        fx.engine.add(&workspace.id, &[], "a.txt", crate::internal::content::TEXT_TYPE, "1\n".to_string()).unwrap();
        fx.engine.add(&workspace.id, &[], "b.txt", crate::internal::content::TEXT_TYPE, "2\n".to_string()).unwrap();
        let result = fx.engine.move_entry(&workspace.id, &[], "a.txt", &[], "b.txt");
        assert!(matches!(result, Err(DepotError::Conflict(_))));
    }

    #[test]
    fn deleting_the_root_directory_is_rejected() {
        let fx = fixture();
        let creator = Id::new(Kind::User);
        let project = fx.projects.create("p", &creator, "", &fx.agents).unwrap();
        let mut workspace = fx.engine.create(&project.id, "ws", &creator, "", "main").unwrap();

        // `add`/`move` can never alias an existing artifact under a new
        // name, so splice a self-referential binding directly through the
        // artifact store to exercise the guard.
        let mut baseline = Baseline::decode(&fx.artifacts.retrieve_version(&project.baseline, &workspace.baseline_version_id).unwrap().content).unwrap();
        let root_version_id = baseline.versions[&project.root_directory].clone();
        let working_root = fx.artifacts.create_working_version(&project.root_directory, &root_version_id).unwrap();
        let mut root_dir = Directory::decode(&working_root.content).unwrap();
        root_dir.set("loop", project.root_directory.clone());
        fx.artifacts.update_working_version(&project.root_directory, &working_root.id, Some(root_dir.encode().unwrap()), None, None).unwrap();
        let committed_root = fx.artifacts.commit_working_version(&project.root_directory, &working_root.id).unwrap();

        baseline.versions.insert(project.root_directory.clone(), committed_root.id);
        let new_baseline = fx.artifacts.create_version(&project.baseline, baseline.encode().unwrap(), vec![workspace.baseline_version_id.clone()], BTreeMap::new()).unwrap();
        workspace.baseline_version_id = new_baseline.id;
        workspace.change_name = Some("work".to_string());
        fx.engine.persist(&workspace).unwrap();

        let err = fx.engine.delete(&workspace.id, &[], "loop");
        assert!(matches!(err, Err(DepotError::Constraint(_))));
    }

    #[test]
    fn update_merges_disjoint_concurrent_adds_without_conflict() {
        let fx = fixture();
        let creator = Id::new(Kind::User);
        let project = fx.projects.create("p", &creator, "", &fx.agents).unwrap();
        let history = fx.histories.retrieve_by_name(&project.id, "main").unwrap();

        let ws_a = fx.engine.create(&project.id, "a", &creator, "", "main").unwrap();
        let ws_b = fx.engine.create(&project.id, "b", &creator, "", "main").unwrap();

        let change_a = fx.changes.create(&project.id, &history.id, "ca", ws_a.basis.clone(), "", &project.baseline).unwrap();
        fx.engine.begin_change(&ws_a.id, &change_a.name).unwrap();
        fx.engine.add(&ws_a.id, &[], "a.txt", crate::internal::content::TEXT_TYPE, "a\n".to_string()).unwrap();
        let ws_a = fx.engine.save(&ws_a.id, &creator, "a", &[]).unwrap();
        fx.engine.deliver(&ws_a.id).unwrap();

        let change_b = fx.changes.create(&project.id, &history.id, "cb", ws_b.basis.clone(), "", &project.baseline).unwrap();
        fx.engine.begin_change(&ws_b.id, &change_b.name).unwrap();
        fx.engine.add(&ws_b.id, &[], "b.txt", crate::internal::content::TEXT_TYPE, "b\n".to_string()).unwrap();
        let ws_b = fx.engine.save(&ws_b.id, &creator, "b", &[]).unwrap();

        assert!(!fx.engine.is_up_to_date(&ws_b).unwrap());
        let ws_b = fx.engine.update(&ws_b.id).unwrap();
        assert!(ws_b.conflicts.is_empty());
        assert!(ws_b.modified_artifacts.is_empty());
        assert!(fx.engine.is_up_to_date(&ws_b).unwrap());

        let baseline = Baseline::decode(&fx.artifacts.retrieve_version(&project.baseline, &ws_b.baseline_version_id).unwrap().content).unwrap();
        let root = Directory::decode(&fx.artifacts.retrieve_version(&project.root_directory, &baseline.versions[&project.root_directory]).unwrap().content).unwrap();
        assert!(root.contains("a.txt"));
        assert!(root.contains("b.txt"));

        fx.engine.deliver(&ws_b.id).unwrap();
        let history = fx.histories.retrieve_by_name(&project.id, "main").unwrap();
        assert_eq!(history.step_ids.len(), 3);
    }

    #[test]
    fn delete_workspace_aborts_its_working_versions_and_removes_the_record() {
        let fx = fixture();
        let creator = Id::new(Kind::User);
        let project = fx.projects.create("p", &creator, "", &fx.agents).unwrap();
        let workspace = fx.engine.create(&project.id, "ws", &creator, "", "main").unwrap();
        open_change(&fx, &project.id, &workspace.id, workspace.basis.clone(), &project.baseline);

        let (workspace, file_id) = fx.engine.add(&workspace.id, &[], "a.txt", crate::internal::content::TEXT_TYPE, "one\n".to_string()).unwrap();
        let working_root_id = workspace.working_versions.get(&project.root_directory).unwrap().clone();
        let working_file_id = workspace.working_versions.get(&file_id).unwrap().clone();

        fx.engine.delete_workspace(&workspace.id).unwrap();

        assert!(matches!(fx.engine.retrieve(&workspace.id), Err(DepotError::NotFound(_))));
        let root_version = fx.artifacts.retrieve_version(&project.root_directory, &working_root_id).unwrap();
        assert_eq!(root_version.status, crate::internal::artifact::VersionStatus::Aborted);
        assert!(root_version.content.is_empty());
        let file_version = fx.artifacts.retrieve_version(&file_id, &working_file_id).unwrap();
        assert_eq!(file_version.status, crate::internal::artifact::VersionStatus::Aborted);
    }

    #[test]
    fn abort_change_rolls_back_to_the_pre_change_baseline() {
        let fx = fixture();
        let creator = Id::new(Kind::User);
        let project = fx.projects.create("p", &creator, "", &fx.agents).unwrap();
        let workspace = fx.engine.create(&project.id, "ws", &creator, "", "main").unwrap();
        let original_baseline_version_id = workspace.baseline_version_id.clone();
        let change = fx.changes.create(&project.id, &fx.histories.retrieve_by_name(&project.id, "main").unwrap().id, "work", workspace.basis.clone(), "", &project.baseline).unwrap();
        let workspace = fx.engine.begin_change(&workspace.id, &change.name).unwrap();

        let (workspace, file_id) = fx.engine.add(&workspace.id, &[], "a.txt", crate::internal::content::TEXT_TYPE, "one\n".to_string()).unwrap();
        let working_file_id = workspace.working_versions.get(&file_id).unwrap().clone();
        assert!(!workspace.modified_artifacts.is_empty());

        let workspace = fx.engine.abort_change(&workspace.id).unwrap();

        assert_eq!(workspace.baseline_version_id, original_baseline_version_id);
        assert!(workspace.working_versions.is_empty());
        assert!(workspace.modified_artifacts.is_empty());
        assert!(workspace.change_name.is_none());

        let change = fx.changes.retrieve_by_name(&project.id, &fx.histories.retrieve_by_name(&project.id, "main").unwrap().id, "work").unwrap();
        assert_eq!(change.status, ChangeStatus::Aborted);

        let file_version = fx.artifacts.retrieve_version(&file_id, &working_file_id).unwrap();
        assert_eq!(file_version.status, crate::internal::artifact::VersionStatus::Aborted);
    }
}
