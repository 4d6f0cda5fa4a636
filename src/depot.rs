//! The `Depot` aggregate root: wires the KV store, the agent registry, and
//! every stash/engine into the one handle an embedding application holds.

use std::sync::Arc;

use crate::internal::agents::AgentRegistry;
use crate::internal::artifact::store::ArtifactStore;
use crate::internal::stash::change::ChangeStash;
use crate::internal::stash::history::HistoryStash;
use crate::internal::stash::project::ProjectStash;
use crate::internal::stash::savepoint::SavePointStash;
use crate::internal::user::UserStore;
use crate::internal::workspace::WorkspaceEngine;
use crate::kv::KvStore;
use crate::pvs::PvsResolver;

/// A fully wired depot: every stash and engine shares one backing
/// [`KvStore`] and one [`AgentRegistry`].
pub struct Depot {
    pub artifacts: Arc<ArtifactStore>,
    pub agents: Arc<AgentRegistry>,
    pub projects: Arc<ProjectStash>,
    pub histories: Arc<HistoryStash>,
    pub changes: Arc<ChangeStash>,
    pub save_points: Arc<SavePointStash>,
    pub users: Arc<UserStore>,
    pub workspaces: Arc<WorkspaceEngine>,
    pub pvs: PvsResolver,
}

impl Depot {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let artifacts = Arc::new(ArtifactStore::new(store.clone()));
        let agents = Arc::new(AgentRegistry::with_builtin_agents());
        let projects = Arc::new(ProjectStash::new(store.clone(), artifacts.clone()));
        let histories = Arc::new(HistoryStash::new(store.clone(), artifacts.clone()));
        let changes = Arc::new(ChangeStash::new(store.clone()));
        let save_points = Arc::new(SavePointStash::new(store.clone()));
        let users = Arc::new(UserStore::new(store.clone()));
        let workspaces = Arc::new(WorkspaceEngine::new(
            store.clone(),
            artifacts.clone(),
            agents.clone(),
            projects.clone(),
            histories.clone(),
            changes.clone(),
            save_points.clone(),
        ));
        let pvs = PvsResolver::new(histories.clone(), changes.clone(), save_points.clone());

        Depot { artifacts, agents, projects, histories, changes, save_points, users, workspaces, pvs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{Id, Kind};
    use crate::kv::memory::MemoryKv;

    #[test]
    fn new_depot_can_create_a_project_and_a_workspace() {
        let depot = Depot::new(Arc::new(MemoryKv::new()));
        let project = depot.projects.create("demo", &Id::new(Kind::User), "", &depot.agents).unwrap();
        let workspace = depot.workspaces.create(&project.id, "ws1", &Id::new(Kind::User), "", "main").unwrap();
        assert_eq!(workspace.history_name, "main");
        assert!(depot.workspaces.is_up_to_date(&workspace).unwrap());
    }
}
