//! End-to-end scenarios driven entirely through the public `Depot` surface.

use std::sync::Arc;

use polytope_depot::depot::Depot;
use polytope_depot::id::{Id, Kind};
use polytope_depot::kv::memory::MemoryKv;
use polytope_depot::permission::{Action, Level, ScopeType};

fn depot() -> Depot {
    Depot::new(Arc::new(MemoryKv::new()))
}

/// S4 — branching a history at a named step copies its baseline IDs
/// verbatim and records the branch-point PVS as the new history's basis.
#[test]
fn s4_branch_copies_baseline_from_branch_point() {
    let depot = depot();
    let project = depot.projects.create("proj", &Id::new(Kind::User), "", &depot.agents).unwrap();
    let main = depot.histories.retrieve_by_name(&project.id, "main").unwrap();
    let step0 = depot.histories.tip(&main).unwrap();

    let basis = format!("history({}@main@0)", project.id);
    let alt = depot.histories.branch(&project.id, "alt", basis.clone(), &step0).unwrap();

    assert_eq!(alt.step_ids.len(), 1);
    assert_eq!(alt.basis, basis);
    let alt_step0 = depot.histories.retrieve_step(&alt.step_ids[0]).unwrap();
    assert_eq!(alt_step0.baseline_version_id, step0.baseline_version_id);
}

/// S3 — a Project-scoped Admin grant covers same-project reads but neither
/// a different project nor a Global request.
#[test]
fn s3_permission_inclusion() {
    let granted = vec![Action::new(ScopeType::Project, "foo", Level::Admin)];
    assert!(polytope_depot::permission::is_authorized(&granted, &Action::new(ScopeType::Project, "foo", Level::Read)));
    assert!(!polytope_depot::permission::is_authorized(&granted, &Action::new(ScopeType::Project, "bar", Level::Read)));
    assert!(!polytope_depot::permission::is_authorized(&granted, &Action::new(ScopeType::Global, "*", Level::Admin)));
}

/// A full single-workspace lifecycle: add a file, save, and deliver,
/// landing a new history step whose baseline includes the new binding.
#[test]
fn workspace_add_save_deliver_lands_a_history_step() {
    let depot = depot();
    let creator = Id::new(Kind::User);
    let project = depot.projects.create("proj", &creator, "", &depot.agents).unwrap();
    let history = depot.histories.retrieve_by_name(&project.id, "main").unwrap();

    let workspace = depot.workspaces.create(&project.id, "ws", &creator, "", "main").unwrap();
    let change = depot.changes.create(&project.id, &history.id, "add-readme", workspace.basis.clone(), "", &project.baseline).unwrap();
    depot.workspaces.begin_change(&workspace.id, &change.name).unwrap();

    let (workspace, readme_id) = depot.workspaces.add(&workspace.id, &[], "README", "text", "hello\n".to_string()).unwrap();
    assert!(workspace.modified_artifacts.contains(&project.root_directory));

    let workspace = depot.workspaces.save(&workspace.id, &creator, "add readme", &[]).unwrap();
    assert!(workspace.modified_artifacts.is_empty());

    let workspace = depot.workspaces.deliver(&workspace.id).unwrap();
    assert!(workspace.change_name.is_none());

    let history = depot.histories.retrieve_by_name(&project.id, "main").unwrap();
    assert_eq!(history.step_ids.len(), 2);
    let tip = depot.histories.tip(&history).unwrap();
    let baseline = polytope_depot::internal::content::Baseline::decode(
        &depot.artifacts.retrieve_version(&tip.baseline_artifact_id, &tip.baseline_version_id).unwrap().content,
    )
    .unwrap();
    assert!(baseline.versions.contains_key(&readme_id));
}

/// S6 — a workspace whose basis is behind the history tip cannot deliver
/// until it updates; update merges cleanly when the two workspaces touched
/// disjoint names, and the subsequent deliver lands a new step.
#[test]
fn s6_deliver_requires_up_to_date_then_succeeds_after_update() {
    let depot = depot();
    let creator = Id::new(Kind::User);
    let project = depot.projects.create("proj", &creator, "", &depot.agents).unwrap();
    let history = depot.histories.retrieve_by_name(&project.id, "main").unwrap();

    // Both workspaces fork from the same step-0 tip.
    let ws_a = depot.workspaces.create(&project.id, "a", &creator, "", "main").unwrap();
    let ws_b = depot.workspaces.create(&project.id, "b", &creator, "", "main").unwrap();

    // A lands its change first.
    let change_a = depot.changes.create(&project.id, &history.id, "change-a", ws_a.basis.clone(), "", &project.baseline).unwrap();
    depot.workspaces.begin_change(&ws_a.id, &change_a.name).unwrap();
    depot.workspaces.add(&ws_a.id, &[], "a.txt", "text", "from a\n".to_string()).unwrap();
    let ws_a = depot.workspaces.save(&ws_a.id, &creator, "add a.txt", &[]).unwrap();
    depot.workspaces.deliver(&ws_a.id).unwrap();

    // B, still rooted at step 0, makes its own disjoint change.
    let change_b = depot.changes.create(&project.id, &history.id, "change-b", ws_b.basis.clone(), "", &project.baseline).unwrap();
    depot.workspaces.begin_change(&ws_b.id, &change_b.name).unwrap();
    depot.workspaces.add(&ws_b.id, &[], "b.txt", "text", "from b\n".to_string()).unwrap();
    let ws_b = depot.workspaces.save(&ws_b.id, &creator, "add b.txt", &[]).unwrap();

    assert!(!depot.workspaces.is_up_to_date(&ws_b).unwrap());
    let deliver_err = depot.workspaces.deliver(&ws_b.id);
    assert!(deliver_err.is_err());

    let ws_b = depot.workspaces.update(&ws_b.id).unwrap();
    assert!(ws_b.conflicts.is_empty());
    assert!(ws_b.modified_artifacts.is_empty());
    assert!(depot.workspaces.is_up_to_date(&ws_b).unwrap());

    let ws_b = depot.workspaces.deliver(&ws_b.id).unwrap();
    assert!(ws_b.change_name.is_none());

    let history = depot.histories.retrieve_by_name(&project.id, "main").unwrap();
    assert_eq!(history.step_ids.len(), 3);
    let step2 = depot.histories.tip(&history).unwrap();
    assert!(depot.artifacts.version_is_ancestor(&project.baseline, &ws_a.baseline_version_id, &step2.baseline_version_id).unwrap());
}

/// Boundary behavior: the root directory can never be deleted, and moving
/// an entry onto an existing name is rejected as a Conflict.
#[test]
fn boundary_behaviors() {
    let depot = depot();
    let creator = Id::new(Kind::User);
    let project = depot.projects.create("proj", &creator, "", &depot.agents).unwrap();
    let history = depot.histories.retrieve_by_name(&project.id, "main").unwrap();
    let workspace = depot.workspaces.create(&project.id, "ws", &creator, "", "main").unwrap();
    let change = depot.changes.create(&project.id, &history.id, "work", workspace.basis.clone(), "", &project.baseline).unwrap();
    depot.workspaces.begin_change(&workspace.id, &change.name).unwrap();

    assert!(matches!(depot.workspaces.delete(&workspace.id, &[], "missing"), Err(polytope_depot::DepotError::NotFound(_))));

    let (workspace, _) = depot.workspaces.add(&workspace.id, &[], "one.txt", "text", "1\n".to_string()).unwrap();
    depot.workspaces.add(&workspace.id, &[], "two.txt", "text", "2\n".to_string()).unwrap();
    let result = depot.workspaces.move_entry(&workspace.id, &[], "one.txt", &[], "two.txt");
    assert!(matches!(result, Err(polytope_depot::DepotError::Conflict(_))));
}
