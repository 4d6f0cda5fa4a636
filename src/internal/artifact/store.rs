//! Artifact store: creation, working-version lifecycle, ancestry queries,
//! and the nearest-common-ancestor algorithm merges are built on.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;

use crate::errors::{DepotError, Result};
use crate::id::{Id, Kind};
use crate::kv::{self, ColumnFamily, KvStore, WriteBatch};

use super::{Artifact, ArtifactVersion, VersionStatus};

pub struct ArtifactStore {
    store: Arc<dyn KvStore>,
}

impl ArtifactStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        ArtifactStore { store }
    }

    pub fn retrieve_artifact(&self, artifact_id: &Id) -> Result<Artifact> {
        kv::get_json(self.store.as_ref(), ColumnFamily::Artifacts, artifact_id.as_str())?
            .ok_or_else(|| DepotError::not_found(format!("artifact `{artifact_id}` not found")))
    }

    pub fn retrieve_version(&self, artifact_id: &Id, version_id: &Id) -> Result<ArtifactVersion> {
        let version: ArtifactVersion = kv::get_json(self.store.as_ref(), ColumnFamily::Versions, version_id.as_str())?
            .ok_or_else(|| DepotError::not_found(format!("version `{version_id}` not found")))?;
        if &version.artifact_id != artifact_id {
            return Err(DepotError::NotFound(format!("version `{version_id}` does not belong to artifact `{artifact_id}`")));
        }
        Ok(version)
    }

    pub fn retrieve_version_status(&self, artifact_id: &Id, version_id: &Id) -> Result<VersionStatus> {
        Ok(self.retrieve_version(artifact_id, version_id)?.status)
    }

    /// Create a brand-new artifact with its first, already-Committed version.
    pub fn create_artifact(&self, project: &Id, artifact_type: &str, initial_content: String, metadata: BTreeMap<String, String>) -> Result<(Artifact, ArtifactVersion)> {
        let artifact_id = Id::new(Kind::Artifact);
        let version_id = Id::new(Kind::Version);
        let now = Utc::now();

        let version = ArtifactVersion {
            id: version_id.clone(),
            artifact_id: artifact_id.clone(),
            artifact_type: artifact_type.to_string(),
            creator: project.clone(),
            created_at: now,
            content: initial_content,
            parent_versions: Vec::new(),
            metadata: metadata.clone(),
            status: VersionStatus::Committed,
        };
        let artifact = Artifact {
            id: artifact_id.clone(),
            artifact_type: artifact_type.to_string(),
            creator: project.clone(),
            created_at: now,
            project: project.clone(),
            metadata,
            version_ids: vec![version_id],
        };

        let mut batch = WriteBatch::new();
        batch.put_json(ColumnFamily::Artifacts, artifact.id.as_str(), &artifact)?;
        batch.put_json(ColumnFamily::Versions, version.id.as_str(), &version)?;
        self.store.write_batch(batch)?;

        Ok((artifact, version))
    }

    /// Create a new, already-Committed version with explicit parents (used
    /// by merge materialization once a Working version is committed, and by
    /// callers building a version chain directly).
    pub fn create_version(&self, artifact_id: &Id, content: String, parents: Vec<Id>, metadata: BTreeMap<String, String>) -> Result<ArtifactVersion> {
        let mut artifact = self.retrieve_artifact(artifact_id)?;
        for parent in &parents {
            let parent_version = self.retrieve_version(artifact_id, parent)?;
            if !matches!(parent_version.status, VersionStatus::Committed) {
                return Err(DepotError::constraint(format!("parent version `{parent}` is not Committed")));
            }
        }

        let version = ArtifactVersion {
            id: Id::new(Kind::Version),
            artifact_id: artifact_id.clone(),
            artifact_type: artifact.artifact_type.clone(),
            creator: artifact.creator.clone(),
            created_at: Utc::now(),
            content,
            parent_versions: parents,
            metadata,
            status: VersionStatus::Committed,
        };
        artifact.version_ids.push(version.id.clone());

        let mut batch = WriteBatch::new();
        batch.put_json(ColumnFamily::Artifacts, artifact.id.as_str(), &artifact)?;
        batch.put_json(ColumnFamily::Versions, version.id.as_str(), &version)?;
        self.store.write_batch(batch)?;

        Ok(version)
    }

    /// Create a Working version parented at `base_version`, which must be Committed.
    pub fn create_working_version(&self, artifact_id: &Id, base_version: &Id) -> Result<ArtifactVersion> {
        let mut artifact = self.retrieve_artifact(artifact_id)?;
        let base = self.retrieve_version(artifact_id, base_version)?;
        if !matches!(base.status, VersionStatus::Committed) {
            return Err(DepotError::constraint(format!("base version `{base_version}` is not Committed")));
        }

        let version = ArtifactVersion {
            id: Id::new(Kind::Version),
            artifact_id: artifact_id.clone(),
            artifact_type: artifact.artifact_type.clone(),
            creator: artifact.creator.clone(),
            created_at: Utc::now(),
            content: base.content.clone(),
            parent_versions: vec![base_version.clone()],
            metadata: base.metadata.clone(),
            status: VersionStatus::Working,
        };
        artifact.version_ids.push(version.id.clone());

        let mut batch = WriteBatch::new();
        batch.put_json(ColumnFamily::Artifacts, artifact.id.as_str(), &artifact)?;
        batch.put_json(ColumnFamily::Versions, version.id.as_str(), &version)?;
        self.store.write_batch(batch)?;

        Ok(version)
    }

    pub fn update_working_version(&self, artifact_id: &Id, version_id: &Id, content: Option<String>, metadata: Option<BTreeMap<String, String>>, parents: Option<Vec<Id>>) -> Result<ArtifactVersion> {
        let mut version = self.retrieve_version(artifact_id, version_id)?;
        if !version.is_working() {
            return Err(DepotError::constraint(format!("version `{version_id}` is not Working")));
        }
        if let Some(content) = content {
            version.content = content;
        }
        if let Some(metadata) = metadata {
            version.metadata = metadata;
        }
        if let Some(parents) = parents {
            version.parent_versions = parents;
        }
        kv::put_json(self.store.as_ref(), ColumnFamily::Versions, version.id.as_str(), &version)?;
        Ok(version)
    }

    pub fn commit_working_version(&self, artifact_id: &Id, version_id: &Id) -> Result<ArtifactVersion> {
        let mut version = self.retrieve_version(artifact_id, version_id)?;
        if !version.is_working() {
            return Err(DepotError::constraint(format!("version `{version_id}` is not Working")));
        }
        version.status = VersionStatus::Committed;
        kv::put_json(self.store.as_ref(), ColumnFamily::Versions, version.id.as_str(), &version)?;
        Ok(version)
    }

    /// Terminally abort a Working version, erasing its content.
    pub fn abort_working_version(&self, artifact_id: &Id, version_id: &Id) -> Result<ArtifactVersion> {
        let mut version = self.retrieve_version(artifact_id, version_id)?;
        if !version.is_working() {
            return Err(DepotError::constraint(format!("version `{version_id}` is not Working")));
        }
        version.content.clear();
        version.status = VersionStatus::Aborted;
        kv::put_json(self.store.as_ref(), ColumnFamily::Versions, version.id.as_str(), &version)?;
        Ok(version)
    }

    /// Reflexive-transitive closure of `parent_versions`, starting from `version_id`.
    pub fn all_ancestors(&self, artifact_id: &Id, version_id: &Id) -> Result<HashSet<Id>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(version_id.clone());
        queue.push_back(version_id.clone());
        while let Some(current) = queue.pop_front() {
            let version = self.retrieve_version(artifact_id, &current)?;
            for parent in version.parent_versions {
                if visited.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(visited)
    }

    /// Is `candidate_ancestor` in the reflexive-transitive closure of
    /// `candidate_descendant`'s parents? BFS from the descendant, early-exit
    /// on match.
    pub fn version_is_ancestor(&self, artifact_id: &Id, candidate_ancestor: &Id, candidate_descendant: &Id) -> Result<bool> {
        if candidate_ancestor == candidate_descendant {
            return Ok(true);
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(candidate_descendant.clone());
        queue.push_back(candidate_descendant.clone());
        while let Some(current) = queue.pop_front() {
            let version = self.retrieve_version(artifact_id, &current)?;
            for parent in version.parent_versions {
                if &parent == candidate_ancestor {
                    return Ok(true);
                }
                if visited.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(false)
    }

    /// Nearest common ancestor of `s` and `t`, both versions of `artifact_id`.
    ///
    /// Two expanding BFS frontiers are grown in lockstep: at each step the
    /// frontier with the smaller visited set is advanced by one node (ties
    /// favor the source frontier), until the two visited sets intersect.
    /// When several equidistant candidates exist, the smallest `Id` among
    /// them is chosen, which is arbitrary but stable for a given store.
    pub fn nca(&self, artifact_id: &Id, s: &Id, t: &Id) -> Result<Id> {
        let mut visited_s: HashSet<Id> = HashSet::from([s.clone()]);
        let mut visited_t: HashSet<Id> = HashSet::from([t.clone()]);
        let mut queue_s: VecDeque<Id> = VecDeque::from([s.clone()]);
        let mut queue_t: VecDeque<Id> = VecDeque::from([t.clone()]);

        loop {
            if let Some(common) = visited_s.intersection(&visited_t).min().cloned() {
                return Ok(common);
            }
            if queue_s.is_empty() && queue_t.is_empty() {
                return Err(DepotError::internal(format!("NCA frontiers exhausted without a common ancestor for `{s}` and `{t}`")));
            }
            let advance_source = match (queue_s.is_empty(), queue_t.is_empty()) {
                (true, false) => false,
                (false, true) => true,
                (false, false) => visited_s.len() <= visited_t.len(),
                (true, true) => unreachable!(),
            };
            if advance_source {
                let current = queue_s.pop_front().expect("checked non-empty");
                for parent in self.retrieve_version(artifact_id, &current)?.parent_versions {
                    if visited_s.insert(parent.clone()) {
                        queue_s.push_back(parent);
                    }
                }
            } else {
                let current = queue_t.pop_front().expect("checked non-empty");
                for parent in self.retrieve_version(artifact_id, &current)?.parent_versions {
                    if visited_t.insert(parent.clone()) {
                        queue_t.push_back(parent);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::memory::MemoryKv;

    fn store() -> ArtifactStore {
        ArtifactStore::new(Arc::new(MemoryKv::new()))
    }

    /// Builds the S5 version DAG: `A<-B<-C, A<-B<-G, A<-D<-E, C<-F, G<-F,
    /// G<-J, E<-I, F<-I, G<-K, I<-K, E<-L, E<-H` and returns a name -> Id map.
    /// `root` is the artifact's already-Committed initial version, used as `A`.
    fn build_s5_dag(store: &ArtifactStore, artifact_id: &Id, root: &ArtifactVersion) -> BTreeMap<&'static str, Id> {
        let mut ids: BTreeMap<&'static str, Id> = BTreeMap::new();
        ids.insert("A", root.id.clone());
        let mut make = |name: &'static str, parents: Vec<&'static str>, ids: &mut BTreeMap<&'static str, Id>| {
            let parent_ids = parents.iter().map(|p| ids[p].clone()).collect();
            let v = store.create_version(artifact_id, name.to_string(), parent_ids, BTreeMap::new()).unwrap();
            ids.insert(name, v.id);
        };
        make("B", vec!["A"], &mut ids);
        make("C", vec!["B"], &mut ids);
        make("G", vec!["B"], &mut ids);
        make("D", vec!["A"], &mut ids);
        make("E", vec!["D"], &mut ids);
        make("F", vec!["C", "G"], &mut ids);
        make("J", vec!["G"], &mut ids);
        make("I", vec!["E", "F"], &mut ids);
        make("K", vec!["G", "I"], &mut ids);
        make("L", vec!["E"], &mut ids);
        make("H", vec!["E"], &mut ids);
        ids
    }

    #[test]
    fn s5_nca_scenario() {
        let store = store();
        let (artifact, root) = store.create_artifact(&Id::new(Kind::Project), "text", "root".into(), BTreeMap::new()).unwrap();
        let ids = build_s5_dag(&store, &artifact.id, &root);

        assert_eq!(store.nca(&artifact.id, &ids["C"], &ids["J"]).unwrap(), ids["B"]);
        assert_eq!(store.nca(&artifact.id, &ids["H"], &ids["J"]).unwrap(), ids["A"]);
        assert_eq!(store.nca(&artifact.id, &ids["H"], &ids["K"]).unwrap(), ids["E"]);
        assert_eq!(store.nca(&artifact.id, &ids["I"], &ids["G"]).unwrap(), ids["G"]);
        assert_eq!(store.nca(&artifact.id, &ids["G"], &ids["I"]).unwrap(), ids["G"]);
    }

    #[test]
    fn working_version_lifecycle() {
        let store = store();
        let (artifact, v0) = store.create_artifact(&Id::new(Kind::Project), "text", "hello".into(), BTreeMap::new()).unwrap();
        let working = store.create_working_version(&artifact.id, &v0.id).unwrap();
        assert!(working.is_working());

        store.update_working_version(&artifact.id, &working.id, Some("updated".into()), None, None).unwrap();
        let committed = store.commit_working_version(&artifact.id, &working.id).unwrap();
        assert_eq!(committed.content, "updated");
        assert!(matches!(committed.status, VersionStatus::Committed));

        assert!(store.commit_working_version(&artifact.id, &working.id).is_err());
    }

    #[test]
    fn abort_clears_content_and_is_terminal() {
        let store = store();
        let (artifact, v0) = store.create_artifact(&Id::new(Kind::Project), "text", "hello".into(), BTreeMap::new()).unwrap();
        let working = store.create_working_version(&artifact.id, &v0.id).unwrap();
        let aborted = store.abort_working_version(&artifact.id, &working.id).unwrap();
        assert!(aborted.content.is_empty());
        assert!(store.update_working_version(&artifact.id, &aborted.id, Some("x".into()), None, None).is_err());
    }

    #[test]
    fn version_is_ancestor_reflexive_and_bfs() {
        let store = store();
        let (artifact, v0) = store.create_artifact(&Id::new(Kind::Project), "text", "a".into(), BTreeMap::new()).unwrap();
        let v1 = store.create_version(&artifact.id, "b".into(), vec![v0.id.clone()], BTreeMap::new()).unwrap();
        let v2 = store.create_version(&artifact.id, "c".into(), vec![v1.id.clone()], BTreeMap::new()).unwrap();

        assert!(store.version_is_ancestor(&artifact.id, &v0.id, &v2.id).unwrap());
        assert!(store.version_is_ancestor(&artifact.id, &v2.id, &v2.id).unwrap());
        assert!(!store.version_is_ancestor(&artifact.id, &v2.id, &v0.id).unwrap());
    }
}
