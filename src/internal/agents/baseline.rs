//! Three-way merge over a [`Baseline`]'s artifact-ID -> version-ID map.
//!
//! Mirrors [`super::directory::DirectoryAgent`]'s key-wise classification,
//! applied to artifact IDs instead of names. A `ModMod` conflict here is
//! provisional: the workspace engine resolves it by recursively invoking the
//! affected artifact's own agent, and only keeps the conflict if that
//! recursive merge itself produces one.

use std::collections::BTreeMap;

use crate::errors::{DepotError, Result};
use crate::id::Id;
use crate::internal::content::{Baseline, BASELINE_TYPE};

use super::{Agent, ConflictKind, MergeConflict, MergeOutcome};

pub struct BaselineAgent;

impl Agent for BaselineAgent {
    fn type_tag(&self) -> &'static str {
        BASELINE_TYPE
    }

    fn merge(&self, artifact_id: &Id, ancestor: &str, source_version: &Id, source: &str, target_version: &Id, target: &str) -> Result<MergeOutcome> {
        let ancestor = Baseline::decode(ancestor)?;
        let source = Baseline::decode(source)?;
        let target = Baseline::decode(target)?;

        if source.root_directory != ancestor.root_directory || target.root_directory != ancestor.root_directory {
            return Err(DepotError::Internal("baseline merge requires all three baselines to share a root directory artifact".into()));
        }

        let mut keys: Vec<&Id> = ancestor.versions.keys().chain(source.versions.keys()).chain(target.versions.keys()).collect();
        keys.sort();
        keys.dedup();

        let mut merged: BTreeMap<Id, Id> = BTreeMap::new();
        let mut conflicts = Vec::new();

        for key in keys {
            let anc = ancestor.versions.get(key);
            let src = source.versions.get(key);
            let tgt = target.versions.get(key);

            match anc {
                None => match (src, tgt) {
                    (Some(s), None) => {
                        merged.insert(key.clone(), s.clone());
                    }
                    (None, Some(t)) => {
                        merged.insert(key.clone(), t.clone());
                    }
                    (Some(s), Some(t)) => {
                        if s == t {
                            merged.insert(key.clone(), s.clone());
                        } else {
                            merged.insert(key.clone(), t.clone());
                            conflicts.push(conflict(artifact_id, key, s, t, ConflictKind::ModMod));
                        }
                    }
                    (None, None) => {}
                },
                Some(anc_version) => {
                    let src_changed = src.map(|s| s != anc_version);
                    let tgt_changed = tgt.map(|t| t != anc_version);
                    match (src_changed, tgt_changed) {
                        (None, None) => {}
                        (None, Some(false)) | (Some(false), None) => {}
                        (None, Some(true)) => {
                            conflicts.push(conflict(artifact_id, key, anc_version, tgt.unwrap(), ConflictKind::DelMod));
                            merged.insert(key.clone(), tgt.unwrap().clone());
                        }
                        (Some(true), None) => {
                            conflicts.push(conflict(artifact_id, key, src.unwrap(), anc_version, ConflictKind::ModDel));
                            merged.insert(key.clone(), src.unwrap().clone());
                        }
                        (Some(false), Some(false)) => {
                            merged.insert(key.clone(), anc_version.clone());
                        }
                        (Some(false), Some(true)) => {
                            merged.insert(key.clone(), tgt.unwrap().clone());
                        }
                        (Some(true), Some(false)) => {
                            merged.insert(key.clone(), src.unwrap().clone());
                        }
                        (Some(true), Some(true)) => {
                            let s = src.unwrap();
                            let t = tgt.unwrap();
                            if s == t {
                                merged.insert(key.clone(), s.clone());
                            } else {
                                merged.insert(key.clone(), t.clone());
                                conflicts.push(conflict(artifact_id, key, s, t, ConflictKind::ModMod));
                            }
                        }
                    }
                }
            }
        }

        let proposed = Baseline { root_directory: ancestor.root_directory, versions: merged };
        Ok(MergeOutcome { proposed_content: proposed.encode()?, conflicts })
    }
}

fn conflict(baseline_id: &Id, entry_artifact: &Id, source_version: &Id, target_version: &Id, kind: ConflictKind) -> MergeConflict {
    let details = serde_json::to_string(&serde_json::json!({ "kind": kind, "entry_artifact_id": entry_artifact })).unwrap_or_default();
    MergeConflict::new(baseline_id.clone(), BASELINE_TYPE, source_version.clone(), target_version.clone(), details)
}
