//! Three-way merge over a [`Directory`]'s name -> artifact-ID bindings.
//!
//! Classifies each name the same way [`super::baseline::BaselineAgent`]
//! classifies each artifact ID in a baseline's version map: unchanged,
//! modified, removed, or added, on each side independently, then combines
//! the two classifications.

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::id::Id;
use crate::internal::content::{Directory, DirectoryEntry, DIRECTORY_TYPE};

use super::{Agent, ConflictKind, MergeConflict, MergeOutcome};

pub struct DirectoryAgent;

impl Agent for DirectoryAgent {
    fn type_tag(&self) -> &'static str {
        DIRECTORY_TYPE
    }

    fn merge(&self, artifact_id: &Id, ancestor: &str, source_version: &Id, source: &str, target_version: &Id, target: &str) -> Result<MergeOutcome> {
        let ancestor = as_map(&Directory::decode(ancestor)?);
        let source = as_map(&Directory::decode(source)?);
        let target = as_map(&Directory::decode(target)?);

        let mut names: Vec<&String> = ancestor.keys().chain(source.keys()).chain(target.keys()).collect();
        names.sort();
        names.dedup();

        let mut merged: BTreeMap<String, Id> = BTreeMap::new();
        let mut conflicts = Vec::new();

        for name in names {
            let anc = ancestor.get(name);
            let src = source.get(name);
            let tgt = target.get(name);

            match anc {
                None => match (src, tgt) {
                    (Some(s), None) => {
                        merged.insert(name.clone(), s.clone());
                    }
                    (None, Some(t)) => {
                        merged.insert(name.clone(), t.clone());
                    }
                    (Some(s), Some(t)) => {
                        if s == t {
                            merged.insert(name.clone(), s.clone());
                        } else {
                            merged.insert(name.clone(), t.clone());
                            conflicts.push(conflict(artifact_id, name, s, t, ConflictKind::ModMod));
                        }
                    }
                    (None, None) => {}
                },
                Some(anc_id) => {
                    let src_changed = src.map(|s| s != anc_id);
                    let tgt_changed = tgt.map(|t| t != anc_id);
                    match (src_changed, tgt_changed) {
                        (None, None) => {}
                        (None, Some(false)) | (Some(false), None) => {}
                        (None, Some(true)) => {
                            conflicts.push(conflict(artifact_id, name, anc_id, tgt.unwrap(), ConflictKind::DelMod));
                            merged.insert(name.clone(), tgt.unwrap().clone());
                        }
                        (Some(true), None) => {
                            conflicts.push(conflict(artifact_id, name, src.unwrap(), anc_id, ConflictKind::ModDel));
                            merged.insert(name.clone(), src.unwrap().clone());
                        }
                        (Some(false), Some(false)) => {
                            merged.insert(name.clone(), anc_id.clone());
                        }
                        (Some(false), Some(true)) => {
                            merged.insert(name.clone(), tgt.unwrap().clone());
                        }
                        (Some(true), Some(false)) => {
                            merged.insert(name.clone(), src.unwrap().clone());
                        }
                        (Some(true), Some(true)) => {
                            let s = src.unwrap();
                            let t = tgt.unwrap();
                            if s == t {
                                merged.insert(name.clone(), s.clone());
                            } else {
                                merged.insert(name.clone(), t.clone());
                                conflicts.push(conflict(artifact_id, name, s, t, ConflictKind::ModMod));
                            }
                        }
                    }
                }
            }
        }

        let proposed = Directory {
            entries: merged.into_iter().map(|(name, artifact_id)| DirectoryEntry { name, artifact_id }).collect(),
        };
        Ok(MergeOutcome { proposed_content: proposed.encode()?, conflicts })
    }
}

fn as_map(dir: &Directory) -> BTreeMap<String, Id> {
    dir.entries.iter().map(|e| (e.name.clone(), e.artifact_id.clone())).collect()
}

fn conflict(dir_artifact_id: &Id, name: &str, source_binding: &Id, target_binding: &Id, kind: ConflictKind) -> MergeConflict {
    let details = serde_json::to_string(&serde_json::json!({ "kind": kind, "name": name })).unwrap_or_default();
    MergeConflict::new(dir_artifact_id.clone(), DIRECTORY_TYPE, source_binding.clone(), target_binding.clone(), details)
}
