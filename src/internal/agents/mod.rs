//! Per-content-type codec and three-way merge engine.
//!
//! Generalizes a fixed-enum-of-kinds-with-a-common-interface dispatch (a
//! common pattern for typed object stores) into an open registry of
//! content-type [`Agent`]s, each owning the codec and three-way merge rules
//! for one artifact type tag.

pub mod baseline;
pub mod binary;
pub mod directory;
pub mod text;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{DepotError, Result};
use crate::id::{Id, Kind};

/// The three conflict shapes that arise when merging a versioned mapping
/// (a baseline's version map, or a directory's name bindings): both sides
/// changed the same key differently (`ModMod`), or one side changed it while
/// the other removed it (`ModDel`/`DelMod`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    ModMod,
    ModDel,
    DelMod,
}

/// A single unresolved merge conflict, recorded against the workspace that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
    pub id: Id,
    pub artifact_id: Id,
    pub artifact_type: String,
    pub source_version: Id,
    pub target_version: Id,
    /// Agent-specific, JSON-encoded conflict details.
    pub details: String,
}

impl MergeConflict {
    pub fn new(artifact_id: Id, artifact_type: impl Into<String>, source_version: Id, target_version: Id, details: String) -> Self {
        MergeConflict {
            id: Id::new(Kind::Conflict),
            artifact_id,
            artifact_type: artifact_type.into(),
            source_version,
            target_version,
            details,
        }
    }
}

/// The result of a three-way merge: a proposed merged encoding plus any
/// conflicts that must be surfaced to the user. Agents never fail on
/// conflict; conflicts are data, not errors.
pub struct MergeOutcome {
    pub proposed_content: String,
    pub conflicts: Vec<MergeConflict>,
}

/// Per-content-type codec and merge capability, keyed by artifact type tag.
///
/// `encode`/`decode` round-trip the opaque string stored on an
/// [`crate::internal::artifact::ArtifactVersion`]; `merge` performs the
/// three-way merge appropriate to this content type.
pub trait Agent: Send + Sync {
    /// The artifact type tag this agent handles (`"baseline"`, `"directory"`, ...).
    fn type_tag(&self) -> &'static str;

    /// Three-way merge of `ancestor`, `source`, and `target` encodings, all
    /// known to be of this agent's content type.
    fn merge(&self, artifact_id: &Id, ancestor: &str, source_version: &Id, source: &str, target_version: &Id, target: &str) -> Result<MergeOutcome>;
}

/// Registry of agents keyed by artifact type tag, populated once at
/// `Depot` construction and consulted by the artifact store and workspace
/// engine whenever content of a given type must be merged.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<&'static str, Box<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the four built-in agents.
    pub fn with_builtin_agents() -> Self {
        let mut registry = AgentRegistry::new();
        registry.register(Box::new(baseline::BaselineAgent));
        registry.register(Box::new(directory::DirectoryAgent));
        registry.register(Box::new(text::TextAgent));
        registry.register(Box::new(binary::BinaryAgent));
        registry
    }

    pub fn register(&mut self, agent: Box<dyn Agent>) {
        self.agents.insert(agent.type_tag(), agent);
    }

    pub fn get(&self, type_tag: &str) -> Result<&dyn Agent> {
        self.agents
            .get(type_tag)
            .map(|boxed| boxed.as_ref())
            .ok_or_else(|| DepotError::TypeError(format!("no agent registered for artifact type `{type_tag}`")))
    }
}
