//! Artifacts and artifact versions: the immutable, content-addressed-by-ID
//! backbone every other depot component builds on.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::Id;

/// Lifecycle status of an [`ArtifactVersion`]. `Working` is the only
/// non-terminal state; `Committed` and `Aborted` never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionStatus {
    Working,
    Committed,
    Aborted,
}

/// An immutable logical object: identity, type, and the append-only list of
/// versions recorded against it. Everything but `version_ids` is fixed at
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Id,
    pub artifact_type: String,
    pub creator: Id,
    pub created_at: DateTime<Utc>,
    pub project: Id,
    pub metadata: BTreeMap<String, String>,
    pub version_ids: Vec<Id>,
}

/// One version of an [`Artifact`]'s content. `parent_versions` forms a DAG
/// confined to this artifact's `version_ids`; a `Working` version always has
/// exactly one parent and that parent is always `Committed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub id: Id,
    pub artifact_id: Id,
    pub artifact_type: String,
    pub creator: Id,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub parent_versions: Vec<Id>,
    pub metadata: BTreeMap<String, String>,
    pub status: VersionStatus,
}

impl ArtifactVersion {
    pub fn is_working(&self) -> bool {
        matches!(self.status, VersionStatus::Working)
    }
}
