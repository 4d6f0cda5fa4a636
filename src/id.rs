//! Typed identifier scheme.
//!
//! Every entity in the depot is keyed by an opaque string ID carrying a kind
//! prefix (`ver:<uuid>`, `proj:<uuid>`, ...). IDs compare and hash as plain
//! strings; the prefix exists for human readability and light defense against
//! cross-kind mix-ups, not as a type system. A thin newtype over a string
//! with `Display`/`FromStr`, keyed by UUID rather than a content hash, since
//! depot identity is nominal rather than content-addressed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DepotError;

/// The kind of entity an [`Id`] refers to. The discriminant doubles as the
/// string prefix used in the wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Artifact,
    Version,
    Project,
    History,
    HistoryStep,
    Change,
    SavePoint,
    Workspace,
    Conflict,
    User,
    Token,
}

impl Kind {
    pub const fn prefix(&self) -> &'static str {
        match self {
            Kind::Artifact => "art",
            Kind::Version => "ver",
            Kind::Project => "proj",
            Kind::History => "hist",
            Kind::HistoryStep => "step",
            Kind::Change => "chg",
            Kind::SavePoint => "sp",
            Kind::Workspace => "ws",
            Kind::Conflict => "conf",
            Kind::User => "user",
            Kind::Token => "tok",
        }
    }
}

/// A typed, opaque identifier with a kind prefix, e.g. `ver:3a9f...`.
///
/// Equality and hashing are over the full string form, so two `Id`s for
/// different kinds never compare equal even if the UUID portion collides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Generate a fresh, random ID of the given kind.
    pub fn new(kind: Kind) -> Self {
        Id(format!("{}:{}", kind.prefix(), Uuid::new_v4()))
    }

    /// Build an `Id` from an already-known kind and a stable suffix (useful
    /// for deterministic fixtures and tests).
    pub fn from_parts(kind: Kind, suffix: &str) -> Self {
        Id(format!("{}:{}", kind.prefix(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The kind prefix portion of this ID, if it matches a known kind.
    pub fn kind_prefix(&self) -> Option<&str> {
        self.0.split_once(':').map(|(prefix, _)| prefix)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Id {
    type Err = DepotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.split_once(':').is_none_or(|(p, rest)| p.is_empty() || rest.is_empty()) {
            return Err(DepotError::InvalidParameter(format!(
                "`{s}` is not a valid identifier (expected `<kind>:<suffix>`)"
            )));
        }
        Ok(Id(s.to_string()))
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_carries_kind_prefix() {
        let id = Id::new(Kind::Artifact);
        assert_eq!(id.kind_prefix(), Some("art"));
    }

    #[test]
    fn round_trips_through_string() {
        let id = Id::new(Kind::Version);
        let parsed: Id = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!("no-colon-here".parse::<Id>().is_err());
        assert!(":missing-prefix".parse::<Id>().is_err());
        assert!("missing-suffix:".parse::<Id>().is_err());
    }

    #[test]
    fn different_kinds_never_collide() {
        let a = Id::from_parts(Kind::Artifact, "x");
        let b = Id::from_parts(Kind::Version, "x");
        assert_ne!(a, b);
    }
}
