//! Scoped action/permission model.
//!
//! An [`Action`] names a level of access over a scope (a project, the depot,
//! or globally). Authorization asks whether any of a user's *granted*
//! actions *covers* a *requested* action.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DepotError;

/// The breadth of a scope: `Project` is narrowest, `Global` is broadest.
/// Ordering matters for the "wider scope subsumes narrower" coverage rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScopeType {
    Project,
    Depot,
    Global,
}

impl ScopeType {
    const fn letter(&self) -> char {
        match self {
            ScopeType::Project => 'P',
            ScopeType::Depot => 'D',
            ScopeType::Global => 'G',
        }
    }

    fn from_letter(c: char) -> Option<ScopeType> {
        match c.to_ascii_uppercase() {
            'P' => Some(ScopeType::Project),
            'D' => Some(ScopeType::Depot),
            'G' => Some(ScopeType::Global),
            _ => None,
        }
    }
}

/// The strength of access requested or granted. Ordering reflects that a
/// higher level subsumes every lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Read,
    Write,
    Delete,
    Admin,
}

impl Level {
    const fn letter(&self) -> char {
        match self {
            Level::Read => 'R',
            Level::Write => 'W',
            Level::Delete => 'D',
            Level::Admin => 'A',
        }
    }

    fn from_letter(c: char) -> Option<Level> {
        match c.to_ascii_uppercase() {
            'R' => Some(Level::Read),
            'W' => Some(Level::Write),
            'D' => Some(Level::Delete),
            'A' => Some(Level::Admin),
            _ => None,
        }
    }
}

/// A scoped action: `(scope_type, scope_name, level)`.
///
/// The wildcard scope name `"*"` in a granted action matches any requested
/// scope name of the same scope type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub scope_type: ScopeType,
    pub scope_name: String,
    pub level: Level,
}

impl Action {
    pub fn new(scope_type: ScopeType, scope_name: impl Into<String>, level: Level) -> Self {
        Action { scope_type, scope_name: scope_name.into(), level }
    }

    /// Does `self` (a granted action) cover `requested`?
    ///
    /// `G` covers `R` iff `G.level >= R.level` AND (`G.scope_type >
    /// R.scope_type` OR (`G.scope_type == R.scope_type` AND
    /// (`G.scope_name == "*"` OR `G.scope_name == R.scope_name`))).
    pub fn covers(&self, requested: &Action) -> bool {
        if self.level < requested.level {
            return false;
        }
        if self.scope_type > requested.scope_type {
            return true;
        }
        self.scope_type == requested.scope_type
            && (self.scope_name == "*" || self.scope_name == requested.scope_name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", self.scope_type.letter(), self.level.letter(), self.scope_name)
    }
}

impl FromStr for Action {
    type Err = DepotError;

    /// Parse the canonical surface form `[GgDdPp][RrWwDdAa]:<name>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (header, name) = s.split_once(':').ok_or_else(|| {
            DepotError::InvalidParameter(format!("`{s}` is not a valid action (missing `:`)"))
        })?;
        let mut chars = header.chars();
        let scope_char = chars.next();
        let level_char = chars.next();
        if chars.next().is_some() {
            return Err(DepotError::InvalidParameter(format!("`{s}` is not a valid action")));
        }
        let scope_type = scope_char
            .and_then(ScopeType::from_letter)
            .ok_or_else(|| DepotError::InvalidParameter(format!("`{s}` has an invalid scope letter")))?;
        let level = level_char
            .and_then(Level::from_letter)
            .ok_or_else(|| DepotError::InvalidParameter(format!("`{s}` has an invalid level letter")))?;
        if name.is_empty() {
            return Err(DepotError::InvalidParameter(format!("`{s}` is missing a scope name")));
        }
        Ok(Action::new(scope_type, name, level))
    }
}

/// Authorize `requested` against a set of granted actions.
pub fn is_authorized(granted: &[Action], requested: &Action) -> bool {
    granted.iter().any(|g| g.covers(requested))
}
