//! Error types for the depot core.
//!
//! This module defines a unified error enumeration used across the artifact
//! store, agents, stashes, PVS resolution, the workspace engine, and the
//! user/session store. It integrates with `thiserror` to provide rich
//! `Display` implementations and error source chaining where applicable.
//!
//! The transport layer is the single place that should map a [`DepotError`]
//! to an HTTP status code or process exit code; everything below this layer
//! propagates `DepotError` unwrapped.

use thiserror::Error;

/// Classification used by the transport boundary to pick an HTTP status
/// code and process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Internal,
    InvalidParameter,
    Permission,
    NotFound,
    Conflict,
    Authentication,
    Parsing,
    Constraint,
    TypeError,
    UserError,
    Client,
}

impl ErrorKind {
    /// HTTP status code for this error kind.
    pub const fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Internal => 500,
            ErrorKind::InvalidParameter => 400,
            ErrorKind::Permission => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Authentication => 401,
            ErrorKind::Constraint => 412,
            ErrorKind::Parsing => 422,
            ErrorKind::TypeError => 417,
            ErrorKind::UserError => 406,
            ErrorKind::Client => 500,
        }
    }

    /// Process exit code for this error kind.
    pub const fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Internal => 121,
            ErrorKind::InvalidParameter => 22,
            ErrorKind::Permission => 13,
            ErrorKind::NotFound => 2,
            ErrorKind::Conflict => 16,
            ErrorKind::Authentication => 13,
            ErrorKind::Constraint => 33,
            ErrorKind::Parsing => 5,
            ErrorKind::TypeError => 34,
            ErrorKind::UserError => 1,
            ErrorKind::Client => 10,
        }
    }
}

/// Unified error enumeration for the depot core.
///
/// - Used across the artifact store, agents, stashes, PVS resolution, the
///   workspace engine, and the user/session store.
/// - Implements `std::error::Error` via `thiserror`.
#[derive(Error, Debug)]
pub enum DepotError {
    /// An invariant that the depot guarantees was found violated. Never
    /// expected to surface from correct callers; indicates a bug.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// A caller-supplied argument was malformed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requester is not authorized to perform the action.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The named entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A name collision or concurrent-create race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Bad credentials or an invalid/expired token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Encoded content could not be decoded.
    #[error("parse error: {0}")]
    Parsing(String),

    /// A state-machine precondition was not met.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// An agent was asked to operate on content of the wrong type.
    #[error("type error: {0}")]
    TypeError(String),

    /// A workflow-level rule was violated (dirty workspace, unresolved
    /// conflicts, stale basis).
    #[error("workflow error: {0}")]
    UserError(String),

    /// Transport-layer issue surfaced through the core (rare; mostly for
    /// symmetry with the external error kind table).
    #[error("client error: {0}")]
    Client(String),

    /// I/O error from configuration loading or the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DepotError {
    /// Project this error onto its external classification.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            DepotError::Internal(_) => ErrorKind::Internal,
            DepotError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            DepotError::Permission(_) => ErrorKind::Permission,
            DepotError::NotFound(_) => ErrorKind::NotFound,
            DepotError::Conflict(_) => ErrorKind::Conflict,
            DepotError::Authentication(_) => ErrorKind::Authentication,
            DepotError::Parsing(_) => ErrorKind::Parsing,
            DepotError::Constraint(_) => ErrorKind::Constraint,
            DepotError::TypeError(_) => ErrorKind::TypeError,
            DepotError::UserError(_) => ErrorKind::UserError,
            DepotError::Client(_) => ErrorKind::Client,
            DepotError::Io(_) => ErrorKind::Internal,
            DepotError::Serde(_) => ErrorKind::Parsing,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        DepotError::Internal(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        DepotError::NotFound(msg.into())
    }

    pub fn constraint(msg: impl Into<String>) -> Self {
        DepotError::Constraint(msg.into())
    }
}

/// Result alias used pervasively across the depot core.
pub type Result<T> = std::result::Result<T, DepotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_mapping_matches_spec_table() {
        assert_eq!(ErrorKind::Internal.http_status(), 500);
        assert_eq!(ErrorKind::Internal.exit_code(), 121);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::NotFound.exit_code(), 2);
        assert_eq!(ErrorKind::UserError.http_status(), 406);
        assert_eq!(ErrorKind::UserError.exit_code(), 1);
    }

    #[test]
    fn error_projects_to_expected_kind() {
        assert_eq!(DepotError::constraint("no open change").kind(), ErrorKind::Constraint);
        assert_eq!(DepotError::not_found("artifact").kind(), ErrorKind::NotFound);
    }
}
