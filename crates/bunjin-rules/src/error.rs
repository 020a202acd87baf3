//! Error types for the rule engine.

use bunjin_core::{TransitionError, TreeId, UserId, ValidationError};
use thiserror::Error;

use crate::evaluate::CompileError;

/// Result type alias for rule engine operations.
pub type RulesResult<T> = Result<T, RulesError>;

/// Result type alias for persistence calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached. Safe to retry.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// Another publish claimed this version number first. Safe to retry.
    #[error("version {version} of tree {tree_id} already exists")]
    VersionConflict { tree_id: TreeId, version: u32 },

    /// A constraint other than version uniqueness was violated.
    #[error("constraint violation: {message}")]
    Constraint { message: String },

    /// The user has no draft tree.
    #[error("no draft tree for user {user_id}")]
    DraftNotFound { user_id: UserId },

    /// I/O error (file-backed stores).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the caller may retry the operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::VersionConflict { .. }
        )
    }
}

/// Errors that can occur in rule engine operations.
#[derive(Debug, Error)]
pub enum RulesError {
    /// The draft tree is structurally invalid. Carries every violation.
    #[error("invalid rule tree: {}", join_violations(.0))]
    Validation(Vec<ValidationError>),

    /// A status change was rejected.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored snapshot cannot be evaluated.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RulesError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call might succeed.
    ///
    /// Validation and transition failures are caller mistakes and never
    /// transient.
    pub fn is_transient(&self) -> bool {
        match self {
            RulesError::Store(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Violations, if this is a validation failure.
    pub fn violations(&self) -> &[ValidationError] {
        match self {
            RulesError::Validation(v) => v,
            _ => &[],
        }
    }
}

fn join_violations(violations: &[ValidationError]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
