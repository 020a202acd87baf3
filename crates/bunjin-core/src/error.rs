//! Error types shared by the rule engine and the lifecycle machines.

use thiserror::Error;

use crate::NodeId;

/// A structural violation in a candidate rule tree.
///
/// These are user-correctable and are shown verbatim in the rule editor, so
/// the messages are part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The candidate set is empty.
    #[error("no nodes")]
    NoNodes,

    /// No node has an empty parent.
    #[error("no root found")]
    NoRoot,

    /// More than one node has an empty parent.
    #[error("multiple roots found")]
    MultipleRoots,

    /// The node cannot be reached from the root by following child links.
    #[error("orphan node: {0}")]
    OrphanNode(NodeId),

    /// Two or more nodes share an id.
    #[error("duplicate node id: {0}")]
    DuplicateId(NodeId),

    /// The node is reachable but sits deeper than the allowed bound.
    #[error("node {id} exceeds max depth {max} (depth {depth})")]
    DepthExceeded { id: NodeId, depth: usize, max: usize },

    /// A condition node has no condition.
    #[error("condition node {0} has no condition")]
    MissingCondition(NodeId),

    /// A condition (or persona guard) failed to parse.
    #[error("invalid condition on node {id}: {message}")]
    InvalidCondition { id: NodeId, message: String },

    /// A persona node has no persona slug.
    #[error("persona node {0} has no persona slug")]
    MissingPersonaSlug(NodeId),
}

/// Why a condition string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionParseError {
    #[error("empty condition")]
    Empty,

    #[error("contains literal must not be empty")]
    EmptyLiteral,

    #[error("unrecognized condition: {0}")]
    Unrecognized(String),

    #[error("unsupported operator in `{0}` (use >= or <)")]
    UnsupportedOperator(String),

    #[error("invalid hour: {0}")]
    InvalidHour(String),

    #[error("hour {0} is out of range (0-24)")]
    HourOutOfRange(u8),

    #[error("bound given twice in `{0}`")]
    DuplicateBound(String),

    #[error("empty hour range: {from}..{to}")]
    EmptyRange { from: u8, to: u8 },
}

/// A rejected status change. `reason` is meant for the end user unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct TransitionError {
    pub reason: String,
}

impl TransitionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
