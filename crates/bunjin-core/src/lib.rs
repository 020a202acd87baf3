//! Core domain types shared across the bunjin workspace.
//!
//! A user's persona rules are kept as a flat list of [`RuleNode`]s with parent
//! pointers. Drafts are freely editable; publishing freezes a validated,
//! topologically sorted copy into a [`PublishedVersion`] that evaluation runs
//! against. The [`lifecycle`] module holds the status machines for tasks,
//! segments, sessions and proposals.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod condition;
mod error;
pub mod lifecycle;

pub use condition::{Condition, HOURS_PER_DAY};
pub use error::{ConditionParseError, TransitionError, ValidationError};
pub use lifecycle::{
    can_transition_proposal, can_transition_session, can_transition_stt, can_transition_task,
    check_transition, Proposal, ProposalKind, ProposalStatus, Segment, Session, SessionStatus,
    StatusMachine, SttStatus, Task, TaskStatus, TransitionCheck,
};

/// Maximum number of parent hops from any node back to the root.
pub const RULE_TREE_MAX_DEPTH: usize = 10;

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Owner of every entity. Never special-cased.
    UserId
);
string_id!(
    /// Identifies a user's rule tree.
    TreeId
);
string_id!(
    /// Identifies a node within one rule tree.
    NodeId
);
string_id!(
    /// References a persona (bunjin) by slug, e.g. `work`.
    PersonaSlug
);
string_id!(TaskId);
string_id!(SegmentId);
string_id!(SessionId);
string_id!(ProposalId);

// =============================================================================
// Rule Tree
// =============================================================================

/// Kind of rule node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleNodeType {
    /// Branching node guarded by a condition.
    Condition,
    /// Leaf naming the persona to assign.
    Persona,
}

/// A node in a persona-assignment tree, stored flat with a parent pointer.
///
/// `condition` is kept in source form; it is parsed into a [`Condition`]
/// during validation and again when a published tree is compiled. On persona
/// nodes it acts as an optional guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleNode {
    pub id: NodeId,

    #[serde(default)]
    pub parent_id: Option<NodeId>,

    #[serde(rename = "type")]
    pub node_type: RuleNodeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_slug: Option<PersonaSlug>,

    #[serde(default)]
    pub sort_order: i32,
}

impl RuleNode {
    /// Create a condition node.
    pub fn condition(
        id: impl Into<NodeId>,
        parent_id: Option<&str>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(NodeId::from),
            node_type: RuleNodeType::Condition,
            condition: Some(condition.into()),
            persona_slug: None,
            sort_order: 0,
        }
    }

    /// Create a persona leaf.
    pub fn persona(
        id: impl Into<NodeId>,
        parent_id: Option<&str>,
        slug: impl Into<PersonaSlug>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(NodeId::from),
            node_type: RuleNodeType::Persona,
            condition: None,
            persona_slug: Some(slug.into()),
            sort_order: 0,
        }
    }

    /// Set the sibling sort order.
    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// Attach a guard condition (persona nodes) or replace the condition.
    pub fn with_guard(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Parse the stored condition, if any.
    pub fn parsed_condition(&self) -> Option<Result<Condition, ConditionParseError>> {
        self.condition.as_deref().map(str::parse)
    }

    /// Ordering key for siblings: `(sort_order, id)`.
    pub fn sibling_key(&self) -> (i32, &str) {
        (self.sort_order, self.id.as_str())
    }
}

/// A user's editable tree as loaded from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftTree {
    pub tree_id: TreeId,
    pub user_id: UserId,
    #[serde(default)]
    pub nodes: Vec<RuleNode>,
}

// =============================================================================
// Published Versions
// =============================================================================

/// Handle to one published version of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRef {
    pub tree_id: TreeId,
    pub version: u32,
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.tree_id, self.version)
    }
}

/// Immutable snapshot of a validated draft.
///
/// `snapshot` is in topological order (parents before children). Values of
/// this type are only produced by the publisher and never edited afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedVersion {
    pub tree_id: TreeId,
    pub version: u32,
    pub snapshot: Vec<RuleNode>,
    pub published_at: DateTime<Utc>,
}

impl PublishedVersion {
    pub fn reference(&self) -> VersionRef {
        VersionRef {
            tree_id: self.tree_id.clone(),
            version: self.version,
        }
    }

    /// Root node of the snapshot (the first parentless node).
    pub fn root(&self) -> Option<&RuleNode> {
        self.snapshot.iter().find(|n| n.is_root())
    }

    /// Whether two versions carry the same rules, ignoring version and time.
    pub fn same_content(&self, other: &PublishedVersion) -> bool {
        self.tree_id == other.tree_id && self.snapshot == other.snapshot
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
