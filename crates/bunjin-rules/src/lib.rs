//! Persona rule engine: decide which persona a recorded segment belongs to.
//!
//! Users edit a *draft* rule tree; publishing validates it, sorts it parents
//! first and freezes it as an immutable numbered version. Sessions bind the
//! latest version when they start, and every segment of the session is
//! evaluated against that frozen snapshot.
//!
//! ## Pipeline
//!
//! ```text
//! DraftTree ──validate──▶ sort ──publish──▶ PublishedVersion (v = max + 1)
//!                                                │
//!                      Session::start ◀──────────┘ (frozen VersionRef)
//!                            │
//!   Segment + EvaluationContext ──▶ CompiledRuleTree::assign ──▶ persona
//! ```
//!
//! ## Tree semantics
//!
//! - **Condition** nodes hold a time-of-day range (`hour >= 9 && hour < 17`)
//!   or a transcript keyword (`contains:"standup"`).
//! - **Persona** nodes end the walk with their slug. They may carry an
//!   optional guard condition, which is how a condition splits time between
//!   sibling personas.
//! - Siblings are tried in `(sort_order, id)` order; the first match wins and
//!   the walk never backtracks.
//!
//! Status changes for tasks, segments, sessions and proposals go through the
//! transition checks in [`bunjin_core::lifecycle`]; [`LifecycleService`]
//! applies them to stored records.

mod config;
mod error;
pub mod evaluate;
mod lifecycle;
pub mod publish;
pub mod sequence;
pub mod store;
pub mod validate;

pub use config::{offset_from_minutes, Config};
pub use error::{RulesError, RulesResult, StoreError, StoreResult};

// Structure
pub use sequence::{is_topologically_ordered, sort};
pub use validate::{validate, validate_with_max_depth};

// Evaluation
pub use evaluate::{
    assign_persona, assign_segment, Assignment, CompileError, CompiledRuleTree, EvaluationContext,
};

// Publishing and lifecycle
pub use lifecycle::LifecycleService;
pub use publish::RulePublisher;

// Persistence
pub use store::{EntityStore, FileRuleStore, InMemoryEntityStore, InMemoryRuleStore, RuleStore};
