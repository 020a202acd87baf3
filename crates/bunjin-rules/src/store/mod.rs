//! Persistence collaborators.
//!
//! The engine only talks to storage through these traits. Two backends ship
//! with the crate:
//!
//! - [`InMemoryRuleStore`] / [`InMemoryEntityStore`] for tests and embedding;
//! - [`FileRuleStore`], a JSON file layout under a store directory:
//!
//! ```text
//! <store_dir>/
//! ├── drafts/
//! │   └── <user_id>.json        # DraftTree
//! └── trees/
//!     └── <tree_id>/
//!         ├── 1.json            # PublishedVersion
//!         └── 2.json
//! ```

mod file;
mod memory;

use bunjin_core::{
    DraftTree, Proposal, ProposalId, PublishedVersion, Segment, SegmentId, Session, SessionId,
    Task, TaskId, TreeId, UserId,
};

use crate::error::StoreResult;

pub use file::FileRuleStore;
pub use memory::{InMemoryEntityStore, InMemoryRuleStore};

/// Storage for draft trees and published versions.
pub trait RuleStore: Send + Sync {
    /// Load the user's current draft.
    fn load_draft(&self, user_id: &UserId) -> StoreResult<DraftTree>;

    /// Replace the user's draft.
    fn save_draft(&self, draft: &DraftTree) -> StoreResult<()>;

    /// Highest published version number for the tree, if any.
    fn max_version(&self, tree_id: &TreeId) -> StoreResult<Option<u32>>;

    /// Insert a new version atomically.
    ///
    /// Must fail with [`StoreError::VersionConflict`](crate::StoreError::VersionConflict)
    /// if `(tree_id, version)` already exists, and must never leave a partial
    /// record behind.
    fn insert_version(&self, version: &PublishedVersion) -> StoreResult<()>;

    /// A specific version.
    fn get_version(&self, tree_id: &TreeId, version: u32) -> StoreResult<Option<PublishedVersion>>;

    /// All version numbers, ascending.
    fn list_versions(&self, tree_id: &TreeId) -> StoreResult<Vec<u32>>;

    /// The most recent version.
    fn latest_version(&self, tree_id: &TreeId) -> StoreResult<Option<PublishedVersion>> {
        match self.max_version(tree_id)? {
            Some(v) => self.get_version(tree_id, v),
            None => Ok(None),
        }
    }
}

/// Storage for lifecycle entities.
///
/// Lookups are scoped by owner: a record belonging to another user is
/// reported as absent.
pub trait EntityStore: Send + Sync {
    fn task(&self, user_id: &UserId, id: &TaskId) -> StoreResult<Option<Task>>;
    fn put_task(&self, task: &Task) -> StoreResult<()>;

    fn segment(&self, user_id: &UserId, id: &SegmentId) -> StoreResult<Option<Segment>>;
    fn put_segment(&self, segment: &Segment) -> StoreResult<()>;

    fn session(&self, user_id: &UserId, id: &SessionId) -> StoreResult<Option<Session>>;
    fn put_session(&self, session: &Session) -> StoreResult<()>;

    fn proposal(&self, user_id: &UserId, id: &ProposalId) -> StoreResult<Option<Proposal>>;
    fn put_proposal(&self, proposal: &Proposal) -> StoreResult<()>;
}
