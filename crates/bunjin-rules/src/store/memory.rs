//! In-memory stores.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use bunjin_core::{
    DraftTree, Proposal, ProposalId, PublishedVersion, Segment, SegmentId, Session, SessionId,
    Task, TaskId, TreeId, UserId,
};
use tracing::debug;

use super::{EntityStore, RuleStore};
use crate::error::{StoreError, StoreResult};

fn poisoned() -> StoreError {
    StoreError::Unavailable {
        message: "store lock poisoned".to_string(),
    }
}

#[derive(Debug, Default)]
struct RuleTables {
    drafts: HashMap<UserId, DraftTree>,
    versions: HashMap<TreeId, BTreeMap<u32, PublishedVersion>>,
}

/// Rule store backed by a mutex-guarded map.
///
/// The uniqueness check and the insert happen under one lock, which is what
/// makes concurrent publishes safe.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    tables: Mutex<RuleTables>,
    offline: AtomicBool,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a draft (builder pattern).
    pub fn with_draft(self, draft: DraftTree) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.drafts.insert(draft.user_id.clone(), draft);
        }
        self
    }

    /// Simulate an outage: every call fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, RuleTables>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "in-memory store is offline".to_string(),
            });
        }
        self.tables.lock().map_err(|_| poisoned())
    }
}

impl RuleStore for InMemoryRuleStore {
    fn load_draft(&self, user_id: &UserId) -> StoreResult<DraftTree> {
        self.lock()?
            .drafts
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::DraftNotFound {
                user_id: user_id.clone(),
            })
    }

    fn save_draft(&self, draft: &DraftTree) -> StoreResult<()> {
        self.lock()?
            .drafts
            .insert(draft.user_id.clone(), draft.clone());
        Ok(())
    }

    fn max_version(&self, tree_id: &TreeId) -> StoreResult<Option<u32>> {
        Ok(self
            .lock()?
            .versions
            .get(tree_id)
            .and_then(|v| v.keys().next_back().copied()))
    }

    fn insert_version(&self, version: &PublishedVersion) -> StoreResult<()> {
        if version.version == 0 {
            return Err(StoreError::Constraint {
                message: "version numbers start at 1".to_string(),
            });
        }

        let mut tables = self.lock()?;
        let tree = tables.versions.entry(version.tree_id.clone()).or_default();
        if tree.contains_key(&version.version) {
            return Err(StoreError::VersionConflict {
                tree_id: version.tree_id.clone(),
                version: version.version,
            });
        }
        tree.insert(version.version, version.clone());

        debug!(tree = %version.tree_id, version = version.version, "Inserted version");
        Ok(())
    }

    fn get_version(&self, tree_id: &TreeId, version: u32) -> StoreResult<Option<PublishedVersion>> {
        Ok(self
            .lock()?
            .versions
            .get(tree_id)
            .and_then(|v| v.get(&version))
            .cloned())
    }

    fn list_versions(&self, tree_id: &TreeId) -> StoreResult<Vec<u32>> {
        Ok(self
            .lock()?
            .versions
            .get(tree_id)
            .map(|v| v.keys().copied().collect())
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct EntityTables {
    tasks: HashMap<TaskId, Task>,
    segments: HashMap<SegmentId, Segment>,
    sessions: HashMap<SessionId, Session>,
    proposals: HashMap<ProposalId, Proposal>,
}

/// Entity store backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    tables: Mutex<EntityTables>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, EntityTables>> {
        self.tables.lock().map_err(|_| poisoned())
    }
}

impl EntityStore for InMemoryEntityStore {
    fn task(&self, user_id: &UserId, id: &TaskId) -> StoreResult<Option<Task>> {
        Ok(self
            .lock()?
            .tasks
            .get(id)
            .filter(|t| &t.user_id == user_id)
            .cloned())
    }

    fn put_task(&self, task: &Task) -> StoreResult<()> {
        self.lock()?.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn segment(&self, user_id: &UserId, id: &SegmentId) -> StoreResult<Option<Segment>> {
        Ok(self
            .lock()?
            .segments
            .get(id)
            .filter(|s| &s.user_id == user_id)
            .cloned())
    }

    fn put_segment(&self, segment: &Segment) -> StoreResult<()> {
        self.lock()?
            .segments
            .insert(segment.id.clone(), segment.clone());
        Ok(())
    }

    fn session(&self, user_id: &UserId, id: &SessionId) -> StoreResult<Option<Session>> {
        Ok(self
            .lock()?
            .sessions
            .get(id)
            .filter(|s| &s.user_id == user_id)
            .cloned())
    }

    fn put_session(&self, session: &Session) -> StoreResult<()> {
        self.lock()?
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn proposal(&self, user_id: &UserId, id: &ProposalId) -> StoreResult<Option<Proposal>> {
        Ok(self
            .lock()?
            .proposals
            .get(id)
            .filter(|p| &p.user_id == user_id)
            .cloned())
    }

    fn put_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        self.lock()?
            .proposals
            .insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }
}
