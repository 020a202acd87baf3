//! Publishing drafts as immutable versions.
//!
//! ```text
//! load draft -> validate -> sort -> next = max + 1 -> insert (atomic)
//! ```
//!
//! Nothing is written unless validation passes. The draft itself is never
//! touched, and republishing an unchanged draft is accepted: it produces a
//! new version with identical content.

use std::sync::Arc;

use bunjin_core::{PublishedVersion, UserId, RULE_TREE_MAX_DEPTH};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{RulesError, RulesResult};
use crate::sequence::sort;
use crate::store::RuleStore;
use crate::validate::validate_with_max_depth;

/// Runs the publish protocol against a [`RuleStore`].
#[derive(Clone)]
pub struct RulePublisher {
    store: Arc<dyn RuleStore>,
    max_depth: usize,
}

impl RulePublisher {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self {
            store,
            max_depth: RULE_TREE_MAX_DEPTH,
        }
    }

    /// Use a tighter depth bound (values above the tree maximum are capped).
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(RULE_TREE_MAX_DEPTH);
        self
    }

    /// Publish the user's draft, stamped with the current time.
    pub fn publish(&self, user_id: &UserId) -> RulesResult<PublishedVersion> {
        self.publish_at(user_id, Utc::now())
    }

    /// Publish the user's draft with an explicit timestamp.
    ///
    /// A lost race for the version number comes back as a transient
    /// [`StoreError::VersionConflict`](crate::StoreError::VersionConflict);
    /// the caller may retry.
    pub fn publish_at(
        &self,
        user_id: &UserId,
        published_at: DateTime<Utc>,
    ) -> RulesResult<PublishedVersion> {
        let draft = self.store.load_draft(user_id)?;

        if let Err(violations) = validate_with_max_depth(&draft.nodes, self.max_depth) {
            warn!(
                user = %user_id,
                tree = %draft.tree_id,
                violations = violations.len(),
                "Rejected publish of invalid draft"
            );
            return Err(RulesError::Validation(violations));
        }

        let snapshot = sort(&draft.nodes);
        let next = self.store.max_version(&draft.tree_id)?.unwrap_or(0) + 1;

        let version = PublishedVersion {
            tree_id: draft.tree_id,
            version: next,
            snapshot,
            published_at,
        };
        self.store.insert_version(&version)?;

        info!(
            user = %user_id,
            tree = %version.tree_id,
            version = version.version,
            nodes = version.snapshot.len(),
            "Published rule tree"
        );

        Ok(version)
    }
}

impl std::fmt::Debug for RulePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulePublisher")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRuleStore;
    use crate::StoreError;
    use bunjin_core::{DraftTree, RuleNode, TreeId, ValidationError};

    fn store_with(nodes: Vec<RuleNode>) -> Arc<InMemoryRuleStore> {
        Arc::new(InMemoryRuleStore::new().with_draft(DraftTree {
            tree_id: TreeId::new("tree"),
            user_id: UserId::new("u1"),
            nodes,
        }))
    }

    fn valid_nodes() -> Vec<RuleNode> {
        vec![
            RuleNode::persona("p", Some("root"), "work"),
            RuleNode::condition("root", None, "hour < 24"),
        ]
    }

    #[test]
    fn publishes_sorted_snapshot_starting_at_one() {
        let store = store_with(valid_nodes());
        let publisher = RulePublisher::new(store.clone());

        let v1 = publisher.publish(&UserId::new("u1")).unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v1.snapshot[0].id.as_str(), "root");

        // The draft keeps its original order.
        let draft = store.load_draft(&UserId::new("u1")).unwrap();
        assert_eq!(draft.nodes, valid_nodes());
    }

    #[test]
    fn invalid_draft_writes_nothing() {
        let store = store_with(vec![
            RuleNode::condition("a", None, "hour < 24"),
            RuleNode::condition("b", None, "hour < 24"),
        ]);
        let publisher = RulePublisher::new(store.clone());

        let err = publisher.publish(&UserId::new("u1")).unwrap_err();
        assert_eq!(err.violations(), &[ValidationError::MultipleRoots]);
        assert!(!err.is_transient());
        assert!(store.list_versions(&TreeId::new("tree")).unwrap().is_empty());
    }

    #[test]
    fn tighter_depth_bound_is_enforced() {
        let store = store_with(vec![
            RuleNode::condition("root", None, "hour < 24"),
            RuleNode::condition("mid", Some("root"), "hour < 24"),
            RuleNode::persona("leaf", Some("mid"), "work"),
        ]);
        let publisher = RulePublisher::new(store).with_max_depth(1);

        let err = publisher.publish(&UserId::new("u1")).unwrap_err();
        assert!(matches!(
            err.violations(),
            [ValidationError::DepthExceeded { depth: 2, max: 1, .. }]
        ));
    }

    #[test]
    fn missing_draft_and_outage_propagate() {
        let store = Arc::new(InMemoryRuleStore::new());
        let publisher = RulePublisher::new(store.clone());

        let err = publisher.publish(&UserId::new("nobody")).unwrap_err();
        assert!(matches!(
            err,
            RulesError::Store(StoreError::DraftNotFound { .. })
        ));

        store.set_offline(true);
        let err = publisher.publish(&UserId::new("nobody")).unwrap_err();
        assert!(err.is_transient());
    }
}
