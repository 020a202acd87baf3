//! File-backed rule store.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bunjin_core::{DraftTree, PublishedVersion, TreeId, UserId};
use tracing::{debug, info};

use super::RuleStore;
use crate::error::{StoreError, StoreResult};

const DRAFTS_DIR: &str = "drafts";
const TREES_DIR: &str = "trees";
const PENDING_PREFIX: &str = ".pending-";

/// Rule store that keeps drafts and versions as JSON files.
///
/// A version is written to a hidden temp file in the tree directory, synced,
/// then moved to `N.json` without overwriting. Readers never see a partial
/// `N.json`, and of two processes racing for the same number only one
/// succeeds; the loser gets [`StoreError::VersionConflict`].
#[derive(Debug, Clone)]
pub struct FileRuleStore {
    root: PathBuf,
}

impl FileRuleStore {
    /// Create a store rooted at `root`. Nothing is created until first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create the directory layout.
    pub fn init(&self) -> StoreResult<()> {
        for dir in [DRAFTS_DIR, TREES_DIR] {
            let path = self.root.join(dir);
            if !path.exists() {
                std::fs::create_dir_all(&path)?;
                debug!(path = %path.display(), "Created store directory");
            }
        }
        Ok(())
    }

    fn draft_path(&self, user_id: &UserId) -> StoreResult<PathBuf> {
        Ok(self
            .root
            .join(DRAFTS_DIR)
            .join(format!("{}.json", path_segment(user_id.as_str())?)))
    }

    fn tree_dir(&self, tree_id: &TreeId) -> StoreResult<PathBuf> {
        Ok(self.root.join(TREES_DIR).join(path_segment(tree_id.as_str())?))
    }
}

/// Ids become file names, so they must not escape the store directory.
fn path_segment(id: &str) -> StoreResult<&str> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(|c: char| c == '/' || c == '\\' || c == '\0');
    if bad {
        return Err(StoreError::Constraint {
            message: format!("id `{}` cannot be used as a file name", id),
        });
    }
    Ok(id)
}

impl RuleStore for FileRuleStore {
    fn load_draft(&self, user_id: &UserId) -> StoreResult<DraftTree> {
        let path = self.draft_path(user_id)?;
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::DraftNotFound {
                    user_id: user_id.clone(),
                })
            }
            Err(err) => return Err(err.into()),
        };
        let draft: DraftTree = serde_json::from_str(&json)?;

        debug!(path = %path.display(), nodes = draft.nodes.len(), "Loaded draft");
        Ok(draft)
    }

    fn save_draft(&self, draft: &DraftTree) -> StoreResult<()> {
        self.init()?;
        let path = self.draft_path(&draft.user_id)?;
        std::fs::write(&path, serde_json::to_string_pretty(draft)?)?;

        info!(
            path = %path.display(),
            tree = %draft.tree_id,
            nodes = draft.nodes.len(),
            "Saved draft"
        );
        Ok(())
    }

    fn max_version(&self, tree_id: &TreeId) -> StoreResult<Option<u32>> {
        Ok(self.list_versions(tree_id)?.last().copied())
    }

    fn insert_version(&self, version: &PublishedVersion) -> StoreResult<()> {
        if version.version == 0 {
            return Err(StoreError::Constraint {
                message: "version numbers start at 1".to_string(),
            });
        }

        let dir = self.tree_dir(&version.tree_id)?;
        std::fs::create_dir_all(&dir)?;

        let json = version.to_json()?;
        let path = dir.join(format!("{}.json", version.version));

        // The temp file is removed on drop if anything below fails.
        let mut pending = tempfile::Builder::new()
            .prefix(PENDING_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        pending.write_all(json.as_bytes())?;
        pending.as_file().sync_all()?;

        match pending.persist_noclobber(&path) {
            Ok(_) => {}
            Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::VersionConflict {
                    tree_id: version.tree_id.clone(),
                    version: version.version,
                })
            }
            Err(err) => return Err(err.error.into()),
        }

        info!(
            path = %path.display(),
            tree = %version.tree_id,
            version = version.version,
            "Wrote published version"
        );
        Ok(())
    }

    fn get_version(&self, tree_id: &TreeId, version: u32) -> StoreResult<Option<PublishedVersion>> {
        let path = self.tree_dir(tree_id)?.join(format!("{}.json", version));
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(PublishedVersion::from_json(&json)?))
    }

    fn list_versions(&self, tree_id: &TreeId) -> StoreResult<Vec<u32>> {
        let dir = self.tree_dir(tree_id)?;
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut versions: Vec<u32> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension()? != "json" {
                    return None;
                }
                path.file_stem()?.to_str()?.parse().ok()
            })
            .collect();
        versions.sort_unstable();

        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunjin_core::RuleNode;
    use chrono::Utc;
    use tempfile::TempDir;

    fn draft() -> DraftTree {
        DraftTree {
            tree_id: TreeId::new("tree-1"),
            user_id: UserId::new("u1"),
            nodes: vec![
                RuleNode::condition("root", None, "hour < 24"),
                RuleNode::persona("p", Some("root"), "work"),
            ],
        }
    }

    fn published(version: u32) -> PublishedVersion {
        PublishedVersion {
            tree_id: TreeId::new("tree-1"),
            version,
            snapshot: draft().nodes,
            published_at: Utc::now(),
        }
    }

    #[test]
    fn draft_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRuleStore::new(temp_dir.path());

        assert!(matches!(
            store.load_draft(&UserId::new("u1")),
            Err(StoreError::DraftNotFound { .. })
        ));

        store.save_draft(&draft()).unwrap();
        assert_eq!(store.load_draft(&UserId::new("u1")).unwrap(), draft());
    }

    #[test]
    fn versions_are_create_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRuleStore::new(temp_dir.path());
        let tree = TreeId::new("tree-1");

        assert_eq!(store.max_version(&tree).unwrap(), None);

        store.insert_version(&published(1)).unwrap();
        store.insert_version(&published(2)).unwrap();
        assert!(matches!(
            store.insert_version(&published(2)),
            Err(StoreError::VersionConflict { version: 2, .. })
        ));

        assert_eq!(store.list_versions(&tree).unwrap(), vec![1, 2]);
        assert_eq!(store.latest_version(&tree).unwrap().unwrap().version, 2);
        assert!(store.get_version(&tree, 7).unwrap().is_none());
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn version_files_appear_complete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRuleStore::new(temp_dir.path());
        let tree = TreeId::new("tree-1");
        let dir = store.tree_dir(&tree).unwrap();
        std::fs::create_dir_all(&dir).unwrap();

        // A writer that died mid-publish leaves only its pending file.
        std::fs::write(dir.join(".pending-crashed.tmp"), "").unwrap();
        assert_eq!(store.list_versions(&tree).unwrap(), Vec::<u32>::new());
        assert!(store.latest_version(&tree).unwrap().is_none());

        let version = published(1);
        store.insert_version(&version).unwrap();

        let written = std::fs::read_to_string(dir.join("1.json")).unwrap();
        assert!(!written.is_empty());
        assert_eq!(PublishedVersion::from_json(&written).unwrap(), version);
        assert_eq!(
            dir_entries(&dir),
            vec![".pending-crashed.tmp".to_string(), "1.json".to_string()]
        );
        assert_eq!(store.max_version(&tree).unwrap(), Some(1));
    }

    #[test]
    fn losing_writer_leaves_winner_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRuleStore::new(temp_dir.path());
        let tree = TreeId::new("tree-1");

        let winner = published(1);
        store.insert_version(&winner).unwrap();
        let mut loser = published(1);
        loser.snapshot.truncate(1);
        assert!(matches!(
            store.insert_version(&loser),
            Err(StoreError::VersionConflict { version: 1, .. })
        ));

        assert_eq!(store.get_version(&tree, 1).unwrap().unwrap(), winner);
        let dir = store.tree_dir(&tree).unwrap();
        assert_eq!(dir_entries(&dir), vec!["1.json".to_string()]);
    }

    #[test]
    fn ignores_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRuleStore::new(temp_dir.path());
        store.insert_version(&published(3)).unwrap();

        let dir = store.tree_dir(&TreeId::new("tree-1")).unwrap();
        std::fs::write(dir.join("notes.txt"), "x").unwrap();
        std::fs::write(dir.join("latest.json"), "{}").unwrap();

        assert_eq!(store.list_versions(&TreeId::new("tree-1")).unwrap(), vec![3]);
    }

    #[test]
    fn rejects_path_like_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRuleStore::new(temp_dir.path());

        assert!(matches!(
            store.load_draft(&UserId::new("../etc")),
            Err(StoreError::Constraint { .. })
        ));
        assert!(matches!(
            store.list_versions(&TreeId::new("..")),
            Err(StoreError::Constraint { .. })
        ));
    }
}
