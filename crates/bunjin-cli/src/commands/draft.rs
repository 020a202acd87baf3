//! Draft command implementation.

use std::path::Path;

use anyhow::Result;
use bunjin_core::{DraftTree, TreeId, UserId};
use bunjin_rules::{Config, RuleStore, StoreError};

use super::{open_store, DraftFile};

/// Replace the user's draft. Drafts are saved unvalidated, as in an editor.
pub fn set(config: &Config, user: &str, tree: Option<&str>, file: &Path) -> Result<()> {
    let store = open_store(config);
    let user_id = UserId::new(user);

    let draft = match DraftFile::read(file)? {
        DraftFile::Tree(mut draft) => {
            draft.user_id = user_id;
            if let Some(tree) = tree {
                draft.tree_id = TreeId::new(tree);
            }
            draft
        }
        DraftFile::Nodes(nodes) => {
            let tree_id = match tree {
                Some(tree) => TreeId::new(tree),
                None => match store.load_draft(&user_id) {
                    Ok(existing) => existing.tree_id,
                    Err(StoreError::DraftNotFound { .. }) => TreeId::new(user),
                    Err(err) => return Err(err.into()),
                },
            };
            DraftTree {
                tree_id,
                user_id,
                nodes,
            }
        }
    };

    store.save_draft(&draft)?;
    println!(
        "✅ Saved draft for {} ({} nodes, tree {})",
        draft.user_id,
        draft.nodes.len(),
        draft.tree_id
    );
    Ok(())
}

/// Print the user's draft as JSON.
pub fn show(config: &Config, user: &str) -> Result<()> {
    let draft = open_store(config).load_draft(&UserId::new(user))?;
    println!("{}", serde_json::to_string_pretty(&draft)?);
    Ok(())
}
