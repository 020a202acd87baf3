//! CLI command implementations.

pub mod config;
pub mod draft;
pub mod rules;
pub mod transition;

use std::path::Path;

use anyhow::{Context, Result};
use bunjin_core::{DraftTree, RuleNode};
use bunjin_rules::{Config, FileRuleStore};
use serde::Deserialize;

/// Contents of a draft file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DraftFile {
    Tree(DraftTree),
    Nodes(Vec<RuleNode>),
}

impl DraftFile {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a draft tree or node array", path.display()))
    }

    pub fn nodes(&self) -> &[RuleNode] {
        match self {
            DraftFile::Tree(tree) => &tree.nodes,
            DraftFile::Nodes(nodes) => nodes,
        }
    }
}

/// File store at the configured directory.
pub fn open_store(config: &Config) -> FileRuleStore {
    FileRuleStore::new(&config.store_dir)
}
