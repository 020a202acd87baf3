//! Topological ordering of rule nodes.
//!
//! Produces the canonical parent-before-child order used for snapshots and
//! top-down evaluation. Each level is ordered by `(sort_order, id)`, so the
//! output depends only on the node contents and never on input order.

use std::collections::{HashMap, HashSet};

use bunjin_core::RuleNode;
use tracing::warn;

/// Sort nodes so every parent precedes all of its descendants.
///
/// Nodes without a parent, or whose parent does not resolve, seed the first
/// level. Nodes that are never reached (members of a cycle with no root) are
/// appended at the end so nothing is dropped.
pub fn sort(nodes: &[RuleNode]) -> Vec<RuleNode> {
    if nodes.is_empty() {
        return Vec::new();
    }

    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut children: HashMap<&str, Vec<&RuleNode>> = HashMap::new();
    let mut level: Vec<&RuleNode> = Vec::new();

    for node in nodes {
        match node.parent_id.as_ref().map(|p| p.as_str()) {
            Some(parent) if ids.contains(parent) => {
                children.entry(parent).or_default().push(node);
            }
            _ => level.push(node),
        }
    }

    let mut ordered: Vec<RuleNode> = Vec::with_capacity(nodes.len());
    let mut emitted: HashSet<&str> = HashSet::with_capacity(nodes.len());

    while !level.is_empty() {
        level.sort_by(|a, b| a.sibling_key().cmp(&b.sibling_key()));

        let mut next = Vec::new();
        for node in level {
            if !emitted.insert(node.id.as_str()) {
                continue;
            }
            ordered.push(node.clone());
            if let Some(kids) = children.get(node.id.as_str()) {
                next.extend(kids.iter().copied());
            }
        }
        level = next;
    }

    if ordered.len() < nodes.len() {
        let mut leftover: Vec<&RuleNode> = nodes
            .iter()
            .filter(|n| !emitted.contains(n.id.as_str()))
            .collect();
        leftover.sort_by(|a, b| a.sibling_key().cmp(&b.sibling_key()));

        warn!(
            unreached = leftover.len(),
            "Appending nodes unreachable from any root"
        );
        for node in leftover {
            if emitted.insert(node.id.as_str()) {
                ordered.push(node.clone());
            }
        }
    }

    ordered
}

/// Whether `nodes` is in parent-before-child order.
pub fn is_topologically_ordered(nodes: &[RuleNode]) -> bool {
    let positions: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    nodes.iter().enumerate().all(|(i, node)| {
        node.parent_id
            .as_ref()
            .and_then(|p| positions.get(p.as_str()))
            .map_or(true, |&parent_pos| parent_pos < i)
    })
}
