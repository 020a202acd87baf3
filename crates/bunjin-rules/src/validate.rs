//! Structural validation of candidate rule trees.
//!
//! Root reachability is the single source of truth: a node is valid
//! structurally iff a breadth-first walk from a root visits it.
//! Nodes trapped in a cycle that never touches the root are simply not
//! visited, so they are reported as orphans rather than through a separate
//! cycle check.

use std::collections::{HashMap, HashSet};

use bunjin_core::{RuleNode, RuleNodeType, ValidationError, RULE_TREE_MAX_DEPTH};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Bfs;
use tracing::debug;

/// Validate a complete candidate node set with the default depth bound.
///
/// Returns every violation found, not just the first.
pub fn validate(nodes: &[RuleNode]) -> Result<(), Vec<ValidationError>> {
    validate_with_max_depth(nodes, RULE_TREE_MAX_DEPTH)
}

/// Validate with an explicit depth bound (hops from the root).
pub fn validate_with_max_depth(
    nodes: &[RuleNode],
    max_depth: usize,
) -> Result<(), Vec<ValidationError>> {
    if nodes.is_empty() {
        return Err(vec![ValidationError::NoNodes]);
    }

    let mut errors = Vec::new();

    // First occurrence wins for lookups; later ones are reported.
    let mut by_id: HashMap<&str, &RuleNode> = HashMap::with_capacity(nodes.len());
    let mut reported_duplicates = HashSet::new();
    for node in nodes {
        let id = node.id.as_str();
        if by_id.contains_key(id) {
            if reported_duplicates.insert(id) {
                errors.push(ValidationError::DuplicateId(node.id.clone()));
            }
        } else {
            by_id.insert(id, node);
        }
    }

    // Several roots are an error of their own, but reachability still runs
    // from all of them so dangling subtrees are reported too.
    let roots: Vec<&RuleNode> = nodes.iter().filter(|n| n.is_root()).collect();
    if roots.is_empty() {
        errors.push(ValidationError::NoRoot);
    } else {
        if roots.len() > 1 {
            errors.push(ValidationError::MultipleRoots);
        }
        check_reachability(nodes, &by_id, &roots, max_depth, &mut errors);
    }

    for node in nodes {
        check_node_shape(node, &mut errors);
    }

    debug!(
        nodes = nodes.len(),
        violations = errors.len(),
        "Validated rule tree"
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_reachability(
    nodes: &[RuleNode],
    by_id: &HashMap<&str, &RuleNode>,
    roots: &[&RuleNode],
    max_depth: usize,
    errors: &mut Vec<ValidationError>,
) {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::with_capacity(by_id.len(), by_id.len());
    for &id in by_id.keys() {
        graph.add_node(id);
    }
    for node in by_id.values() {
        if let Some(parent) = &node.parent_id {
            if by_id.contains_key(parent.as_str()) {
                graph.add_edge(parent.as_str(), node.id.as_str(), ());
            }
        }
    }

    // BFS yields a parent before any of its children, so each depth can be
    // derived from the parent's.
    let mut depth: HashMap<&str, usize> = HashMap::with_capacity(by_id.len());
    for root in roots {
        let mut bfs = Bfs::new(&graph, root.id.as_str());
        while let Some(id) = bfs.next(&graph) {
            let d = by_id
                .get(id)
                .and_then(|n| n.parent_id.as_ref())
                .and_then(|p| depth.get(p.as_str()))
                .map_or(0, |pd| pd + 1);
            depth.insert(id, d);
        }
    }

    let mut reported = HashSet::new();
    for node in nodes {
        let id = node.id.as_str();
        if !reported.insert(id) {
            continue;
        }
        match depth.get(id) {
            None => errors.push(ValidationError::OrphanNode(node.id.clone())),
            Some(&d) if d > max_depth => errors.push(ValidationError::DepthExceeded {
                id: node.id.clone(),
                depth: d,
                max: max_depth,
            }),
            Some(_) => {}
        }
    }
}

fn check_node_shape(node: &RuleNode, errors: &mut Vec<ValidationError>) {
    match node.node_type {
        RuleNodeType::Condition => {
            if node.condition.is_none() {
                errors.push(ValidationError::MissingCondition(node.id.clone()));
            }
        }
        RuleNodeType::Persona => {
            let missing = node
                .persona_slug
                .as_ref()
                .map_or(true, |slug| slug.as_str().trim().is_empty());
            if missing {
                errors.push(ValidationError::MissingPersonaSlug(node.id.clone()));
            }
        }
    }

    if let Some(Err(err)) = node.parsed_condition() {
        errors.push(ValidationError::InvalidCondition {
            id: node.id.clone(),
            message: err.to_string(),
        });
    }
}
