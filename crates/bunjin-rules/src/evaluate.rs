//! Persona assignment against a published rule tree.
//!
//! A [`CompiledRuleTree`] is built once per published version: conditions are
//! parsed and children are indexed in `(sort_order, id)` order. Evaluation is
//! then a pure walk from the root:
//!
//! - a node is *entered* only if it matches; a condition node matches when
//!   its condition holds, a persona node when it has no guard or its guard
//!   holds;
//! - an entered persona node ends the walk with its slug;
//! - an entered condition node descends into its first matching child and
//!   never comes back to try later siblings.
//!
//! Anything else resolves to `None`. There is no default persona.

use std::collections::HashMap;

use bunjin_core::{
    Condition, ConditionParseError, NodeId, PersonaSlug, PublishedVersion, RuleNode,
    RuleNodeType, Segment, VersionRef, RULE_TREE_MAX_DEPTH,
};
use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Runtime inputs for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    /// When the segment was recorded, in the user's local offset.
    pub timestamp: DateTime<FixedOffset>,
    /// Transcript of the segment (empty if none yet).
    pub transcript_text: String,
}

impl EvaluationContext {
    pub fn new(timestamp: DateTime<FixedOffset>, transcript_text: impl Into<String>) -> Self {
        Self {
            timestamp,
            transcript_text: transcript_text.into(),
        }
    }

    /// Build from a UTC instant viewed at `offset`.
    pub fn at_offset(
        timestamp: DateTime<Utc>,
        offset: FixedOffset,
        transcript_text: impl Into<String>,
    ) -> Self {
        Self::new(timestamp.with_timezone(&offset), transcript_text)
    }

    /// Local hour of day (0-23).
    pub fn local_hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Outcome of an evaluation, with the path taken for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub persona: Option<PersonaSlug>,
    /// Entered nodes, root first.
    pub path: Vec<NodeId>,
    pub version: VersionRef,
}

/// Why a snapshot could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("snapshot of {version} has no root")]
    NoRoot { version: VersionRef },

    #[error("node {id} in {version} has an unusable condition: {source}")]
    Condition {
        version: VersionRef,
        id: NodeId,
        source: ConditionParseError,
    },

    #[error("condition node {id} in {version} has no condition")]
    MissingCondition { version: VersionRef, id: NodeId },

    #[error("persona node {id} in {version} has no persona slug")]
    MissingPersonaSlug { version: VersionRef, id: NodeId },
}

#[derive(Debug, Clone)]
enum CompiledKind {
    Condition(Condition),
    Persona {
        slug: PersonaSlug,
        guard: Option<Condition>,
    },
}

#[derive(Debug, Clone)]
struct CompiledNode {
    id: NodeId,
    kind: CompiledKind,
    children: Vec<usize>,
}

impl CompiledNode {
    fn matches(&self, ctx: &EvaluationContext) -> bool {
        let hour = ctx.local_hour();
        match &self.kind {
            CompiledKind::Condition(condition) => condition.matches(hour, &ctx.transcript_text),
            CompiledKind::Persona { guard, .. } => guard
                .as_ref()
                .map_or(true, |g| g.matches(hour, &ctx.transcript_text)),
        }
    }
}

/// A published version prepared for repeated evaluation.
///
/// Immutable once built, so one instance can serve many segments
/// concurrently.
#[derive(Debug, Clone)]
pub struct CompiledRuleTree {
    version: VersionRef,
    nodes: Vec<CompiledNode>,
    root: usize,
}

impl CompiledRuleTree {
    /// Parse every condition and index children.
    pub fn compile(published: &PublishedVersion) -> Result<Self, CompileError> {
        let version = published.reference();

        let mut nodes = Vec::with_capacity(published.snapshot.len());
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(published.snapshot.len());
        for node in &published.snapshot {
            index.entry(node.id.as_str()).or_insert(nodes.len());
            nodes.push(compile_node(node, &version)?);
        }

        let mut root = None;
        let mut order: Vec<&RuleNode> = published.snapshot.iter().collect();
        order.sort_by(|a, b| a.sibling_key().cmp(&b.sibling_key()));
        for node in order {
            let Some(&pos) = index.get(node.id.as_str()) else {
                continue;
            };
            match node.parent_id.as_ref() {
                None => {
                    root.get_or_insert(pos);
                }
                Some(parent) => {
                    if let Some(&parent_pos) = index.get(parent.as_str()) {
                        nodes[parent_pos].children.push(pos);
                    }
                }
            }
        }

        let root = root.ok_or_else(|| CompileError::NoRoot {
            version: version.clone(),
        })?;

        Ok(Self {
            version,
            nodes,
            root,
        })
    }

    pub fn version(&self) -> &VersionRef {
        &self.version
    }

    /// Evaluate and record the path taken.
    pub fn assign(&self, ctx: &EvaluationContext) -> Assignment {
        let mut path = Vec::new();
        let persona = self.walk(ctx, &mut path);

        debug!(
            version = %self.version,
            hour = ctx.local_hour(),
            persona = persona.as_ref().map(|p| p.as_str()).unwrap_or("-"),
            steps = path.len(),
            "Evaluated persona rules"
        );

        Assignment {
            persona,
            path,
            version: self.version.clone(),
        }
    }

    /// Evaluate, returning only the persona.
    pub fn assign_persona(&self, ctx: &EvaluationContext) -> Option<PersonaSlug> {
        self.walk(ctx, &mut Vec::new())
    }

    fn walk(&self, ctx: &EvaluationContext, path: &mut Vec<NodeId>) -> Option<PersonaSlug> {
        let mut current = &self.nodes[self.root];
        if !current.matches(ctx) {
            return None;
        }

        // Published trees are validated, but the bound keeps a hand-edited
        // snapshot with a cycle from looping forever.
        for _ in 0..=RULE_TREE_MAX_DEPTH {
            path.push(current.id.clone());
            match &current.kind {
                CompiledKind::Persona { slug, .. } => return Some(slug.clone()),
                CompiledKind::Condition(_) => {
                    let next = current
                        .children
                        .iter()
                        .map(|&i| &self.nodes[i])
                        .find(|child| child.matches(ctx))?;
                    current = next;
                }
            }
        }

        warn!(version = %self.version, "Rule walk exceeded max depth");
        None
    }
}

fn compile_node(node: &RuleNode, version: &VersionRef) -> Result<CompiledNode, CompileError> {
    let parse = |source: &str| {
        source
            .parse::<Condition>()
            .map_err(|source| CompileError::Condition {
                version: version.clone(),
                id: node.id.clone(),
                source,
            })
    };

    let kind = match node.node_type {
        RuleNodeType::Condition => {
            let source =
                node.condition
                    .as_deref()
                    .ok_or_else(|| CompileError::MissingCondition {
                        version: version.clone(),
                        id: node.id.clone(),
                    })?;
            CompiledKind::Condition(parse(source)?)
        }
        RuleNodeType::Persona => {
            let slug = node
                .persona_slug
                .clone()
                .ok_or_else(|| CompileError::MissingPersonaSlug {
                    version: version.clone(),
                    id: node.id.clone(),
                })?;
            let guard = node.condition.as_deref().map(parse).transpose()?;
            CompiledKind::Persona { slug, guard }
        }
    };

    Ok(CompiledNode {
        id: node.id.clone(),
        kind,
        children: Vec::new(),
    })
}

/// Resolve the persona for `ctx` against a published version.
///
/// An unusable snapshot is logged and treated as "no persona".
pub fn assign_persona(published: &PublishedVersion, ctx: &EvaluationContext) -> Option<PersonaSlug> {
    match CompiledRuleTree::compile(published) {
        Ok(tree) => tree.assign_persona(ctx),
        Err(err) => {
            warn!(error = %err, "Cannot evaluate published rules");
            None
        }
    }
}

/// Evaluate a segment's transcript and record the result on the segment.
pub fn assign_segment(
    tree: &CompiledRuleTree,
    segment: &mut Segment,
    offset: FixedOffset,
) -> Assignment {
    let ctx = EvaluationContext::at_offset(
        segment.recorded_at,
        offset,
        segment.text.clone().unwrap_or_default(),
    );
    let assignment = tree.assign(&ctx);
    segment.record_assignment(assignment.persona.clone(), assignment.version.clone());
    assignment
}
