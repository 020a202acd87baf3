//! Rule tree commands: validate, sort, publish, versions and assign.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bunjin_core::{PublishedVersion, UserId};
use bunjin_rules::{
    validate_with_max_depth, CompiledRuleTree, Config, EvaluationContext, RulePublisher,
    RuleStore, RulesError,
};
use chrono::{DateTime, Utc};
use tracing::info;

use super::{open_store, DraftFile};

/// Validate a draft file, listing every violation.
pub fn validate(config: &Config, file: &Path) -> Result<()> {
    let draft = DraftFile::read(file)?;
    let nodes = draft.nodes();

    match validate_with_max_depth(nodes, config.effective_max_depth()) {
        Ok(()) => {
            println!("✅ Valid rule tree ({} nodes)", nodes.len());
            Ok(())
        }
        Err(violations) => {
            for violation in &violations {
                println!("❌ {}", violation);
            }
            anyhow::bail!("{} violation(s) in {}", violations.len(), file.display())
        }
    }
}

/// Print a draft file's nodes in parent-first order.
pub fn sort(file: &Path) -> Result<()> {
    let draft = DraftFile::read(file)?;
    let sorted = bunjin_rules::sort(draft.nodes());
    println!("{}", serde_json::to_string_pretty(&sorted)?);
    Ok(())
}

/// Publish the user's draft.
pub fn publish(config: &Config, user: &str) -> Result<()> {
    let store = Arc::new(open_store(config));
    let publisher = RulePublisher::new(store).with_max_depth(config.effective_max_depth());

    match publisher.publish(&UserId::new(user)) {
        Ok(version) => {
            println!(
                "✅ Published {} ({} nodes)",
                version.reference(),
                version.snapshot.len()
            );
            Ok(())
        }
        Err(RulesError::Validation(violations)) => {
            for violation in &violations {
                println!("❌ {}", violation);
            }
            anyhow::bail!("Draft for {} is invalid; nothing was published", user)
        }
        Err(err) if err.is_transient() => {
            Err(err).context("Publish failed, try again")
        }
        Err(err) => Err(err.into()),
    }
}

/// List the user's published versions.
pub fn versions(config: &Config, user: &str) -> Result<()> {
    let store = open_store(config);
    let draft = store.load_draft(&UserId::new(user))?;
    let versions = store.list_versions(&draft.tree_id)?;

    if versions.is_empty() {
        println!("No published versions of {}", draft.tree_id);
        return Ok(());
    }

    println!("📚 {} ({} versions)", draft.tree_id, versions.len());
    for version in versions {
        if let Some(published) = store.get_version(&draft.tree_id, version)? {
            println!(
                "   v{:<4} {}  {} nodes",
                published.version,
                published.published_at.to_rfc3339(),
                published.snapshot.len()
            );
        }
    }
    Ok(())
}

/// Arguments for [`assign`].
#[derive(Debug)]
pub struct AssignArgs {
    pub user: String,
    pub version: Option<u32>,
    pub at: Option<String>,
    pub text: String,
    pub json: bool,
}

/// Evaluate a published version for one moment and transcript.
pub fn assign(config: &Config, args: &AssignArgs) -> Result<()> {
    let store = open_store(config);
    let published = load_published(&store, &args.user, args.version)?;

    let timestamp = match &args.at {
        Some(at) => DateTime::parse_from_rfc3339(at)
            .with_context(|| format!("Invalid RFC 3339 timestamp: {}", at))?,
        None => Utc::now().with_timezone(&config.utc_offset()?),
    };
    let ctx = EvaluationContext::new(timestamp, args.text.as_str());

    let tree = CompiledRuleTree::compile(&published)?;
    let assignment = tree.assign(&ctx);
    info!(
        version = %assignment.version,
        hour = ctx.local_hour(),
        "Assigned persona"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&assignment)?);
    } else {
        match &assignment.persona {
            Some(persona) => println!("{}", persona),
            None => println!("(none)"),
        }
    }
    Ok(())
}

fn load_published(
    store: &dyn RuleStore,
    user: &str,
    version: Option<u32>,
) -> Result<PublishedVersion> {
    let tree_id = store.load_draft(&UserId::new(user))?.tree_id;
    let published = match version {
        Some(v) => store.get_version(&tree_id, v)?,
        None => store.latest_version(&tree_id)?,
    };

    match (published, version) {
        (Some(published), _) => Ok(published),
        (None, Some(v)) => anyhow::bail!("Version {} of {} not found", v, tree_id),
        (None, None) => anyhow::bail!("{} has no published versions", tree_id),
    }
}
