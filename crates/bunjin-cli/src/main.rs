//! Bunjin CLI - edit, publish and evaluate persona rule trees.
//!
//! Drafts and published versions live in a file store (`.bunjin/` by
//! default, see `bunjin config show`).

use std::path::PathBuf;

use anyhow::Result;
use bunjin_rules::Config;
use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;

use commands::{config as config_cmd, draft, rules, transition};

/// Bunjin CLI - persona rule trees.
///
/// Draft files are JSON: either a bare array of rule nodes or a full draft
/// object with `tree_id`, `user_id` and `nodes`.
#[derive(Parser, Debug)]
#[command(
    name = "bunjin",
    author,
    version,
    about = "Bunjin: persona rule trees",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Store directory (overrides the configured one).
    #[arg(long, global = true, env = "BUNJIN_STORE_DIR")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a draft file for structural problems.
    Validate {
        /// Draft file.
        file: PathBuf,
    },

    /// Print a draft file's nodes parents first.
    Sort {
        /// Draft file.
        file: PathBuf,
    },

    /// Manage a user's draft tree.
    #[command(subcommand)]
    Draft(DraftCommands),

    /// Validate and publish the user's draft as a new version.
    Publish {
        #[arg(short, long)]
        user: String,
    },

    /// List published versions of the user's tree.
    Versions {
        #[arg(short, long)]
        user: String,
    },

    /// Evaluate a published version for a moment and transcript.
    Assign {
        #[arg(short, long)]
        user: String,

        /// Version to evaluate (defaults to the latest).
        #[arg(long)]
        version: Option<u32>,

        /// RFC 3339 timestamp; its offset decides the local hour.
        /// Defaults to now at the configured offset.
        #[arg(long)]
        at: Option<String>,

        /// Transcript text.
        #[arg(long, default_value = "")]
        text: String,

        /// Print the full assignment as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check a status change without applying it.
    Transition {
        /// State machine: task, stt, session or proposal.
        machine: transition::Machine,
        from: String,
        to: String,
    },

    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Draft subcommands.
#[derive(Subcommand, Debug)]
enum DraftCommands {
    /// Replace the user's draft with the contents of a file.
    Set {
        #[arg(short, long)]
        user: String,

        /// Tree id for bare node arrays (defaults to the existing draft's
        /// tree, then to the user id).
        #[arg(long)]
        tree: Option<String>,

        /// Draft file.
        file: PathBuf,
    },

    /// Print the user's draft.
    Show {
        #[arg(short, long)]
        user: String,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration.
    Show,

    /// Set a configuration value.
    Set {
        /// Configuration key.
        key: String,
        /// Configuration value.
        value: String,
    },

    /// Get a configuration value.
    Get {
        /// Configuration key.
        key: String,
    },

    /// Reset configuration to defaults.
    Reset,

    /// Show path to config file.
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenvy::dotenv();
    let mut config = Config::load()?;
    if let Some(store) = cli.store {
        config.store_dir = store;
    }

    match cli.command {
        Commands::Validate { file } => rules::validate(&config, &file)?,

        Commands::Sort { file } => rules::sort(&file)?,

        Commands::Draft(draft_cmd) => match draft_cmd {
            DraftCommands::Set { user, tree, file } => {
                draft::set(&config, &user, tree.as_deref(), &file)?
            }
            DraftCommands::Show { user } => draft::show(&config, &user)?,
        },

        Commands::Publish { user } => rules::publish(&config, &user)?,

        Commands::Versions { user } => rules::versions(&config, &user)?,

        Commands::Assign {
            user,
            version,
            at,
            text,
            json,
        } => rules::assign(
            &config,
            &rules::AssignArgs {
                user,
                version,
                at,
                text,
                json,
            },
        )?,

        Commands::Transition { machine, from, to } => transition::execute(machine, &from, &to)?,

        Commands::Config(config_cmd_inner) => match config_cmd_inner {
            ConfigCommands::Show => config_cmd::show(&config)?,
            ConfigCommands::Set { key, value } => config_cmd::set(&key, &value)?,
            ConfigCommands::Get { key } => config_cmd::get(&config, &key)?,
            ConfigCommands::Reset => config_cmd::reset()?,
            ConfigCommands::Path => {
                if let Some(path) = Config::config_file_path() {
                    println!("{}", path.display());
                } else {
                    println!("(no config file path available)");
                }
            }
        },
    }

    Ok(())
}
