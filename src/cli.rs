use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use flagapi::CopyAction;
use serde_json::Value;
use std::path::PathBuf;

use crate::commands::testdata::parse_override;
use crate::config::{DEFAULT_DEST_TOKEN_ENV, DEFAULT_SDK_KEY_ENV};

#[derive(Parser)]
#[command(name = "flagops")]
#[command(version)]
#[command(about = "Declarative management of feature flags, segments and environments", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Manifest file (default: $FLAGOPS_MANIFEST, ./flagops.toml, then the config dir)
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Preview what apply would change
    Plan(PlanArgs),

    /// Make the remote state match the manifest
    Apply(ApplyArgs),

    /// Check the manifest and run policies without calling the API
    Validate(ValidateArgs),

    /// Fetch and print a remote entity
    #[command(subcommand)]
    Show(ShowCommand),

    /// Save a project's flags and segments to a JSON file
    Snapshot(SnapshotArgs),

    /// Replay a snapshot into a project
    Restore(RestoreArgs),

    /// Copy configuration between environments
    #[command(subcommand)]
    Sync(SyncCommand),

    /// Copy whole projects
    #[command(subcommand)]
    Copy(CopyCommand),

    /// Write an environment's flag data for SDK test or offline mode
    TestData(TestDataArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Declarative
// ============================================================================

#[derive(Args)]
pub struct PlanArgs {
    /// Only plan specific resources (type or type.key, e.g. flags.search)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Show the entity lines each update changes
    #[arg(long)]
    pub values: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Only apply specific resources (type or type.key)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Show what would change without changing it
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Comment attached to every patch (overrides [api] comment)
    #[arg(short, long)]
    pub comment: Option<String>,

    /// Stop at the first failed resource
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Only validate specific resources (type or type.key)
    #[arg(short, long)]
    pub target: Option<String>,
}

// ============================================================================
// Show
// ============================================================================

#[derive(Subcommand)]
pub enum ShowCommand {
    /// Show a project
    Project {
        project: String,
    },

    /// Show an environment
    Environment {
        project: String,
        environment: String,
    },

    /// Show a feature flag
    Flag {
        project: String,
        flag: String,

        /// Only include this environment's configuration
        #[arg(short, long)]
        env: Option<String>,
    },

    /// List a flag's variations
    Variations {
        project: String,
        flag: String,
    },

    /// Show a user segment
    Segment {
        project: String,
        environment: String,
        segment: String,
    },

    /// Show a custom role
    Role {
        role: String,
    },

    /// Show a webhook
    Webhook {
        id: String,
    },
}

// ============================================================================
// Snapshot / Restore
// ============================================================================

#[derive(Args)]
pub struct SnapshotArgs {
    /// Project to snapshot
    pub project: String,

    /// Output file (default: <project>-<timestamp>.json)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct RestoreArgs {
    /// Snapshot file
    pub file: PathBuf,

    /// Project key to restore into (default: the snapshot's project key)
    #[arg(short, long)]
    pub project: Option<String>,
}

// ============================================================================
// Sync
// ============================================================================

#[derive(Subcommand)]
pub enum SyncCommand {
    /// Copy a flag's environment configuration to other environments
    Flag(FlagSyncArgs),

    /// Copy a user segment to other environments
    Segment(SegmentSyncArgs),
}

#[derive(Args)]
pub struct FlagSyncArgs {
    pub project: String,
    pub flag: String,

    /// Source environment
    #[arg(long)]
    pub from: String,

    /// Target environments
    #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
    pub to: Vec<String>,

    /// Only copy these parts
    #[arg(long, value_enum, value_delimiter = ',')]
    pub include: Vec<FlagPart>,

    /// Never copy these parts
    #[arg(long, value_enum, value_delimiter = ',')]
    pub exclude: Vec<FlagPart>,

    /// Comment recorded with the copy
    #[arg(short, long)]
    pub comment: Option<String>,
}

#[derive(Args)]
pub struct SegmentSyncArgs {
    pub project: String,
    pub segment: String,

    /// Source environment
    #[arg(long)]
    pub from: String,

    /// Target environments
    #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
    pub to: Vec<String>,

    /// Only copy these parts
    #[arg(long, value_enum, value_delimiter = ',')]
    pub include: Vec<SegmentPart>,

    /// Never copy these parts
    #[arg(long, value_enum, value_delimiter = ',')]
    pub exclude: Vec<SegmentPart>,
}

// ============================================================================
// Copy / Test data
// ============================================================================

#[derive(Subcommand)]
pub enum CopyCommand {
    /// Copy a project with its flags, optionally into another account
    Project(ProjectCopyArgs),
}

#[derive(Args)]
pub struct ProjectCopyArgs {
    /// Source project
    pub source: String,

    /// Destination project key
    pub dest: String,

    /// Destination project name (default: the source's)
    #[arg(long)]
    pub name: Option<String>,

    /// Only copy flags with one of these tags
    #[arg(short, long = "tag", value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Copy flags only: no environments, segments or targeting
    #[arg(long)]
    pub no_environments: bool,

    /// Variable holding the destination account's token (unset: same account)
    #[arg(long, default_value = DEFAULT_DEST_TOKEN_ENV)]
    pub dest_token_env: String,

    /// Destination API base URL
    #[arg(long)]
    pub dest_url: Option<String>,
}

#[derive(Args)]
pub struct TestDataArgs {
    /// Variable holding the environment's SDK key
    #[arg(long, default_value = DEFAULT_SDK_KEY_ENV)]
    pub sdk_key_env: String,

    /// Pin a flag to one of its variation values (JSON or plain string)
    #[arg(long = "set", value_name = "FLAG=VALUE", value_parser = parse_override)]
    pub overrides: Vec<(String, Value)>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Parts of a flag's environment configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlagPart {
    On,
    Prerequisites,
    Targets,
    Rules,
    Fallthrough,
    OffVariation,
}

impl From<FlagPart> for CopyAction {
    fn from(part: FlagPart) -> Self {
        match part {
            FlagPart::On => Self::UpdateOn,
            FlagPart::Prerequisites => Self::UpdatePrerequisites,
            FlagPart::Targets => Self::UpdateTargets,
            FlagPart::Rules => Self::UpdateRules,
            FlagPart::Fallthrough => Self::UpdateFallthrough,
            FlagPart::OffVariation => Self::UpdateOffVariation,
        }
    }
}

/// Parts of a segment copied besides its name, description and tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SegmentPart {
    /// Included and excluded users
    Targets,
    Rules,
}
