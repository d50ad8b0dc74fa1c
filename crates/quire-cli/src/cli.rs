use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "quire",
    about = "Quire: per-identity record repositories with schema-gated writes",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the configured data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load a lexicon directory, check its references and run its test data
    ValidateLexicon(ValidateLexiconArgs),
    /// Show a repository's head, size and recent commits
    Inspect(InspectArgs),
    /// Write a repository archive
    Export(ExportArgs),
    /// Read an archive into a repository
    Import(ImportArgs),
    /// Drop blocks no retained tree references
    Compact(CompactArgs),
}

#[derive(Args)]
pub struct ValidateLexiconArgs {
    /// Schema directory
    #[arg(long, default_value = "lexicon")]
    pub path: PathBuf,
    /// Record samples; files named `*-invalid-*` must fail validation
    #[arg(long)]
    pub test_data: Option<PathBuf>,
    /// Reject unknown fields and datetimes without an offset
    #[arg(long)]
    pub strict: bool,
    /// Skip the test data
    #[arg(long)]
    pub schemas_only: bool,
}

#[derive(Args)]
pub struct InspectArgs {
    pub did: String,
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,
    /// Also verify the commit chain and the head tree
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    pub did: String,
    /// Only changes after this revision
    #[arg(long)]
    pub since: Option<String>,
    /// Output file; standard output when absent
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ImportArgs {
    pub did: String,
    pub archive: PathBuf,
}

#[derive(Args)]
pub struct CompactArgs {
    pub did: String,
    /// Keep only the head's tree
    #[arg(long)]
    pub aggressive: bool,
}
