//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    audit::AuditCommands, bom::BomCommands, completions::CompletionsArgs, eco::EcoCommands,
    init::InitArgs, rev::RevCommands, source::SourceCommands, team::TeamCommands,
};

#[derive(Parser)]
#[command(name = "tcc")]
#[command(author, version, about = "Tessera Change Control")]
#[command(long_about = "Engineering change requests and notices through a gated approval lifecycle, with an append-only audit trail, BOM impact analysis and revision allocation.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging on stderr)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .tcc/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Act as this user (default: config author, then git user.name)
    #[arg(long, global = true)]
    pub author: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new change control project
    Init(InitArgs),

    /// Engineering change orders (ECR/ECN)
    #[command(subcommand)]
    Eco(EcoCommands),

    /// BOM consistency checks and where-used queries
    #[command(subcommand)]
    Bom(BomCommands),

    /// Letter revision codes
    #[command(subcommand)]
    Rev(RevCommands),

    /// Audit trail verification and export
    #[command(subcommand)]
    Audit(AuditCommands),

    /// Team roster management
    #[command(subcommand)]
    Team(TeamCommands),

    /// Manufacturer and supplier links
    #[command(subcommand)]
    Source(SourceCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, table for list)
    #[default]
    Auto,
    /// YAML format (full fidelity)
    Yaml,
    /// Tab-separated values (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Just IDs, one per line
    Id,
}
