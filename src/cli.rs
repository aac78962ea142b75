//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Acquire and organize racing-sim setup files.
///
/// Downloads setups from subscription providers into the folder layout the
/// simulator expects, skipping files already held, and reorganizes setups
/// already on disk.
#[derive(Parser, Debug)]
#[command(name = "setup-downloader")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download new and updated setups from a provider
    Download(DownloadArgs),
    /// List the setups a provider offers and where they would go
    List(ListArgs),
    /// Reorganize setup files already on disk
    Organize(OrganizeArgs),
    /// Resolve a track name against the catalog
    Resolve(ResolveArgs),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Configuration subcommands.
#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
}

/// Supported providers.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderName {
    /// GoFast subscription setups
    Gofast,
    /// Coach Dave Academy weekly bundles
    Cda,
    /// Track Titan setup library
    Tracktitan,
}

/// Arguments for `download`.
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Provider to download from
    #[arg(value_enum)]
    pub provider: ProviderName,

    /// Provider credential: GoFast token, CDA session id or Track Titan access token
    /// (overrides the environment and the config file)
    #[arg(long)]
    pub token: Option<String>,

    /// Destination root (defaults to ~/Documents/iRacing/setups)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show what would be downloaded without fetching or writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Maximum concurrent downloads (1-20)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub concurrency: Option<u8>,

    /// Minimum pacing delay before each fetch, in milliseconds (max 60000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub min_delay: Option<u64>,

    /// Maximum pacing delay before each fetch, in milliseconds (max 60000)
    #[arg(long, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub max_delay: Option<u64>,

    /// Total fetch attempts per setup, including the first (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: Option<u8>,

    /// Download at most this many setups
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub limit: Option<u64>,
}

/// Arguments for `list`.
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Provider to list
    #[arg(value_enum)]
    pub provider: ProviderName,

    /// Provider credential: GoFast token, CDA session id or Track Titan access token
    /// (overrides the environment and the config file)
    #[arg(long)]
    pub token: Option<String>,

    /// Destination root used to show target folders
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `organize`.
#[derive(Args, Debug, Clone)]
pub struct OrganizeArgs {
    /// Directory containing setup files, one folder per car
    pub source: PathBuf,

    /// Destination root (defaults to reorganizing in place)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show what would happen without touching any file
    #[arg(long)]
    pub dry_run: bool,

    /// Copy files instead of moving them
    #[arg(long)]
    pub copy: bool,

    /// Category hint for ambiguous tracks (GT3, oval, dirt_road, ...)
    #[arg(long)]
    pub category: Option<String>,
}

/// Arguments for `resolve`.
#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Track name as a provider or filename spells it
    pub name: String,

    /// Category hint (GT3, oval, dirt_road, ...)
    #[arg(long)]
    pub category: Option<String>,
}
