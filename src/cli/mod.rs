//! CLI command definitions and handlers.

pub mod handlers;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// epgx - convert XMLTV program guides into searchable EPGX databases
#[derive(Parser, Debug)]
#[command(name = "epgx", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert XMLTV input(s) into an EPGX artifact
    Build(BuildArgs),

    /// Check the structure and invariants of an existing artifact
    Validate(ValidateArgs),

    /// Export an artifact to the legacy JTV ZIP format
    Jtv(JtvArgs),
}

/// Arguments for the `build` command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Output database file
    #[arg(short = 'o', long, default_value = "schedule.epgx.gz")]
    pub output: PathBuf,

    /// XMLTV file; may repeat, later files merge into earlier ones
    /// (default: read a single document from standard input)
    #[arg(short = 'i', long = "input")]
    pub inputs: Vec<PathBuf>,

    /// Start import from the specified date, e.g. "29-12-2009 16:40"
    #[arg(long, value_name = "DD-MM-YYYY HH:MM")]
    pub offset: Option<String>,

    /// Duration since the start date, in hours
    #[arg(long, value_name = "HOURS")]
    pub timespan: Option<u32>,

    /// Description length limit; negative values disable clipping
    #[arg(long, default_value_t = -1, value_name = "CHARS", allow_hyphen_values = true)]
    pub snippet: i64,

    /// File with pipe-separated channel ID mappings
    #[arg(long, value_name = "FILE")]
    pub xmap: Option<PathBuf>,

    /// Replace the timezone of XMLTV dates, e.g. "Asia/Novosibirsk"
    #[arg(long, value_name = "ZONE")]
    pub tz: Option<String>,

    /// Generate the legacy artifact for old clients (contentless FTS;
    /// created file won't support the snippet() SQL function)
    #[arg(long)]
    pub legacy: bool,

    /// Comma-separated list of channel IDs to include
    #[arg(long, value_name = "IDS")]
    pub include: Option<String>,

    /// Comma-separated list of channel IDs to exclude
    #[arg(long, value_name = "IDS")]
    pub exclude: Option<String>,

    /// Omit the tags column and table from the artifact
    #[arg(long)]
    pub no_tags: bool,

    /// Omit the year column from the artifact
    #[arg(long)]
    pub no_year: bool,

    /// DVR depth in hours for channels without their own mapping value
    #[arg(long, value_name = "HOURS")]
    pub archive_default: Option<u32>,

    /// Title template with Title, SubTitle and Description fields
    #[arg(long, value_name = "TEMPLATE")]
    pub title_template: Option<String>,

    /// Rewrite absolute programme image URLs against this base
    #[arg(long, value_name = "URL")]
    pub image_base: Option<String>,

    /// Insert a synthetic entry with this label after each channel's
    /// last programme
    #[arg(long, value_name = "TEXT")]
    pub end_title: Option<String>,

    /// XSPF playlist merged into the channel list before finalization
    #[arg(long, value_name = "FILE")]
    pub xspf: Option<PathBuf>,

    /// Log XSPF rename conflicts instead of aborting
    #[arg(long)]
    pub ignore_conflicts: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// EPGX file to check (plain or .gz)
    pub file: PathBuf,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,
}

/// Arguments for the `jtv` command
#[derive(Parser, Debug)]
pub struct JtvArgs {
    /// EPGX file to convert (plain or .gz)
    #[arg(short = 'i', long)]
    pub input: PathBuf,

    /// Output ZIP file
    #[arg(short = 'o', long, default_value = "schedule.jtv.zip")]
    pub output: PathBuf,

    /// JTV title charset
    #[arg(long, default_value = "UTF-8")]
    pub charset: String,

    /// Number of hours to add to each date
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub offset_time: i32,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// JSON output for programmatic consumption
    Json,
}
