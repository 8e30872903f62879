use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fire", about = "Inspect, copy and dump fire event files", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the streams, event count and run headers of a file
    Inspect(InspectArgs),
    /// Copy streams into a new file, upgrading known layouts
    Copy(CopyArgs),
    /// Print rows of one stream as JSON
    Dump(DumpArgs),
    /// Parse and validate a process configuration
    Check(CheckArgs),
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    pub file: PathBuf,
    /// Also print every run header
    #[arg(long)]
    pub runs: bool,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    pub source: PathBuf,
    /// Destination; the extension (.fcol or .ftree) picks the layout
    pub dest: PathBuf,
    /// Regex a stream name must match in full
    #[arg(long)]
    pub streams: Option<String>,
    /// First event row to copy
    #[arg(long, default_value_t = 0)]
    pub first: u64,
    /// Number of event rows to copy; all remaining when unset
    #[arg(long)]
    pub count: Option<u64>,
    #[arg(long)]
    pub rows_per_chunk: Option<usize>,
    /// zstd level, 1 to 22
    #[arg(long)]
    pub compression: Option<i32>,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    pub file: PathBuf,
    /// Full stream name, e.g. `events/sim/hits`
    pub stream: String,
    /// Print one row instead of the whole stream
    #[arg(long)]
    pub row: Option<u64>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    pub config: PathBuf,
}
