use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "spool",
    about = "Stream directory trees into and out of spool archives.",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(visible_alias = "c", about = "Archive a directory tree")]
    Create(CreateArgs),

    #[command(visible_alias = "x", about = "Extract an archive")]
    Extract(ExtractArgs),

    #[command(visible_aliases = ["l", "ls"], about = "List and verify the records of an archive")]
    List(ListArgs),
}

#[derive(Debug, clap::Args)]
#[command(after_help = "\
\x1b[1m\x1b[4mExamples:\x1b[0m
  spool create photos/ -o photos.spool
  spool create photos/ | ssh host spool extract -C /srv/backup")]
pub struct CreateArgs {
    /// Directory to archive
    pub dir: PathBuf,

    /// Output archive path (`-` or omitted for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Archive name of the root directory (defaults to its own name)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Bytes read from a file at once
    #[arg(long = "chunk-size", default_value_t = spool_format::core::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Overwrite an existing archive
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Suppress the summary
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

#[derive(Debug, clap::Args)]
pub struct ExtractArgs {
    /// Archive to extract (`-` or omitted for stdin)
    pub archive: Option<PathBuf>,

    /// Output directory (defaults to current directory)
    #[arg(short = 'C', long = "directory")]
    pub output: Option<PathBuf>,

    /// Skip files that fail verification instead of stopping
    #[arg(long)]
    pub keep_going: bool,

    /// Do not restore modification and access times
    #[arg(long)]
    pub no_times: bool,

    /// Bytes read from the archive at once
    #[arg(long = "chunk-size", default_value_t = spool_format::core::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Suppress the summary
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

#[derive(Debug, clap::Args)]
pub struct ListArgs {
    /// Archive to list (`-` or omitted for stdin)
    pub archive: Option<PathBuf>,

    /// Show timestamps
    #[arg(short = 'l', long)]
    pub long: bool,
}
