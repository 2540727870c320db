use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pfu")]
#[command(about = "Parallel file upload", long_about = None)]
pub struct Cli {
    /// Path of the SQLite state database (overrides configuration)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory and upload every pending file
    Upload(UploadArgs),
    /// Show record counts by upload status
    Status,
    /// Return failed records to pending so the next run retries them
    Reset(ResetArgs),
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
    /// Upload the single task read from stdin
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Directory to load files for upload
    #[arg(long = "root-dir", visible_alias = "root_dir", value_name = "ROOT_DIR")]
    pub root_dir: PathBuf,

    /// Run uploads as interleaved tasks on one thread (default)
    #[arg(long)]
    pub concurrent: bool,

    /// Run each upload in its own worker process
    #[arg(long)]
    pub parallel: bool,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Also reset in-progress and completed records
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Base directory of the local object store
    #[arg(long, value_name = "DIR")]
    pub store_root: PathBuf,
}
