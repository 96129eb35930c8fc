use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Relocate media objects between storage backends.
#[derive(Debug, Parser)]
#[command(name = "mediashift", version, about)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(long, global = true, value_name = "FILE", env = "MEDIASHIFT_CONFIG")]
    pub config: Option<PathBuf>,
    /// Catalog database, overriding the configured one.
    #[arg(long, global = true, value_name = "FILE")]
    pub database: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List storage backends or batch definitions.
    #[command(subcommand)]
    List(ListCommand),
    /// Register a new storage backend.
    #[command(subcommand)]
    CreateBackend(CreateBackendCommand),
    /// Replace the notes of a backend.
    SetNotes {
        backend_id: i64,
        notes: String,
    },
    /// Copy the objects of a batch from one backend to another.
    Copy(CopyArgs),
    /// Produce scaled images of one deployment.
    Rescale(RescaleArgs),
    /// Inventory reports.
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(Debug, Subcommand)]
pub enum ListCommand {
    Backends,
    Batches,
}

#[derive(Debug, Subcommand)]
pub enum CreateBackendCommand {
    /// Provision a mounted disk: writes a marker file, README and archive directory.
    Local {
        priority: i64,
        notes: String,
        path: PathBuf,
        /// Label written into the marker file (default: the mount directory name).
        #[arg(long)]
        label: Option<String>,
    },
    /// Register an existing bucket, e.g. `https://s3.example.org/camera-traps`.
    ObjectStore {
        priority: i64,
        notes: String,
        url: String,
    },
}

#[derive(Debug, Args)]
pub struct CopyArgs {
    #[arg(long, value_name = "ID")]
    pub source: i64,
    #[arg(long, value_name = "ID")]
    pub target: i64,
    /// Don't copy objects already on the target; only record them.
    #[arg(long)]
    pub skip_existing: bool,
    /// List what would be copied and stop.
    #[arg(long)]
    pub dry_run: bool,
    pub batch_id: u32,
}

#[derive(Debug, Args)]
pub struct RescaleArgs {
    #[arg(long, value_name = "ID")]
    pub target: i64,
    /// Backend holding the originals (default: the target, rescaling in place).
    #[arg(long, value_name = "ID")]
    pub source: Option<i64>,
    /// Move the placement off the source and list the originals for deletion.
    #[arg(long)]
    pub remove: bool,
    /// Where to write the deletion list (default: standard output).
    #[arg(long, value_name = "FILE", requires = "remove")]
    pub deletion_list: Option<PathBuf>,
    pub deployment_id: i64,
}

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    /// Objects per deployment held by one backend.
    Archive { backend_id: i64 },
}
