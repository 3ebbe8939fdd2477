use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

/// Publish CI build artifacts to a remote Dropbox folder and keep that
/// folder bounded.
#[derive(Debug, Parser)]
#[command(name = "dropdeploy", version, about)]
pub struct Cli {
    /// Configuration file (default: dropdeploy.toml in the working directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Local artifact file or directory.
    #[arg(long, global = true)]
    pub artifacts_path: Option<PathBuf>,

    /// Remote folder the artifacts deploy to.
    #[arg(long, global = true)]
    pub dropbox_path: Option<String>,

    /// Name of the environment variable holding the access token.
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// When pruning, delete remote files older than this many days (0 = no limit).
    #[arg(long, global = true)]
    pub max_days: Option<u32>,

    /// When pruning, keep at most this many remote files (0 = no limit).
    #[arg(long, global = true)]
    pub max_files: Option<usize>,

    /// File name to look for with `exists`.
    #[arg(long, global = true)]
    pub search: Option<String>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload the artifact file or directory tree.
    Deploy,
    /// Download a single artifact from the remote folder.
    Download,
    /// Apply the retention policy to the remote folder.
    Prune,
    /// Check whether a named artifact exists in the remote folder.
    Exists,
}

impl Cli {
    /// Flag values that take precedence over the configuration file.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            artifacts_path: self.artifacts_path.clone(),
            dropbox_path: self.dropbox_path.clone(),
            env: self.env.clone(),
            max_days: self.max_days,
            max_files: self.max_files,
            search: self.search.clone(),
            debug: self.debug.then_some(true),
        }
    }
}
