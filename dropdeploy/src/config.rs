use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use dropdeploy_common::store::normalize_remote_root;

const DEFAULT_CONFIG_PATH: &str = "dropdeploy.toml";
const DEFAULT_TOKEN_ENV: &str = "DROPBOX_OAUTH_BEARER";

/// Which storage adapter to deploy through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Dropbox,
    Directory,
}

/// Fully-resolved, immutable options for one invocation.
#[derive(Debug, Clone)]
pub struct Options {
    pub artifacts_path: PathBuf,
    /// Remote deploy folder, always starting with `/`.
    pub remote_root: String,
    /// Name of the environment variable holding the access token.
    pub token_env: String,
    pub max_days: u32,
    pub max_files: usize,
    pub debug: bool,
    pub search: Option<String>,
    pub backend: BackendKind,
    pub directory_root: Option<PathBuf>,
}

/// Values a caller may force over the configuration file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub artifacts_path: Option<PathBuf>,
    pub dropbox_path: Option<String>,
    pub env: Option<String>,
    pub max_days: Option<u32>,
    pub max_files: Option<usize>,
    pub search: Option<String>,
    pub debug: Option<bool>,
}

/// The `[deploy]` table of the configuration file.
#[derive(Debug, Default, Deserialize)]
struct DeployTable {
    artifacts_path: Option<PathBuf>,
    dropbox_path: Option<String>,
    env: Option<String>,
    max_days: Option<u32>,
    max_files: Option<usize>,
    search: Option<String>,
    debug: Option<bool>,
    backend: Option<String>,
    directory_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    deploy: Option<DeployTable>,
}

/// Resolve the effective options for this run: defaults, overlaid with the
/// configuration file, overlaid with caller-supplied overrides.
///
/// Fails on a missing required option so the run aborts before any network
/// call is attempted.
pub fn resolve(config_path: Option<&Path>, overrides: Overrides) -> Result<Options> {
    let file = load_file(config_path)?;

    let artifacts_path = overrides
        .artifacts_path
        .or(file.artifacts_path)
        .context("artifacts_path is required (set it in dropdeploy.toml or pass --artifacts-path)")?;
    let dropbox_path = overrides
        .dropbox_path
        .or(file.dropbox_path)
        .context("dropbox_path is required (set it in dropdeploy.toml or pass --dropbox-path)")?;

    let backend = match file.backend.as_deref() {
        None | Some("dropbox") => BackendKind::Dropbox,
        Some("directory") => BackendKind::Directory,
        Some(other) => bail!("unknown backend `{other}` (expected \"dropbox\" or \"directory\")"),
    };

    Ok(Options {
        artifacts_path,
        remote_root: normalize_remote_root(&dropbox_path),
        token_env: overrides
            .env
            .or(file.env)
            .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_string()),
        max_days: overrides.max_days.or(file.max_days).unwrap_or(0),
        max_files: overrides.max_files.or(file.max_files).unwrap_or(0),
        debug: overrides.debug.or(file.debug).unwrap_or(false),
        search: overrides.search.or(file.search),
        backend,
        directory_root: file.directory_root,
    })
}

/// Load the `[deploy]` table. An explicitly named file must exist and must
/// contain the table; the default file is optional but must contain the
/// table when present.
fn load_file(config_path: Option<&Path>) -> Result<DeployTable> {
    let (path, required) = match config_path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    if !path.is_file() {
        if required {
            bail!("configuration file not found: {}", path.display());
        }
        return Ok(DeployTable::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    match parsed.deploy {
        Some(table) => Ok(table),
        None => bail!("{} must contain a [deploy] table", path.display()),
    }
}
