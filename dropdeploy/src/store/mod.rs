pub mod directory;
pub mod dropbox;

pub use directory::DirectoryStore;
pub use dropbox::DropboxStore;

use anyhow::{Context, Result};

use dropdeploy_common::store::RemoteStore;

use crate::config::{BackendKind, Options};

/// Construct the storage adapter selected by the resolved options.
///
/// For the Dropbox backend this reads the access token from the configured
/// environment variable; a missing variable aborts the run before any
/// network call is made.
pub fn from_options(opts: &Options) -> Result<Box<dyn RemoteStore>> {
    match opts.backend {
        BackendKind::Dropbox => {
            let token = std::env::var(&opts.token_env).map_err(|_| {
                anyhow::anyhow!(
                    "you must have an environment variable `{}` in order to deploy to Dropbox",
                    opts.token_env
                )
            })?;
            Ok(Box::new(DropboxStore::new(token)))
        }
        BackendKind::Directory => {
            let root = opts
                .directory_root
                .clone()
                .context("directory_root is required when backend = \"directory\"")?;
            Ok(Box::new(DirectoryStore::new(root)))
        }
    }
}
