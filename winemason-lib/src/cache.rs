//! Per-user download cache
//!
//! One staging directory per user at `~/.cache/wine`, reused across runs so
//! installer artifacts are only downloaded once. Elevated transfers leave
//! root-owned files behind, so ownership and mode are re-asserted after
//! every mutating operation instead of only on creation.

use crate::download::Downloader;
use crate::error::Result;
use crate::shell::{RunOptions, ShellRunner};
use crate::users::UserLookup;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Mode re-asserted on the cache tree after each mutation
const CACHE_MODE: &str = "u+rwX,g+rwX,o+rX";

/// Per-user cache of downloaded installer artifacts
pub struct WineCache<'a> {
    shell: &'a dyn ShellRunner,
    users: &'a dyn UserLookup,
}

impl<'a> WineCache<'a> {
    pub fn new(shell: &'a dyn ShellRunner, users: &'a dyn UserLookup) -> Self {
        Self { shell, users }
    }

    /// Deterministic cache path for a user; existence is not guaranteed
    pub fn directory_for(&self, username: &str) -> Result<PathBuf> {
        Ok(self.users.home_dir(username)?.join(".cache").join("wine"))
    }

    /// Create the cache directory if absent and hand it to the user
    pub fn ensure(&self, username: &str) -> Result<PathBuf> {
        let directory = self.directory_for(username)?;
        let command = format!("mkdir -p \"{}\"", directory.display());
        self.shell
            .run(&command, &RunOptions::shell().sudo().quiet())?;
        self.assert_ownership(username, &directory)?;
        Ok(directory)
    }

    pub fn contains(&self, username: &str, filename: &str) -> Result<bool> {
        Ok(self.directory_for(username)?.join(filename).is_file())
    }

    /// Remove a cached artifact; removing an absent file is not an error
    pub fn remove(&self, username: &str, filename: &str) -> Result<()> {
        let directory = self.directory_for(username)?;
        let target = directory.join(filename);
        if !target.exists() {
            debug!("cache file {} already absent", target.display());
            return Ok(());
        }
        // the file may be root-owned after an elevated download
        let command = format!("rm -f \"{}\"", target.display());
        self.shell
            .run(&command, &RunOptions::shell().sudo().quiet())?;
        self.assert_ownership(username, &directory)?;
        Ok(())
    }

    /// Download an artifact into the cache.
    ///
    /// Transfer failures propagate unmodified; callers retry against a
    /// documented backup URL themselves, exactly once.
    pub fn store(
        &self,
        username: &str,
        filename: &str,
        url: &str,
        downloader: &dyn Downloader,
    ) -> Result<PathBuf> {
        let directory = self.ensure(username)?;
        let destination = directory.join(filename);
        downloader.fetch(url, &destination)?;
        self.assert_ownership(username, &directory)?;
        Ok(destination)
    }

    fn assert_ownership(&self, username: &str, directory: &Path) -> Result<()> {
        let chown = format!(
            "chown -R \"{user}\":\"{user}\" \"{dir}\"",
            user = username,
            dir = directory.display()
        );
        self.shell
            .run(&chown, &RunOptions::shell().sudo().quiet())?;
        let chmod = format!("chmod -R {} \"{}\"", CACHE_MODE, directory.display());
        self.shell
            .run(&chmod, &RunOptions::shell().sudo().quiet())?;
        Ok(())
    }
}
