//! Vault fixture
//!
//! A throwaway copy of the template vault with the plugin build installed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::common::config::Config;
use crate::common::{Error, Result};

use super::teardown::TeardownStrategy;

/// Directory holding the application's own configuration
pub const CONFIG_DIR: &str = ".obsidian";

/// A vault directory owned by one test
#[derive(Debug)]
pub struct Vault {
    root: PathBuf,
    name: String,
    released: bool,
}

impl Vault {
    /// Create the vault from configuration
    pub fn create(config: &Config) -> Result<Self> {
        Self::create_at(
            &config.resolve(&config.vault.template),
            &config.resolve(&config.vault.path),
            &config.vault.name,
            &config.resolve(&config.app.plugin_dist),
            &config.app.plugin_id,
        )
    }

    /// Create a vault at `root` from `template`, installing the plugin build
    ///
    /// Leftovers from a failed run are removed first. A missing plugin build
    /// fails before anything is copied.
    pub fn create_at(
        template: &Path,
        root: &Path,
        name: &str,
        plugin_dist: &Path,
        plugin_id: &str,
    ) -> Result<Self> {
        if !plugin_dist.is_dir() {
            return Err(Error::MissingBuildArtifact(plugin_dist.display().to_string()));
        }
        if !template.is_dir() {
            return Err(Error::Config(format!(
                "Template vault not found at {}",
                template.display()
            )));
        }

        if root.exists() {
            tracing::warn!("Removing leftover vault at {}", root.display());
            fs::remove_dir_all(root)?;
        }

        copy_tree(template, root)?;
        let plugin_dir = root.join(CONFIG_DIR).join("plugins").join(plugin_id);
        copy_tree(plugin_dist, &plugin_dir)?;

        tracing::info!("Vault ready at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            name: name.to_string(),
            released: false,
        })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name shown in the vault launcher
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of a vault-relative entry
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Remove the vault directory
    pub async fn release(&mut self, strategy: &TeardownStrategy) {
        if self.released {
            return;
        }
        self.released = true;
        strategy.purge(&self.root).await;
        tracing::info!("Vault at {} released", self.root.display());
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        if !self.released {
            TeardownStrategy::purge_now(&self.root);
        }
    }
}

/// Recursively copy a directory tree, creating `dest`
///
/// File modification times are carried over so a copied tree starts out
/// converged with its source.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            let modified = entry.metadata()?.modified()?;
            fs::File::options()
                .write(true)
                .open(&target)?
                .set_modified(modified)?;
        }
    }
    Ok(())
}
