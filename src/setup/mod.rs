//! Driver provisioning
//!
//! Resolves, downloads and caches the version-pinned automation driver. The
//! cache is keyed by version only, so a second call for the same version is
//! a filesystem check with no network traffic.

pub mod index;
pub mod installer;

use std::path::{Path, PathBuf};

use crate::common::config::Config;
use crate::common::paths::{driver_cache_dir, driver_cache_path};
use crate::common::platform::{Arch, Platform};
use crate::common::Result;

use index::VersionIndex;

/// Everything the provisioner needs, detached from the config file
#[derive(Debug, Clone)]
pub struct DriverRequest {
    /// Version prefix to match against the index
    pub version: String,
    /// URL of the version index
    pub index_url: String,
    /// Directory the binary is cached in
    pub cache_dir: PathBuf,
    pub platform: Platform,
    pub arch: Arch,
}

impl DriverRequest {
    /// Build a request for the current platform from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            version: config.driver_version()?,
            index_url: config.driver.index_url.clone(),
            cache_dir: driver_cache_dir(config.driver.cache_dir.as_deref()),
            platform: Platform::current(),
            arch: Arch::current(),
        })
    }

    /// Where this version's binary lives once provisioned
    pub fn cache_path(&self) -> PathBuf {
        driver_cache_path(&self.cache_dir, &self.version)
    }
}

/// Ensure the configured driver is available and return its path
pub async fn ensure_driver(config: &Config) -> Result<PathBuf> {
    let request = DriverRequest::from_config(config)?;
    ensure_driver_for(&request).await
}

/// Ensure a driver is available for an explicit request
pub async fn ensure_driver_for(request: &DriverRequest) -> Result<PathBuf> {
    let path = request.cache_path();
    if path.exists() {
        tracing::debug!("Driver {} already cached at {}", request.version, path.display());
        return Ok(path);
    }

    tracing::info!(
        "Provisioning driver {} for {}",
        request.version,
        request.platform
    );

    let index = VersionIndex::parse(&installer::fetch_text(&request.index_url).await?)?;
    let (matched, url) =
        index.driver_url(&request.version, request.platform.driver_tag(request.arch))?;
    tracing::info!("Downloading driver {} from {}", matched, url);

    if !request.cache_dir.exists() {
        std::fs::create_dir_all(&request.cache_dir)?;
    }
    // The archive goes away with the staging dir
    let staging = tempfile::tempdir_in(&request.cache_dir)?;
    let archive = staging.path().join("driver.zip");
    installer::download_file(url, &archive).await?;

    install_from_archive(request, &archive, &path)?;

    tracing::info!("Driver ready at {}", path.display());
    Ok(path)
}

/// Pull the platform's binary out of a downloaded archive into the cache
pub fn install_from_archive(request: &DriverRequest, archive: &Path, dest: &Path) -> Result<()> {
    let entry = request.platform.driver_entry(request.arch);
    installer::extract_entry(archive, &entry, dest)?;
    if request.platform.needs_exec_bit() {
        installer::make_executable(dest)?;
    }
    Ok(())
}
