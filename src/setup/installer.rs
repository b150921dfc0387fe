//! Download and archive utilities used by the provisioner

use crate::common::{Error, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};

const USER_AGENT: &str = "vault-sync-harness";

/// Fetch a JSON document
pub async fn fetch_text(url: &str) -> Result<String> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::Provision(format!("Failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(Error::Provision(format!(
            "Request failed with status {}: {}",
            response.status(),
            url
        )));
    }

    response
        .text()
        .await
        .map_err(|e| Error::Provision(format!("Failed to read {}: {}", url, e)))
}

/// Download a file with progress reporting
pub async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| Error::Provision(format!("Failed to download {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(Error::Provision(format!(
            "Download failed with status {}: {}",
            response.status(),
            url
        )));
    }

    let total_size = response.content_length().unwrap_or(0);

    let pb = if total_size > 0 {
        let pb = ProgressBar::new(total_size);
        let style = ProgressStyle::default_bar()
            .template("  [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        Some(pb)
    } else {
        tracing::info!("Downloading {}", url);
        None
    };

    let mut file = std::fs::File::create(dest)
        .map_err(|e| Error::Provision(format!("Failed to create {}: {}", dest.display(), e)))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Provision(format!("Download error: {}", e)))?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        if let Some(ref pb) = pb {
            pb.set_position(downloaded);
        }
    }
    file.flush()?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    Ok(())
}

/// Extract a single entry from a zip archive to `dest`
///
/// Every other entry in the archive is ignored. The entry is written to a
/// sibling `.partial` file first and renamed into place, so an interrupted
/// extraction never leaves something at `dest` that looks like a cache hit.
pub fn extract_entry(archive_path: &Path, entry: &str, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::Provision(format!("Failed to open zip: {}", e)))?;

    let mut source = archive.by_name(entry).map_err(|_| {
        Error::Provision(format!(
            "Archive {} does not contain {}",
            archive_path.display(),
            entry
        ))
    })?;

    if let Some(parent) = dest.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let partial = sibling_with_suffix(dest, ".partial");
    {
        let mut out = std::fs::File::create(&partial)?;
        std::io::copy(&mut source, &mut out)?;
        out.flush()?;
    }
    std::fs::rename(&partial, dest)?;

    Ok(())
}

/// `dest` with `suffix` appended to its file name
pub fn sibling_with_suffix(dest: &Path, suffix: &str) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Make a file executable on Unix
#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
