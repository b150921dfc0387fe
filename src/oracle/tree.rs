//! File tree comparison
//!
//! [`compare_trees`] looks at one directory level at a time. Recursive
//! checks are built on top of it by descending into `common_dirs`.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::common::{Error, Result};

use super::SyncDirection;

/// Largest mtime difference a synced copy may have
///
/// The remote store rounds timestamps to whole seconds.
pub const MTIME_TOLERANCE: Duration = Duration::from_secs(1);

/// One level of a left/right directory comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryComparison {
    /// Files on both sides
    pub common_files: BTreeSet<String>,
    /// Directories on both sides
    pub common_dirs: BTreeSet<String>,
    /// Files on both sides whose contents differ
    pub diff_files: BTreeSet<String>,
    /// Entries only on the left
    pub left_only: BTreeSet<String>,
    /// Entries only on the right
    pub right_only: BTreeSet<String>,
}

impl DirectoryComparison {
    /// Common files with identical contents
    pub fn same_files(&self) -> impl Iterator<Item = &String> {
        self.common_files.difference(&self.diff_files)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Dir,
}

fn list(dir: &Path) -> Result<Vec<(String, Kind)>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::FileRead {
        path: dir.display().to_string(),
        error: e.to_string(),
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        let kind = if entry.file_type()?.is_dir() {
            Kind::Dir
        } else {
            Kind::File
        };
        out.push((entry.file_name().to_string_lossy().into_owned(), kind));
    }
    Ok(out)
}

/// Compare the immediate contents of two directories
///
/// A name that is a file on one side and a directory on the other counts as
/// present on neither side in common.
pub fn compare_trees(left: &Path, right: &Path) -> Result<DirectoryComparison> {
    let left_entries = list(left)?;
    let right_entries = list(right)?;
    let mut cmp = DirectoryComparison::default();

    for (name, kind) in &left_entries {
        match right_entries.iter().find(|(n, _)| n == name) {
            Some((_, other)) if other == kind => match kind {
                Kind::Dir => {
                    cmp.common_dirs.insert(name.clone());
                }
                Kind::File => {
                    if !same_contents(&left.join(name), &right.join(name))? {
                        cmp.diff_files.insert(name.clone());
                    }
                    cmp.common_files.insert(name.clone());
                }
            },
            _ => {
                cmp.left_only.insert(name.clone());
            }
        }
    }
    for (name, kind) in &right_entries {
        let matched = left_entries.iter().any(|(n, k)| n == name && k == kind);
        if !matched {
            cmp.right_only.insert(name.clone());
        }
    }
    Ok(cmp)
}

fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    let mut fa = fs::File::open(a)?;
    let mut fb = fs::File::open(b)?;
    let mut ba = [0u8; 8192];
    let mut bb = [0u8; 8192];
    loop {
        let n = fa.read(&mut ba)?;
        if n == 0 {
            return Ok(true);
        }
        fb.read_exact(&mut bb[..n])?;
        if ba[..n] != bb[..n] {
            return Ok(false);
        }
    }
}

/// Absolute difference between two timestamps
pub fn mtime_delta(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b)
        .or_else(|_| b.duration_since(a))
        .unwrap_or_default()
}

/// Check that `copy` carries the same mtime as `source` within tolerance
pub fn check_mtime(source: &Path, copy: &Path) -> Result<()> {
    let source_time = fs::metadata(source)?.modified()?;
    let copy_time = fs::metadata(copy)?.modified()?;
    let delta = mtime_delta(source_time, copy_time);
    if delta >= MTIME_TOLERANCE {
        return Err(Error::assertion(format!(
            "{} has mtime {} ms away from {}",
            copy.display(),
            delta.as_millis(),
            source.display()
        )));
    }
    Ok(())
}

/// Assert that a sync in `direction` left both trees converged
///
/// Walks every common directory. At each level no common file may differ and
/// every common file's mtime on the receiving side must match the sending
/// side. The top level must share at least one file, so two empty trees
/// don't pass by accident.
pub fn assert_converged(vault: &Path, remote: &Path, direction: SyncDirection) -> Result<()> {
    let top = compare_trees(vault, remote)?;
    if top.common_files.is_empty() {
        return Err(Error::assertion(format!(
            "{} and {} share no files after {}",
            vault.display(),
            remote.display(),
            direction
        )));
    }
    assert_level(vault, remote, direction, &top)
}

fn assert_level(
    vault: &Path,
    remote: &Path,
    direction: SyncDirection,
    cmp: &DirectoryComparison,
) -> Result<()> {
    if !cmp.diff_files.is_empty() {
        return Err(Error::assertion(format!(
            "files differ under {} after {}: {:?}",
            vault.display(),
            direction,
            cmp.diff_files
        )));
    }
    for name in &cmp.common_files {
        let (source, copy) = match direction {
            SyncDirection::Push => (vault.join(name), remote.join(name)),
            SyncDirection::Pull => (remote.join(name), vault.join(name)),
        };
        check_mtime(&source, &copy)?;
    }
    for dir in &cmp.common_dirs {
        let (v, r) = (vault.join(dir), remote.join(dir));
        let sub = compare_trees(&v, &r)?;
        assert_level(&v, &r, direction, &sub)?;
    }
    Ok(())
}
