//! Merging of YOLO-format dataset trees.
//!
//! A dataset root holds images and labels per split under fixed sub-directories.
//! Merging copies files by name, so a later source overwrites an earlier one.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::errors::{DatasetError, DatasetResult};

/// The four split directories every dataset root carries
pub const SPLITS: [&str; 4] = ["train/images", "train/labels", "valid/images", "valid/labels"];

/// Files copied into one destination split
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub split: &'static str,
    pub copied: usize,
    pub overwritten: usize,
    pub missing_sources: Vec<PathBuf>,
}

/// Outcome of [`merge_datasets`]
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub destination: PathBuf,
    pub splits: Vec<SplitReport>,
}

impl MergeReport {
    pub fn total_copied(&self) -> usize {
        self.splits.iter().map(|s| s.copied).sum()
    }

    pub fn total_overwritten(&self) -> usize {
        self.splits.iter().map(|s| s.overwritten).sum()
    }
}

/// Create the four split directories under `root` if absent
pub fn ensure_layout(root: &Path) -> DatasetResult<()> {
    for split in SPLITS {
        let dir = root.join(split);
        fs::create_dir_all(&dir).map_err(|source| DatasetError::CreateDirFailed {
            path: dir.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Copy every regular file of `src` into `dst`, returning the copied names.
///
/// A missing `src` copies nothing.
pub fn copy_all(src: &Path, dst: &Path) -> DatasetResult<Vec<OsString>> {
    fs::create_dir_all(dst).map_err(|source| DatasetError::CreateDirFailed {
        path: dst.to_path_buf(),
        source,
    })?;

    if !src.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(src).map_err(|source| DatasetError::ReadDirFailed {
        path: src.to_path_buf(),
        source,
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::ReadDirFailed {
            path: src.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            debug!("Skipping non-file entry {}", path.display());
            continue;
        }

        let name = entry.file_name();
        let target = dst.join(&name);
        fs::copy(&path, &target).map_err(|source| DatasetError::CopyFailed {
            from: path.clone(),
            to: target.clone(),
            source,
        })?;
        copied.push(name);
    }

    Ok(copied)
}

/// Merge `sources` into `destination`, in order.
///
/// The destination layout is created first. For each split, files of the first
/// source are copied, then the next; same-named files are overwritten.
pub fn merge_datasets<P: AsRef<Path>>(sources: &[P], destination: &Path) -> DatasetResult<MergeReport> {
    ensure_layout(destination)?;

    let mut report = MergeReport {
        destination: destination.to_path_buf(),
        splits: SPLITS
            .iter()
            .map(|&split| SplitReport {
                split,
                ..SplitReport::default()
            })
            .collect(),
    };

    for source in sources {
        let source = source.as_ref();
        info!("Copying {} -> {}", source.display(), destination.display());

        for split_report in report.splits.iter_mut() {
            let src = source.join(split_report.split);
            let dst = destination.join(split_report.split);

            if !src.is_dir() {
                warn!("Source split {} not found, skipping", src.display());
                split_report.missing_sources.push(src);
                continue;
            }

            let existing: HashSet<OsString> = list_file_names(&dst)?;
            let copied = copy_all(&src, &dst)?;

            split_report.overwritten += copied.iter().filter(|n| existing.contains(*n)).count();
            split_report.copied += copied.len();
        }
    }

    Ok(report)
}

fn list_file_names(dir: &Path) -> DatasetResult<HashSet<OsString>> {
    let entries = fs::read_dir(dir).map_err(|source| DatasetError::ReadDirFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut names = HashSet::new();
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::ReadDirFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.path().is_file() {
            names.insert(entry.file_name());
        }
    }
    Ok(names)
}
