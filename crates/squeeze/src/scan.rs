use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use walkdir::WalkDir;
use log::{debug, info, warn};

/// Whether `path` has one of `extensions` (case-insensitive, no leading dot)
pub fn is_media_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// List the video files directly inside `folder`, sorted by file name
///
/// Subdirectories are not descended into, so a previous run's output folder
/// inside `folder` is never picked up as input.
pub fn collect_inputs(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        anyhow::bail!("Input folder does not exist: {}", folder.display());
    }

    info!("Scanning directory: {}", folder.display());

    let mut inputs = Vec::new();
    let walker = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }

        if is_media_file(path, extensions) {
            debug!("Found media file: {}", path.display());
            inputs.push(path.to_path_buf());
        } else {
            debug!("Ignoring non-video file: {}", path.display());
        }
    }

    info!("Scan complete: {} video file(s) in {}", inputs.len(), folder.display());
    Ok(inputs)
}

/// Whether two paths name the same file
pub(crate) fn same_file(a: &Path, b: &Path) -> Result<bool> {
    if a == b {
        return Ok(true);
    }
    if !a.exists() || !b.exists() {
        return Ok(false);
    }
    let ca = a.canonicalize().with_context(|| format!("Failed to resolve {}", a.display()))?;
    let cb = b.canonicalize().with_context(|| format!("Failed to resolve {}", b.display()))?;
    Ok(ca == cb)
}
