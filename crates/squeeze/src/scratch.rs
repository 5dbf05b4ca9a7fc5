//! Per-job scratch directory for two-pass byproducts.
//!
//! Every job gets its own `squeeze-<job id>` directory so concurrent jobs never
//! share the analysis output or the ffmpeg pass logs.

use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use crate::error::{CompressError, Result};

/// File stem of the analysis pass output
pub const SCRATCH_STEM: &str = "temp_pass1";
/// Prefix handed to `-passlogfile`
pub const PASSLOG_PREFIX: &str = "ffmpeg2pass";

/// Log files ffmpeg writes for a given `-passlogfile` prefix
pub fn passlog_files(prefix: &Path) -> [PathBuf; 2] {
    let base = prefix.to_string_lossy();
    [
        PathBuf::from(format!("{}-0.log", base)),
        PathBuf::from(format!("{}-0.log.mbtree", base)),
    ]
}

/// What a cleanup pass removed and what it could not
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Exclusive scratch directory owned by one job
#[derive(Debug)]
pub struct ScratchSpace {
    job_id: String,
    dir: PathBuf,
    scratch_output: PathBuf,
    passlog_prefix: PathBuf,
    released: bool,
}

impl ScratchSpace {
    /// Create `<root>/squeeze-<job_id>`; `extension` is the container of the scratch output
    pub fn create(root: &Path, job_id: &str, extension: &str) -> Result<Self> {
        let dir = root.join(format!("squeeze-{}", job_id));
        fs::create_dir_all(&dir).map_err(|e| CompressError::io(&dir, e))?;

        let extension = if extension.is_empty() { "mp4" } else { extension };
        let scratch_output = dir.join(format!("{}.{}", SCRATCH_STEM, extension));
        let passlog_prefix = dir.join(PASSLOG_PREFIX);

        debug!("Job {}: scratch directory {}", job_id, dir.display());

        Ok(Self {
            job_id: job_id.to_string(),
            dir,
            scratch_output,
            passlog_prefix,
            released: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn scratch_output(&self) -> &Path {
        &self.scratch_output
    }

    pub fn passlog_prefix(&self) -> &Path {
        &self.passlog_prefix
    }

    /// All transient files an attempt may leave behind
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.scratch_output.clone()];
        paths.extend(passlog_files(&self.passlog_prefix));
        paths
    }

    /// Drop the analysis output between attempts; pass logs stay until `cleanup`
    pub fn remove_scratch_output(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        remove_if_exists(&self.job_id, &self.scratch_output, &mut report);
        report
    }

    /// Remove every artifact and the directory itself. Safe to call repeatedly.
    pub fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for path in self.artifacts() {
            remove_if_exists(&self.job_id, &path, &mut report);
        }

        // Stray `.temp` pass logs from an interrupted pass go with the directory
        if self.dir.exists() {
            match fs::remove_dir_all(&self.dir) {
                Ok(()) => debug!("Job {}: removed scratch directory {}", self.job_id, self.dir.display()),
                Err(e) => {
                    warn!("Job {}: failed to remove scratch directory {}: {}", self.job_id, self.dir.display(), e);
                    report.failures.push((self.dir.clone(), e.to_string()));
                }
            }
        }

        self.released = true;
        report
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if !self.released {
            let report = self.cleanup();
            if !report.removed.is_empty() {
                info!("Job {}: cleaned {} leftover artifact(s) on drop", self.job_id, report.removed.len());
            }
        }
    }
}

fn remove_if_exists(job_id: &str, path: &Path, report: &mut CleanupReport) {
    if !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Job {}: deleted {}", job_id, path.display());
            report.removed.push(path.to_path_buf());
        }
        Err(e) => {
            warn!("Job {}: failed to delete {}: {}", job_id, path.display(), e);
            report.failures.push((path.to_path_buf(), e.to_string()));
        }
    }
}
