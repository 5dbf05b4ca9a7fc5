use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use log::{error, info};
use serde::Serialize;
use crate::config::CompressConfig;
use crate::controller;
use crate::encode::MediaTools;
use crate::job::{Job, JobStatus};
use crate::scan::same_file;

/// Per-status job counts for a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub converged: usize,
    pub exhausted: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.converged + self.exhausted + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Converged => self.converged += 1,
            JobStatus::Exhausted => self.exhausted += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Pending | JobStatus::Running => {}
        }
    }
}

/// Pair every input with a destination of the same file name
///
/// Destinations go to `output_dir` when given, otherwise to
/// `<input parent>/<cfg.output_dir_name>`. Output directories are created.
pub fn plan_jobs(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    cfg: &CompressConfig,
) -> Result<Vec<Job>> {
    let target_bytes = cfg.target_bytes().context("Invalid target size")?;
    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(inputs.len());

    for source in inputs {
        let file_name = source
            .file_name()
            .with_context(|| format!("Input has no file name: {}", source.display()))?;

        let dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => source
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&cfg.output_dir_name),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

        let dest = dir.join(file_name);
        if same_file(source, &dest)? {
            bail!("Output would overwrite its source: {}", source.display());
        }
        if !seen.insert(dest.clone()) {
            bail!("Two inputs map to the same output: {}", dest.display());
        }

        jobs.push(Job::new(source.clone(), dest, target_bytes));
    }

    Ok(jobs)
}

/// Run jobs one after another; a failed job never stops the batch
pub async fn run_batch<T: MediaTools>(
    jobs: &mut [Job],
    cfg: &CompressConfig,
    tools: &T,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    let total = jobs.len();

    for (index, job) in jobs.iter_mut().enumerate() {
        let name = job
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info!("[{}/{}] Compressing {}...", index + 1, total, name);

        match controller::compress(job, cfg, tools).await {
            Ok(status) => info!(
                "[{}/{}] Compressed {} to {} ({:?})",
                index + 1,
                total,
                name,
                job.dest_path.display(),
                status
            ),
            Err(e) => error!("[{}/{}] Skipping {} after failure: {}", index + 1, total, name, e),
        }
        summary.record(job.status);
    }

    info!(
        "Batch complete: {} converged, {} exhausted, {} failed",
        summary.converged, summary.exhausted, summary.failed
    );
    summary
}
