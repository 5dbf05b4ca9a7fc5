use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a compression job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    /// Output fits under the target size
    Converged,
    /// Attempt budget used up; the last output is kept as-is
    Exhausted,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Converged | JobStatus::Exhausted | JobStatus::Failed)
    }
}

/// Outcome of one two-pass attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassAttempt {
    pub iteration: u32,
    pub bitrate_kbps: f64,
    pub produced_bytes: u64,
}

/// One source file being squeezed under `target_bytes`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub target_bytes: u64,
    pub duration_seconds: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub iteration: u32,
    pub status: JobStatus,
    pub attempts: Vec<PassAttempt>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(source_path: PathBuf, dest_path: PathBuf, target_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_path,
            dest_path,
            target_bytes,
            duration_seconds: None,
            bitrate_kbps: None,
            iteration: 0,
            status: JobStatus::Pending,
            attempts: Vec::new(),
            reason: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Size of the output written by the most recent attempt
    pub fn final_bytes(&self) -> Option<u64> {
        self.attempts.last().map(|a| a.produced_bytes)
    }

    /// Extension for scratch output, taken from the destination container
    pub fn container_extension(&self) -> String {
        self.dest_path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| "mp4".to_string())
    }
}

/// Write job records as pretty JSON
pub fn save_jobs(jobs: &[Job], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(jobs).context("Failed to serialize jobs")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write job report: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(PathBuf::from("/v/a.MKV"), PathBuf::from("/v/out/a.MKV"), 1024);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.iteration, 0);
        assert!(job.final_bytes().is_none());
        assert_eq!(job.container_extension(), "mkv");
        assert!(Uuid::parse_str(&job.id).is_ok());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Job::new(PathBuf::from("a.mp4"), PathBuf::from("o/a.mp4"), 1);
        let b = Job::new(PathBuf::from("a.mp4"), PathBuf::from("o/a.mp4"), 1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Converged.is_terminal());
        assert!(JobStatus::Exhausted.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_report_round_trip_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut job = Job::new(PathBuf::from("/v/a.mp4"), PathBuf::from("/v/c/a.mp4"), 26_214_400);
        job.status = JobStatus::Exhausted;
        job.attempts.push(PassAttempt { iteration: 0, bitrate_kbps: 1706.6, produced_bytes: 31_457_280 });
        save_jobs(std::slice::from_ref(&job), &path).unwrap();

        let loaded: Vec<Job> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, job.id);
        assert_eq!(loaded[0].status, JobStatus::Exhausted);
        assert_eq!(loaded[0].final_bytes(), Some(31_457_280));
    }
}
