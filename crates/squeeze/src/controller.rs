//! Bitrate convergence loop.
//!
//! A job starts from the bitrate that would exactly fill the target over the
//! source duration, then re-encodes with a damped proportional correction
//! (`bitrate *= target / produced * damping`) until the output fits or the
//! attempt budget runs out.

use chrono::Utc;
use log::{debug, error, info, warn};
use crate::bitrate::{bytes_to_mb, format_bitrate, initial_bitrate_kbps, next_bitrate_kbps};
use crate::config::CompressConfig;
use crate::encode::{run_two_pass, MediaTools};
use crate::error::{CompressError, Result};
use crate::job::{Job, JobStatus, PassAttempt};
use crate::scratch::ScratchSpace;

/// Drive `job` to a terminal status.
///
/// Returns `Ok(Converged)` or `Ok(Exhausted)`; probe, validation and encoding
/// failures mark the job `Failed` and are returned as `Err`. Scratch artifacts
/// are removed on every path.
pub async fn compress<T: MediaTools>(
    job: &mut Job,
    cfg: &CompressConfig,
    tools: &T,
) -> Result<JobStatus> {
    job.status = JobStatus::Running;
    job.started_at = Some(Utc::now());
    info!(
        "Job {}: compressing {} -> {} (target {:.2} MB)",
        job.id,
        job.source_path.display(),
        job.dest_path.display(),
        bytes_to_mb(job.target_bytes)
    );

    let outcome = run_job(job, cfg, tools).await;

    job.finished_at = Some(Utc::now());
    match outcome {
        Ok(status) => {
            job.status = status;
            if status == JobStatus::Converged {
                info!(
                    "Job {}: ✅ {:?}, target size met after {} attempt(s)",
                    job.id,
                    status,
                    job.attempts.len()
                );
            } else {
                warn!(
                    "Job {}: ⚠️  {:?}, target not met after {} attempt(s); keeping last output ({:.2} MB)",
                    job.id,
                    status,
                    job.attempts.len(),
                    job.final_bytes().map(bytes_to_mb).unwrap_or(0.0)
                );
            }
            Ok(status)
        }
        Err(e) => {
            job.status = JobStatus::Failed;
            job.reason = Some(e.to_string());
            error!("Job {}: ❌ {:?}, compression failed: {}", job.id, job.status, e);
            Err(e)
        }
    }
}

async fn run_job<T: MediaTools>(job: &mut Job, cfg: &CompressConfig, tools: &T) -> Result<JobStatus> {
    if job.target_bytes == 0 {
        return Err(CompressError::Validation("target size must be positive".to_string()));
    }

    let duration = tools.probe_duration(&job.source_path).await?;
    job.duration_seconds = Some(duration);
    info!("Job {}: duration {:.3} seconds", job.id, duration);

    let mut bitrate_kbps = initial_bitrate_kbps(job.target_bytes, duration)?;
    job.bitrate_kbps = Some(bitrate_kbps);
    job.iteration = 0;

    let mut scratch = ScratchSpace::create(&cfg.scratch_dir, &job.id, &job.container_extension())?;
    let result = converge(job, cfg, tools, &scratch, &mut bitrate_kbps).await;

    let report = scratch.cleanup();
    if !report.is_clean() {
        // Logged only; the convergence result stands
        warn!(
            "Job {}: {} transient artifact(s) could not be removed",
            job.id,
            report.failures.len()
        );
    }

    result
}

async fn converge<T: MediaTools>(
    job: &mut Job,
    cfg: &CompressConfig,
    tools: &T,
    scratch: &ScratchSpace,
    bitrate_kbps: &mut f64,
) -> Result<JobStatus> {
    while job.iteration < cfg.max_iterations {
        info!(
            "Job {}: attempt {}/{}: target {:.2} MB, bitrate {}",
            job.id,
            job.iteration + 1,
            cfg.max_iterations,
            bytes_to_mb(job.target_bytes),
            format_bitrate(*bitrate_kbps)
        );

        let produced_bytes = run_two_pass(
            tools,
            &job.source_path,
            &job.dest_path,
            *bitrate_kbps,
            &cfg.preset,
            scratch,
        )
        .await?;

        job.attempts.push(PassAttempt {
            iteration: job.iteration,
            bitrate_kbps: *bitrate_kbps,
            produced_bytes,
        });
        info!(
            "Job {}: current size {:.2} MB ({} bytes)",
            job.id,
            bytes_to_mb(produced_bytes),
            produced_bytes
        );

        if produced_bytes <= job.target_bytes {
            return Ok(JobStatus::Converged);
        }

        *bitrate_kbps = next_bitrate_kbps(
            *bitrate_kbps,
            job.target_bytes,
            produced_bytes,
            cfg.damping_factor,
        )?;
        job.bitrate_kbps = Some(*bitrate_kbps);
        debug!("Job {}: next bitrate {:.3} kbps", job.id, *bitrate_kbps);

        scratch.remove_scratch_output();
        job.iteration += 1;
    }

    Ok(JobStatus::Exhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use proptest::prelude::*;
    use crate::encode::{Pass, PassSpec};
    use crate::scratch::passlog_files;

    const MB: u64 = 1024 * 1024;

    /// In-process encoder whose output size is `bytes_per_kbps * bitrate + overhead`
    struct LinearTools {
        duration: Option<f64>,
        bytes_per_kbps: f64,
        overhead: f64,
        fail_on: Option<(usize, Pass)>,
        calls: Mutex<Vec<(Pass, f64)>>,
    }

    impl LinearTools {
        fn new(duration: f64, bytes_per_kbps: f64, overhead: f64) -> Self {
            Self {
                duration: Some(duration),
                bytes_per_kbps,
                overhead,
                fail_on: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> usize {
            self.calls.lock().unwrap().iter().filter(|(p, _)| *p == Pass::Encode).count()
        }

        fn bitrates(&self) -> Vec<f64> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| *p == Pass::Analysis)
                .map(|(_, b)| *b)
                .collect()
        }
    }

    impl MediaTools for LinearTools {
        async fn probe_duration(&self, source: &Path) -> Result<f64> {
            self.duration
                .ok_or_else(|| CompressError::probe(source, "format.duration is missing"))
        }

        async fn run_pass(&self, spec: &PassSpec<'_>) -> Result<()> {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                calls.push((spec.pass, spec.bitrate_kbps));
                calls.iter().filter(|(p, _)| *p == Pass::Analysis).count() - 1
            };

            if spec.pass == Pass::Analysis {
                for log in passlog_files(spec.passlog_prefix) {
                    fs::write(log, b"stats").unwrap();
                }
            }

            if self.fail_on == Some((attempt, spec.pass)) {
                return Err(CompressError::encoding(
                    format!("{}: exit code 1", spec.pass),
                    "Error while opening encoder",
                ));
            }

            let size = (self.bytes_per_kbps * spec.bitrate_kbps + self.overhead) as u64;
            fs::File::create(spec.output).unwrap().set_len(size).unwrap();
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        scratch_root: PathBuf,
        cfg: CompressConfig,
        job: Job,
    }

    fn fixture(target_mb: f64) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let scratch_root = dir.path().join("scratch");
        fs::create_dir_all(&scratch_root).unwrap();
        let cfg = CompressConfig {
            target_mb: Some(target_mb),
            scratch_dir: scratch_root.clone(),
            ..Default::default()
        };
        let job = Job::new(
            dir.path().join("holiday.mp4"),
            dir.path().join("holiday-small.mp4"),
            cfg.target_bytes().unwrap(),
        );
        Fixture { _dir: dir, scratch_root, cfg, job }
    }

    fn assert_no_artifacts(scratch_root: &Path) {
        let leftovers: Vec<_> = fs::read_dir(scratch_root).unwrap().collect();
        assert!(leftovers.is_empty(), "scratch root not empty: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_converges_on_first_attempt() {
        let mut fx = fixture(25.0);
        // 120 s source, output slightly smaller than the nominal bitrate predicts
        let initial = initial_bitrate_kbps(25 * MB, 120.0).unwrap();
        let tools = LinearTools::new(120.0, 0.9 * (25 * MB) as f64 / initial, 0.0);

        let status = compress(&mut fx.job, &fx.cfg, &tools).await.unwrap();

        assert_eq!(status, JobStatus::Converged);
        assert_eq!(fx.job.status, JobStatus::Converged);
        assert_eq!(tools.attempts(), 1);
        assert_eq!(fx.job.attempts.len(), 1);
        assert_eq!(fx.job.iteration, 0);
        assert!((tools.bitrates()[0] - 1706.6667).abs() < 0.001);
        assert!(fx.job.dest_path.exists());
        assert!(fx.job.started_at.is_some() && fx.job.finished_at.is_some());
        assert_no_artifacts(&fx.scratch_root);
    }

    #[tokio::test]
    async fn test_oversized_attempt_applies_damped_correction() {
        let mut fx = fixture(25.0);
        let initial = initial_bitrate_kbps(25 * MB, 120.0).unwrap();
        // First attempt lands at 30 MB
        let tools = LinearTools::new(120.0, (30 * MB) as f64 / initial, 0.0);

        let status = compress(&mut fx.job, &fx.cfg, &tools).await.unwrap();

        assert_eq!(status, JobStatus::Converged);
        let bitrates = tools.bitrates();
        assert_eq!(bitrates.len(), 2);
        let expected = initial * (25.0 / 30.0) * 0.95;
        assert!((bitrates[1] - expected).abs() < 1e-3, "got {}", bitrates[1]);
        assert!(fx.job.attempts[0].produced_bytes.abs_diff(30 * MB) <= 1);
        assert!(fx.job.final_bytes().unwrap() <= 25 * MB);
        assert_no_artifacts(&fx.scratch_root);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_iterations() {
        let mut fx = fixture(25.0);
        // Fixed overhead alone exceeds the target, so no bitrate can satisfy it
        let tools = LinearTools::new(120.0, 100.0, (30 * MB) as f64);

        let status = compress(&mut fx.job, &fx.cfg, &tools).await.unwrap();

        assert_eq!(status, JobStatus::Exhausted);
        assert_eq!(fx.job.status, JobStatus::Exhausted);
        assert_eq!(tools.attempts(), 10);
        assert_eq!(fx.job.attempts.len(), 10);
        assert_eq!(fx.job.iteration, 10);
        assert!(fx.job.reason.is_none());

        // Destination holds the tenth attempt's output
        let last = fx.job.attempts.last().unwrap();
        assert_eq!(last.iteration, 9);
        assert_eq!(fs::metadata(&fx.job.dest_path).unwrap().len(), last.produced_bytes);
        assert_no_artifacts(&fx.scratch_root);
    }

    #[tokio::test]
    async fn test_respects_configured_iteration_budget() {
        let mut fx = fixture(25.0);
        fx.cfg.max_iterations = 3;
        let tools = LinearTools::new(120.0, 100.0, (30 * MB) as f64);

        let status = compress(&mut fx.job, &fx.cfg, &tools).await.unwrap();
        assert_eq!(status, JobStatus::Exhausted);
        assert_eq!(tools.attempts(), 3);
    }

    #[tokio::test]
    async fn test_analysis_failure_fails_job_and_cleans_up() {
        let mut fx = fixture(25.0);
        let mut tools = LinearTools::new(120.0, 1.0, 0.0);
        tools.fail_on = Some((0, Pass::Analysis));

        let err = compress(&mut fx.job, &fx.cfg, &tools).await.unwrap_err();

        assert!(matches!(err, CompressError::Encoding { .. }));
        assert_eq!(fx.job.status, JobStatus::Failed);
        assert!(fx.job.reason.as_deref().unwrap().contains("Error while opening encoder"));
        assert!(!fx.job.dest_path.exists());
        assert!(fx.job.attempts.is_empty());
        assert_no_artifacts(&fx.scratch_root);
    }

    #[tokio::test]
    async fn test_encode_failure_on_later_attempt_stops_loop() {
        let mut fx = fixture(25.0);
        let initial = initial_bitrate_kbps(25 * MB, 120.0).unwrap();
        let mut tools = LinearTools::new(120.0, (40 * MB) as f64 / initial, 0.0);
        tools.fail_on = Some((1, Pass::Encode));

        let err = compress(&mut fx.job, &fx.cfg, &tools).await.unwrap_err();

        assert!(matches!(err, CompressError::Encoding { .. }));
        assert_eq!(fx.job.status, JobStatus::Failed);
        assert_eq!(tools.attempts(), 2);
        assert_eq!(fx.job.attempts.len(), 1);
        assert_no_artifacts(&fx.scratch_root);
    }

    #[tokio::test]
    async fn test_probe_failure_runs_no_passes() {
        let mut fx = fixture(25.0);
        let mut tools = LinearTools::new(120.0, 1.0, 0.0);
        tools.duration = None;

        let err = compress(&mut fx.job, &fx.cfg, &tools).await.unwrap_err();

        assert!(matches!(err, CompressError::Probe { .. }));
        assert_eq!(fx.job.status, JobStatus::Failed);
        assert!(tools.calls.lock().unwrap().is_empty());
        assert_no_artifacts(&fx.scratch_root);
    }

    #[tokio::test]
    async fn test_zero_duration_is_validation_failure() {
        let mut fx = fixture(25.0);
        let tools = LinearTools::new(0.0, 1.0, 0.0);

        let err = compress(&mut fx.job, &fx.cfg, &tools).await.unwrap_err();
        assert!(matches!(err, CompressError::Validation(_)));
        assert_eq!(fx.job.status, JobStatus::Failed);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Linear size models converge within the default budget, bitrates only
        /// ever shrink, and nothing is left in the scratch root
        #[test]
        fn test_linear_models_converge(
            efficiency in 0.2f64..4.0,
            overhead_share in 0.0f64..0.4,
            damping in 0.5f64..0.97,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let mut fx = fixture(8.0);
            fx.cfg.damping_factor = damping;
            let target = fx.job.target_bytes;
            let initial = initial_bitrate_kbps(target, 60.0).unwrap();
            let tools = LinearTools::new(
                60.0,
                efficiency * target as f64 / initial,
                overhead_share * target as f64,
            );

            let status = rt.block_on(compress(&mut fx.job, &fx.cfg, &tools)).unwrap();

            prop_assert_eq!(status, JobStatus::Converged);
            prop_assert!(tools.attempts() <= 10);
            let bitrates = tools.bitrates();
            prop_assert!(bitrates.iter().all(|b| *b > 0.0));
            prop_assert!(bitrates.windows(2).all(|w| w[1] < w[0]));
            prop_assert!(fx.job.final_bytes().unwrap() <= target);
            assert_no_artifacts(&fx.scratch_root);
        }
    }
}
