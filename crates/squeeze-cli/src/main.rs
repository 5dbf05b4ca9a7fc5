use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::{Context, Result};
use clap::Parser;
use humansize::{format_size, BINARY};
use log::{info, warn};
use squeeze::{
    batch::{plan_jobs, run_batch},
    job::save_jobs,
    scan, CompressConfig, FFmpegManager, JobStatus,
};

/// Re-encode videos until they fit under a size limit
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video files or folders (folders are scanned non-recursively)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Maximum output size in MB
    #[arg(short, long)]
    target_mb: Option<f64>,

    /// Where compressed files are written (default: <input folder>/compressed_videos)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Maximum number of two-pass attempts per file
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Damping applied to each bitrate correction, in (0, 1]
    #[arg(long)]
    damping: Option<f64>,

    /// x264 preset for both passes
    #[arg(long)]
    preset: Option<String>,

    /// Path to the ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Path to the ffprobe binary
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Kill a single ffmpeg pass after this many seconds
    #[arg(long)]
    pass_timeout: Option<u64>,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write every job record to this JSON file when done
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Command-line flags take precedence over the config file
    fn apply(&self, cfg: &mut CompressConfig) {
        if let Some(mb) = self.target_mb {
            cfg.target_mb = Some(mb);
        }
        if let Some(n) = self.max_iterations {
            cfg.max_iterations = n;
        }
        if let Some(d) = self.damping {
            cfg.damping_factor = d;
        }
        if let Some(ref p) = self.preset {
            cfg.preset = p.clone();
        }
        if let Some(ref bin) = self.ffmpeg {
            cfg.ffmpeg_bin = bin.clone();
        }
        if let Some(ref bin) = self.ffprobe {
            cfg.ffprobe_bin = bin.clone();
        }
        if self.pass_timeout.is_some() {
            cfg.pass_timeout_secs = self.pass_timeout;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let mut cfg = CompressConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    args.apply(&mut cfg);
    cfg.validate().context("Invalid configuration")?;

    info!("Video compressor starting");
    info!("  Target size: {} MB", cfg.target_mb.unwrap_or_default());
    info!("  Max iterations: {}", cfg.max_iterations);
    info!("  Damping factor: {}", cfg.damping_factor);
    info!("  Preset: {}", cfg.preset);
    info!("  Scratch dir: {}", cfg.scratch_dir.display());

    let manager = FFmpegManager::new(&cfg);
    manager
        .verify()
        .await
        .with_context(|| format!("FFmpeg is not usable at {}", cfg.ffmpeg_bin.display()))?;

    let mut inputs = Vec::new();
    for input in &args.inputs {
        if input.is_dir() {
            inputs.extend(scan::collect_inputs(input, &cfg.media_extensions)?);
        } else if input.is_file() {
            if !scan::is_media_file(input, &cfg.media_extensions) {
                warn!("{} has an unrecognized extension, compressing anyway", input.display());
            }
            inputs.push(input.clone());
        } else {
            anyhow::bail!("Input does not exist: {}", input.display());
        }
    }

    if inputs.is_empty() {
        warn!("No video files found. Exiting.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut jobs = plan_jobs(&inputs, args.output_dir.as_deref(), &cfg)
        .context("Failed to plan compression jobs")?;

    let summary = run_batch(&mut jobs, &cfg, &manager).await;

    for job in &jobs {
        let size = job
            .final_bytes()
            .map(|b| format_size(b, BINARY))
            .unwrap_or_else(|| "-".to_string());
        match job.status {
            JobStatus::Failed => warn!(
                "{}: failed ({})",
                job.source_path.display(),
                job.reason.as_deref().unwrap_or("unknown error").lines().next().unwrap_or_default()
            ),
            status => info!(
                "{}: {:?}, {} after {} attempt(s) (limit {})",
                job.source_path.display(),
                status,
                size,
                job.attempts.len(),
                format_size(job.target_bytes, BINARY)
            ),
        }
    }

    if let Some(ref report) = args.report {
        save_jobs(&jobs, report)?;
        info!("Wrote job report to {}", report.display());
    }

    info!(
        "Compression process completed: {} of {} file(s) met the target",
        summary.converged,
        summary.total()
    );

    Ok(if summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
