use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Media file extensions picked up when a folder is given as input
const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov"];

/// Configuration for target-size compression
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressConfig {
    /// Maximum allowed output size in megabytes (1 MB = 1024 * 1024 bytes)
    pub target_mb: Option<f64>,
    /// Maximum number of two-pass attempts per file
    pub max_iterations: u32,
    /// Multiplier applied to every bitrate correction (0 < damping <= 1)
    pub damping_factor: f64,
    /// x264 preset used for both passes
    pub preset: String,
    /// Path to the ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Path to the ffprobe binary
    pub ffprobe_bin: PathBuf,
    /// Kill a single ffmpeg pass after this many seconds
    pub pass_timeout_secs: Option<u64>,
    /// Directory under which per-job scratch directories are created
    pub scratch_dir: PathBuf,
    /// Output folder name used when no explicit output directory is given
    pub output_dir_name: String,
    /// Extensions (lowercase, without dot) treated as video files
    pub media_extensions: Vec<String>,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl CompressConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            target_mb: None,
            max_iterations: 10,
            damping_factor: 0.95,
            preset: "medium".to_string(),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            pass_timeout_secs: None,
            scratch_dir: std::env::temp_dir(),
            output_dir_name: "compressed_videos".to_string(),
            media_extensions: DEFAULT_MEDIA_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Check the options the convergence loop depends on
    pub fn validate(&self) -> Result<()> {
        match self.target_mb {
            None => bail!("target size is required (set target_mb or pass --target-mb)"),
            Some(mb) if !mb.is_finite() || mb <= 0.0 => {
                bail!("target_mb must be a positive number, got {}", mb)
            }
            Some(_) => {}
        }

        if self.max_iterations == 0 {
            bail!("max_iterations must be at least 1");
        }

        if !self.damping_factor.is_finite() || self.damping_factor <= 0.0 || self.damping_factor > 1.0 {
            bail!("damping_factor must be in (0, 1], got {}", self.damping_factor);
        }

        if self.preset.trim().is_empty() {
            bail!("preset must not be empty");
        }

        Ok(())
    }

    /// Target size in bytes; only meaningful after `validate` succeeded
    pub fn target_bytes(&self) -> crate::Result<u64> {
        let mb = self.target_mb.ok_or_else(|| {
            crate::CompressError::Validation("target size is not configured".to_string())
        })?;
        crate::bitrate::target_bytes_from_mb(mb)
    }
}
