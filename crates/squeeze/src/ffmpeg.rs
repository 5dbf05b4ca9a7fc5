use std::path::{Path, PathBuf};
use std::process::Stdio;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use crate::bitrate::format_bitrate;
use crate::config::CompressConfig;
use crate::encode::{MediaTools, PassSpec};
use crate::error::{CompressError, Result};
use crate::ffprobe::FFProbeData;

/// Video encoder used for both passes
pub const VIDEO_CODEC: &str = "libx264";

/// Result from FFmpeg execution
#[derive(Debug, Clone)]
pub struct FFmpegResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Handle on the ffmpeg/ffprobe binaries a job runs against
#[derive(Debug, Clone)]
pub struct FFmpegManager {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub pass_timeout_secs: Option<u64>,
}

impl FFmpegManager {
    pub fn new(config: &CompressConfig) -> Self {
        FFmpegManager {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
            pass_timeout_secs: config.pass_timeout_secs,
        }
    }

    /// Run `ffmpeg -version` and return its first line
    pub async fn verify(&self) -> Result<String> {
        let output = Command::new(&self.ffmpeg_bin)
            .arg("-version")
            .output()
            .await
            .map_err(|e| CompressError::encoding(
                format!("failed to execute ffmpeg at {}: {}", self.ffmpeg_bin.display(), e),
                "",
            ))?;

        if !output.status.success() {
            return Err(CompressError::encoding(
                "ffmpeg version check failed",
                String::from_utf8_lossy(&output.stderr),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let first_line = stdout.lines().next().unwrap_or_default().trim().to_string();
        info!("Using {}", first_line);
        Ok(first_line)
    }

    /// Execute ffmpeg with captured output and an optional timeout
    ///
    /// A non-zero exit, a spawn failure or a timeout all surface as
    /// `CompressError::Encoding` carrying whatever stderr was captured.
    pub async fn execute_ffmpeg(
        &self,
        args: Vec<String>,
        timeout_secs: Option<u64>,
    ) -> Result<FFmpegResult> {
        let cmd_str = format!("{} {}", self.ffmpeg_bin.display(), args.join(" "));
        debug!("Executing FFmpeg: {}", cmd_str);

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(&args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| CompressError::encoding(
            format!(
                "failed to spawn FFmpeg at {}: {}. Ensure FFmpeg is installed and accessible.",
                self.ffmpeg_bin.display(),
                e
            ),
            "",
        ))?;

        let stdout = child.stdout.take()
            .ok_or_else(|| CompressError::encoding("failed to capture FFmpeg stdout", ""))?;
        let stderr = child.stderr.take()
            .ok_or_else(|| CompressError::encoding("failed to capture FFmpeg stderr", ""))?;

        let stdout_handle = tokio::spawn(collect_lines(stdout));
        let stderr_handle = tokio::spawn(collect_lines(stderr));

        let waited = match timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    // Timed out - kill the process and report what it printed so far
                    let _ = child.kill().await;
                    let stderr = match timeout(Duration::from_secs(5), stderr_handle).await {
                        Ok(Ok(stderr)) => stderr,
                        _ => String::new(),
                    };
                    return Err(CompressError::encoding(
                        format!("FFmpeg process timed out after {} seconds and was killed", secs),
                        stderr,
                    ));
                }
            },
            None => child.wait().await,
        };

        let status = waited.map_err(|e| CompressError::encoding(
            format!("failed to wait for FFmpeg process: {}", e),
            "",
        ))?;

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();

        if !status.success() {
            return Err(CompressError::encoding(
                format!(
                    "exit code {}; command: {}",
                    status.code().unwrap_or(-1),
                    cmd_str
                ),
                stderr,
            ));
        }

        Ok(FFmpegResult {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }

    /// Run ffprobe and return its JSON format section
    pub async fn execute_ffprobe(&self, file_path: &Path) -> Result<String> {
        if !file_path.exists() {
            return Err(CompressError::probe(file_path, "file does not exist"));
        }

        debug!("Executing FFprobe for: {}", file_path.display());

        let output = Command::new(&self.ffprobe_bin)
            .arg("-v")
            .arg("error")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg(file_path)
            .output()
            .await
            .map_err(|e| CompressError::probe(
                file_path,
                format!("failed to execute FFprobe at {}: {}", self.ffprobe_bin.display(), e),
            ))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompressError::probe(
                file_path,
                format!(
                    "FFprobe failed (exit code {}): {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| CompressError::probe(file_path, "FFprobe output is not valid UTF-8"))
    }
}

async fn collect_lines<R>(reader: R) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    let mut line_stream = BufReader::new(reader).lines();
    while let Ok(Some(line)) = line_stream.next_line().await {
        lines.push(line);
    }
    lines.join("\n")
}

impl MediaTools for FFmpegManager {
    async fn probe_duration(&self, source: &Path) -> Result<f64> {
        let json = self.execute_ffprobe(source).await?;
        let data = FFProbeData::from_json(&json, source)?;
        debug!(
            "ffprobe {}: format={:?}",
            source.display(),
            data.format.format_name
        );
        data.duration_seconds(source)
    }

    async fn run_pass(&self, spec: &PassSpec<'_>) -> Result<()> {
        let args = CommandBuilder::new().build_pass_command(spec);
        self.execute_ffmpeg(args, self.pass_timeout_secs)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                CompressError::Encoding { message, diagnostic } => CompressError::Encoding {
                    message: format!("{}: {}", spec.pass, message),
                    diagnostic,
                },
                other => other,
            })
    }
}

/// Command builder for generating FFmpeg command lines
#[derive(Debug, Default)]
pub struct CommandBuilder;

impl CommandBuilder {
    pub fn new() -> Self {
        CommandBuilder
    }

    /// Build the argument list for one pass of a two-pass encode
    ///
    /// Both passes share codec, preset, bitrate and pass log prefix so the
    /// statistics from pass 1 line up with pass 2. Output always comes last.
    pub fn build_pass_command(&self, spec: &PassSpec<'_>) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            spec.source.to_string_lossy().to_string(),
            "-c:v".to_string(),
            VIDEO_CODEC.to_string(),
            "-preset".to_string(),
            spec.preset.to_string(),
            "-b:v".to_string(),
            format_bitrate(spec.bitrate_kbps),
            "-pass".to_string(),
            spec.pass.number().to_string(),
            "-passlogfile".to_string(),
            spec.passlog_prefix.to_string_lossy().to_string(),
            spec.output.to_string_lossy().to_string(),
        ]
    }
}
