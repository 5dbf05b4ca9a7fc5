use std::fmt;
use std::path::Path;
use log::debug;
use crate::error::{CompressError, Result};
use crate::scratch::ScratchSpace;

/// One half of a two-pass encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// `-pass 1`: gathers rate statistics into the pass log
    Analysis,
    /// `-pass 2`: writes the real output using those statistics
    Encode,
}

impl Pass {
    pub fn number(self) -> u8 {
        match self {
            Pass::Analysis => 1,
            Pass::Encode => 2,
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::Analysis => write!(f, "pass 1 (analysis)"),
            Pass::Encode => write!(f, "pass 2 (encode)"),
        }
    }
}

/// Everything an encoder needs for a single pass
#[derive(Debug, Clone)]
pub struct PassSpec<'a> {
    pub pass: Pass,
    pub source: &'a Path,
    pub output: &'a Path,
    pub bitrate_kbps: f64,
    pub preset: &'a str,
    pub passlog_prefix: &'a Path,
}

/// External media tools driven by a compression job
#[allow(async_fn_in_trait)]
pub trait MediaTools {
    /// Source duration in seconds
    async fn probe_duration(&self, source: &Path) -> Result<f64>;

    /// Run one encoder pass to completion
    async fn run_pass(&self, spec: &PassSpec<'_>) -> Result<()>;
}

/// Analysis pass into scratch, then encode pass into `dest`; returns the size of `dest`
pub async fn run_two_pass<T: MediaTools>(
    tools: &T,
    source: &Path,
    dest: &Path,
    bitrate_kbps: f64,
    preset: &str,
    scratch: &ScratchSpace,
) -> Result<u64> {
    if !bitrate_kbps.is_finite() || bitrate_kbps <= 0.0 {
        return Err(CompressError::Validation(format!(
            "bitrate must be positive, got {} kbps",
            bitrate_kbps
        )));
    }

    let analysis = PassSpec {
        pass: Pass::Analysis,
        source,
        output: scratch.scratch_output(),
        bitrate_kbps,
        preset,
        passlog_prefix: scratch.passlog_prefix(),
    };
    tools.run_pass(&analysis).await?;
    debug!("{} finished for {}", Pass::Analysis, source.display());

    let encode = PassSpec {
        pass: Pass::Encode,
        output: dest,
        ..analysis
    };
    tools.run_pass(&encode).await?;
    debug!("{} finished for {}", Pass::Encode, source.display());

    let metadata = std::fs::metadata(dest).map_err(|e| CompressError::io(dest, e))?;
    Ok(metadata.len())
}
