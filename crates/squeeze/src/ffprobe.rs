use std::path::Path;
use serde::Deserialize;
use crate::error::{CompressError, Result};

/// The subset of `ffprobe -show_format` output the compressor reads
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeData {
    pub format: FFProbeFormat,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    #[serde(rename = "format_name")]
    pub format_name: Option<String>,
    /// Seconds, as a decimal string (ffprobe never emits a JSON number here)
    pub duration: Option<String>,
}

impl FFProbeData {
    /// Parse the JSON printed by `ffprobe -print_format json -show_format`
    pub fn from_json(json: &str, source: &Path) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            CompressError::probe(source, format!("failed to parse ffprobe JSON: {}", e))
        })
    }

    /// Container duration in seconds; must be present, numeric and positive
    pub fn duration_seconds(&self, source: &Path) -> Result<f64> {
        let raw = self
            .format
            .duration
            .as_deref()
            .ok_or_else(|| CompressError::probe(source, "format.duration is missing"))?;

        let duration: f64 = raw.trim().parse().map_err(|_| {
            CompressError::probe(source, format!("format.duration is not numeric: {:?}", raw))
        })?;

        if !duration.is_finite() || duration <= 0.0 {
            return Err(CompressError::probe(
                source,
                format!("format.duration must be positive, got {}", duration),
            ));
        }

        Ok(duration)
    }
}
