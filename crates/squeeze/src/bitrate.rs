//! Bitrate arithmetic for the convergence loop.
//!
//! All bitrates are kilobits per second with 1 kbit = 1024 bits, matching how
//! the target size is expressed in binary megabytes.

use crate::error::{CompressError, Result};

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Convert a megabyte limit into whole bytes
pub fn target_bytes_from_mb(mb: f64) -> Result<u64> {
    if !mb.is_finite() || mb <= 0.0 {
        return Err(CompressError::Validation(format!(
            "target size must be positive, got {} MB",
            mb
        )));
    }

    let bytes = (mb * BYTES_PER_MB).floor() as u64;
    if bytes == 0 {
        return Err(CompressError::Validation(format!(
            "target size {} MB is smaller than one byte",
            mb
        )));
    }

    Ok(bytes)
}

/// Bitrate that would fill `target_bytes` over `duration_seconds`
pub fn initial_bitrate_kbps(target_bytes: u64, duration_seconds: f64) -> Result<f64> {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(CompressError::Validation(format!(
            "duration must be positive, got {} seconds",
            duration_seconds
        )));
    }
    if target_bytes == 0 {
        return Err(CompressError::Validation("target size must be positive".to_string()));
    }

    let bits_per_second = (target_bytes as f64 * 8.0) / duration_seconds;
    Ok(bits_per_second / 1024.0)
}

/// Damped proportional correction after an oversized attempt
pub fn next_bitrate_kbps(
    current_kbps: f64,
    target_bytes: u64,
    produced_bytes: u64,
    damping_factor: f64,
) -> Result<f64> {
    if produced_bytes == 0 {
        return Err(CompressError::Validation("produced size is zero".to_string()));
    }

    let ratio = target_bytes as f64 / produced_bytes as f64;
    let next = current_kbps * ratio * damping_factor;

    if !next.is_finite() || next <= 0.0 {
        return Err(CompressError::Validation(format!(
            "bitrate correction produced a non-positive bitrate ({} kbps)",
            next
        )));
    }

    Ok(next)
}

/// ffmpeg `-b:v` value; fractional kilobits are truncated
pub fn format_bitrate(kbps: f64) -> String {
    let whole = kbps.trunc().max(1.0) as u64;
    format!("{}k", whole)
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}
