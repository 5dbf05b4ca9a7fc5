pub mod error;
pub mod config;
pub mod bitrate;
pub mod ffprobe;
pub mod scratch;
pub mod encode;
pub mod ffmpeg;
pub mod job;
pub mod controller;
pub mod scan;
pub mod batch;

pub use error::{CompressError, Result};
pub use config::CompressConfig;
pub use encode::{MediaTools, Pass, PassSpec};
pub use ffmpeg::FFmpegManager;
pub use job::{Job, JobStatus, PassAttempt};
pub use batch::BatchSummary;
