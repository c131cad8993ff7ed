//! Raw stream to container conversion.
//!
//! The raw segment is the only copy of the footage until the container has
//! been written, so it is removed strictly after a verified conversion.

use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Converts a finished raw stream into a playback container.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Write `out` from `raw`. Must not touch `raw`.
    async fn convert(&self, raw: &Path, out: &Path) -> MediaResult<()>;
}

/// FFmpeg stream-copy converter (`-c copy`, no re-encode).
#[derive(Debug, Clone, Default)]
pub struct FfmpegConverter {
    runner: FfmpegRunner,
    /// Frame rate of the raw elementary stream, which carries no timestamps
    input_fps: Option<u32>,
}

impl FfmpegConverter {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self {
            runner,
            input_fps: None,
        }
    }

    pub fn with_input_fps(mut self, fps: u32) -> Self {
        self.input_fps = Some(fps);
        self
    }

    /// Build the stream-copy command.
    pub fn command(&self, raw: &Path, out: &Path) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(raw, out);
        let cmd = match self.input_fps {
            Some(fps) => cmd.input_framerate(fps),
            None => cmd,
        };
        cmd.stream_copy()
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    async fn convert(&self, raw: &Path, out: &Path) -> MediaResult<()> {
        self.runner
            .run(&self.command(raw, out))
            .await
            .map_err(|e| match e {
                MediaError::FfmpegFailed {
                    message,
                    stderr,
                    exit_code,
                } => MediaError::Conversion {
                    raw: raw.to_path_buf(),
                    message: match stderr {
                        Some(stderr) => format!("{message}: {stderr}"),
                        None => message,
                    },
                    exit_code,
                },
                other => other,
            })
    }
}

/// Converts a finished segment and removes the raw source on success.
pub struct TranscodePipeline {
    converter: Box<dyn Converter>,
}

impl TranscodePipeline {
    pub fn new(converter: Box<dyn Converter>) -> Self {
        Self { converter }
    }

    /// Convert `raw` into `out`.
    ///
    /// On success the converted file exists and `raw` has been deleted. On any
    /// failure `raw` is left untouched and a [`MediaError::Conversion`] is
    /// returned; a partially written `out` is removed.
    pub async fn finalize(&self, raw: &Path, out: &Path) -> MediaResult<()> {
        if let Err(e) = self.converter.convert(raw, out).await {
            discard_partial_output(out).await;
            return Err(as_conversion_error(raw, e));
        }

        if !tokio::fs::try_exists(out).await.unwrap_or(false) {
            return Err(MediaError::Conversion {
                raw: raw.to_path_buf(),
                message: format!("converter succeeded but {} is missing", out.display()),
                exit_code: Some(0),
            });
        }

        info!(raw = %raw.display(), out = %out.display(), "Segment converted");

        if let Err(e) = tokio::fs::remove_file(raw).await {
            warn!(raw = %raw.display(), "Converted but failed to delete raw stream: {}", e);
        } else {
            info!(raw = %raw.display(), "Raw stream deleted");
        }

        Ok(())
    }
}

/// Size of the raw segment at `raw`, failing when it is missing or empty.
pub async fn verify_segment(raw: &Path) -> MediaResult<u64> {
    match tokio::fs::metadata(raw).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        _ => Err(MediaError::SegmentWrite(raw.to_path_buf())),
    }
}

fn as_conversion_error(raw: &Path, error: MediaError) -> MediaError {
    match error {
        conversion @ MediaError::Conversion { .. } => conversion,
        other => MediaError::Conversion {
            raw: raw.to_path_buf(),
            message: other.to_string(),
            exit_code: None,
        },
    }
}

async fn discard_partial_output(out: &Path) {
    if tokio::fs::try_exists(out).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(out).await {
            warn!(out = %out.display(), "Failed to remove partial output: {}", e);
        }
    }
}
