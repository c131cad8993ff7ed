//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Default FFmpeg executable name, resolved through `PATH`.
pub const FFMPEG_BINARY: &str = "ffmpeg";

/// Stdout target for commands that write frames to a pipe.
pub const PIPE_STDOUT: &str = "pipe:1";

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path (or pipe)
    input: PathBuf,
    /// Output file path (or pipe)
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set the input demuxer (`-f` before -i).
    pub fn input_format(self, format: impl Into<String>) -> Self {
        self.input_arg("-f").input_arg(format)
    }

    /// Set the output muxer (`-f` after -i).
    pub fn output_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Emit raw RGB24 frames (`-f rawvideo -pix_fmt rgb24`).
    pub fn rgb24_output(self) -> Self {
        self.output_format("rawvideo")
            .output_arg("-pix_fmt")
            .output_arg("rgb24")
    }

    /// Set input frame rate (needed for raw elementary streams without timestamps).
    pub fn input_framerate(self, fps: u32) -> Self {
        self.input_arg("-framerate").input_arg(fps.to_string())
    }

    /// Copy every stream into the output container without re-encoding.
    pub fn stream_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set video bitrate in bits per second.
    pub fn video_bitrate(self, bits_per_second: u32) -> Self {
        self.output_arg("-b:v").output_arg(bits_per_second.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Close the output options given so far into an extra output at `path`.
    ///
    /// Later output arguments apply to the final output.
    pub fn extra_output(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_string_lossy().to_string();
        self.output_arg(path)
    }

    /// Do not pass `-y`.
    pub fn no_overwrite(mut self) -> Self {
        self.overwrite = false;
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        // Never wait on the terminal for input
        args.push("-nostdin".to_string());

        args.push("-v".to_string());
        args.push("error".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Executable to invoke
    binary: PathBuf,
    /// Timeout for one-shot commands
    timeout: Option<Duration>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a runner that invokes `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from(FFMPEG_BINARY),
            timeout: None,
        }
    }

    /// Use a specific executable instead of `ffmpeg`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Resolve the executable, failing if it is not installed.
    pub fn resolve(&self) -> MediaResult<PathBuf> {
        which::which(&self.binary).map_err(|_| MediaError::FfmpegNotFound)
    }

    /// Run a command to completion.
    ///
    /// Fails with [`MediaError::FfmpegFailed`] carrying the tail of stderr when
    /// the process exits non-zero.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let binary = self.resolve()?;
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", binary.display(), args.join(" "));

        let child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    // Dropping the future kills the child
                    warn!("FFmpeg timed out after {} seconds", timeout.as_secs());
                    return Err(MediaError::Timeout(timeout.as_secs()));
                }
            },
            None => child.wait_with_output().await?,
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = stderr_tail(&output.stderr);
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                (!stderr.is_empty()).then_some(stderr),
                output.status.code(),
            ))
        }
    }

    /// Spawn a long-running command with its stdout piped.
    pub fn spawn(&self, cmd: &FfmpegCommand) -> MediaResult<Child> {
        let binary = self.resolve()?;
        let args = cmd.build_args();
        debug!("Spawning FFmpeg: {} {}", binary.display(), args.join(" "));

        let child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        Ok(child)
    }
}

/// Last few lines of stderr, enough to diagnose a failure.
fn stderr_tail(stderr: &[u8]) -> String {
    const MAX_LINES: usize = 10;
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    lines[start..].join("\n")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    FfmpegRunner::new().resolve()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_copy_args() {
        let cmd = FfmpegCommand::new("in.h264", "out.mp4")
            .input_framerate(30)
            .stream_copy();

        let args = cmd.build_args();
        assert_eq!(
            args,
            vec![
                "-y", "-nostdin", "-v", "error", "-framerate", "30", "-i", "in.h264", "-c",
                "copy", "out.mp4"
            ]
        );
    }

    #[test]
    fn test_encode_args() {
        let cmd = FfmpegCommand::new("/dev/video0", "seg.h264")
            .input_format("v4l2")
            .video_codec("libx264")
            .video_bitrate(1_000_000)
            .output_format("h264");

        let args = cmd.build_args();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[..i].to_vec(), vec!["-y", "-nostdin", "-v", "error", "-f", "v4l2"]);
        assert_eq!(args[i + 1], "/dev/video0");
        assert!(args[i..].contains(&"1000000".to_string()));
        assert_eq!(args.last().unwrap(), "seg.h264");
    }

    #[test]
    fn test_extra_output_precedes_final_output() {
        let args = FfmpegCommand::new("/dev/video0", PIPE_STDOUT)
            .video_codec("libx264")
            .output_format("h264")
            .extra_output("seg.h264")
            .output_format("rawvideo")
            .build_args();
        let joined = args.join(" ");
        assert!(joined.ends_with("-c:v libx264 -f h264 seg.h264 -f rawvideo pipe:1"));
    }

    #[test]
    fn test_no_overwrite() {
        let args = FfmpegCommand::new("a", "b").no_overwrite().build_args();
        assert!(!args.contains(&"-y".to_string()));
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..20).map(|i| format!("line {i}\n")).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 19"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner = FfmpegRunner::new().with_binary("definitely-not-ffmpeg-daycam");
        let err = runner.run(&FfmpegCommand::new("a", "b")).await.unwrap_err();
        assert!(matches!(err, MediaError::FfmpegNotFound));
    }
}
