//! Camera capture and segment encoding.
//!
//! [`FfmpegCamera`] owns one FFmpeg process at a time. While a segment is
//! recording, that process encodes the camera straight to the segment's raw
//! H.264 path and also decodes it to RGB24 on stdout for the preview. The
//! encoder therefore runs at the camera's own rate, whatever the detector
//! throughput. A background reader drains stdout continuously and keeps only
//! the newest frame, so a slow consumer sees fresh frames and never stalls
//! the encoder.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner, PIPE_STDOUT};
use crate::error::{MediaError, MediaResult};
use crate::frame::{frame_from_raw, rgb_frame_len, Frame};

/// How long the encoder gets to flush after it is asked to stop.
const ENCODER_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest wait for a new frame before reporting "no frame".
const FRAME_WAIT: Duration = Duration::from_secs(2);

/// A camera that can preview frames and record an encoded stream.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Start capturing frames.
    async fn start(&mut self) -> MediaResult<()>;

    /// Stop capturing (and any recording in progress).
    async fn stop(&mut self) -> MediaResult<()>;

    /// Newest frame, or `None` when the device had nothing to deliver.
    ///
    /// Fails with [`MediaError::DeviceLost`] once the device has gone away;
    /// it stays lost until `stop` and `start` are called again.
    async fn capture_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Begin writing the encoded stream to `path`.
    async fn start_recording(&mut self, path: &Path) -> MediaResult<()>;

    /// Stop writing and flush the encoded stream to disk.
    async fn stop_recording(&mut self) -> MediaResult<()>;
}

/// Camera and encoder settings.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Input device (e.g. `/dev/video0`)
    pub device: String,
    /// FFmpeg demuxer for the device (e.g. `v4l2`)
    pub input_format: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Encoder bitrate in bits per second
    pub bitrate: u32,
    /// FFmpeg video encoder
    pub encoder: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            input_format: "v4l2".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            bitrate: 1_000_000,
            encoder: "libx264".to_string(),
        }
    }
}

impl CameraConfig {
    /// Command decoding the camera into raw RGB24 on stdout.
    pub fn capture_command(&self) -> FfmpegCommand {
        self.device_input().rgb24_output()
    }

    /// Command encoding the camera to `path` while also streaming RGB24 on stdout.
    pub fn record_command(&self, path: &Path) -> FfmpegCommand {
        self.device_input()
            .output_arg("-map")
            .output_arg("0:v")
            .video_codec(&self.encoder)
            .preset("ultrafast")
            .video_bitrate(self.bitrate)
            .output_arg("-pix_fmt")
            .output_arg("yuv420p")
            .output_format("h264")
            .extra_output(path)
            .output_arg("-map")
            .output_arg("0:v")
            .rgb24_output()
    }

    fn device_input(&self) -> FfmpegCommand {
        FfmpegCommand::new(&self.device, PIPE_STDOUT)
            .input_format(&self.input_format)
            .input_arg("-framerate")
            .input_arg(self.fps.to_string())
            .input_arg("-video_size")
            .input_arg(format!("{}x{}", self.width, self.height))
    }
}

/// A running capture process and its frame reader.
struct CapturePipeline {
    child: Child,
    frames: watch::Receiver<Option<Frame>>,
    reader: JoinHandle<()>,
    /// Raw segment being written, if this pipeline records
    recording: Option<PathBuf>,
}

/// FFmpeg-backed camera.
pub struct FfmpegCamera {
    config: CameraConfig,
    runner: FfmpegRunner,
    started: bool,
    pipeline: Option<CapturePipeline>,
}

impl FfmpegCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self::with_runner(config, FfmpegRunner::new())
    }

    pub fn with_runner(config: CameraConfig, runner: FfmpegRunner) -> Self {
        Self {
            config,
            runner,
            started: false,
            pipeline: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.pipeline
            .as_ref()
            .is_some_and(|p| p.recording.is_some())
    }

    fn spawn_pipeline(
        &self,
        cmd: &FfmpegCommand,
        recording: Option<PathBuf>,
    ) -> MediaResult<CapturePipeline> {
        let mut child = self
            .runner
            .spawn(cmd)
            .map_err(|e| MediaError::device_open(format!("{}: {}", self.config.device, e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::device_open("capture stdout not piped"))?;

        let (tx, frames) = watch::channel(None);
        let reader = tokio::spawn(read_frames(
            stdout,
            self.config.width,
            self.config.height,
            tx,
        ));

        Ok(CapturePipeline {
            child,
            frames,
            reader,
            recording,
        })
    }

    async fn shutdown_pipeline(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            terminate(pipeline).await;
        }
    }
}

#[async_trait]
impl CaptureDevice for FfmpegCamera {
    async fn start(&mut self) -> MediaResult<()> {
        if self.started {
            return Ok(());
        }

        let pipeline = self.spawn_pipeline(&self.config.capture_command(), None)?;
        info!(
            device = %self.config.device,
            width = self.config.width,
            height = self.config.height,
            fps = self.config.fps,
            "Camera started"
        );
        self.pipeline = Some(pipeline);
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) -> MediaResult<()> {
        self.shutdown_pipeline().await;
        if self.started {
            self.started = false;
            info!(device = %self.config.device, "Camera stopped");
        }
        Ok(())
    }

    async fn capture_frame(&mut self) -> MediaResult<Option<Frame>> {
        if !self.started {
            return Err(MediaError::device_open("camera not started"));
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(MediaError::device_lost("capture process not running"));
        };

        match tokio::time::timeout(FRAME_WAIT, pipeline.frames.changed()).await {
            Ok(Ok(())) => {
                let frame = pipeline.frames.borrow_and_update().clone();
                Ok(frame)
            }
            Ok(Err(_)) => {
                // Reader finished: the process closed its stdout
                let status = pipeline.child.wait().await.ok();
                self.pipeline = None;
                Err(MediaError::device_lost(format!(
                    "{}: capture process exited ({})",
                    self.config.device,
                    status.map_or_else(|| "unknown status".to_string(), |s| s.to_string())
                )))
            }
            Err(_) => {
                debug!(device = %self.config.device, "No frame within {:?}", FRAME_WAIT);
                Ok(None)
            }
        }
    }

    async fn start_recording(&mut self, path: &Path) -> MediaResult<()> {
        if !self.started {
            return Err(MediaError::device_open("camera not started"));
        }
        if self.is_recording() {
            return Err(MediaError::device_open("a segment is already recording"));
        }

        // Surface an unwritable path now rather than through a silent encoder exit
        tokio::fs::File::create(path)
            .await
            .map_err(|e| MediaError::device_open(format!("{}: {}", path.display(), e)))?;

        // The device can only be opened once, so the preview process makes way
        self.shutdown_pipeline().await;
        let pipeline =
            self.spawn_pipeline(&self.config.record_command(path), Some(path.to_path_buf()))?;

        info!(path = %path.display(), bitrate = self.config.bitrate, "Recording started");
        self.pipeline = Some(pipeline);
        Ok(())
    }

    async fn stop_recording(&mut self) -> MediaResult<()> {
        if !self.is_recording() {
            return Ok(());
        }
        self.shutdown_pipeline().await;
        // Back to preview so frames keep flowing between segments
        let pipeline = self.spawn_pipeline(&self.config.capture_command(), None)?;
        self.pipeline = Some(pipeline);
        Ok(())
    }
}

/// Drain RGB24 frames from `stdout`, publishing only the newest.
async fn read_frames(
    mut stdout: ChildStdout,
    width: u32,
    height: u32,
    frames: watch::Sender<Option<Frame>>,
) {
    let len = rgb_frame_len(width, height);
    loop {
        let mut data = vec![0u8; len];
        if let Err(e) = stdout.read_exact(&mut data).await {
            if e.kind() != ErrorKind::UnexpectedEof {
                warn!("Capture stream read failed: {}", e);
            }
            return;
        }
        match frame_from_raw(width, height, data) {
            Ok(frame) => {
                frames.send_replace(Some(frame));
            }
            Err(e) => warn!("Dropping malformed capture frame: {}", e),
        }
    }
}

/// Ask FFmpeg to finish its outputs, then reap it.
async fn terminate(mut pipeline: CapturePipeline) {
    request_exit(&mut pipeline.child);

    match tokio::time::timeout(ENCODER_FLUSH_TIMEOUT, pipeline.child.wait()).await {
        Ok(Ok(status)) => match &pipeline.recording {
            Some(path) => info!(
                path = %path.display(),
                exit_code = ?status.code(),
                "Recording stopped"
            ),
            None => debug!(exit_code = ?status.code(), "Capture process stopped"),
        },
        Ok(Err(e)) => warn!("Failed to reap capture process: {}", e),
        Err(_) => {
            warn!("Capture process did not exit in time, killing");
            if let Err(e) = pipeline.child.kill().await {
                warn!("Failed to kill capture process: {}", e);
            }
        }
    }
    pipeline.reader.abort();
}

/// SIGTERM lets FFmpeg flush the encoder and close the segment file.
#[cfg(unix)]
fn request_exit(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!("SIGTERM to capture process failed: {}", e);
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Failed to stop capture process: {}", e);
    }
}
