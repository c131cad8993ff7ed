//! Live preview sinks.

use tracing::debug;

use crate::error::MediaResult;
use crate::frame::Frame;

/// Key that ends the current segment from the preview window.
pub const STOP_KEY: char = 'q';

/// Where annotated frames are published during recording.
pub trait PreviewSink: Send {
    /// Display one annotated frame.
    fn show(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Whether the operator asked to stop the current segment since the last call.
    fn stop_requested(&mut self) -> bool;

    /// Release the preview surface. The next `show` may reopen it.
    fn close(&mut self);
}

/// Preview that displays nothing, for unattended headless installs.
#[derive(Debug, Default)]
pub struct HeadlessPreview {
    frames_shown: u64,
}

impl HeadlessPreview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl PreviewSink for HeadlessPreview {
    fn show(&mut self, _frame: &Frame) -> MediaResult<()> {
        self.frames_shown += 1;
        Ok(())
    }

    fn stop_requested(&mut self) -> bool {
        false
    }

    fn close(&mut self) {
        debug!(frames = self.frames_shown, "Headless preview closed");
    }
}

#[cfg(feature = "opencv")]
pub use window::WindowPreview;

#[cfg(feature = "opencv")]
mod window {
    use opencv::core::Mat;
    use opencv::highgui;
    use opencv::imgproc;
    use tracing::warn;

    use super::{PreviewSink, STOP_KEY};
    use crate::detection::darknet::frame_to_mat;
    use crate::error::{MediaError, MediaResult};
    use crate::frame::Frame;

    /// HighGUI window; pressing `q` requests a stop.
    pub struct WindowPreview {
        name: String,
        open: bool,
    }

    impl WindowPreview {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                open: false,
            }
        }
    }

    impl PreviewSink for WindowPreview {
        fn show(&mut self, frame: &Frame) -> MediaResult<()> {
            if !self.open {
                highgui::named_window(&self.name, highgui::WINDOW_NORMAL)
                    .map_err(|e| MediaError::preview(e.to_string()))?;
                self.open = true;
            }

            let rgb = frame_to_mat(frame)?;
            let mut bgr = Mat::default();
            imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)
                .map_err(|e| MediaError::preview(e.to_string()))?;
            highgui::imshow(&self.name, &bgr).map_err(|e| MediaError::preview(e.to_string()))
        }

        fn stop_requested(&mut self) -> bool {
            if !self.open {
                return false;
            }
            // wait_key also pumps the window event loop
            match highgui::wait_key(1) {
                Ok(key) => key >= 0 && (key & 0xFF) == STOP_KEY as i32,
                Err(e) => {
                    warn!("Preview key poll failed: {}", e);
                    false
                }
            }
        }

        fn close(&mut self) {
            if self.open {
                if let Err(e) = highgui::destroy_window(&self.name) {
                    warn!("Failed to close preview window: {}", e);
                }
                self.open = false;
            }
        }
    }
}
