pub mod mjpeg;
pub mod scripted;
pub mod source;

pub use mjpeg::MjpegCamera;
pub use scripted::{ScriptedCamera, ScriptedFrame};
pub use source::FrameSource;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera connection failed: {0}")]
    Connect(reqwest::Error),
    #[error("camera responded with HTTP status {0}")]
    HttpStatus(u16),
    #[error("camera stream error: {0}")]
    Stream(reqwest::Error),
    #[error("camera stream closed")]
    Closed,
    #[error("unreadable frame: {0}")]
    CorruptFrame(String),
}

impl CaptureError {
    /// Whether only the current frame is lost and the next read may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::CorruptFrame(_))
    }
}
