use image::RgbImage;

/// A decoded camera frame with acquisition metadata.
///
/// Frames live for a single scan iteration; nothing downstream keeps them.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Acquisition time, Unix millis.
    pub captured_at_ms: i64,
    /// Per-source sequence number, starting at 0.
    pub seq: u64,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            image,
            captured_at_ms,
            seq,
        }
    }

    /// Stamp an image with the current wall-clock time.
    pub fn now(image: RgbImage, seq: u64) -> Self {
        Self::new(image, chrono::Utc::now().timestamp_millis(), seq)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Acquisition time formatted for logs.
    pub fn captured_at(&self) -> String {
        format_millis(self.captured_at_ms)
    }
}

/// One decoded marker handed to the lookup/notify side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionEvent {
    pub payload: String,
    /// Acquisition time of the frame the payload was read from, Unix millis.
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl DetectionEvent {
    pub fn from_frame(payload: String, frame: &Frame) -> Self {
        Self {
            payload,
            captured_at_ms: frame.captured_at_ms,
            seq: frame.seq,
        }
    }

    pub fn captured_at(&self) -> String {
        format_millis(self.captured_at_ms)
    }
}

fn format_millis(ms: i64) -> String {
    let dt = chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(chrono::Utc::now);
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
