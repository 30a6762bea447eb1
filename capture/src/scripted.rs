use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use qr_gate_common::frame::Frame;
use tokio::time::Instant;
use tracing::debug;

use crate::source::FrameSource;
use crate::CaptureError;

/// One slot of a scripted stream.
#[derive(Debug, Clone)]
pub enum ScriptedFrame {
    Image(RgbImage),
    /// A frame that fails to decode.
    Corrupt,
    /// The device answers the read with an HTTP error status.
    Fail(u16),
}

/// In-memory camera that paces frames like a live device.
///
/// Slot `i` is captured at `start + i * interval`, where `start` is the first
/// read. A read returns the newest slot not yet delivered, waiting for it if
/// it lies in the future. Slots that elapsed while the reader was busy are
/// dropped, as a camera would overwrite them. After the last slot the source
/// closes.
pub struct ScriptedCamera {
    frames: Vec<ScriptedFrame>,
    interval: Duration,
    started: Option<Instant>,
    next_slot: usize,
    open: bool,
    released: Arc<AtomicBool>,
}

impl ScriptedCamera {
    pub fn new(frames: Vec<ScriptedFrame>, interval: Duration) -> Self {
        Self {
            frames,
            interval: interval.max(Duration::from_millis(1)),
            started: None,
            next_slot: 0,
            open: true,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_images(images: Vec<RgbImage>, interval: Duration) -> Self {
        Self::new(images.into_iter().map(ScriptedFrame::Image).collect(), interval)
    }

    /// A device that never opened.
    pub fn unavailable() -> Self {
        let mut camera = Self::new(Vec::new(), Duration::from_millis(1));
        camera.open = false;
        camera
    }

    /// Flag set once [`FrameSource::release`] has run.
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    fn slot_due(&self, start: Instant) -> usize {
        let elapsed = Instant::now().saturating_duration_since(start);
        (elapsed.as_nanos() / self.interval.as_nanos()) as usize
    }
}

impl FrameSource for ScriptedCamera {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn read(&mut self) -> Result<Frame, CaptureError> {
        if !self.open {
            return Err(CaptureError::Closed);
        }
        let start = *self.started.get_or_insert_with(Instant::now);
        let slot = self.next_slot.max(self.slot_due(start));
        if slot >= self.frames.len() {
            debug!(slot, "scripted stream exhausted");
            self.open = false;
            return Err(CaptureError::Closed);
        }

        tokio::time::sleep_until(start + self.interval * slot as u32).await;
        self.next_slot = slot + 1;

        match &self.frames[slot] {
            ScriptedFrame::Image(image) => Ok(Frame::now(image.clone(), slot as u64)),
            ScriptedFrame::Corrupt => Err(CaptureError::CorruptFrame(format!(
                "scripted corrupt frame at slot {slot}"
            ))),
            ScriptedFrame::Fail(status) => Err(CaptureError::HttpStatus(*status)),
        }
    }

    fn release(&mut self) {
        self.open = false;
        self.released.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(n: usize) -> Vec<RgbImage> {
        (0..n).map(|_| RgbImage::new(8, 6)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_slots_in_order_at_frame_rate() {
        let mut camera = ScriptedCamera::from_images(blank(3), Duration::from_millis(100));
        let t0 = Instant::now();

        let seqs: Vec<u64> = [
            camera.read().await.unwrap().seq,
            camera.read().await.unwrap().seq,
            camera.read().await.unwrap().seq,
        ]
        .to_vec();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(Instant::now() - t0, Duration::from_millis(200));
        assert!(matches!(camera.read().await, Err(CaptureError::Closed)));
        assert!(!camera.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn drops_slots_missed_while_busy() {
        let mut camera = ScriptedCamera::from_images(blank(10), Duration::from_millis(100));
        assert_eq!(camera.read().await.unwrap().seq, 0);
        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(camera.read().await.unwrap().seq, 5);
        assert_eq!(camera.read().await.unwrap().seq, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_slot_is_transient() {
        let mut camera = ScriptedCamera::new(
            vec![
                ScriptedFrame::Corrupt,
                ScriptedFrame::Image(RgbImage::new(2, 2)),
            ],
            Duration::from_millis(10),
        );
        let err = camera.read().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(camera.read().await.unwrap().seq, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_slot_is_not_transient() {
        let mut camera = ScriptedCamera::new(
            vec![
                ScriptedFrame::Image(RgbImage::new(2, 2)),
                ScriptedFrame::Fail(503),
            ],
            Duration::from_millis(10),
        );
        assert_eq!(camera.read().await.unwrap().seq, 0);
        let err = camera.read().await.unwrap_err();
        assert!(matches!(err, CaptureError::HttpStatus(503)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn release_is_idempotent_and_observable() {
        let mut camera = ScriptedCamera::from_images(blank(2), Duration::from_millis(10));
        let released = camera.released_flag();
        camera.release();
        camera.release();
        assert!(released.load(Ordering::SeqCst));
        assert!(!camera.is_open());
        assert!(matches!(camera.read().await, Err(CaptureError::Closed)));
    }

    #[test]
    fn unavailable_camera_is_closed() {
        assert!(!ScriptedCamera::unavailable().is_open());
    }
}
