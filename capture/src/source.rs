use std::future::Future;

use qr_gate_common::frame::Frame;

use crate::CaptureError;

/// A camera the scan loop owns exclusively between start and stop.
pub trait FrameSource {
    fn is_open(&self) -> bool;

    /// Wait for the next frame.
    ///
    /// Errors for which [`CaptureError::is_transient`] holds affect only this
    /// frame; any other error means the source is gone.
    fn read(&mut self) -> impl Future<Output = Result<Frame, CaptureError>> + Send;

    /// Release the underlying device. Safe to call repeatedly.
    fn release(&mut self);
}
