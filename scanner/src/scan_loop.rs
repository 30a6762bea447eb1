//! The scanning state machine. It sizes the zone from the first frame, then
//! reads, renders, detects and decodes until a stop condition, handing each
//! decoded payload to the lookup worker and pausing on its outcome.

use std::time::Duration;

use image::{DynamicImage, GrayImage, RgbImage};
use qr_gate_capture::{CaptureError, FrameSource};
use qr_gate_common::config::{Config, Language, ScanConfig, ZoneConfig};
use qr_gate_common::event::HandoffOutcome;
use qr_gate_common::frame::{DetectionEvent, Frame};
use tracing::{debug, error, info, trace, warn};

use crate::decoder::{select_payload, QrDecoder};
use crate::detector::{Candidate, CandidateDetector, DetectorParams};
use crate::display::Display;
use crate::geometry::{detection_square, OrderedRect, ZoneError};
use crate::handoff::HandoffClient;
use crate::input::OperatorInput;
use crate::overlay::{outline_markers, OverlayRenderer};

pub const SCANNER_VIEW: &str = "QR scanner";
pub const EDGES_VIEW: &str = "Edges";
pub const CROPPED_VIEW: &str = "Cropped";

/// Reads tried at startup before giving up on the camera.
const STARTUP_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Zone(#[from] ZoneError),
    #[error("camera is not available")]
    CameraUnavailable,
    #[error("camera produced no initial frame: {0}")]
    NoInitialFrame(#[source] CaptureError),
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub zone_side: u32,
    pub detector: DetectorParams,
    pub language: Language,
    pub pause_success: Duration,
    pub pause_failure: Duration,
    pub frame_yield: Duration,
    /// Show the edge map and the decoded crop next to the scanner view.
    pub debug_views: bool,
}

impl ScanSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            zone_side: config.zone.side,
            detector: DetectorParams::from(&config.detector),
            language: config.overlay.language,
            pause_success: Duration::from_secs(config.scan.pause_success_secs),
            pause_failure: Duration::from_secs(config.scan.pause_failure_secs),
            frame_yield: Duration::from_millis(config.scan.frame_yield_ms),
            debug_views: config.logging.debug,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        let scan = ScanConfig::default();
        Self {
            zone_side: ZoneConfig::default().side,
            detector: DetectorParams::default(),
            language: Language::default(),
            pause_success: Duration::from_secs(scan.pause_success_secs),
            pause_failure: Duration::from_secs(scan.pause_failure_secs),
            frame_yield: Duration::from_millis(scan.frame_yield_ms),
            debug_views: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Escape or quit key.
    OperatorStop,
    /// The camera closed its stream.
    StreamEnded,
    /// A read failed in a way the next read will not fix.
    CameraFailure(String),
    /// The camera never opened or never produced a frame.
    CameraUnavailable,
    /// The detection zone could not be built.
    Configuration(String),
    /// Frames no longer overlap the detection zone.
    EmptyZone,
}

impl From<ScanError> for StopReason {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::Zone(e) => StopReason::Configuration(e.to_string()),
            ScanError::CameraUnavailable | ScanError::NoInitialFrame(_) => {
                StopReason::CameraUnavailable
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Loop bodies run in the running state.
    pub iterations: u64,
    /// Events handed off to the collaborator.
    pub events: u64,
    /// How many of `events` ended in a notification.
    pub notified: u64,
    /// The most recent handed-off event.
    pub last_event: Option<DetectionEvent>,
    pub stop_reason: StopReason,
}

enum ScanState {
    Starting,
    Running { zone: OrderedRect },
    Stopped(StopReason),
}

/// What happened in one running iteration.
enum Step {
    Continue,
    Detected(DetectionEvent, HandoffOutcome),
    Stop(StopReason),
}

/// The scanning state machine: starting, running, stopped.
///
/// Owns the camera for its whole life and releases it, together with the
/// display, when it stops.
pub struct Scanner<S: FrameSource, D: Display> {
    source: S,
    display: D,
    input: OperatorInput,
    handoff: HandoffClient,
    detector: CandidateDetector,
    decoder: QrDecoder,
    overlay: OverlayRenderer,
    settings: ScanSettings,
    state: ScanState,
    released: bool,
}

impl<S: FrameSource, D: Display> Scanner<S, D> {
    pub fn new(source: S, display: D, handoff: HandoffClient, settings: ScanSettings) -> Self {
        Self {
            source,
            display,
            input: OperatorInput::none(),
            handoff,
            detector: CandidateDetector::new(settings.detector.clone()),
            decoder: QrDecoder::new(),
            overlay: OverlayRenderer::new(),
            settings,
            state: ScanState::Starting,
            released: false,
        }
    }

    pub fn with_input(mut self, input: OperatorInput) -> Self {
        self.input = input;
        self
    }

    pub fn with_overlay(mut self, overlay: OverlayRenderer) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, ScanState::Stopped(_))
    }

    /// Drive the state machine until it stops.
    pub async fn run(&mut self) -> ScanReport {
        let mut iterations = 0;
        let mut events = 0;
        let mut notified = 0;
        let mut last_event = None;

        loop {
            match &self.state {
                ScanState::Starting => match self.start().await {
                    Ok(zone) => {
                        info!(corners = ?zone.corners(), "scanner running");
                        self.state = ScanState::Running { zone };
                    }
                    Err(e) => {
                        error!(error = %e, "scanner failed to start");
                        self.shutdown(e.into());
                    }
                },
                ScanState::Running { zone } => {
                    let zone = *zone;
                    iterations += 1;
                    match self.step(&zone).await {
                        Step::Continue => {}
                        Step::Detected(event, outcome) => {
                            events += 1;
                            if outcome.is_notified() {
                                notified += 1;
                            }
                            last_event = Some(event);
                        }
                        Step::Stop(reason) => self.shutdown(reason),
                    }
                }
                ScanState::Stopped(reason) => {
                    info!(iterations, events, notified, ?reason, "scanner stopped");
                    return ScanReport {
                        iterations,
                        events,
                        notified,
                        last_event: last_event.take(),
                        stop_reason: reason.clone(),
                    };
                }
            }
        }
    }

    /// Enter the stopped state, releasing the camera and display once.
    pub fn shutdown(&mut self, reason: StopReason) {
        if !self.released {
            self.source.release();
            self.display.close();
            self.released = true;
            debug!("camera and display released");
        }
        if !self.is_stopped() {
            self.state = ScanState::Stopped(reason);
        }
    }

    async fn start(&mut self) -> Result<OrderedRect, ScanError> {
        if !self.source.is_open() {
            return Err(ScanError::CameraUnavailable);
        }

        let mut attempts = 0;
        let frame = loop {
            attempts += 1;
            match self.source.read().await {
                Ok(frame) => break frame,
                Err(e) if e.is_transient() && attempts < STARTUP_ATTEMPTS => {
                    warn!(error = %e, attempts, "unreadable frame at startup, retrying");
                }
                Err(e) => return Err(ScanError::NoInitialFrame(e)),
            }
        };

        let (width, height) = (frame.width(), frame.height());
        let zone = detection_square(width, height, self.settings.zone_side)?;
        info!(
            width,
            height,
            side = self.settings.zone_side,
            "detection zone computed"
        );
        Ok(zone)
    }

    async fn step(&mut self, zone: &OrderedRect) -> Step {
        if self.stop_requested() {
            return Step::Stop(StopReason::OperatorStop);
        }

        let frame = match self.source.read().await {
            Ok(frame) => frame,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "skipping unreadable frame");
                return Step::Continue;
            }
            Err(CaptureError::Closed) => {
                info!("camera stream ended");
                return Step::Stop(StopReason::StreamEnded);
            }
            Err(e) => {
                error!(error = %e, "camera read failed");
                return Step::Stop(StopReason::CameraFailure(e.to_string()));
            }
        };

        let (x, y, _, _) = zone.bounds();
        if x >= frame.width() || y >= frame.height() {
            error!(
                width = frame.width(),
                height = frame.height(),
                "frame does not overlap the detection zone"
            );
            return Step::Stop(StopReason::EmptyZone);
        }

        let view = self
            .overlay
            .render(&frame.image, zone, self.settings.language);
        self.show(SCANNER_VIEW, &view);

        tokio::time::sleep(self.settings.frame_yield).await;

        let Some(candidate) = self.find_candidate(&frame, zone) else {
            return Step::Continue;
        };

        let payload = self.read_marker(&candidate);
        if payload.is_empty() {
            trace!(seq = frame.seq, "candidate holds no readable QR code");
            return Step::Continue;
        }

        let event = DetectionEvent::from_frame(payload, &frame);
        info!(
            payload = %event.payload,
            captured_at = %event.captured_at(),
            seq = event.seq,
            "QR code detected"
        );

        let outcome = self.handoff.submit(event.clone()).await;
        let pause = match &outcome {
            HandoffOutcome::Notified => {
                info!(payload = %event.payload, "recipient notified");
                self.settings.pause_success
            }
            HandoffOutcome::Unmatched => {
                info!(payload = %event.payload, "no order for scanned address");
                self.settings.pause_failure
            }
            HandoffOutcome::Failed(reason) => {
                warn!(payload = %event.payload, reason = %reason, "handoff failed");
                self.settings.pause_failure
            }
        };
        debug!(pause_ms = pause.as_millis() as u64, "pausing after detection");
        tokio::time::sleep(pause).await;

        Step::Detected(event, outcome)
    }

    fn stop_requested(&mut self) -> bool {
        let keys = std::iter::from_fn(|| self.display.poll_key())
            .chain(std::iter::from_fn(|| self.input.poll()));
        for key in keys {
            if key.is_stop() {
                info!(?key, "stop key pressed");
                return true;
            }
            debug!(?key, "ignoring key");
        }
        false
    }

    fn find_candidate(&mut self, frame: &Frame, zone: &OrderedRect) -> Option<Candidate> {
        if !self.settings.debug_views {
            return self.detector.detect(&frame.image, zone);
        }
        let (candidate, edges) = self.detector.detect_with_edges(&frame.image, zone);
        self.show(EDGES_VIEW, &gray_to_rgb(edges));
        candidate
    }

    fn read_marker(&mut self, candidate: &Candidate) -> String {
        if !self.settings.debug_views {
            return self.decoder.decode(&candidate.crop);
        }
        let markers = self.decoder.decode_all(&candidate.crop);
        self.show(CROPPED_VIEW, &outline_markers(&candidate.crop, &markers));
        select_payload(&markers)
    }

    fn show(&mut self, view: &str, image: &RgbImage) {
        if let Err(e) = self.display.show(view, image) {
            warn!(view, error = %e, "failed to show view");
        }
    }
}

fn gray_to_rgb(image: GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(image).to_rgb8()
}
