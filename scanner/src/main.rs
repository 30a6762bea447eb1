use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use qr_gate_capture::MjpegCamera;
use qr_gate_common::config::{Config, NotifyConfig, NotifyKind, OverlayConfig};
use qr_gate_orders::{AnyNotifier, LogNotifier, NotifyError, OrderDb, OrderDesk, WebhookNotifier};
use qr_gate_scanner::display::{Display, Headless, SnapshotDisplay};
use qr_gate_scanner::handoff::spawn_handoff_worker;
use qr_gate_scanner::input::OperatorInput;
use qr_gate_scanner::overlay::OverlayRenderer;
use qr_gate_scanner::{ScanSettings, Scanner};
use tracing::{error, info, warn};

const HANDOFF_QUEUE: usize = 8;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.effective_level().parse().unwrap_or_default()),
        )
        .init();

    info!(
        camera = config.camera.url,
        side = config.zone.side,
        min_area = config.detector.min_area,
        language = ?config.overlay.language,
        debug = config.logging.debug,
        "starting qr-gate"
    );

    let db = match OrderDb::open(&config.orders.db_path) {
        Ok(db) => {
            let known = db.addresses().map(|a| a.len()).unwrap_or_default();
            info!(path = %config.orders.db_path.display(), known, "order database opened");
            Arc::new(db)
        }
        Err(e) => {
            error!(error = %e, path = %config.orders.db_path.display(), "failed to open order database");
            std::process::exit(1);
        }
    };

    let notifier = match build_notifier(&config.notify) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "failed to set up notifier");
            std::process::exit(1);
        }
    };

    let desk = Arc::new(OrderDesk::new(db, notifier));
    let (handoff, worker) = spawn_handoff_worker(desk, HANDOFF_QUEUE);
    let input = OperatorInput::spawn_stdin_reader();
    let settings = ScanSettings::from_config(&config);

    let timeout = Duration::from_secs(config.camera.connect_timeout_secs);
    match MjpegCamera::open(&config.camera.url, timeout).await {
        Ok(camera) => {
            let mut scanner = Scanner::new(camera, build_display(&config.overlay), handoff, settings)
                .with_input(input)
                .with_overlay(build_overlay(&config.overlay));
            let report = scanner.run().await;
            info!(
                iterations = report.iterations,
                events = report.events,
                notified = report.notified,
                reason = ?report.stop_reason,
                "scanner finished"
            );
        }
        Err(e) => {
            error!(error = %e, url = config.camera.url, "failed to open camera, scanner disabled");
        }
    }

    info!("scanner is down; press Ctrl+C to exit");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl+C");
    }
    worker.abort();
    info!("shutting down");
}

fn build_notifier(config: &NotifyConfig) -> Result<AnyNotifier, NotifyError> {
    match config.kind {
        NotifyKind::Log => Ok(AnyNotifier::Log(LogNotifier)),
        NotifyKind::Webhook => {
            let url = config.webhook_url.as_deref().unwrap_or_default();
            info!(url, "sending notifications to webhook");
            WebhookNotifier::new(url).map(AnyNotifier::Webhook)
        }
    }
}

fn build_overlay(config: &OverlayConfig) -> OverlayRenderer {
    let Some(path) = &config.font_path else {
        return OverlayRenderer::new();
    };
    match OverlayRenderer::with_font_file(path) {
        Ok(renderer) => renderer,
        Err(e) => {
            warn!(error = %e, "overlay font unavailable, using the built-in one");
            OverlayRenderer::new()
        }
    }
}

fn build_display(config: &OverlayConfig) -> Box<dyn Display> {
    if config.window {
        if let Some(display) = window_display() {
            return display;
        }
    }
    if let Some(dir) = &config.snapshot_dir {
        match SnapshotDisplay::new(dir) {
            Ok(display) => return Box::new(display),
            Err(e) => warn!(error = %e, "snapshot display unavailable, running headless"),
        }
    }
    Box::new(Headless::new())
}

#[cfg(feature = "window")]
fn window_display() -> Option<Box<dyn Display>> {
    Some(Box::new(qr_gate_scanner::display::WindowDisplay::new()))
}

#[cfg(not(feature = "window"))]
fn window_display() -> Option<Box<dyn Display>> {
    warn!("overlay.window is set but qr-gate was built without the `window` feature");
    None
}
