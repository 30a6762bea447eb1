//! Synthetic frames for detector, decoder and scan-loop tests.

use image::{Rgb, RgbImage};
use imageproc::point::Point;
use qrcode::{Color, QrCode};

/// Modules of light margin drawn around a marker.
const QUIET_ZONE: u32 = 4;

pub fn blank_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::new(width, height)
}

pub fn fill_rect(frame: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    for yy in y..(y + h).min(frame.height()) {
        for xx in x..(x + w).min(frame.width()) {
            frame.put_pixel(xx, yy, color);
        }
    }
}

/// Paint a QR marker on a white label whose top-left corner is `(x, y)`.
/// Returns the label's side in pixels.
pub fn paint_marker(frame: &mut RgbImage, payload: &str, x: u32, y: u32, module_px: u32) -> u32 {
    let code = QrCode::new(payload.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let side = (modules + 2 * QUIET_ZONE) * module_px;
    fill_rect(frame, x, y, side, side, Rgb([255, 255, 255]));

    for (i, color) in code.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let (mx, my) = (i as u32 % modules, i as u32 / modules);
        fill_rect(
            frame,
            x + (QUIET_ZONE + mx) * module_px,
            y + (QUIET_ZONE + my) * module_px,
            module_px,
            module_px,
            Rgb([0, 0, 0]),
        );
    }
    side
}

/// A 640x480 frame with a marker label centered on the frame.
pub fn marker_frame(payload: &str) -> RgbImage {
    let mut frame = blank_frame(640, 480);
    let probe = QrCode::new(payload.as_bytes()).unwrap();
    let side = (probe.width() as u32 + 2 * QUIET_ZONE) * 4;
    paint_marker(&mut frame, payload, 320 - side / 2, 240 - side / 2, 4);
    frame
}

pub fn box_corners(x0: i32, y0: i32, x1: i32, y1: i32) -> [Point<i32>; 4] {
    [
        Point::new(x0, y0),
        Point::new(x1, y0),
        Point::new(x1, y1),
        Point::new(x0, y1),
    ]
}
