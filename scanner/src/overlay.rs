//! Operator view: the dimmed frame with the detection zone left bright, corner
//! accents and a hint in the operator's language.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use qr_gate_common::config::Language;
use tracing::{error, info};

use crate::decoder::DecodedMarker;
use crate::geometry::OrderedRect;

const DIM_WEIGHT: f32 = 0.55;
const DIM_GAMMA: f32 = 1.0;
const ACCENT_LENGTH: i32 = 10;
const ACCENT_THICKNESS: u32 = 2;
const ACCENT_COLOR: Rgb<u8> = Rgb([240, 240, 240]);
const TEXT_COLOR: Rgb<u8> = Rgb([240, 240, 240]);
const MARKER_OUTLINE_COLOR: Rgb<u8> = Rgb([0, 0, 196]);

/// DejaVu Sans, covering both Latin and Cyrillic hints.
static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("failed to read font {0}: {1}")]
    ReadFont(String, std::io::Error),
    #[error("invalid font file {0}")]
    InvalidFont(String),
}

/// Operator hint shown above the zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    pub text: &'static str,
    /// Glyph height in pixels.
    pub scale: f32,
    /// Text origin relative to the zone's top-left corner.
    pub offset: (i32, i32),
}

pub fn instruction(language: Language) -> Instruction {
    match language {
        Language::En => Instruction {
            text: "Fit your QR-code inside the square",
            scale: 16.0,
            offset: (-20, -24),
        },
        Language::Ru => Instruction {
            text: "Поместите Ваш QR-код в квадрат",
            scale: 14.0,
            offset: (8, -24),
        },
    }
}

/// Draws the operator view: dimmed frame, highlighted zone, corner accents, hint.
pub struct OverlayRenderer {
    font: Option<FontArc>,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayRenderer {
    /// Renderer using the built-in font.
    pub fn new() -> Self {
        let font = match FontArc::try_from_slice(EMBEDDED_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                error!(error = %e, "built-in overlay font is unreadable, hint text disabled");
                None
            }
        };
        Self { font }
    }

    /// Renderer using the font at `path` instead of the built-in one.
    pub fn with_font_file(path: &Path) -> Result<Self, OverlayError> {
        let data = std::fs::read(path)
            .map_err(|e| OverlayError::ReadFont(path.display().to_string(), e))?;
        let font = FontArc::try_from_vec(data)
            .map_err(|_| OverlayError::InvalidFont(path.display().to_string()))?;
        info!(path = path.display().to_string(), "loaded overlay font");
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Build the display frame. `frame` is left untouched.
    pub fn render(&self, frame: &RgbImage, zone: &OrderedRect, language: Language) -> RgbImage {
        let mut image = dim(frame);
        restore_zone(&mut image, frame, zone);
        draw_corner_accents(&mut image, zone);

        if let Some(font) = &self.font {
            let hint = instruction(language);
            let tl = zone.top_left();
            let x = (tl.x + hint.offset.0).max(0);
            let y = (tl.y + hint.offset.1).max(0);
            draw_text_mut(&mut image, TEXT_COLOR, x, y, PxScale::from(hint.scale), font, hint.text);
        }
        image
    }
}

/// Copy of `crop` with every marker outlined.
pub fn outline_markers(crop: &RgbImage, markers: &[DecodedMarker]) -> RgbImage {
    let mut image = crop.clone();
    for marker in markers {
        let b = marker.bounds;
        for i in 0..4 {
            let (a, c) = (b[i], b[(i + 1) % 4]);
            draw_line_segment_mut(
                &mut image,
                (a.x as f32, a.y as f32),
                (c.x as f32, c.y as f32),
                MARKER_OUTLINE_COLOR,
            );
        }
    }
    image
}

fn dim(frame: &RgbImage) -> RgbImage {
    let mut image = frame.clone();
    for pixel in image.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c = (*c as f32 * DIM_WEIGHT + DIM_GAMMA).round().min(255.0) as u8;
        }
    }
    image
}

fn restore_zone(image: &mut RgbImage, frame: &RgbImage, zone: &OrderedRect) {
    let (x0, y0, w, h) = zone.bounds();
    let x1 = (x0 + w).min(frame.width());
    let y1 = (y0 + h).min(frame.height());
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, *frame.get_pixel(x, y));
        }
    }
}

fn draw_corner_accents(image: &mut RgbImage, zone: &OrderedRect) {
    let len = ACCENT_LENGTH;
    let t = ACCENT_THICKNESS as i32;
    let (tl, tr, br, bl) = (
        zone.top_left(),
        zone.top_right(),
        zone.bottom_right(),
        zone.bottom_left(),
    );

    // (x, y) of the horizontal and vertical stroke for each corner, both pointing inward.
    let strokes = [
        ((tl.x, tl.y), (tl.x, tl.y)),
        ((tr.x - len, tr.y), (tr.x - t, tr.y)),
        ((br.x - len, br.y - t), (br.x - t, br.y - len)),
        ((bl.x, bl.y - t), (bl.x, bl.y - len)),
    ];
    for ((hx, hy), (vx, vy)) in strokes {
        draw_filled_rect_mut(
            image,
            Rect::at(hx, hy).of_size(len as u32, ACCENT_THICKNESS),
            ACCENT_COLOR,
        );
        draw_filled_rect_mut(
            image,
            Rect::at(vx, vy).of_size(ACCENT_THICKNESS, len as u32),
            ACCENT_COLOR,
        );
    }
}
