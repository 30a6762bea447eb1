//! QR decoding of a zone crop with rqrr, and the rule for picking one
//! payload when several markers are visible.

use image::{GrayImage, RgbImage};
use imageproc::point::Point;
use tracing::{debug, warn};

/// One marker read from a crop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMarker {
    pub payload: String,
    /// Marker outline in crop coordinates, as reported by the QR locator.
    pub bounds: [Point<i32>; 4],
}

/// QR reader for candidate crops.
#[derive(Debug, Default)]
pub struct QrDecoder;

impl QrDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Payload of the first readable marker, or an empty string when none is found.
    pub fn decode(&self, crop: &RgbImage) -> String {
        select_payload(&self.decode_all(crop))
    }

    /// Every readable marker, in locator order.
    ///
    /// A marker whose data is not valid UTF-8 counts as unreadable.
    pub fn decode_all(&self, crop: &RgbImage) -> Vec<DecodedMarker> {
        let gray = image::imageops::grayscale(crop);
        decode_gray(&gray)
    }
}

/// First marker's payload, or an empty string. More than one marker is logged.
pub fn select_payload(markers: &[DecodedMarker]) -> String {
    if markers.len() > 1 {
        warn!(
            count = markers.len(),
            "multiple QR codes detected in the frame, selecting the first one"
        );
    }
    markers
        .first()
        .map(|m| m.payload.clone())
        .unwrap_or_default()
}

fn decode_gray(gray: &GrayImage) -> Vec<DecodedMarker> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
        gray.get_pixel(x as u32, y as u32).0[0]
    });
    let grids = prepared.detect_grids();

    let mut markers = Vec::with_capacity(grids.len());
    for grid in grids {
        let mut data = Vec::new();
        if let Err(e) = grid.decode_to(&mut data) {
            debug!(error = %e, "failed to decode QR grid");
            continue;
        }
        let payload = match String::from_utf8(data) {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, "QR payload is not valid UTF-8");
                continue;
            }
        };
        let bounds = grid.bounds.map(|p| Point::new(p.x, p.y));
        markers.push(DecodedMarker { payload, bounds });
    }
    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{blank_frame, paint_marker};

    #[test]
    fn reads_single_marker() {
        let mut crop = blank_frame(240, 240);
        paint_marker(&mut crop, "123 Main St", 60, 60, 4);
        assert_eq!(QrDecoder::new().decode(&crop), "123 Main St");
    }

    #[test]
    fn reads_unicode_payload() {
        let mut crop = blank_frame(240, 240);
        paint_marker(&mut crop, "ул. Ленина, 1", 40, 40, 4);
        assert_eq!(QrDecoder::new().decode(&crop), "ул. Ленина, 1");
    }

    #[test]
    fn no_marker_gives_empty_string() {
        let crop = blank_frame(240, 240);
        assert_eq!(QrDecoder::new().decode(&crop), "");
    }

    #[test]
    fn empty_crop_gives_empty_string() {
        assert_eq!(QrDecoder::new().decode(&RgbImage::new(0, 0)), "");
    }

    #[test]
    fn two_markers_yield_one_of_them() {
        let mut crop = blank_frame(320, 200);
        paint_marker(&mut crop, "1 First Ave", 4, 40, 4);
        paint_marker(&mut crop, "2 Second Ave", 164, 40, 4);

        let decoder = QrDecoder::new();
        let all: Vec<String> = decoder.decode_all(&crop).into_iter().map(|m| m.payload).collect();
        assert_eq!(all.len(), 2, "found {all:?}");

        let picked = decoder.decode(&crop);
        assert_eq!(picked, all[0]);
        assert!(picked == "1 First Ave" || picked == "2 Second Ave");
    }

    #[test]
    fn marker_bounds_lie_inside_crop() {
        let mut crop = blank_frame(240, 240);
        paint_marker(&mut crop, "bounds", 60, 60, 4);
        let markers = QrDecoder::new().decode_all(&crop);
        assert_eq!(markers.len(), 1);
        for p in markers[0].bounds {
            assert!((0..240).contains(&p.x) && (0..240).contains(&p.y), "{p:?}");
        }
    }
}
