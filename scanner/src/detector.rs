//! Candidate search: threshold the frame, grow and close the light regions,
//! trace the edges and keep the first large shape that sits inside the zone.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::find_contours;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::min_area_rect;
use imageproc::morphology::{grayscale_close, grayscale_dilate, Mask};
use qr_gate_common::config::DetectorConfig;
use tracing::{debug, trace};

use crate::geometry::{polygon_area, OrderedRect};

const DILATE_ITERATIONS: usize = 3;

/// Slack around a candidate rectangle when counting its lit pixels. Closing
/// with an even kernel can move the traced edge one pixel into the shape.
const AREA_MARGIN: u32 = 1;

/// Square structuring element of `size` pixels per side, anchored at
/// `(size / 2, size / 2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringKernel {
    size: u8,
    mask: Mask,
}

impl StructuringKernel {
    pub fn new(size: u8) -> Self {
        let size = size.max(1);
        let block = GrayImage::from_pixel(size as u32, size as u32, Luma([255]));
        Self {
            size,
            mask: Mask::from_image(&block, size / 2, size / 2),
        }
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn dilate(&self, image: &GrayImage) -> GrayImage {
        grayscale_dilate(image, &self.mask)
    }

    pub fn close(&self, image: &GrayImage) -> GrayImage {
        grayscale_close(image, &self.mask)
    }
}

#[derive(Debug, Clone)]
pub struct DetectorParams {
    pub kernel: StructuringKernel,
    pub min_area: f64,
    pub hue_lower: u8,
    pub hue_upper: u8,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self::from(&DetectorConfig::default())
    }
}

impl From<&DetectorConfig> for DetectorParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            kernel: StructuringKernel::new(config.kernel_size),
            min_area: config.min_area as f64,
            hue_lower: config.hue_lower,
            hue_upper: config.hue_upper,
            blur_sigma: config.blur_sigma,
            canny_low: config.canny_low,
            canny_high: config.canny_high,
        }
    }
}

/// A shape found fully inside the detection zone.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Minimum-area bounding rectangle of the shape's contour.
    pub rect: OrderedRect,
    /// The frame cropped to the zone, not to `rect`.
    pub crop: RgbImage,
}

/// Finds light, sufficiently large shapes that sit entirely inside the zone.
pub struct CandidateDetector {
    params: DetectorParams,
}

impl CandidateDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// First qualifying candidate in contour order, if any.
    pub fn detect(&self, frame: &RgbImage, zone: &OrderedRect) -> Option<Candidate> {
        self.detect_with_edges(frame, zone).0
    }

    /// Like [`detect`](Self::detect), also returning the edge map the contours came from.
    pub fn detect_with_edges(
        &self,
        frame: &RgbImage,
        zone: &OrderedRect,
    ) -> (Option<Candidate>, GrayImage) {
        let mask = self.light_mask(frame);
        let edges = self.edges_of(&mask);
        let contours = find_contours::<i32>(&edges);
        trace!(contours = contours.len(), "extracted contours");

        for contour in &contours {
            // The traced outline encloses the grown mask, so it bounds the
            // shape's own area from above.
            if polygon_area(&contour.points) < self.params.min_area {
                continue;
            }

            let rect = OrderedRect::from_corners(min_area_rect(&contour.points));
            let area = lit_area(&mask, &rect, AREA_MARGIN);
            if area < self.params.min_area {
                trace!(area, rect = ?rect.corners(), "candidate too small");
                continue;
            }
            if !zone.contains(&rect) {
                trace!(area, rect = ?rect.corners(), "candidate outside zone");
                continue;
            }

            debug!(area, rect = ?rect.corners(), "candidate inside zone");
            let candidate = Candidate {
                rect,
                crop: crop_zone(frame, zone),
            };
            return (Some(candidate), edges);
        }
        (None, edges)
    }

    /// Threshold, dilate, close, blur and run Canny.
    pub fn edge_map(&self, frame: &RgbImage) -> GrayImage {
        self.edges_of(&self.light_mask(frame))
    }

    fn light_mask(&self, frame: &RgbImage) -> GrayImage {
        intensity_mask(frame, self.params.hue_lower, self.params.hue_upper)
    }

    fn edges_of(&self, mask: &GrayImage) -> GrayImage {
        let p = &self.params;
        let mut grown = p.kernel.dilate(mask);
        for _ in 1..DILATE_ITERATIONS {
            grown = p.kernel.dilate(&grown);
        }
        let closed = p.kernel.close(&grown);
        let smoothed = gaussian_blur_f32(&closed, p.blur_sigma);
        canny(&smoothed, p.canny_low, p.canny_high)
    }
}

/// Lit mask pixels inside `rect`, its bottom-right corner included and every
/// side widened by `margin`.
fn lit_area(mask: &GrayImage, rect: &OrderedRect, margin: u32) -> f64 {
    let (x, y, w, h) = rect.bounds();
    let (x0, y0) = (x.saturating_sub(margin), y.saturating_sub(margin));
    let x1 = (x + w + margin + 1).min(mask.width());
    let y1 = (y + h + margin + 1).min(mask.height());
    let mut lit = 0u64;
    for py in y0..y1 {
        for px in x0..x1 {
            if mask.get_pixel(px, py).0[0] > 0 {
                lit += 1;
            }
        }
    }
    lit as f64
}

/// 255 where the pixel's luma falls in `[lower, upper]`, 0 elsewhere.
pub fn intensity_mask(frame: &RgbImage, lower: u8, upper: u8) -> GrayImage {
    let gray = image::imageops::grayscale(frame);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Luma([if (lower..=upper).contains(&v) { 255 } else { 0 }])
    })
}

/// Copy of the frame restricted to the zone bounds.
pub fn crop_zone(frame: &RgbImage, zone: &OrderedRect) -> RgbImage {
    let (x, y, w, h) = zone.bounds();
    let x = x.min(frame.width());
    let y = y.min(frame.height());
    let w = w.min(frame.width() - x);
    let h = h.min(frame.height() - y);
    image::imageops::crop_imm(frame, x, y, w, h).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::detection_square;
    use crate::testutil::{blank_frame, box_corners, fill_rect};
    use image::Rgb;

    fn detector() -> CandidateDetector {
        CandidateDetector::new(DetectorParams::default())
    }

    fn zone() -> OrderedRect {
        detection_square(640, 480, 240).unwrap()
    }

    #[test]
    fn mask_selects_intensity_band() {
        let mut frame = blank_frame(4, 1);
        frame.put_pixel(1, 0, Rgb([200, 200, 200]));
        frame.put_pixel(2, 0, Rgb([255, 255, 255]));
        frame.put_pixel(3, 0, Rgb([150, 150, 150]));
        let mask = intensity_mask(&frame, 196, 255);
        let values: Vec<u8> = mask.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 255, 255, 0]);
    }

    #[test]
    fn empty_frame_has_no_candidate() {
        assert!(detector().detect(&blank_frame(640, 480), &zone()).is_none());
    }

    #[test]
    fn large_light_square_inside_zone_is_found() {
        let mut frame = blank_frame(640, 480);
        fill_rect(&mut frame, 300, 220, 40, 40, Rgb([255, 255, 255]));

        let candidate = detector().detect(&frame, &zone()).expect("candidate");
        assert!(zone().contains(&candidate.rect));
        let (x, y, w, h) = candidate.rect.bounds();
        assert!(x <= 301 && y <= 221, "rect starts at ({x}, {y})");
        assert!(x + w >= 339 && y + h >= 259, "rect spans {w}x{h}");
    }

    #[test]
    fn crop_is_the_zone_not_the_shape() {
        let mut frame = blank_frame(640, 480);
        fill_rect(&mut frame, 300, 220, 40, 40, Rgb([255, 255, 255]));

        let candidate = detector().detect(&frame, &zone()).expect("candidate");
        assert_eq!(candidate.crop.dimensions(), (240, 240));
        // (300, 220) in the frame is (100, 100) in the zone crop.
        assert_eq!(candidate.crop.get_pixel(100, 100), &Rgb([255, 255, 255]));
        assert_eq!(candidate.crop.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn small_square_is_ignored() {
        let mut frame = blank_frame(640, 480);
        fill_rect(&mut frame, 316, 236, 8, 8, Rgb([255, 255, 255]));
        assert!(detector().detect(&frame, &zone()).is_none());
    }

    #[test]
    fn min_area_is_a_sharp_boundary() {
        // 17 * 17 = 289 and 18 * 18 = 324 sit on either side of the default 300.
        let mut under = blank_frame(640, 480);
        fill_rect(&mut under, 310, 230, 17, 17, Rgb([255, 255, 255]));
        assert!(detector().detect(&under, &zone()).is_none());

        let mut over = blank_frame(640, 480);
        fill_rect(&mut over, 310, 230, 18, 18, Rgb([255, 255, 255]));
        let candidate = detector().detect(&over, &zone()).expect("candidate");
        assert!(zone().contains(&candidate.rect));
    }

    #[test]
    fn raised_min_area_rejects_what_default_accepts() {
        let mut frame = blank_frame(640, 480);
        fill_rect(&mut frame, 310, 230, 30, 30, Rgb([255, 255, 255]));
        assert!(detector().detect(&frame, &zone()).is_some());

        let strict = CandidateDetector::new(DetectorParams {
            min_area: 901.0,
            ..DetectorParams::default()
        });
        assert!(strict.detect(&frame, &zone()).is_none());
    }

    #[test]
    fn default_kernel_is_two_by_two() {
        let kernel = DetectorParams::default().kernel;
        assert_eq!(kernel.size(), 2);

        let mut dot = GrayImage::new(8, 8);
        dot.put_pixel(3, 3, Luma([255]));
        let grown = kernel.dilate(&dot);
        let lit: Vec<(u32, u32)> = grown
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] > 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(lit, vec![(3, 3), (4, 3), (3, 4), (4, 4)]);
    }

    #[test]
    fn closing_fills_single_pixel_gaps() {
        let kernel = StructuringKernel::new(2);
        let mut bars = GrayImage::new(8, 4);
        for y in 0..4 {
            for x in [1, 2, 4, 5] {
                bars.put_pixel(x, y, Luma([255]));
            }
        }
        let closed = kernel.close(&bars);
        assert_eq!(closed.get_pixel(3, 1).0[0], 255);
        assert_eq!(closed.get_pixel(7, 1).0[0], 0);
    }

    #[test]
    fn dark_square_is_ignored() {
        let mut frame = blank_frame(640, 480);
        fill_rect(&mut frame, 300, 220, 40, 40, Rgb([120, 120, 120]));
        assert!(detector().detect(&frame, &zone()).is_none());
    }

    #[test]
    fn square_outside_zone_is_ignored() {
        let mut frame = blank_frame(640, 480);
        fill_rect(&mut frame, 40, 40, 60, 60, Rgb([255, 255, 255]));
        assert!(detector().detect(&frame, &zone()).is_none());
    }

    #[test]
    fn square_straddling_zone_edge_is_ignored() {
        let mut frame = blank_frame(640, 480);
        fill_rect(&mut frame, 180, 200, 60, 60, Rgb([255, 255, 255]));
        assert!(detector().detect(&frame, &zone()).is_none());
    }

    #[test]
    fn partial_object_does_not_block_inner_one() {
        let mut frame = blank_frame(640, 480);
        fill_rect(&mut frame, 180, 140, 40, 40, Rgb([255, 255, 255]));
        fill_rect(&mut frame, 320, 260, 40, 40, Rgb([255, 255, 255]));

        let candidate = detector().detect(&frame, &zone()).expect("candidate");
        let (x, y, _, _) = candidate.rect.bounds();
        assert!(x >= 300 && y >= 240, "picked the straddling square at ({x}, {y})");
    }

    #[test]
    fn edge_map_outlines_the_square() {
        let mut frame = blank_frame(640, 480);
        fill_rect(&mut frame, 300, 220, 40, 40, Rgb([255, 255, 255]));
        let edges = detector().edge_map(&frame);
        assert!(edges.pixels().any(|p| p.0[0] > 0));
        assert_eq!(edges.get_pixel(320, 240).0[0], 0, "interior stays empty");
        assert_eq!(edges.get_pixel(10, 10).0[0], 0, "background stays empty");
    }

    #[test]
    fn crop_zone_clamps_to_frame() {
        let frame = blank_frame(100, 80);
        let zone = OrderedRect::from_corners(box_corners(60, 50, 140, 130));
        assert_eq!(crop_zone(&frame, &zone).dimensions(), (40, 30));
    }
}
