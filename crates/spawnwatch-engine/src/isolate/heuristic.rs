//! Color-range background removal for spawn artwork.
//!
//! Spawn images are a single creature drawn over a flat, light backdrop.
//! Pixels matching one of a few backdrop color ranges are masked out, the
//! mask is cleaned with a 3×3 close then open, and the largest remaining
//! outer contour becomes the subject. The filled contour, dilated with a 5×5
//! square, is written into the alpha channel.

use std::collections::{HashSet, VecDeque};
use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

use crate::error::PipelineResult;

/// Contours at or below this polygon area leave isolation indeterminate.
pub const MIN_SUBJECT_AREA: f64 = 500.0;

/// Inclusive HSV box on the OpenCV scale (H 0..=179, S and V 0..=255).
#[derive(Debug, Clone, Copy)]
struct HsvRange {
    low: [u8; 3],
    high: [u8; 3],
}

impl HsvRange {
    fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|channel| hsv[channel] >= self.low[channel] && hsv[channel] <= self.high[channel])
    }
}

const BACKGROUND_RANGES: [HsvRange; 4] = [
    // near-white
    HsvRange {
        low: [0, 0, 200],
        high: [179, 30, 255],
    },
    // light blue
    HsvRange {
        low: [90, 20, 150],
        high: [130, 150, 255],
    },
    // light gray
    HsvRange {
        low: [0, 0, 150],
        high: [179, 40, 220],
    },
    // light green
    HsvRange {
        low: [35, 20, 150],
        high: [85, 150, 255],
    },
];

/// Clockwise starting west, y pointing down.
const NEIGHBORS: [(i64, i64); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn get(&self, x: u32, y: u32) -> bool {
        self.bits[self.index(x, y)]
    }

    /// Out-of-bounds coordinates read as `None`.
    fn get_signed(&self, x: i64, y: i64) -> Option<bool> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some(self.get(x as u32, y as u32))
    }

    fn set(&mut self, x: u32, y: u32, value: bool) {
        let index = self.index(x, y);
        self.bits[index] = value;
    }

    fn count(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }

    fn inverted(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            bits: self.bits.iter().map(|bit| !bit).collect(),
        }
    }

    /// Square-window max (dilate) or min (erode). Pixels outside the image
    /// do not take part.
    fn morph(&self, radius: i64, dilate: bool) -> Self {
        let mut out = Self::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut window = (-radius..=radius).flat_map(|dy| {
                    (-radius..=radius)
                        .filter_map(move |dx| self.get_signed(i64::from(x) + dx, i64::from(y) + dy))
                });
                let value = if dilate {
                    window.any(|bit| bit)
                } else {
                    window.all(|bit| bit)
                };
                out.set(x, y, value);
            }
        }
        out
    }

    fn dilate(&self, radius: i64) -> Self {
        self.morph(radius, true)
    }

    fn erode(&self, radius: i64) -> Self {
        self.morph(radius, false)
    }

    fn close(&self, radius: i64) -> Self {
        self.dilate(radius).erode(radius)
    }

    fn open(&self, radius: i64) -> Self {
        self.erode(radius).dilate(radius)
    }
}

/// One 8-connected foreground region.
#[derive(Debug, Clone)]
struct Component {
    pixels: Vec<(u32, u32)>,
    /// First pixel in raster order; the contour trace starts here.
    start: (u32, u32),
    min: (u32, u32),
    max: (u32, u32),
}

/// Isolates the subject of an encoded image. `Ok(None)` means no acceptable
/// subject was found and the caller should fall back.
pub fn isolate_subject(bytes: &[u8]) -> PipelineResult<Option<Vec<u8>>> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let Some(alpha) = subject_mask(&rgb) else {
        return Ok(None);
    };
    let (width, height) = rgb.dimensions();
    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let Rgb([r, g, b]) = *pixel;
        let a = if alpha.get(x, y) { 255 } else { 0 };
        out.put_pixel(x, y, Rgba([r, g, b, a]));
    }
    let mut encoded = Vec::new();
    DynamicImage::ImageRgba8(out).write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;
    Ok(Some(encoded))
}

fn subject_mask(rgb: &RgbImage) -> Option<Mask> {
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    let mut background = Mask::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let hsv = rgb_to_hsv(*pixel);
        background.set(x, y, BACKGROUND_RANGES.iter().any(|range| range.contains(hsv)));
    }
    let background = background.close(1).open(1);
    if background.count() == 0 {
        tracing::debug!("no backdrop pixels found");
        return None;
    }

    let foreground = background.inverted();
    let (component, area) = components(&foreground)
        .into_iter()
        .map(|component| {
            let area = contour_area(&trace_contour(&foreground, component.start));
            (component, area)
        })
        .max_by(|left, right| left.1.total_cmp(&right.1))?;
    if area <= MIN_SUBJECT_AREA {
        tracing::debug!(area, "largest contour below acceptance area");
        return None;
    }
    Some(fill_component(&component, width, height).dilate(2))
}

/// RGB to HSV on the OpenCV 8-bit scale.
fn rgb_to_hsv(Rgb([r, g, b]): Rgb<u8>) -> [u8; 3] {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let saturation = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    [
        ((hue / 2.0).round() as u16 % 180) as u8,
        saturation.round() as u8,
        max as u8,
    ]
}

fn components(foreground: &Mask) -> Vec<Component> {
    let mut seen = Mask::new(foreground.width, foreground.height);
    let mut found = Vec::new();
    for y in 0..foreground.height {
        for x in 0..foreground.width {
            if !foreground.get(x, y) || seen.get(x, y) {
                continue;
            }
            let mut component = Component {
                pixels: Vec::new(),
                start: (x, y),
                min: (x, y),
                max: (x, y),
            };
            let mut queue = VecDeque::from([(x, y)]);
            seen.set(x, y, true);
            while let Some((cx, cy)) = queue.pop_front() {
                component.pixels.push((cx, cy));
                component.min = (component.min.0.min(cx), component.min.1.min(cy));
                component.max = (component.max.0.max(cx), component.max.1.max(cy));
                for (dx, dy) in NEIGHBORS {
                    let (nx, ny) = (i64::from(cx) + dx, i64::from(cy) + dy);
                    if foreground.get_signed(nx, ny) != Some(true) {
                        continue;
                    }
                    let (nx, ny) = (nx as u32, ny as u32);
                    if !seen.get(nx, ny) {
                        seen.set(nx, ny, true);
                        queue.push_back((nx, ny));
                    }
                }
            }
            found.push(component);
        }
    }
    found
}

/// Moore-neighbor trace of the outer boundary through pixel centers.
///
/// `start` must be the component's first pixel in raster order, so its west
/// neighbor is background.
fn trace_contour(foreground: &Mask, start: (u32, u32)) -> Vec<(i64, i64)> {
    let start = (i64::from(start.0), i64::from(start.1));
    let is_set = |(x, y): (i64, i64)| foreground.get_signed(x, y) == Some(true);

    let mut contour = vec![start];
    let mut states = HashSet::new();
    let mut current = start;
    let mut backtrack = 0usize;
    while states.insert((current, backtrack)) {
        let step = (1..=8).map(|offset| (backtrack + offset) % 8).find(|&dir| {
            let (dx, dy) = NEIGHBORS[dir];
            is_set((current.0 + dx, current.1 + dy))
        });
        let Some(dir) = step else {
            break;
        };
        let (dx, dy) = NEIGHBORS[dir];
        let next = (current.0 + dx, current.1 + dy);
        // The cell examined just before `next` is background; re-express it
        // relative to `next` to seed the following search.
        let (px, py) = NEIGHBORS[(dir + 7) % 8];
        let previous = (current.0 + px - next.0, current.1 + py - next.1);
        backtrack = NEIGHBORS
            .iter()
            .position(|&offset| offset == previous)
            .unwrap_or(0);
        current = next;
        contour.push(current);
    }
    // Drop the closing revisits of the start pixel.
    while contour.len() > 1 && contour.last() == Some(&start) {
        contour.pop();
    }
    contour
}

/// Shoelace area of a closed polygon.
fn contour_area(points: &[(i64, i64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let doubled: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.0 * b.1 - b.0 * a.1)
        .sum();
    doubled.abs() as f64 / 2.0
}

/// The component with every enclosed hole filled.
fn fill_component(component: &Component, width: u32, height: u32) -> Mask {
    let mut filled = Mask::new(width, height);
    for &(x, y) in &component.pixels {
        filled.set(x, y, true);
    }
    // Flood the complement from a one-pixel frame around the bounding box;
    // whatever stays unreached inside the box is a hole.
    let (min_x, min_y) = (i64::from(component.min.0) - 1, i64::from(component.min.1) - 1);
    let (max_x, max_y) = (i64::from(component.max.0) + 1, i64::from(component.max.1) + 1);
    let box_width = (max_x - min_x + 1) as usize;
    let box_height = (max_y - min_y + 1) as usize;
    let mut outside = vec![false; box_width * box_height];
    let local = |x: i64, y: i64| (y - min_y) as usize * box_width + (x - min_x) as usize;
    let inside_component = |x: i64, y: i64| filled.get_signed(x, y) == Some(true);

    let mut queue = VecDeque::new();
    for x in min_x..=max_x {
        queue.push_back((x, min_y));
        queue.push_back((x, max_y));
    }
    for y in min_y..=max_y {
        queue.push_back((min_x, y));
        queue.push_back((max_x, y));
    }
    while let Some((x, y)) = queue.pop_front() {
        if x < min_x || y < min_y || x > max_x || y > max_y {
            continue;
        }
        let slot = local(x, y);
        if outside[slot] || inside_component(x, y) {
            continue;
        }
        outside[slot] = true;
        queue.extend([(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)]);
    }

    let mut holes = Vec::new();
    for y in component.min.1..=component.max.1 {
        for x in component.min.0..=component.max.0 {
            if !filled.get(x, y) && !outside[local(i64::from(x), i64::from(y))] {
                holes.push((x, y));
            }
        }
    }
    for (x, y) in holes {
        filled.set(x, y, true);
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(image: RgbImage) -> anyhow::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// White backdrop with a solid red square and a small hole in it.
    fn subject_on_white(size: u32, square: std::ops::Range<u32>) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            let in_square = square.contains(&x) && square.contains(&y);
            let in_hole = (29..32).contains(&x) && (29..32).contains(&y);
            if in_square && !in_hole {
                Rgb([200, 30, 30])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn hsv_matches_opencv_scale() {
        assert_eq!(rgb_to_hsv(Rgb([255, 255, 255])), [0, 0, 255]);
        assert_eq!(rgb_to_hsv(Rgb([255, 0, 0])), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(Rgb([0, 255, 0])), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(Rgb([0, 0, 255])), [120, 255, 255]);
    }

    #[test]
    fn rectangle_contour_area_matches_pixel_centers() {
        let mut mask = Mask::new(20, 20);
        for y in 5..15 {
            for x in 4..10 {
                mask.set(x, y, true);
            }
        }
        let contour = trace_contour(&mask, (4, 5));
        assert_eq!(contour_area(&contour), 45.0);
        assert_eq!(contour.len(), 2 * (6 - 1) + 2 * (10 - 1));
    }

    #[test]
    fn single_pixel_has_no_area() {
        let mut mask = Mask::new(3, 3);
        mask.set(1, 1, true);
        assert_eq!(contour_area(&trace_contour(&mask, (1, 1))), 0.0);
    }

    #[test]
    fn components_are_eight_connected() {
        let mut mask = Mask::new(4, 4);
        mask.set(0, 0, true);
        mask.set(1, 1, true);
        mask.set(3, 3, true);
        let found = components(&mask);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].pixels.len(), 2);
        assert_eq!(found[0].start, (0, 0));
    }

    #[test]
    fn morphology_ignores_pixels_outside_the_image() {
        let mut mask = Mask::new(3, 3);
        mask.bits = vec![true; 9];
        assert_eq!(mask.erode(1).count(), 9);
        let mut speck = Mask::new(5, 5);
        speck.set(2, 2, true);
        assert_eq!(speck.open(1).count(), 0);
        assert_eq!(speck.dilate(1).count(), 9);
    }

    #[test]
    fn subject_on_flat_backdrop_gets_alpha_cutout() -> anyhow::Result<()> {
        let bytes = encode(subject_on_white(64, 20..44))?;
        let Some(isolated) = isolate_subject(&bytes)? else {
            anyhow::bail!("expected a subject");
        };
        let rgba = image::load_from_memory(&isolated)?.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(32, 22)[3], 255);
        // hole filled, and the 5×5 dilation keeps a margin around the edge
        assert_eq!(rgba.get_pixel(30, 30)[3], 255);
        assert_eq!(rgba.get_pixel(18, 32)[3], 255);
        assert_eq!(rgba.get_pixel(17, 32)[3], 0);
        Ok(())
    }

    #[test]
    fn all_backdrop_image_is_indeterminate() -> anyhow::Result<()> {
        let bytes = encode(RgbImage::from_pixel(40, 40, Rgb([250, 250, 250])))?;
        assert!(isolate_subject(&bytes)?.is_none());
        Ok(())
    }

    #[test]
    fn image_without_backdrop_is_indeterminate() -> anyhow::Result<()> {
        let bytes = encode(RgbImage::from_pixel(40, 40, Rgb([180, 20, 40])))?;
        assert!(isolate_subject(&bytes)?.is_none());
        Ok(())
    }

    #[test]
    fn small_subject_is_rejected() -> anyhow::Result<()> {
        let bytes = encode(subject_on_white(64, 28..36))?;
        assert!(isolate_subject(&bytes)?.is_none());
        Ok(())
    }

    #[test]
    fn undecodable_bytes_are_an_error() {
        assert!(isolate_subject(b"definitely not an image").is_err());
    }
}
