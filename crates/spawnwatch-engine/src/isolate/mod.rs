mod heuristic;
mod segmenter;

use std::sync::Arc;

pub use heuristic::{isolate_subject, MIN_SUBJECT_AREA};
pub use segmenter::{ForegroundSegmenter, RembgSegmenter, SEGMENTER_SERVICE};

/// Learned masks with this many fully transparent pixels or fewer are
/// treated as "nothing removed".
pub const MIN_TRANSPARENT_PIXELS: usize = 100;

/// Removes the backdrop behind a spawn image.
///
/// Order: learned segmenter, color-range heuristic, learned segmenter once
/// more, then the input bytes unchanged. Never fails.
pub struct BackgroundIsolator {
    segmenter: Option<Arc<dyn ForegroundSegmenter>>,
}

impl BackgroundIsolator {
    pub fn new(segmenter: Option<Arc<dyn ForegroundSegmenter>>) -> Self {
        Self { segmenter }
    }

    pub fn heuristic_only() -> Self {
        Self::new(None)
    }

    pub fn isolate(&self, image: &[u8]) -> Vec<u8> {
        if let Some(segmented) = self.try_segmenter(image) {
            return segmented;
        }
        match isolate_subject(image) {
            Ok(Some(isolated)) => return isolated,
            Ok(None) => tracing::debug!("heuristic isolation indeterminate"),
            Err(err) => {
                tracing::warn!(failure = err.failure_kind(), "heuristic isolation failed: {err}")
            }
        }
        if let Some(segmented) = self.try_segmenter(image) {
            return segmented;
        }
        tracing::debug!("isolation fell back to original image");
        image.to_vec()
    }

    fn try_segmenter(&self, image: &[u8]) -> Option<Vec<u8>> {
        let segmenter = self.segmenter.as_ref()?;
        let output = match segmenter.segment(image) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(failure = err.failure_kind(), "segmentation failed: {err}");
                return None;
            }
        };
        let transparent = match transparent_pixels(&output) {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!("segmentation output undecodable: {err}");
                return None;
            }
        };
        if transparent <= MIN_TRANSPARENT_PIXELS {
            tracing::debug!(transparent, "segmentation removed too little, rejecting");
            return None;
        }
        Some(output)
    }
}

fn transparent_pixels(encoded: &[u8]) -> Result<usize, image::ImageError> {
    let rgba = image::load_from_memory(encoded)?.to_rgba8();
    Ok(rgba.pixels().filter(|pixel| pixel[3] == 0).count())
}
