use std::time::Duration;

use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;

use crate::error::{PipelineError, PipelineResult};
use crate::http::{client_with_timeout, ensure_success};
use crate::vision::mime_for_bytes;

pub const SEGMENTER_SERVICE: &str = "segmenter";

/// Learned foreground segmentation: returns an encoded image whose alpha
/// channel masks out the background.
pub trait ForegroundSegmenter: Send + Sync {
    fn segment(&self, image: &[u8]) -> PipelineResult<Vec<u8>>;
}

/// Client for a rembg-compatible HTTP service (`POST {base}/api/remove`).
pub struct RembgSegmenter {
    endpoint: String,
    http: HttpClient,
}

impl RembgSegmenter {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            endpoint: format!("{}/api/remove", base_url.trim_end_matches('/')),
            http: client_with_timeout(timeout),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ForegroundSegmenter for RembgSegmenter {
    fn segment(&self, image: &[u8]) -> PipelineResult<Vec<u8>> {
        let part = MultipartPart::bytes(image.to_vec())
            .file_name("spawn")
            .mime_str(mime_for_bytes(image))
            .map_err(|err| PipelineError::transport(SEGMENTER_SERVICE, &err))?;
        let form = MultipartForm::new().part("file", part);
        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(|err| PipelineError::transport(SEGMENTER_SERVICE, &err))?;
        let response = ensure_success(SEGMENTER_SERVICE, response)?;
        let bytes = response
            .bytes()
            .map_err(|err| PipelineError::transport(SEGMENTER_SERVICE, &err))?;
        Ok(bytes.to_vec())
    }
}
