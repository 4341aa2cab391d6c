use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::config::VisionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::http::response_json_or_error;

pub const VISION_SERVICE: &str = "gemini";

/// One classification call: instruction text plus a single image.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    pub instruction: &'a str,
    pub image: &'a [u8],
    pub mime_type: &'a str,
}

/// A vision-capable model that answers a text instruction about an image
/// with free text.
pub trait VisionClassifier: Send + Sync {
    fn classify(&self, request: &VisionRequest<'_>, timeout: Duration) -> PipelineResult<String>;
}

pub struct GeminiClassifier {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http: HttpClient,
}

impl GeminiClassifier {
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn payload(request: &VisionRequest<'_>) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.instruction },
                    {
                        "inlineData": {
                            "mimeType": request.mime_type,
                            "data": BASE64.encode(request.image),
                        }
                    },
                ],
            }],
            "generationConfig": {
                "temperature": 0.0,
                "candidateCount": 1,
            },
        })
    }
}

impl VisionClassifier for GeminiClassifier {
    fn classify(&self, request: &VisionRequest<'_>, timeout: Duration) -> PipelineResult<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(PipelineError::MissingCredentials {
                hint: "GEMINI_API_KEY or GOOGLE_API_KEY not set",
            });
        };
        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .timeout(timeout)
            .json(&Self::payload(request))
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    PipelineError::ModelTimeout { timeout }
                } else {
                    PipelineError::transport(VISION_SERVICE, &err)
                }
            })?;
        let parsed = response_json_or_error(VISION_SERVICE, response)?;
        let text = extract_candidate_text(&parsed);
        if text.trim().is_empty() {
            return Err(PipelineError::ModelInvalidOutput {
                answer: String::new(),
            });
        }
        Ok(text)
    }
}

/// Concatenated text parts of the first candidate.
pub(crate) fn extract_candidate_text(response: &Value) -> String {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<&str>>()
                .join("")
        })
        .unwrap_or_default()
}

/// Declared mime type for encoded image bytes; PNG when the format is not
/// recognized.
pub fn mime_for_bytes(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        _ => "image/png",
    }
}
