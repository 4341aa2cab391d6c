//! Failure taxonomy for the spawn pipeline.
//!
//! None of these errors ever reaches the event-handling entry point: every
//! stage maps them to a documented fallback or a silent, logged abort. The
//! [`PipelineError::failure_kind`] label is attached to log lines so the
//! dominant failure modes can be counted from the log stream.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Image fetch, color lookup, segmentation service or reference list
    /// request failed at the transport or HTTP level.
    #[error("{service} request failed: {message}")]
    TransientNetwork {
        service: &'static str,
        message: String,
    },

    /// The vision model did not answer within the allotted time.
    #[error("vision model timed out after {}s", .timeout.as_secs_f64())]
    ModelTimeout { timeout: Duration },

    /// The vision model answered with something that is not a species name.
    #[error("vision model returned an invalid species name: {answer:?}")]
    ModelInvalidOutput { answer: String },

    /// Required credentials are not configured.
    #[error("missing credentials: {hint}")]
    MissingCredentials { hint: &'static str },

    /// An image could not be decoded or encoded.
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// A response body did not have the expected shape.
    #[error("{service} returned an unexpected payload: {message}")]
    UnexpectedPayload {
        service: &'static str,
        message: String,
    },
}

impl PipelineError {
    pub fn failure_kind(&self) -> &'static str {
        match self {
            Self::TransientNetwork { .. } => "transient_network",
            Self::ModelTimeout { .. } => "model_timeout",
            Self::ModelInvalidOutput { .. } => "model_invalid_output",
            Self::MissingCredentials { .. } => "missing_credentials",
            Self::Image(_) => "image",
            Self::UnexpectedPayload { .. } => "unexpected_payload",
        }
    }

    pub fn transport(service: &'static str, err: &reqwest::Error) -> Self {
        Self::TransientNetwork {
            service,
            message: err.to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
