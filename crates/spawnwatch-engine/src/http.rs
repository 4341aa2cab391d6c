use std::env;
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};

pub(crate) fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn api_base_from_env(keys: &[&str], default: &str) -> String {
    first_non_empty_env(keys)
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Blocking client with a default per-request timeout. Falls back to the
/// default client when the builder rejects the configuration.
pub(crate) fn client_with_timeout(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!("http client builder failed, using defaults: {err}");
            HttpClient::new()
        })
}

pub(crate) fn ensure_success(service: &'static str, response: HttpResponse) -> PipelineResult<HttpResponse> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(PipelineError::TransientNetwork {
        service,
        message: format!("status {}: {}", status.as_u16(), truncate_text(&body, 512)),
    })
}

pub(crate) fn response_json_or_error(service: &'static str, response: HttpResponse) -> PipelineResult<Value> {
    let response = ensure_success(service, response)?;
    let body = response
        .text()
        .map_err(|err| PipelineError::transport(service, &err))?;
    serde_json::from_str(&body).map_err(|err| PipelineError::UnexpectedPayload {
        service,
        message: format!("invalid JSON: {err}"),
    })
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
