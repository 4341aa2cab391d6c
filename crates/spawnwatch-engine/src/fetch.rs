use std::time::Duration;

use reqwest::blocking::Client as HttpClient;

use spawnwatch_contracts::spawn::ImageSource;

use crate::error::{PipelineError, PipelineResult};
use crate::http::{client_with_timeout, ensure_success};

pub const FETCH_SERVICE: &str = "image_fetch";

pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> PipelineResult<Vec<u8>>;
}

pub struct HttpImageFetcher {
    http: HttpClient,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: client_with_timeout(timeout),
        }
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> PipelineResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|err| PipelineError::transport(FETCH_SERVICE, &err))?;
        let response = ensure_success(FETCH_SERVICE, response)?;
        let bytes = response
            .bytes()
            .map_err(|err| PipelineError::transport(FETCH_SERVICE, &err))?;
        if bytes.is_empty() {
            return Err(PipelineError::UnexpectedPayload {
                service: FETCH_SERVICE,
                message: format!("empty body from {url}"),
            });
        }
        Ok(bytes.to_vec())
    }
}

/// Raw bytes for an image source; inline bytes are returned as is.
pub fn acquire_image(fetcher: &dyn ImageFetcher, source: &ImageSource) -> PipelineResult<Vec<u8>> {
    match source {
        ImageSource::Url(url) => fetcher.fetch(url),
        ImageSource::Bytes(bytes) => Ok(bytes.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticFetcher;

    #[test]
    fn inline_bytes_skip_the_fetcher() -> anyhow::Result<()> {
        let fetcher = StaticFetcher::default();
        let bytes = acquire_image(&fetcher, &ImageSource::Bytes(vec![1, 2, 3]))?;
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(fetcher.requested().is_empty());
        Ok(())
    }

    #[test]
    fn urls_go_through_the_fetcher() -> anyhow::Result<()> {
        let fetcher = StaticFetcher::serving("https://cdn.test/spawn.png", vec![9, 9]);
        let bytes = acquire_image(&fetcher, &ImageSource::Url("https://cdn.test/spawn.png".into()))?;
        assert_eq!(bytes, vec![9, 9]);
        assert!(acquire_image(&fetcher, &ImageSource::Url("https://cdn.test/other.png".into())).is_err());
        Ok(())
    }
}
