//! HTTP layer: status mapping, retry, body limits.
//!
//! This is the ONLY place for status code handling. download/mod.rs never
//! interprets status codes.

use std::time::Duration;

use reqwest::header::{HeaderMap, LINK};
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::error::{VerifyError, VerifyResult};
use crate::types::DownloaderConfig;

/// HTTP backend for making requests (holds reqwest client and config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) config: DownloaderConfig,
}

impl HttpBackend {
    /// `Link` header values of a HEAD response.
    pub(crate) async fn head_links(&self, url: &Url) -> VerifyResult<Vec<String>> {
        let response = self.request(reqwest::Method::HEAD, url).await?;
        Ok(link_values(response.headers()))
    }

    /// GET a manifest body, enforcing the size limit.
    pub(crate) async fn get_body(&self, url: &Url) -> VerifyResult<Vec<u8>> {
        let mut response = self.request(reqwest::Method::GET, url).await?;
        let limit = self.config.max_manifest_bytes;

        if let Some(length) = response.content_length() {
            if length > limit {
                return Err(too_large(url, limit));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| VerifyError::transport(url, format!("failed to read body: {}", e)))?
        {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(too_large(url, limit));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %url, bytes = body.len(), "downloaded manifest");
        Ok(body)
    }

    /// Make a request, retrying transient failures with jittered backoff.
    pub(crate) async fn request(
        &self,
        method: reqwest::Method,
        url: &Url,
    ) -> VerifyResult<reqwest::Response> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            let result = self.request_once(method.clone(), url).await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let backoff = match &e {
                        VerifyError::RateLimited {
                            retry_after: Some(retry_after),
                        } => {
                            let capped = (*retry_after).min(Duration::from_secs(30));
                            let base_ms = capped.as_millis() as u64;
                            let jitter_factor: f64 =
                                rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
                            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
                            Duration::from_millis(jittered_ms.max(100))
                        }
                        _ => {
                            let base_backoff = Duration::from_secs(1 << retries);
                            let base_backoff = base_backoff.min(Duration::from_secs(30));
                            let jittered_ms =
                                rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                            Duration::from_millis(jittered_ms.max(10))
                        }
                    };

                    warn!(
                        url = %url,
                        error = %e,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(
        &self,
        method: reqwest::Method,
        url: &Url,
    ) -> VerifyResult<reqwest::Response> {
        let response = self
            .client
            .request(method, url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_redirect() {
                    VerifyError::Redirect {
                        url: url.to_string(),
                        message: e.to_string(),
                    }
                } else {
                    VerifyError::from(e)
                }
            })?;
        let status = response.status();

        match status {
            s if s.is_success() => Ok(response),

            StatusCode::NOT_FOUND => Err(VerifyError::NotFound {
                url: url.to_string(),
            }),

            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(VerifyError::RateLimited { retry_after })
            }

            s if s.is_server_error() => Err(VerifyError::transport(
                url,
                format!("HTTP {}", s.as_u16()),
            )),

            s => Err(VerifyError::HttpStatus {
                url: url.to_string(),
                status: s.as_u16(),
            }),
        }
    }
}

fn link_values(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect()
}

fn too_large(url: &Url, limit: u64) -> VerifyError {
    VerifyError::transport(url, format!("manifest exceeds {} bytes", limit))
}
