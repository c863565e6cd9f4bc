//! HTTP manifest downloader.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;
use url::Url;

use crate::collaborators::ManifestDownloader;
use crate::error::{VerifyError, VerifyResult};
use crate::types::DownloaderConfig;

mod http;
mod link;

use http::HttpBackend;
pub(crate) use link::is_allowed_manifest_url;
use link::find_manifest_link;

/// User-Agent sent with every manifest request.
pub const USER_AGENT_VALUE: &str = concat!("payauth-verifier/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 10;

/// Downloads manifests over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpManifestDownloader {
    http: HttpBackend,
}

impl HttpManifestDownloader {
    pub fn new(config: DownloaderConfig) -> VerifyResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        // Every redirect hop must satisfy the same scheme policy as the first URL.
        let allow_loopback_http = config.allow_loopback_http;
        let redirect = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if is_allowed_manifest_url(attempt.url(), allow_loopback_http) {
                attempt.follow()
            } else {
                attempt.error("redirect to disallowed manifest URL")
            }
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .redirect(redirect)
            .build()
            .map_err(|e| VerifyError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http: HttpBackend { client, config },
        })
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.http.config
    }

    fn check_url(&self, url: &Url) -> VerifyResult<()> {
        if is_allowed_manifest_url(url, self.http.config.allow_loopback_http) {
            Ok(())
        } else {
            Err(VerifyError::transport(url, "manifest URL must use https"))
        }
    }
}

#[async_trait]
impl ManifestDownloader for HttpManifestDownloader {
    /// HEAD the method URL and follow its `rel="payment-method-manifest"`
    /// link; without one, the method URL itself is the manifest.
    async fn download_method_manifest(&self, url: &Url) -> VerifyResult<Vec<u8>> {
        self.check_url(url)?;

        let links = self.http.head_links(url).await?;
        let manifest_url = match find_manifest_link(links.iter().map(String::as_str), url) {
            Some(target) => {
                debug!(method = %url, manifest = %target, "found payment method manifest link");
                target
            }
            None => {
                debug!(method = %url, "no payment method manifest link, using method URL");
                url.clone()
            }
        };

        self.check_url(&manifest_url)?;
        self.http.get_body(&manifest_url).await
    }

    async fn download_app_manifest(&self, url: &Url) -> VerifyResult<Vec<u8>> {
        self.check_url(url)?;
        debug!(url = %url, "fetching web app manifest");
        self.http.get_body(url).await
    }
}
