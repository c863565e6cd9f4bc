//! Capability traits consumed by the verifier.
//!
//! Each trait is small and object-safe so sessions hold them as
//! `Arc<dyn Trait>` and tests can substitute scripted doubles.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::VerifyResult;
use crate::session::SessionId;
use crate::types::{
    AuthorizationEntry, CachedManifest, CandidateApp, InstalledIdentity, PaymentMethodId,
};

/// Fetches manifest bytes.
///
/// Each call resolves exactly once, with content or an error.
#[async_trait]
pub trait ManifestDownloader: Send + Sync {
    async fn download_method_manifest(&self, url: &Url) -> VerifyResult<Vec<u8>>;

    async fn download_app_manifest(&self, url: &Url) -> VerifyResult<Vec<u8>>;
}

/// Turns manifest bytes into structured data.
#[async_trait]
pub trait ManifestParser: Send + Sync {
    /// Web app manifest URLs listed by a payment method manifest, in order.
    async fn parse_method_manifest(&self, content: &[u8]) -> VerifyResult<Vec<Url>>;

    async fn parse_app_manifest(&self, content: &[u8]) -> VerifyResult<Vec<AuthorizationEntry>>;
}

/// Remembers web app manifest locations per payment method.
///
/// Shared between sessions; implementations must tolerate concurrent use.
#[async_trait]
pub trait ManifestCache: Send + Sync {
    async fn get(&self, method: &PaymentMethodId) -> Option<CachedManifest>;

    /// Store the manifest list. Failures are the implementation's to log.
    async fn put(&self, method: &PaymentMethodId, app_manifests: &[Url]);
}

/// Looks up installed app identities on the host.
pub trait PackageInspector: Send + Sync {
    fn installed_identity(&self, package_id: &str) -> Option<InstalledIdentity>;
}

/// Receives the outcome of a verification session.
pub trait ResultSink: Send + Sync {
    fn on_invalid_manifest(&self, method: &PaymentMethodId);

    fn on_valid_app(&self, method: &PaymentMethodId, app: &CandidateApp);

    fn on_invalid_app(&self, method: &PaymentMethodId, app: &CandidateApp);

    fn on_finished(&self, session: SessionId);
}

/// The set of collaborators a session works with.
#[derive(Clone)]
pub struct Collaborators {
    pub downloader: Arc<dyn ManifestDownloader>,
    pub parser: Arc<dyn ManifestParser>,
    pub cache: Arc<dyn ManifestCache>,
    pub inspector: Arc<dyn PackageInspector>,
}

impl Collaborators {
    pub fn new(
        downloader: Arc<dyn ManifestDownloader>,
        parser: Arc<dyn ManifestParser>,
        cache: Arc<dyn ManifestCache>,
        inspector: Arc<dyn PackageInspector>,
    ) -> Self {
        Self {
            downloader,
            parser,
            cache,
            inspector,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
