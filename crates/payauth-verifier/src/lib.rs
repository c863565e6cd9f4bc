//! Payment app manifest verification.
//!
//! Decides which installed payment apps may act on behalf of a URL-identified
//! payment method, by following the chain the method publishes on the web:
//!
//! - Payment method manifest (found via `Link: rel="payment-method-manifest"`)
//!   listing web app manifest URLs
//! - Web app manifests listing authorized packages, minimum versions and
//!   signing certificate fingerprints
//! - Installed app identity (version code and certificate fingerprints)
//!
//! Any manifest failure aborts the session with a single "invalid manifest"
//! notification. No app is ever reported valid on partial information.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use payauth_verifier::{
//!     CandidateApp, ChannelSink, Collaborators, HttpManifestDownloader, JsonManifestParser,
//!     MemoryManifestCache, PaymentMethodId, StaticPackageInspector, VerificationSession,
//!     VerifierConfig,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = VerifierConfig::from_env();
//! let inspector = StaticPackageInspector::from_json_file("installed.json").await?;
//! let collaborators = Collaborators::new(
//!     Arc::new(HttpManifestDownloader::new(config.downloader())?),
//!     Arc::new(JsonManifestParser::new()),
//!     Arc::new(MemoryManifestCache::new()),
//!     Arc::new(inspector),
//! );
//!
//! let (sink, mut events) = ChannelSink::new();
//! let session = VerificationSession::with_options(
//!     PaymentMethodId::parse("https://bobpay.com/pay")?,
//!     vec![CandidateApp::new("com.bobpay.app")],
//!     collaborators,
//!     Arc::new(sink),
//!     config.session_options(),
//! );
//!
//! let outcome = session.start().await?;
//! println!("valid apps: {:?}", outcome.valid_apps());
//! while let Some(event) = events.recv().await {
//!     if event.is_finished() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PAYAUTH_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `PAYAUTH_MAX_RETRIES` | Max retries for transient failures (default: 3) |
//! | `PAYAUTH_MAX_MANIFEST_BYTES` | Manifest body size limit (default: 1 MiB) |
//! | `PAYAUTH_CACHE_TTL` | Cache max age in seconds, 0 = any age (default: 86400) |
//! | `PAYAUTH_NO_CACHE` | Disable the manifest cache |
//! | `PAYAUTH_FINGERPRINT_POLICY` | `any` or `all` (default: `any`) |
//! | `PAYAUTH_ALLOW_LOOPBACK_HTTP` | Allow plain http on loopback hosts (default: true) |

pub mod aggregate;
pub mod cache;
mod cancel;
pub mod collaborators;
pub mod download;
pub mod error;
pub mod fingerprint;
pub mod inventory;
pub mod parser;
mod pipeline;
pub mod session;
pub mod sink;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types
pub use aggregate::{aggregate, evaluate};
pub use cache::{FileManifestCache, MemoryManifestCache};
pub use cancel::CancelHandle;
pub use collaborators::{
    Collaborators, ManifestCache, ManifestDownloader, ManifestParser, PackageInspector, ResultSink,
};
pub use download::{HttpManifestDownloader, USER_AGENT_VALUE};
pub use error::{VerifyError, VerifyResult};
pub use fingerprint::{matches, Fingerprint, FingerprintPolicy, SHA256_FINGERPRINT_LEN};
pub use inventory::{InstalledPackage, StaticPackageInspector};
pub use parser::{JsonManifestParser, MAX_DEFAULT_APPLICATIONS, MAX_RELATED_APPLICATIONS};
pub use session::{SessionId, SessionOutcome, VerificationSession};
pub use sink::{ChannelSink, RecordingSink, VerificationEvent};
pub use types::{
    AuthorizationEntry, AuthorizationSet, CachePolicy, CachedManifest, CandidateApp,
    DownloaderConfig, InstalledIdentity, PaymentMethodId, RejectReason, SessionOptions, Verdict,
    VerdictStatus, VerifierConfig,
};
