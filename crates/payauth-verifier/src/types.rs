//! Domain types and configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{VerifyError, VerifyResult};
use crate::fingerprint::{Fingerprint, FingerprintPolicy};

/// Identifier of the payment method being verified (an absolute URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethodId(Url);

impl PaymentMethodId {
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    /// Parse an absolute URL.
    pub fn parse(s: &str) -> VerifyResult<Self> {
        Url::parse(s).map(Self).map_err(|e| VerifyError::Config {
            message: format!("invalid payment method identifier {:?}: {}", s, e),
        })
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for PaymentMethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Url> for PaymentMethodId {
    fn from(url: Url) -> Self {
        Self(url)
    }
}

/// An installed app the caller wants verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateApp {
    /// Package identifier (e.g., "com.bobpay.app").
    pub package_id: String,

    /// Host data carried through untouched (e.g., activity name).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CandidateApp {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One app authorized by a web app manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationEntry {
    /// Declared package identifier.
    pub package_id: String,

    /// Lowest accepted version code.
    pub min_version: i64,

    /// Accepted signing certificate fingerprints.
    pub fingerprints: Vec<Fingerprint>,
}

/// Identity of an installed app as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledIdentity {
    /// Installed version code.
    pub version_code: i64,

    /// Fingerprints of the certificates currently signing the app.
    pub fingerprints: Vec<Fingerprint>,
}

/// Entries gathered from every web app manifest of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationSet {
    entries: Vec<AuthorizationEntry>,
}

impl AuthorizationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn extend(&mut self, entries: impl IntoIterator<Item = AuthorizationEntry>) {
        self.entries.extend(entries);
    }

    /// Entries declaring `package_id`.
    pub fn entries_for<'a>(
        &'a self,
        package_id: &'a str,
    ) -> impl Iterator<Item = &'a AuthorizationEntry> + 'a {
        self.entries.iter().filter(move |e| e.package_id == package_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuthorizationEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<AuthorizationEntry> for AuthorizationSet {
    fn from_iter<T: IntoIterator<Item = AuthorizationEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The host does not know the package.
    NotInstalled,

    /// No manifest entry names the package.
    NotListed,

    /// Listed, but every matching entry requires a newer version.
    VersionTooOld { installed: i64, required: i64 },

    /// Listed and recent enough, but the signing certificates differ.
    FingerprintMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => write!(f, "not installed"),
            Self::NotListed => write!(f, "not listed in any web app manifest"),
            Self::VersionTooOld {
                installed,
                required,
            } => write!(f, "version {} below minimum {}", installed, required),
            Self::FingerprintMismatch => write!(f, "signing certificate not authorized"),
        }
    }
}

/// Outcome for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictStatus {
    Valid,
    Invalid(RejectReason),
}

/// Verdict for one candidate app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub candidate: CandidateApp,
    pub status: VerdictStatus,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self.status, VerdictStatus::Valid)
    }
}

/// Web app manifest locations remembered for a payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedManifest {
    /// Payment method the entry belongs to.
    pub method: PaymentMethodId,

    /// Web app manifest URLs, in manifest order.
    pub app_manifests: Vec<Url>,

    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
}

impl CachedManifest {
    pub fn new(method: PaymentMethodId, app_manifests: Vec<Url>) -> Self {
        Self {
            method,
            app_manifests,
            stored_at: Utc::now(),
        }
    }

    /// Whether the entry is usable under `policy` at `now`.
    ///
    /// An entry stamped in the future is stale regardless of policy.
    pub fn is_fresh(&self, policy: &CachePolicy, now: DateTime<Utc>) -> bool {
        if self.stored_at > now {
            return false;
        }
        match policy.max_age {
            None => true,
            Some(max_age) => match chrono::Duration::from_std(max_age) {
                Ok(max_age) => now - self.stored_at <= max_age,
                Err(_) => true,
            },
        }
    }
}

/// Cache lookup and freshness rules for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Consult and populate the cache at all.
    pub enabled: bool,

    /// Entries older than this are treated as misses. `None` accepts any age.
    pub max_age: Option<Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age: Some(Duration::from_secs(default_cache_ttl())),
        }
    }
}

impl CachePolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_age: None,
        }
    }
}

/// Per-session verification options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub fingerprint_policy: FingerprintPolicy,
    pub cache: CachePolicy,
}

/// HTTP downloader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    pub max_retries: u32,

    /// Largest accepted manifest body.
    pub max_manifest_bytes: u64,

    /// Permit plain http for loopback hosts.
    pub allow_loopback_http: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        VerifierConfig::default().downloader()
    }
}

/// Verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Largest accepted manifest body in bytes.
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: u64,

    /// Cache max age in seconds; 0 disables the freshness check.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Skip cache lookup and store.
    #[serde(default)]
    pub no_cache: bool,

    /// Multi-certificate matching policy.
    #[serde(default)]
    pub fingerprint_policy: FingerprintPolicy,

    /// Permit plain http for loopback hosts.
    #[serde(default = "default_allow_loopback_http")]
    pub allow_loopback_http: bool,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_manifest_bytes() -> u64 {
    1024 * 1024
}

fn default_cache_ttl() -> u64 {
    24 * 60 * 60
}

fn default_allow_loopback_http() -> bool {
    true
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            max_manifest_bytes: default_max_manifest_bytes(),
            cache_ttl_secs: default_cache_ttl(),
            no_cache: false,
            fingerprint_policy: FingerprintPolicy::default(),
            allow_loopback_http: default_allow_loopback_http(),
        }
    }
}

impl VerifierConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PAYAUTH_TIMEOUT` | Request timeout in seconds |
    /// | `PAYAUTH_MAX_RETRIES` | Retries for transient failures |
    /// | `PAYAUTH_MAX_MANIFEST_BYTES` | Manifest body size limit |
    /// | `PAYAUTH_CACHE_TTL` | Cache max age in seconds (0 = no check) |
    /// | `PAYAUTH_NO_CACHE` | Disable the manifest cache |
    /// | `PAYAUTH_FINGERPRINT_POLICY` | `any` or `all` |
    /// | `PAYAUTH_ALLOW_LOOPBACK_HTTP` | Allow http on loopback hosts |
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self {
            timeout_secs: env_parse("PAYAUTH_TIMEOUT").unwrap_or_else(default_timeout),
            max_retries: env_parse("PAYAUTH_MAX_RETRIES").unwrap_or_else(default_max_retries),
            max_manifest_bytes: env_parse("PAYAUTH_MAX_MANIFEST_BYTES")
                .unwrap_or_else(default_max_manifest_bytes),
            cache_ttl_secs: env_parse("PAYAUTH_CACHE_TTL").unwrap_or_else(default_cache_ttl),
            no_cache: env_flag("PAYAUTH_NO_CACHE").unwrap_or(false),
            fingerprint_policy: env_parse("PAYAUTH_FINGERPRINT_POLICY").unwrap_or_default(),
            allow_loopback_http: env_flag("PAYAUTH_ALLOW_LOOPBACK_HTTP")
                .unwrap_or_else(default_allow_loopback_http),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the fingerprint policy.
    pub fn with_fingerprint_policy(mut self, policy: FingerprintPolicy) -> Self {
        self.fingerprint_policy = policy;
        self
    }

    /// Disable the manifest cache.
    pub fn without_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    pub fn downloader(&self) -> DownloaderConfig {
        DownloaderConfig {
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            max_manifest_bytes: self.max_manifest_bytes,
            allow_loopback_http: self.allow_loopback_http,
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        if self.no_cache {
            return CachePolicy::disabled();
        }
        CachePolicy {
            enabled: true,
            max_age: (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs)),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            fingerprint_policy: self.fingerprint_policy,
            cache: self.cache_policy(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}
