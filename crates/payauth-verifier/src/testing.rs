//! Scripted collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use url::Url;

use crate::collaborators::{
    Collaborators, ManifestCache, ManifestDownloader, ManifestParser, PackageInspector,
};
use crate::error::{VerifyError, VerifyResult};
use crate::fingerprint::{Fingerprint, SHA256_FINGERPRINT_LEN};
use crate::types::{AuthorizationEntry, CachedManifest, InstalledIdentity, PaymentMethodId};

pub(crate) fn fp(byte: u8) -> Fingerprint {
    Fingerprint::from_bytes(vec![byte; SHA256_FINGERPRINT_LEN])
}

pub(crate) fn entry(package_id: &str, min_version: i64, fp_byte: u8) -> AuthorizationEntry {
    AuthorizationEntry {
        package_id: package_id.to_string(),
        min_version,
        fingerprints: vec![fp(fp_byte)],
    }
}

pub(crate) fn identity(version_code: i64, fp_byte: u8) -> InstalledIdentity {
    InstalledIdentity {
        version_code,
        fingerprints: vec![fp(fp_byte)],
    }
}

#[derive(Default)]
struct Script {
    /// `None` makes the payment method manifest fail to parse.
    method_manifest: Option<Vec<String>>,
    fail_method_download: bool,
    app_entries: HashMap<String, Vec<AuthorizationEntry>>,
    fail_app_download: HashSet<String>,
    fail_app_parse: HashSet<String>,
    app_download_delay: Option<Duration>,
    cached: HashMap<PaymentMethodId, CachedManifest>,
    installed: HashMap<String, InstalledIdentity>,

    method_downloads: usize,
    app_downloads: Vec<String>,
    app_parses: Vec<String>,
    cache_puts: usize,
}

/// Downloader, parser, cache, and inspector driven by one script.
///
/// App manifest "content" is the manifest URL, so the parser can tell
/// which manifest it is parsing.
#[derive(Clone, Default)]
pub(crate) struct ScriptedCollaborators {
    script: Arc<Mutex<Script>>,
    app_download_started: Arc<Notify>,
}

impl ScriptedCollaborators {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub(crate) fn with_method_manifest(self, urls: &[&str]) -> Self {
        self.script().method_manifest = Some(urls.iter().map(|u| u.to_string()).collect());
        self
    }

    pub(crate) fn with_app_entries(self, url: &str, entries: Vec<AuthorizationEntry>) -> Self {
        self.script().app_entries.insert(url.to_string(), entries);
        self
    }

    pub(crate) fn with_failed_method_download(self) -> Self {
        self.script().fail_method_download = true;
        self
    }

    pub(crate) fn with_failed_app_download(self, url: &str) -> Self {
        self.script().fail_app_download.insert(url.to_string());
        self
    }

    pub(crate) fn with_failed_app_parse(self, url: &str) -> Self {
        self.script().fail_app_parse.insert(url.to_string());
        self
    }

    pub(crate) fn with_app_download_delay(self, delay: Duration) -> Self {
        self.script().app_download_delay = Some(delay);
        self
    }

    pub(crate) fn with_cached(self, method: &PaymentMethodId, urls: &[&str]) -> Self {
        let urls = urls.iter().map(|u| Url::parse(u).unwrap()).collect();
        self.script()
            .cached
            .insert(method.clone(), CachedManifest::new(method.clone(), urls));
        self
    }

    pub(crate) fn with_stale_cached(self, method: &PaymentMethodId, urls: &[&str]) -> Self {
        let urls = urls.iter().map(|u| Url::parse(u).unwrap()).collect();
        let mut entry = CachedManifest::new(method.clone(), urls);
        entry.stored_at = Utc::now() - chrono::Duration::days(30);
        self.script().cached.insert(method.clone(), entry);
        self
    }

    pub(crate) fn with_installed(self, package_id: &str, identity: InstalledIdentity) -> Self {
        self.script().installed.insert(package_id.to_string(), identity);
        self
    }

    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
        )
    }

    pub(crate) fn method_download_count(&self) -> usize {
        self.script().method_downloads
    }

    pub(crate) fn app_downloads(&self) -> Vec<String> {
        self.script().app_downloads.clone()
    }

    pub(crate) fn app_download_count(&self) -> usize {
        self.script().app_downloads.len()
    }

    pub(crate) fn app_parse_count(&self) -> usize {
        self.script().app_parses.len()
    }

    pub(crate) fn cache_puts(&self) -> usize {
        self.script().cache_puts
    }

    /// Resolves once an app manifest download has begun.
    pub(crate) async fn wait_for_app_download(&self) {
        self.app_download_started.notified().await;
    }
}

#[async_trait]
impl ManifestDownloader for ScriptedCollaborators {
    async fn download_method_manifest(&self, url: &Url) -> VerifyResult<Vec<u8>> {
        let mut script = self.script();
        script.method_downloads += 1;
        if script.fail_method_download {
            return Err(VerifyError::transport(url, "scripted failure"));
        }
        Ok(b"payment method manifest".to_vec())
    }

    async fn download_app_manifest(&self, url: &Url) -> VerifyResult<Vec<u8>> {
        let delay = {
            let mut script = self.script();
            script.app_downloads.push(url.to_string());
            if script.fail_app_download.contains(url.as_str()) {
                return Err(VerifyError::transport(url, "scripted failure"));
            }
            script.app_download_delay
        };

        self.app_download_started.notify_one();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(url.as_str().as_bytes().to_vec())
    }
}

#[async_trait]
impl ManifestParser for ScriptedCollaborators {
    async fn parse_method_manifest(&self, _content: &[u8]) -> VerifyResult<Vec<Url>> {
        let script = self.script();
        match &script.method_manifest {
            Some(urls) => Ok(urls.iter().map(|u| Url::parse(u).unwrap()).collect()),
            None => Err(VerifyError::malformed("scripted failure")),
        }
    }

    async fn parse_app_manifest(&self, content: &[u8]) -> VerifyResult<Vec<AuthorizationEntry>> {
        let url = String::from_utf8_lossy(content).to_string();
        let mut script = self.script();
        script.app_parses.push(url.clone());
        if script.fail_app_parse.contains(&url) {
            return Err(VerifyError::malformed("scripted failure"));
        }
        Ok(script.app_entries.get(&url).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ManifestCache for ScriptedCollaborators {
    async fn get(&self, method: &PaymentMethodId) -> Option<CachedManifest> {
        self.script().cached.get(method).cloned()
    }

    async fn put(&self, method: &PaymentMethodId, app_manifests: &[Url]) {
        let mut script = self.script();
        script.cache_puts += 1;
        script.cached.insert(
            method.clone(),
            CachedManifest::new(method.clone(), app_manifests.to_vec()),
        );
    }
}

impl PackageInspector for ScriptedCollaborators {
    fn installed_identity(&self, package_id: &str) -> Option<InstalledIdentity> {
        self.script().installed.get(package_id).cloned()
    }
}
