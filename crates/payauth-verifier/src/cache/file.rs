//! On-disk manifest cache with integrity verification on read.
//!
//! # Cache Structure
//!
//! ```text
//! ~/.cache/payauth/manifests/{sha256(method)}/
//!   entry.json       # CachedManifest + digest
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

use crate::collaborators::ManifestCache;
use crate::error::{VerifyError, VerifyResult};
use crate::types::{CachedManifest, PaymentMethodId};

use super::io;

const ENTRY_FILE: &str = "entry.json";

/// Stored form of a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    #[serde(flatten)]
    entry: CachedManifest,

    /// sha256 over the method and manifest URLs.
    digest: String,
}

/// Manifest cache backed by a directory.
#[derive(Debug, Clone)]
pub struct FileManifestCache {
    cache_dir: PathBuf,
}

impl FileManifestCache {
    /// Create a cache at the default location.
    ///
    /// Default: `{cache_dir}/payauth/manifests`
    pub fn new() -> VerifyResult<Self> {
        Ok(Self {
            cache_dir: io::default_cache_dir()?,
        })
    }

    /// Create a cache with a custom directory.
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_dir(&self, method: &PaymentMethodId) -> PathBuf {
        self.cache_dir.join(hex::encode(Sha256::digest(method.as_str().as_bytes())))
    }

    /// Read an entry, verifying its digest.
    ///
    /// Returns `None` if not cached; `Err` if the entry is unreadable or
    /// corrupted (callers should evict).
    pub async fn load(&self, method: &PaymentMethodId) -> VerifyResult<Option<CachedManifest>> {
        let path = self.entry_dir(method).join(ENTRY_FILE);
        if !path.exists() {
            debug!(method = %method, "manifest not in cache");
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| VerifyError::Cache {
                message: format!("failed to read cache entry: {}", e),
            })?;
        let record: CacheRecord =
            serde_json::from_str(&content).map_err(|e| VerifyError::Cache {
                message: format!("failed to parse cache entry: {}", e),
            })?;

        if &record.entry.method != method {
            return Err(VerifyError::Cache {
                message: format!(
                    "cache entry for {} found under {}",
                    record.entry.method, method
                ),
            });
        }

        let computed = record_digest(method, &record.entry.app_manifests);
        if computed != record.digest {
            warn!(
                method = %method,
                expected = %record.digest,
                actual = %computed,
                "cache integrity check failed"
            );
            return Err(VerifyError::Cache {
                message: format!("digest mismatch for cached {}", method),
            });
        }

        debug!(method = %method, "cache hit");
        Ok(Some(record.entry))
    }

    /// Store an entry.
    pub async fn store(&self, method: &PaymentMethodId, app_manifests: &[Url]) -> VerifyResult<()> {
        let dir = self.entry_dir(method);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| VerifyError::Cache {
                message: format!("failed to create cache directory: {}", e),
            })?;

        let record = CacheRecord {
            digest: record_digest(method, app_manifests),
            entry: CachedManifest::new(method.clone(), app_manifests.to_vec()),
        };
        let json = serde_json::to_string_pretty(&record).map_err(|e| VerifyError::Cache {
            message: format!("failed to serialize cache entry: {}", e),
        })?;

        io::write_atomic(&dir.join(ENTRY_FILE), &json).await?;
        debug!(method = %method, manifests = app_manifests.len(), "cached payment method manifest");
        Ok(())
    }

    /// Evict one payment method.
    pub async fn evict(&self, method: &PaymentMethodId) -> VerifyResult<()> {
        let dir = self.entry_dir(method);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .await
                .map_err(|e| VerifyError::Cache {
                    message: format!("failed to evict cache entry: {}", e),
                })?;
            debug!(method = %method, "evicted from cache");
        }
        Ok(())
    }

    /// Remove every entry.
    pub async fn clear(&self) -> VerifyResult<()> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)
                .await
                .map_err(|e| VerifyError::Cache {
                    message: format!("failed to clear cache: {}", e),
                })?;
            debug!("cleared manifest cache");
        }
        Ok(())
    }

    /// All readable entries. Corrupted ones are skipped.
    pub async fn list(&self) -> VerifyResult<Vec<CachedManifest>> {
        let mut result = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(result);
        }

        let mut dirs = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| VerifyError::Cache {
                message: format!("failed to read cache directory: {}", e),
            })?;

        while let Some(dir) = dirs.next_entry().await.map_err(|e| VerifyError::Cache {
            message: format!("failed to read directory entry: {}", e),
        })? {
            let path = dir.path().join(ENTRY_FILE);
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<CacheRecord>(&content) {
                Ok(record)
                    if record_digest(&record.entry.method, &record.entry.app_manifests)
                        == record.digest =>
                {
                    result.push(record.entry)
                }
                _ => debug!(path = %path.display(), "skipping unreadable cache entry"),
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl ManifestCache for FileManifestCache {
    async fn get(&self, method: &PaymentMethodId) -> Option<CachedManifest> {
        match self.load(method).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(method = %method, error = %e, "cache read failed, evicting");
                if let Err(e) = self.evict(method).await {
                    warn!(method = %method, error = %e, "failed to evict cache entry");
                }
                None
            }
        }
    }

    async fn put(&self, method: &PaymentMethodId, app_manifests: &[Url]) {
        if let Err(e) = self.store(method, app_manifests).await {
            warn!(method = %method, error = %e, "failed to cache payment method manifest");
        }
    }
}

fn record_digest(method: &PaymentMethodId, app_manifests: &[Url]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    for url in app_manifests {
        hasher.update(b"\n");
        hasher.update(url.as_str().as_bytes());
    }
    format!("sha256:{}", hex::encode(hasher.finalize()))
}
