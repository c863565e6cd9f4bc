//! Payment method manifest caches.
//!
//! A cache maps a payment method to the web app manifest URLs its method
//! manifest listed. Cache trouble is never fatal: failed reads are misses
//! and failed writes are logged.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::collaborators::ManifestCache;
use crate::types::{CachedManifest, PaymentMethodId};

mod file;
mod io;

pub use file::FileManifestCache;

/// Process-local manifest cache.
#[derive(Debug, Default)]
pub struct MemoryManifestCache {
    entries: RwLock<HashMap<PaymentMethodId, CachedManifest>>,
}

impl MemoryManifestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a prepared entry, keeping its `stored_at`.
    pub async fn insert(&self, entry: CachedManifest) {
        self.entries.write().await.insert(entry.method.clone(), entry);
    }

    pub async fn remove(&self, method: &PaymentMethodId) -> Option<CachedManifest> {
        self.entries.write().await.remove(method)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ManifestCache for MemoryManifestCache {
    async fn get(&self, method: &PaymentMethodId) -> Option<CachedManifest> {
        let entry = self.entries.read().await.get(method).cloned();
        debug!(method = %method, hit = entry.is_some(), "memory cache lookup");
        entry
    }

    async fn put(&self, method: &PaymentMethodId, app_manifests: &[Url]) {
        let entry = CachedManifest::new(method.clone(), app_manifests.to_vec());
        self.entries.write().await.insert(method.clone(), entry);
    }
}
