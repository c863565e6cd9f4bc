//! Sequential manifest pipeline.
//!
//! Order of operations for one payment method:
//! 1. Cache lookup (if enabled and fresh, skip to 4)
//! 2. Download + parse the payment method manifest
//! 3. Store the web app manifest list in the cache
//! 4. Download + parse each web app manifest, one at a time, in order
//!
//! The first failure ends the run: nothing further is downloaded or parsed
//! and no partial authorization set escapes.

use std::future::Future;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cancel::CancelSignal;
use crate::collaborators::Collaborators;
use crate::error::{VerifyError, VerifyResult};
use crate::types::{AuthorizationSet, CachePolicy, PaymentMethodId};

/// Why a pipeline run stopped early.
#[derive(Debug)]
pub(crate) enum PipelineAbort {
    /// A download or parse failed.
    Failed(VerifyError),

    /// The session was cancelled.
    Cancelled,
}

/// Manifest pipeline for a single payment method.
pub(crate) struct ManifestPipeline<'a> {
    method: &'a PaymentMethodId,
    collaborators: &'a Collaborators,
    cache_policy: &'a CachePolicy,
}

impl<'a> ManifestPipeline<'a> {
    pub(crate) fn new(
        method: &'a PaymentMethodId,
        collaborators: &'a Collaborators,
        cache_policy: &'a CachePolicy,
    ) -> Self {
        Self {
            method,
            collaborators,
            cache_policy,
        }
    }

    /// Run to completion, returning every authorization entry on success.
    pub(crate) async fn run(
        &self,
        cancel: &mut CancelSignal,
    ) -> Result<AuthorizationSet, PipelineAbort> {
        let app_manifests = match self.cached_app_manifests(cancel).await? {
            Some(urls) => urls,
            None => self.fetch_method_manifest(cancel).await?,
        };

        let mut authorizations = AuthorizationSet::new();
        for (index, url) in app_manifests.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineAbort::Cancelled);
            }

            debug!(method = %self.method, index, url = %url, "downloading web app manifest");
            let content = step(
                cancel,
                self.collaborators.downloader.download_app_manifest(url),
            )
            .await
            .map_err(|abort| self.log_abort(abort, "web app manifest download", url))?;

            let entries = step(cancel, self.collaborators.parser.parse_app_manifest(&content))
                .await
                .map_err(|abort| self.log_abort(abort, "web app manifest parse", url))?;

            debug!(
                method = %self.method,
                url = %url,
                entries = entries.len(),
                "parsed web app manifest"
            );
            authorizations.extend(entries);
        }

        info!(
            method = %self.method,
            manifests = app_manifests.len(),
            entries = authorizations.len(),
            "manifest pipeline complete"
        );
        Ok(authorizations)
    }

    async fn cached_app_manifests(
        &self,
        cancel: &mut CancelSignal,
    ) -> Result<Option<Vec<Url>>, PipelineAbort> {
        if !self.cache_policy.enabled {
            return Ok(None);
        }

        let cached = step(cancel, async {
            Ok::<_, VerifyError>(self.collaborators.cache.get(self.method).await)
        })
        .await?;

        match cached {
            Some(entry) if entry.is_fresh(self.cache_policy, Utc::now()) => {
                debug!(
                    method = %self.method,
                    manifests = entry.app_manifests.len(),
                    stored_at = %entry.stored_at,
                    "using cached payment method manifest"
                );
                Ok(Some(entry.app_manifests))
            }
            Some(entry) => {
                debug!(
                    method = %self.method,
                    stored_at = %entry.stored_at,
                    "cached payment method manifest is stale"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn fetch_method_manifest(
        &self,
        cancel: &mut CancelSignal,
    ) -> Result<Vec<Url>, PipelineAbort> {
        let url = self.method.url();

        debug!(method = %self.method, "downloading payment method manifest");
        let content = step(
            cancel,
            self.collaborators.downloader.download_method_manifest(url),
        )
        .await
        .map_err(|abort| self.log_abort(abort, "payment method manifest download", url))?;

        let app_manifests = step(
            cancel,
            self.collaborators.parser.parse_method_manifest(&content),
        )
        .await
        .map_err(|abort| self.log_abort(abort, "payment method manifest parse", url))?;

        debug!(
            method = %self.method,
            manifests = app_manifests.len(),
            "parsed payment method manifest"
        );

        if self.cache_policy.enabled {
            step(cancel, async {
                self.collaborators
                    .cache
                    .put(self.method, &app_manifests)
                    .await;
                Ok::<_, VerifyError>(())
            })
            .await?;
        }

        Ok(app_manifests)
    }

    fn log_abort(&self, abort: PipelineAbort, stage: &str, url: &Url) -> PipelineAbort {
        match &abort {
            PipelineAbort::Failed(e) => {
                warn!(method = %self.method, stage, url = %url, error = %e, "aborting verification")
            }
            PipelineAbort::Cancelled => {
                debug!(method = %self.method, stage, url = %url, "verification cancelled")
            }
        }
        abort
    }
}

/// Await one collaborator call unless the session is cancelled first.
async fn step<T, F>(cancel: &mut CancelSignal, call: F) -> Result<T, PipelineAbort>
where
    F: Future<Output = VerifyResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(PipelineAbort::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineAbort::Cancelled),
        result = call => result.map_err(PipelineAbort::Failed),
    }
}
