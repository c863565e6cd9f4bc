//! Verification session lifecycle.
//!
//! A session verifies one payment method against a fixed set of candidate
//! apps. The sink sees, in order:
//!
//! - success: one valid/invalid notification per candidate, then `finished`
//! - manifest failure: one `invalid manifest`, then `finished`
//! - cancellation: `finished` only
//!
//! `finished` is delivered exactly once, even if the `start` future is
//! dropped before it completes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::cancel::{CancelHandle, CancelSignal};
use crate::collaborators::{Collaborators, ResultSink};
use crate::error::{VerifyError, VerifyResult};
use crate::pipeline::{ManifestPipeline, PipelineAbort};
use crate::types::{CandidateApp, PaymentMethodId, SessionOptions, Verdict, VerdictStatus};

/// Unique identifier of a verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Manifests verified; one verdict per candidate.
    Verified(Vec<Verdict>),

    /// A manifest could not be downloaded or parsed.
    InvalidManifest(VerifyError),

    /// Cancelled before verdicts were produced.
    Cancelled,
}

impl SessionOutcome {
    /// Candidates that passed verification.
    pub fn valid_apps(&self) -> Vec<&CandidateApp> {
        match self {
            Self::Verified(verdicts) => verdicts
                .iter()
                .filter(|v| v.is_valid())
                .map(|v| &v.candidate)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// One verification run.
pub struct VerificationSession {
    id: SessionId,
    method: PaymentMethodId,
    candidates: Vec<CandidateApp>,
    collaborators: Collaborators,
    sink: Arc<dyn ResultSink>,
    options: SessionOptions,
    started: AtomicBool,
    cancel: CancelHandle,
    signal: CancelSignal,
}

impl VerificationSession {
    /// Create a session with default options.
    pub fn new(
        method: PaymentMethodId,
        candidates: Vec<CandidateApp>,
        collaborators: Collaborators,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self::with_options(
            method,
            candidates,
            collaborators,
            sink,
            SessionOptions::default(),
        )
    }

    /// Create a session with custom options.
    pub fn with_options(
        method: PaymentMethodId,
        candidates: Vec<CandidateApp>,
        collaborators: Collaborators,
        sink: Arc<dyn ResultSink>,
        options: SessionOptions,
    ) -> Self {
        let (cancel, signal) = CancelHandle::new();
        Self {
            id: SessionId::new(),
            method,
            candidates,
            collaborators,
            sink,
            options,
            started: AtomicBool::new(false),
            cancel,
            signal,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn method(&self) -> &PaymentMethodId {
        &self.method
    }

    pub fn candidates(&self) -> &[CandidateApp] {
        &self.candidates
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Handle for cancelling this session from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run the verification, resolving after `finished` has been delivered.
    ///
    /// A session runs once. A second call returns
    /// [`VerifyError::AlreadyStarted`] and leaves the sink untouched.
    pub async fn start(&self) -> VerifyResult<SessionOutcome> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(VerifyError::AlreadyStarted {
                session: self.id.to_string(),
            });
        }

        debug!(
            session = %self.id,
            method = %self.method,
            candidates = self.candidates.len(),
            "starting verification"
        );

        let guard = FinishGuard::new(self);
        let outcome = self.run().await;
        guard.finish(&outcome);
        Ok(outcome)
    }

    /// Run the session on the tokio runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<VerifyResult<SessionOutcome>> {
        tokio::spawn(async move { self.start().await })
    }

    async fn run(&self) -> SessionOutcome {
        let mut signal = self.signal.clone();
        let pipeline =
            ManifestPipeline::new(&self.method, &self.collaborators, &self.options.cache);

        let authorizations = match pipeline.run(&mut signal).await {
            Ok(set) => set,
            Err(PipelineAbort::Failed(e)) => {
                self.sink.on_invalid_manifest(&self.method);
                return SessionOutcome::InvalidManifest(e);
            }
            Err(PipelineAbort::Cancelled) => return SessionOutcome::Cancelled,
        };

        if signal.is_cancelled() {
            return SessionOutcome::Cancelled;
        }

        let verdicts = aggregate(
            &self.candidates,
            &authorizations,
            self.collaborators.inspector.as_ref(),
            self.options.fingerprint_policy,
        );

        for verdict in &verdicts {
            match verdict.status {
                VerdictStatus::Valid => self.sink.on_valid_app(&self.method, &verdict.candidate),
                VerdictStatus::Invalid(_) => {
                    self.sink.on_invalid_app(&self.method, &verdict.candidate)
                }
            }
        }

        SessionOutcome::Verified(verdicts)
    }
}

impl fmt::Debug for VerificationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationSession")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("candidates", &self.candidates.len())
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

/// Delivers `finished` once, on completion or when the run is dropped.
struct FinishGuard<'a> {
    session: &'a VerificationSession,
    delivered: bool,
}

impl<'a> FinishGuard<'a> {
    fn new(session: &'a VerificationSession) -> Self {
        Self {
            session,
            delivered: false,
        }
    }

    fn finish(mut self, outcome: &SessionOutcome) {
        match outcome {
            SessionOutcome::Verified(verdicts) => info!(
                session = %self.session.id,
                method = %self.session.method,
                verdicts = verdicts.len(),
                valid = verdicts.iter().filter(|v| v.is_valid()).count(),
                "verification finished"
            ),
            SessionOutcome::InvalidManifest(e) => warn!(
                session = %self.session.id,
                method = %self.session.method,
                error = %e,
                "verification finished with invalid manifest"
            ),
            SessionOutcome::Cancelled => info!(
                session = %self.session.id,
                method = %self.session.method,
                "verification cancelled"
            ),
        }
        self.deliver();
    }

    fn deliver(&mut self) {
        if !self.delivered {
            self.delivered = true;
            self.session.sink.on_finished(self.session.id);
        }
    }
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        if !self.delivered {
            debug!(session = %self.session.id, "verification dropped before completion");
            self.deliver();
        }
    }
}
