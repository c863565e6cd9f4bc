//! Ready-made result sinks.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

use crate::collaborators::ResultSink;
use crate::session::SessionId;
use crate::types::{CandidateApp, PaymentMethodId};

/// One notification delivered to a [`ResultSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent {
    InvalidManifest(PaymentMethodId),
    ValidApp(PaymentMethodId, CandidateApp),
    InvalidApp(PaymentMethodId, CandidateApp),
    Finished(SessionId),
}

impl VerificationEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Forwards notifications into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<VerificationEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<VerificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: VerificationEvent) {
        if self.tx.send(event).is_err() {
            debug!("verification event receiver dropped");
        }
    }
}

impl ResultSink for ChannelSink {
    fn on_invalid_manifest(&self, method: &PaymentMethodId) {
        self.send(VerificationEvent::InvalidManifest(method.clone()));
    }

    fn on_valid_app(&self, method: &PaymentMethodId, app: &CandidateApp) {
        self.send(VerificationEvent::ValidApp(method.clone(), app.clone()));
    }

    fn on_invalid_app(&self, method: &PaymentMethodId, app: &CandidateApp) {
        self.send(VerificationEvent::InvalidApp(method.clone(), app.clone()));
    }

    fn on_finished(&self, session: SessionId) {
        self.send(VerificationEvent::Finished(session));
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<VerificationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<VerificationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn push(&self, event: VerificationEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl ResultSink for RecordingSink {
    fn on_invalid_manifest(&self, method: &PaymentMethodId) {
        self.push(VerificationEvent::InvalidManifest(method.clone()));
    }

    fn on_valid_app(&self, method: &PaymentMethodId, app: &CandidateApp) {
        self.push(VerificationEvent::ValidApp(method.clone(), app.clone()));
    }

    fn on_invalid_app(&self, method: &PaymentMethodId, app: &CandidateApp) {
        self.push(VerificationEvent::InvalidApp(method.clone(), app.clone()));
    }

    fn on_finished(&self, session: SessionId) {
        self.push(VerificationEvent::Finished(session));
    }
}
