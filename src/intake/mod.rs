//! Webhook intake orchestration.
//!
//! Per inbound event: signature over the exact raw bytes, then age, then
//! replay record, then workspace trust, then the subscription filter. Only a
//! credited invoice event from the trusted workspace produces a transfer;
//! everything this system does not act on is acknowledged without action.
//! The processed record is written after dispatch succeeds, not before.

pub mod error;

pub use error::IntakeError;

use std::sync::Arc;
use tracing::{debug, info};

use crate::dispatch::TransferDispatcher;
use crate::provider::types::{InboundEvent, LogDetail, WebhookEnvelope};
use crate::provider::SignatureVerifier;
use crate::store::{Admission, ReplayGuard};

pub const SUBSCRIPTION_INVOICE: &str = "invoice";

/// How an accepted event was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// A transfer was dispatched and the event recorded as processed.
    Dispatched,
    /// Valid event this system does not act on; acknowledged only.
    Ignored,
}

pub struct WebhookIntake {
    verifier: SignatureVerifier,
    replay: ReplayGuard,
    dispatcher: Arc<TransferDispatcher>,
    trusted_workspace: String,
}

impl WebhookIntake {
    pub fn new(
        verifier: SignatureVerifier,
        replay: ReplayGuard,
        dispatcher: Arc<TransferDispatcher>,
        trusted_workspace: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            replay,
            dispatcher,
            trusted_workspace: trusted_workspace.into(),
        }
    }

    /// Validate and settle one inbound event.
    ///
    /// The signature is verified over `raw_body` exactly as received, since
    /// re-serialization could change byte content and invalidate it.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature_b64: &str,
    ) -> Result<IntakeOutcome, IntakeError> {
        let envelope: WebhookEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| IntakeError::MalformedBody(e.to_string()))?;
        let event = envelope.event;

        if !self
            .verifier
            .verify(raw_body, signature_b64, event.created)
        {
            return Err(IntakeError::InvalidSignature);
        }

        match self.replay.admit(&event.id, event.created).await? {
            Admission::TooOld => return Err(IntakeError::EventTooOld),
            Admission::AlreadyProcessed => return Err(IntakeError::AlreadyProcessed),
            Admission::Admitted => {}
        }

        if event.workspace_id != self.trusted_workspace {
            return Err(IntakeError::UntrustedWorkspace(event.workspace_id));
        }

        match credited_invoice(&event) {
            Some(invoice) => {
                self.dispatcher.dispatch_credit(invoice).await?;
                self.replay.record_processed(&event.id).await?;
                info!(event_id = %event.id, "Event processed");
                Ok(IntakeOutcome::Dispatched)
            }
            None => {
                debug!(
                    event_id = %event.id,
                    subscription = %event.subscription,
                    "Event acknowledged without action"
                );
                Ok(IntakeOutcome::Ignored)
            }
        }
    }
}

/// The invoice snapshot iff this is an event the pipeline acts on.
pub fn credited_invoice(event: &InboundEvent) -> Option<&crate::provider::types::InvoiceSnapshot> {
    if event.subscription != SUBSCRIPTION_INVOICE {
        return None;
    }
    match &event.log.detail {
        LogDetail::Credited { invoice } => Some(invoice),
        _ => None,
    }
}
