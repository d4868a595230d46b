//! Queue message envelope.
//!
//! Every published message is JSON `{"type": <tag>, "data": <payload>}`. The
//! retry attempt count travels in the `x-attempt` header, never in the body,
//! so a requeued message body stays byte-identical to the original.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::types::{Invoice, Transfer};

use super::broker::Headers;

/// Header carrying the retry attempt count.
pub const ATTEMPT_HEADER: &str = "x-attempt";

pub const TYPE_TRANSFER: &str = "transfer";
pub const TYPE_INVOICE: &str = "invoice";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("unrecognized message type: {0}")]
    UnknownType(String),
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
    #[error("encode failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

/// A decoded, structurally valid unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    Transfer(Transfer),
    Invoice(Invoice),
}

impl Envelope {
    pub fn transfer(transfer: &Transfer) -> Result<Self, EnvelopeError> {
        Ok(Self {
            kind: TYPE_TRANSFER.to_string(),
            data: serde_json::to_value(transfer).map_err(|e| EnvelopeError::Encode(e.to_string()))?,
        })
    }

    pub fn invoice(invoice: &Invoice) -> Result<Self, EnvelopeError> {
        Ok(Self {
            kind: TYPE_INVOICE.to_string(),
            data: serde_json::to_value(invoice).map_err(|e| EnvelopeError::Encode(e.to_string()))?,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Resolve the type tag and validate the payload against its schema.
    pub fn classify(&self) -> Result<WorkItem, EnvelopeError> {
        let invalid = |reason: String| EnvelopeError::InvalidPayload {
            kind: self.kind.clone(),
            reason,
        };
        match self.kind.as_str() {
            TYPE_TRANSFER => {
                let transfer: Transfer = serde_json::from_value(self.data.clone())
                    .map_err(|e| invalid(e.to_string()))?;
                Transfer::new(transfer.account, transfer.amount)
                    .map(WorkItem::Transfer)
                    .map_err(|e| invalid(e.to_string()))
            }
            TYPE_INVOICE => {
                let invoice: Invoice = serde_json::from_value(self.data.clone())
                    .map_err(|e| invalid(e.to_string()))?;
                Invoice::new(invoice.amount, invoice.person, invoice.due_date)
                    .map(WorkItem::Invoice)
                    .map_err(|e| invalid(e.to_string()))
            }
            other => Err(EnvelopeError::UnknownType(other.to_string())),
        }
    }
}

/// Attempt count carried by a delivery; absent or unparsable means 0.
pub fn attempt_from(headers: &Headers) -> u32 {
    headers
        .get(ATTEMPT_HEADER)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Copy of `headers` with the attempt counter replaced.
pub fn with_attempt(headers: &Headers, attempt: u32) -> Headers {
    let mut updated = headers.clone();
    updated.insert(ATTEMPT_HEADER.to_string(), attempt.to_string());
    updated
}
