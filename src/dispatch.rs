//! Transfer dispatcher.
//!
//! Turns a validated credited invoice into a transfer instruction: the
//! payout amount is the invoice amount net of the provider fee, sent to the
//! configured destination account through the work-sender capability.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::provider::types::{DestinationAccount, InvoiceSnapshot, ModelError, Transfer};
use crate::queue::{SendError, WorkSender};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Amount(#[from] ModelError),
    #[error(transparent)]
    Send(#[from] SendError),
}

pub struct TransferDispatcher {
    sender: Arc<dyn WorkSender>,
    account: DestinationAccount,
}

impl TransferDispatcher {
    pub fn new(sender: Arc<dyn WorkSender>, account: DestinationAccount) -> Self {
        Self { sender, account }
    }

    /// Dispatch the payout for a credited invoice.
    pub async fn dispatch_credit(&self, invoice: &InvoiceSnapshot) -> Result<(), DispatchError> {
        let amount = invoice.amount - invoice.fee;
        let transfer = Transfer::new(self.account.clone(), amount)?;
        self.sender.send_transfer(&transfer).await?;
        info!(invoice_id = %invoice.id, amount, "Transfer dispatched");
        Ok(())
    }
}
