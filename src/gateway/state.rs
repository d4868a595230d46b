//! Shared state for the webhook gateway.

use std::sync::Arc;

use crate::intake::WebhookIntake;

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<WebhookIntake>,
}

impl AppState {
    pub fn new(intake: Arc<WebhookIntake>) -> Self {
        Self { intake }
    }
}
