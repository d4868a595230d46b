//! HTTP adapter for [`ProviderClient`] against the provider REST API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::types::{InboundEvent, Invoice, Transfer};
use super::{ProviderClient, ProviderError, WebhookRegistration};

pub struct HttpProviderClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct EventListBody {
    events: Vec<InboundEvent>,
}

#[derive(Debug, Deserialize)]
struct WebhookListBody {
    webhooks: Vec<WebhookRegistration>,
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    webhook: WebhookRegistration,
}

impl HttpProviderClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn create_transfer(&self, transfer: &Transfer) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(self.url("/v2/transfer"))
            .json(&json!({ "transfers": [transfer] }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_invoices(&self, invoices: &[Invoice]) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(self.url("/v2/invoice"))
            .json(&json!({ "invoices": invoices }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn undelivered_events(&self) -> Result<Vec<InboundEvent>, ProviderError> {
        let response = self
            .http
            .get(self.url("/v2/event"))
            .query(&[("is-delivered", "false")])
            .send()
            .await?;
        let body: EventListBody = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(body.events)
    }

    async fn mark_delivered(&self, event_id: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .patch(self.url(&format!("/v2/event/{}", event_id)))
            .json(&json!({ "isDelivered": true }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookRegistration>, ProviderError> {
        let response = self.http.get(self.url("/v2/webhook")).send().await?;
        let body: WebhookListBody = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(body.webhooks)
    }

    async fn create_webhook(
        &self,
        url: &str,
        subscriptions: &[&str],
    ) -> Result<WebhookRegistration, ProviderError> {
        let response = self
            .http
            .post(self.url("/v2/webhook"))
            .json(&json!({ "webhook": { "url": url, "subscriptions": subscriptions } }))
            .send()
            .await?;
        let body: WebhookBody = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(body.webhook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = HttpProviderClient::new("https://sandbox.api.provider.com/");
        assert_eq!(
            client.url("/v2/transfer"),
            "https://sandbox.api.provider.com/v2/transfer"
        );
    }

    #[test]
    fn test_event_list_body_parses() {
        let body = r#"{
            "events": [{
                "id": "E1",
                "subscription": "invoice",
                "created": "2024-01-15T12:00:00+00:00",
                "workspaceId": "ws-1",
                "log": {
                    "id": "L1",
                    "created": "2024-01-15T12:00:00+00:00",
                    "type": "credited",
                    "invoice": {"id": "I1", "amount": 500, "fee": 50}
                }
            }]
        }"#;
        let parsed: EventListBody = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].id, "E1");
    }
}
