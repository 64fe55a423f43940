//! Delivery of check results to arbitrary customer URLs.

use crate::content::derive_content;
use crate::core::{Event, Notification, NotificationType, Sender};
use crate::error::NotifyError;
use crate::results::ResultsService;
use crate::templates::TemplateSet;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Posts a JSON body to a URL. No authentication, no retries.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<(), NotifyError>;
}

pub struct HttpWebhookTransport {
    http: reqwest::Client,
}

impl HttpWebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    #[instrument(skip(self, body))]
    async fn post_json(&self, url: &str, body: &Value) -> Result<(), NotifyError> {
        let response = self.http.post(url).json(body).send().await.map_err(|e| {
            error!(error = %e, "HTTP request to webhook failed");
            NotifyError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Webhook destination rejected notification");
            return Err(NotifyError::upstream(
                "webhook",
                format!("status {}: {}", status, text),
            ));
        }
        Ok(())
    }
}

/// Posts rendered check results to the subscription's URL.
pub struct WebhookSender {
    templates: Arc<TemplateSet>,
    transport: Arc<dyn WebhookTransport>,
    results: Arc<dyn ResultsService>,
    public_host: String,
}

impl WebhookSender {
    pub fn new(
        templates: Arc<TemplateSet>,
        transport: Arc<dyn WebhookTransport>,
        results: Arc<dyn ResultsService>,
        public_host: &str,
    ) -> Self {
        Self {
            templates,
            transport,
            results,
            public_host: public_host.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Sender for WebhookSender {
    fn kind(&self) -> NotificationType {
        NotificationType::Webhook
    }

    #[instrument(skip(self, notification, event), fields(check_id = %notification.check_id, url = %notification.value))]
    async fn send(&self, notification: &Notification, event: &Event) -> Result<(), NotifyError> {
        let derived = derive_content(event, self.results.as_ref()).await?;
        let body: Value = self
            .templates
            .render_json(derived.key, &derived.context(&self.public_host, None))?;
        debug!(template = %derived.key, "Rendered webhook body");

        self.transport.post_json(&notification.value, &body).await?;
        info!("Successfully delivered webhook.");
        Ok(())
    }
}
