//! Transactional email delivery through a template-based mail provider.

use crate::content::derive_content;
use crate::core::{Event, Notification, NotificationType, Sender};
use crate::error::NotifyError;
use crate::results::ResultsService;
use crate::templates::TemplateSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

const SERVICE: &str = "mail provider";

/// Sends a provider-side template filled with merge variables.
#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn send_template(
        &self,
        template_name: &str,
        recipient: &str,
        merge_vars: &BTreeMap<String, String>,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct SendTemplateRequest<'a> {
    key: &'a str,
    template_name: &'a str,
    template_content: Vec<MergeVar<'a>>,
    message: Message<'a>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    to: Vec<Recipient<'a>>,
    global_merge_vars: Vec<MergeVar<'a>>,
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    email: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct MergeVar<'a> {
    name: &'a str,
    content: &'a str,
}

/// Per-recipient outcome reported by the provider.
#[derive(Debug, Deserialize)]
struct SendResult {
    #[serde(default)]
    email: String,
    status: String,
    #[serde(default)]
    reject_reason: Option<String>,
}

/// A client for a Mandrill-compatible mail API.
pub struct MandrillClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl MandrillClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }
}

#[async_trait]
impl MailProvider for MandrillClient {
    #[instrument(skip(self, merge_vars))]
    async fn send_template(
        &self,
        template_name: &str,
        recipient: &str,
        merge_vars: &BTreeMap<String, String>,
    ) -> Result<(), NotifyError> {
        let request = SendTemplateRequest {
            key: &self.api_key,
            template_name,
            template_content: Vec::new(),
            message: Message {
                to: vec![Recipient {
                    email: recipient,
                    kind: "to",
                }],
                global_merge_vars: merge_vars
                    .iter()
                    .map(|(name, content)| MergeVar {
                        name: name.as_str(),
                        content: content.as_str(),
                    })
                    .collect(),
            },
        };

        let response = self
            .http
            .post(format!("{}/messages/send-template.json", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Mail provider request failed");
            return Err(NotifyError::upstream(
                SERVICE,
                format!("status {}: {}", status, text),
            ));
        }

        let results: Vec<SendResult> = response.json().await?;
        for result in results {
            if matches!(result.status.as_str(), "rejected" | "invalid") {
                let reason = result
                    .reject_reason
                    .unwrap_or_else(|| result.status.clone());
                error!(email = %result.email, reason = %reason, "Mail provider rejected recipient");
                return Err(NotifyError::upstream(SERVICE, reason));
            }
        }
        Ok(())
    }
}

/// Emails check results to the subscription's address.
pub struct EmailSender {
    templates: Arc<TemplateSet>,
    mail: Arc<dyn MailProvider>,
    results: Arc<dyn ResultsService>,
    public_host: String,
}

impl EmailSender {
    pub fn new(
        templates: Arc<TemplateSet>,
        mail: Arc<dyn MailProvider>,
        results: Arc<dyn ResultsService>,
        public_host: &str,
    ) -> Self {
        Self {
            templates,
            mail,
            results,
            public_host: public_host.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Sender for EmailSender {
    fn kind(&self) -> NotificationType {
        NotificationType::Email
    }

    #[instrument(skip(self, notification, event), fields(check_id = %notification.check_id))]
    async fn send(&self, notification: &Notification, event: &Event) -> Result<(), NotifyError> {
        let derived = derive_content(event, self.results.as_ref()).await?;
        let merge_vars: BTreeMap<String, String> = self
            .templates
            .render_json(derived.key, &derived.context(&self.public_host, None))?;
        debug!(template = %derived.key, vars = merge_vars.len(), "Rendered merge variables");

        self.mail
            .send_template(derived.key.as_str(), &notification.value, &merge_vars)
            .await?;
        info!("Successfully sent notification email.");
        Ok(())
    }
}
