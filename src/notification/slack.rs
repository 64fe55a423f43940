//! A client for the chat platform API and the chat bot sender built on it.

use crate::content::derive_content;
use crate::core::{Event, Notification, NotificationType, OAuthCredential, Sender};
use crate::credentials::CredentialResolver;
use crate::error::NotifyError;
use crate::results::ResultsService;
use crate::templates::TemplateSet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

const SERVICE: &str = "chat API";

/// Body of a `chat.postMessage` call. Produced by rendering a chat template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMessageRequest {
    pub channel: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
}

/// The envelope every chat API answer carries.
#[derive(Debug, Clone, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl ApiResponse {
    fn into_result(self) -> Result<(), NotifyError> {
        if self.ok {
            Ok(())
        } else {
            Err(NotifyError::upstream(
                SERVICE,
                self.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChannel {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(flatten)]
    status: ApiResponse,
    #[serde(default)]
    channels: Vec<ChatChannel>,
}

/// Operations against the chat platform, all but the OAuth exchange
/// authenticated with a bot token.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn post_message(&self, token: &str, request: &PostMessageRequest)
        -> Result<(), NotifyError>;

    async fn list_channels(&self, token: &str) -> Result<Vec<ChatChannel>, NotifyError>;

    /// Succeeds if the token is still accepted.
    async fn auth_test(&self, token: &str) -> Result<(), NotifyError>;

    /// Exchanges an OAuth code for a credential.
    async fn oauth_access(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthCredential, NotifyError>;
}

/// A client for the chat platform's HTTP API.
pub struct ChatClient {
    base_url: String,
    http: reqwest::Client,
}

impl ChatClient {
    /// Creates a new `ChatClient`. Every request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/api/{}", self.base_url, method)
    }

    /// Checks the HTTP status, then decodes the body.
    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, NotifyError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Chat API request failed");
            return Err(NotifyError::upstream(
                SERVICE,
                format!("status {}: {}", status, text),
            ));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChatApi for ChatClient {
    #[instrument(skip(self, token, request), fields(channel = %request.channel))]
    async fn post_message(
        &self,
        token: &str,
        request: &PostMessageRequest,
    ) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(self.endpoint("chat.postMessage"))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;
        Self::decode::<ApiResponse>(response).await?.into_result()
    }

    #[instrument(skip(self, token))]
    async fn list_channels(&self, token: &str) -> Result<Vec<ChatChannel>, NotifyError> {
        let response = self
            .http
            .get(self.endpoint("conversations.list"))
            .bearer_auth(token)
            .query(&[("exclude_archived", "true")])
            .send()
            .await?;
        let list: ChannelListResponse = Self::decode(response).await?;
        list.status.into_result()?;
        Ok(list.channels)
    }

    #[instrument(skip(self, token))]
    async fn auth_test(&self, token: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .get(self.endpoint("auth.test"))
            .bearer_auth(token)
            .send()
            .await?;
        Self::decode::<ApiResponse>(response).await?.into_result()
    }

    #[instrument(skip(self, client_secret, code))]
    async fn oauth_access(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthCredential, NotifyError> {
        let response = self
            .http
            .post(self.endpoint("oauth.access"))
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await?;
        let body: Value = Self::decode(response).await?;
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(NotifyError::upstream(SERVICE, message));
        }
        serde_json::from_value(body).map_err(|e| {
            NotifyError::upstream(SERVICE, format!("malformed oauth response: {}", e))
        })
    }
}

/// Posts check results to a chat channel as the customer's bot.
pub struct ChatBotSender {
    templates: Arc<TemplateSet>,
    chat: Arc<dyn ChatApi>,
    credentials: CredentialResolver,
    results: Arc<dyn ResultsService>,
    public_host: String,
}

impl ChatBotSender {
    pub fn new(
        templates: Arc<TemplateSet>,
        chat: Arc<dyn ChatApi>,
        credentials: CredentialResolver,
        results: Arc<dyn ResultsService>,
        public_host: &str,
    ) -> Self {
        Self {
            templates,
            chat,
            credentials,
            results,
            public_host: public_host.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Sender for ChatBotSender {
    fn kind(&self) -> NotificationType {
        NotificationType::ChatBot
    }

    #[instrument(skip(self, notification, event), fields(check_id = %notification.check_id, channel = %notification.value))]
    async fn send(&self, notification: &Notification, event: &Event) -> Result<(), NotifyError> {
        let derived = derive_content(event, self.results.as_ref()).await?;
        let token = self.credentials.resolve(&notification.customer_id)?;

        let context = derived.context(&self.public_host, Some(&notification.value));
        let request: PostMessageRequest = self.templates.render_json(derived.key, &context)?;
        debug!(template = %derived.key, "Rendered chat message");

        self.chat.post_message(&token, &request).await.map_err(|e| {
            error!(error = %e, "Error sending notification to chat");
            e
        })?;
        info!("Successfully posted notification to chat.");
        Ok(())
    }
}
