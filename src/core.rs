//! Core domain types and service traits for checknotify
//!
//! This module defines the subscription records, the check-result events they
//! react to, and the `Sender` contract every delivery channel implements.

use crate::error::{NotifyError, ValidationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target type whose instance counts come from the results service.
pub const EXTERNAL_HOST: &str = "external_host";

// =============================================================================
// Subscriptions
// =============================================================================

/// The delivery channel a subscription routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "String")]
pub enum NotificationType {
    ChatBot,
    Email,
    Webhook,
}

impl NotificationType {
    pub const ALL: [NotificationType; 3] = [Self::ChatBot, Self::Email, Self::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChatBot => "chat-bot",
            Self::Email => "email",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = NotifyError;

    /// Only canonical identifiers parse. Legacy chat identifiers are rewritten
    /// by a schema migration and are rejected here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| NotifyError::UnknownChannel(s.to_string()))
    }
}

impl TryFrom<String> for NotificationType {
    type Error = NotifyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A stored subscription: deliver results of `check_id` for `customer_id`
/// through `kind` to `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Storage surrogate, assigned by the store.
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub check_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Channel id, email address or URL depending on `kind`.
    pub value: String,
}

impl Notification {
    pub fn new(
        customer_id: &str,
        user_id: i64,
        check_id: &str,
        kind: NotificationType,
        value: &str,
    ) -> Self {
        Self {
            id: 0,
            customer_id: customer_id.to_string(),
            user_id,
            check_id: check_id.to_string(),
            kind,
            value: value.to_string(),
        }
    }

    /// The tuple that identifies a subscription independently of its row id.
    pub fn natural_key(&self) -> (&str, &str, NotificationType, &str) {
        (&self.customer_id, &self.check_id, self.kind, &self.value)
    }

    /// Checks required fields and the destination format for the channel.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.customer_id.trim().is_empty() {
            return Err(ValidationError("customer_id is required".into()));
        }
        if self.check_id.trim().is_empty() {
            return Err(ValidationError("check_id is required".into()));
        }
        if self.value.trim().is_empty() {
            return Err(ValidationError(format!(
                "a {} notification requires a value",
                self.kind
            )));
        }

        match self.kind {
            NotificationType::ChatBot => {
                if self.value.chars().any(char::is_whitespace) {
                    return Err(ValidationError(format!(
                        "'{}' is not a chat channel id",
                        self.value
                    )));
                }
            }
            NotificationType::Email => {
                let valid = match self.value.split_once('@') {
                    Some((local, domain)) => {
                        !local.is_empty()
                            && domain.contains('.')
                            && !domain.starts_with('.')
                            && !domain.ends_with('.')
                            && !self.value.chars().any(char::is_whitespace)
                    }
                    None => false,
                };
                if !valid {
                    return Err(ValidationError(format!(
                        "'{}' is not an email address",
                        self.value
                    )));
                }
            }
            NotificationType::Webhook => {
                let url = url::Url::parse(&self.value).map_err(|e| {
                    ValidationError(format!("'{}' is not a valid URL: {}", self.value, e))
                })?;
                if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
                    return Err(ValidationError(format!(
                        "'{}' must be an http(s) URL",
                        self.value
                    )));
                }
            }
        }
        Ok(())
    }
}

/// All subscriptions for one check, the unit of multi-check batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CheckNotifications {
    pub check_id: String,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl CheckNotifications {
    pub fn new(check_id: &str, notifications: Vec<Notification>) -> Self {
        Self {
            check_id: check_id.to_string(),
            notifications,
        }
    }

    /// Stamps the owner and the batch's check id onto every notification.
    pub fn assign_owner(&mut self, customer_id: &str, user_id: i64) {
        for notification in &mut self.notifications {
            notification.customer_id = customer_id.to_string();
            notification.user_id = user_id;
            notification.check_id = self.check_id.clone();
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// The entity a check runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Target {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl Target {
    pub fn is_external_host(&self) -> bool {
        self.kind == EXTERNAL_HOST
    }
}

/// The outcome of a check on a single instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CheckResponse {
    pub target: Target,
    pub passing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

/// A pass/fail outcome for a check across all of its instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CheckResult {
    pub check_id: String,
    #[serde(default)]
    pub check_name: String,
    pub customer_id: String,
    pub passing: bool,
    pub target: Target,
    #[serde(default)]
    pub responses: Vec<CheckResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl CheckResult {
    /// The responses that did not pass, in their original order.
    pub fn failing_responses(&self) -> Vec<&CheckResponse> {
        self.responses.iter().filter(|r| !r.passing).collect()
    }

    pub fn failing_count(&self) -> usize {
        self.responses.iter().filter(|r| !r.passing).count()
    }
}

/// Pointer to the raw JSON dump of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Nocap {
    #[serde(default)]
    pub json_url: String,
}

/// A check result to be evaluated against subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Event {
    pub result: CheckResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nocap: Option<Nocap>,
}

impl Event {
    /// A fixed failing event used to try a subscription out.
    pub fn sample(customer_id: &str, check_id: &str) -> Self {
        let target = Target {
            id: "sample-group".to_string(),
            name: "sample-group".to_string(),
            kind: "dbinstance".to_string(),
        };
        let response = |id: &str, passing: bool| CheckResponse {
            target: Target {
                id: id.to_string(),
                name: id.to_string(),
                kind: "instance".to_string(),
            },
            passing,
            error: (!passing).then(|| "status code 500, expected 200".to_string()),
            response: None,
        };

        Self {
            result: CheckResult {
                check_id: check_id.to_string(),
                check_name: "Sample check".to_string(),
                customer_id: customer_id.to_string(),
                passing: false,
                target,
                responses: vec![
                    response("i-0000001", false),
                    response("i-0000002", true),
                    response("i-0000003", true),
                ],
                timestamp: Some(Utc::now()),
            },
            nocap: None,
        }
    }
}

// =============================================================================
// Chat integration credentials
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCredential {
    pub bot_user_id: String,
    pub bot_access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingWebhook {
    pub url: String,
    pub channel: String,
    pub configuration_url: String,
}

/// The chat platform's OAuth exchange result, stored whole per customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OAuthCredential {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming_webhook: Option<IncomingWebhook>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<BotCredential>,
}

impl OAuthCredential {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.ok {
            return Err(ValidationError(
                "credential was not issued by a successful exchange".into(),
            ));
        }
        if self.access_token.is_empty() {
            return Err(ValidationError("access_token is required".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Delivers one event to one subscription.
#[async_trait]
pub trait Sender: Send + Sync {
    /// The channel this sender serves.
    fn kind(&self) -> NotificationType;

    /// Validates the event, renders the channel payload and performs the
    /// outbound call.
    ///
    /// # Returns
    /// * `Ok(())` once the channel accepted the message
    /// * `Err` for inconsistent events, missing credentials, rendering
    ///   failures and upstream rejections
    async fn send(&self, notification: &Notification, event: &Event) -> Result<(), NotifyError>;
}
