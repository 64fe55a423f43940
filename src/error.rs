//! Error types shared by the store, the senders and the dispatcher.

use std::time::Duration;
use thiserror::Error;

/// A notification or credential that fails its own field rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Errors raised by the SQLite subscription store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Invalid input: {0}")]
    Invalid(#[from] ValidationError),
    #[error("Could not encode credential: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Not found")]
    NotFound,
}

/// Every failure a send, a credential lookup or a dispatch cycle can return.
///
/// The variants line up with how the caller reacts: validation and credential
/// errors are never worth retrying, upstream errors might be.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// A failing result arrived without any failing responses to explain it.
    #[error("inconsistent result: {0}")]
    InconsistentResult(String),

    /// The customer has a chat credential, but no bot token attached to it.
    #[error("integration_inactive")]
    IntegrationInactive,

    /// The customer never connected the chat integration.
    #[error("no chat integration configured for customer {0}")]
    CredentialsNotFound(String),

    #[error("unknown notification type: {0}")]
    UnknownChannel(String),

    #[error("invalid notification: {0}")]
    InvalidNotification(#[from] ValidationError),

    #[error("template rendering failed: {0}")]
    Render(String),

    /// A non-success answer from the chat API, mail provider, results service
    /// or a webhook destination. `message` is the upstream's own text.
    #[error("{service} error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("send did not finish within {0:?}")]
    Timeout(Duration),
}

impl NotifyError {
    pub(crate) fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    /// True for the failures a user fixes by reconnecting the chat integration.
    pub fn is_integration_inactive(&self) -> bool {
        matches!(self, Self::IntegrationInactive)
    }

    /// True when the event itself was rejected before any delivery attempt.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InconsistentResult(_) | Self::InvalidNotification(_)
        )
    }
}

impl From<handlebars::RenderError> for NotifyError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Render(err.to_string())
    }
}
