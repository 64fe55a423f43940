//! Resolves the chat integration credential of a customer.

use crate::core::OAuthCredential;
use crate::error::{NotifyError, StoreError};
use crate::notification::slack::{ChatApi, ChatChannel};
use crate::store::Store;
use std::sync::Arc;
use tracing::{error, instrument, warn};

/// Read access to stored chat credentials.
pub trait CredentialStore: Send + Sync {
    fn get_oauth_credential(&self, customer_id: &str)
        -> Result<Option<OAuthCredential>, StoreError>;
}

impl CredentialStore for Store {
    fn get_oauth_credential(
        &self,
        customer_id: &str,
    ) -> Result<Option<OAuthCredential>, StoreError> {
        Store::get_oauth_credential(self, customer_id)
    }
}

/// Turns a customer id into a usable bot token.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Returns the customer's bot access token.
    ///
    /// A customer without any stored credential gets `CredentialsNotFound`
    /// ("connect"); a credential without a bot gets `IntegrationInactive`
    /// ("reconnect"). Store failures pass through unchanged.
    pub fn resolve(&self, customer_id: &str) -> Result<String, NotifyError> {
        let credential = self
            .store
            .get_oauth_credential(customer_id)?
            .ok_or_else(|| NotifyError::CredentialsNotFound(customer_id.to_string()))?;

        match credential.bot {
            Some(bot) if !bot.bot_access_token.is_empty() => Ok(bot.bot_access_token),
            _ => {
                error!(
                    customer_id,
                    "Chat integration has no bot token associated with it"
                );
                Err(NotifyError::IntegrationInactive)
            }
        }
    }

    /// Checks the bot token against the chat API and returns the stored
    /// credential when it is still accepted.
    #[instrument(skip(self, chat))]
    pub async fn verify(
        &self,
        customer_id: &str,
        chat: &dyn ChatApi,
    ) -> Result<OAuthCredential, NotifyError> {
        let token = self.resolve(customer_id)?;
        if let Err(e) = chat.auth_test(&token).await {
            warn!(error = %e, "Chat API rejected stored bot token");
            return Err(NotifyError::IntegrationInactive);
        }
        self.store
            .get_oauth_credential(customer_id)?
            .ok_or_else(|| NotifyError::CredentialsNotFound(customer_id.to_string()))
    }

    /// Lists the channels the customer's bot can post to.
    #[instrument(skip(self, chat))]
    pub async fn channels(
        &self,
        customer_id: &str,
        chat: &dyn ChatApi,
    ) -> Result<Vec<ChatChannel>, NotifyError> {
        let token = self.resolve(customer_id)?;
        chat.list_channels(&token).await
    }
}
