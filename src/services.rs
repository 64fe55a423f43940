//! Wiring of configuration into clients, senders and the notification manager.

use crate::{
    config::Config,
    core::Sender,
    credentials::CredentialResolver,
    notification::{
        email::{EmailSender, MailProvider, MandrillClient},
        manager::{NotificationManager, Senders},
        slack::{ChatApi, ChatBotSender, ChatClient},
        webhook::{HttpWebhookTransport, WebhookSender, WebhookTransport},
    },
    results::{HttpResultsClient, ResultsService},
    store::Store,
    templates::TemplateSet,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// The outbound collaborators of the senders.
pub struct Transports {
    pub chat: Arc<dyn ChatApi>,
    pub mail: Arc<dyn MailProvider>,
    pub webhook: Arc<dyn WebhookTransport>,
    pub results: Arc<dyn ResultsService>,
}

impl Transports {
    /// HTTP clients for every collaborator, each bounded by the configured
    /// request timeout.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.dispatch.request_timeout();
        if config.email.api_key.is_empty() {
            warn!("No mail provider API key configured. Email notifications will be rejected.");
        }
        Ok(Self {
            chat: Arc::new(ChatClient::new(&config.chat.api_url, timeout)?),
            mail: Arc::new(MandrillClient::new(
                &config.email.api_url,
                &config.email.api_key,
                timeout,
            )?),
            webhook: Arc::new(HttpWebhookTransport::new(timeout)?),
            results: Arc::new(HttpResultsClient::new(&config.results.url, timeout)?),
        })
    }
}

/// Everything a command needs, built once at startup.
pub struct Services {
    pub store: Store,
    pub chat: Arc<dyn ChatApi>,
    pub credentials: CredentialResolver,
    pub manager: NotificationManager,
}

impl Services {
    /// Opens the configured database and builds HTTP-backed services.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Store::open(&config.database.path)?;
        info!(path = %config.database.path.display(), "Opened subscription store");
        Self::build(config, store, Transports::from_config(config)?)
    }

    /// Builds the senders over the given store and transports. Each channel's
    /// templates are parsed here, once.
    pub fn build(config: &Config, store: Store, transports: Transports) -> Result<Self> {
        let credentials = CredentialResolver::new(Arc::new(store.clone()));

        let senders: Vec<Arc<dyn Sender>> = vec![
            Arc::new(ChatBotSender::new(
                Arc::new(TemplateSet::chat()?),
                transports.chat.clone(),
                credentials.clone(),
                transports.results.clone(),
                &config.public_host,
            )),
            Arc::new(EmailSender::new(
                Arc::new(TemplateSet::email()?),
                transports.mail,
                transports.results.clone(),
                &config.public_host,
            )),
            Arc::new(WebhookSender::new(
                Arc::new(TemplateSet::webhook()?),
                transports.webhook,
                transports.results,
                &config.public_host,
            )),
        ];

        let manager = NotificationManager::new(
            store.clone(),
            Senders::new(senders)?,
            config.dispatch.deadline(),
        );

        Ok(Self {
            store,
            chat: transports.chat,
            credentials,
            manager,
        })
    }
}
