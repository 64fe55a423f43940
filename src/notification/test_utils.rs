//! Counting stand-ins for the outbound collaborators of the senders.

use crate::core::{BotCredential, CheckResult, OAuthCredential};
use crate::error::NotifyError;
use crate::notification::email::MailProvider;
use crate::notification::slack::{ChatApi, ChatChannel, PostMessageRequest};
use crate::notification::webhook::WebhookTransport;
use crate::results::ResultsService;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fake chat API. Records every call and the token it was made with.
#[derive(Default)]
pub struct StubChatApi {
    calls: AtomicUsize,
    posted: Mutex<Vec<(String, PostMessageRequest)>>,
    tokens: Mutex<Vec<String>>,
    post_error: Mutex<Option<String>>,
    auth_error: Mutex<Option<String>>,
}

impl StubChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `post_message` answer `ok: false` with `error`.
    pub fn fail_posts(&self, error: &str) {
        *self.post_error.lock().unwrap() = Some(error.to_string());
    }

    /// Makes `auth_test` reject every token with `error`.
    pub fn reject_auth(&self, error: &str) {
        *self.auth_error.lock().unwrap() = Some(error.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn posted(&self) -> Vec<(String, PostMessageRequest)> {
        self.posted.lock().unwrap().clone()
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    fn record(&self, token: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());
    }
}

#[async_trait]
impl ChatApi for StubChatApi {
    async fn post_message(
        &self,
        token: &str,
        request: &PostMessageRequest,
    ) -> Result<(), NotifyError> {
        self.record(token);
        if let Some(error) = self.post_error.lock().unwrap().clone() {
            return Err(NotifyError::upstream("chat API", error));
        }
        self.posted
            .lock()
            .unwrap()
            .push((token.to_string(), request.clone()));
        Ok(())
    }

    async fn list_channels(&self, token: &str) -> Result<Vec<ChatChannel>, NotifyError> {
        self.record(token);
        Ok(vec![ChatChannel {
            id: "C0ATUFZ7X".to_string(),
            name: "general".to_string(),
        }])
    }

    async fn auth_test(&self, token: &str) -> Result<(), NotifyError> {
        self.record(token);
        match self.auth_error.lock().unwrap().clone() {
            Some(error) => Err(NotifyError::upstream("chat API", error)),
            None => Ok(()),
        }
    }

    async fn oauth_access(
        &self,
        _client_id: &str,
        _client_secret: &str,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<OAuthCredential, NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OAuthCredential {
            ok: true,
            access_token: format!("xoxp-{}", code),
            team_id: "T1".to_string(),
            bot: Some(BotCredential {
                bot_user_id: "U1".to_string(),
                bot_access_token: format!("xoxb-{}", code),
            }),
            ..Default::default()
        })
    }
}

/// A template send captured by [`StubMailProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub template_name: String,
    pub recipient: String,
    pub merge_vars: BTreeMap<String, String>,
}

/// Fake mail provider.
#[derive(Default)]
pub struct StubMailProvider {
    calls: AtomicUsize,
    sent: Mutex<Vec<SentEmail>>,
    error: Mutex<Option<String>>,
}

impl StubMailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail with `reason`, as a provider rejection would.
    pub fn fail_with(&self, reason: &str) {
        *self.error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailProvider for StubMailProvider {
    async fn send_template(
        &self,
        template_name: &str,
        recipient: &str,
        merge_vars: &BTreeMap<String, String>,
    ) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.error.lock().unwrap().clone() {
            return Err(NotifyError::upstream("mail provider", reason));
        }
        self.sent.lock().unwrap().push(SentEmail {
            template_name: template_name.to_string(),
            recipient: recipient.to_string(),
            merge_vars: merge_vars.clone(),
        });
        Ok(())
    }
}

/// Fake webhook transport, optionally slow or failing.
#[derive(Default)]
pub struct StubWebhookTransport {
    calls: AtomicUsize,
    posted: Mutex<Vec<(String, Value)>>,
    error: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl StubWebhookTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.to_string());
    }

    /// Delays every post by `delay` before answering.
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn posted(&self) -> Vec<(String, Value)> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for StubWebhookTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.error.lock().unwrap().clone() {
            return Err(NotifyError::upstream("webhook", message));
        }
        self.posted
            .lock()
            .unwrap()
            .push((url.to_string(), body.clone()));
        Ok(())
    }
}

/// Fake results service returning a fixed set of results.
pub struct StubResultsService {
    calls: Arc<AtomicUsize>,
    results: Vec<CheckResult>,
}

impl StubResultsService {
    pub fn with_results(results: Vec<CheckResult>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            results,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultsService for StubResultsService {
    async fn get_check_results(
        &self,
        _check_id: &str,
        _customer_id: &str,
    ) -> Result<Vec<CheckResult>, NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.clone())
    }
}
