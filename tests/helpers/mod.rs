//! Shared setup for the integration tests.
#![allow(dead_code)]

use checknotify::config::Config;
use checknotify::core::{
    BotCredential, CheckResponse, CheckResult, Event, OAuthCredential, Target, EXTERNAL_HOST,
};
use checknotify::notification::test_utils::{
    StubChatApi, StubMailProvider, StubResultsService, StubWebhookTransport,
};
use checknotify::services::{Services, Transports};
use checknotify::store::Store;
use std::sync::Arc;

pub const CUSTOMER: &str = "5963d7bc-6ba2-11e5-8603-6ba085b2f5b5";
pub const PUBLIC_HOST: &str = "https://app.example.com";

/// Services wired to counting stubs instead of HTTP clients.
pub struct TestServices {
    pub services: Services,
    pub chat: Arc<StubChatApi>,
    pub mail: Arc<StubMailProvider>,
    pub webhook: Arc<StubWebhookTransport>,
    pub results: Arc<StubResultsService>,
}

impl TestServices {
    pub fn new() -> Self {
        Self::with_results(Vec::new())
    }

    /// `results` is what the results service answers for any check.
    pub fn with_results(results: Vec<CheckResult>) -> Self {
        let config = Config {
            public_host: PUBLIC_HOST.to_string(),
            ..Default::default()
        };
        let chat = Arc::new(StubChatApi::new());
        let mail = Arc::new(StubMailProvider::new());
        let webhook = Arc::new(StubWebhookTransport::new());
        let results = Arc::new(StubResultsService::with_results(results));

        let services = Services::build(
            &config,
            Store::open_in_memory().unwrap(),
            Transports {
                chat: chat.clone(),
                mail: mail.clone(),
                webhook: webhook.clone(),
                results: results.clone(),
            },
        )
        .unwrap();

        Self {
            services,
            chat,
            mail,
            webhook,
            results,
        }
    }

    /// Total outbound calls across every channel.
    pub fn outbound_calls(&self) -> usize {
        self.chat.calls() + self.mail.calls() + self.webhook.calls()
    }

    pub fn connect_chat(&self, with_bot: bool) {
        self.services
            .store
            .put_oauth_credential(CUSTOMER, &chat_credential(with_bot))
            .unwrap();
    }
}

pub fn chat_credential(with_bot: bool) -> OAuthCredential {
    OAuthCredential {
        ok: true,
        access_token: "xoxp-user".to_string(),
        scope: "bot,channels:read".to_string(),
        team_name: "Example".to_string(),
        team_id: "T0EXAMPLE".to_string(),
        incoming_webhook: None,
        bot: with_bot.then(|| BotCredential {
            bot_user_id: "U0BOT".to_string(),
            bot_access_token: "xoxb-bot".to_string(),
        }),
    }
}

fn response(id: &str, passing: bool) -> CheckResponse {
    CheckResponse {
        target: Target {
            id: id.to_string(),
            name: id.to_string(),
            kind: "instance".to_string(),
        },
        passing,
        error: (!passing).then(|| "connection refused".to_string()),
        response: None,
    }
}

/// A failing event for `check_id` with `failing` of `total` responses failing.
pub fn failing_event(check_id: &str, failing: usize, total: usize) -> Event {
    Event {
        result: CheckResult {
            check_id: check_id.to_string(),
            check_name: "API health".to_string(),
            customer_id: CUSTOMER.to_string(),
            passing: false,
            target: Target {
                id: "sg-0001".to_string(),
                name: "api".to_string(),
                kind: "sg".to_string(),
            },
            responses: (0..total)
                .map(|i| response(&format!("i-{:04}", i), i >= failing))
                .collect(),
            timestamp: None,
        },
        nocap: None,
    }
}

/// The same event, but against an external host target.
pub fn external_host_event(check_id: &str, failing: usize, total: usize) -> Event {
    let mut event = failing_event(check_id, failing, total);
    event.result.target.kind = EXTERNAL_HOST.to_string();
    event
}

/// A result as the results service reports it for one location.
pub fn location_result(check_id: &str, failing: usize, total: usize) -> CheckResult {
    let mut result = failing_event(check_id, failing, total).result;
    result.passing = failing == 0;
    result
}
