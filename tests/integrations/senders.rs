//! Integration tests for the channel senders behind the notification manager.

#[path = "../helpers/mod.rs"]
mod helpers;

use checknotify::core::{Nocap, Notification, NotificationType};
use checknotify::core::OAuthCredential;
use checknotify::credentials::{CredentialResolver, CredentialStore};
use checknotify::{NotifyError, StoreError};
use helpers::{
    external_host_event, failing_event, location_result, TestServices, CUSTOMER, PUBLIC_HOST,
};
use std::sync::Arc;

struct UnavailableStore;

impl CredentialStore for UnavailableStore {
    fn get_oauth_credential(&self, _: &str) -> Result<Option<OAuthCredential>, StoreError> {
        Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery))
    }
}

fn notification(kind: NotificationType, value: &str) -> Notification {
    Notification::new(CUSTOMER, 1, "check-1", kind, value)
}

fn all_channels() -> Vec<Notification> {
    vec![
        notification(NotificationType::ChatBot, "C0ATUFZ7X"),
        notification(NotificationType::Email, "ops@example.com"),
        notification(NotificationType::Webhook, "https://hooks.example.com/a"),
    ]
}

#[tokio::test]
async fn test_failing_event_without_failures_makes_no_outbound_call() {
    let app = TestServices::new();
    app.connect_chat(true);

    for subscription in all_channels() {
        let kind = subscription.kind;
        let report = app
            .services
            .manager
            .deliver(vec![subscription], &failing_event("check-1", 0, 4))
            .await;
        let err = &report.failed[0].error;
        assert!(err.is_validation(), "{} returned {}", kind, err);
    }

    assert_eq!(app.outbound_calls(), 0);
    assert_eq!(app.results.calls(), 0);
}

#[tokio::test]
async fn test_external_host_uses_results_service_counts() {
    let app = TestServices::with_results(vec![
        location_result("check-1", 1, 1),
        location_result("check-1", 0, 1),
        location_result("check-1", 1, 1),
    ]);

    let report = app
        .services
        .manager
        .deliver(
            vec![notification(NotificationType::Webhook, "https://hooks.example.com/a")],
            &external_host_event("check-1", 1, 10),
        )
        .await;

    assert!(report.is_complete());
    let body = &app.webhook.posted()[0].1;
    assert_eq!(body["instance_count"], 3);
    assert_eq!(body["fail_count"], 2);
    assert_eq!(body["target_type"], "points-of-presence (PoPs)");
}

#[tokio::test]
async fn test_external_host_authoritative_source_wins() {
    // The event itself shows failures, but the results service has none.
    let app = TestServices::with_results(vec![
        location_result("check-1", 0, 2),
        location_result("check-1", 0, 2),
    ]);
    app.connect_chat(true);

    let report = app
        .services
        .manager
        .deliver(all_channels(), &external_host_event("check-1", 3, 3))
        .await;

    assert_eq!(report.failed.len(), 3);
    assert!(report
        .failed
        .iter()
        .all(|f| matches!(f.error, NotifyError::InconsistentResult(_))));
    assert_eq!(app.outbound_calls(), 0);
    assert_eq!(app.results.calls(), 3);
}

#[tokio::test]
async fn test_integration_inactive_is_distinct_from_store_errors() {
    // Credential without a bot.
    let app = TestServices::new();
    app.connect_chat(false);
    let inactive = app
        .services
        .manager
        .send_test(&notification(NotificationType::ChatBot, "C0ATUFZ7X"))
        .await
        .unwrap_err();
    assert!(inactive.is_integration_inactive());

    // A store that cannot answer at all.
    let resolver = CredentialResolver::new(Arc::new(UnavailableStore));
    let broken = resolver.resolve(CUSTOMER).unwrap_err();
    assert!(matches!(broken, NotifyError::Store(_)));
    assert!(!broken.is_integration_inactive());
}

#[tokio::test]
async fn test_email_links_point_at_public_host_and_raw_results() {
    let app = TestServices::new();
    let mut event = failing_event("check-1", 1, 2);
    event.nocap = Some(Nocap {
        json_url: "https://dumps.example.com/r/1.json".to_string(),
    });

    app.services
        .manager
        .deliver(vec![notification(NotificationType::Email, "ops@example.com")], &event)
        .await;

    let vars = &app.mail.sent()[0].merge_vars;
    assert_eq!(
        vars["check_url"],
        format!(
            "{}/check/check-1/event?json=https%3A%2F%2Fdumps.example.com%2Fr%2F1.json&utm_source=email",
            PUBLIC_HOST
        )
    );
    assert_eq!(vars["subject"], "API health is failing");
    assert_eq!(vars["group_name"], "sg-0001");
}

#[tokio::test]
async fn test_chat_message_is_sent_with_bot_token() {
    let app = TestServices::new();
    app.connect_chat(true);

    app.services
        .manager
        .send_test(&notification(NotificationType::ChatBot, "C0ATUFZ7X"))
        .await
        .unwrap();

    let (token, request) = &app.chat.posted()[0];
    assert_eq!(token, "xoxb-bot");
    assert_eq!(request.channel, "C0ATUFZ7X");
}

#[tokio::test]
async fn test_passing_event_renders_passing_templates() {
    let app = TestServices::new();
    let mut event = failing_event("check-1", 0, 2);
    event.result.passing = true;

    let report = app
        .services
        .manager
        .deliver(
            vec![
                notification(NotificationType::Email, "ops@example.com"),
                notification(NotificationType::Webhook, "https://hooks.example.com/a"),
            ],
            &event,
        )
        .await;

    assert!(report.is_complete());
    assert_eq!(app.mail.sent()[0].template_name, "check-passing");
    assert_eq!(app.webhook.posted()[0].1["passing"], true);
}
