//! Integration tests for event fan-out across stored subscriptions.

#[path = "../helpers/mod.rs"]
mod helpers;

use checknotify::core::{Notification, NotificationType};
use checknotify::NotifyError;
use helpers::{failing_event, TestServices, CUSTOMER};

fn subscribe(app: &TestServices, check_id: &str, kind: NotificationType, value: &str) {
    app.services
        .store
        .put(&[Notification::new(CUSTOMER, 1, check_id, kind, value)])
        .unwrap();
}

#[tokio::test]
async fn test_dispatch_delivers_to_every_channel() {
    // Arrange
    let app = TestServices::new();
    app.connect_chat(true);
    subscribe(&app, "check-1", NotificationType::ChatBot, "C0ATUFZ7X");
    subscribe(&app, "check-1", NotificationType::Email, "ops@example.com");
    subscribe(&app, "check-1", NotificationType::Webhook, "https://hooks.example.com/a");

    // Act
    let report = app
        .services
        .manager
        .dispatch(&failing_event("check-1", 2, 5))
        .await
        .unwrap();

    // Assert
    assert!(report.is_complete(), "{:?}", report);
    assert_eq!(report.summary(), "3 of 3 delivered");
    assert_eq!(app.chat.posted()[0].1.channel, "C0ATUFZ7X");
    assert_eq!(app.mail.sent()[0].merge_vars["fail_count"], "2");
    assert_eq!(app.webhook.posted()[0].1["instance_count"], 5);
}

#[tokio::test]
async fn test_chat_failure_does_not_block_other_channels() {
    // Arrange: the customer reconnected without granting a bot.
    let app = TestServices::new();
    app.connect_chat(false);
    subscribe(&app, "check-1", NotificationType::ChatBot, "C0ATUFZ7X");
    subscribe(&app, "check-1", NotificationType::Webhook, "https://hooks.example.com/a");

    // Act
    let report = app
        .services
        .manager
        .dispatch(&failing_event("check-1", 1, 3))
        .await
        .unwrap();

    // Assert
    assert_eq!(report.summary(), "1 of 2 delivered");
    assert!(report.failed[0].error.is_integration_inactive());
    assert_eq!(app.webhook.calls(), 1);
    assert_eq!(app.chat.calls(), 0);
}

#[tokio::test]
async fn test_upstream_errors_are_reported_per_subscription() {
    let app = TestServices::new();
    app.mail.fail_with("hard-bounce");
    subscribe(&app, "check-1", NotificationType::Email, "gone@example.com");
    subscribe(&app, "check-1", NotificationType::Email, "ops@example.com");

    let report = app
        .services
        .manager
        .dispatch(&failing_event("check-1", 1, 1))
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 2);
    for failure in &report.failed {
        assert_eq!(failure.error.to_string(), "mail provider error: hard-bounce");
    }
}

#[tokio::test]
async fn test_event_for_unsubscribed_check_sends_nothing() {
    let app = TestServices::new();
    subscribe(&app, "check-1", NotificationType::Webhook, "https://hooks.example.com/a");

    let report = app
        .services
        .manager
        .dispatch(&failing_event("check-2", 1, 1))
        .await
        .unwrap();

    assert!(report.delivered.is_empty());
    assert!(report.is_complete());
    assert_eq!(app.outbound_calls(), 0);
}

#[tokio::test]
async fn test_inconsistent_event_is_rejected_before_any_channel() {
    let app = TestServices::new();
    app.connect_chat(true);
    subscribe(&app, "check-1", NotificationType::ChatBot, "C0ATUFZ7X");
    subscribe(&app, "check-1", NotificationType::Email, "ops@example.com");
    subscribe(&app, "check-1", NotificationType::Webhook, "https://hooks.example.com/a");

    let err = app
        .services
        .manager
        .dispatch(&failing_event("check-1", 0, 3))
        .await
        .unwrap_err();

    assert!(matches!(err, NotifyError::InconsistentResult(_)));
    assert_eq!(app.outbound_calls(), 0);
}

#[tokio::test]
async fn test_report_serializes_for_callers() {
    let app = TestServices::new();
    app.connect_chat(false);
    subscribe(&app, "check-1", NotificationType::ChatBot, "C0ATUFZ7X");

    let report = app
        .services
        .manager
        .dispatch(&failing_event("check-1", 1, 1))
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["delivered"], serde_json::json!([]));
    assert_eq!(json["failed"][0]["error"], "integration_inactive");
    assert_eq!(json["failed"][0]["notification"]["value"], "C0ATUFZ7X");
}
