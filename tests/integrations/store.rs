//! Integration tests for the subscription store contract.

#[path = "../helpers/mod.rs"]
mod helpers;

use checknotify::core::{CheckNotifications, Notification, NotificationType};
use checknotify::store::Store;
use checknotify::StoreError;
use helpers::CUSTOMER;
use tempfile::tempdir;

const OTHER_CUSTOMER: &str = "666df338-6ba2-11e5-8603-6ba085b2f5b5";

fn webhook(customer: &str, check: &str, url: &str) -> Notification {
    Notification::new(customer, 13, check, NotificationType::Webhook, url)
}

#[test]
fn test_webhook_put_get_delete_scenario() {
    let store = Store::open_in_memory().unwrap();
    let batch = vec![webhook(CUSTOMER, "00000", "http://x/hook")];

    store.put(&batch).unwrap();
    let found = store.get_by_check_id(CUSTOMER, "00000").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value, "http://x/hook");
    assert_eq!(found[0].kind, NotificationType::Webhook);

    store.delete(&found).unwrap();
    assert!(store.get(CUSTOMER).unwrap().is_empty());
}

#[test]
fn test_put_twice_yields_the_same_visible_set() {
    let store = Store::open_in_memory().unwrap();
    let batch = vec![
        webhook(CUSTOMER, "check-1", "https://a.example.com/hook"),
        Notification::new(CUSTOMER, 13, "check-1", NotificationType::Email, "ops@example.com"),
    ];

    let first = store.put(&batch).unwrap();
    let second = store.put(&batch).unwrap();

    assert_eq!(first, second);
    assert_eq!(store.get_by_check_id(CUSTOMER, "check-1").unwrap(), first);
}

#[test]
fn test_delete_by_check_id_respects_check_and_tenant() {
    let store = Store::open_in_memory().unwrap();
    store
        .put(&[
            webhook(CUSTOMER, "check-1", "https://a.example.com/hook"),
            webhook(CUSTOMER, "check-2", "https://a.example.com/hook"),
            webhook(OTHER_CUSTOMER, "check-1", "https://a.example.com/hook"),
        ])
        .unwrap();

    assert_eq!(store.delete_by_check_id(CUSTOMER, "check-1").unwrap(), 1);

    assert!(store.get_by_check_id(CUSTOMER, "check-1").unwrap().is_empty());
    assert_eq!(store.get_by_check_id(CUSTOMER, "check-2").unwrap().len(), 1);
    assert_eq!(store.get_by_check_id(OTHER_CUSTOMER, "check-1").unwrap().len(), 1);
}

#[test]
fn test_reads_never_cross_tenants() {
    let store = Store::open_in_memory().unwrap();
    store
        .put(&[webhook(OTHER_CUSTOMER, "check-1", "https://b.example.com/hook")])
        .unwrap();

    assert!(store.get(CUSTOMER).unwrap().is_empty());
    assert!(store.get_by_check_id(CUSTOMER, "check-1").unwrap().is_empty());
    assert!(store.get("").unwrap().is_empty());
}

#[test]
fn test_multi_check_batch_is_all_or_nothing() {
    let store = Store::open_in_memory().unwrap();
    let mut good = CheckNotifications::new(
        "check-1",
        vec![webhook("", "", "https://a.example.com/hook")],
    );
    good.assign_owner(CUSTOMER, 13);
    let mut bad = CheckNotifications::new(
        "check-2",
        vec![Notification::new("", 0, "", NotificationType::Email, "not-an-address")],
    );
    bad.assign_owner(CUSTOMER, 13);

    let err = store.put_multi_check(&[good.clone(), bad]).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    assert!(store.get(CUSTOMER).unwrap().is_empty());

    let stored = store.put_multi_check(&[good]).unwrap();
    assert_eq!(stored[0].notifications[0].check_id, "check-1");
    assert!(stored[0].notifications[0].id > 0);
}

#[test]
fn test_replace_for_check_is_idempotent() {
    let store = Store::open_in_memory().unwrap();
    let wanted = vec![
        webhook(CUSTOMER, "check-1", "https://a.example.com/hook"),
        webhook(CUSTOMER, "check-1", "https://b.example.com/hook"),
    ];
    store
        .put(&[webhook(CUSTOMER, "check-1", "https://old.example.com/hook")])
        .unwrap();

    store.replace_for_check(CUSTOMER, "check-1", &wanted).unwrap();
    let once = store.get_by_check_id(CUSTOMER, "check-1").unwrap();
    store.replace_for_check(CUSTOMER, "check-1", &wanted).unwrap();
    let twice = store.get_by_check_id(CUSTOMER, "check-1").unwrap();

    let values: Vec<_> = twice.iter().map(|n| n.value.as_str()).collect();
    assert_eq!(
        values,
        vec!["https://a.example.com/hook", "https://b.example.com/hook"]
    );
    assert_eq!(once.len(), twice.len());
}

#[test]
fn test_subscriptions_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notifications.db");

    {
        let store = Store::open(&path).unwrap();
        store
            .put(&[webhook(CUSTOMER, "check-1", "https://a.example.com/hook")])
            .unwrap();
    }

    let store = Store::open(&path).unwrap();
    assert_eq!(store.get(CUSTOMER).unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_writers_to_one_check_do_not_duplicate() {
    let store = Store::open_in_memory().unwrap();
    let mut handles = Vec::new();
    for user in 0..8 {
        let store = store.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let batch = vec![Notification::new(
                CUSTOMER,
                user,
                "check-1",
                NotificationType::Webhook,
                "https://a.example.com/hook",
            )];
            store.replace_for_check(CUSTOMER, "check-1", &batch).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.get_by_check_id(CUSTOMER, "check-1").unwrap().len(), 1);
}
