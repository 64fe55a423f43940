//! The notification manager fans one event out to every subscription of its
//! check and reports the outcome of each delivery.

use crate::content::event_content;
use crate::core::{Event, Notification, NotificationType, Sender};
use crate::error::NotifyError;
use crate::store::Store;
use futures::future::join_all;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{timeout_at, Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Stand-in deadline when the configured one does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// One sender per channel, fixed at startup.
#[derive(Clone)]
pub struct Senders {
    by_kind: HashMap<NotificationType, Arc<dyn Sender>>,
}

impl Senders {
    /// Builds the routing table. Every channel must have exactly one sender.
    pub fn new(senders: Vec<Arc<dyn Sender>>) -> Result<Self, NotifyError> {
        let mut by_kind = HashMap::new();
        for sender in senders {
            let kind = sender.kind();
            if by_kind.insert(kind, sender).is_some() {
                return Err(NotifyError::UnknownChannel(format!(
                    "more than one sender registered for {}",
                    kind
                )));
            }
        }
        if let Some(missing) = NotificationType::ALL
            .into_iter()
            .find(|kind| !by_kind.contains_key(kind))
        {
            return Err(NotifyError::UnknownChannel(format!(
                "no sender registered for {}",
                missing
            )));
        }
        Ok(Self { by_kind })
    }

    pub fn for_type(&self, kind: NotificationType) -> Result<&Arc<dyn Sender>, NotifyError> {
        self.by_kind
            .get(&kind)
            .ok_or_else(|| NotifyError::UnknownChannel(kind.to_string()))
    }
}

/// A subscription that could not be delivered to.
#[derive(Debug, Serialize)]
pub struct FailedDelivery {
    pub notification: Notification,
    #[serde(serialize_with = "serialize_error")]
    pub error: NotifyError,
}

fn serialize_error<S: Serializer>(error: &NotifyError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Outcome of one dispatch cycle, per subscription.
#[derive(Debug, Default, Serialize)]
pub struct DispatchReport {
    pub delivered: Vec<Notification>,
    pub failed: Vec<FailedDelivery>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// e.g. "2 of 3 delivered".
    pub fn summary(&self) -> String {
        format!(
            "{} of {} delivered",
            self.delivered.len(),
            self.delivered.len() + self.failed.len()
        )
    }
}

/// Routes events to the subscriptions stored for their check.
pub struct NotificationManager {
    store: Store,
    senders: Senders,
    deadline: Duration,
}

impl NotificationManager {
    /// Creates a new `NotificationManager`. `deadline` bounds a whole dispatch
    /// cycle, not each send.
    pub fn new(store: Store, senders: Senders, deadline: Duration) -> Self {
        Self {
            store,
            senders,
            deadline,
        }
    }

    /// Delivers `event` to every subscription of its (customer, check).
    ///
    /// A malformed event or a failure to load the subscriptions is returned as
    /// an error; every delivery failure is recorded in the report and does not
    /// affect the other deliveries.
    #[instrument(skip(self, event), fields(customer_id = %event.result.customer_id, check_id = %event.result.check_id))]
    pub async fn dispatch(&self, event: &Event) -> Result<DispatchReport, NotifyError> {
        event_content(event)?;
        let result = &event.result;
        let subscriptions = self
            .store
            .get_by_check_id(&result.customer_id, &result.check_id)?;
        debug!(count = subscriptions.len(), "Loaded subscriptions");

        let report = self.deliver(subscriptions, event).await;
        info!(summary = %report.summary(), "Dispatch cycle finished");
        Ok(report)
    }

    /// Sends `event` to each of `subscriptions` concurrently under one shared
    /// deadline.
    pub async fn deliver(&self, subscriptions: Vec<Notification>, event: &Event) -> DispatchReport {
        let deadline = self.deadline_from_now();
        let sends = subscriptions.into_iter().map(|notification| async move {
            let outcome = self.send_before(deadline, &notification, event).await;
            (notification, outcome)
        });

        let mut report = DispatchReport::default();
        for (notification, outcome) in join_all(sends).await {
            let channel = notification.kind.as_str();
            match outcome {
                Ok(()) => {
                    metrics::counter!("notifications_sent_total", "channel" => channel)
                        .increment(1);
                    report.delivered.push(notification);
                }
                Err(error) => {
                    metrics::counter!("notifications_failed_total", "channel" => channel)
                        .increment(1);
                    warn!(
                        notification_id = notification.id,
                        channel,
                        error = %error,
                        "Failed to deliver notification"
                    );
                    report.failed.push(FailedDelivery {
                        notification,
                        error,
                    });
                }
            }
        }
        report
    }

    /// Sends a fixed failing sample event to one subscription, so a customer
    /// can try a destination before relying on it.
    #[instrument(skip(self, notification), fields(channel = %notification.kind))]
    pub async fn send_test(&self, notification: &Notification) -> Result<(), NotifyError> {
        notification.validate()?;
        let event = Event::sample(&notification.customer_id, &notification.check_id);
        let deadline = self.deadline_from_now();
        self.send_before(deadline, notification, &event).await
    }

    fn deadline_from_now(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.deadline)
            .unwrap_or_else(|| now + FAR_FUTURE)
    }

    async fn send_before(
        &self,
        deadline: Instant,
        notification: &Notification,
        event: &Event,
    ) -> Result<(), NotifyError> {
        let sender = self.senders.for_type(notification.kind)?;
        timeout_at(deadline, sender.send(notification, event))
            .await
            .unwrap_or(Err(NotifyError::Timeout(self.deadline)))
    }
}
