//! Delivery channels and the manager that routes events to them.
//!
//! Each channel is a [`Sender`](crate::core::Sender) built from a template set
//! and a transport. The manager picks the sender by the subscription's type.
pub mod email;
pub mod manager;
pub mod slack;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod webhook;

pub use email::{EmailSender, MailProvider, MandrillClient};
pub use manager::{DispatchReport, FailedDelivery, NotificationManager, Senders};
pub use slack::{ChatApi, ChatBotSender, ChatClient};
pub use webhook::{HttpWebhookTransport, WebhookSender, WebhookTransport};
