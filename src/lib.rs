//! checknotify - Check result notification dispatch
//!
//! This library stores per-customer notification subscriptions and delivers
//! check results to them over chat, email and webhooks.

pub mod cli;
pub mod config;
pub mod content;
pub mod core;
pub mod credentials;
pub mod error;
pub mod notification;
pub mod results;
pub mod services;
pub mod store;
pub mod templates;

// Re-export core types for convenience
pub use crate::core::*;
pub use crate::error::{NotifyError, StoreError, ValidationError};
