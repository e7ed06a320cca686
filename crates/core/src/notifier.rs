//! Outbound notifications to operators and role groups.
//!
//! Delivery is fire-and-forget: the core never waits on or retries a
//! notification, and a lost one is acceptable.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::order::Role;

/// Who a notification is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Operator(String),
    Role(Role),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Operator(id) => write!(f, "operator:{}", id),
            Recipient::Role(role) => write!(f, "role:{}", role),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub message: String,
    pub priority: NotificationPriority,
}

impl Notification {
    pub fn operator(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient: Recipient::Operator(id.into()),
            message: message.into(),
            priority: NotificationPriority::Normal,
        }
    }

    pub fn role(role: Role, message: impl Into<String>) -> Self {
        Self {
            recipient: Recipient::Role(role),
            message: message.into(),
            priority: NotificationPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Notification sink.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            "Notify {} [{:?}]: {}",
            notification.recipient, notification.priority, notification.message
        );
    }
}
