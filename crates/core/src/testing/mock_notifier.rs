//! Mock notifier for testing.

use std::sync::{Arc, RwLock};

use crate::notifier::{Notification, Notifier, Recipient};
use crate::order::Role;

/// Records every notification instead of delivering it.
///
/// # Example
///
/// ```rust,ignore
/// let notifier = MockNotifier::new();
/// notifier.notify(Notification::operator("op-1", "New task"));
/// assert_eq!(notifier.notifications_for_operator("op-1").len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    sent: Arc<RwLock<Vec<Notification>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.read().unwrap().clone()
    }

    pub fn notifications_for_operator(&self, operator_id: &str) -> Vec<Notification> {
        self.sent
            .read()
            .unwrap()
            .iter()
            .filter(|n| matches!(&n.recipient, Recipient::Operator(id) if id == operator_id))
            .cloned()
            .collect()
    }

    pub fn notifications_for_role(&self, role: Role) -> Vec<Notification> {
        self.sent
            .read()
            .unwrap()
            .iter()
            .filter(|n| n.recipient == Recipient::Role(role))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.sent.write().unwrap().clear();
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, notification: Notification) {
        self.sent.write().unwrap().push(notification);
    }
}
