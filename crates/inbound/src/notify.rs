//! Single-slot latest-message notification.
//!
//! The UI polls for the most recent inbound message; each new message
//! overwrites the previous one, and reading does not consume it. Held in
//! process memory only.

use std::sync::RwLock;

use serde::Serialize;

use recado_common::types::{Address, now_rfc3339, preview};

/// Longest preview shown in a notification, in characters.
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub address: String,
    pub display_name: String,
    pub preview: String,
    pub received_at: String,
}

/// Holds at most one notification, the latest.
#[derive(Default)]
pub struct NotificationSlot {
    slot: RwLock<Option<Notification>>,
}

impl NotificationSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, address: &Address, display_name: &str, body: &str) {
        let notification = Notification {
            address: address.as_str().to_string(),
            display_name: display_name.to_string(),
            preview: preview(body, PREVIEW_CHARS),
            received_at: now_rfc3339(),
        };
        *self
            .slot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(notification);
    }

    #[must_use]
    pub fn latest(&self) -> Option<Notification> {
        self.slot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        *self
            .slot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Address {
        Address::parse("5215511112222@s.whatsapp.net").unwrap()
    }

    #[test]
    fn latest_wins_and_clear_empties() {
        let slot = NotificationSlot::new();
        assert!(slot.latest().is_none());

        slot.publish(&addr(), "Ana", "primer mensaje");
        slot.publish(&addr(), "Ana", "segundo mensaje");
        assert_eq!(slot.latest().unwrap().preview, "segundo mensaje");

        slot.clear();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn preview_is_char_truncated() {
        let slot = NotificationSlot::new();
        let long = "á".repeat(150);
        slot.publish(&addr(), "Ana", &long);
        let preview = slot.latest().unwrap().preview;
        assert_eq!(preview.chars().count(), PREVIEW_CHARS);
    }
}
