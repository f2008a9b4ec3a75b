pub mod aggregator;
pub mod surface;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use aggregator::NotificationAggregator;
pub use surface::{MemorySurface, NotificationSurface, SurfaceError, TrayFile};

pub const NOISY_CHANNEL_ID: &str = "noisy_notification";
pub const SILENT_CHANNEL_ID: &str = "silent_notification";

/// Tray slot for one room: the first four bytes of SHA-256(room id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub u32);

impl NotificationId {
    pub fn for_room(room_id: &str) -> Self {
        let digest = Sha256::digest(room_id.as_bytes());
        Self(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Delivery channels registered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub noisy: String,
    pub silent: String,
}

impl ChannelConfig {
    pub fn select(&self, sound: bool) -> &str {
        if sound { &self.noisy } else { &self.silent }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            noisy: NOISY_CHANNEL_ID.to_string(),
            silent: SILENT_CHANNEL_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub key: String,
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub text: String,
    pub timestamp: i64,
    pub sender: Person,
}

/// Message history currently shown for one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub user: Person,
    pub title: Option<String>,
    pub messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new(user: Person) -> Self {
        Self {
            user,
            title: None,
            messages: Vec::new(),
        }
    }
}

/// Everything the platform surface needs to post one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub channel_id: String,
    pub when: i64,
    /// Opened on tap.
    pub target_uri: String,
    pub auto_cancel: bool,
    pub conversation: Conversation,
}

/// Drop the leading sigil (`@`, `!`, `$`, `#`) of a Matrix identifier.
pub(crate) fn strip_sigil(id: &str) -> &str {
    let mut chars = id.chars();
    chars.next();
    chars.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_id_is_stable() {
        let a = NotificationId::for_room("!abc:example.org");
        let b = NotificationId::for_room("!abc:example.org");
        let c = NotificationId::for_room("!other:example.org");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_strip_sigil() {
        assert_eq!(strip_sigil("!room:example.org"), "room:example.org");
        assert_eq!(strip_sigil("$event"), "event");
        assert_eq!(strip_sigil(""), "");
    }

    #[test]
    fn test_channel_select() {
        let channels = ChannelConfig::default();
        assert_eq!(channels.select(true), NOISY_CHANNEL_ID);
        assert_eq!(channels.select(false), SILENT_CHANNEL_ID);
    }
}
