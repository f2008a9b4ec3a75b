use serde::{Deserialize, Serialize};

/// Decrypted push body. Unknown fields are ignored; a missing required
/// field rejects the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub dismiss: Option<Vec<RoomDismiss>>,
    #[serde(default)]
    pub messages: Option<Vec<PushMessage>>,
    #[serde(default)]
    pub image_auth: Option<String>,
    #[serde(default)]
    pub image_auth_expiry: Option<i64>,
}

impl PushPayload {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn dismissals(&self) -> &[RoomDismiss] {
        self.dismiss.as_deref().unwrap_or_default()
    }

    pub fn messages(&self) -> &[PushMessage] {
        self.messages.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDismiss {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub timestamp: i64,
    pub event_id: String,
    #[serde(rename = "event_rowid")]
    pub event_row_id: i64,

    pub room_id: String,
    pub room_name: String,
    #[serde(default)]
    pub room_avatar: Option<String>,
    pub sender: PushUser,
    #[serde(rename = "self")]
    pub self_user: PushUser,

    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub mention: bool,
    #[serde(default)]
    pub reply: bool,
    #[serde(default)]
    pub sound: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}
