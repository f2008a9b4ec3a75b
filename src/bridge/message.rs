use std::fmt;

use serde::{Deserialize, Serialize};

use super::BridgeError;

/// Events sent by the embedded content. Decoded once at the boundary; the
/// session only ever sees this enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContentEvent {
    /// The page did not identify itself as the expected web client.
    NotGomuks,
    /// Page loaded and wants credentials.
    Ready,
    AuthFail {
        error: String,
    },
    /// WebSocket to the server is up.
    Connected,
}

impl ContentEvent {
    pub fn from_value(value: serde_json::Value) -> Result<Self, BridgeError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEncryption {
    /// base64 of the raw push key
    pub key: String,
}

/// Messages sent to the embedded content.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NativeMessage {
    Auth {
        authorization: String,
    },
    RegisterPush {
        device_id: String,
        token: String,
        encryption: PushEncryption,
    },
}

impl fmt::Debug for NativeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth { .. } => f.debug_struct("Auth").finish_non_exhaustive(),
            Self::RegisterPush {
                device_id, token, ..
            } => f
                .debug_struct("RegisterPush")
                .field("device_id", device_id)
                .field("token", token)
                .finish_non_exhaustive(),
        }
    }
}

/// Credential-entry state the host should present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CredentialPrompt {
    NotGomuks,
    AuthFailed { error: String },
    NoCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutput {
    Content(NativeMessage),
    Prompt(CredentialPrompt),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_events() {
        assert_eq!(ContentEvent::from_value(json!({"event": "ready"})).unwrap(), ContentEvent::Ready);
        assert_eq!(
            ContentEvent::from_value(json!({"event": "connected", "extra": true})).unwrap(),
            ContentEvent::Connected
        );
        assert_eq!(
            ContentEvent::from_value(json!({"event": "auth_fail", "error": "401"})).unwrap(),
            ContentEvent::AuthFail {
                error: "401".into()
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_and_malformed() {
        assert!(ContentEvent::from_value(json!({"event": "launch_missiles"})).is_err());
        assert!(ContentEvent::from_value(json!({"event": "auth_fail"})).is_err());
        assert!(ContentEvent::from_value(json!({"type": "ready"})).is_err());
        assert!(ContentEvent::from_value(json!("ready")).is_err());
    }

    #[test]
    fn test_register_push_wire_shape() {
        let msg = NativeMessage::RegisterPush {
            device_id: "dev".into(),
            token: "tok".into(),
            encryption: PushEncryption { key: "a2V5".into() },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "register_push",
                "device_id": "dev",
                "token": "tok",
                "encryption": {"key": "a2V5"}
            })
        );
    }

    #[test]
    fn test_debug_hides_secrets() {
        let auth = NativeMessage::Auth {
            authorization: "Basic c2VjcmV0".into(),
        };
        assert!(!format!("{auth:?}").contains("c2VjcmV0"));

        let reg = NativeMessage::RegisterPush {
            device_id: "dev".into(),
            token: "tok".into(),
            encryption: PushEncryption { key: "a2V5".into() },
        };
        assert!(!format!("{reg:?}").contains("a2V5"));
    }
}
