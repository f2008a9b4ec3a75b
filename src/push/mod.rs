pub mod key;
pub mod payload;
pub mod processor;
pub mod token;

pub use key::PushKeyManager;
pub use payload::{PushMessage, PushPayload, PushUser, RoomDismiss};
pub use processor::{PushProcessor, PushReport};
pub use token::TokenPublisher;

use crate::envelope::EnvelopeError;
use crate::notify::SurfaceError;

/// Transport field carrying the base64 envelope.
pub const PAYLOAD_FIELD: &str = "payload";

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push data has no `payload` field")]
    MissingPayload,
    #[error("no push encryption key; re-registration required")]
    NoKey,
    #[error("decrypt: {0}")]
    Decrypt(#[from] EnvelopeError),
    #[error("schema: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("{step} for {room_id} failed after {applied} tray change(s): {source}")]
    Tray {
        step: &'static str,
        room_id: String,
        /// Dismissals and messages already applied from the same payload.
        applied: usize,
        #[source]
        source: SurfaceError,
    },
    #[error("push worker: {0}")]
    Worker(String),
}
