pub mod message;
pub mod session;
pub mod throttle;

pub use message::{BridgeOutput, ContentEvent, CredentialPrompt, NativeMessage, PushEncryption};
pub use session::{BridgeDeps, run_bridge_loop};
pub use throttle::{Clock, ManualClock, RegistrationThrottle, Reservation, SystemClock};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("schema: {0}")]
    Schema(#[from] serde_json::Error),
}
