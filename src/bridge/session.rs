use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::{BridgeOutput, ContentEvent, CredentialPrompt, NativeMessage, PushEncryption};
use super::throttle::{RegistrationThrottle, Reservation};
use crate::push::PushKeyManager;
use crate::vault::CredentialVault;

/// Shared state one bridge session needs.
#[derive(Clone)]
pub struct BridgeDeps {
    pub vault: Arc<CredentialVault>,
    pub push_keys: Arc<PushKeyManager>,
    pub throttle: Arc<RegistrationThrottle>,
}

/// Drive one content session until `incoming_rx` closes.
///
/// Events are handled strictly in order. Once the content reports
/// `connected`, every newer push token is registered immediately, including
/// one published while the content was reloading.
pub async fn run_bridge_loop(
    mut incoming_rx: mpsc::Receiver<ContentEvent>,
    outgoing_tx: mpsc::Sender<BridgeOutput>,
    mut token_rx: watch::Receiver<Option<String>>,
    deps: BridgeDeps,
) {
    let mut connected = false;
    let mut tokens_open = true;
    tracing::info!("Bridge session running");

    loop {
        let outputs = tokio::select! {
            event = incoming_rx.recv() => {
                let Some(event) = event else { break };
                tracing::debug!(?event, "Content event");
                match event {
                    ContentEvent::Ready => {
                        connected = false;
                        vec![authorize(&deps).await]
                    }
                    ContentEvent::NotGomuks => {
                        tracing::warn!("Content is not the expected web client");
                        vec![BridgeOutput::Prompt(CredentialPrompt::NotGomuks)]
                    }
                    ContentEvent::AuthFail { error } => {
                        tracing::warn!(%error, "Content reported authentication failure");
                        vec![BridgeOutput::Prompt(CredentialPrompt::AuthFailed { error })]
                    }
                    ContentEvent::Connected => {
                        connected = true;
                        // A token published while disconnected was never registered.
                        let mode = if token_rx.has_changed().unwrap_or(false) {
                            Registration::Immediate
                        } else {
                            Registration::Throttled
                        };
                        let token = token_rx.borrow_and_update().clone();
                        register(&deps, token, mode).await
                    }
                }
            }
            changed = token_rx.changed(), if connected && tokens_open => {
                if changed.is_err() {
                    tracing::debug!("Token publisher dropped");
                    tokens_open = false;
                    continue;
                }
                let token = token_rx.borrow_and_update().clone();
                register(&deps, token, Registration::Immediate).await
            }
        };

        for output in outputs {
            if outgoing_tx.send(output).await.is_err() {
                tracing::error!("Bridge output channel closed");
                return;
            }
        }
    }
    tracing::info!("Bridge session exiting (incoming channel closed)");
}

async fn authorize(deps: &BridgeDeps) -> BridgeOutput {
    let vault = deps.vault.clone();
    match tokio::task::spawn_blocking(move || vault.get_credentials()).await {
        Ok(Some(record)) => {
            tracing::info!(username = %record.username, "Sending authorization to content");
            BridgeOutput::Content(NativeMessage::Auth {
                authorization: record.basic_authorization(),
            })
        }
        Ok(None) => BridgeOutput::Prompt(CredentialPrompt::NoCredentials),
        Err(e) => {
            tracing::error!(error = %e, "Credential lookup task failed");
            BridgeOutput::Prompt(CredentialPrompt::NoCredentials)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    /// Subject to the registration interval.
    Throttled,
    /// A fresh token; always sent.
    Immediate,
}

async fn register(
    deps: &BridgeDeps,
    token: Option<String>,
    mode: Registration,
) -> Vec<BridgeOutput> {
    let Some(token) = token else {
        tracing::debug!("No push token yet, skipping registration");
        return vec![];
    };
    let reservation = match mode {
        Registration::Throttled => match deps.throttle.try_acquire() {
            Some(r) => r,
            None => {
                tracing::debug!("Push registration throttled");
                return vec![];
            }
        },
        Registration::Immediate => deps.throttle.record(),
    };

    match build_registration(deps, token, reservation).await {
        Some(message) => {
            tracing::info!(?mode, "Registering push token");
            vec![BridgeOutput::Content(message)]
        }
        None => vec![],
    }
}

async fn build_registration(
    deps: &BridgeDeps,
    token: String,
    reservation: Reservation,
) -> Option<NativeMessage> {
    let keys = deps.push_keys.clone();
    let built = tokio::task::spawn_blocking(move || {
        let device_id = keys.device_id()?;
        let key = keys.get_or_create()?;
        Ok::<_, crate::error::Error>((device_id, key))
    })
    .await;

    match built {
        Ok(Ok((device_id, key))) => Some(NativeMessage::RegisterPush {
            device_id: device_id.to_string(),
            token,
            encryption: PushEncryption {
                key: key.to_base64(),
            },
        }),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Cannot register push token");
            deps.throttle.restore(reservation);
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Push registration task failed");
            deps.throttle.restore(reservation);
            None
        }
    }
}
