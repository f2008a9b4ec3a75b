use std::collections::HashMap;
use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::{BridgeOutput, CredentialPrompt, NativeMessage};
use crate::config::CHANNEL_CAPACITY;
use crate::notify::{Conversation, Notification, NotificationId, NotificationSurface, SurfaceError, TrayFile};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("host read error: {0}")]
    Read(std::io::Error),
    #[error("host write error: {0}")]
    Write(std::io::Error),
}

/// One line from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum HostInput {
    /// Raw bridge message from the embedded content; decoded by the session.
    Content { message: serde_json::Value },
    /// Field map delivered by the push transport.
    Push { data: HashMap<String, String> },
    /// The push transport issued a new token.
    Token { token: String },
}

/// One line to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum HostOutput {
    Content { message: NativeMessage },
    Prompt { prompt: CredentialPrompt },
    Notification { notification: Notification },
    Cancel { id: NotificationId },
}

impl From<BridgeOutput> for HostOutput {
    fn from(output: BridgeOutput) -> Self {
        match output {
            BridgeOutput::Content(message) => HostOutput::Content { message },
            BridgeOutput::Prompt(prompt) => HostOutput::Prompt { prompt },
        }
    }
}

pub struct HostTransport {
    pub incoming_rx: mpsc::Receiver<HostInput>,
    pub outgoing_tx: mpsc::Sender<HostOutput>,
    pub task: JoinHandle<Result<(), TransportError>>,
    /// Finishes once every `outgoing_tx` clone is dropped and the queue is flushed.
    pub writer: std::thread::JoinHandle<()>,
}

pub fn start_stdio_transport() -> HostTransport {
    start_transport(std::io::BufReader::new(std::io::stdin()), std::io::stdout())
}

/// JSON lines in both directions. Lines that do not decode are logged and
/// skipped; the task ends at EOF.
pub fn start_transport<R, W>(reader: R, mut writer: W) -> HostTransport
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    let (incoming_tx, incoming_rx) = mpsc::channel::<HostInput>(CHANNEL_CAPACITY);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<HostOutput>(CHANNEL_CAPACITY);

    // Writer runs on its own thread so replies never wait for the next input line.
    let writer = std::thread::spawn(move || {
        while let Some(output) = outgoing_rx.blocking_recv() {
            let line = match serde_json::to_string(&output) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode host output");
                    continue;
                }
            };
            if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
                tracing::error!("{}", TransportError::Write(e));
                break;
            }
            tracing::trace!(len = line.len(), "Host tx");
        }
        tracing::debug!("Host writer thread exiting");
    });

    let task = tokio::task::spawn_blocking(move || {
        for line in reader.lines() {
            let line = line.map_err(TransportError::Read)?;
            if line.trim().is_empty() {
                continue;
            }
            let input = match serde_json::from_str::<HostInput>(&line) {
                Ok(input) => input,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed host line");
                    continue;
                }
            };
            tracing::trace!(len = line.len(), "Host rx");
            if incoming_tx.blocking_send(input).is_err() {
                break;
            }
        }
        tracing::info!("Host input closed");
        Ok(())
    });

    HostTransport {
        incoming_rx,
        outgoing_tx,
        task,
        writer,
    }
}

/// Tray file whose every change is mirrored to the host, which owns the real
/// notification tray. Call only from blocking contexts.
pub struct HostSurface {
    tray: TrayFile,
    outgoing_tx: mpsc::Sender<HostOutput>,
}

impl HostSurface {
    pub fn new(tray: TrayFile, outgoing_tx: mpsc::Sender<HostOutput>) -> Self {
        Self { tray, outgoing_tx }
    }

    fn send(&self, output: HostOutput) -> Result<(), SurfaceError> {
        self.outgoing_tx
            .blocking_send(output)
            .map_err(|_| SurfaceError::Closed)
    }
}

impl NotificationSurface for HostSurface {
    fn active(&self, id: NotificationId) -> Result<Option<Conversation>, SurfaceError> {
        self.tray.active(id)
    }

    fn notify(&mut self, notification: Notification) -> Result<(), SurfaceError> {
        self.tray.notify(notification.clone())?;
        self.send(HostOutput::Notification { notification })
    }

    fn cancel(&mut self, id: NotificationId) -> Result<bool, SurfaceError> {
        let removed = self.tray.cancel(id)?;
        if removed {
            self.send(HostOutput::Cancel { id })?;
        }
        Ok(removed)
    }
}
