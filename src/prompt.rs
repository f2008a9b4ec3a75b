use std::time::Duration;

use secrecy::SecretString;

use crate::bridge::CredentialPrompt;
use crate::config::PROMPT_TIMEOUT_SECS;

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("pinentry binary not found: {0}")]
    NotFound(String),
    #[error("cancelled")]
    Cancelled,
    #[error("timed out")]
    Timeout,
    #[error("pinentry: {0}")]
    Failed(String),
}

/// Text shown above the password field.
pub(crate) struct PasswordPrompt {
    pub title: String,
    pub description: String,
    pub error: Option<String>,
}

impl PasswordPrompt {
    pub(crate) fn new(server_url: &str, username: &str, state: Option<&CredentialPrompt>) -> Self {
        let error = state.and_then(|state| match state {
            CredentialPrompt::NotGomuks => {
                Some("The server did not identify itself as gomuks web".to_string())
            }
            CredentialPrompt::AuthFailed { error } => Some(format!("Login failed: {error}")),
            CredentialPrompt::NoCredentials => None,
        });
        Self {
            title: "gomuks".to_string(),
            description: format!("Sign in to gomuks web\n\nServer: {server_url}\nUsername: {username}"),
            error,
        }
    }
}

/// Ask for the password with pinentry. Runs on the blocking pool.
pub(crate) async fn read_password(
    prompt: PasswordPrompt,
    pinentry_bin: &str,
) -> Result<SecretString, PromptError> {
    let bin = pinentry_bin.to_string();
    let join = tokio::task::spawn_blocking(move || {
        let Some(mut input) = pinentry::PassphraseInput::with_binary(&bin) else {
            return Err(PromptError::NotFound(bin));
        };
        input
            .with_title(&prompt.title)
            .with_description(&prompt.description)
            .with_prompt("Password:")
            .with_ok("Sign in")
            .with_cancel("Cancel");
        if let Some(error) = &prompt.error {
            input.with_error(error);
        }
        input.interact().map_err(|e| match e {
            pinentry::Error::Cancelled => PromptError::Cancelled,
            pinentry::Error::Timeout => PromptError::Timeout,
            other => PromptError::Failed(other.to_string()),
        })
    });

    match tokio::time::timeout(Duration::from_secs(PROMPT_TIMEOUT_SECS), join).await {
        Err(_) => Err(PromptError::Timeout),
        Ok(Err(e)) => Err(PromptError::Failed(e.to_string())),
        Ok(Ok(result)) => result,
    }
}
