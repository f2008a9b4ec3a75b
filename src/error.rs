use crate::backend::BackendError;
use crate::envelope::EnvelopeError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("authentication failure")]
    AuthenticationFailure,
    #[error("schema: {0}")]
    Schema(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Store: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

impl From<EnvelopeError> for Error {
    fn from(e: EnvelopeError) -> Self {
        match e {
            EnvelopeError::AuthenticationFailure => Error::AuthenticationFailure,
            EnvelopeError::BackendUnavailable(msg) => Error::BackendUnavailable(msg),
        }
    }
}

impl From<BackendError> for Error {
    fn from(e: BackendError) -> Self {
        EnvelopeError::from(e).into()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<crate::push::PushError> for Error {
    fn from(e: crate::push::PushError) -> Self {
        use crate::push::PushError;
        match e {
            PushError::NoKey => Error::NotFound("push key"),
            PushError::Decrypt(e) => e.into(),
            PushError::MissingPayload => Error::Schema("missing payload field".into()),
            PushError::Schema(e) => Error::Schema(e.to_string()),
            e @ PushError::Tray { .. } => Error::Internal(e.to_string()),
            PushError::Worker(msg) => Error::Internal(msg),
        }
    }
}
