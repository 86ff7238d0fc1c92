use thiserror::Error;
use uuid::Uuid;

/// failures of the judge itself, surfaced to the submitter as `IE`
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("io: `{0}`")]
    Io(#[from] std::io::Error),
    #[error("malformed config: `{0}`")]
    Serde(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Config(&'static str),
    #[error("sandbox: `{0}`")]
    Sandbox(#[from] crate::sandbox::Error),
    #[error("toolchain exited clean but left no artifact")]
    MissingArtifact,
    #[error("store: `{0}`")]
    Store(String),
}

/// rejected at the door, before any judging happens
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("submission `{0}` not found")]
    SubmissionNotFound(Uuid),
    #[error("language `{0}` not supported")]
    LangNotSupported(String),
    #[error("submission `{0}` already queued")]
    AlreadyQueued(Uuid),
    #[error("engine is shutting down")]
    ShuttingDown,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Internal Error: `{0}`")]
    Internal(#[from] InternalError),
    #[error("Bad Request: `{0}`")]
    BadRequest(#[from] RequestError),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Internal(value.into())
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Error::Internal(value.into())
    }
}

impl From<crate::sandbox::Error> for Error {
    fn from(value: crate::sandbox::Error) -> Self {
        Error::Internal(value.into())
    }
}
