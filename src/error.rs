use crate::speech::SpeechError;
use crate::transport::TransportError;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, ChatcasterError>;

#[derive(Error, Debug)]
pub enum ChatcasterError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Logging setup error: {0}")]
    LoggingSetup(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ChatcasterError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        ChatcasterError::Other(anyhow::anyhow!(err.to_string()))
    }
}
