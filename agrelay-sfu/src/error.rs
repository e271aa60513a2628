use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("control channel write failed: {0}")]
    Socket(String),

    #[error("media engine error: {0}")]
    Media(#[from] webrtc::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
