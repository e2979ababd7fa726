use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("signed URL request failed: {0}")]
    SignedUrl(#[from] reqwest::Error),

    #[error("signed URL request rejected with status {0}")]
    SignedUrlRejected(u16),

    #[error("voice socket error: {0}")]
    Socket(Box<tungstenite::Error>),

    #[error("voice link is closed")]
    LinkClosed,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<tungstenite::Error> for VoiceError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Socket(Box::new(err))
    }
}
