use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("telephony HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telephony API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("telephony API response missing call sid")]
    MissingCallSid,

    #[error("invalid telephony configuration: {0}")]
    Config(String),
}
