use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdsError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("email already registered on pds")]
    EmailTaken,
    #[error("handle already taken on pds")]
    HandleTaken,
    #[error("access token expired")]
    ExpiredToken,
    #[error("pds error {error}: {message}")]
    Api { error: String, message: String },
}
