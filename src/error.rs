use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("manifest parse error: {0}")]
    ManifestParse(#[from] roxmltree::Error),

    #[error("manifest shape error: {0}")]
    ManifestShape(String),

    #[error("validation failed for {}: {reason}", .path.display())]
    ValidationFailed { path: PathBuf, reason: String },

    #[error("product {name} is offline, storage answered 202")]
    ProductOffline { name: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
