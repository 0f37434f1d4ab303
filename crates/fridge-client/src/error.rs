use fridge_rpc::{ClientError, EndpointError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Client not connected! Run connect first.")]
    NotConnected,

    #[error("Client already connected; disconnect before connecting again")]
    AlreadyConnected,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Parameter not found: {0}")]
    UnknownParameter(String),

    #[error("Parameter is get-only: {0}")]
    NotSettable(String),

    #[error("Remote invocation failed: {0}")]
    Remote(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<EndpointError> for Error {
    fn from(e: EndpointError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
