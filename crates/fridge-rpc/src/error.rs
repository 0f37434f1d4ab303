//! Error types for the fridge-rpc crate.

use crate::endpoint::EndpointError;
use crate::protocol::{AUTHENTICATION_FAILED, RpcError};
use crate::transport::CodecError;

/// Errors that can occur with the RPC client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error: {code} - {message}")]
    Rpc { code: i32, message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timeout")]
    Timeout,

    #[error(transparent)]
    InvalidEndpoint(#[from] EndpointError),

    #[error("No endpoints to connect to")]
    NoEndpoints,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
}

impl ClientError {
    pub fn rpc(code: i32, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    /// Whether the server answered and reported a failure, as opposed to the
    /// call never completing.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Rpc { .. } | Self::AuthenticationFailed(_))
    }
}

impl From<RpcError> for ClientError {
    fn from(e: RpcError) -> Self {
        if e.code == AUTHENTICATION_FAILED {
            return Self::AuthenticationFailed(e.message);
        }
        Self::Rpc {
            code: e.code,
            message: e.message,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FUNCTION_FAILED;

    #[test]
    fn test_from_rpc_error() {
        let err: ClientError = RpcError::function_failed("temperature", "boom").into();
        match err {
            ClientError::Rpc { code, message } => {
                assert_eq!(code, FUNCTION_FAILED);
                assert!(message.contains("boom"));
            }
            other => panic!("Expected Rpc error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_authentication_rpc_error() {
        let err: ClientError = RpcError::authentication_failed().into();
        assert!(matches!(err, ClientError::AuthenticationFailed(_)));
        assert!(err.is_remote());
    }

    #[test]
    fn test_display() {
        assert_eq!(ClientError::ConnectionClosed.to_string(), "Connection closed");
        assert_eq!(ClientError::Timeout.to_string(), "Request timeout");

        let err = ClientError::rpc(-32601, "Method not found");
        assert!(err.to_string().contains("-32601"));
        assert!(err.to_string().contains("Method not found"));
    }

    #[test]
    fn test_is_remote() {
        assert!(ClientError::rpc(-32001, "raised").is_remote());
        assert!(!ClientError::Timeout.is_remote());
        assert!(!ClientError::ConnectionClosed.is_remote());
        assert!(!ClientError::NoEndpoints.is_remote());
    }

    #[test]
    fn test_from_codec_error() {
        let err: ClientError = CodecError::FrameTooLarge(50_000_000).into();
        assert!(matches!(err, ClientError::Codec(_)));
        assert!(err.to_string().contains("50000000"));
    }
}
