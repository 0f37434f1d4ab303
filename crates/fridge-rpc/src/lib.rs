//! JSON-RPC 2.0 transport for instrument data servers.
//!
//! This crate provides the protocol types, framing codec and TCP client used
//! to call remote getter and setter functions on an instrument data server.
//!
//! # Architecture
//!
//! - [`protocol`]: JSON-RPC 2.0 message types (Request, Response, Notification)
//! - [`transport`]: Length-prefixed codec for message framing
//! - [`endpoint`]: `tcp://host:port` bind addresses
//! - [`client`]: `RpcClient` and the [`Invoke`] seam
//! - [`error`]: `ClientError` and the `Result` alias
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use fridge_rpc::{Endpoint, Invoke, RpcClient};
//!
//! # async fn example() -> Result<(), fridge_rpc::ClientError> {
//! let endpoint: Endpoint = "tcp://localhost:5555".parse()?;
//! let client = RpcClient::connect(&[endpoint], None, Duration::from_secs(5)).await?;
//!
//! let temperature = client.invoke("temperature", None, Duration::from_secs(5)).await?;
//! println!("T = {temperature} K");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{Credentials, DEFAULT_TIMEOUT, Invoke, RpcClient};
pub use endpoint::{Endpoint, EndpointError};
pub use error::{ClientError, Result};
pub use protocol::{
    AUTHENTICATE_METHOD, AUTHENTICATION_FAILED, AuthenticateParams, FUNCTION_FAILED,
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, Message,
    Notification, PARSE_ERROR, Request, RequestId, Response, RpcError,
};
pub use transport::{CodecError, FrameCodec, MAX_FRAME_SIZE};
