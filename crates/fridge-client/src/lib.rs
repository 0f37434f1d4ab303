//! Proxy client for the measurable quantities of an instrument data server.
//!
//! An [`InstrumentDataClient`] holds named parameters, each bound to a remote
//! function. Reading a parameter invokes the function without arguments;
//! writing it invokes the function with `{argument_key: value}`.
//!
//! ```no_run
//! use fridge_client::{ConnectionSettings, InstrumentDataClient};
//! use serde_json::json;
//!
//! # async fn example() -> fridge_client::Result<()> {
//! let mut fridge = InstrumentDataClient::new("fridge");
//! fridge.configure(ConnectionSettings::new("fridge-pc").with_port(5555))?;
//! fridge.register_get_parameter("temperature", "K", json!(0.0), "Mixing chamber")?;
//! fridge.connect().await?;
//!
//! // Falls back to 0.0 if the server does not answer in time
//! let temperature = fridge.get("temperature").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;

mod connector;
mod error;
mod instrument;
mod parameter;
mod settings;

pub use connector::{Connector, TcpConnector};
pub use error::{Error, Result};
pub use instrument::InstrumentDataClient;
pub use parameter::{
    DEFAULT_ARGUMENT_KEY, Parameter, ParameterKind, ParameterOptions, ParameterSnapshot,
};
pub use settings::ConnectionSettings;

pub use fridge_rpc::{ClientError, Invoke};
