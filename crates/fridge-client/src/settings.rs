//! Connection settings for an instrument data server.

use std::fmt;

use fridge_rpc::{Credentials, Endpoint};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn default_address() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    5555
}

/// Where the server lives and how to log in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectionSettings {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// The bind address handed to the transport, e.g. `tcp://localhost:5555`.
    #[must_use]
    pub fn tcp_bind_address(&self) -> String {
        Endpoint::new(self.address.trim(), self.port).to_string()
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if the address is empty or does not form a
    /// valid bind address.
    pub fn endpoint(&self) -> Result<Endpoint> {
        self.validate()?;
        Ok(self.tcp_bind_address().parse()?)
    }

    /// Credentials are only sent when a username is configured.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        Some(Credentials::new(
            username,
            self.password.clone().unwrap_or_default(),
        ))
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if the address is empty.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::Config("address must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            username: None,
            password: None,
        }
    }
}

// Hand-written so passwords never reach the logs
impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}
