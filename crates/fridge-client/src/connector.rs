//! Creation of transport handles.

use std::future::Future;
use std::time::Duration;

use fridge_rpc::{Invoke, RpcClient};
use tracing::debug;

use crate::Result;
use crate::settings::ConnectionSettings;

/// Builds the transport handle a client invokes remote functions through.
pub trait Connector {
    type Transport: Invoke;

    fn connect(
        &self,
        settings: &ConnectionSettings,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// Connects over TCP with [`RpcClient`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Transport = RpcClient;

    async fn connect(&self, settings: &ConnectionSettings, timeout: Duration) -> Result<RpcClient> {
        let endpoint = settings.endpoint()?;
        let credentials = settings.credentials();
        debug!("Connecting to {endpoint} (timeout {timeout:?})");

        Ok(RpcClient::connect(&[endpoint], credentials.as_ref(), timeout).await?)
    }
}
