//! TCP client for an instrument data server.
//!
//! One `RpcClient` owns one TCP connection. Requests are matched to responses
//! by id in a background reader task, so several calls may be in flight, but
//! each call waits at most its own timeout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use crate::endpoint::Endpoint;
use crate::error::{ClientError, Result};
use crate::protocol::{AUTHENTICATE_METHOD, AuthenticateParams, Message, Request, RequestId, Response};
use crate::transport::FrameCodec;

/// Default wait for a remote call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Username and password presented to the server after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A single remote procedure call with a bounded wait.
///
/// `arguments` is `None` for getters and a JSON object for setters.
pub trait Invoke {
    fn invoke(
        &self,
        function_name: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value>> + Send;
}

type FrameSink = SplitSink<Framed<TcpStream, FrameCodec>, Message>;
type FrameStream = SplitStream<Framed<TcpStream, FrameCodec>>;

/// Pending request waiting for a response
type PendingRequest = oneshot::Sender<Result<Response>>;

/// Calls waiting for a response, shared with the reader task. Once `closed`
/// is set no new waiters are accepted.
#[derive(Default)]
struct PendingCalls {
    waiters: HashMap<RequestId, PendingRequest>,
    closed: bool,
}

type PendingMap = Arc<Mutex<PendingCalls>>;

/// RPC client connected to one instrument data server
pub struct RpcClient {
    sender: Mutex<FrameSink>,
    pending: PendingMap,
    next_id: AtomicU64,
    endpoint: Endpoint,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Connect to the first reachable endpoint, then authenticate if
    /// credentials are given.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoEndpoints` for an empty list, the last
    /// connection error if no endpoint accepts, or
    /// `ClientError::AuthenticationFailed` if the server rejects the
    /// credentials.
    pub async fn connect(
        endpoints: &[Endpoint],
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut last_error = ClientError::NoEndpoints;

        for endpoint in endpoints {
            match tokio::time::timeout(timeout, TcpStream::connect(endpoint.socket_addr())).await {
                Ok(Ok(stream)) => {
                    info!("Connected to instrument data server at {endpoint}");
                    let client = Self::from_stream(stream, endpoint.clone());
                    if let Some(credentials) = credentials {
                        client.authenticate(credentials, timeout).await?;
                    }
                    return Ok(client);
                }
                Ok(Err(e)) => {
                    warn!("Failed to connect to {endpoint}: {e}");
                    last_error = e.into();
                }
                Err(_) => {
                    warn!("Timed out connecting to {endpoint}");
                    last_error = ClientError::Timeout;
                }
            }
        }

        Err(last_error)
    }

    fn from_stream(stream: TcpStream, endpoint: Endpoint) -> Self {
        let (sink, stream) = Framed::new(stream, FrameCodec::new()).split();
        let pending: PendingMap = Arc::default();
        let reader = tokio::spawn(read_responses(stream, pending.clone()));

        Self {
            sender: Mutex::new(sink),
            pending,
            next_id: AtomicU64::new(1),
            endpoint,
            reader,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn authenticate(&self, credentials: &Credentials, timeout: Duration) -> Result<()> {
        let params = AuthenticateParams {
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        };

        let response = self
            .call(AUTHENTICATE_METHOD, Some(serde_json::to_value(params)?), timeout)
            .await?;
        response.into_result()?;

        debug!("Authenticated as '{}'", credentials.username);
        Ok(())
    }

    /// Send one request and wait for its response within `timeout`.
    async fn call(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Response> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = Request::new(method, params, id.clone());

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(ClientError::ConnectionClosed);
            }
            pending.waiters.insert(id.clone(), tx);
        }

        let exchange = async {
            self.sender
                .lock()
                .await
                .send(Message::Request(request))
                .await?;
            let response = rx.await.map_err(|_| ClientError::ConnectionClosed)??;
            Ok::<_, ClientError>(response)
        };

        let outcome = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout),
        };
        if outcome.is_err() {
            self.pending.lock().await.waiters.remove(&id);
        }
        outcome
    }

    /// Flush and close the connection, stopping the reader task.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if the close frame cannot be flushed.
    pub async fn close(self) -> Result<()> {
        let result = self.sender.lock().await.close().await;
        self.reader.abort();
        debug!("Closed connection to {}", self.endpoint);
        result?;
        Ok(())
    }
}

impl Invoke for RpcClient {
    async fn invoke(
        &self,
        function_name: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        trace!(function = function_name, ?arguments, "invoke");
        let response = self.call(function_name, arguments, timeout).await?;
        Ok(response.into_result()?)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_responses(mut stream: FrameStream, pending: PendingMap) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Response(resp)) => {
                if let Some(tx) = pending.lock().await.waiters.remove(&resp.id) {
                    let _ = tx.send(Ok(resp));
                } else {
                    debug!("Dropping response for unknown or expired request {}", resp.id);
                }
            }
            Ok(Message::Request(req)) => {
                debug!("Ignoring server request '{}'", req.method);
            }
            Ok(Message::Notification(notif)) => {
                debug!("Ignoring server notification '{}'", notif.method);
            }
            Err(e) => {
                warn!("Connection error: {e}");
                break;
            }
        }
    }

    let mut pending = pending.lock().await;
    pending.closed = true;
    for (_, tx) in pending.waiters.drain() {
        let _ = tx.send(Err(ClientError::ConnectionClosed));
    }
}
