//! The instrument data client: named parameters proxied over RPC.
//!
//! Reads and writes follow different failure policies. A read is
//! monitoring: if the remote call fails for any reason, the parameter's
//! default value is returned and the error is only logged, so polling loops
//! keep running. A write is a commanded action: every failure reaches the
//! caller.
//!
//! | Operation | Not connected | Remote call fails |
//! |---|---|---|
//! | `get` | `Error::NotConnected` | default value |
//! | `set` | `Error::NotConnected` | `Error::Remote` |

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use fridge_rpc::{DEFAULT_TIMEOUT, Invoke};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connector::{Connector, TcpConnector};
use crate::parameter::{Parameter, ParameterKind, ParameterOptions, ParameterSnapshot};
use crate::settings::ConnectionSettings;
use crate::{Error, Result};

enum ConnectionState<T> {
    Disconnected,
    Connected(T),
}

/// Proxy for the measurable quantities of an instrument data server.
///
/// The client owns at most one transport handle. `connect` fails while a
/// handle exists; call `disconnect` first to reconnect. All operations take
/// `&mut self`, so sharing a client between tasks needs external locking.
pub struct InstrumentDataClient<C: Connector = TcpConnector> {
    name: String,
    settings: ConnectionSettings,
    timeout: Duration,
    connector: C,
    state: ConnectionState<C::Transport>,
    parameters: HashMap<String, Parameter>,
}

impl InstrumentDataClient<TcpConnector> {
    /// A TCP client for `localhost` with the default 5 s timeout.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_connector(name, TcpConnector)
    }

    /// Build a TCP client from a config file's contents.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for invalid settings, an invalid timeout or a
    /// duplicate parameter name.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut client = Self::new(config.name.clone());
        client.apply_config(config)?;
        Ok(client)
    }
}

impl<C: Connector> InstrumentDataClient<C> {
    #[must_use]
    pub fn with_connector(name: impl Into<String>, connector: C) -> Self {
        Self {
            name: name.into(),
            settings: ConnectionSettings::default(),
            timeout: DEFAULT_TIMEOUT,
            connector,
            state: ConnectionState::Disconnected,
            parameters: HashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Replace the connection settings used by the next `connect`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an empty address and
    /// `Error::AlreadyConnected` while a connection is open.
    pub fn configure(&mut self, settings: ConnectionSettings) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Wait per remote call.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Apply settings, timeout and parameters from a config file.
    ///
    /// Either everything is applied or, on error, nothing is.
    ///
    /// # Errors
    ///
    /// Same as `configure`, plus `Error::Config` for an invalid timeout or a
    /// duplicate parameter name.
    pub fn apply_config(&mut self, config: &ClientConfig) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        config.connection.validate()?;
        let timeout = config.timeout()?;

        let mut staged: HashMap<String, Parameter> = HashMap::new();
        for param in &config.parameters {
            let parameter = if param.settable {
                let mut options = ParameterOptions::default()
                    .with_unit(param.unit.clone())
                    .with_default(param.default_value.clone())
                    .with_doc(param.doc.clone());
                if let Some(key) = &param.argument_key {
                    options = options.with_argument_key(key.clone());
                }
                Parameter::get_set(&param.name, options)
            } else {
                Parameter::get_only(
                    &param.name,
                    &param.unit,
                    param.default_value.clone(),
                    &param.doc,
                )
            };

            self.check_new_name(parameter.name())?;
            if staged.contains_key(parameter.name()) {
                return Err(duplicate_name(parameter.name()));
            }
            staged.insert(parameter.name().to_string(), parameter);
        }

        self.settings = config.connection.clone();
        self.timeout = timeout;
        for (name, parameter) in staged {
            debug!("Registered parameter '{name}'");
            self.parameters.insert(name, parameter);
        }
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    /// Create the transport handle from the current settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyConnected` if a handle exists, otherwise any
    /// error from the connector. The client stays disconnected on failure.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let transport = self.connector.connect(&self.settings, self.timeout).await?;
        self.state = ConnectionState::Connected(transport);
        info!(
            "{} connected to {}",
            self.name,
            self.settings.tcp_bind_address()
        );
        Ok(())
    }

    /// Drop the transport handle. Returns whether one was open.
    pub fn disconnect(&mut self) -> bool {
        match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Connected(transport) => {
                drop(transport);
                info!("{} disconnected", self.name);
                true
            }
            ConnectionState::Disconnected => false,
        }
    }

    /// Register a parameter read and written through remote function `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the name is empty or already registered.
    pub fn register_get_set_parameter(
        &mut self,
        name: &str,
        options: ParameterOptions,
    ) -> Result<()> {
        self.insert(Parameter::get_set(name, options))
    }

    /// Register a read-only parameter backed by remote function `function_name`.
    ///
    /// `default_value` is the initial value and what `get` returns when the
    /// remote call fails.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the name is empty or already registered.
    pub fn register_get_parameter(
        &mut self,
        function_name: &str,
        unit: &str,
        default_value: Value,
        doc: &str,
    ) -> Result<()> {
        self.insert(Parameter::get_only(function_name, unit, default_value, doc))
    }

    fn check_new_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Config("parameter name must not be empty".to_string()));
        }
        if self.parameters.contains_key(name) {
            return Err(duplicate_name(name));
        }
        Ok(())
    }

    fn insert(&mut self, parameter: Parameter) -> Result<()> {
        self.check_new_name(parameter.name())?;
        debug!("Registered parameter '{}'", parameter.name());
        self.parameters.insert(parameter.name().to_string(), parameter);
        Ok(())
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// Registered parameters in no particular order.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }

    /// Read a parameter from the server.
    ///
    /// Any failure of the remote call (timeout, lost connection, remote
    /// exception) yields the parameter's default value instead of an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` before `connect` and
    /// `Error::UnknownParameter` for unregistered names.
    pub async fn get(&mut self, name: &str) -> Result<Value> {
        let ConnectionState::Connected(transport) = &self.state else {
            return Err(Error::NotConnected);
        };
        let parameter = self
            .parameters
            .get_mut(name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))?;

        let value = match transport
            .invoke(parameter.function_name(), None, self.timeout)
            .await
        {
            Ok(value) => value,
            Err(e) if e.is_remote() => {
                warn!("Server raised reading '{name}', using default: {e}");
                parameter.default_value().clone()
            }
            Err(e) => {
                warn!("Reading '{name}' failed, using default: {e}");
                parameter.default_value().clone()
            }
        };

        parameter.cache(value.clone());
        Ok(value)
    }

    /// `get`, deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Same as `get`, plus `Error::Json` when the value does not fit `T`.
    pub async fn get_as<T: DeserializeOwned>(&mut self, name: &str) -> Result<T> {
        let value = self.get(name).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Write a parameter on the server, returning the remote function's reply.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` before `connect`,
    /// `Error::UnknownParameter` for unregistered names,
    /// `Error::NotSettable` for get-only parameters and `Error::Remote` for
    /// every failure of the remote call.
    pub async fn set(&mut self, name: &str, value: Value) -> Result<Value> {
        let ConnectionState::Connected(transport) = &self.state else {
            return Err(Error::NotConnected);
        };
        let parameter = self
            .parameters
            .get_mut(name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))?;
        let ParameterKind::GetSet { argument_key } = parameter.kind() else {
            return Err(Error::NotSettable(name.to_string()));
        };

        let mut arguments = Map::new();
        arguments.insert(argument_key.clone(), value.clone());

        let reply = transport
            .invoke(
                parameter.function_name(),
                Some(Value::Object(arguments)),
                self.timeout,
            )
            .await?;

        debug!("Set '{name}' to {value}");
        parameter.cache(value);
        Ok(reply)
    }

    /// Cached value and unit of every parameter, keyed by name. Makes no
    /// remote calls.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ParameterSnapshot> {
        self.parameters
            .iter()
            .map(|(name, param)| (name.clone(), param.snapshot()))
            .collect()
    }
}

fn duplicate_name(name: &str) -> Error {
    Error::Config(format!("parameter '{name}' already registered"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fridge_rpc::{ClientError, FUNCTION_FAILED};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type CallLog = Arc<Mutex<Vec<(String, Option<Value>, Duration)>>>;

    #[derive(Clone)]
    enum Behaviour {
        Returns(Value),
        Raises,
    }

    struct StubTransport {
        behaviour: Behaviour,
        calls: CallLog,
    }

    impl Invoke for StubTransport {
        async fn invoke(
            &self,
            function_name: &str,
            arguments: Option<Value>,
            timeout: Duration,
        ) -> fridge_rpc::Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((function_name.to_string(), arguments, timeout));
            match &self.behaviour {
                Behaviour::Returns(value) => Ok(value.clone()),
                Behaviour::Raises => Err(ClientError::rpc(FUNCTION_FAILED, "stub raised")),
            }
        }
    }

    struct StubConnector {
        behaviour: Behaviour,
        calls: CallLog,
        refuse: bool,
    }

    impl StubConnector {
        fn new(behaviour: Behaviour) -> Self {
            Self {
                behaviour,
                calls: CallLog::default(),
                refuse: false,
            }
        }
    }

    impl Connector for StubConnector {
        type Transport = StubTransport;

        async fn connect(
            &self,
            _settings: &ConnectionSettings,
            _timeout: Duration,
        ) -> Result<StubTransport> {
            if self.refuse {
                return Err(ClientError::ConnectionClosed.into());
            }
            Ok(StubTransport {
                behaviour: self.behaviour.clone(),
                calls: self.calls.clone(),
            })
        }
    }

    fn client(behaviour: Behaviour) -> (InstrumentDataClient<StubConnector>, CallLog) {
        let connector = StubConnector::new(behaviour);
        let calls = connector.calls.clone();
        (InstrumentDataClient::with_connector("fridge", connector), calls)
    }

    fn with_temperature(behaviour: Behaviour) -> (InstrumentDataClient<StubConnector>, CallLog) {
        let (mut client, calls) = client(behaviour);
        client
            .register_get_parameter("temperature", "K", json!(0.0), "Mixing chamber")
            .unwrap();
        (client, calls)
    }

    #[tokio::test]
    async fn test_get_before_connect_fails() {
        let (mut client, calls) = with_temperature(Behaviour::Returns(json!(4.2)));

        let result = client.get("temperature").await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_before_connect_fails() {
        let (mut client, _calls) = client(Behaviour::Returns(Value::Null));
        client
            .register_get_set_parameter("heater", ParameterOptions::default())
            .unwrap();

        let result = client.set("heater", json!(1.0)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_get_returns_remote_value() {
        let (mut client, calls) = with_temperature(Behaviour::Returns(json!(4.2)));
        client.connect().await.unwrap();

        assert_eq!(client.get("temperature").await.unwrap(), json!(4.2));
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[("temperature".to_string(), None, Duration::from_secs(5))]
        );
    }

    #[tokio::test]
    async fn test_get_falls_back_to_default_when_remote_raises() {
        let (mut client, _calls) = with_temperature(Behaviour::Raises);
        client.connect().await.unwrap();

        assert_eq!(client.get("temperature").await.unwrap(), json!(0.0));
        assert_eq!(
            client.parameter("temperature").unwrap().cached_value(),
            &json!(0.0)
        );
    }

    #[tokio::test]
    async fn test_get_as_typed() {
        let (mut client, _calls) = with_temperature(Behaviour::Returns(json!(4.2)));
        client.connect().await.unwrap();

        let kelvin: f64 = client.get_as("temperature").await.unwrap();
        assert!((kelvin - 4.2).abs() < f64::EPSILON);

        let result = client.get_as::<String>("temperature").await;
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_set_sends_argument_and_caches() {
        let (mut client, calls) = client(Behaviour::Returns(json!("ok")));
        client
            .register_get_set_parameter(
                "heater",
                ParameterOptions::default()
                    .with_unit("W")
                    .with_argument_key("power"),
            )
            .unwrap();
        client.set_timeout(Duration::from_secs(2));
        client.connect().await.unwrap();

        let reply = client.set("heater", json!(0.25)).await.unwrap();
        assert_eq!(reply, json!("ok"));
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[(
                "heater".to_string(),
                Some(json!({"power": 0.25})),
                Duration::from_secs(2)
            )]
        );
        assert_eq!(client.parameter("heater").unwrap().cached_value(), &json!(0.25));
    }

    #[tokio::test]
    async fn test_set_propagates_remote_error() {
        let (mut client, _calls) = client(Behaviour::Raises);
        client
            .register_get_set_parameter("heater", ParameterOptions::default().with_default(0.0))
            .unwrap();
        client.connect().await.unwrap();

        let err = client.set("heater", json!(1.0)).await.unwrap_err();
        match err {
            Error::Remote(ClientError::Rpc { code, .. }) => assert_eq!(code, FUNCTION_FAILED),
            other => panic!("Expected remote error, got {other:?}"),
        }
        assert_eq!(
            client.parameter("heater").unwrap().cached_value(),
            &json!(0.0),
            "failed set must not touch the cache"
        );
    }

    #[tokio::test]
    async fn test_set_on_get_only_parameter_fails() {
        let (mut client, calls) = with_temperature(Behaviour::Returns(Value::Null));
        client.connect().await.unwrap();

        let result = client.set("temperature", json!(300.0)).await;
        assert!(matches!(result, Err(Error::NotSettable(name)) if name == "temperature"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_parameter() {
        let (mut client, _calls) = client(Behaviour::Returns(Value::Null));
        client.connect().await.unwrap();

        assert!(matches!(
            client.get("flow").await,
            Err(Error::UnknownParameter(_))
        ));
        assert!(matches!(
            client.set("flow", json!(1)).await,
            Err(Error::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let (mut client, _calls) = with_temperature(Behaviour::Raises);

        let result = client.register_get_parameter("temperature", "mK", Value::Null, "");
        assert!(matches!(result, Err(Error::Config(_))));

        let result =
            client.register_get_set_parameter("temperature", ParameterOptions::default());
        assert!(matches!(result, Err(Error::Config(_))));

        assert_eq!(client.parameter("temperature").unwrap().unit(), "K");
    }

    #[test]
    fn test_empty_parameter_name_rejected() {
        let (mut client, _calls) = client(Behaviour::Raises);
        let result = client.register_get_parameter("", "", Value::Null, "");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_twice_fails_until_disconnect() {
        let (mut client, _calls) = client(Behaviour::Returns(Value::Null));
        assert!(!client.disconnect());

        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert!(matches!(client.connect().await, Err(Error::AlreadyConnected)));

        assert!(client.disconnect());
        assert!(!client.is_connected());
        client.connect().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_connect_stays_disconnected() {
        let mut connector = StubConnector::new(Behaviour::Returns(Value::Null));
        connector.refuse = true;
        let mut client = InstrumentDataClient::with_connector("fridge", connector);

        assert!(matches!(client.connect().await, Err(Error::Remote(_))));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_configure_rules() {
        let (mut client, _calls) = client(Behaviour::Returns(Value::Null));

        assert!(matches!(
            client.configure(ConnectionSettings::new("")),
            Err(Error::Config(_))
        ));
        client
            .configure(ConnectionSettings::new("fridge-pc").with_port(6001))
            .unwrap();
        assert_eq!(client.settings().tcp_bind_address(), "tcp://fridge-pc:6001");

        client.connect().await.unwrap();
        assert!(matches!(
            client.configure(ConnectionSettings::default()),
            Err(Error::AlreadyConnected)
        ));
        assert_eq!(client.settings().address, "fridge-pc");
    }

    #[tokio::test]
    async fn test_snapshot_reports_cached_values() {
        let (mut client, _calls) = with_temperature(Behaviour::Returns(json!(0.012)));
        client
            .register_get_parameter("state", "", json!("unknown"), "")
            .unwrap();

        let before = client.snapshot();
        assert_eq!(before["temperature"].value, json!(0.0));
        assert_eq!(before["state"].value, json!("unknown"));

        client.connect().await.unwrap();
        client.get("temperature").await.unwrap();

        let after = serde_json::to_value(client.snapshot()).unwrap();
        assert_eq!(
            after,
            json!({
                "state": {"value": "unknown"},
                "temperature": {"value": 0.012, "unit": "K"}
            })
        );
    }

    #[test]
    fn test_apply_config_registers_parameters() {
        let config: ClientConfig = serde_json::from_value(json!({
            "connection": {"address": "fridge-pc"},
            "timeoutSecs": 0.5,
            "parameters": [
                {"name": "temperature", "unit": "K", "defaultValue": 0.0},
                {"name": "heater", "settable": true, "argumentKey": "power"}
            ]
        }))
        .unwrap();

        let (mut client, _calls) = client(Behaviour::Raises);
        client.apply_config(&config).unwrap();

        assert_eq!(client.timeout(), Duration::from_millis(500));
        assert_eq!(client.settings().address, "fridge-pc");
        assert!(!client.parameter("temperature").unwrap().is_settable());
        assert_eq!(
            client.parameter("heater").unwrap().kind(),
            &ParameterKind::GetSet {
                argument_key: "power".to_string()
            }
        );
        assert_eq!(client.parameters().count(), 2);
    }

    #[test]
    fn test_apply_config_is_all_or_nothing() {
        let (mut client, _calls) = with_temperature(Behaviour::Raises);
        client
            .configure(ConnectionSettings::new("fridge-pc").with_port(6001))
            .unwrap();
        client.set_timeout(Duration::from_secs(3));

        let repeated: ClientConfig = serde_json::from_value(json!({
            "connection": {"address": "other-pc"},
            "timeoutSecs": 1.0,
            "parameters": [
                {"name": "pressure", "unit": "mbar"},
                {"name": "heater", "settable": true},
                {"name": "pressure"}
            ]
        }))
        .unwrap();
        let clashing: ClientConfig = serde_json::from_value(json!({
            "connection": {"address": "other-pc"},
            "parameters": [{"name": "heater"}, {"name": "temperature"}]
        }))
        .unwrap();

        for config in [repeated, clashing] {
            assert!(matches!(client.apply_config(&config), Err(Error::Config(_))));
            assert_eq!(client.settings().tcp_bind_address(), "tcp://fridge-pc:6001");
            assert_eq!(client.timeout(), Duration::from_secs(3));
            assert_eq!(client.parameters().count(), 1);
            assert!(client.parameter("heater").is_none());
        }
    }

    #[test]
    fn test_from_config_uses_tcp_client() {
        let client = InstrumentDataClient::from_config(&ClientConfig::default()).unwrap();
        assert_eq!(client.name(), "fridge");
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
        assert!(!client.is_connected());
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn json_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    proptest! {
        #[test]
        fn prop_get_never_propagates_remote_errors(
            name in "[a-z_]{1,12}",
            default in json_value(),
        ) {
            let (mut client, _calls) = client(Behaviour::Raises);
            client.register_get_parameter(&name, "", default.clone(), "").unwrap();

            let value = block_on(async {
                client.connect().await.unwrap();
                client.get(&name).await
            });
            prop_assert_eq!(value.unwrap(), default);
        }

        #[test]
        fn prop_set_never_swallows_remote_errors(
            name in "[a-z_]{1,12}",
            value in json_value(),
        ) {
            let (mut client, _calls) = client(Behaviour::Raises);
            client.register_get_set_parameter(&name, ParameterOptions::default()).unwrap();

            let result = block_on(async {
                client.connect().await.unwrap();
                client.set(&name, value).await
            });
            let is_rpc_error = matches!(result, Err(Error::Remote(ClientError::Rpc { .. })));
            prop_assert!(is_rpc_error);
        }

        #[test]
        fn prop_get_before_connect_is_not_connected(name in "[a-z_]{1,12}") {
            let (mut client, _calls) = client(Behaviour::Returns(Value::Null));
            client.register_get_parameter(&name, "", Value::Null, "").unwrap();

            let result = block_on(client.get(&name));
            prop_assert!(matches!(result, Err(Error::NotConnected)));
        }

        #[test]
        fn prop_duplicate_names_rejected(name in "[a-z_]{1,12}", settable in any::<bool>()) {
            let (mut client, _calls) = client(Behaviour::Raises);
            client.register_get_parameter(&name, "", Value::Null, "").unwrap();

            let result = if settable {
                client.register_get_set_parameter(&name, ParameterOptions::default())
            } else {
                client.register_get_parameter(&name, "", Value::Null, "")
            };
            prop_assert!(matches!(result, Err(Error::Config(_))));
        }
    }
}
