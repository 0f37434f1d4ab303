//! Named parameters bound to remote functions.

use serde::Serialize;
use serde_json::Value;

/// Key under which setters pass their value unless told otherwise.
pub const DEFAULT_ARGUMENT_KEY: &str = "argument";

/// How a parameter may be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// Read through the remote getter only.
    GetOnly,
    /// Read and written through the same remote function; writes send
    /// `{argument_key: value}`.
    GetSet { argument_key: String },
}

/// A registered parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    function_name: String,
    unit: String,
    default_value: Value,
    doc: String,
    kind: ParameterKind,
    cached: Value,
}

impl Parameter {
    pub(crate) fn get_only(
        function_name: impl Into<String>,
        unit: impl Into<String>,
        default_value: Value,
        doc: impl Into<String>,
    ) -> Self {
        let function_name = function_name.into();
        Self {
            name: function_name.clone(),
            function_name,
            unit: unit.into(),
            cached: default_value.clone(),
            default_value,
            doc: doc.into(),
            kind: ParameterKind::GetOnly,
        }
    }

    pub(crate) fn get_set(name: impl Into<String>, options: ParameterOptions) -> Self {
        let name = name.into();
        Self {
            function_name: name.clone(),
            name,
            unit: options.unit,
            cached: options.default_value.clone(),
            default_value: options.default_value,
            doc: options.doc,
            kind: ParameterKind::GetSet {
                argument_key: options.argument_key,
            },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remote function invoked for reads and writes.
    #[must_use]
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Empty for unitless quantities.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Initial value, and what reads return when the remote call fails.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    #[must_use]
    pub fn doc(&self) -> &str {
        &self.doc
    }

    #[must_use]
    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    #[must_use]
    pub fn is_settable(&self) -> bool {
        matches!(self.kind, ParameterKind::GetSet { .. })
    }

    /// Latest value read or written, without a remote call.
    #[must_use]
    pub fn cached_value(&self) -> &Value {
        &self.cached
    }

    pub(crate) fn cache(&mut self, value: Value) {
        self.cached = value;
    }

    #[must_use]
    pub fn snapshot(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            value: self.cached.clone(),
            unit: self.unit.clone(),
        }
    }
}

/// Options for a get/set parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterOptions {
    pub unit: String,
    pub default_value: Value,
    pub doc: String,
    pub argument_key: String,
}

impl ParameterOptions {
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    #[must_use]
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    #[must_use]
    pub fn with_argument_key(mut self, key: impl Into<String>) -> Self {
        self.argument_key = key.into();
        self
    }
}

impl Default for ParameterOptions {
    fn default() -> Self {
        Self {
            unit: String::new(),
            default_value: Value::Null,
            doc: String::new(),
            argument_key: DEFAULT_ARGUMENT_KEY.to_string(),
        }
    }
}

/// Cached value and unit of one parameter, as reported by `snapshot()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    pub value: Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit: String,
}
