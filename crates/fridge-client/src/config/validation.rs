//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Warn about config fields the client does not understand, e.g. typos.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    for path in find_unknown_keys(&value, &expected_config_keys(), "") {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Returns paths like `connection.adress` or `parameters[2].unti`.
fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(nested) = expected.nested.get(key.as_str()) {
            unknowns.extend(find_unknown_keys(child, nested, &path));
        } else if let Some(item) = expected.items.get(key.as_str()) {
            if let Value::Array(elements) = child {
                for (index, element) in elements.iter().enumerate() {
                    unknowns.extend(find_unknown_keys(element, item, &format!("{path}[{index}]")));
                }
            }
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

/// Expected keys for a config section: leaf `fields`, `nested` objects and
/// arrays whose elements are objects (`items`).
struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
    items: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
            items: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }

    fn with_items(mut self, key: &'static str, item: ExpectedKeys) -> Self {
        self.items.insert(key, item);
        self
    }
}

/// Expected keys for `ClientConfig` (file.rs)
fn expected_config_keys() -> ExpectedKeys {
    let connection_keys = ExpectedKeys::new(&["address", "port", "username", "password"]);

    let parameter_keys = ExpectedKeys::new(&[
        "name",
        "unit",
        "defaultValue",
        "doc",
        "settable",
        "argumentKey",
    ]);

    ExpectedKeys::new(&["name", "timeoutSecs"])
        .with_nested("connection", connection_keys)
        .with_items("parameters", parameter_keys)
}
