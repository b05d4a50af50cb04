//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    for path in find_unknown_keys(&value, &expected_config_keys(), "") {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Returns paths like "daemon.unknownField" for unknown fields.
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
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }
}

fn expected_config_keys() -> ExpectedKeys {
    ExpectedKeys::new(&["debug", "brokerLogFile"])
        .with_nested(
            "daemon",
            ExpectedKeys::new(&[
                "binary",
                "args",
                "debugArgs",
                "socketPath",
                "logFile",
                "startupPollIntervalMs",
                "startupTimeoutMs",
            ]),
        )
        .with_nested(
            "login",
            ExpectedKeys::new(&["autoLogin", "locale", "ignoredErrorCodes"]),
        )
        .with_nested("query", ExpectedKeys::new(&["host", "port", "key"]))
}
