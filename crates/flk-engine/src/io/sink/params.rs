use super::error::{Result, SinkError};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter naming the pool cap of a writer
pub const MAX_CONNECTIONS: &str = "max connections";

/// Pool cap used when the parameters do not name one
pub const DEFAULT_MAX_CONNECTIONS: usize = 50;

const SECRET_KEYS: &[&str] = &["passwd", "password"];

/// Connection parameters identifying a sink
/// Keys are kept sorted so the rendered form is stable across runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams {
    values: BTreeMap<String, String>,
}

impl ConnectionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build from a YAML mapping; scalar values are stringified
    pub fn from_yaml(mapping: &serde_yaml::Mapping) -> Result<Self> {
        let mut params = Self::new();
        for (key, value) in mapping {
            let key = key
                .as_str()
                .ok_or_else(|| SinkError::InvalidParams(format!("non-string key {:?}", key)))?;
            let value = match value {
                serde_yaml::Value::String(s) => s.clone(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(SinkError::InvalidParams(format!(
                        "value of '{}' must be a scalar, got {:?}",
                        key, other
                    )))
                }
            };
            params.insert(key, value);
        }
        Ok(params)
    }

    /// Pool cap from `max connections`, defaulting to 50
    pub fn max_connections(&self) -> Result<usize> {
        match self.get(MAX_CONNECTIONS) {
            None => Ok(DEFAULT_MAX_CONNECTIONS),
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(SinkError::InvalidParams(format!(
                    "'{}' must be a positive integer, got '{}'",
                    MAX_CONNECTIONS, raw
                ))),
            },
        }
    }

    /// Verbatim rendering used as a cache key component
    pub fn cache_key(&self) -> String {
        self.render(false)
    }

    fn render(&self, mask_secrets: bool) -> String {
        let entries: Vec<String> = self
            .values
            .iter()
            .map(|(k, v)| {
                if mask_secrets && SECRET_KEYS.contains(&k.as_str()) {
                    format!("{}=****", k)
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect();
        format!("{{{}}}", entries.join(", "))
    }
}

/// Display masks credentials; use `cache_key` for the verbatim form
impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnectionParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}
