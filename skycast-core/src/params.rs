//! Typed access to the variant-specific fields of an `activate` message.

use serde_json::{Map, Value};

use crate::error::BuildError;

/// Remaining control-message fields after `action` and `type` are removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn require_str(&self, key: &str) -> Result<&str, BuildError> {
        match self.0.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s),
            Some(Value::String(_)) => Err(invalid(key, "must not be empty")),
            Some(_) => Err(invalid(key, "expected a string")),
            None => Err(missing(key)),
        }
    }

    /// Accepts JSON numbers and numeric strings (`"0.5"`), since both shapes
    /// occur in deployed clients.
    pub fn require_f64(&self, key: &str) -> Result<f64, BuildError> {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(key, "not a finite number")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| invalid(key, "not a number")),
            Some(_) => Err(invalid(key, "expected a number")),
            None => Err(missing(key)),
        }
    }

    /// A name that will be joined onto a filesystem path.
    pub fn require_name(&self, key: &str) -> Result<&str, BuildError> {
        let name = self.require_str(key)?;
        if name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            Ok(name)
        } else {
            Err(invalid(key, "only letters, digits, '_' and '-' are allowed"))
        }
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn missing(key: &str) -> BuildError {
    BuildError::Missing {
        param: key.to_string(),
    }
}

fn invalid(key: &str, reason: &str) -> BuildError {
    BuildError::Invalid {
        param: key.to_string(),
        reason: reason.to_string(),
    }
}
