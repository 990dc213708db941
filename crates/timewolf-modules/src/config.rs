//! Module configuration as handed over by the recipe.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use timewolf_core::{ModuleError, ModuleResult};

/// JSON object of module arguments with typed accessors.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleConfig(Map<String, Value>);

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value. `null` is an empty configuration; anything other
    /// than an object is a configuration error.
    pub fn from_value(value: Value) -> ModuleResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(ModuleError::configuration(format!(
                "module configuration must be an object, got {}",
                other
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Non-empty string argument; `null` and `""` count as absent.
    pub fn optional_str(&self, key: &str) -> Option<String> {
        match self.0.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn required_str(&self, key: &str) -> ModuleResult<String> {
        self.optional_str(key)
            .ok_or_else(|| ModuleError::configuration(format!("Missing required parameter: {}", key)))
    }

    /// Boolean argument. Accepts JSON booleans and the strings `true`/`false`.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => default,
            },
            _ => default,
        }
    }

    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        match self.0.get(key) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// List argument. Accepts a JSON array of strings or a comma-separated
    /// string; blank entries are dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        let raw: Vec<String> = match self.0.get(key) {
            Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl From<Map<String, Value>> for ModuleConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
