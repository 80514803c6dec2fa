//! Layer option maps
//!
//! Options are a loosely-typed `name -> value` map so that codecs, transports and
//! callers can all contribute keys without sharing a struct. Typed views are
//! deserialized on demand with [`LayerOptions::get_as`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Logger configuration block, extracted by [`crate::LayerBase`]
pub const LOGGER_OPTION: &str = "logger";
/// Pre-parsed (or raw string) inbound envelope, bypasses the request body
pub const REQUEST_OPTION: &str = "request";
/// Environment snapshot override for the access gates
pub const ENVIRONMENT_OPTION: &str = "environment";
/// Echo execution fault `data` back to clients
pub const DEBUG_OPTION: &str = "debug";
/// Out-of-band `user:password` credentials handed to the transport
pub const AUTH_OPTION: &str = "auth";
/// Basic-auth realm reported when authentication fails
pub const REALM_OPTION: &str = "realm";
/// Names of the required metadata fields for metadata-aware layers
pub const META_PARAMS_OPTION: &str = "meta_params";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerOptions(Map<String, Value>);

impl LayerOptions {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build options from a JSON object; any other value yields `None`
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Loose truthiness: `true`, non-zero numbers and non-empty strings count
    pub fn get_bool(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty() && s != "0" && s != "false",
            _ => false,
        }
    }

    /// Deserialize a single key into a typed view
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.0
            .get(key)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
    }

    /// Deserialize the whole map into a typed view
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merge these options over `defaults`; keys present here win
    pub fn merged_over(self, defaults: &LayerOptions) -> Self {
        let mut merged = defaults.0.clone();
        for (key, value) in self.0 {
            merged.insert(key, value);
        }
        Self(merged)
    }

    /// Apply call-level options: replace everything when `reset`, otherwise overlay
    pub fn overlay(&mut self, options: LayerOptions, reset: bool) {
        if reset {
            *self = options;
        } else {
            *self = options.merged_over(self);
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for LayerOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for LayerOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_options_win_over_defaults() {
        let defaults = LayerOptions::new().with("x", 0).with("y", "default");
        let merged = LayerOptions::new().with("x", 1).merged_over(&defaults);

        assert_eq!(merged.get("x"), Some(&json!(1)));
        assert_eq!(merged.get_str("y"), Some("default"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let defaults = LayerOptions::new().with("x", 0);
        let once = LayerOptions::new().with("x", 1).merged_over(&defaults);
        let twice = LayerOptions::new().with("x", 1).merged_over(&once);
        assert_eq!(once, twice);
        assert_eq!(twice.get("x"), Some(&json!(1)));
    }

    #[test]
    fn test_overlay_reset_discards_previous_options() {
        let mut options = LayerOptions::new().with("x", 1).with("keep", true);
        options.overlay(LayerOptions::new().with("z", 3), true);
        assert!(!options.contains_key("x"));
        assert!(!options.contains_key("keep"));
        assert_eq!(options.get("z"), Some(&json!(3)));

        let mut options = LayerOptions::new().with("x", 1);
        options.overlay(LayerOptions::new().with("x", 2).with("z", 3), false);
        assert_eq!(options.get("x"), Some(&json!(2)));
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn test_truthiness() {
        let options = LayerOptions::new()
            .with("a", true)
            .with("b", 0)
            .with("c", "yes")
            .with("d", "")
            .with("e", json!(null));
        assert!(options.get_bool("a"));
        assert!(!options.get_bool("b"));
        assert!(options.get_bool("c"));
        assert!(!options.get_bool("d"));
        assert!(!options.get_bool("e"));
        assert!(!options.get_bool("missing"));
    }

    #[test]
    fn test_typed_view() {
        #[derive(Deserialize)]
        struct Timeouts {
            connect: u64,
        }

        let options = LayerOptions::new().with("timeouts", json!({"connect": 5}));
        let timeouts: Timeouts = options.get_as("timeouts").unwrap().unwrap();
        assert_eq!(timeouts.connect, 5);
        assert!(options.get_as::<Timeouts>("missing").unwrap().is_none());
    }
}
