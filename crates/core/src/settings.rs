//! Typed setting values and namespace resolution shared by all settings stores.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::models::TenantId;

/// Main keys whose settings are shared by every tenant.
pub const GLOBAL_KEYS: [&str; 4] = ["core", "whitelist", "signalprovider", "symbolmap"];

/// Resolve the tenant namespace a main key lives in.
///
/// Only the part of the main key before the first `:` decides whether it is global.
pub fn resolve_tenant(tenant: TenantId, mainkey: &str) -> TenantId {
    let root = mainkey.split(':').next().unwrap_or(mainkey);
    if GLOBAL_KEYS.contains(&root) {
        TenantId::GLOBAL
    } else {
        tenant
    }
}

/// A stored setting value.
///
/// Values are persisted as JSON text. Decoding is lenient for rows written by
/// older tooling: `true`/`false`, quoted or not, become booleans and text that
/// is not valid JSON is kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Number(Number),
    Text(String),
    Json(Value),
}

impl SettingValue {
    pub fn encode(&self) -> String {
        match self {
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Number(n) => n.to_string(),
            SettingValue::Text(s) => Value::String(s.clone()).to_string(),
            SettingValue::Json(v) => v.to_string(),
        }
    }

    pub fn decode(raw: &str) -> Self {
        match raw.trim() {
            "true" | "\"true\"" => SettingValue::Bool(true),
            "false" | "\"false\"" => SettingValue::Bool(false),
            trimmed => match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => Self::from_json(value),
                Err(_) => SettingValue::Text(raw.to_string()),
            },
        }
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Bool(b) => SettingValue::Bool(b),
            Value::Number(n) => SettingValue::Number(n),
            Value::String(s) => SettingValue::from(s),
            other => SettingValue::Json(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SettingValue::Bool(b) => Value::Bool(*b),
            SettingValue::Number(n) => Value::Number(n.clone()),
            SettingValue::Text(s) => Value::String(s.clone()),
            SettingValue::Json(v) => v.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SettingValue::Number(n) => n.as_u64(),
            SettingValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a list of strings (a JSON array or a comma-separated text).
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            SettingValue::Json(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            SettingValue::Text(s) => Some(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<u64> for SettingValue {
    fn from(value: u64) -> Self {
        SettingValue::Number(Number::from(value))
    }
}

impl From<String> for SettingValue {
    /// Boolean literals are stored as booleans so that every value round-trips.
    fn from(value: String) -> Self {
        match value.as_str() {
            "true" => SettingValue::Bool(true),
            "false" => SettingValue::Bool(false),
            _ => SettingValue::Text(value),
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::from(value.to_string())
    }
}

impl From<Value> for SettingValue {
    fn from(value: Value) -> Self {
        SettingValue::from_json(value)
    }
}

impl Serialize for SettingValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettingValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(SettingValue::from_json)
    }
}

/// Fold the raw rows matching a lookup into one value.
///
/// No rows is absent, a single row is its value, several rows become an object
/// keyed by subkey.
pub fn collapse_rows(rows: Vec<(String, String)>) -> Option<SettingValue> {
    match rows.len() {
        0 => None,
        1 => rows.into_iter().next().map(|(_, raw)| SettingValue::decode(&raw)),
        _ => {
            let object: Map<String, Value> = rows
                .into_iter()
                .map(|(subkey, raw)| (subkey, SettingValue::decode(&raw).to_json()))
                .collect();
            Some(SettingValue::Json(Value::Object(object)))
        }
    }
}
