// Result Record Domain Model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ERROR_KEY: &str = "error";
pub const ELAPSED_KEY: &str = "elapsed_ms";

/// Result Record produced by the external unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRecord(Map<String, Value>);

impl ResultRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Structured record returned when the unit finished without writing its output
    pub fn not_produced(file_name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(
            ERROR_KEY.to_string(),
            Value::String(format!("{} not produced", file_name)),
        );
        Self(fields)
    }

    pub fn is_not_produced(&self) -> bool {
        self.error()
            .map(|msg| msg.ends_with(" not produced"))
            .unwrap_or(false)
    }

    pub fn error(&self) -> Option<&str> {
        self.0.get(ERROR_KEY).and_then(Value::as_str)
    }

    /// Attach wall-clock milliseconds, rounded to two decimals
    pub fn with_elapsed_ms(mut self, elapsed_ms: f64) -> Self {
        let rounded = (elapsed_ms * 100.0).round() / 100.0;
        let value = serde_json::Number::from_f64(rounded)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.0.insert(ELAPSED_KEY.to_string(), value);
        self
    }

    pub fn elapsed_ms(&self) -> Option<f64> {
        self.0.get(ELAPSED_KEY).and_then(Value::as_f64)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
