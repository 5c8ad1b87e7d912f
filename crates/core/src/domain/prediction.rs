// Prediction Request Domain Model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::{DomainError, Result};

/// Predictor features consumed by the external unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Income,
    Age,
    Dependents,
    OccupationEncoded,
    CityTierEncoded,
    TotalExpenses,
    DesiredSavingsPercentage,
    DisposableIncome,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::Income,
        Feature::Age,
        Feature::Dependents,
        Feature::OccupationEncoded,
        Feature::CityTierEncoded,
        Feature::TotalExpenses,
        Feature::DesiredSavingsPercentage,
        Feature::DisposableIncome,
    ];

    /// Wire name used in request bodies and the handoff payload
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Income => "Income",
            Feature::Age => "Age",
            Feature::Dependents => "Dependents",
            Feature::OccupationEncoded => "Occupation_encoded",
            Feature::CityTierEncoded => "City_Tier_encoded",
            Feature::TotalExpenses => "Total_Expenses",
            Feature::DesiredSavingsPercentage => "Desired_Savings_Percentage",
            Feature::DisposableIncome => "Disposable_Income",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional categorical labels sent alongside the encoded features
pub const LABEL_OCCUPATION: &str = "Occupation";
pub const LABEL_CITY_TIER: &str = "City_Tier";

/// Prediction Request
///
/// A free-form mapping of feature name to value. Nothing is rejected at this
/// layer unless the caller asks for strict checking; unknown keys travel
/// through to the external unit untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionRequest(Map<String, Value>);

impl PredictionRequest {
    pub fn new(features: Map<String, Value>) -> Self {
        Self(features)
    }

    /// Parse a raw request body.
    ///
    /// An empty body or a JSON `null` yields an empty request. Anything that
    /// is not a JSON object is rejected.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_slice(body)
            .map_err(|e| DomainError::InvalidRequest(e.to_string()))?;

        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(DomainError::InvalidRequest(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Predictor features absent from the request
    pub fn missing_features(&self) -> Vec<Feature> {
        Feature::ALL
            .iter()
            .copied()
            .filter(|f| !self.0.contains_key(f.as_str()))
            .collect()
    }

    /// Fail with the list of absent predictor features, if any
    pub fn require_all_features(&self) -> Result<()> {
        let missing = self.missing_features();
        if missing.is_empty() {
            return Ok(());
        }
        Err(DomainError::MissingFeatures(
            missing.iter().map(|f| f.as_str().to_string()).collect(),
        ))
    }

    /// Read a feature as a number. Numeric strings are accepted because the
    /// browser form posts some encoded fields verbatim.
    pub fn numeric(&self, feature: Feature) -> Option<f64> {
        match self.0.get(feature.as_str())? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Serialize with keys in sorted order.
    pub fn to_canonical_json(&self) -> std::result::Result<String, serde_json::Error> {
        // serde_json::Map is a BTreeMap without `preserve_order`, so key order is stable
        serde_json::to_string(&self.0)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
