//! JSON parameter descriptors.
//!
//! A parameter list is a JSON array of `{"type": ..., "value": ...}` objects.
//! The array position decides the bind position; `type` picks the conversion
//! applied to the textual `value`.

use crate::db::{format_timestamp, parse_timestamp, Value};
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Declared type of a parameter. Unknown or missing types bind as strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParameterType {
    Int,
    Float,
    Date,
    Boolean,
    #[default]
    String,
}

impl ParameterType {
    /// Parses a type name, case-insensitively. Anything unrecognised is `String`.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "int" => Self::Int,
            "float" => Self::Float,
            "date" => Self::Date,
            "boolean" => Self::Boolean,
            _ => Self::String,
        }
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }
}

/// One entry of a parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub param_type: ParameterType,
    pub value: String,
}

impl ParameterDescriptor {
    pub fn new(param_type: ParameterType, value: impl Into<String>) -> Self {
        Self {
            param_type,
            value: value.into(),
        }
    }

    /// Describes a timestamp parameter using the shared date format.
    pub fn date(timestamp: &chrono::DateTime<chrono::Utc>) -> Self {
        Self::new(ParameterType::Date, format_timestamp(timestamp))
    }

    /// Converts the textual value to the bindable value for its type.
    ///
    /// `position` is the 1-based bind position, reported in errors.
    pub fn to_value(&self, position: usize) -> Result<Value> {
        let fail = |reason: &dyn std::fmt::Display| {
            BridgeError::parameter_conversion(
                position,
                self.param_type.as_str(),
                self.value.as_str(),
                reason,
            )
        };

        match self.param_type {
            ParameterType::Int => self
                .value
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|e| fail(&e)),
            ParameterType::Float => self
                .value
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| fail(&e)),
            ParameterType::Date => parse_timestamp(&self.value)
                .map(Value::Date)
                .map_err(|e| fail(&e)),
            ParameterType::Boolean => {
                if self.value.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if self.value.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(fail(&"expected true or false"))
                }
            }
            ParameterType::String => Ok(Value::String(self.value.clone())),
        }
    }
}

/// Wire shape of a descriptor.
#[derive(Debug, Deserialize, Serialize)]
struct WireDescriptor {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    value: WireScalar,
}

/// Values are normally strings; bare numbers and booleans are read as their
/// literal text.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum WireScalar {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl WireScalar {
    fn into_text(self) -> String {
        match self {
            WireScalar::Text(text) => text,
            WireScalar::Number(number) => number.to_string(),
            WireScalar::Bool(flag) => flag.to_string(),
        }
    }
}

/// Decodes a JSON parameter list.
///
/// Fails with [`BridgeError::ParameterDecode`] when the payload is not a JSON
/// array of objects each carrying a `value`.
pub fn decode_parameters(json: &str) -> Result<Vec<ParameterDescriptor>> {
    let wire: Vec<WireDescriptor> =
        serde_json::from_str(json).map_err(|e| BridgeError::parameter_decode(e.to_string()))?;

    Ok(wire
        .into_iter()
        .map(|descriptor| ParameterDescriptor {
            param_type: descriptor
                .kind
                .as_deref()
                .map(ParameterType::parse)
                .unwrap_or_default(),
            value: descriptor.value.into_text(),
        })
        .collect())
}

/// Encodes descriptors into the JSON form accepted by [`decode_parameters`].
pub fn encode_parameters(params: &[ParameterDescriptor]) -> Result<String> {
    let wire: Vec<WireDescriptor> = params
        .iter()
        .map(|param| WireDescriptor {
            kind: Some(param.param_type.as_str().to_string()),
            value: WireScalar::Text(param.value.clone()),
        })
        .collect();
    serde_json::to_string(&wire).map_err(|e| BridgeError::internal(e.to_string()))
}
