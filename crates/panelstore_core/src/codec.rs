//! Field value encoding.
//!
//! Every field is stored as a string. Writes follow a fixed mapping:
//! null is omitted, binary becomes base64, objects and arrays become JSON
//! and everything else uses its plain string form. Reads attempt a JSON
//! parse and fall back to the raw string, so a stored text such as `"123"`
//! reads back as a number. Existing stored data depends on this mapping.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Number, Value as Json};

/// A dynamic field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent value. Never stored.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text string.
    Text(String),
    /// Binary payload.
    Bytes(Vec<u8>),
    /// JSON object or array.
    Json(Json),
}

/// Outcome of decoding a stored string.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The string parsed as JSON.
    Parsed(FieldValue),
    /// The string is not JSON and is returned as-is.
    Verbatim(String),
}

impl Decoded {
    /// Collapses the outcome into a value, treating verbatim strings as text.
    #[must_use]
    pub fn into_value(self) -> FieldValue {
        match self {
            Decoded::Parsed(value) => value,
            Decoded::Verbatim(raw) => FieldValue::Text(raw),
        }
    }
}

impl FieldValue {
    /// Returns true for [`FieldValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the text, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer, if this is an integer value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(n) => Some(*n),
            FieldValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Returns the boolean, if this is a boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns binary content.
    ///
    /// Binary values read back from storage arrive as base64 text, so text
    /// that decodes as base64 is accepted too.
    #[must_use]
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            FieldValue::Bytes(b) => Some(b.clone()),
            FieldValue::Text(s) => STANDARD.decode(s).ok(),
            _ => None,
        }
    }

    /// Encodes the value into its stored string form.
    ///
    /// Returns `None` for null, which means the field is omitted.
    #[must_use]
    pub fn encode(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Int(n) => Some(n.to_string()),
            FieldValue::Float(n) => Some(format_float(*n)),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Bytes(b) => Some(STANDARD.encode(b)),
            FieldValue::Json(json) => Some(json.to_string()),
        }
    }

    /// Decodes a stored (already decrypted) string.
    #[must_use]
    pub fn decode(raw: &str) -> Decoded {
        match serde_json::from_str::<Json>(raw) {
            Ok(json) => Decoded::Parsed(Self::from_json(json)),
            Err(_) => Decoded::Verbatim(raw.to_string()),
        }
    }

    /// String used in secondary index keys.
    ///
    /// Returns `None` for null, which means the entity is in no index set.
    #[must_use]
    pub fn index_token(&self) -> Option<String> {
        self.encode()
    }

    /// Converts a JSON value into a field value.
    #[must_use]
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => FieldValue::Null,
            Json::Bool(b) => FieldValue::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => FieldValue::Text(s),
            json @ (Json::Array(_) | Json::Object(_)) => FieldValue::Json(json),
        }
    }

    /// Converts the value into JSON. Binary becomes base64 text.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            FieldValue::Null => Json::Null,
            FieldValue::Bool(b) => Json::Bool(*b),
            FieldValue::Int(n) => Json::Number((*n).into()),
            FieldValue::Float(n) => Number::from_f64(*n).map_or(Json::Null, Json::Number),
            FieldValue::Text(s) => Json::String(s.clone()),
            FieldValue::Bytes(b) => Json::String(STANDARD.encode(b)),
            FieldValue::Json(json) => json.clone(),
        }
    }
}

/// Formats a float the way JavaScript's `Number#toString` does: shortest
/// round-trip digits, integral values without a fraction, and exponent form
/// below 1e-6 or from 1e21 up.
fn format_float(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        // -0 prints as 0
        return "0".to_string();
    }

    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return n.to_string();
    }
    let scientific = format!("{n:e}");
    match scientific.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => scientific,
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Int(i64::from(n))
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::Int(i64::from(n))
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Float(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Bytes(b)
    }
}

impl From<Json> for FieldValue {
    fn from(json: Json) -> Self {
        match json {
            json @ (Json::Array(_) | Json::Object(_)) => FieldValue::Json(json),
            other => FieldValue::from_json(other),
        }
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}
