//! Coercion of declared preview parameters into typed props.
//!
//! Parameters arrive as text (`defaultValue`) tagged with a declared type.
//! Each is converted independently; a failure is recorded against the
//! parameter name and never aborts the rest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Text, with one layer of matching quotes stripped
    String,
    /// Numeric literal
    Number,
    /// `true` or `false`
    Boolean,
    /// JSON array
    Array,
    /// JSON object
    Object,
    /// Any type name this coercer does not know
    #[serde(other)]
    Unsupported,
}

impl ParamType {
    fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Unsupported => "unsupported",
        }
    }
}

/// A declared component parameter, as stored with a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParameter {
    /// Prop name
    pub name: String,
    /// Declared type
    #[serde(rename = "type")]
    pub declared_type: ParamType,
    /// Default value as entered by the author
    #[serde(rename = "defaultValue", default)]
    pub default_value_text: String,
    /// Optional help text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl InputParameter {
    /// Convenience constructor.
    pub fn new(
        name: impl Into<String>,
        declared_type: ParamType,
        default_value_text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type,
            default_value_text: default_value_text.into(),
            description: None,
        }
    }

    /// Parse the `inputParameters` JSON array; `null` yields no parameters.
    pub fn parse_list(json: &str) -> serde_json::Result<Vec<Self>> {
        let parsed: Option<Vec<Self>> = serde_json::from_str(json)?;
        Ok(parsed.unwrap_or_default())
    }
}

/// Why one parameter could not be coerced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum CoercionError {
    /// Text is not a finite number
    #[error("'{0}' is not a valid number")]
    InvalidNumber(String),

    /// Text is neither `true` nor `false`
    #[error("'{0}' is not a valid boolean (expected true or false)")]
    InvalidBoolean(String),

    /// Text is not valid JSON
    #[error("invalid JSON for {expected}: {detail}")]
    InvalidJson {
        /// Declared type
        expected: &'static str,
        /// Parser message
        detail: String,
    },

    /// JSON parsed but has the wrong shape
    #[error("expected {expected}, found {found}")]
    ShapeMismatch {
        /// Declared type
        expected: &'static str,
        /// JSON kind that was found
        found: &'static str,
    },

    /// Declared type is unknown
    #[error("unsupported parameter type")]
    UnsupportedType,
}

/// Outcome of [`coerce`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coerced {
    /// Successfully coerced props, by name
    pub values: Map<String, Value>,
    /// Failures, by name
    pub errors: BTreeMap<String, CoercionError>,
}

/// Coerce every parameter's default value into a prop.
///
/// A later parameter with a duplicate name replaces the earlier result.
pub fn coerce(params: &[InputParameter]) -> Coerced {
    let mut out = Coerced::default();
    for param in params {
        out.values.remove(&param.name);
        out.errors.remove(&param.name);
        match coerce_one(param.declared_type, &param.default_value_text) {
            Ok(value) => {
                out.values.insert(param.name.clone(), value);
            }
            Err(err) => {
                out.errors.insert(param.name.clone(), err);
            }
        }
    }
    out
}

/// Coerce a single text value to `declared_type`.
pub fn coerce_one(declared_type: ParamType, text: &str) -> Result<Value, CoercionError> {
    match declared_type {
        ParamType::String => Ok(Value::String(strip_quotes(text).to_string())),
        ParamType::Number => coerce_number(text),
        ParamType::Boolean => match text.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(CoercionError::InvalidBoolean(text.to_string())),
        },
        ParamType::Array | ParamType::Object => coerce_json(declared_type, text),
        ParamType::Unsupported => Err(CoercionError::UnsupportedType),
    }
}

fn coerce_number(text: &str) -> Result<Value, CoercionError> {
    let invalid = || CoercionError::InvalidNumber(text.to_string());
    let trimmed = text.trim();
    // `f64::from_str` also accepts "inf" and "NaN", which are not numbers here.
    if trimmed.is_empty()
        || trimmed
            .chars()
            .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return Err(invalid());
    }
    let parsed: f64 = trimmed.parse().map_err(|_| invalid())?;
    if !parsed.is_finite() {
        return Err(invalid());
    }
    if parsed.fract() == 0.0 && parsed.abs() < 9.007_199_254_740_992e15 {
        return Ok(Value::Number(Number::from(parsed as i64)));
    }
    Number::from_f64(parsed).map(Value::Number).ok_or_else(invalid)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce_json(declared_type: ParamType, text: &str) -> Result<Value, CoercionError> {
    let expected = declared_type.as_str();
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|err| CoercionError::InvalidJson {
            expected,
            detail: err.to_string(),
        })?;
    let shape_ok = match declared_type {
        ParamType::Array => value.is_array(),
        _ => value.is_object(),
    };
    if !shape_ok {
        return Err(CoercionError::ShapeMismatch {
            expected,
            found: json_kind(&value),
        });
    }
    Ok(value)
}

/// Remove one layer of matching `'`, `"` or `` ` `` quotes.
fn strip_quotes(text: &str) -> &str {
    for quote in ['\'', '"', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_keep_integers_integral() {
        assert_eq!(coerce_one(ParamType::Number, "42").unwrap(), json!(42));
        assert_eq!(coerce_one(ParamType::Number, " 2.5 ").unwrap(), json!(2.5));
        assert_eq!(coerce_one(ParamType::Number, "-1e3").unwrap(), json!(-1000));
        assert!(coerce_one(ParamType::Number, "NaN").is_err());
        assert!(coerce_one(ParamType::Number, "").is_err());
        assert!(coerce_one(ParamType::Number, "12px").is_err());
    }

    #[test]
    fn test_booleans_are_literal() {
        assert_eq!(coerce_one(ParamType::Boolean, "true").unwrap(), json!(true));
        assert_eq!(
            coerce_one(ParamType::Boolean, "yes"),
            Err(CoercionError::InvalidBoolean("yes".into()))
        );
    }

    #[test]
    fn test_json_shapes_are_checked() {
        assert_eq!(
            coerce_one(ParamType::Array, "[1, \"a\"]").unwrap(),
            json!([1, "a"])
        );
        assert_eq!(
            coerce_one(ParamType::Object, "[1]"),
            Err(CoercionError::ShapeMismatch {
                expected: "object",
                found: "array"
            })
        );
        assert!(matches!(
            coerce_one(ParamType::Array, "[1,"),
            Err(CoercionError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_strings_lose_one_quote_layer() {
        assert_eq!(coerce_one(ParamType::String, "'hi'").unwrap(), json!("hi"));
        assert_eq!(
            coerce_one(ParamType::String, "\"'nested'\"").unwrap(),
            json!("'nested'")
        );
        assert_eq!(coerce_one(ParamType::String, "`x`").unwrap(), json!("x"));
        assert_eq!(coerce_one(ParamType::String, "'odd\"").unwrap(), json!("'odd\""));
        assert_eq!(coerce_one(ParamType::String, "'").unwrap(), json!("'"));
    }

    #[test]
    fn test_failures_do_not_abort_other_params() {
        let coerced = coerce(&[
            InputParameter::new("n", ParamType::Number, "42"),
            InputParameter::new("bad", ParamType::Number, "oops"),
            InputParameter::new("flag", ParamType::Boolean, "false"),
        ]);
        assert_eq!(coerced.values.get("n"), Some(&json!(42)));
        assert_eq!(coerced.values.get("flag"), Some(&json!(false)));
        assert!(!coerced.values.contains_key("bad"));
        assert_eq!(
            coerced.errors.get("bad"),
            Some(&CoercionError::InvalidNumber("oops".into()))
        );
    }

    #[test]
    fn test_parse_list_reads_store_format() {
        let params = InputParameter::parse_list(
            r#"[{"name":"title","type":"string","defaultValue":"'Hello'","description":"Heading"},
                {"name":"size","type":"color","defaultValue":"red"}]"#,
        )
        .unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].description.as_deref(), Some("Heading"));
        assert_eq!(params[1].declared_type, ParamType::Unsupported);
        assert!(InputParameter::parse_list("null").unwrap().is_empty());
    }
}
